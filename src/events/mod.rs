//! Fund change records
//!
//! Every successful mint, redeem and settings change produces one
//! `FundEvent`. Failed operations produce none. The in-memory `EventLog`
//! is what the fund appends to; `JsonlEventWriter` persists records for
//! offline inspection.

pub mod jsonl;

pub use jsonl::JsonlEventWriter;

use alloy::primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, PoisonError};

use crate::fees::BasisPoints;
use crate::types::{BackendSelector, RedemptionFloor, VaultGeneration};

/// A change record emitted by the fund.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum FundEvent {
    Minted {
        depositor: Address,
        /// Native amount the depositor paid
        gross_deposit: U256,
        /// Amount routed into the basket after the fee
        net_deposit: U256,
        fee: U256,
        pool_tokens: U256,
        /// Shares (ledger) or pool tokens (direct token) issued
        claim_issued: U256,
        vault: VaultGeneration,
    },
    Redeemed {
        redeemer: Address,
        claim_burned: U256,
        pool_tokens: U256,
        gross_native: U256,
        fee: U256,
        payout: U256,
    },
    SlippageToleranceUpdated {
        old: BasisPoints,
        new: BasisPoints,
    },
    FeeRateUpdated {
        old: BasisPoints,
        new: BasisPoints,
    },
    BackendSelectorUpdated {
        asset: Address,
        old: BackendSelector,
        new: BackendSelector,
    },
    RedemptionFloorUpdated {
        old: RedemptionFloor,
        new: RedemptionFloor,
    },
}

impl FundEvent {
    /// Same string as the serialized `event` tag.
    pub fn name(&self) -> &'static str {
        match self {
            FundEvent::Minted { .. } => "minted",
            FundEvent::Redeemed { .. } => "redeemed",
            FundEvent::SlippageToleranceUpdated { .. } => "slippage_tolerance_updated",
            FundEvent::FeeRateUpdated { .. } => "fee_rate_updated",
            FundEvent::BackendSelectorUpdated { .. } => "backend_selector_updated",
            FundEvent::RedemptionFloorUpdated { .. } => "redemption_floor_updated",
        }
    }
}

/// Append-only in-memory record of emitted events.
#[derive(Debug, Default)]
pub struct EventLog {
    records: Mutex<Vec<FundEvent>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: FundEvent) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }

    pub fn all(&self) -> Vec<FundEvent> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Events recorded at or after position `from`
    pub fn since(&self, from: usize) -> Vec<FundEvent> {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        records.get(from..).map(<[FundEvent]>::to_vec).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_with_tag() {
        let event = FundEvent::FeeRateUpdated {
            old: BasisPoints::new(50).unwrap(),
            new: BasisPoints::new(75).unwrap(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "fee_rate_updated");
        assert_eq!(json["new"], 75);
        assert_eq!(event.name(), "fee_rate_updated");
    }

    #[test]
    fn test_name_matches_serialized_tag() {
        let bps = |v| BasisPoints::new(v).unwrap();
        let events = [
            FundEvent::Minted {
                depositor: Address::ZERO,
                gross_deposit: U256::from(100),
                net_deposit: U256::from(99),
                fee: U256::from(1),
                pool_tokens: U256::from(10),
                claim_issued: U256::from(10),
                vault: VaultGeneration::B,
            },
            FundEvent::Redeemed {
                redeemer: Address::ZERO,
                claim_burned: U256::from(10),
                pool_tokens: U256::from(10),
                gross_native: U256::from(98),
                fee: U256::from(1),
                payout: U256::from(97),
            },
            FundEvent::SlippageToleranceUpdated { old: bps(100), new: bps(200) },
            FundEvent::FeeRateUpdated { old: bps(50), new: bps(0) },
            FundEvent::BackendSelectorUpdated {
                asset: Address::ZERO,
                old: BackendSelector::Unset,
                new: BackendSelector::PairwiseGen1,
            },
            FundEvent::RedemptionFloorUpdated {
                old: RedemptionFloor::Zero,
                new: RedemptionFloor::Quoted,
            },
        ];
        for event in &events {
            let json = serde_json::to_value(event).unwrap();
            assert_eq!(json["event"], event.name());
        }
    }

    #[test]
    fn test_log_since() {
        let log = EventLog::new();
        assert!(log.is_empty());
        for floor in [RedemptionFloor::Quoted, RedemptionFloor::Zero] {
            log.push(FundEvent::RedemptionFloorUpdated {
                old: RedemptionFloor::Zero,
                new: floor,
            });
        }
        assert_eq!(log.len(), 2);
        assert_eq!(log.since(1).len(), 1);
        assert!(log.since(5).is_empty());
    }
}
