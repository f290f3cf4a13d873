//! Market assembly
//!
//! `MarketBuilder` lays out tokens, exchange pools and one weighted vault
//! pool on a fresh `SimChain`, and `Market` hands out the collaborator
//! objects a fund is wired to.

use alloy::primitives::{Address, B256, U256};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use super::gen2::sqrt_price_x96;
use super::vault::create_weighted_pool;
use super::{SimChain, SimGen1Exchange, SimGen2Exchange, SimVaultA, SimVaultB, WeightedPool};
use crate::config::{FundConfig, VaultConfig};
use crate::interfaces::{PairwiseGen1Exchange, PairwiseGen2Exchange, TokenLedger, VaultA, VaultB, VaultHandle, Venues};
use crate::routing::SwapRouter;
use crate::types::{BackendSelector, UnderlyingAsset, VaultGeneration};

pub const GEN1_ROUTER: Address = Address::repeat_byte(0xE1);
pub const GEN2_ROUTER: Address = Address::repeat_byte(0xE2);
pub const VAULT_A: Address = Address::repeat_byte(0xB1);
pub const VAULT_B: Address = Address::repeat_byte(0xB2);

const GEN1_PAIR_TAG: u8 = 0xC1;
const GEN2_POOL_TAG: u8 = 0xC2;
const VAULT_POOL_TAG: u8 = 0xC3;

fn derived_address(tag: u8, index: usize) -> Address {
    let mut bytes = [tag; 20];
    bytes[18] = (index >> 8) as u8;
    bytes[19] = index as u8;
    Address::from(bytes)
}

fn ether(n: u64) -> U256 {
    U256::from(n) * U256::from(10u64).pow(U256::from(18))
}

/// Decimal price as an exact `numerator / denominator` pair.
fn ratio(price: Decimal) -> Option<(U256, U256)> {
    let mantissa = u128::try_from(price.mantissa()).ok()?;
    if mantissa == 0 {
        return None;
    }
    Some((U256::from(mantissa), U256::from(10u64).pow(U256::from(price.scale()))))
}

#[derive(Debug, Clone)]
struct Gen2Spec {
    symbol: String,
    fee: u32,
    /// Tokens per one native
    price: Decimal,
    liquidity: u128,
}

#[derive(Debug, Clone)]
pub struct MarketBuilder {
    weth: Address,
    timestamp: u64,
    tokens: Vec<(String, Address)>,
    gen1_pairs: Vec<(String, U256, U256)>,
    gen2_pools: Vec<Gen2Spec>,
    vault_pool: Option<(Vec<String>, Vec<u32>)>,
}

impl Default for MarketBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MarketBuilder {
    pub fn new() -> Self {
        Self {
            weth: Address::repeat_byte(0x10),
            timestamp: 1_700_000_000,
            tokens: vec![("WETH".to_string(), Address::repeat_byte(0x10))],
            gen1_pairs: Vec::new(),
            gen2_pools: Vec::new(),
            vault_pool: None,
        }
    }

    /// Two-asset market used across the tests:
    /// - AAA: gen1 pair at 2000/native, gen2 pool at tier A
    /// - BBB: gen2 pools at both tiers at 50/native, gen1 pair
    /// - 50/50 vault pool over [AAA, BBB]
    pub fn standard() -> Self {
        let l: u128 = 1_000_000_000_000_000_000_000_000;
        Self::new()
            .token("AAA", Address::repeat_byte(0x20))
            .token("BBB", Address::repeat_byte(0x30))
            .gen1_pair("AAA", ether(1_000), ether(2_000_000))
            .gen1_pair("BBB", ether(1_000), ether(50_000))
            .gen2_pool("AAA", 3_000, Decimal::from(2_000), l)
            .gen2_pool("BBB", 3_000, Decimal::from(50), l)
            .gen2_pool("BBB", 10_000, Decimal::from(50), l)
            .vault_pool(&["AAA", "BBB"], &[5_000, 5_000])
    }

    pub fn weth(mut self, address: Address) -> Self {
        self.weth = address;
        self.tokens.retain(|(s, _)| s != "WETH");
        self.tokens.push(("WETH".to_string(), address));
        self
    }

    pub fn timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn token(mut self, symbol: &str, address: Address) -> Self {
        self.tokens.push((symbol.to_string(), address));
        self
    }

    /// Constant-product pair of `symbol` against the wrapped native token.
    pub fn gen1_pair(mut self, symbol: &str, native_reserve: U256, token_reserve: U256) -> Self {
        self.gen1_pairs.push((symbol.to_string(), native_reserve, token_reserve));
        self
    }

    /// Sqrt-price pool of `symbol` against wrapped native at `price` tokens per native.
    pub fn gen2_pool(mut self, symbol: &str, fee: u32, price: Decimal, liquidity: u128) -> Self {
        self.gen2_pools.push(Gen2Spec {
            symbol: symbol.to_string(),
            fee,
            price,
            liquidity,
        });
        self
    }

    /// The vault pool, tokens in the vault's canonical order.
    pub fn vault_pool(mut self, symbols: &[&str], weights_bps: &[u32]) -> Self {
        self.vault_pool = Some((
            symbols.iter().map(|s| s.to_string()).collect(),
            weights_bps.to_vec(),
        ));
        self
    }

    pub fn build(self) -> Market {
        let chain = Arc::new(SimChain::new(self.weth, self.timestamp));
        let symbols: HashMap<String, Address> = self.tokens.iter().cloned().collect();
        let lookup = |symbol: &str| symbols.get(symbol).copied().unwrap_or_default();

        let gen1 = Arc::new(SimGen1Exchange::new(GEN1_ROUTER, chain.clone()));
        for (i, (symbol, native_reserve, token_reserve)) in self.gen1_pairs.iter().enumerate() {
            gen1.create_pair(
                derived_address(GEN1_PAIR_TAG, i),
                self.weth,
                lookup(symbol),
                *native_reserve,
                *token_reserve,
            );
        }

        let gen2 = Arc::new(SimGen2Exchange::new(GEN2_ROUTER, chain.clone()));
        for (i, spec) in self.gen2_pools.iter().enumerate() {
            let token = lookup(&spec.symbol);
            let Some((num, den)) = ratio(spec.price) else {
                continue;
            };
            // Pool price is token1 per token0
            let sqrt_price = if self.weth < token {
                sqrt_price_x96(num, den)
            } else {
                sqrt_price_x96(den, num)
            };
            gen2.create_pool(
                derived_address(GEN2_POOL_TAG, i),
                self.weth,
                token,
                spec.fee,
                sqrt_price,
                spec.liquidity,
            );
        }

        let pool = self.vault_pool.map(|(pool_symbols, weights_bps)| {
            let address = derived_address(VAULT_POOL_TAG, 0);
            create_weighted_pool(
                &chain,
                WeightedPool {
                    address,
                    tokens: pool_symbols.iter().map(|s| lookup(s)).collect(),
                    weights_bps,
                },
            );
            address
        });

        info!(
            "Market built: {} tokens, {} gen1 pairs, {} gen2 pools",
            symbols.len(),
            self.gen1_pairs.len(),
            self.gen2_pools.len()
        );

        Market {
            vault_a: Arc::new(SimVaultA::new(VAULT_A, chain.clone())),
            vault_b: Arc::new(SimVaultB::new(VAULT_B, chain.clone())),
            chain,
            symbols,
            gen1,
            gen2,
            pool,
        }
    }
}

/// A built market and handles to its venues.
pub struct Market {
    pub chain: Arc<SimChain>,
    symbols: HashMap<String, Address>,
    gen1: Arc<SimGen1Exchange>,
    gen2: Arc<SimGen2Exchange>,
    vault_a: Arc<SimVaultA>,
    vault_b: Arc<SimVaultB>,
    pool: Option<Address>,
}

impl Market {
    pub fn weth(&self) -> Address {
        self.chain.weth()
    }

    /// Token address by symbol; zero address if unknown
    pub fn token(&self, symbol: &str) -> Address {
        self.symbols.get(symbol).copied().unwrap_or_default()
    }

    pub fn symbol_of(&self, token: Address) -> Option<&str> {
        self.symbols
            .iter()
            .find(|(_, a)| **a == token)
            .map(|(s, _)| s.as_str())
    }

    pub fn tokens(&self) -> Arc<dyn TokenLedger> {
        self.chain.clone()
    }

    pub fn gen1(&self) -> Arc<dyn PairwiseGen1Exchange> {
        self.gen1.clone()
    }

    pub fn gen1_sim(&self) -> Arc<SimGen1Exchange> {
        self.gen1.clone()
    }

    pub fn gen2(&self) -> Arc<dyn PairwiseGen2Exchange> {
        self.gen2.clone()
    }

    pub fn gen2_address(&self) -> Address {
        GEN2_ROUTER
    }

    pub fn vault_a(&self) -> Arc<dyn VaultA> {
        self.vault_a.clone()
    }

    pub fn vault_b(&self) -> Arc<dyn VaultB> {
        self.vault_b.clone()
    }

    /// Vault pool address (also its pool token); zero if the market has none
    pub fn pool_address(&self) -> Address {
        self.pool.unwrap_or_default()
    }

    pub fn pool_id(&self) -> B256 {
        self.pool_address().into_word()
    }

    pub fn router_for(&self, account: Address) -> SwapRouter {
        SwapRouter::new(
            account,
            self.weth(),
            self.tokens(),
            self.chain.clone(),
            Some(self.gen1()),
            Some(self.gen2()),
        )
    }

    pub fn vault_handle(&self, generation: VaultGeneration) -> VaultHandle {
        match generation {
            VaultGeneration::A => VaultHandle::A {
                vault: self.vault_a(),
                pool_id: self.pool_id(),
            },
            VaultGeneration::B => VaultHandle::B {
                vault: self.vault_b(),
                pool: self.pool_address(),
            },
        }
    }

    pub fn vault_config(&self, generation: VaultGeneration) -> VaultConfig {
        match generation {
            VaultGeneration::A => VaultConfig::generation_a(VAULT_A, self.pool_id()),
            VaultGeneration::B => VaultConfig::generation_b(VAULT_B, self.pool_address()),
        }
    }

    /// Every collaborator, targeting the vault of `generation`.
    pub fn venues(&self, generation: VaultGeneration) -> Venues {
        Venues {
            tokens: self.tokens(),
            native: self.chain.clone(),
            chain: self.chain.clone(),
            gen1: Some(self.gen1()),
            gen2: Some(self.gen2()),
            vault: self.vault_handle(generation),
        }
    }

    /// Fund config over this market's exchanges and vault pool.
    pub fn fund_config(
        &self,
        generation: VaultGeneration,
        fund: Address,
        authority: Address,
        fee_recipient: Address,
        assets: Vec<UnderlyingAsset>,
    ) -> FundConfig {
        let mut config = FundConfig::new(
            fund,
            self.weth(),
            authority,
            fee_recipient,
            self.vault_config(generation),
            assets,
        );
        config.gen1_exchange = Some(GEN1_ROUTER);
        config.gen2_exchange = Some(GEN2_ROUTER);
        config
    }

    /// AAA through gen1, BBB through gen2 tier A, equal weights.
    pub fn standard_assets(&self) -> Vec<UnderlyingAsset> {
        vec![
            UnderlyingAsset::new(self.token("AAA"), "AAA", BackendSelector::PairwiseGen1).with_weight(5_000),
            UnderlyingAsset::new(self.token("BBB"), "BBB", BackendSelector::PairwiseGen2TierA).with_weight(5_000),
        ]
    }
}
