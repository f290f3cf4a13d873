//! Generation-2 pairwise exchange (sqrt-price pools)
//!
//! Each pool is a single full-range liquidity position: price moves along
//! the sqrtPriceX96 curve with constant L and never crosses a tick boundary.
//! Exact within that model (SqrtPriceMath), which is all the fund needs.
//!
//! The pool address is seeded with the virtual reserves L/sqrtP and L*sqrtP
//! so payouts come out of real balances.

use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use super::{isqrt, ChainState, SimChain};
use crate::contracts::ExactInputSingleParams;
use crate::error::BackendError;
use crate::interfaces::{BackendResult, Gen2Slot0, PairwiseGen2Exchange};

/// Fee denominator for gen2 fee tiers (millionths)
const FEE_UNITS: u32 = 1_000_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Gen2Pool {
    pub address: Address,
    pub token0: Address,
    pub token1: Address,
    pub fee: u32,
    pub sqrt_price_x96: U256,
    pub liquidity: u128,
}

impl Gen2Pool {
    pub fn tick(&self) -> i32 {
        tick_from_sqrt_price_x96(self.sqrt_price_x96)
    }

    /// Output for an exact input, and the post-swap sqrt price.
    pub fn simulate(&self, amount_in: U256, zero_for_one: bool) -> BackendResult<(U256, U256)> {
        if amount_in.is_zero() || self.liquidity == 0 {
            return Err(BackendError::Reverted("no input or no liquidity".to_string()));
        }

        let amount_after_fee = amount_in
            .checked_mul(U256::from(FEE_UNITS - self.fee))
            .ok_or(BackendError::Overflow("gen2 fee"))?
            / U256::from(FEE_UNITS);

        let liquidity = U256::from(self.liquidity);
        let current = self.sqrt_price_x96;

        if zero_for_one {
            let next = next_sqrt_price_from_amount0(current, self.liquidity, amount_after_fee)
                .ok_or(BackendError::Overflow("gen2 sqrt price"))?;
            // amount1 = L * (sqrtP - sqrtP') / Q96
            let out: U256 = liquidity
                .checked_mul(current - next)
                .ok_or(BackendError::Overflow("gen2 amount1"))?
                >> 96usize;
            Ok((out, next))
        } else {
            let next = next_sqrt_price_from_amount1(current, self.liquidity, amount_after_fee)
                .ok_or(BackendError::Overflow("gen2 sqrt price"))?;
            // amount0 = (L << 96) / sqrtP - (L << 96) / sqrtP'
            let numerator: U256 = liquidity << 96usize;
            let out = numerator / current - numerator / next;
            Ok((out, next))
        }
    }
}

/// sqrtPriceX96 for a price of `numerator / denominator` token1 per token0.
pub fn sqrt_price_x96(numerator: U256, denominator: U256) -> U256 {
    let scaled: U256 = numerator << 192usize;
    isqrt(scaled / denominator)
}

/// getNextSqrtPriceFromAmount0RoundingUp: adding token0 lowers the price.
fn next_sqrt_price_from_amount0(sqrt_price_x96: U256, liquidity: u128, amount: U256) -> Option<U256> {
    if amount.is_zero() {
        return Some(sqrt_price_x96);
    }
    if sqrt_price_x96.is_zero() {
        return None;
    }

    let numerator1: U256 = U256::from(liquidity) << 96usize;

    // Precise form: ceil(numerator1 * sqrtP / (numerator1 + amount * sqrtP))
    if let Some(product) = amount.checked_mul(sqrt_price_x96) {
        if let Some(denominator) = numerator1.checked_add(product) {
            if let Some(full) = numerator1.checked_mul(sqrt_price_x96) {
                return Some((full + denominator - U256::from(1u8)) / denominator);
            }
        }
    }

    // Fallback: ceil(numerator1 / (numerator1 / sqrtP + amount))
    let denominator = (numerator1 / sqrt_price_x96).checked_add(amount)?;
    Some((numerator1 + denominator - U256::from(1u8)) / denominator)
}

/// getNextSqrtPriceFromAmount1RoundingDown: adding token1 raises the price.
fn next_sqrt_price_from_amount1(sqrt_price_x96: U256, liquidity: u128, amount: U256) -> Option<U256> {
    let q96: U256 = U256::from(1u8) << 96usize;
    let quotient = amount.checked_mul(q96)? / U256::from(liquidity);
    sqrt_price_x96.checked_add(quotient)
}

/// tick = floor(2 * ln(sqrtP / 2^96) / ln(1.0001)), f64 approximation
fn tick_from_sqrt_price_x96(sqrt_price_x96: U256) -> i32 {
    let shifted: U256 = sqrt_price_x96 >> 32usize;
    let sqrt_price: f64 = shifted.saturating_to::<u128>() as f64 / 2.0_f64.powi(64);
    if sqrt_price <= 0.0 {
        return i32::MIN;
    }
    (2.0 * sqrt_price.ln() / 1.0001_f64.ln()).floor() as i32
}

/// Router + factory facade over the chain's generation-2 pools.
pub struct SimGen2Exchange {
    address: Address,
    chain: Arc<SimChain>,
}

impl SimGen2Exchange {
    pub fn new(address: Address, chain: Arc<SimChain>) -> Self {
        Self { address, chain }
    }

    /// Register a pool at `sqrt_price_x96` (token1 per token0) and seed its virtual reserves.
    pub fn create_pool(
        &self,
        pool: Address,
        token_a: Address,
        token_b: Address,
        fee: u32,
        sqrt_price_x96: U256,
        liquidity: u128,
    ) {
        let (token0, token1) = if token_a < token_b { (token_a, token_b) } else { (token_b, token_a) };
        let l = U256::from(liquidity);
        let scaled_l: U256 = l << 96usize;
        let reserve0 = scaled_l / sqrt_price_x96;
        let reserve1: U256 = (l * sqrt_price_x96) >> 96usize;

        let result = self.chain.transact(|s| {
            s.gen2_pools.insert(
                pool,
                Gen2Pool {
                    address: pool,
                    token0,
                    token1,
                    fee,
                    sqrt_price_x96,
                    liquidity,
                },
            );
            s.gen2_index.insert((token0, token1, fee), pool);
            s.mint(token0, pool, reserve0)?;
            s.mint(token1, pool, reserve1)
        });
        if let Err(e) = result {
            warn!("Gen2 pool {} not seeded: {}", pool, e);
        }
    }

    pub fn pool_state(&self, pool: Address) -> Option<Gen2Pool> {
        self.chain.read(|s| s.gen2_pools.get(&pool).cloned())
    }
}

impl ChainState {
    fn gen2_lookup(&self, a: Address, b: Address, fee: u32) -> Option<Address> {
        let key = if a < b { (a, b, fee) } else { (b, a, fee) };
        self.gen2_index.get(&key).copied()
    }
}

#[async_trait]
impl PairwiseGen2Exchange for SimGen2Exchange {
    fn address(&self) -> Address {
        self.address
    }

    async fn get_pool(&self, token_a: Address, token_b: Address, fee: u32) -> BackendResult<Option<Address>> {
        Ok(self.chain.read(|s| s.gen2_lookup(token_a, token_b, fee)))
    }

    async fn slot0(&self, pool: Address) -> BackendResult<Gen2Slot0> {
        let state = self
            .pool_state(pool)
            .ok_or_else(|| BackendError::UnknownPool(pool.to_string()))?;
        Ok(Gen2Slot0 {
            sqrt_price_x96: state.sqrt_price_x96,
            tick: state.tick(),
            token0: state.token0,
            token1: state.token1,
        })
    }

    async fn exact_input_single(
        &self,
        sender: Address,
        value: U256,
        params: ExactInputSingleParams,
    ) -> BackendResult<U256> {
        let weth = self.chain.weth();
        let router = self.address;
        let fee = params.fee.to::<u32>();
        let token_in = params.tokenIn;
        let token_out = params.tokenOut;
        let amount_in = params.amountIn;
        let minimum = params.amountOutMinimum;
        let recipient = params.recipient;

        let out = self.chain.transact(|s| {
            let address = s
                .gen2_lookup(token_in, token_out, fee)
                .ok_or_else(|| BackendError::UnknownPool(format!("gen2 {}/{} fee {}", token_in, token_out, fee)))?;
            let pool = s
                .gen2_pools
                .get(&address)
                .cloned()
                .ok_or_else(|| BackendError::UnknownPool(address.to_string()))?;

            let zero_for_one = token_in == pool.token0;
            let (out, next) = pool.simulate(amount_in, zero_for_one)?;
            if out < minimum {
                return Err(BackendError::InsufficientOutput { minimum, actual: out });
            }

            if value.is_zero() {
                s.transfer_from(token_in, router, sender, address, amount_in)?;
            } else {
                if token_in != weth || value != amount_in {
                    return Err(BackendError::Reverted(
                        "native value requires wrapped tokenIn and value == amountIn".to_string(),
                    ));
                }
                s.wrap_into(weth, sender, address, amount_in)?;
            }
            s.transfer(token_out, address, recipient, out)?;

            if let Some(p) = s.gen2_pools.get_mut(&address) {
                p.sqrt_price_x96 = next;
            }
            Ok(out)
        })?;

        debug!("Gen2 pool swap {} {} -> {} {} (fee {})", amount_in, token_in, out, token_out, fee);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q96() -> U256 {
        U256::from(1u8) << 96usize
    }

    fn pool(price: u64) -> Gen2Pool {
        Gen2Pool {
            address: Address::repeat_byte(0xC2),
            token0: Address::repeat_byte(0x10),
            token1: Address::repeat_byte(0x30),
            fee: 3000,
            sqrt_price_x96: sqrt_price_x96(U256::from(price), U256::from(1u8)),
            liquidity: 1_000_000_000_000_000_000_000_000,
        }
    }

    #[test]
    fn test_sqrt_price_of_perfect_square() {
        assert_eq!(sqrt_price_x96(U256::from(4u8), U256::from(1u8)), U256::from(2u8) * q96());
        assert_eq!(sqrt_price_x96(U256::from(1u8), U256::from(1u8)), q96());
    }

    #[test]
    fn test_tick_at_unit_price() {
        assert_eq!(tick_from_sqrt_price_x96(q96()), 0);
        assert!(tick_from_sqrt_price_x96(q96() * U256::from(2u8)) > 0);
    }

    #[test]
    fn test_tick_saturates_above_u160_price() {
        assert!(tick_from_sqrt_price_x96(U256::MAX) > 0);

        // A huge token1 input drives sqrtPriceX96 past 2^160
        let mut p = pool(50);
        let (_, next) = p.simulate(U256::from(1u8) << 150usize, false).unwrap();
        assert!(next > U256::from(1u8) << 160usize);
        p.sqrt_price_x96 = next;
        assert!(p.tick() > 0);
    }

    #[test]
    fn test_zero_for_one_lowers_price() {
        let p = pool(50);
        let one = U256::from(10u64).pow(U256::from(18));
        let (out, next) = p.simulate(one, true).unwrap();
        assert!(next < p.sqrt_price_x96);
        // Just under 50 token1 after the 0.3% fee
        assert!(out < U256::from(50u64) * one);
        assert!(out > U256::from(49u64) * one);
    }

    #[test]
    fn test_one_for_zero_raises_price() {
        let p = pool(50);
        let one = U256::from(10u64).pow(U256::from(18));
        let (out, next) = p.simulate(U256::from(50u64) * one, false).unwrap();
        assert!(next > p.sqrt_price_x96);
        assert!(out < one);
        assert!(out > one * U256::from(99u64) / U256::from(100u64));
    }
}
