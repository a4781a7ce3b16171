//! Simulation Host
//!
//! An in-memory chain for exercising the engines end to end:
//!
//! - **Token ledger** with balances and allowances
//! - **Lending pool** with per-asset risk configuration, speaking both the
//!   [`DelegatedPool`] and the [`SessionPool`] dialect
//! - **Constant-product exchange** with a swap fee kept in the pool
//! - **Price feed** the tests move at will, optionally after a number of swaps
//!
//! The whole state is `Clone`, which is what [`Checkpoint`] hands out.
//! This is a fixture, not a market model: interest, liquidations and
//! oracle staleness are out of scope.

use std::collections::BTreeMap;

use leverloop_common::{
    constants::{bps, health},
    errors::{LoopError, LoopResult},
    market::{Checkpoint, Exchange, PriceSource, TokenLedger},
    math::{discount_bps, mul_div, mul_div_ceil, safe_add, safe_sub, to_native, to_value, to_value_ceil},
    types::{AccountHealth, Address, AssetConfig, AssetId},
};

use crate::adapters::{DelegatedPool, SessionPool};

// ============================================================================
// Reference Fixture
// ============================================================================

/// Wrapped ether, 18 decimals
pub const WETH: AssetId = [0x11; 32];
/// USD coin, 6 decimals
pub const USDC: AssetId = [0x22; 32];
/// Wrapped bitcoin, 8 decimals
pub const WBTC: AssetId = [0x33; 32];
/// Listed but neither collateral nor borrowable, and without a pool
pub const MEME: AssetId = [0x44; 32];

pub const ONE_ETH: u128 = 1_000_000_000_000_000_000;
pub const ONE_USDC: u128 = 1_000_000;
pub const ONE_BTC: u128 = 100_000_000;

/// $2,000
pub const ETH_PRICE: u128 = 2_000_00000000;
/// $1
pub const USDC_PRICE: u128 = 1_00000000;
/// $60,000
pub const BTC_PRICE: u128 = 60_000_00000000;

/// Account holding the lending pool's tokens
pub const MARKET: Address = [0xfa; 32];
/// Account holding the exchange's reserves
pub const AMM: Address = [0xfb; 32];

/// Default swap fee (0.3%)
pub const DEFAULT_SWAP_FEE_BPS: u64 = 30;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Pool {
    /// Reserve of the lower-sorted asset
    reserve_low: u128,
    /// Reserve of the higher-sorted asset
    reserve_high: u128,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ScheduledPrice {
    asset: AssetId,
    after_swaps: u32,
    price: u128,
}

/// In-memory host state
#[derive(Debug, Clone, Default)]
pub struct SimChain {
    balances: BTreeMap<(AssetId, Address), u128>,
    allowances: BTreeMap<(AssetId, Address, Address), u128>,
    configs: BTreeMap<AssetId, AssetConfig>,
    prices: BTreeMap<AssetId, u128>,
    supplied: BTreeMap<(AssetId, Address), u128>,
    owed: BTreeMap<(AssetId, Address), u128>,
    pools: BTreeMap<(AssetId, AssetId), Pool>,
    swap_fee_bps: u64,
    swap_haircut_bps: u64,
    scheduled: Vec<ScheduledPrice>,
    swaps: u32,
}

fn pair_key(a: AssetId, b: AssetId) -> (AssetId, AssetId) {
    if a <= b { (a, b) } else { (b, a) }
}

// ============================================================================
// Setup
// ============================================================================

impl SimChain {
    /// Empty chain with the given swap fee
    pub fn new(swap_fee_bps: u64) -> Self {
        Self {
            swap_fee_bps,
            ..Self::default()
        }
    }

    /// WETH/USDC/WBTC market with deep pools and lendable cash
    pub fn reference() -> Self {
        let mut chain = Self::new(DEFAULT_SWAP_FEE_BPS);

        chain.list_asset(
            WETH,
            AssetConfig {
                decimals: 18,
                ltv_bps: 8_000,
                liquidation_threshold_bps: 8_250,
                collateral_enabled: true,
                borrow_enabled: true,
            },
            ETH_PRICE,
        );
        chain.list_asset(
            USDC,
            AssetConfig {
                decimals: 6,
                ltv_bps: 8_000,
                liquidation_threshold_bps: 8_500,
                collateral_enabled: true,
                borrow_enabled: true,
            },
            USDC_PRICE,
        );
        chain.list_asset(
            WBTC,
            AssetConfig {
                decimals: 8,
                ltv_bps: 7_000,
                liquidation_threshold_bps: 7_500,
                collateral_enabled: true,
                borrow_enabled: true,
            },
            BTC_PRICE,
        );
        chain.list_asset(
            MEME,
            AssetConfig {
                decimals: 18,
                ltv_bps: 0,
                liquidation_threshold_bps: 0,
                collateral_enabled: false,
                borrow_enabled: false,
            },
            50_000_000, // $0.50
        );

        chain.add_pool(WETH, USDC, 1_000 * ONE_ETH, 2_000_000 * ONE_USDC);
        chain.add_pool(WBTC, USDC, 100 * ONE_BTC, 6_000_000 * ONE_USDC);

        chain.mint(USDC, MARKET, 10_000_000 * ONE_USDC);
        chain.mint(WETH, MARKET, 1_000 * ONE_ETH);
        chain.mint(WBTC, MARKET, 100 * ONE_BTC);
        chain
    }

    pub fn list_asset(&mut self, asset: AssetId, config: AssetConfig, price: u128) {
        self.configs.insert(asset, config);
        self.prices.insert(asset, price);
    }

    pub fn set_price(&mut self, asset: AssetId, price: u128) {
        self.prices.insert(asset, price);
    }

    /// Set `asset`'s price once `after_swaps` more swaps have executed
    pub fn schedule_price(&mut self, asset: AssetId, after_swaps: u32, price: u128) {
        self.scheduled.push(ScheduledPrice {
            asset,
            after_swaps: self.swaps + after_swaps,
            price,
        });
    }

    /// Deliver this much less than quoted on every swap (simulated sandwich)
    pub fn set_swap_haircut_bps(&mut self, haircut_bps: u64) {
        self.swap_haircut_bps = haircut_bps;
    }

    pub fn mint(&mut self, asset: AssetId, to: Address, amount: u128) {
        *self.balances.entry((asset, to)).or_default() += amount;
    }

    /// Create a constant-product pool funded by newly minted reserves
    pub fn add_pool(&mut self, a: AssetId, b: AssetId, reserve_a: u128, reserve_b: u128) {
        self.mint(a, AMM, reserve_a);
        self.mint(b, AMM, reserve_b);
        let pool = if a <= b {
            Pool { reserve_low: reserve_a, reserve_high: reserve_b }
        } else {
            Pool { reserve_low: reserve_b, reserve_high: reserve_a }
        };
        self.pools.insert(pair_key(a, b), pool);
    }

    /// Move `asset`'s price and arbitrage its pool against `quote` to match.
    ///
    /// The `asset` reserve is kept; the `quote` reserve is minted or burned
    /// on the exchange account until the pool's spot price equals the feed.
    pub fn reprice(&mut self, asset: AssetId, quote: AssetId, price: u128) -> LoopResult<()> {
        self.set_price(asset, price);
        let (reserve_asset, reserve_quote) = self.reserves(asset, quote)?;
        let value = to_value(reserve_asset, self.config(asset)?.decimals, price)?;
        let target = to_native(value, self.config(quote)?.decimals, self.price(quote)?)?;

        let held = self.balances.entry((quote, AMM)).or_default();
        *held = if target >= reserve_quote {
            safe_add(*held, target - reserve_quote)?
        } else {
            safe_sub(*held, reserve_quote - target)?
        };
        self.set_reserves(asset, quote, reserve_asset, target);
        Ok(())
    }

    /// Swaps executed so far
    pub fn swaps_executed(&self) -> u32 {
        self.swaps
    }

    /// Reserves of a pool as (reserve of `asset_in`, reserve of `asset_out`)
    pub fn reserves(&self, asset_in: AssetId, asset_out: AssetId) -> LoopResult<(u128, u128)> {
        let pool = self
            .pools
            .get(&pair_key(asset_in, asset_out))
            .ok_or(LoopError::NoConversionPath { asset_in, asset_out })?;
        Ok(if asset_in <= asset_out {
            (pool.reserve_low, pool.reserve_high)
        } else {
            (pool.reserve_high, pool.reserve_low)
        })
    }

    fn set_reserves(&mut self, asset_in: AssetId, asset_out: AssetId, reserve_in: u128, reserve_out: u128) {
        let pool = if asset_in <= asset_out {
            Pool { reserve_low: reserve_in, reserve_high: reserve_out }
        } else {
            Pool { reserve_low: reserve_out, reserve_high: reserve_in }
        };
        self.pools.insert(pair_key(asset_in, asset_out), pool);
    }

    fn config(&self, asset: AssetId) -> LoopResult<AssetConfig> {
        self.configs
            .get(&asset)
            .copied()
            .ok_or(LoopError::AssetNotConfigured { asset })
    }

    fn supplied_of(&self, asset: AssetId, account: Address) -> u128 {
        self.supplied.get(&(asset, account)).copied().unwrap_or(0)
    }

    fn owed_of(&self, asset: AssetId, account: Address) -> u128 {
        self.owed.get(&(asset, account)).copied().unwrap_or(0)
    }

    fn move_tokens(&mut self, asset: AssetId, from: Address, to: Address, amount: u128) -> LoopResult<()> {
        let available = self.balance_of(asset, from);
        if available < amount {
            return Err(LoopError::InsufficientBalance { available, requested: amount });
        }
        if amount == 0 || from == to {
            return Ok(());
        }
        self.balances.insert((asset, from), available - amount);
        *self.balances.entry((asset, to)).or_default() += amount;
        Ok(())
    }

    fn apply_scheduled_prices(&mut self) {
        let swaps = self.swaps;
        let (due, pending): (Vec<_>, Vec<_>) = self
            .scheduled
            .drain(..)
            .partition(|s| s.after_swaps <= swaps);
        self.scheduled = pending;
        for s in due {
            self.prices.insert(s.asset, s.price);
        }
    }

    // ============ Lending ============

    fn health(&self, account: Address) -> LoopResult<AccountHealth> {
        self.assess(account).map(|(health, _)| health)
    }

    /// Account health plus the LTV-weighted borrow capacity (canonical value)
    fn assess(&self, account: Address) -> LoopResult<(AccountHealth, u128)> {
        let mut collateral_value = 0u128;
        let mut weighted_lt = 0u128;
        let mut weighted_ltv = 0u128;
        let mut debt_value = 0u128;

        for (&(asset, holder), &amount) in &self.supplied {
            if holder != account || amount == 0 {
                continue;
            }
            let config = self.config(asset)?;
            let value = to_value(amount, config.decimals, self.price(asset)?)?;
            collateral_value = safe_add(collateral_value, value)?;
            weighted_lt = safe_add(weighted_lt, value * config.liquidation_threshold_bps as u128)?;
            weighted_ltv = safe_add(weighted_ltv, value * config.ltv_bps as u128)?;
        }
        for (&(asset, holder), &amount) in &self.owed {
            if holder != account || amount == 0 {
                continue;
            }
            let config = self.config(asset)?;
            debt_value = safe_add(debt_value, to_value_ceil(amount, config.decimals, self.price(asset)?)?)?;
        }

        let borrow_capacity = weighted_ltv / bps::DENOMINATOR as u128;
        let (liquidation_threshold_bps, ltv_bps) = if collateral_value == 0 {
            (0, 0)
        } else {
            (
                (weighted_lt / collateral_value) as u64,
                (weighted_ltv / collateral_value) as u64,
            )
        };
        let health_factor_bps = if debt_value == 0 {
            health::NO_DEBT_HEALTH_FACTOR
        } else {
            (weighted_lt / debt_value).min(u64::MAX as u128) as u64
        };

        let health = AccountHealth {
            collateral_value,
            debt_value,
            available_borrow_value: borrow_capacity.saturating_sub(debt_value),
            liquidation_threshold_bps,
            ltv_bps,
            health_factor_bps,
        };
        Ok((health, borrow_capacity))
    }
}

// ============================================================================
// Token Ledger
// ============================================================================

impl TokenLedger for SimChain {
    fn balance_of(&self, asset: AssetId, holder: Address) -> u128 {
        self.balances.get(&(asset, holder)).copied().unwrap_or(0)
    }

    fn allowance(&self, asset: AssetId, owner: Address, spender: Address) -> u128 {
        self.allowances.get(&(asset, owner, spender)).copied().unwrap_or(0)
    }

    fn approve(&mut self, asset: AssetId, owner: Address, spender: Address, amount: u128) -> LoopResult<()> {
        self.allowances.insert((asset, owner, spender), amount);
        Ok(())
    }

    fn transfer(&mut self, asset: AssetId, from: Address, to: Address, amount: u128) -> LoopResult<()> {
        self.move_tokens(asset, from, to, amount)
    }

    fn transfer_from(
        &mut self,
        asset: AssetId,
        spender: Address,
        from: Address,
        to: Address,
        amount: u128,
    ) -> LoopResult<()> {
        if spender != from {
            let allowed = self.allowance(asset, from, spender);
            if allowed < amount {
                return Err(LoopError::InsufficientAllowance { allowed, requested: amount });
            }
            self.move_tokens(asset, from, to, amount)?;
            self.allowances.insert((asset, from, spender), allowed - amount);
            return Ok(());
        }
        self.move_tokens(asset, from, to, amount)
    }
}

// ============================================================================
// Price Feed
// ============================================================================

impl PriceSource for SimChain {
    fn price(&self, asset: AssetId) -> LoopResult<u128> {
        match self.prices.get(&asset) {
            Some(&price) if price > 0 => Ok(price),
            _ => Err(LoopError::PriceUnavailable { asset }),
        }
    }
}

// ============================================================================
// Exchange
// ============================================================================

impl Exchange for SimChain {
    fn quote_out(&self, asset_in: AssetId, asset_out: AssetId, amount_in: u128) -> LoopResult<u128> {
        let (reserve_in, reserve_out) = self.reserves(asset_in, asset_out)?;
        if amount_in == 0 {
            return Ok(0);
        }
        let effective_in = discount_bps(amount_in, self.swap_fee_bps)?;
        mul_div(reserve_out, effective_in, safe_add(reserve_in, effective_in)?)
    }

    fn quote_in(&self, asset_in: AssetId, asset_out: AssetId, amount_out: u128) -> LoopResult<u128> {
        let (reserve_in, reserve_out) = self.reserves(asset_in, asset_out)?;
        if amount_out == 0 {
            return Ok(0);
        }
        if amount_out >= reserve_out {
            return Err(LoopError::InsufficientLiquidity {
                available: reserve_out,
                requested: amount_out,
            });
        }
        let effective_in = mul_div_ceil(reserve_in, amount_out, reserve_out - amount_out)?;
        let keep = bps::DENOMINATOR - self.swap_fee_bps;
        mul_div_ceil(effective_in, bps::DENOMINATOR as u128, keep as u128)
    }

    fn swap(
        &mut self,
        asset_in: AssetId,
        asset_out: AssetId,
        amount_in: u128,
        min_out: u128,
        payer: Address,
        recipient: Address,
    ) -> LoopResult<u128> {
        let quoted = self.quote_out(asset_in, asset_out, amount_in)?;
        let delivered = discount_bps(quoted, self.swap_haircut_bps)?;
        if delivered < min_out {
            return Err(LoopError::SlippageExceeded {
                minimum_out: min_out,
                received: delivered,
            });
        }

        let (reserve_in, reserve_out) = self.reserves(asset_in, asset_out)?;
        self.move_tokens(asset_in, payer, AMM, amount_in)?;
        self.move_tokens(asset_out, AMM, recipient, delivered)?;
        self.set_reserves(asset_in, asset_out, safe_add(reserve_in, amount_in)?, safe_sub(reserve_out, delivered)?);

        self.swaps += 1;
        self.apply_scheduled_prices();
        Ok(delivered)
    }

    fn pair_exists(&self, asset_a: AssetId, asset_b: AssetId) -> bool {
        self.pools.contains_key(&pair_key(asset_a, asset_b))
    }
}

// ============================================================================
// Lending Pool
// ============================================================================

impl DelegatedPool for SimChain {
    fn deposit_for(&mut self, asset: AssetId, amount: u128, from: Address, on_behalf_of: Address) -> LoopResult<()> {
        if !self.config(asset)?.collateral_enabled {
            return Err(LoopError::AssetNotCollateral { asset });
        }
        if amount == 0 {
            return Err(LoopError::ZeroAmount);
        }
        self.move_tokens(asset, from, MARKET, amount)?;
        *self.supplied.entry((asset, on_behalf_of)).or_default() += amount;
        Ok(())
    }

    fn borrow_for(&mut self, asset: AssetId, amount: u128, on_behalf_of: Address, to: Address) -> LoopResult<()> {
        if !self.config(asset)?.borrow_enabled {
            return Err(LoopError::AssetNotBorrowable { asset });
        }
        if amount == 0 {
            return Err(LoopError::ZeroAmount);
        }
        let cash = self.balance_of(asset, MARKET);
        if cash < amount {
            return Err(LoopError::InsufficientLiquidity { available: cash, requested: amount });
        }

        let before = self.owed_of(asset, on_behalf_of);
        self.owed.insert((asset, on_behalf_of), safe_add(before, amount)?);
        let (account, borrow_capacity) = self.assess(on_behalf_of)?;
        if account.debt_value > borrow_capacity {
            self.owed.insert((asset, on_behalf_of), before);
            return Err(LoopError::WouldBeLiquidatable {
                health_factor_bps: account.health_factor_bps,
            });
        }
        self.move_tokens(asset, MARKET, to, amount)
    }

    fn withdraw_from(&mut self, asset: AssetId, amount: u128, owner: Address, to: Address) -> LoopResult<u128> {
        let held = self.supplied_of(asset, owner);
        let actual = amount.min(held);
        if actual == 0 {
            return Ok(0);
        }

        self.supplied.insert((asset, owner), held - actual);
        let account = self.health(owner)?;
        if account.health_factor_bps < health::LIQUIDATION_HEALTH_FACTOR_BPS {
            self.supplied.insert((asset, owner), held);
            return Err(LoopError::WouldBeLiquidatable {
                health_factor_bps: account.health_factor_bps,
            });
        }
        let cash = self.balance_of(asset, MARKET);
        if cash < actual {
            self.supplied.insert((asset, owner), held);
            return Err(LoopError::InsufficientLiquidity { available: cash, requested: actual });
        }
        self.move_tokens(asset, MARKET, to, actual)?;
        Ok(actual)
    }

    fn repay_for(&mut self, asset: AssetId, amount: u128, from: Address, on_behalf_of: Address) -> LoopResult<u128> {
        let owed = self.owed_of(asset, on_behalf_of);
        let actual = amount.min(owed);
        if actual == 0 {
            return Ok(0);
        }
        self.move_tokens(asset, from, MARKET, actual)?;
        self.owed.insert((asset, on_behalf_of), owed - actual);
        Ok(actual)
    }

    fn user_health(&self, account: Address) -> LoopResult<AccountHealth> {
        self.health(account)
    }

    fn reserve_liquidity(&self, asset: AssetId) -> LoopResult<u128> {
        self.config(asset)?;
        Ok(self.balance_of(asset, MARKET))
    }

    fn reserve_config(&self, asset: AssetId) -> LoopResult<AssetConfig> {
        self.config(asset)
    }

    fn supplied(&self, asset: AssetId, account: Address) -> LoopResult<u128> {
        Ok(self.supplied_of(asset, account))
    }

    fn owed(&self, asset: AssetId, account: Address) -> LoopResult<u128> {
        Ok(self.owed_of(asset, account))
    }
}

impl SessionPool for SimChain {
    fn mint_as(&mut self, caller: Address, asset: AssetId, amount: u128) -> LoopResult<()> {
        self.deposit_for(asset, amount, caller, caller)
    }

    fn borrow_as(&mut self, caller: Address, asset: AssetId, amount: u128) -> LoopResult<()> {
        self.borrow_for(asset, amount, caller, caller)
    }

    fn redeem_as(&mut self, caller: Address, asset: AssetId, amount: u128) -> LoopResult<u128> {
        self.withdraw_from(asset, amount, caller, caller)
    }

    fn repay_as(&mut self, caller: Address, asset: AssetId, amount: u128) -> LoopResult<u128> {
        self.repay_for(asset, amount, caller, caller)
    }

    fn account_liquidity(&self, account: Address) -> LoopResult<AccountHealth> {
        self.health(account)
    }

    fn cash(&self, asset: AssetId) -> LoopResult<u128> {
        self.reserve_liquidity(asset)
    }

    fn market_config(&self, asset: AssetId) -> LoopResult<AssetConfig> {
        self.config(asset)
    }

    fn supply_balance(&self, asset: AssetId, account: Address) -> LoopResult<u128> {
        Ok(self.supplied_of(asset, account))
    }

    fn borrow_balance(&self, asset: AssetId, account: Address) -> LoopResult<u128> {
        Ok(self.owed_of(asset, account))
    }
}

impl Checkpoint for SimChain {
    type Snapshot = SimChain;

    fn checkpoint(&self) -> Self::Snapshot {
        self.clone()
    }

    fn restore(&mut self, snapshot: Self::Snapshot) {
        *self = snapshot;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALICE: Address = [0xa1; 32];
    const BOB: Address = [0xb0; 32];

    #[test]
    fn test_quotes_are_consistent() {
        let chain = SimChain::reference();
        let out = chain.quote_out(USDC, WETH, 15_000 * ONE_USDC).unwrap();
        // Fee and price impact: a little under 7.5 ETH
        assert!(out < 7_500_000_000_000_000_000);
        assert!(out > 7_400_000_000_000_000_000);

        // Paying the reverse quote delivers at least the requested output
        let needed = chain.quote_in(USDC, WETH, 5 * ONE_ETH).unwrap();
        assert!(chain.quote_out(USDC, WETH, needed).unwrap() >= 5 * ONE_ETH);
        assert!(chain.quote_out(USDC, WETH, needed - 1_000).unwrap() < 5 * ONE_ETH);

        assert!(chain.quote_in(USDC, WETH, 1_000 * ONE_ETH).is_err());
        assert!(!chain.pair_exists(WETH, MEME));
    }

    #[test]
    fn test_reprice_moves_feed_and_pool_together() {
        let mut chain = SimChain::reference();
        chain.reprice(WETH, USDC, 2_200_00000000).unwrap();

        assert_eq!(chain.price(WETH).unwrap(), 2_200_00000000);
        assert_eq!(chain.reserves(WETH, USDC).unwrap(), (1_000 * ONE_ETH, 2_200_000 * ONE_USDC));
        assert_eq!(chain.balance_of(USDC, AMM), 2_200_000 * ONE_USDC);

        chain.reprice(WETH, USDC, 1_800_00000000).unwrap();
        assert_eq!(chain.reserves(WETH, USDC).unwrap(), (1_000 * ONE_ETH, 1_800_000 * ONE_USDC));
        assert_eq!(chain.balance_of(USDC, AMM), 1_800_000 * ONE_USDC);
    }

    #[test]
    fn test_swap_moves_reserves_and_fires_scheduled_price() {
        let mut chain = SimChain::reference();
        chain.mint(USDC, ALICE, 2_000 * ONE_USDC);
        chain.schedule_price(WETH, 1, 1_500_00000000);

        let got = chain.swap(USDC, WETH, 2_000 * ONE_USDC, 0, ALICE, BOB).unwrap();
        assert_eq!(chain.balance_of(WETH, BOB), got);
        assert_eq!(chain.balance_of(USDC, ALICE), 0);
        assert_eq!(chain.reserves(USDC, WETH).unwrap(), (2_002_000 * ONE_USDC, 1_000 * ONE_ETH - got));
        assert_eq!(chain.price(WETH).unwrap(), 1_500_00000000);
        assert_eq!(chain.swaps_executed(), 1);
    }

    #[test]
    fn test_swap_haircut_trips_min_out() {
        let mut chain = SimChain::reference();
        chain.mint(USDC, ALICE, 1_000 * ONE_USDC);
        chain.set_swap_haircut_bps(500);
        let quote = chain.quote_out(USDC, WETH, 1_000 * ONE_USDC).unwrap();
        let err = chain.swap(USDC, WETH, 1_000 * ONE_USDC, quote * 99 / 100, ALICE, ALICE).unwrap_err();
        assert!(matches!(err, LoopError::SlippageExceeded { .. }));
    }

    #[test]
    fn test_borrow_respects_ltv_and_withdraw_respects_health() {
        let mut chain = SimChain::reference();
        chain.mint(WETH, ALICE, ONE_ETH);
        chain.deposit_for(WETH, ONE_ETH, ALICE, ALICE).unwrap();

        // $2,000 at 80% LTV
        assert!(matches!(
            chain.borrow_for(USDC, 1_601 * ONE_USDC, ALICE, ALICE),
            Err(LoopError::WouldBeLiquidatable { .. })
        ));
        chain.borrow_for(USDC, 1_600 * ONE_USDC, ALICE, ALICE).unwrap();

        let account = chain.user_health(ALICE).unwrap();
        assert_eq!(account.collateral_value, 2_000_00000000);
        assert_eq!(account.debt_value, 1_600_00000000);
        assert_eq!(account.health_factor_bps, 10_312); // 2000 * 0.825 / 1600
        assert_eq!(account.available_borrow_value, 0);

        // Withdrawing a tenth drops HF below 1.0
        assert!(matches!(
            chain.withdraw_from(WETH, ONE_ETH / 10, ALICE, ALICE),
            Err(LoopError::WouldBeLiquidatable { .. })
        ));
        assert_eq!(chain.supplied(WETH, ALICE).unwrap(), ONE_ETH);
    }

    #[test]
    fn test_transfer_from_spends_allowance() {
        let mut chain = SimChain::reference();
        chain.mint(WETH, ALICE, ONE_ETH);
        assert!(matches!(
            chain.transfer_from(WETH, BOB, ALICE, BOB, 1),
            Err(LoopError::InsufficientAllowance { .. })
        ));

        chain.approve(WETH, ALICE, BOB, ONE_ETH).unwrap();
        chain.transfer_from(WETH, BOB, ALICE, BOB, ONE_ETH / 4).unwrap();
        assert_eq!(chain.allowance(WETH, ALICE, BOB), ONE_ETH * 3 / 4);
        assert_eq!(chain.balance_of(WETH, BOB), ONE_ETH / 4);
    }

    #[test]
    fn test_checkpoint_restores_everything() {
        let mut chain = SimChain::reference();
        let snapshot = chain.checkpoint();
        chain.mint(WETH, ALICE, ONE_ETH);
        chain.set_price(WETH, 1);
        chain.restore(snapshot);
        assert_eq!(chain.balance_of(WETH, ALICE), 0);
        assert_eq!(chain.price(WETH).unwrap(), ETH_PRICE);
    }
}
