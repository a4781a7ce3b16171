//! Collaborator Contracts
//!
//! The engines never talk to a concrete lending market, exchange or oracle.
//! They drive these traits, and a host bundles one implementation of each.
//!
//! Tokens move between accounts through the [`TokenLedger`]. Borrowed
//! tokens and withdrawn collateral land with the *operator* (the identity
//! driving the market, usually the engine); supplies and repayments are
//! taken from it.

use crate::errors::LoopResult;
use crate::types::{AccountHealth, Address, AssetConfig, AssetId};

/// Lending market capability interface
///
/// Attribution-agnostic: every call names the account the market records the
/// position under. Adapters translate to markets with other identity models.
pub trait LendingMarket {
    /// Move `amount` from the operator into the market as collateral of `beneficiary`
    fn supply(&mut self, operator: Address, asset: AssetId, amount: u128, beneficiary: Address) -> LoopResult<()>;

    /// Record `amount` of debt on `beneficiary` and pay it out to the operator
    fn borrow(&mut self, operator: Address, asset: AssetId, amount: u128, beneficiary: Address) -> LoopResult<()>;

    /// Release up to `amount` of `beneficiary` collateral to `recipient`; returns the amount released
    fn withdraw(
        &mut self,
        operator: Address,
        asset: AssetId,
        amount: u128,
        beneficiary: Address,
        recipient: Address,
    ) -> LoopResult<u128>;

    /// Repay up to `amount` of `beneficiary` debt from the operator; returns the amount repaid
    fn repay(&mut self, operator: Address, asset: AssetId, amount: u128, beneficiary: Address) -> LoopResult<u128>;

    /// Aggregate health of an account
    fn account_health(&self, account: Address) -> LoopResult<AccountHealth>;

    /// Amount of `asset` the market can still lend
    fn available_liquidity(&self, asset: AssetId) -> LoopResult<u128>;

    /// Risk configuration of `asset`
    fn asset_config(&self, asset: AssetId) -> LoopResult<AssetConfig>;

    /// Live collateral balance of `account` in `asset`
    fn collateral_balance(&self, asset: AssetId, account: Address) -> LoopResult<u128>;

    /// Live debt of `account` in `asset`
    fn debt_balance(&self, asset: AssetId, account: Address) -> LoopResult<u128>;
}

/// Exchange capability interface
pub trait Exchange {
    /// Expected output for an exact input
    fn quote_out(&self, asset_in: AssetId, asset_out: AssetId, amount_in: u128) -> LoopResult<u128>;

    /// Input required for an exact output
    fn quote_in(&self, asset_in: AssetId, asset_out: AssetId, amount_out: u128) -> LoopResult<u128>;

    /// Swap `amount_in` from `payer`, delivering at least `min_out` to `recipient`
    fn swap(
        &mut self,
        asset_in: AssetId,
        asset_out: AssetId,
        amount_in: u128,
        min_out: u128,
        payer: Address,
        recipient: Address,
    ) -> LoopResult<u128>;

    /// True if the exchange can convert between the two assets
    fn pair_exists(&self, asset_a: AssetId, asset_b: AssetId) -> bool;
}

/// Price source capability interface
pub trait PriceSource {
    /// Canonical value of one whole token; must error rather than return zero
    fn price(&self, asset: AssetId) -> LoopResult<u128>;
}

/// Fungible token ledger with the allowance idiom
pub trait TokenLedger {
    /// Balance of `holder`
    fn balance_of(&self, asset: AssetId, holder: Address) -> u128;

    /// Allowance granted by `owner` to `spender`
    fn allowance(&self, asset: AssetId, owner: Address, spender: Address) -> u128;

    /// Set the allowance of `spender` over `owner` funds
    fn approve(&mut self, asset: AssetId, owner: Address, spender: Address, amount: u128) -> LoopResult<()>;

    /// Move `amount` from `from` to `to`
    fn transfer(&mut self, asset: AssetId, from: Address, to: Address, amount: u128) -> LoopResult<()>;

    /// Move `amount` from `from` to `to`, spending `spender`'s allowance
    fn transfer_from(
        &mut self,
        asset: AssetId,
        spender: Address,
        from: Address,
        to: Address,
        amount: u128,
    ) -> LoopResult<()>;
}

/// Snapshot and restore of host state
///
/// Engines take a checkpoint before their first effect and restore it when
/// any later step fails, so an invocation either commits fully or not at all.
pub trait Checkpoint {
    /// Opaque saved state
    type Snapshot;

    /// Capture current state
    fn checkpoint(&self) -> Self::Snapshot;

    /// Return to a captured state
    fn restore(&mut self, snapshot: Self::Snapshot);
}

/// Everything an engine needs from its environment
pub trait Host: LendingMarket + Exchange + PriceSource + TokenLedger + Checkpoint {}

impl<T> Host for T where T: LendingMarket + Exchange + PriceSource + TokenLedger + Checkpoint {}
