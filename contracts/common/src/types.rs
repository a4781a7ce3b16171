//! Core Types for leverloop
//!
//! Positions, orders, loop caches and the records the engines hand back.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::Vec;

/// Type alias for account identities (32-byte hash)
pub type Address = [u8; 32];

/// Type alias for asset identifiers
pub type AssetId = [u8; 32];

/// Type alias for position identifiers
pub type PositionId = [u8; 32];

/// Type alias for order identifiers
pub type OrderId = [u8; 32];

// ============ Amounts ============

/// Explicit amount or "everything currently owed/held"
///
/// `All` is resolved against live balances when an operation runs, never
/// against a cached figure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub enum AmountOrAll {
    /// A specific native amount
    Amount(u128),
    /// The whole live balance
    All,
}

impl AmountOrAll {
    /// Resolve against the live balance, clamping explicit amounts to it
    pub fn resolve(&self, live: u128) -> u128 {
        match self {
            Self::Amount(amount) => (*amount).min(live),
            Self::All => live,
        }
    }

    /// True for `Amount(0)`
    pub fn is_zero(&self) -> bool {
        matches!(self, Self::Amount(0))
    }
}

// ============ Market Views ============

/// Per-asset risk configuration reported by the lending market
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct AssetConfig {
    /// Native decimal precision
    pub decimals: u8,
    /// Loan-to-value limit in basis points
    pub ltv_bps: u64,
    /// Liquidation threshold in basis points
    pub liquidation_threshold_bps: u64,
    /// Whether the asset counts as collateral
    pub collateral_enabled: bool,
    /// Whether the asset can be borrowed
    pub borrow_enabled: bool,
}

/// Aggregate account health reported by the lending market
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct AccountHealth {
    /// Total collateral value (canonical)
    pub collateral_value: u128,
    /// Total debt value (canonical)
    pub debt_value: u128,
    /// Value that may still be borrowed under the LTV limit
    pub available_borrow_value: u128,
    /// Weighted liquidation threshold in basis points
    pub liquidation_threshold_bps: u64,
    /// Weighted loan-to-value in basis points
    pub ltv_bps: u64,
    /// Health factor in basis points (`u64::MAX` without debt)
    pub health_factor_bps: u64,
}

// ============ Triggers ============

/// Which side of the trigger price fires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub enum TriggerDirection {
    /// Fires when spot >= trigger price
    AtOrAbove,
    /// Fires when spot <= trigger price
    AtOrBelow,
}

/// A price condition on the collateral asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct Trigger {
    /// Trigger price (canonical value per whole token)
    pub price: u128,
    /// Side that fires
    pub direction: TriggerDirection,
}

impl Trigger {
    /// Create a trigger
    pub fn new(price: u128, direction: TriggerDirection) -> Self {
        Self { price, direction }
    }

    /// Check the condition against the current spot price
    pub fn is_met(&self, spot: u128) -> bool {
        match self.direction {
            TriggerDirection::AtOrAbove => spot >= self.price,
            TriggerDirection::AtOrBelow => spot <= self.price,
        }
    }
}

// ============ Positions & Orders ============

/// Lifecycle status of a position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub enum PositionStatus {
    /// Margin escrowed, waiting for the entry trigger
    #[default]
    Pending,
    /// Leverage loop executed
    Active,
    /// Unwound by trigger or manual close
    Closed,
    /// Cancelled before activation, escrow returned
    Cancelled,
}

/// A leveraged position tracked by the order layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct Position {
    /// Unique identifier
    pub id: PositionId,
    /// Logical owner
    pub owner: Address,
    /// Account the lending market records the position under
    pub custody_key: Address,
    /// Collateral asset (A)
    pub collateral_asset: AssetId,
    /// Debt asset (B)
    pub debt_asset: AssetId,
    /// Escrowed margin in native collateral units
    pub margin: u128,
    /// Collateral held after the loop (native)
    pub collateral: u128,
    /// Debt owed after the loop (native)
    pub debt: u128,
    /// Target leverage in basis points
    pub target_leverage_bps: u64,
    /// Caller's minimum health factor in basis points
    pub min_health_factor_bps: u64,
    /// Maximum slippage tolerance in basis points
    pub max_slippage_bps: u64,
    /// Loop iterations executed
    pub loops: u8,
    /// Lifecycle status
    pub status: PositionStatus,
    /// Sequence number at creation
    pub created_at: u64,
    /// Sequence number of the last change
    pub updated_at: u64,
}

impl Position {
    /// True while the position can still be activated or cancelled
    pub fn is_pending(&self) -> bool {
        self.status == PositionStatus::Pending
    }

    /// True once the loop has executed and the position is open
    pub fn is_active(&self) -> bool {
        self.status == PositionStatus::Active
    }
}

/// Purpose of an order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub enum OrderKind {
    /// Opens the position
    Entry,
    /// Closes the position in profit
    TakeProfit,
    /// Closes the position to cap losses
    StopLoss,
}

/// A price-triggered instruction against a position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct Order {
    /// Unique identifier
    pub id: OrderId,
    /// Position this order acts on
    pub position_id: PositionId,
    /// Price condition
    pub trigger: Trigger,
    /// Entry, take-profit or stop-loss
    pub kind: OrderKind,
    /// Order has fired
    pub executed: bool,
    /// Order was withdrawn
    pub cancelled: bool,
}

impl Order {
    /// True if the order may still fire
    pub fn is_live(&self) -> bool {
        !self.executed && !self.cancelled
    }
}

// ============ Engine Inputs ============

/// Parameters of a leverage loop
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct LoopParams {
    /// Asset posted as collateral (A)
    pub collateral_asset: AssetId,
    /// Asset borrowed (B)
    pub debt_asset: AssetId,
    /// Identity the margin is pulled from
    pub caller: Address,
    /// Account collateral and debt are recorded under
    pub beneficiary: Address,
    /// Initial margin in native collateral units
    pub initial_margin: u128,
    /// Target leverage in basis points
    pub target_leverage_bps: u64,
    /// Minimum health factor in basis points
    pub min_health_factor_bps: u64,
    /// Slippage tolerance in basis points
    pub max_slippage_bps: u64,
}

/// Parameters of an unwind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct UnwindParams {
    /// Collateral asset (A)
    pub collateral_asset: AssetId,
    /// Debt asset (B)
    pub debt_asset: AssetId,
    /// Account the position is recorded under
    pub beneficiary: Address,
    /// Receiver of withdrawn collateral and swap surplus
    pub recipient: Address,
    /// Debt to clear
    pub repay: AmountOrAll,
    /// Collateral to withdraw after repaying
    pub withdraw: AmountOrAll,
    /// Slippage tolerance in basis points
    pub max_slippage_bps: u64,
}

impl UnwindParams {
    /// Full close back to the beneficiary
    pub fn close_all(
        collateral_asset: AssetId,
        debt_asset: AssetId,
        beneficiary: Address,
        max_slippage_bps: u64,
    ) -> Self {
        Self {
            collateral_asset,
            debt_asset,
            beneficiary,
            recipient: beneficiary,
            repay: AmountOrAll::All,
            withdraw: AmountOrAll::All,
            max_slippage_bps,
        }
    }
}

// ============ Loop Cache & State ============

/// Market snapshot taken once per invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopCache {
    /// Collateral asset decimals
    pub collateral_decimals: u8,
    /// Debt asset decimals
    pub debt_decimals: u8,
    /// Collateral asset price (canonical)
    pub collateral_price: u128,
    /// Debt asset price (canonical)
    pub debt_price: u128,
    /// Collateral LTV in basis points
    pub ltv_bps: u64,
    /// Collateral liquidation threshold in basis points
    pub liquidation_threshold_bps: u64,
    /// Collateral value the loop aims for (canonical)
    pub target_collateral_value: u128,
    /// Slippage tolerance in basis points
    pub slippage_bps: u64,
    /// Caller's minimum health factor in basis points
    pub min_health_factor_bps: u64,
    /// Increments worth less than this end the loop (canonical)
    pub dust_value: u128,
}

/// Running totals mutated once per iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoopState {
    /// Collateral supplied so far (native)
    pub collateral: u128,
    /// Debt borrowed so far (native)
    pub debt: u128,
    /// Completed iterations
    pub iterations: u8,
}

// ============ Engine Results ============

/// Why the iteration loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub enum Termination {
    /// Collateral value met the target
    TargetReached,
    /// No productive borrow increment remained
    BorrowExhausted,
    /// Iteration cap hit before the target
    IterationCap,
}

/// One borrow -> swap -> deposit round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct IterationRecord {
    /// Iteration number (0-indexed)
    pub iteration: u8,
    /// Debt asset borrowed (native)
    pub borrowed: u128,
    /// Collateral asset received from the swap (native)
    pub received: u128,
    /// Health factor after the deposit in basis points
    pub health_factor_bps: u64,
}

/// Result of a committed leverage loop
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct LoopReport {
    /// Iterations executed
    pub iterations: u8,
    /// Final collateral (native)
    pub final_collateral: u128,
    /// Final debt (native)
    pub final_debt: u128,
    /// Final health factor in basis points
    pub final_health_factor_bps: u64,
    /// Collateral value over margin value in basis points
    pub achieved_leverage_bps: u64,
    /// Why the loop stopped
    pub termination: Termination,
    /// Per-iteration records
    pub rounds: Vec<IterationRecord>,
}

/// Estimate produced without committing effects
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct LoopPreview {
    /// Estimated iterations
    pub iterations: u8,
    /// Estimated final collateral (native)
    pub final_collateral: u128,
    /// Estimated final debt (native)
    pub final_debt: u128,
    /// Estimated final health factor in basis points
    pub final_health_factor_bps: u64,
    /// Estimated leverage in basis points
    pub achieved_leverage_bps: u64,
    /// Why the simulated loop stopped
    pub termination: Termination,
}

/// Result of an unwind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct UnwindReport {
    /// Debt repaid (native debt units)
    pub debt_repaid: u128,
    /// Collateral converted to repay (native collateral units)
    pub collateral_sold: u128,
    /// Collateral sent to the recipient (native collateral units)
    pub collateral_withdrawn: u128,
    /// Debt asset left over from the swap, sent to the recipient
    pub debt_surplus: u128,
    /// Collateral still held by the beneficiary
    pub remaining_collateral: u128,
    /// Debt still owed by the beneficiary
    pub remaining_debt: u128,
}

impl UnwindReport {
    /// True when nothing is left in the market for this pair
    pub fn is_fully_closed(&self) -> bool {
        self.remaining_collateral == 0 && self.remaining_debt == 0
    }
}

// ============ Identifiers ============

/// Derive a deterministic position id
pub fn derive_position_id(owner: &Address, nonce: u64) -> PositionId {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(b"leverloop/position");
    hasher.update(owner);
    hasher.update(nonce.to_le_bytes());
    let result = hasher.finalize();
    let mut id = [0u8; 32];
    id.copy_from_slice(&result);
    id
}

/// Derive the account a custodian holds a position under
pub fn derive_custody_key(custodian: &Address, position_id: &PositionId) -> Address {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(b"leverloop/custody");
    hasher.update(custodian);
    hasher.update(position_id);
    let result = hasher.finalize();
    let mut key = [0u8; 32];
    key.copy_from_slice(&result);
    key
}

/// Derive an order id from its position and kind
pub fn derive_order_id(position_id: &PositionId, kind: OrderKind) -> OrderId {
    use sha2::{Digest, Sha256};
    let tag: u8 = match kind {
        OrderKind::Entry => 0,
        OrderKind::TakeProfit => 1,
        OrderKind::StopLoss => 2,
    };
    let mut hasher = Sha256::new();
    hasher.update(b"leverloop/order");
    hasher.update(position_id);
    hasher.update([tag]);
    let result = hasher.finalize();
    let mut id = [0u8; 32];
    id.copy_from_slice(&result);
    id
}
