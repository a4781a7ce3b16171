//! Error Types for leverloop
//!
//! Every failure carries the phase in which it happened so a caller can
//! tell a rejected precheck apart from an abort halfway through a loop.

use core::fmt;

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::types::{Address, AssetId, PositionId, PositionStatus};
use crate::Box;

/// Result type alias for leverloop operations
pub type LoopResult<T> = Result<T, LoopError>;

/// Stage of an operation at which an error was raised
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub enum Phase {
    /// Validation before any external effect
    Precheck,
    /// Pulling margin from the caller
    Pull,
    /// Supplying the initial margin
    Supply,
    /// Borrowing the debt asset
    Borrow,
    /// Converting through the exchange
    Swap,
    /// Redepositing swap output as collateral
    Deposit,
    /// Reading the authoritative health factor
    HealthCheck,
    /// Bounding the iteration loop
    Loop,
    /// Repaying debt during an unwind
    Repay,
    /// Withdrawing collateral
    Withdraw,
    /// Moving tokens to a recipient
    Transfer,
}

impl Phase {
    /// Short lowercase label used in logs
    pub fn label(&self) -> &'static str {
        match self {
            Self::Precheck => "precheck",
            Self::Pull => "pull",
            Self::Supply => "supply",
            Self::Borrow => "borrow",
            Self::Swap => "swap",
            Self::Deposit => "deposit",
            Self::HealthCheck => "health-check",
            Self::Loop => "loop",
            Self::Repay => "repay",
            Self::Withdraw => "withdraw",
            Self::Transfer => "transfer",
        }
    }
}

/// Main error enum for all leverloop errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopError {
    // ============ Input Validation ============
    /// Collateral and debt asset are the same
    IdenticalAssets { asset: AssetId },

    /// Zero amount not allowed
    ZeroAmount,

    /// Target leverage outside the supported range
    InvalidLeverage { requested_bps: u64, min_bps: u64, max_bps: u64 },

    /// Target leverage beyond what the market parameters can carry
    ExcessiveLeverage { requested_bps: u64, ceiling_bps: u64 },

    /// Requested minimum health factor below the global floor
    HealthFactorBelowFloor { requested_bps: u64, floor_bps: u64 },

    /// Requested slippage tolerance above the configured ceiling
    SlippageTooHigh { requested_bps: u64, max_bps: u64 },

    /// Unwind called with both targets resolving to zero
    NothingToUnwind,

    /// Configuration update rejected
    InvalidConfig { param: &'static str, reason: &'static str },

    // ============ Market State ============
    /// Exchange has no pair between the two assets
    NoConversionPath { asset_in: AssetId, asset_out: AssetId },

    /// Asset is unknown to the lending market
    AssetNotConfigured { asset: AssetId },

    /// Asset cannot be used as collateral
    AssetNotCollateral { asset: AssetId },

    /// Asset cannot be borrowed
    AssetNotBorrowable { asset: AssetId },

    /// Price source has no usable price
    PriceUnavailable { asset: AssetId },

    /// Asset precision outside the supported range
    UnsupportedDecimals { decimals: u8, max: u8 },

    // ============ Safety ============
    /// Health factor fell below the caller's minimum
    HealthFactorBreached { health_factor_bps: u64, minimum_bps: u64 },

    /// Swap returned less than the minimum acceptable output
    SlippageExceeded { minimum_out: u128, received: u128 },

    // ============ Resource Exhaustion ============
    /// Iteration cap hit before the target leverage
    IterationCapReached { iterations: u8, achieved_bps: u64, target_bps: u64 },

    // ============ Collaborator Failures ============
    /// Token balance too small
    InsufficientBalance { available: u128, requested: u128 },

    /// Allowance too small for a pull
    InsufficientAllowance { allowed: u128, requested: u128 },

    /// Market cannot lend the requested amount
    InsufficientLiquidity { available: u128, requested: u128 },

    /// Account holds less collateral than requested
    InsufficientCollateral { available: u128, requested: u128 },

    /// Market would leave the account liquidatable
    WouldBeLiquidatable { health_factor_bps: u64 },

    /// Adapter bound to one identity was asked to act for another
    AttributionMismatch { bound: Address, requested: Address },

    /// A collaborator call failed during the given phase
    Aborted { phase: Phase, asset: AssetId, cause: Box<LoopError> },

    // ============ State ============
    /// Engine is paused
    ProtocolPaused,

    /// Another loop or unwind for this beneficiary is in flight
    BeneficiaryBusy { beneficiary: Address },

    // ============ Order Layer ============
    /// Position not found
    PositionNotFound { position_id: PositionId },

    /// Caller is not the position owner
    Unauthorized { expected: Address, actual: Address },

    /// Operation not allowed in the position's current status
    InvalidStatus { position_id: PositionId, status: PositionStatus },

    /// Trigger price condition does not hold
    TriggerNotMet { position_id: PositionId },

    /// Batch larger than allowed
    BatchTooLarge { size: usize, max: usize },

    // ============ Math ============
    /// Arithmetic overflow occurred
    Overflow,

    /// Arithmetic underflow occurred
    Underflow,

    /// Division by zero
    DivisionByZero,
}

impl LoopError {
    /// Wrap a collaborator failure with the phase and asset it happened on
    pub fn during(self, phase: Phase, asset: AssetId) -> Self {
        match self {
            already @ Self::Aborted { .. } => already,
            cause => Self::Aborted { phase, asset, cause: Box::new(cause) },
        }
    }

    /// Phase this error belongs to
    pub fn phase(&self) -> Phase {
        match self {
            Self::Aborted { phase, .. } => *phase,
            Self::HealthFactorBreached { .. } => Phase::HealthCheck,
            Self::SlippageExceeded { .. } => Phase::Swap,
            Self::IterationCapReached { .. } => Phase::Loop,
            Self::InsufficientLiquidity { .. } => Phase::Borrow,
            Self::InsufficientAllowance { .. } => Phase::Pull,
            Self::InsufficientBalance { .. } => Phase::Transfer,
            _ => Phase::Precheck,
        }
    }

    /// Innermost cause of a wrapped error
    pub fn root_cause(&self) -> &LoopError {
        match self {
            Self::Aborted { cause, .. } => cause.root_cause(),
            other => other,
        }
    }

    /// Returns a stable error code for logging/debugging
    pub fn code(&self) -> &'static str {
        match self {
            Self::IdenticalAssets { .. } => "E001_IDENTICAL_ASSETS",
            Self::ZeroAmount => "E002_ZERO_AMOUNT",
            Self::InvalidLeverage { .. } => "E003_INVALID_LEVERAGE",
            Self::ExcessiveLeverage { .. } => "E004_EXCESSIVE_LEVERAGE",
            Self::HealthFactorBelowFloor { .. } => "E005_HF_BELOW_FLOOR",
            Self::SlippageTooHigh { .. } => "E006_SLIPPAGE_TOO_HIGH",
            Self::NothingToUnwind => "E007_NOTHING_TO_UNWIND",
            Self::InvalidConfig { .. } => "E008_INVALID_CONFIG",
            Self::NoConversionPath { .. } => "E010_NO_PATH",
            Self::AssetNotConfigured { .. } => "E011_ASSET_NOT_CONFIGURED",
            Self::AssetNotCollateral { .. } => "E012_NOT_COLLATERAL",
            Self::AssetNotBorrowable { .. } => "E013_NOT_BORROWABLE",
            Self::PriceUnavailable { .. } => "E014_PRICE_UNAVAILABLE",
            Self::UnsupportedDecimals { .. } => "E015_UNSUPPORTED_DECIMALS",
            Self::HealthFactorBreached { .. } => "E020_HF_BREACHED",
            Self::SlippageExceeded { .. } => "E021_SLIPPAGE_EXCEEDED",
            Self::IterationCapReached { .. } => "E030_ITERATION_CAP",
            Self::InsufficientBalance { .. } => "E040_INSUFFICIENT_BALANCE",
            Self::InsufficientAllowance { .. } => "E041_INSUFFICIENT_ALLOWANCE",
            Self::InsufficientLiquidity { .. } => "E042_INSUFFICIENT_LIQUIDITY",
            Self::InsufficientCollateral { .. } => "E043_INSUFFICIENT_COLLATERAL",
            Self::WouldBeLiquidatable { .. } => "E044_WOULD_BE_LIQUIDATABLE",
            Self::AttributionMismatch { .. } => "E045_ATTRIBUTION_MISMATCH",
            Self::Aborted { .. } => "E046_ABORTED",
            Self::ProtocolPaused => "E050_PAUSED",
            Self::BeneficiaryBusy { .. } => "E051_BENEFICIARY_BUSY",
            Self::PositionNotFound { .. } => "E060_POSITION_NOT_FOUND",
            Self::Unauthorized { .. } => "E061_UNAUTHORIZED",
            Self::InvalidStatus { .. } => "E062_INVALID_STATUS",
            Self::TriggerNotMet { .. } => "E063_TRIGGER_NOT_MET",
            Self::BatchTooLarge { .. } => "E064_BATCH_TOO_LARGE",
            Self::Overflow => "E080_OVERFLOW",
            Self::Underflow => "E081_UNDERFLOW",
            Self::DivisionByZero => "E082_DIV_ZERO",
        }
    }

    /// Returns true if the caller can fix the problem and retry
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::SlippageExceeded { .. } => true,     // Retry with fresh quote
            Self::InsufficientLiquidity { .. } => true, // Wait for liquidity
            Self::BeneficiaryBusy { .. } => true,       // Wait for in-flight op
            Self::TriggerNotMet { .. } => true,
            Self::Aborted { cause, .. } => cause.is_recoverable(),
            _ => false,
        }
    }
}

impl fmt::Display for LoopError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Aborted { phase, cause, .. } => {
                write!(f, "{} failed: {}", phase.label(), cause)
            }
            Self::HealthFactorBreached { health_factor_bps, minimum_bps } => write!(
                f,
                "{}: health factor {} bps below minimum {} bps",
                self.code(),
                health_factor_bps,
                minimum_bps
            ),
            Self::ExcessiveLeverage { requested_bps, ceiling_bps } => write!(
                f,
                "{}: requested {} bps exceeds ceiling {} bps",
                self.code(),
                requested_bps,
                ceiling_bps
            ),
            Self::SlippageExceeded { minimum_out, received } => write!(
                f,
                "{}: received {} below minimum {}",
                self.code(),
                received,
                minimum_out
            ),
            other => write!(f, "{} ({})", other.code(), other.phase().label()),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for LoopError {}
