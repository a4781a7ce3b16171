//! Validation Helpers
//!
//! Input checks shared by the engine and the order layer. Everything here
//! runs before the first external effect and needs no market access, so a
//! rejection never leaves anything to roll back.
//!
//! ```rust,ignore
//! use leverloop_common::validation::{check, validate_loop_params};
//!
//! check!(params.initial_margin > 0, LoopError::ZeroAmount);
//! validate_loop_params(&params, floor_bps, max_slippage_bps)?;
//! ```

use crate::{
    constants::{leverage, orders},
    errors::{LoopError, LoopResult},
    sizer::leverage_ceiling_bps,
    types::{Address, AssetId, LoopParams, UnwindParams},
};

// ============ Validation Macro ============

/// Check a condition and return an error if it fails.
///
/// ```rust,ignore
/// check!(
///     hf >= min_hf,
///     LoopError::HealthFactorBreached {
///         health_factor_bps: hf,
///         minimum_bps: min_hf,
///     }
/// );
/// ```
#[macro_export]
macro_rules! check {
    ($condition:expr, $error:expr) => {
        if !($condition) {
            return Err($error);
        }
    };
}

pub use crate::check;

// ============ Common Validation Helpers ============

/// Require the engine to not be paused.
pub fn require_not_paused(is_paused: bool) -> LoopResult<()> {
    check!(!is_paused, LoopError::ProtocolPaused);
    Ok(())
}

/// Require the collateral and debt assets to differ.
pub fn require_distinct_assets(collateral_asset: AssetId, debt_asset: AssetId) -> LoopResult<()> {
    check!(
        collateral_asset != debt_asset,
        LoopError::IdenticalAssets { asset: collateral_asset }
    );
    Ok(())
}

/// Require an amount to be non-zero.
pub fn require_positive(amount: u128) -> LoopResult<()> {
    check!(amount > 0, LoopError::ZeroAmount);
    Ok(())
}

/// Require target leverage within [1x, 10x].
pub fn require_leverage_in_range(target_leverage_bps: u64) -> LoopResult<()> {
    check!(
        (leverage::MIN_LEVERAGE_BPS..=leverage::MAX_LEVERAGE_BPS).contains(&target_leverage_bps),
        LoopError::InvalidLeverage {
            requested_bps: target_leverage_bps,
            min_bps: leverage::MIN_LEVERAGE_BPS,
            max_bps: leverage::MAX_LEVERAGE_BPS,
        }
    );
    Ok(())
}

/// Require the caller's minimum health factor to respect the global floor.
pub fn require_min_health_factor(requested_bps: u64, floor_bps: u64) -> LoopResult<()> {
    check!(
        requested_bps >= floor_bps,
        LoopError::HealthFactorBelowFloor { requested_bps, floor_bps }
    );
    Ok(())
}

/// Require a slippage tolerance at or below the configured ceiling.
pub fn require_slippage_within(requested_bps: u64, max_bps: u64) -> LoopResult<()> {
    check!(
        requested_bps <= max_bps,
        LoopError::SlippageTooHigh { requested_bps, max_bps }
    );
    Ok(())
}

/// Require target leverage the market parameters can actually carry.
///
/// A target above the ceiling is rejected rather than silently capped.
pub fn require_leverage_within_ceiling(
    target_leverage_bps: u64,
    ltv_bps: u64,
    liquidation_threshold_bps: u64,
    min_health_factor_bps: u64,
) -> LoopResult<()> {
    let ceiling_bps = leverage_ceiling_bps(ltv_bps, liquidation_threshold_bps, min_health_factor_bps);
    check!(
        target_leverage_bps <= ceiling_bps,
        LoopError::ExcessiveLeverage {
            requested_bps: target_leverage_bps,
            ceiling_bps,
        }
    );
    Ok(())
}

/// Require a live health factor at or above the minimum.
pub fn require_health_factor(health_factor_bps: u64, minimum_bps: u64) -> LoopResult<()> {
    check!(
        health_factor_bps >= minimum_bps,
        LoopError::HealthFactorBreached { health_factor_bps, minimum_bps }
    );
    Ok(())
}

/// Require the signer to be the owner.
pub fn require_owner(owner: Address, signer: Address) -> LoopResult<()> {
    check!(
        owner == signer,
        LoopError::Unauthorized {
            expected: owner,
            actual: signer,
        }
    );
    Ok(())
}

/// Require a batch no larger than the per-call maximum.
pub fn require_batch_size(size: usize) -> LoopResult<()> {
    check!(
        size <= orders::MAX_BATCH_SIZE,
        LoopError::BatchTooLarge {
            size,
            max: orders::MAX_BATCH_SIZE,
        }
    );
    Ok(())
}

// ============ Parameter Sets ============

/// Validate loop parameters that need no market state.
pub fn validate_loop_params(
    params: &LoopParams,
    min_health_factor_floor_bps: u64,
    max_slippage_bps: u64,
) -> LoopResult<()> {
    require_distinct_assets(params.collateral_asset, params.debt_asset)?;
    require_positive(params.initial_margin)?;
    require_leverage_in_range(params.target_leverage_bps)?;
    require_min_health_factor(params.min_health_factor_bps, min_health_factor_floor_bps)?;
    require_slippage_within(params.max_slippage_bps, max_slippage_bps)?;
    Ok(())
}

/// Validate unwind parameters that need no market state.
pub fn validate_unwind_params(params: &UnwindParams, max_slippage_bps: u64) -> LoopResult<()> {
    require_distinct_assets(params.collateral_asset, params.debt_asset)?;
    require_slippage_within(params.max_slippage_bps, max_slippage_bps)?;
    check!(
        !(params.repay.is_zero() && params.withdraw.is_zero()),
        LoopError::NothingToUnwind
    );
    Ok(())
}

// ============ Tests ============
