//! Loop Sizer
//!
//! Computes the next borrow increment of a leverage loop: as much of the
//! debt asset as the LTV limit allows, clamped so that the projected health
//! factor never drops below the caller's minimum.
//!
//! The projection is a single linear step against the current collateral
//! value. Debt is valued rounded up and increments are truncated, so the
//! clamp errs on the side of borrowing less.

use crate::constants::bps;
use crate::errors::{LoopError, LoopResult};
use crate::math::{apply_bps, health_factor_bps, mul_div, to_native, to_value_ceil};

/// Outcome of one sizing step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizingStep {
    /// Debt asset to borrow (native units)
    pub increment: u128,
    /// Health factor after borrowing `increment`, before any swap
    pub projected_health_factor_bps: u64,
    /// True when the health-factor clamp reduced the LTV-limited increment
    pub clamped_by_health: bool,
}

/// Size the next borrow with diagnostics
pub fn size_borrow(
    collateral_value: u128,
    debt_value: u128,
    ltv_bps: u64,
    liquidation_threshold_bps: u64,
    min_health_factor_bps: u64,
    debt_price: u128,
    debt_decimals: u8,
) -> LoopResult<SizingStep> {
    if min_health_factor_bps == 0 || debt_price == 0 {
        return Err(LoopError::DivisionByZero);
    }

    let current_hf = health_factor_bps(collateral_value, liquidation_threshold_bps, debt_value)?;
    let no_borrow = SizingStep {
        increment: 0,
        projected_health_factor_bps: current_hf,
        clamped_by_health: false,
    };

    // 1-2. Headroom under the LTV limit
    let max_borrow_value = apply_bps(collateral_value, ltv_bps)?;
    if max_borrow_value <= debt_value {
        return Ok(no_borrow);
    }

    // 3. Candidate increment in native debt units
    let available_value = max_borrow_value - debt_value;
    let mut increment = to_native(available_value, debt_decimals, debt_price)?;
    if increment == 0 {
        return Ok(no_borrow);
    }

    // 4. Project the health factor
    let mut projected_hf = project(collateral_value, debt_value, liquidation_threshold_bps, increment, debt_price, debt_decimals)?;

    // 5. Clamp to the debt that keeps exactly the minimum health factor
    let mut clamped = false;
    if projected_hf < min_health_factor_bps {
        let max_debt_value = mul_div(
            collateral_value,
            liquidation_threshold_bps as u128,
            min_health_factor_bps as u128,
        )?;
        let headroom = max_debt_value.saturating_sub(debt_value);
        increment = increment.min(to_native(headroom, debt_decimals, debt_price)?);
        clamped = true;

        if increment == 0 {
            return Ok(SizingStep { clamped_by_health: true, ..no_borrow });
        }
        projected_hf = project(collateral_value, debt_value, liquidation_threshold_bps, increment, debt_price, debt_decimals)?;
    }

    Ok(SizingStep {
        increment,
        projected_health_factor_bps: projected_hf,
        clamped_by_health: clamped,
    })
}

/// Next safe borrow increment in native debt units (0 = stop)
pub fn compute_borrow_increment(
    collateral_value: u128,
    debt_value: u128,
    ltv_bps: u64,
    liquidation_threshold_bps: u64,
    min_health_factor_bps: u64,
    debt_price: u128,
    debt_decimals: u8,
) -> LoopResult<u128> {
    size_borrow(
        collateral_value,
        debt_value,
        ltv_bps,
        liquidation_threshold_bps,
        min_health_factor_bps,
        debt_price,
        debt_decimals,
    )
    .map(|step| step.increment)
}

fn project(
    collateral_value: u128,
    debt_value: u128,
    liquidation_threshold_bps: u64,
    increment: u128,
    debt_price: u128,
    debt_decimals: u8,
) -> LoopResult<u64> {
    let added = to_value_ceil(increment, debt_decimals, debt_price)?;
    let projected_debt = debt_value.checked_add(added).ok_or(LoopError::Overflow)?;
    health_factor_bps(collateral_value, liquidation_threshold_bps, projected_debt)
}

/// Highest leverage the market parameters can carry, in basis points
///
/// The smaller of the LTV ceiling `1 / (1 - ltv)` and the health ceiling
/// `1 / (1 - lt / min_hf)`. Both are limits of an infinite loop; a finite
/// loop approaches but never reaches them.
pub fn leverage_ceiling_bps(
    ltv_bps: u64,
    liquidation_threshold_bps: u64,
    min_health_factor_bps: u64,
) -> u64 {
    let one = bps::ONE as u128;
    let ceiling = |fraction_bps: u128| -> u64 {
        if fraction_bps >= one {
            return u64::MAX;
        }
        (one * one / (one - fraction_bps)).min(u64::MAX as u128) as u64
    };

    let ltv_ceiling = ceiling(ltv_bps as u128);
    let health_ceiling = if min_health_factor_bps == 0 {
        u64::MAX
    } else {
        ceiling(liquidation_threshold_bps as u128 * one / min_health_factor_bps as u128)
    };

    ltv_ceiling.min(health_ceiling)
}
