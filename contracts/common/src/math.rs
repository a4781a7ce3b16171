//! Price Normalization and Safe Math
//!
//! Converts native per-asset amounts to and from the canonical value
//! representation (8 decimals) so that two differently scaled assets can be
//! compared. All conversions truncate toward zero unless the function name
//! says `_ceil`.
//!
//! Intermediates stay within `u128`: products that would overflow are split
//! as `a*b/d = (a/d)*b + (a%d)*b/d`, which keeps realistic supplies
//! (1e12 whole tokens at up to 30 decimals) and prices (1e6 per token) in
//! range. Anything beyond that surfaces as [`LoopError::Overflow`].

use crate::constants::{bps, health, precision};
use crate::errors::{LoopError, LoopResult};

/// 10^decimals, rejecting precisions the normalizer does not support
pub fn pow10(decimals: u8) -> LoopResult<u128> {
    if decimals > precision::MAX_ASSET_DECIMALS {
        return Err(LoopError::UnsupportedDecimals {
            decimals,
            max: precision::MAX_ASSET_DECIMALS,
        });
    }
    Ok(10u128.pow(decimals as u32))
}

/// floor(a * b / d) without intermediate overflow where avoidable
pub fn mul_div(a: u128, b: u128, d: u128) -> LoopResult<u128> {
    if d == 0 {
        return Err(LoopError::DivisionByZero);
    }
    if let Some(product) = a.checked_mul(b) {
        return Ok(product / d);
    }

    let high = (a / d).checked_mul(b).ok_or(LoopError::Overflow)?;
    let rem = a % d;
    let low = match rem.checked_mul(b) {
        Some(product) => product / d,
        None => {
            // rem < d, so split b the same way
            let whole = rem.checked_mul(b / d).ok_or(LoopError::Overflow)?;
            let frac = rem.checked_mul(b % d).ok_or(LoopError::Overflow)? / d;
            whole.checked_add(frac).ok_or(LoopError::Overflow)?
        }
    };

    high.checked_add(low).ok_or(LoopError::Overflow)
}

/// ceil(a * b / d); never below the exact quotient
pub fn mul_div_ceil(a: u128, b: u128, d: u128) -> LoopResult<u128> {
    let floor = mul_div(a, b, d)?;
    let has_remainder = match a.checked_mul(b) {
        Some(product) => product % d != 0,
        None => match (a % d).checked_mul(b % d) {
            Some(product) => product % d != 0,
            // Cannot tell cheaply; round up
            None => true,
        },
    };
    if has_remainder {
        floor.checked_add(1).ok_or(LoopError::Overflow)
    } else {
        Ok(floor)
    }
}

/// Native amount -> canonical value, truncated
pub fn to_value(amount: u128, decimals: u8, price: u128) -> LoopResult<u128> {
    mul_div(amount, price, pow10(decimals)?)
}

/// Native amount -> canonical value, rounded up
pub fn to_value_ceil(amount: u128, decimals: u8, price: u128) -> LoopResult<u128> {
    mul_div_ceil(amount, price, pow10(decimals)?)
}

/// Canonical value -> native amount, truncated
pub fn to_native(value: u128, decimals: u8, price: u128) -> LoopResult<u128> {
    if price == 0 {
        return Err(LoopError::DivisionByZero);
    }
    mul_div(value, pow10(decimals)?, price)
}

/// Canonical value -> native amount, rounded up
pub fn to_native_ceil(value: u128, decimals: u8, price: u128) -> LoopResult<u128> {
    if price == 0 {
        return Err(LoopError::DivisionByZero);
    }
    mul_div_ceil(value, pow10(decimals)?, price)
}

/// amount * bps / 10_000, truncated
pub fn apply_bps(amount: u128, bps_value: u64) -> LoopResult<u128> {
    mul_div(amount, bps_value as u128, bps::DENOMINATOR as u128)
}

/// amount * (10_000 - bps) / 10_000, truncated
pub fn discount_bps(amount: u128, bps_value: u64) -> LoopResult<u128> {
    let keep = bps::DENOMINATOR
        .checked_sub(bps_value)
        .ok_or(LoopError::Underflow)?;
    apply_bps(amount, keep)
}

/// amount * (10_000 + bps) / 10_000, rounded up
pub fn inflate_bps(amount: u128, bps_value: u64) -> LoopResult<u128> {
    let grow = bps::DENOMINATOR
        .checked_add(bps_value)
        .ok_or(LoopError::Overflow)?;
    mul_div_ceil(amount, grow as u128, bps::DENOMINATOR as u128)
}

/// Health factor in basis points
///
/// HF = collateral_value * liquidation_threshold / debt_value
pub fn health_factor_bps(
    collateral_value: u128,
    liquidation_threshold_bps: u64,
    debt_value: u128,
) -> LoopResult<u64> {
    if debt_value == 0 {
        return Ok(health::NO_DEBT_HEALTH_FACTOR);
    }
    let hf = mul_div(collateral_value, liquidation_threshold_bps as u128, debt_value)?;
    Ok(hf.min(u64::MAX as u128) as u64)
}

/// Leverage in basis points: collateral value over margin value
pub fn leverage_bps(collateral_value: u128, margin_value: u128) -> LoopResult<u64> {
    if margin_value == 0 {
        return Ok(0);
    }
    let lev = mul_div(collateral_value, bps::ONE as u128, margin_value)?;
    Ok(lev.min(u64::MAX as u128) as u64)
}

/// Safe addition with overflow check
pub fn safe_add(a: u128, b: u128) -> LoopResult<u128> {
    a.checked_add(b).ok_or(LoopError::Overflow)
}

/// Safe subtraction with underflow check
pub fn safe_sub(a: u128, b: u128) -> LoopResult<u128> {
    a.checked_sub(b).ok_or(LoopError::Underflow)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const ONE_ETH: u128 = 1_000_000_000_000_000_000; // 18 decimals
    const ONE_USDC: u128 = 1_000_000; // 6 decimals
    const ETH_PRICE: u128 = 2_000_00000000; // $2,000
    const USDC_PRICE: u128 = 1_00000000; // $1

    #[test]
    fn test_value_across_decimals() {
        // 10 ETH at $2,000 = $20,000
        assert_eq!(to_value(10 * ONE_ETH, 18, ETH_PRICE).unwrap(), 20_000_00000000);
        // 20,000 USDC at $1 = $20,000
        assert_eq!(to_value(20_000 * ONE_USDC, 6, USDC_PRICE).unwrap(), 20_000_00000000);
    }

    #[test]
    fn test_native_roundtrip_truncates() {
        let value = 15_000_00000000; // $15,000
        assert_eq!(to_native(value, 6, USDC_PRICE).unwrap(), 15_000 * ONE_USDC);
        assert_eq!(to_native(value, 18, ETH_PRICE).unwrap(), 7_500_000_000_000_000_000);

        // 1 wei of ETH is worth less than one canonical unit
        assert_eq!(to_value(1, 18, ETH_PRICE).unwrap(), 0);
        assert_eq!(to_value_ceil(1, 18, ETH_PRICE).unwrap(), 1);
    }

    #[test]
    fn test_large_supply_does_not_overflow() {
        // 1e12 whole tokens at 18 decimals priced at $1,000,000
        let amount = 1_000_000_000_000u128 * ONE_ETH;
        let price = 1_000_000_00000000u128;
        let value = to_value(amount, 18, price).unwrap();
        assert_eq!(value, 1_000_000_000_000u128 * price);
        assert_eq!(to_native(value, 18, price).unwrap(), amount);
    }

    #[test]
    fn test_unsupported_decimals() {
        assert_eq!(
            pow10(31),
            Err(LoopError::UnsupportedDecimals { decimals: 31, max: 30 })
        );
        assert!(to_native(1, 6, 0).is_err());
    }

    #[test]
    fn test_health_factor() {
        // $20,000 collateral at 82.5% LT backing $15,000 debt = 1.1
        let hf = health_factor_bps(20_000_00000000, 8_250, 15_000_00000000).unwrap();
        assert_eq!(hf, 11_000);
        assert_eq!(health_factor_bps(1, 8_250, 0).unwrap(), u64::MAX);
    }

    #[test]
    fn test_bps_helpers() {
        assert_eq!(apply_bps(1_000, 8_000).unwrap(), 800);
        assert_eq!(discount_bps(1_000, 100).unwrap(), 990);
        assert_eq!(inflate_bps(1_000, 100).unwrap(), 1_010);
        assert_eq!(inflate_bps(999, 1).unwrap(), 1_000); // 999.0999 rounds up
        assert_eq!(leverage_bps(40_000, 20_000).unwrap(), 20_000);
    }

    proptest! {
        #[test]
        fn prop_mul_div_matches_exact(a in 0u128..=u64::MAX as u128, b in 0u128..=u64::MAX as u128, d in 1u128..=u64::MAX as u128) {
            prop_assert_eq!(mul_div(a, b, d).unwrap(), a * b / d);
            let ceil = mul_div_ceil(a, b, d).unwrap();
            prop_assert_eq!(ceil, (a * b + d - 1) / d);
        }

        #[test]
        fn prop_split_path_matches_small_path(q in 0u128..1_000_000, r in 0u128..1_000_000_000_000, b in 1u128..100_000_000_000_000_000_000_000_000) {
            // a * b overflows u128 for large b, exercising the split path
            let d = 1_000_000_000_000u128;
            let r = r % d;
            let a = q * d + r;
            let expected = q * b + r * b / d;
            prop_assert_eq!(mul_div(a, b, d).unwrap(), expected);
        }
    }
}
