//! Protocol Constants
//!
//! All magic numbers and default configuration values for leverloop.
//! Ratios are expressed in basis points (10_000 = 1.0 / 1x) and values in
//! canonical fixed point with 8 decimals.

/// Canonical value precision
pub mod precision {
    /// Decimals of the canonical value representation
    pub const VALUE_DECIMALS: u8 = 8;

    /// One canonical value unit (1.0 with 8 decimals)
    pub const PRICE_PRECISION: u128 = 100_000_000;

    /// Largest native decimal precision the normalizer accepts
    pub const MAX_ASSET_DECIMALS: u8 = 30;
}

/// Basis point arithmetic
pub mod bps {
    /// Basis points denominator (100%)
    pub const DENOMINATOR: u64 = 10_000;

    /// 1.0 expressed in basis points
    pub const ONE: u64 = 10_000;
}

/// Leverage bounds (in basis points, 10_000 = 1x)
pub mod leverage {
    /// Minimum target leverage (1x, no borrowing)
    pub const MIN_LEVERAGE_BPS: u64 = 10_000;

    /// Maximum target leverage (10x)
    pub const MAX_LEVERAGE_BPS: u64 = 100_000;

    /// Hard cap on loop iterations per invocation
    pub const MAX_ITERATIONS: u8 = 10;
}

/// Health factor limits (in basis points, 10_000 = 1.0)
pub mod health {
    /// Global floor for the caller-supplied minimum health factor (1.05)
    pub const MIN_HEALTH_FACTOR_FLOOR_BPS: u64 = 10_500;

    /// Below this the lending market may liquidate the account
    pub const LIQUIDATION_HEALTH_FACTOR_BPS: u64 = 10_000;

    /// Health factor reported for an account without debt
    pub const NO_DEBT_HEALTH_FACTOR: u64 = u64::MAX;
}

/// Slippage limits (in basis points)
pub mod slippage {
    /// Default ceiling on caller slippage tolerance (3%)
    pub const DEFAULT_MAX_SLIPPAGE_BPS: u64 = 300;

    /// Absolute ceiling any configuration may set (20%)
    pub const ABSOLUTE_MAX_SLIPPAGE_BPS: u64 = 2_000;
}

/// Loop termination thresholds
pub mod dust {
    /// Borrow increments worth less than this are not worth a loop (0.01 value units)
    pub const DEFAULT_DUST_VALUE: u128 = 1_000_000;
}

/// Unwind limits
pub mod unwind {
    /// Health factor margin above liquidation kept when withdrawing before a repay (0.1%)
    pub const WITHDRAW_HEALTH_BUFFER_BPS: u64 = 10;

    /// Maximum withdraw -> swap -> repay rounds per unwind
    pub const MAX_REPAY_ROUNDS: u8 = 10;
}

/// Order layer limits
pub mod orders {
    /// Maximum positions processed by one batch call
    pub const MAX_BATCH_SIZE: usize = 50;
}
