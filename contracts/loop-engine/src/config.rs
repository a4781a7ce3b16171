//! Engine Configuration
//!
//! One value owned by each [`crate::LoopEngine`]. Updates go through the
//! setters below, which validate before anything changes.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use leverloop_common::{
    constants::{dust, health, leverage, slippage},
    errors::{LoopError, LoopResult},
};

/// What happens when the iteration cap is hit before the target leverage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub enum CapPolicy {
    /// Commit and report the leverage actually achieved
    #[default]
    ReportCapped,
    /// Roll back and fail with `IterationCapReached`
    Abort,
}

/// Configuration parameter identifiers used in `ConfigUpdated` events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConfigParam {
    MaxSlippage = 1,
    HealthFactorFloor = 2,
    MaxIterations = 3,
    CapPolicy = 4,
    DustValue = 5,
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct EngineConfig {
    /// Emergency pause; rejects loops and unwinds
    pub paused: bool,
    /// Ceiling on caller slippage tolerance (bps)
    pub max_slippage_bps: u64,
    /// Lowest minimum health factor a caller may request (bps)
    pub min_health_factor_floor_bps: u64,
    /// Iteration cap per loop
    pub max_iterations: u8,
    /// Behaviour at the iteration cap
    pub cap_policy: CapPolicy,
    /// Borrow increments worth less than this end the loop (canonical value)
    pub dust_value: u128,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            paused: false,
            max_slippage_bps: slippage::DEFAULT_MAX_SLIPPAGE_BPS,
            min_health_factor_floor_bps: health::MIN_HEALTH_FACTOR_FLOOR_BPS,
            max_iterations: leverage::MAX_ITERATIONS,
            cap_policy: CapPolicy::ReportCapped,
            dust_value: dust::DEFAULT_DUST_VALUE,
        }
    }
}

impl EngineConfig {
    /// Check every parameter against its hard limits
    pub fn validate(&self) -> LoopResult<()> {
        Self::check_slippage(self.max_slippage_bps)?;
        Self::check_floor(self.min_health_factor_floor_bps)?;
        Self::check_iterations(self.max_iterations)?;
        Self::check_dust(self.dust_value)?;
        Ok(())
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn unpause(&mut self) {
        self.paused = false;
    }

    /// Set the slippage ceiling; returns the previous value
    pub fn set_max_slippage_bps(&mut self, bps: u64) -> LoopResult<u64> {
        Self::check_slippage(bps)?;
        Ok(core::mem::replace(&mut self.max_slippage_bps, bps))
    }

    /// Set the health-factor floor; returns the previous value
    pub fn set_min_health_factor_floor_bps(&mut self, bps: u64) -> LoopResult<u64> {
        Self::check_floor(bps)?;
        Ok(core::mem::replace(&mut self.min_health_factor_floor_bps, bps))
    }

    /// Set the iteration cap; returns the previous value
    pub fn set_max_iterations(&mut self, iterations: u8) -> LoopResult<u8> {
        Self::check_iterations(iterations)?;
        Ok(core::mem::replace(&mut self.max_iterations, iterations))
    }

    /// Set the cap policy; returns the previous value
    pub fn set_cap_policy(&mut self, policy: CapPolicy) -> CapPolicy {
        core::mem::replace(&mut self.cap_policy, policy)
    }

    /// Set the dust threshold; returns the previous value
    pub fn set_dust_threshold(&mut self, value: u128) -> LoopResult<u128> {
        Self::check_dust(value)?;
        Ok(core::mem::replace(&mut self.dust_value, value))
    }

    fn check_slippage(bps: u64) -> LoopResult<()> {
        if bps > slippage::ABSOLUTE_MAX_SLIPPAGE_BPS {
            return Err(LoopError::InvalidConfig {
                param: "max_slippage_bps",
                reason: "above absolute slippage ceiling",
            });
        }
        Ok(())
    }

    fn check_floor(bps: u64) -> LoopResult<()> {
        if bps <= health::LIQUIDATION_HEALTH_FACTOR_BPS {
            return Err(LoopError::InvalidConfig {
                param: "min_health_factor_floor_bps",
                reason: "must be above the liquidation health factor",
            });
        }
        Ok(())
    }

    fn check_iterations(iterations: u8) -> LoopResult<()> {
        if iterations == 0 || iterations > leverage::MAX_ITERATIONS {
            return Err(LoopError::InvalidConfig {
                param: "max_iterations",
                reason: "must be between 1 and the hard iteration cap",
            });
        }
        Ok(())
    }

    fn check_dust(value: u128) -> LoopResult<()> {
        if value == 0 {
            return Err(LoopError::InvalidConfig {
                param: "dust_value",
                reason: "must be positive",
            });
        }
        Ok(())
    }
}
