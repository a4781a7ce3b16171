//! Loop Engine
//!
//! Opens a leveraged position: pulls the margin, supplies it for the
//! beneficiary, then repeats borrow -> swap -> deposit until the target
//! collateral value is reached, borrowing stops being productive, or the
//! iteration cap is hit.
//!
//! The committing path and the preview run the same precheck, the same
//! cache and the same iteration routine. Only the backend differs: one
//! performs market calls, the other answers from quotes and local health
//! arithmetic without touching the host.
//!
//! ## Atomicity
//!
//! A checkpoint is taken before the first effect. Any error after that
//! restores it, and events staged during the invocation are dropped.

use tracing::{debug, info, warn};

use leverloop_common::{
    errors::{LoopError, LoopResult, Phase},
    events::{EventLog, LoopEvent},
    market::Host,
    math::{
        apply_bps, discount_bps, leverage_bps, mul_div, pow10, safe_add, to_native_ceil, to_value,
        to_value_ceil,
    },
    sizer::size_borrow,
    types::{
        AccountHealth, Address, AssetId, IterationRecord, LoopCache, LoopParams, LoopPreview,
        LoopReport, LoopState, Termination,
    },
    validation::{
        require_health_factor, require_leverage_within_ceiling, require_not_paused,
        validate_loop_params,
    },
    constants::health,
};

use crate::config::{CapPolicy, ConfigParam, EngineConfig};
use crate::locks::BeneficiaryLocks;

/// Leading bytes of a 32-byte key as hex, for log fields
pub fn short_key(key: &[u8; 32]) -> String {
    hex::encode(&key[..4])
}

// ============ Engine ============

/// Leverage loop and unwind engine
///
/// Holds its own configuration, the beneficiary lock registry and the log of
/// committed events. The engine acts on the host as `identity`: borrowed
/// tokens and withdrawn collateral pass through that account.
#[derive(Debug)]
pub struct LoopEngine {
    pub(crate) identity: Address,
    pub(crate) config: EngineConfig,
    pub(crate) locks: BeneficiaryLocks,
    pub(crate) events: EventLog,
    pub(crate) sequence: u64,
}

impl LoopEngine {
    /// Engine with the default configuration and a private lock registry
    pub fn new(identity: Address) -> Self {
        Self {
            identity,
            config: EngineConfig::default(),
            locks: BeneficiaryLocks::new(),
            events: EventLog::new(),
            sequence: 0,
        }
    }

    /// Engine with a custom configuration
    pub fn with_config(identity: Address, config: EngineConfig) -> LoopResult<Self> {
        config.validate()?;
        Ok(Self { config, ..Self::new(identity) })
    }

    /// Share a lock registry with other engines driving the same market
    pub fn with_locks(mut self, locks: BeneficiaryLocks) -> Self {
        self.locks = locks;
        self
    }

    pub fn identity(&self) -> Address {
        self.identity
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn locks(&self) -> &BeneficiaryLocks {
        &self.locks
    }

    /// Events of committed invocations
    pub fn events(&self) -> &EventLog {
        &self.events
    }

    /// Hand committed events to an indexer
    pub fn take_events(&mut self) -> Vec<LoopEvent> {
        self.events.drain()
    }

    /// Sequence number of the last committed invocation
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub(crate) fn publish(&mut self, sequence: u64, staged: &mut EventLog) {
        self.sequence = sequence;
        self.events.append(staged);
    }

    // ============ Configuration ============

    pub fn pause(&mut self) {
        self.config.pause();
        self.sequence += 1;
        self.events.emit(LoopEvent::EnginePaused { sequence: self.sequence });
        warn!("engine paused");
    }

    pub fn unpause(&mut self) {
        self.config.unpause();
        self.sequence += 1;
        self.events.emit(LoopEvent::EngineUnpaused { sequence: self.sequence });
        info!("engine unpaused");
    }

    pub fn set_max_slippage_bps(&mut self, bps: u64) -> LoopResult<()> {
        let old = self.config.set_max_slippage_bps(bps)?;
        self.record_update(ConfigParam::MaxSlippage, old as u128, bps as u128);
        Ok(())
    }

    pub fn set_min_health_factor_floor_bps(&mut self, bps: u64) -> LoopResult<()> {
        let old = self.config.set_min_health_factor_floor_bps(bps)?;
        self.record_update(ConfigParam::HealthFactorFloor, old as u128, bps as u128);
        Ok(())
    }

    pub fn set_max_iterations(&mut self, iterations: u8) -> LoopResult<()> {
        let old = self.config.set_max_iterations(iterations)?;
        self.record_update(ConfigParam::MaxIterations, old as u128, iterations as u128);
        Ok(())
    }

    pub fn set_cap_policy(&mut self, policy: CapPolicy) {
        let old = self.config.set_cap_policy(policy);
        self.record_update(ConfigParam::CapPolicy, old as u128, policy as u128);
    }

    pub fn set_dust_threshold(&mut self, value: u128) -> LoopResult<()> {
        let old = self.config.set_dust_threshold(value)?;
        self.record_update(ConfigParam::DustValue, old, value);
        Ok(())
    }

    fn record_update(&mut self, param: ConfigParam, old_value: u128, new_value: u128) {
        self.sequence += 1;
        self.events.emit(LoopEvent::ConfigUpdated {
            param: param as u8,
            old_value,
            new_value,
            sequence: self.sequence,
        });
        info!(param = ?param, old_value, new_value, "engine config updated");
    }

    // ============ Loop ============

    /// Open a leveraged position; commits fully or not at all
    pub fn execute_loop<H: Host>(&mut self, host: &mut H, params: &LoopParams) -> LoopResult<LoopReport> {
        let cache = self.prepare(&*host, params)?;
        let _guard = self.locks.acquire(params.beneficiary)?;

        let sequence = self.sequence + 1;
        let snapshot = host.checkpoint();
        let mut staged = EventLog::new();

        match self.run_loop(host, params, &cache, sequence, &mut staged) {
            Ok(report) => {
                self.publish(sequence, &mut staged);
                info!(
                    beneficiary = %short_key(&params.beneficiary),
                    iterations = report.iterations,
                    leverage_bps = report.achieved_leverage_bps,
                    health_factor_bps = report.final_health_factor_bps,
                    termination = ?report.termination,
                    "leverage loop committed"
                );
                Ok(report)
            }
            Err(err) => {
                host.restore(snapshot);
                warn!(
                    beneficiary = %short_key(&params.beneficiary),
                    code = err.code(),
                    phase = err.phase().label(),
                    "leverage loop aborted, host state restored"
                );
                Err(err)
            }
        }
    }

    /// Estimate a loop against current market state without any effect
    pub fn preview_loop<H: Host>(&self, host: &H, params: &LoopParams) -> LoopResult<LoopPreview> {
        let cache = self.prepare(host, params)?;

        let base = host
            .account_health(params.beneficiary)
            .map_err(|e| e.during(Phase::HealthCheck, params.collateral_asset))?;
        let liquidity = host
            .available_liquidity(params.debt_asset)
            .map_err(|e| e.during(Phase::Borrow, params.debt_asset))?;

        let mut backend = DryRunBackend {
            host,
            params,
            cache,
            base,
            liquidity,
            borrowed: 0,
            swapped_in: 0,
            swapped_out: 0,
        };
        let mut state = LoopState {
            collateral: params.initial_margin,
            ..LoopState::default()
        };
        let mut rounds = Vec::new();
        let termination = iterate(&mut backend, params, &cache, self.config.max_iterations, &mut state, &mut rounds)?;
        let final_health_factor_bps = backend
            .health_factor(&state)
            .map_err(|e| e.during(Phase::HealthCheck, params.collateral_asset))?;
        let achieved_leverage_bps = self.conclude(params, &cache, &state, termination)?;

        debug!(
            beneficiary = %short_key(&params.beneficiary),
            iterations = state.iterations,
            leverage_bps = achieved_leverage_bps,
            "leverage loop previewed"
        );

        Ok(LoopPreview {
            iterations: state.iterations,
            final_collateral: state.collateral,
            final_debt: state.debt,
            final_health_factor_bps,
            achieved_leverage_bps,
            termination,
        })
    }

    /// Every check that must pass before the first external effect
    fn prepare<H: Host>(&self, host: &H, params: &LoopParams) -> LoopResult<LoopCache> {
        require_not_paused(self.config.paused)?;
        validate_loop_params(
            params,
            self.config.min_health_factor_floor_bps,
            self.config.max_slippage_bps,
        )?;
        self.locks.ensure_free(params.beneficiary)?;

        let (collateral_asset, debt_asset) = (params.collateral_asset, params.debt_asset);
        if !host.pair_exists(debt_asset, collateral_asset) {
            return Err(LoopError::NoConversionPath {
                asset_in: debt_asset,
                asset_out: collateral_asset,
            });
        }

        let collateral = host.asset_config(collateral_asset)?;
        let debt = host.asset_config(debt_asset)?;
        if !collateral.collateral_enabled {
            return Err(LoopError::AssetNotCollateral { asset: collateral_asset });
        }
        if !debt.borrow_enabled {
            return Err(LoopError::AssetNotBorrowable { asset: debt_asset });
        }
        pow10(collateral.decimals)?;
        pow10(debt.decimals)?;

        let collateral_price = fetch_price(host, collateral_asset)?;
        let debt_price = fetch_price(host, debt_asset)?;

        require_leverage_within_ceiling(
            params.target_leverage_bps,
            collateral.ltv_bps,
            collateral.liquidation_threshold_bps,
            params.min_health_factor_bps,
        )?;

        let margin_value = to_value(params.initial_margin, collateral.decimals, collateral_price)?;
        Ok(LoopCache {
            collateral_decimals: collateral.decimals,
            debt_decimals: debt.decimals,
            collateral_price,
            debt_price,
            ltv_bps: collateral.ltv_bps,
            liquidation_threshold_bps: collateral.liquidation_threshold_bps,
            target_collateral_value: apply_bps(margin_value, params.target_leverage_bps)?,
            slippage_bps: params.max_slippage_bps,
            min_health_factor_bps: params.min_health_factor_bps,
            dust_value: self.config.dust_value,
        })
    }

    fn run_loop<H: Host>(
        &self,
        host: &mut H,
        params: &LoopParams,
        cache: &LoopCache,
        sequence: u64,
        staged: &mut EventLog,
    ) -> LoopResult<LoopReport> {
        let operator = self.identity;
        let collateral_asset = params.collateral_asset;

        host.transfer_from(collateral_asset, operator, params.caller, operator, params.initial_margin)
            .map_err(|e| e.during(Phase::Pull, collateral_asset))?;
        host.supply(operator, collateral_asset, params.initial_margin, params.beneficiary)
            .map_err(|e| e.during(Phase::Supply, collateral_asset))?;

        let mut backend = LiveBackend { host, operator, params };
        let mut state = LoopState {
            collateral: params.initial_margin,
            ..LoopState::default()
        };
        let mut rounds = Vec::new();
        let termination = iterate(&mut backend, params, cache, self.config.max_iterations, &mut state, &mut rounds)?;
        let final_health_factor_bps = backend
            .health_factor(&state)
            .map_err(|e| e.during(Phase::HealthCheck, collateral_asset))?;
        let achieved_leverage_bps = self.conclude(params, cache, &state, termination)?;

        for round in &rounds {
            staged.emit(LoopEvent::LoopIteration {
                beneficiary: params.beneficiary,
                iteration: round.iteration,
                borrowed: round.borrowed,
                received: round.received,
                health_factor_bps: round.health_factor_bps,
                sequence,
            });
        }
        staged.emit(LoopEvent::LoopExecuted {
            caller: params.caller,
            beneficiary: params.beneficiary,
            collateral_asset,
            debt_asset: params.debt_asset,
            margin: params.initial_margin,
            collateral: state.collateral,
            debt: state.debt,
            iterations: state.iterations,
            health_factor_bps: final_health_factor_bps,
            leverage_bps: achieved_leverage_bps,
            termination,
            sequence,
        });

        Ok(LoopReport {
            iterations: state.iterations,
            final_collateral: state.collateral,
            final_debt: state.debt,
            final_health_factor_bps,
            achieved_leverage_bps,
            termination,
            rounds,
        })
    }

    /// Achieved leverage, or the cap error when the policy says to abort
    fn conclude(
        &self,
        params: &LoopParams,
        cache: &LoopCache,
        state: &LoopState,
        termination: Termination,
    ) -> LoopResult<u64> {
        let margin_value = to_value(params.initial_margin, cache.collateral_decimals, cache.collateral_price)?;
        let collateral_value = to_value(state.collateral, cache.collateral_decimals, cache.collateral_price)?;
        let achieved_bps = leverage_bps(collateral_value, margin_value)?;

        if termination == Termination::IterationCap && self.config.cap_policy == CapPolicy::Abort {
            return Err(LoopError::IterationCapReached {
                iterations: state.iterations,
                achieved_bps,
                target_bps: params.target_leverage_bps,
            });
        }
        Ok(achieved_bps)
    }
}

pub(crate) fn fetch_price<H: Host>(host: &H, asset: AssetId) -> LoopResult<u128> {
    host.price(asset)
        .ok()
        .filter(|price| *price > 0)
        .ok_or(LoopError::PriceUnavailable { asset })
}

// ============ Iteration ============

/// Effects one iteration needs, live or simulated
trait LoopBackend {
    fn available_liquidity(&self) -> LoopResult<u128>;
    fn borrow(&mut self, amount: u128) -> LoopResult<()>;
    fn quote_out(&self, amount_in: u128) -> LoopResult<u128>;
    fn quote_in(&self, amount_out: u128) -> LoopResult<u128>;
    fn swap(&mut self, amount_in: u128, min_out: u128) -> LoopResult<u128>;
    fn deposit(&mut self, amount: u128) -> LoopResult<()>;
    fn health_factor(&self, state: &LoopState) -> LoopResult<u64>;
}

/// Run borrow -> swap -> deposit rounds until a termination condition
fn iterate<B: LoopBackend>(
    backend: &mut B,
    params: &LoopParams,
    cache: &LoopCache,
    max_iterations: u8,
    state: &mut LoopState,
    rounds: &mut Vec<IterationRecord>,
) -> LoopResult<Termination> {
    let (collateral_asset, debt_asset) = (params.collateral_asset, params.debt_asset);

    loop {
        let collateral_value = to_value(state.collateral, cache.collateral_decimals, cache.collateral_price)?;
        if collateral_value >= cache.target_collateral_value {
            return Ok(Termination::TargetReached);
        }
        if state.iterations >= max_iterations {
            return Ok(Termination::IterationCap);
        }

        let debt_value = to_value_ceil(state.debt, cache.debt_decimals, cache.debt_price)?;
        let step = size_borrow(
            collateral_value,
            debt_value,
            cache.ltv_bps,
            cache.liquidation_threshold_bps,
            cache.min_health_factor_bps,
            cache.debt_price,
            cache.debt_decimals,
        )?;

        // Debt that buys exactly the collateral still missing
        let missing = to_native_ceil(
            cache.target_collateral_value - collateral_value,
            cache.collateral_decimals,
            cache.collateral_price,
        )?;
        let to_target = match backend.quote_in(missing) {
            Ok(amount) => amount,
            // The exchange cannot deliver that much; the target does not bind
            Err(LoopError::InsufficientLiquidity { .. }) => u128::MAX,
            Err(err) => return Err(err.during(Phase::Swap, debt_asset)),
        };
        let liquidity = backend
            .available_liquidity()
            .map_err(|e| e.during(Phase::Borrow, debt_asset))?;

        let borrow = step.increment.min(to_target).min(liquidity);
        if borrow == 0 || to_value(borrow, cache.debt_decimals, cache.debt_price)? < cache.dust_value {
            return Ok(Termination::BorrowExhausted);
        }

        backend.borrow(borrow).map_err(|e| e.during(Phase::Borrow, debt_asset))?;

        let quote = backend.quote_out(borrow).map_err(|e| e.during(Phase::Swap, debt_asset))?;
        let min_out = discount_bps(quote, cache.slippage_bps)?;
        let received = backend
            .swap(borrow, min_out)
            .map_err(|e| e.during(Phase::Swap, debt_asset))?;
        if received < min_out {
            return Err(LoopError::SlippageExceeded { minimum_out: min_out, received }
                .during(Phase::Swap, debt_asset));
        }

        backend
            .deposit(received)
            .map_err(|e| e.during(Phase::Deposit, collateral_asset))?;

        state.collateral = safe_add(state.collateral, received)?;
        state.debt = safe_add(state.debt, borrow)?;
        state.iterations += 1;

        let health_factor_bps = backend
            .health_factor(state)
            .map_err(|e| e.during(Phase::HealthCheck, collateral_asset))?;
        require_health_factor(health_factor_bps, cache.min_health_factor_bps)?;

        debug!(
            iteration = state.iterations,
            borrowed = borrow,
            received,
            health_factor_bps,
            clamped_by_health = step.clamped_by_health,
            "loop iteration"
        );
        rounds.push(IterationRecord {
            iteration: state.iterations - 1,
            borrowed: borrow,
            received,
            health_factor_bps,
        });
    }
}

// ============ Backends ============

/// Performs every step against the host
struct LiveBackend<'a, H> {
    host: &'a mut H,
    operator: Address,
    params: &'a LoopParams,
}

impl<H: Host> LoopBackend for LiveBackend<'_, H> {
    fn available_liquidity(&self) -> LoopResult<u128> {
        self.host.available_liquidity(self.params.debt_asset)
    }

    fn borrow(&mut self, amount: u128) -> LoopResult<()> {
        self.host.borrow(self.operator, self.params.debt_asset, amount, self.params.beneficiary)
    }

    fn quote_out(&self, amount_in: u128) -> LoopResult<u128> {
        self.host.quote_out(self.params.debt_asset, self.params.collateral_asset, amount_in)
    }

    fn quote_in(&self, amount_out: u128) -> LoopResult<u128> {
        self.host.quote_in(self.params.debt_asset, self.params.collateral_asset, amount_out)
    }

    fn swap(&mut self, amount_in: u128, min_out: u128) -> LoopResult<u128> {
        self.host.swap(
            self.params.debt_asset,
            self.params.collateral_asset,
            amount_in,
            min_out,
            self.operator,
            self.operator,
        )
    }

    fn deposit(&mut self, amount: u128) -> LoopResult<()> {
        self.host.supply(self.operator, self.params.collateral_asset, amount, self.params.beneficiary)
    }

    fn health_factor(&self, _state: &LoopState) -> LoopResult<u64> {
        Ok(self.host.account_health(self.params.beneficiary)?.health_factor_bps)
    }
}

/// Answers from quotes and local arithmetic; never mutates the host
///
/// Swaps are quoted cumulatively against the untouched pool, so later
/// rounds still see the price impact of earlier ones.
struct DryRunBackend<'a, H> {
    host: &'a H,
    params: &'a LoopParams,
    cache: LoopCache,
    /// Beneficiary's account before the loop
    base: AccountHealth,
    liquidity: u128,
    borrowed: u128,
    swapped_in: u128,
    swapped_out: u128,
}

impl<H: Host> LoopBackend for DryRunBackend<'_, H> {
    fn available_liquidity(&self) -> LoopResult<u128> {
        Ok(self.liquidity.saturating_sub(self.borrowed))
    }

    fn borrow(&mut self, amount: u128) -> LoopResult<()> {
        let available = self.available_liquidity()?;
        if amount > available {
            return Err(LoopError::InsufficientLiquidity { available, requested: amount });
        }
        self.borrowed = safe_add(self.borrowed, amount)?;
        Ok(())
    }

    fn quote_out(&self, amount_in: u128) -> LoopResult<u128> {
        let total = self.host.quote_out(
            self.params.debt_asset,
            self.params.collateral_asset,
            safe_add(self.swapped_in, amount_in)?,
        )?;
        Ok(total.saturating_sub(self.swapped_out))
    }

    fn quote_in(&self, amount_out: u128) -> LoopResult<u128> {
        let total = self.host.quote_in(
            self.params.debt_asset,
            self.params.collateral_asset,
            safe_add(self.swapped_out, amount_out)?,
        )?;
        Ok(total.saturating_sub(self.swapped_in))
    }

    fn swap(&mut self, amount_in: u128, _min_out: u128) -> LoopResult<u128> {
        let out = self.quote_out(amount_in)?;
        self.swapped_in = safe_add(self.swapped_in, amount_in)?;
        self.swapped_out = safe_add(self.swapped_out, out)?;
        Ok(out)
    }

    fn deposit(&mut self, _amount: u128) -> LoopResult<()> {
        Ok(())
    }

    fn health_factor(&self, state: &LoopState) -> LoopResult<u64> {
        let cache = &self.cache;
        let added_value = to_value(state.collateral, cache.collateral_decimals, cache.collateral_price)?;
        let weighted = safe_add(
            weight(self.base.collateral_value, self.base.liquidation_threshold_bps)?,
            weight(added_value, cache.liquidation_threshold_bps)?,
        )?;
        let debt_value = safe_add(
            self.base.debt_value,
            to_value_ceil(state.debt, cache.debt_decimals, cache.debt_price)?,
        )?;
        if debt_value == 0 {
            return Ok(health::NO_DEBT_HEALTH_FACTOR);
        }
        let hf = mul_div(weighted, 1, debt_value)?;
        Ok(hf.min(u64::MAX as u128) as u64)
    }
}

fn weight(value: u128, threshold_bps: u64) -> LoopResult<u128> {
    value.checked_mul(threshold_bps as u128).ok_or(LoopError::Overflow)
}
