//! Unwind Engine
//!
//! Reduces or closes a looped position: sells collateral for the debt asset,
//! repays the beneficiary's debt, then releases collateral to the recipient.
//!
//! The market refuses any withdrawal that would leave the account
//! liquidatable, so the repay phase runs in rounds. Each round withdraws at
//! most what the current debt allows, swaps it and repays. Repaying frees
//! more collateral for the next round.

use tracing::{debug, info, warn};

use leverloop_common::{
    constants::{bps, unwind},
    errors::{LoopError, LoopResult, Phase},
    events::{EventLog, LoopEvent},
    market::Host,
    math::{discount_bps, inflate_bps, mul_div, safe_add, safe_sub, to_native},
    types::{Address, AssetId, UnwindParams, UnwindReport},
    validation::{require_not_paused, validate_unwind_params},
};

use crate::engine::{fetch_price, short_key, LoopEngine};

/// Totals accumulated across repay rounds
#[derive(Debug, Default)]
struct RepayProgress {
    repaid: u128,
    sold: u128,
    surplus: u128,
    rounds: u8,
}

impl LoopEngine {
    /// Repay debt from collateral and release collateral; commits fully or not at all
    pub fn unwind_loop<H: Host>(&mut self, host: &mut H, params: &UnwindParams) -> LoopResult<UnwindReport> {
        require_not_paused(self.config.paused)?;
        validate_unwind_params(params, self.config.max_slippage_bps)?;
        let _guard = self.locks.acquire(params.beneficiary)?;

        let sequence = self.sequence + 1;
        let snapshot = host.checkpoint();
        let mut staged = EventLog::new();

        match self.run_unwind(host, params, sequence, &mut staged) {
            Ok(report) => {
                self.publish(sequence, &mut staged);
                info!(
                    beneficiary = %short_key(&params.beneficiary),
                    debt_repaid = report.debt_repaid,
                    collateral_withdrawn = report.collateral_withdrawn,
                    fully_closed = report.is_fully_closed(),
                    "unwind committed"
                );
                Ok(report)
            }
            Err(err) => {
                host.restore(snapshot);
                warn!(
                    beneficiary = %short_key(&params.beneficiary),
                    code = err.code(),
                    phase = err.phase().label(),
                    "unwind aborted, host state restored"
                );
                Err(err)
            }
        }
    }

    fn run_unwind<H: Host>(
        &self,
        host: &mut H,
        params: &UnwindParams,
        sequence: u64,
        staged: &mut EventLog,
    ) -> LoopResult<UnwindReport> {
        let operator = self.identity;
        let (collateral_asset, debt_asset) = (params.collateral_asset, params.debt_asset);

        let live_debt = host
            .debt_balance(debt_asset, params.beneficiary)
            .map_err(|e| e.during(Phase::Repay, debt_asset))?;
        let repay_target = params.repay.resolve(live_debt);

        let mut progress = RepayProgress::default();
        if repay_target > 0 {
            if !host.pair_exists(collateral_asset, debt_asset) {
                return Err(LoopError::NoConversionPath {
                    asset_in: collateral_asset,
                    asset_out: debt_asset,
                });
            }
            self.repay_from_collateral(host, params, repay_target, &mut progress)?;
        }

        if progress.surplus > 0 {
            host.transfer(debt_asset, operator, params.recipient, progress.surplus)
                .map_err(|e| e.during(Phase::Transfer, debt_asset))?;
        }

        let live_collateral = host
            .collateral_balance(collateral_asset, params.beneficiary)
            .map_err(|e| e.during(Phase::Withdraw, collateral_asset))?;
        let to_withdraw = params.withdraw.resolve(live_collateral);
        let collateral_withdrawn = if to_withdraw > 0 {
            host.withdraw(operator, collateral_asset, to_withdraw, params.beneficiary, params.recipient)
                .map_err(|e| e.during(Phase::Withdraw, collateral_asset))?
        } else {
            0
        };

        let remaining_collateral = host
            .collateral_balance(collateral_asset, params.beneficiary)
            .map_err(|e| e.during(Phase::Withdraw, collateral_asset))?;
        let remaining_debt = host
            .debt_balance(debt_asset, params.beneficiary)
            .map_err(|e| e.during(Phase::Repay, debt_asset))?;

        staged.emit(LoopEvent::LoopUnwound {
            beneficiary: params.beneficiary,
            recipient: params.recipient,
            collateral_asset,
            debt_asset,
            debt_repaid: progress.repaid,
            collateral_sold: progress.sold,
            collateral_withdrawn,
            debt_surplus: progress.surplus,
            sequence,
        });

        Ok(UnwindReport {
            debt_repaid: progress.repaid,
            collateral_sold: progress.sold,
            collateral_withdrawn,
            debt_surplus: progress.surplus,
            remaining_collateral,
            remaining_debt,
        })
    }

    /// Sell collateral and repay until `target` debt is gone
    fn repay_from_collateral<H: Host>(
        &self,
        host: &mut H,
        params: &UnwindParams,
        target: u128,
        progress: &mut RepayProgress,
    ) -> LoopResult<()> {
        let operator = self.identity;
        let (collateral_asset, debt_asset) = (params.collateral_asset, params.debt_asset);

        let config = host.asset_config(collateral_asset)?;
        let price = fetch_price(&*host, collateral_asset)?;
        let mut remaining = target;

        while remaining > 0 && progress.rounds < unwind::MAX_REPAY_ROUNDS {
            let live_collateral = host
                .collateral_balance(collateral_asset, params.beneficiary)
                .map_err(|e| e.during(Phase::Withdraw, collateral_asset))?;
            if live_collateral == 0 {
                break;
            }

            let needed = host
                .quote_in(collateral_asset, debt_asset, remaining)
                .map_err(|e| e.during(Phase::Swap, collateral_asset))?;
            let want = inflate_bps(needed, params.max_slippage_bps)?.min(live_collateral);

            let free = withdrawable(&*host, params.beneficiary, collateral_asset, config.liquidation_threshold_bps, config.decimals, price)?;
            let chunk = want.min(free);
            if chunk == 0 {
                let health_factor_bps = host
                    .account_health(params.beneficiary)
                    .map_err(|e| e.during(Phase::Withdraw, collateral_asset))?
                    .health_factor_bps;
                return Err(LoopError::WouldBeLiquidatable { health_factor_bps }
                    .during(Phase::Withdraw, collateral_asset));
            }

            let withdrawn = host
                .withdraw(operator, collateral_asset, chunk, params.beneficiary, operator)
                .map_err(|e| e.during(Phase::Withdraw, collateral_asset))?;

            let quote = host
                .quote_out(collateral_asset, debt_asset, withdrawn)
                .map_err(|e| e.during(Phase::Swap, collateral_asset))?;
            let min_out = discount_bps(quote, params.max_slippage_bps)?;
            let received = host
                .swap(collateral_asset, debt_asset, withdrawn, min_out, operator, operator)
                .map_err(|e| e.during(Phase::Swap, collateral_asset))?;
            if received < min_out {
                return Err(LoopError::SlippageExceeded { minimum_out: min_out, received }
                    .during(Phase::Swap, collateral_asset));
            }

            let repaid = host
                .repay(operator, debt_asset, received.min(remaining), params.beneficiary)
                .map_err(|e| e.during(Phase::Repay, debt_asset))?;

            remaining = safe_sub(remaining, repaid)?;
            progress.repaid = safe_add(progress.repaid, repaid)?;
            progress.sold = safe_add(progress.sold, withdrawn)?;
            progress.surplus = safe_add(progress.surplus, safe_sub(received, repaid)?)?;
            progress.rounds += 1;

            debug!(
                round = progress.rounds,
                withdrawn,
                received,
                repaid,
                remaining,
                "unwind repay round"
            );
        }

        if remaining == 0 {
            return Ok(());
        }
        if progress.rounds >= unwind::MAX_REPAY_ROUNDS {
            let achieved_bps = mul_div(progress.repaid, bps::ONE as u128, target)? as u64;
            return Err(LoopError::IterationCapReached {
                iterations: progress.rounds,
                achieved_bps,
                target_bps: bps::ONE,
            }
            .during(Phase::Repay, debt_asset));
        }
        Err(LoopError::InsufficientCollateral { available: 0, requested: remaining }
            .during(Phase::Repay, debt_asset))
    }
}

/// Collateral the market will release while keeping a small health buffer
///
/// Withdrawing `v` of value lowers the weighted threshold sum by
/// `v * lt_asset`; the account must keep `debt * (1 + buffer)` of it.
fn withdrawable<H: Host>(
    host: &H,
    beneficiary: Address,
    asset: AssetId,
    asset_threshold_bps: u64,
    decimals: u8,
    price: u128,
) -> LoopResult<u128> {
    let health = host
        .account_health(beneficiary)
        .map_err(|e| e.during(Phase::Withdraw, asset))?;
    if health.debt_value == 0 {
        return Ok(u128::MAX);
    }
    if asset_threshold_bps == 0 {
        return Ok(0);
    }

    let weighted = health
        .collateral_value
        .checked_mul(health.liquidation_threshold_bps as u128)
        .ok_or(LoopError::Overflow)?;
    let required = health
        .debt_value
        .checked_mul((bps::ONE + unwind::WITHDRAW_HEALTH_BUFFER_BPS) as u128)
        .ok_or(LoopError::Overflow)?;
    let free_value = weighted.saturating_sub(required) / asset_threshold_bps as u128;
    to_native(free_value, decimals, price)
}
