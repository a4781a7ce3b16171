//! Integration Tests
//!
//! Full loops and unwinds against the simulated chain: a CPMM exchange with
//! a 0.3% fee, a lending market that enforces LTV on borrow and health on
//! withdraw, and whole-chain checkpoints.

#[cfg(test)]
mod tests {
    use crate::sim::*;
    use crate::*;
    use leverloop_common::{
        errors::{LoopError, Phase},
        events::{EventType, LoopEvent},
        market::{LendingMarket, TokenLedger},
        math::to_value,
        types::{Address, AmountOrAll, AssetConfig, LoopParams, Termination, UnwindParams},
    };
    use proptest::prelude::*;

    const ENGINE: Address = [0xe0; 32];
    const ALICE: Address = [0xa1; 32];
    const BOB: Address = [0xb0; 32];
    const CAROL: Address = [0xc0; 32];

    // ============================================================================
    // Fixtures
    // ============================================================================

    /// Reference market with ALICE funded and the engine approved
    fn funded_chain() -> SimChain {
        let mut chain = SimChain::reference();
        chain.mint(WETH, ALICE, 100 * ONE_ETH);
        chain.mint(WBTC, ALICE, 10 * ONE_BTC);
        chain.approve(WETH, ALICE, ENGINE, u128::MAX).unwrap();
        chain.approve(WBTC, ALICE, ENGINE, u128::MAX).unwrap();
        chain
    }

    fn delegated() -> BeneficiaryAddressed<SimChain> {
        BeneficiaryAddressed::new(funded_chain())
    }

    fn loop_params(target_leverage_bps: u64) -> LoopParams {
        LoopParams {
            collateral_asset: WETH,
            debt_asset: USDC,
            caller: ALICE,
            beneficiary: ALICE,
            initial_margin: 10 * ONE_ETH,
            target_leverage_bps,
            min_health_factor_bps: 11_000,
            max_slippage_bps: 100,
        }
    }

    fn within_bps(actual: u128, expected: u128, tolerance_bps: u128) -> bool {
        actual.abs_diff(expected) * 10_000 <= expected * tolerance_bps
    }

    fn assert_untouched<H: LendingMarket + TokenLedger>(host: &H) {
        assert_eq!(host.balance_of(WETH, ALICE), 100 * ONE_ETH);
        assert_eq!(host.collateral_balance(WETH, ALICE).unwrap(), 0);
        assert_eq!(host.debt_balance(USDC, ALICE).unwrap(), 0);
        assert_eq!(host.balance_of(WETH, ENGINE), 0);
        assert_eq!(host.balance_of(USDC, ENGINE), 0);
    }

    // ============================================================================
    // Reference Loop
    // ============================================================================

    #[test]
    fn test_two_x_loop_reaches_target_in_two_rounds() {
        let mut host = delegated();
        let mut engine = LoopEngine::new(ENGINE);

        let report = engine.execute_loop(&mut host, &loop_params(20_000)).unwrap();

        // First round is clamped by the 1.1 minimum: 20000 * 0.825 / 1.1
        assert_eq!(report.rounds[0].borrowed, 15_000 * ONE_USDC);
        assert_eq!(report.iterations, 2);
        assert_eq!(report.termination, Termination::TargetReached);
        assert!(report.final_collateral >= 20 * ONE_ETH);
        assert!(report.final_collateral < 20 * ONE_ETH + ONE_ETH / 1_000);
        assert!(report.final_debt > 20_000 * ONE_USDC);
        assert!(report.final_debt < 20_400 * ONE_USDC);
        assert!(report.achieved_leverage_bps >= 20_000);
        assert!(report.final_health_factor_bps >= 16_000);
        assert!(report.rounds.iter().all(|r| r.health_factor_bps >= 11_000));

        // Market agrees with the report; the engine holds nothing
        assert_eq!(host.collateral_balance(WETH, ALICE).unwrap(), report.final_collateral);
        assert_eq!(host.debt_balance(USDC, ALICE).unwrap(), report.final_debt);
        assert_eq!(host.balance_of(WETH, ALICE), 90 * ONE_ETH);
        assert_eq!(host.balance_of(WETH, ENGINE), 0);
        assert_eq!(host.balance_of(USDC, ENGINE), 0);
        assert_eq!(
            host.account_health(ALICE).unwrap().health_factor_bps,
            report.final_health_factor_bps
        );
    }

    #[test]
    fn test_unit_leverage_only_deposits() {
        let mut host = delegated();
        let mut engine = LoopEngine::new(ENGINE);

        let report = engine.execute_loop(&mut host, &loop_params(10_000)).unwrap();

        assert_eq!(report.iterations, 0);
        assert_eq!(report.termination, Termination::TargetReached);
        assert_eq!(report.final_collateral, 10 * ONE_ETH);
        assert_eq!(report.final_debt, 0);
        assert_eq!(report.final_health_factor_bps, u64::MAX);
        assert_eq!(report.achieved_leverage_bps, 10_000);
        assert_eq!(host.inner().swaps_executed(), 0);
        assert_eq!(host.collateral_balance(WETH, ALICE).unwrap(), 10 * ONE_ETH);
    }

    #[test]
    fn test_eight_decimal_collateral() {
        let mut host = delegated();
        let mut engine = LoopEngine::new(ENGINE);
        let params = LoopParams {
            collateral_asset: WBTC,
            initial_margin: ONE_BTC,
            ..loop_params(20_000)
        };

        let report = engine.execute_loop(&mut host, &params).unwrap();

        assert_eq!(report.termination, Termination::TargetReached);
        assert!(report.final_collateral >= 2 * ONE_BTC);
        assert!(report.achieved_leverage_bps >= 20_000);
        assert!(report.final_health_factor_bps >= 11_000);
        assert_eq!(host.balance_of(WBTC, ALICE), 9 * ONE_BTC);
    }

    #[test]
    fn test_thin_liquidity_exhausts_borrowing() {
        let mut chain = SimChain::new(DEFAULT_SWAP_FEE_BPS);
        let weth = AssetConfig {
            decimals: 18,
            ltv_bps: 8_000,
            liquidation_threshold_bps: 8_250,
            collateral_enabled: true,
            borrow_enabled: true,
        };
        let usdc = AssetConfig { decimals: 6, liquidation_threshold_bps: 8_500, ..weth };
        chain.list_asset(WETH, weth, ETH_PRICE);
        chain.list_asset(USDC, usdc, USDC_PRICE);
        chain.add_pool(WETH, USDC, 1_000 * ONE_ETH, 2_000_000 * ONE_USDC);
        chain.mint(USDC, MARKET, 1_000 * ONE_USDC);
        chain.mint(WETH, ALICE, 10 * ONE_ETH);
        chain.approve(WETH, ALICE, ENGINE, u128::MAX).unwrap();
        let mut host = BeneficiaryAddressed::new(chain);

        let report = LoopEngine::new(ENGINE)
            .execute_loop(&mut host, &loop_params(20_000))
            .unwrap();

        assert_eq!(report.iterations, 1);
        assert_eq!(report.final_debt, 1_000 * ONE_USDC);
        assert_eq!(report.termination, Termination::BorrowExhausted);
    }

    // ============================================================================
    // Iteration Cap
    // ============================================================================

    #[test]
    fn test_near_ceiling_target_stops_at_cap() {
        let mut host = delegated();
        let mut engine = LoopEngine::new(ENGINE);

        let report = engine.execute_loop(&mut host, &loop_params(39_000)).unwrap();

        assert_eq!(report.iterations, 10);
        assert_eq!(report.termination, Termination::IterationCap);
        assert!(report.achieved_leverage_bps < 39_000);
        assert!(report.achieved_leverage_bps > 35_000);
        assert!(report.final_health_factor_bps >= 11_000);
    }

    #[test]
    fn test_cap_policy_decides_commit_or_abort() {
        let mut engine = LoopEngine::new(ENGINE);
        engine.set_max_iterations(1).unwrap();

        let mut host = delegated();
        let report = engine.execute_loop(&mut host, &loop_params(20_000)).unwrap();
        assert_eq!(report.iterations, 1);
        assert_eq!(report.termination, Termination::IterationCap);
        assert!(report.achieved_leverage_bps > 17_000);
        assert!(report.achieved_leverage_bps < 18_000);

        engine.set_cap_policy(CapPolicy::Abort);
        engine.take_events();
        let sequence = engine.sequence();

        let mut host = delegated();
        let err = engine.execute_loop(&mut host, &loop_params(20_000)).unwrap_err();
        assert!(matches!(
            err,
            LoopError::IterationCapReached { iterations: 1, target_bps: 20_000, .. }
        ));
        assert_eq!(err.phase(), Phase::Loop);
        assert_untouched(&host);
        assert!(engine.events().is_empty());
        assert_eq!(engine.sequence(), sequence);
    }

    // ============================================================================
    // Prechecks
    // ============================================================================

    #[test]
    fn test_target_above_market_ceiling_rejected() {
        let mut host = delegated();
        let mut engine = LoopEngine::new(ENGINE);

        // 0.825 / 1.1 = 0.75 => ceiling 4x
        let err = engine.execute_loop(&mut host, &loop_params(45_000)).unwrap_err();
        assert_eq!(
            err,
            LoopError::ExcessiveLeverage { requested_bps: 45_000, ceiling_bps: 40_000 }
        );
        assert_untouched(&host);
    }

    #[test]
    fn test_market_prechecks() {
        let mut engine = LoopEngine::new(ENGINE);

        let mut host = delegated();
        let params = LoopParams { debt_asset: MEME, ..loop_params(20_000) };
        assert!(matches!(
            engine.execute_loop(&mut host, &params),
            Err(LoopError::NoConversionPath { .. })
        ));

        host.inner_mut().add_pool(MEME, USDC, 1_000_000 * ONE_ETH, 500_000 * ONE_USDC);
        let params = LoopParams { collateral_asset: MEME, ..loop_params(20_000) };
        assert_eq!(
            engine.execute_loop(&mut host, &params),
            Err(LoopError::AssetNotCollateral { asset: MEME })
        );

        let params = LoopParams { debt_asset: WETH, ..loop_params(20_000) };
        assert_eq!(
            engine.execute_loop(&mut host, &params),
            Err(LoopError::IdenticalAssets { asset: WETH })
        );

        host.inner_mut().set_price(WETH, 0);
        assert_eq!(
            engine.execute_loop(&mut host, &loop_params(20_000)),
            Err(LoopError::PriceUnavailable { asset: WETH })
        );
        assert!(engine.events().is_empty());
    }

    #[test]
    fn test_paused_engine_rejects_everything() {
        let mut host = delegated();
        let mut engine = LoopEngine::new(ENGINE);
        engine.pause();

        assert_eq!(
            engine.execute_loop(&mut host, &loop_params(20_000)),
            Err(LoopError::ProtocolPaused)
        );
        assert_eq!(
            engine.preview_loop(&host, &loop_params(20_000)),
            Err(LoopError::ProtocolPaused)
        );

        engine.unpause();
        assert!(engine.execute_loop(&mut host, &loop_params(20_000)).is_ok());
    }

    // ============================================================================
    // Atomicity
    // ============================================================================

    #[test]
    fn test_health_breach_rolls_back_everything() {
        let mut host = delegated();
        // Collateral price collapses right after the first swap
        host.inner_mut().schedule_price(WETH, 1, 1_000_00000000);
        let mut engine = LoopEngine::new(ENGINE);

        let err = engine.execute_loop(&mut host, &loop_params(20_000)).unwrap_err();

        assert!(matches!(err, LoopError::HealthFactorBreached { minimum_bps: 11_000, .. }));
        assert_eq!(err.phase(), Phase::HealthCheck);
        assert_untouched(&host);
        assert_eq!(host.inner().swaps_executed(), 0);
        assert_eq!(host.inner().reserves(USDC, WETH).unwrap(), (2_000_000 * ONE_USDC, 1_000 * ONE_ETH));
        assert!(engine.events().is_empty());
        assert_eq!(engine.sequence(), 0);
    }

    #[test]
    fn test_slippage_failure_rolls_back() {
        let mut host = delegated();
        host.inner_mut().set_swap_haircut_bps(300);
        let mut engine = LoopEngine::new(ENGINE);

        let err = engine.execute_loop(&mut host, &loop_params(20_000)).unwrap_err();

        assert!(matches!(err.root_cause(), LoopError::SlippageExceeded { .. }));
        assert!(matches!(err, LoopError::Aborted { phase: Phase::Swap, asset: USDC, .. }));
        assert!(err.is_recoverable());
        assert_untouched(&host);
    }

    #[test]
    fn test_missing_allowance_fails_at_pull() {
        let mut host = delegated();
        host.inner_mut().mint(WETH, BOB, 10 * ONE_ETH);
        let params = LoopParams { caller: BOB, beneficiary: BOB, ..loop_params(20_000) };

        let err = LoopEngine::new(ENGINE).execute_loop(&mut host, &params).unwrap_err();

        assert_eq!(err.phase(), Phase::Pull);
        assert!(matches!(err.root_cause(), LoopError::InsufficientAllowance { .. }));
        assert_eq!(host.balance_of(WETH, BOB), 10 * ONE_ETH);
    }

    #[test]
    fn test_events_published_on_commit() {
        let mut host = delegated();
        let mut engine = LoopEngine::new(ENGINE);

        let report = engine.execute_loop(&mut host, &loop_params(20_000)).unwrap();

        assert_eq!(engine.sequence(), 1);
        let iterations = engine.events().filter_by_type(EventType::LoopIteration);
        assert_eq!(iterations.len(), report.iterations as usize);
        let executed = engine.events().filter_by_type(EventType::LoopExecuted);
        assert_eq!(executed.len(), 1);
        match executed[0] {
            LoopEvent::LoopExecuted { margin, debt, termination, sequence, .. } => {
                assert_eq!(*margin, 10 * ONE_ETH);
                assert_eq!(*debt, report.final_debt);
                assert_eq!(*termination, Termination::TargetReached);
                assert_eq!(*sequence, 1);
            }
            other => panic!("unexpected event {:?}", other),
        }

        let bytes = executed[0].to_bytes();
        assert_eq!(LoopEvent::from_bytes(&bytes).as_ref(), Some(executed[0]));
    }

    // ============================================================================
    // Preview
    // ============================================================================

    #[test]
    fn test_preview_tracks_execute() {
        let mut host = delegated();
        let mut engine = LoopEngine::new(ENGINE);

        for target in [15_000, 20_000, 30_000, 39_000] {
            let preview = engine.preview_loop(&host, &loop_params(target)).unwrap();
            assert!(engine.events().is_empty());
            assert_eq!(host.inner().swaps_executed(), 0);

            let snapshot = host.inner().clone();
            let report = engine.execute_loop(&mut host, &loop_params(target)).unwrap();
            *host.inner_mut() = snapshot;

            assert_eq!(preview.iterations, report.iterations, "target {}", target);
            assert_eq!(preview.termination, report.termination);
            assert!(within_bps(preview.final_collateral, report.final_collateral, 10));
            assert!(within_bps(preview.final_debt, report.final_debt, 10));
            assert!(within_bps(
                preview.final_health_factor_bps as u128,
                report.final_health_factor_bps as u128,
                10
            ));
            engine.take_events();
        }
    }

    #[test]
    fn test_preview_uses_existing_position() {
        let mut host = delegated();
        let mut engine = LoopEngine::new(ENGINE);
        engine.execute_loop(&mut host, &loop_params(15_000)).unwrap();

        let preview = engine.preview_loop(&host, &loop_params(15_000)).unwrap();
        let report = engine.execute_loop(&mut host, &loop_params(15_000)).unwrap();

        assert_eq!(preview.iterations, report.iterations);
        assert!(within_bps(
            preview.final_health_factor_bps as u128,
            report.final_health_factor_bps as u128,
            10
        ));
    }

    // ============================================================================
    // Beneficiary Locks
    // ============================================================================

    #[test]
    fn test_concurrent_beneficiary_is_rejected() {
        let mut host = delegated();
        host.inner_mut().mint(WETH, BOB, 10 * ONE_ETH);
        host.approve(WETH, BOB, ENGINE, u128::MAX).unwrap();
        let mut engine = LoopEngine::new(ENGINE);
        let mut sibling = LoopEngine::new(ENGINE).with_locks(engine.locks().clone());

        let guard = engine.locks().acquire(ALICE).unwrap();
        let busy = LoopError::BeneficiaryBusy { beneficiary: ALICE };

        assert_eq!(engine.execute_loop(&mut host, &loop_params(20_000)), Err(busy.clone()));
        assert_eq!(sibling.execute_loop(&mut host, &loop_params(20_000)), Err(busy.clone()));
        assert_eq!(engine.preview_loop(&host, &loop_params(20_000)), Err(busy.clone()));
        assert_eq!(
            engine.unwind_loop(&mut host, &UnwindParams::close_all(WETH, USDC, ALICE, 100)),
            Err(busy)
        );
        assert_untouched(&host);

        // Other beneficiaries proceed
        let params = LoopParams { caller: BOB, beneficiary: BOB, ..loop_params(20_000) };
        assert!(sibling.execute_loop(&mut host, &params).is_ok());

        drop(guard);
        assert!(engine.execute_loop(&mut host, &loop_params(20_000)).is_ok());
        assert_eq!(engine.locks().in_flight(), 0);
    }

    // ============================================================================
    // Unwind
    // ============================================================================

    #[test]
    fn test_loop_then_close_returns_margin_less_costs() {
        let mut host = delegated();
        let mut engine = LoopEngine::new(ENGINE);
        engine.execute_loop(&mut host, &loop_params(20_000)).unwrap();

        let report = engine
            .unwind_loop(&mut host, &UnwindParams::close_all(WETH, USDC, ALICE, 100))
            .unwrap();

        assert!(report.is_fully_closed());
        assert!(report.debt_repaid > 20_000 * ONE_USDC);
        assert_eq!(host.debt_balance(USDC, ALICE).unwrap(), 0);
        assert_eq!(host.collateral_balance(WETH, ALICE).unwrap(), 0);
        assert_eq!(host.balance_of(WETH, ENGINE), 0);
        assert_eq!(host.balance_of(USDC, ENGINE), 0);

        // Fees and price impact only
        let returned_eth = host.balance_of(WETH, ALICE) - 90 * ONE_ETH;
        assert_eq!(returned_eth, report.collateral_withdrawn);
        assert_eq!(host.balance_of(USDC, ALICE), report.debt_surplus);
        let returned_value = to_value(returned_eth, 18, ETH_PRICE).unwrap()
            + to_value(report.debt_surplus, 6, USDC_PRICE).unwrap();
        let margin_value = to_value(10 * ONE_ETH, 18, ETH_PRICE).unwrap();
        assert!(returned_value >= margin_value * 98 / 100);
        assert!(returned_value < margin_value);

        let unwound = engine.events().filter_by_type(EventType::LoopUnwound);
        assert_eq!(unwound.len(), 1);
        assert_eq!(unwound[0].sequence(), 2);
    }

    #[test]
    fn test_price_rise_pays_out_the_leverage() {
        let mut host = delegated();
        let mut engine = LoopEngine::new(ENGINE);
        let opened = engine.execute_loop(&mut host, &loop_params(20_000)).unwrap();

        let risen = ETH_PRICE * 110 / 100;
        host.inner_mut().reprice(WETH, USDC, risen).unwrap();
        let report = engine
            .unwind_loop(&mut host, &UnwindParams::close_all(WETH, USDC, ALICE, 100))
            .unwrap();
        assert!(report.is_fully_closed());

        let returned_value = to_value(report.collateral_withdrawn, 18, risen).unwrap()
            + to_value(report.debt_surplus, 6, USDC_PRICE).unwrap();
        let margin_value = to_value(10 * ONE_ETH, 18, ETH_PRICE).unwrap();
        let profit = returned_value - margin_value;

        // margin * 10% * (leverage - 1), less two swap legs at 0.3% per round
        let leverage_gain =
            margin_value * 1_000 * (opened.achieved_leverage_bps as u128 - 10_000) / 10_000 / 10_000;
        let fee_overhead = margin_value * 60 * opened.iterations as u128 / 10_000;
        assert!(profit >= leverage_gain - fee_overhead);

        // Beats holding the margin, never the frictionless levered move
        assert!(profit > margin_value / 10);
        assert!(profit < margin_value * 1_000 * opened.achieved_leverage_bps as u128 / 10_000 / 10_000);
    }

    #[test]
    fn test_repay_all_without_debt_is_noop() {
        let mut host = delegated();
        let mut engine = LoopEngine::new(ENGINE);
        engine.execute_loop(&mut host, &loop_params(10_000)).unwrap();

        let params = UnwindParams {
            repay: AmountOrAll::All,
            withdraw: AmountOrAll::Amount(0),
            ..UnwindParams::close_all(WETH, USDC, ALICE, 100)
        };
        let report = engine.unwind_loop(&mut host, &params).unwrap();

        assert_eq!(report.debt_repaid, 0);
        assert_eq!(report.collateral_sold, 0);
        assert_eq!(report.collateral_withdrawn, 0);
        assert_eq!(report.remaining_collateral, 10 * ONE_ETH);
        assert_eq!(host.inner().swaps_executed(), 0);
    }

    #[test]
    fn test_unwind_to_third_party_recipient() {
        let mut host = delegated();
        let mut engine = LoopEngine::new(ENGINE);
        engine.execute_loop(&mut host, &loop_params(20_000)).unwrap();

        let params = UnwindParams {
            recipient: CAROL,
            ..UnwindParams::close_all(WETH, USDC, ALICE, 100)
        };
        let report = engine.unwind_loop(&mut host, &params).unwrap();

        assert_eq!(host.balance_of(WETH, CAROL), report.collateral_withdrawn);
        assert_eq!(host.balance_of(USDC, CAROL), report.debt_surplus);
        assert_eq!(host.balance_of(WETH, ALICE), 90 * ONE_ETH);
    }

    #[test]
    fn test_failed_unwind_restores_position() {
        let mut host = delegated();
        let mut engine = LoopEngine::new(ENGINE);
        let opened = engine.execute_loop(&mut host, &loop_params(20_000)).unwrap();
        host.inner_mut().set_swap_haircut_bps(500);

        let err = engine
            .unwind_loop(&mut host, &UnwindParams::close_all(WETH, USDC, ALICE, 100))
            .unwrap_err();

        assert!(matches!(err.root_cause(), LoopError::SlippageExceeded { .. }));
        assert_eq!(host.collateral_balance(WETH, ALICE).unwrap(), opened.final_collateral);
        assert_eq!(host.debt_balance(USDC, ALICE).unwrap(), opened.final_debt);
        assert_eq!(engine.events().filter_by_type(EventType::LoopUnwound).len(), 0);
    }

    // ============================================================================
    // Caller-Addressed Market
    // ============================================================================

    #[test]
    fn test_caller_addressed_market_round_trip() {
        let mut host = CallerAddressed::new(funded_chain(), ALICE);
        let mut engine = LoopEngine::new(ENGINE);

        let report = engine.execute_loop(&mut host, &loop_params(20_000)).unwrap();
        assert_eq!(report.termination, Termination::TargetReached);
        assert_eq!(host.collateral_balance(WETH, ALICE).unwrap(), report.final_collateral);
        assert_eq!(host.debt_balance(USDC, ALICE).unwrap(), report.final_debt);

        let closed = engine
            .unwind_loop(&mut host, &UnwindParams::close_all(WETH, USDC, ALICE, 100))
            .unwrap();
        assert!(closed.is_fully_closed());
        assert_eq!(host.balance_of(USDC, ENGINE), 0);
        assert_eq!(host.balance_of(WETH, ENGINE), 0);
    }

    #[test]
    fn test_caller_addressed_market_refuses_other_beneficiary() {
        let mut host = CallerAddressed::new(funded_chain(), BOB);
        let err = LoopEngine::new(ENGINE)
            .execute_loop(&mut host, &loop_params(20_000))
            .unwrap_err();

        assert_eq!(err.phase(), Phase::Supply);
        assert_eq!(
            err.root_cause(),
            &LoopError::AttributionMismatch { bound: BOB, requested: ALICE }
        );
        assert_untouched(&host);
    }

    // ============================================================================
    // Properties
    // ============================================================================

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn prop_higher_target_never_needs_fewer_rounds(
            margin_eth in 1u128..=50,
            low in 10_000u64..=35_000,
            step in 0u64..=5_000,
        ) {
            let high = (low + step).min(39_000);
            let engine = LoopEngine::new(ENGINE);
            let params = |target| LoopParams {
                initial_margin: margin_eth * ONE_ETH,
                ..loop_params(target)
            };

            let mut first = delegated();
            let low_report = LoopEngine::new(ENGINE).execute_loop(&mut first, &params(low)).unwrap();
            let mut second = delegated();
            let high_report = LoopEngine::new(ENGINE).execute_loop(&mut second, &params(high)).unwrap();

            prop_assert!(low_report.iterations <= high_report.iterations);
            for report in [&low_report, &high_report] {
                prop_assert!(report.iterations <= engine.config().max_iterations);
                prop_assert!(report.rounds.iter().all(|r| r.health_factor_bps >= 11_000));
                prop_assert!(report.final_health_factor_bps >= 11_000);
            }
        }
    }
}
