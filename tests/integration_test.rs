//! End-to-end pipeline tests: data port -> indicators -> simulation -> stats,
//! and the optimizer wrapped around it.

mod common;

use approx::assert_relative_eq;
use barsmith::domain::backtest::{
    run_backtest, run_backtest_on_candles, run_optimization, OptimizationRequest,
};
use barsmith::domain::error::BarsmithError;
use barsmith::domain::indicator::IndicatorSpec;
use barsmith::domain::optimizer::{Param, ParamRange};
use barsmith::domain::position::{ExitReason, Side};
use barsmith::domain::stats::Metric;
use common::*;
use std::collections::BTreeMap;

mod scenarios {
    use super::*;

    #[test]
    fn rising_series_opens_one_long_at_first_signal() {
        let candles = rising(100.0, 100);
        let port = MockDataPort::new().with_candles("TEST", candles.clone());
        let request = sample_request("close > SMA_50", vec![IndicatorSpec::Sma(50)]);

        let result = run_backtest(&port, &request).unwrap();

        assert_eq!(result.equity_curve.len(), 100);
        let first = &result.trades[0];
        assert_eq!(first.side, Side::Long);
        assert_eq!(first.entry_time, candles[49].timestamp);
        assert_relative_eq!(first.entry_price, 149.0);
        assert_relative_eq!(first.quantity, 100.0 / (149.0 * 0.02), epsilon = 1e-9);
        for pair in result.trades.windows(2) {
            assert!(
                pair[1].entry_time >= pair[0].exit_time,
                "second position opened while the first was still open"
            );
        }
    }

    #[test]
    fn never_entering_keeps_equity_at_initial_capital() {
        let port = MockDataPort::new().with_candles("TEST", oscillating(120));
        let mut request = sample_request("false", vec![IndicatorSpec::Sma(10)]);
        request.strategy.short_entry = "false".into();

        let result = run_backtest(&port, &request).unwrap();

        assert!(result.trades.is_empty());
        assert_eq!(result.equity_curve.len(), 120);
        assert!(result.equity_curve.iter().all(|p| p.equity == 10_000.0));
        assert_relative_eq!(result.stats.total_return, 0.0);
        assert_relative_eq!(result.stats.max_drawdown, 0.0);
    }

    #[test]
    fn short_strategy_profits_on_falling_prices() {
        let closes: Vec<f64> = (0..60).map(|i| 200.0 - i as f64).collect();
        let port = MockDataPort::new().with_candles("TEST", candles_from_closes(&closes));
        let mut request = sample_request("false", vec![IndicatorSpec::Sma(10)]);
        request.strategy.short_entry = "close < SMA_10".into();

        let result = run_backtest(&port, &request).unwrap();

        assert!(!result.trades.is_empty());
        assert!(result.trades.iter().all(|t| t.side == Side::Short));
        assert!(result
            .trades
            .iter()
            .any(|t| t.exit_reason == ExitReason::TakeProfit));
        assert!(result.stats.total_return > 0.0);
    }

    #[test]
    fn exit_condition_closes_positions() {
        let port = MockDataPort::new().with_candles("TEST", oscillating(200));
        let mut request = sample_request("close > EMA_5", vec![IndicatorSpec::Ema(5)]);
        request.strategy.exit_condition = Some("bars_held >= 3".into());
        request.strategy.stop_loss_percent = 50.0;
        request.strategy.take_profit_percent = 0.0;

        let result = run_backtest(&port, &request).unwrap();

        assert!(!result.trades.is_empty());
        for trade in &result.trades {
            assert!(matches!(
                trade.exit_reason,
                ExitReason::StrategyExit | ExitReason::EndOfData
            ));
        }
    }

    #[test]
    fn full_indicator_family_runs_after_warmup() {
        let candles = oscillating(200);
        let request = sample_request(
            "RSI_14 < 40 && MACD > MACD_SIGNAL && close < BB_MIDDLE && ATR_14 > 0",
            vec![
                IndicatorSpec::Rsi(14),
                IndicatorSpec::Macd {
                    fast: 12,
                    slow: 26,
                    signal: 9,
                },
                IndicatorSpec::bollinger(20, 2.0),
                IndicatorSpec::Atr(14),
            ],
        );
        assert_eq!(request.warmup(), 19);

        let result = run_backtest_on_candles(&candles, &request).unwrap();

        assert_eq!(result.equity_curve.len(), candles.len());
        for trade in &result.trades {
            assert!(trade.entry_time >= candles[19].timestamp);
        }
    }

    #[test]
    fn stats_agree_with_trade_list() {
        let port = MockDataPort::new().with_candles("TEST", oscillating(300));
        let mut request = sample_request("close > SMA_5", vec![IndicatorSpec::Sma(5)]);
        request.strategy.stop_loss_percent = 1.0;
        request.strategy.take_profit_percent = 1.5;

        let result = run_backtest(&port, &request).unwrap();
        let stats = &result.stats;

        let wins: f64 = result.trades.iter().filter(|t| t.pnl > 0.0).map(|t| t.pnl).sum();
        let losses: f64 = result.trades.iter().filter(|t| t.pnl < 0.0).map(|t| t.pnl).sum();
        assert!(losses < 0.0, "fixture should produce at least one loss");
        assert_relative_eq!(stats.profit_factor, wins / losses.abs(), epsilon = 1e-9);

        let pnl: f64 = result.trades.iter().map(|t| t.pnl).sum();
        assert_relative_eq!(stats.final_equity, 10_000.0 + pnl, epsilon = 1e-6);
        assert_eq!(stats.total_trades, result.trades.len());
    }

    #[test]
    fn runs_are_deterministic() {
        let port = MockDataPort::new().with_candles("TEST", oscillating(250));
        let mut request = sample_request(
            "close > SMA_10 && RSI_14 < 70",
            vec![IndicatorSpec::Sma(10), IndicatorSpec::Rsi(14)],
        );
        request.strategy.short_entry = "close < SMA_10 && RSI_14 > 30".into();

        let a = run_backtest(&port, &request).unwrap();
        let b = run_backtest(&port, &request).unwrap();
        assert_eq!(a, b);
    }
}

mod failures {
    use super::*;

    #[test]
    fn empty_fetch_is_no_data() {
        let port = MockDataPort::new();
        let request = sample_request("true", vec![]);
        let err = run_backtest(&port, &request).unwrap_err();
        assert!(matches!(err, BarsmithError::NoData { .. }));
        assert!(same_exit((&err).into(), 5));
    }

    #[test]
    fn provider_error_propagates() {
        let port = MockDataPort::new().with_error("TEST", "connection refused");
        let request = sample_request("true", vec![]);
        let err = run_backtest(&port, &request).unwrap_err();
        assert!(err.is_data_error());
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn syntax_error_rejected_before_fetch() {
        let port = MockDataPort::new().with_candles("TEST", rising(100.0, 20));
        let request = sample_request("close > (SMA_5", vec![IndicatorSpec::Sma(5)]);
        let err = run_backtest(&port, &request).unwrap_err();
        assert!(matches!(err, BarsmithError::ConditionParse { .. }));
        assert_eq!(port.fetches.get(), 0);
        assert!(same_exit((&err).into(), 4));
    }

    #[test]
    fn invalid_indicator_rejected() {
        let port = MockDataPort::new().with_candles("TEST", rising(100.0, 20));
        let request = sample_request("true", vec![IndicatorSpec::Sma(0)]);
        let err = run_backtest(&port, &request).unwrap_err();
        assert!(matches!(err, BarsmithError::InvalidIndicator { .. }));
        assert!(same_exit((&err).into(), 2));
    }

    #[test]
    fn fewer_bars_than_warmup_is_insufficient() {
        let port = MockDataPort::new().with_candles("TEST", rising(100.0, 30));
        let request = sample_request("close > SMA_50", vec![IndicatorSpec::Sma(50)]);
        let err = run_backtest(&port, &request).unwrap_err();
        assert!(matches!(err, BarsmithError::InsufficientData { bars: 30, .. }));
    }

    #[test]
    fn unknown_identifier_never_fires() {
        let port = MockDataPort::new().with_candles("TEST", rising(100.0, 30));
        let request = sample_request("close > SMA_99", vec![IndicatorSpec::Sma(5)]);
        let result = run_backtest(&port, &request).unwrap();
        assert!(result.trades.is_empty());
    }
}

mod optimization {
    use super::*;

    fn request(ranges: &[(Param, ParamRange)], metric: Metric) -> OptimizationRequest {
        OptimizationRequest {
            base: sample_request("close > SMA_5", vec![IndicatorSpec::Sma(5)]),
            ranges: ranges.iter().copied().collect::<BTreeMap<_, _>>(),
            metric,
        }
    }

    #[test]
    fn risk_percent_grid_yields_three_ranked_entries() {
        let port = MockDataPort::new().with_candles("TEST", oscillating(200));
        let req = request(
            &[(Param::RiskPercent, ParamRange::new(1.0, 3.0, 1.0))],
            Metric::TotalReturn,
        );

        let entries = run_optimization(&port, &req).unwrap();

        assert_eq!(entries.len(), 3);
        assert!(entries.windows(2).all(|w| w[0].score >= w[1].score));
        let mut risks: Vec<f64> = entries
            .iter()
            .map(|e| e.params[&Param::RiskPercent])
            .collect();
        risks.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(risks, vec![1.0, 2.0, 3.0]);
        assert_eq!(port.fetches.get(), 1);
    }

    #[test]
    fn score_matches_selected_metric() {
        let port = MockDataPort::new().with_candles("TEST", oscillating(200));
        let req = request(
            &[(Param::TakeProfitPercent, ParamRange::new(1.0, 3.0, 0.5))],
            Metric::WinRate,
        );

        let entries = run_optimization(&port, &req).unwrap();

        assert_eq!(entries.len(), 5);
        for entry in &entries {
            let stats = entry.stats.as_ref().unwrap();
            assert_relative_eq!(entry.score, stats.win_rate);
        }
    }

    #[test]
    fn failing_combination_recorded_and_search_continues() {
        let port = MockDataPort::new().with_candles("TEST", oscillating(200));
        let req = request(
            &[(Param::StopLossPercent, ParamRange::new(0.0, 2.0, 1.0))],
            Metric::TotalReturn,
        );

        let entries = run_optimization(&port, &req).unwrap();

        assert_eq!(entries.len(), 3);
        let failed: Vec<_> = entries.iter().filter(|e| e.error.is_some()).collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].params[&Param::StopLossPercent], 0.0);
        assert!(failed[0].stats.is_none());
        assert_relative_eq!(failed[0].score, 0.0);
    }

    #[test]
    fn optimization_is_deterministic() {
        let port = MockDataPort::new().with_candles("TEST", oscillating(200));
        let req = request(
            &[
                (Param::RiskPercent, ParamRange::new(0.5, 2.0, 0.5)),
                (Param::StopLossPercent, ParamRange::new(1.0, 3.0, 1.0)),
            ],
            Metric::SharpeRatio,
        );
        let a = run_optimization(&port, &req).unwrap();
        let b = run_optimization(&port, &req).unwrap();
        assert_eq!(a.len(), 12);
        assert_eq!(a, b);
    }

    #[test]
    fn no_data_aborts_optimization() {
        let port = MockDataPort::new();
        let req = request(
            &[(Param::RiskPercent, ParamRange::new(1.0, 3.0, 1.0))],
            Metric::TotalReturn,
        );
        let err = run_optimization(&port, &req).unwrap_err();
        assert!(matches!(err, BarsmithError::NoData { .. }));
    }

    #[test]
    fn invalid_range_rejected() {
        let port = MockDataPort::new().with_candles("TEST", oscillating(50));
        let req = request(
            &[(Param::RiskPercent, ParamRange::new(3.0, 1.0, 1.0))],
            Metric::TotalReturn,
        );
        let err = run_optimization(&port, &req).unwrap_err();
        assert!(matches!(err, BarsmithError::ConfigInvalid { .. }));
        assert_eq!(port.fetches.get(), 0);
    }
}
