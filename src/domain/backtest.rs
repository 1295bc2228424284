//! Backtest and optimization entry points.
//!
//! A run validates its request, fetches candles through a [`DataPort`],
//! computes the configured indicators, simulates, and reduces the result to
//! [`Stats`]. An optimization fetches once and reuses the candles for every
//! grid combination.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use tracing::{info, warn};

use super::config_validation::{unknown_identifiers, validate_ranges, validate_request};
use super::error::BarsmithError;
use super::indicator::{compute_indicators, warmup_offset, IndicatorSpec};
use super::ohlcv::{first_out_of_order, Candle, Timeframe};
use super::optimizer::{self, OptimizationEntry, Param, ParamRange, ParamSet};
use super::position::Trade;
use super::simulation::{EquityPoint, SimulationConfig, Simulator};
use super::stats::{Metric, Stats};
use super::strategy::StrategySource;
use crate::ports::data_port::DataPort;

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestRequest {
    pub symbol: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub timeframe: Timeframe,
    pub initial_capital: f64,
    pub risk_percent: f64,
    pub strategy: StrategySource,
    pub indicators: Vec<IndicatorSpec>,
    /// Overrides the warm-up derived from the indicators.
    pub warmup_bars: Option<usize>,
}

impl BacktestRequest {
    /// Copy of this request with `params` merged over it.
    pub fn with_params(&self, params: &ParamSet) -> Self {
        let mut req = self.clone();
        for (param, &value) in params {
            match param {
                Param::InitialCapital => req.initial_capital = value,
                Param::RiskPercent => req.risk_percent = value,
                Param::StopLossPercent => req.strategy.stop_loss_percent = value,
                Param::TakeProfitPercent => req.strategy.take_profit_percent = value,
            }
        }
        req
    }

    /// Bars skipped before rules are evaluated.
    pub fn warmup(&self) -> usize {
        self.warmup_bars
            .unwrap_or_else(|| warmup_offset(&self.indicators))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OptimizationRequest {
    pub base: BacktestRequest,
    pub ranges: BTreeMap<Param, ParamRange>,
    pub metric: Metric,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestResult {
    pub trades: Vec<Trade>,
    pub equity_curve: Vec<EquityPoint>,
    pub stats: Stats,
}

pub fn run_backtest(
    data: &dyn DataPort,
    request: &BacktestRequest,
) -> Result<BacktestResult, BarsmithError> {
    preflight(request)?;
    let candles = fetch(data, request)?;
    run_backtest_on_candles(&candles, request)
}

/// Run against candles already in hand.
pub fn run_backtest_on_candles(
    candles: &[Candle],
    request: &BacktestRequest,
) -> Result<BacktestResult, BarsmithError> {
    let strategy = validate_request(request)?;
    check_candles(candles, request)?;

    let warmup = request.warmup();
    if candles.len() <= warmup {
        return Err(BarsmithError::InsufficientData {
            symbol: request.symbol.clone(),
            bars: candles.len(),
            minimum: warmup + 1,
        });
    }

    let indicators = compute_indicators(candles, &request.indicators);
    let config = SimulationConfig {
        initial_capital: request.initial_capital,
        risk_percent: request.risk_percent,
        warmup_bars: warmup,
    };
    let sim = Simulator::new(candles, &indicators, &strategy, config).run();
    let stats = Stats::compute(&sim.trades, &sim.equity_curve, request.initial_capital);

    info!(
        symbol = %request.symbol,
        bars = candles.len(),
        warmup,
        trades = stats.total_trades,
        final_equity = stats.final_equity,
        "backtest finished"
    );

    Ok(BacktestResult {
        trades: sim.trades,
        equity_curve: sim.equity_curve,
        stats,
    })
}

/// Grid-search `request.ranges` and rank by `request.metric`, best first.
///
/// Invalid requests and data failures abort; a combination that fails on
/// its own is recorded in its entry.
pub fn run_optimization(
    data: &dyn DataPort,
    request: &OptimizationRequest,
) -> Result<Vec<OptimizationEntry>, BarsmithError> {
    preflight(&request.base)?;
    validate_ranges(&request.ranges)?;
    let candles = fetch(data, &request.base)?;

    info!(
        symbol = %request.base.symbol,
        combinations = optimizer::grid_size(&request.ranges),
        metric = %request.metric,
        "optimization started"
    );

    let entries = optimizer::optimize(&request.ranges, request.metric, |params| {
        run_backtest_on_candles(&candles, &request.base.with_params(params)).map(|r| r.stats)
    });

    let failed = entries.iter().filter(|e| e.error.is_some()).count();
    info!(
        combinations = entries.len(),
        failed,
        "optimization finished"
    );
    Ok(entries)
}

fn preflight(request: &BacktestRequest) -> Result<(), BarsmithError> {
    let strategy = validate_request(request)?;
    for (field, name) in unknown_identifiers(&strategy, &request.indicators) {
        warn!(field, identifier = %name, "identifier has no source; conditions reading it evaluate false");
    }
    Ok(())
}

fn fetch(data: &dyn DataPort, request: &BacktestRequest) -> Result<Vec<Candle>, BarsmithError> {
    let candles = data.fetch_candles(
        &request.symbol,
        request.start_date,
        request.end_date,
        request.timeframe,
    )?;
    check_candles(&candles, request)?;
    Ok(candles)
}

fn check_candles(candles: &[Candle], request: &BacktestRequest) -> Result<(), BarsmithError> {
    if candles.is_empty() {
        return Err(BarsmithError::NoData {
            symbol: request.symbol.clone(),
            timeframe: request.timeframe.to_string(),
        });
    }
    if let Some(index) = first_out_of_order(candles) {
        return Err(BarsmithError::DataSource {
            reason: format!(
                "candle {} ({}) is earlier than the one before it",
                index, candles[index].timestamp
            ),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::indicator::test_support::make_candles;
    use crate::domain::position::ExitReason;

    fn sample_request() -> BacktestRequest {
        BacktestRequest {
            symbol: "TEST".into(),
            start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
            timeframe: Timeframe::D1,
            initial_capital: 10_000.0,
            risk_percent: 1.0,
            strategy: StrategySource {
                long_entry: "close > SMA_5".into(),
                short_entry: "false".into(),
                exit_condition: None,
                stop_loss_percent: 2.0,
                take_profit_percent: 4.0,
            },
            indicators: vec![IndicatorSpec::Sma(5)],
            warmup_bars: None,
        }
    }

    #[test]
    fn with_params_overrides_fields() {
        let mut params = ParamSet::new();
        params.insert(Param::RiskPercent, 2.5);
        params.insert(Param::TakeProfitPercent, 0.0);
        let req = sample_request().with_params(&params);
        assert!((req.risk_percent - 2.5).abs() < f64::EPSILON);
        assert!((req.strategy.take_profit_percent - 0.0).abs() < f64::EPSILON);
        assert!((req.strategy.stop_loss_percent - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn warmup_defaults_to_indicators() {
        let mut req = sample_request();
        assert_eq!(req.warmup(), 4);
        req.warmup_bars = Some(10);
        assert_eq!(req.warmup(), 10);
    }

    #[test]
    fn empty_candles_is_no_data() {
        let err = run_backtest_on_candles(&[], &sample_request()).unwrap_err();
        assert!(matches!(err, BarsmithError::NoData { .. }));
    }

    #[test]
    fn out_of_order_candles_rejected() {
        let mut candles = make_candles(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        candles.swap(2, 3);
        let err = run_backtest_on_candles(&candles, &sample_request()).unwrap_err();
        assert!(matches!(err, BarsmithError::DataSource { .. }));
    }

    #[test]
    fn too_few_candles_for_warmup() {
        let candles = make_candles(&[1.0, 2.0, 3.0, 4.0]);
        let err = run_backtest_on_candles(&candles, &sample_request()).unwrap_err();
        assert!(matches!(
            err,
            BarsmithError::InsufficientData {
                bars: 4,
                minimum: 5,
                ..
            }
        ));
    }

    #[test]
    fn equity_curve_covers_every_bar() {
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        let candles = make_candles(&closes);
        let result = run_backtest_on_candles(&candles, &sample_request()).unwrap();
        assert_eq!(result.equity_curve.len(), candles.len());
        assert!(!result.trades.is_empty());
        assert_eq!(result.stats.total_trades, result.trades.len());
        assert!(result.trades.iter().any(|t| t.exit_reason == ExitReason::TakeProfit));
    }
}
