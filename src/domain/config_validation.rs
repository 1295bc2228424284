//! Configuration loading and validation.
//!
//! Everything here runs before the first bar is processed, so a bad config
//! never produces a partial result.

use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::domain::backtest::{BacktestRequest, OptimizationRequest};
use crate::domain::condition_eval::{BAR_FIELDS, POSITION_FIELDS};
use crate::domain::error::BarsmithError;
use crate::domain::indicator::{parse_indicator_list, IndicatorSpec};
use crate::domain::optimizer::{grid_size, Param, ParamRange, MAX_COMBINATIONS};
use crate::domain::stats::Metric;
use crate::domain::strategy::{StrategyConfig, StrategySource};
use crate::ports::config_port::ConfigPort;

pub const DEFAULT_INITIAL_CAPITAL: f64 = 10_000.0;
pub const DEFAULT_RISK_PERCENT: f64 = 1.0;

const RANGE_PREFIX: &str = "range.";

/// Build a backtest request from the `[backtest]`, `[strategy]` and
/// `[indicators]` sections. Only presence and syntax are checked here; see
/// [`validate_request`] for value rules.
pub fn load_backtest_request(config: &dyn ConfigPort) -> Result<BacktestRequest, BarsmithError> {
    let symbol = config.require_string("backtest", "symbol")?;
    let start_date = parse_date(config, "start_date")?;
    let end_date = parse_date(config, "end_date")?;
    let timeframe = config
        .require_string("backtest", "timeframe")?
        .parse()
        .map_err(|reason: String| BarsmithError::invalid("backtest", "timeframe", reason))?;

    let strategy = StrategySource {
        long_entry: config.require_string("strategy", "long_entry")?,
        short_entry: config
            .get_string("strategy", "short_entry")
            .unwrap_or_else(|| "false".to_string()),
        exit_condition: config.get_string("strategy", "exit_condition"),
        stop_loss_percent: config
            .get_double("strategy", "stop_loss_percent")?
            .ok_or_else(|| missing("strategy", "stop_loss_percent"))?,
        take_profit_percent: config
            .get_double("strategy", "take_profit_percent")?
            .unwrap_or(0.0),
    };

    let indicators = match config.get_string("indicators", "list") {
        Some(list) => parse_indicator_list(&list).map_err(|reason| {
            BarsmithError::InvalidIndicator {
                spec: list.clone(),
                reason,
            }
        })?,
        None => Vec::new(),
    };

    Ok(BacktestRequest {
        symbol,
        start_date,
        end_date,
        timeframe,
        initial_capital: config
            .get_double("backtest", "initial_capital")?
            .unwrap_or(DEFAULT_INITIAL_CAPITAL),
        risk_percent: config
            .get_double("backtest", "risk_percent")?
            .unwrap_or(DEFAULT_RISK_PERCENT),
        strategy,
        indicators,
        warmup_bars: config.get_usize("backtest", "warmup_bars")?,
    })
}

/// Backtest request plus the `[optimize]` section: `metric` and one
/// `range.<param> = min, max, step` key per searched parameter.
pub fn load_optimization_request(
    config: &dyn ConfigPort,
) -> Result<OptimizationRequest, BarsmithError> {
    let base = load_backtest_request(config)?;
    let metric = match config.get_string("optimize", "metric") {
        Some(raw) => raw
            .parse::<Metric>()
            .map_err(|reason| BarsmithError::invalid("optimize", "metric", reason))?,
        None => Metric::default(),
    };

    let mut ranges = BTreeMap::new();
    for key in config.keys("optimize") {
        let Some(name) = key.strip_prefix(RANGE_PREFIX) else {
            continue;
        };
        let param: Param = name.parse()?;
        let raw = config.require_string("optimize", &key)?;
        ranges.insert(param, parse_range(&key, &raw)?);
    }
    if ranges.is_empty() {
        return Err(missing("optimize", "range.<parameter>"));
    }

    Ok(OptimizationRequest {
        base,
        ranges,
        metric,
    })
}

fn parse_range(key: &str, raw: &str) -> Result<ParamRange, BarsmithError> {
    let parts: Vec<f64> = raw
        .split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<Result<_, _>>()
        .map_err(|_| BarsmithError::invalid("optimize", key, format!("'{raw}' is not min, max, step")))?;
    match parts.as_slice() {
        [min, max, step] => Ok(ParamRange::new(*min, *max, *step)),
        _ => Err(BarsmithError::invalid(
            "optimize",
            key,
            format!("expected min, max, step, got '{raw}'"),
        )),
    }
}

fn parse_date(config: &dyn ConfigPort, key: &str) -> Result<NaiveDate, BarsmithError> {
    let raw = config.require_string("backtest", key)?;
    NaiveDate::parse_from_str(&raw, "%Y-%m-%d").map_err(|_| {
        BarsmithError::invalid("backtest", key, format!("invalid {key} format, expected YYYY-MM-DD"))
    })
}

fn missing(section: &str, key: &str) -> BarsmithError {
    BarsmithError::ConfigMissing {
        section: section.to_string(),
        key: key.to_string(),
    }
}

/// Check every value rule and parse the strategy conditions.
pub fn validate_request(request: &BacktestRequest) -> Result<StrategyConfig, BarsmithError> {
    if request.symbol.trim().is_empty() {
        return Err(missing("backtest", "symbol"));
    }
    if request.start_date >= request.end_date {
        return Err(BarsmithError::invalid(
            "backtest",
            "start_date",
            "start_date must be before end_date",
        ));
    }
    if !(request.initial_capital.is_finite() && request.initial_capital > 0.0) {
        return Err(BarsmithError::invalid(
            "backtest",
            "initial_capital",
            "initial_capital must be positive",
        ));
    }
    if !(request.risk_percent > 0.0 && request.risk_percent <= 100.0) {
        return Err(BarsmithError::invalid(
            "backtest",
            "risk_percent",
            "risk_percent must be in (0, 100]",
        ));
    }

    let strategy = &request.strategy;
    if !(strategy.stop_loss_percent.is_finite() && strategy.stop_loss_percent > 0.0) {
        return Err(BarsmithError::invalid(
            "strategy",
            "stop_loss_percent",
            "stop_loss_percent must be positive",
        ));
    }
    if !(strategy.take_profit_percent.is_finite() && strategy.take_profit_percent >= 0.0) {
        return Err(BarsmithError::invalid(
            "strategy",
            "take_profit_percent",
            "take_profit_percent must be non-negative",
        ));
    }

    for spec in &request.indicators {
        validate_indicator(spec)?;
    }

    strategy.compile()
}

pub fn validate_indicator(spec: &IndicatorSpec) -> Result<(), BarsmithError> {
    let fail = |reason: &str| {
        Err(BarsmithError::InvalidIndicator {
            spec: spec.to_string(),
            reason: reason.to_string(),
        })
    };
    match spec {
        IndicatorSpec::Sma(p) | IndicatorSpec::Ema(p) | IndicatorSpec::Rsi(p) | IndicatorSpec::Atr(p)
            if *p == 0 =>
        {
            fail("period must be positive")
        }
        IndicatorSpec::Macd { fast, slow, signal } if *fast == 0 || *slow == 0 || *signal == 0 => {
            fail("periods must be positive")
        }
        IndicatorSpec::Macd { fast, slow, .. } if fast >= slow => {
            fail("fast period must be shorter than slow period")
        }
        IndicatorSpec::Bollinger { period: 0, .. } => fail("period must be positive"),
        IndicatorSpec::Bollinger { .. }
            if !spec
                .bollinger_multiplier()
                .is_some_and(|m| m.is_finite() && m > 0.0) =>
        {
            fail("standard deviation multiplier must be positive")
        }
        _ => Ok(()),
    }
}

pub fn validate_ranges(ranges: &BTreeMap<Param, ParamRange>) -> Result<(), BarsmithError> {
    for (param, range) in ranges {
        let key = format!("{RANGE_PREFIX}{param}");
        if ![range.min, range.max, range.step].iter().all(|v| v.is_finite()) {
            return Err(BarsmithError::invalid("optimize", &key, "values must be finite"));
        }
        if range.step <= 0.0 {
            return Err(BarsmithError::invalid("optimize", &key, "step must be positive"));
        }
        if range.min > range.max {
            return Err(BarsmithError::invalid("optimize", &key, "min must not exceed max"));
        }
    }
    let size = grid_size(ranges);
    if size > MAX_COMBINATIONS {
        return Err(BarsmithError::invalid(
            "optimize",
            "range",
            format!("{size} combinations exceeds the limit of {MAX_COMBINATIONS}"),
        ));
    }
    Ok(())
}

/// Identifiers a condition references that no bar field or configured
/// indicator provides. These evaluate as undefined on every bar.
pub fn unknown_identifiers(
    strategy: &StrategyConfig,
    indicators: &[IndicatorSpec],
) -> Vec<(&'static str, String)> {
    let provided: Vec<String> = indicators.iter().flat_map(|s| s.output_names()).collect();
    let mut out = Vec::new();
    for (field, expr) in strategy.conditions() {
        for name in expr.identifiers() {
            let known = BAR_FIELDS.contains(&name.as_str())
                || provided.contains(&name)
                || (field == "exit_condition" && POSITION_FIELDS.contains(&name.as_str()));
            if !known {
                out.push((field, name));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::file_config_adapter::FileConfigAdapter;
    use crate::domain::ohlcv::Timeframe;

    fn make_config(content: &str) -> FileConfigAdapter {
        FileConfigAdapter::from_string(content).unwrap()
    }

    const VALID: &str = r#"
[backtest]
symbol = AAPL
start_date = 2020-01-01
end_date = 2024-12-31
timeframe = 1d
initial_capital = 50000
risk_percent = 2

[strategy]
long_entry = close > SMA_50 && RSI_14 < 30
exit_condition = bars_held > 10
stop_loss_percent = 2
take_profit_percent = 4

[indicators]
list = SMA(50), RSI(14), MACD(12,26,9)
"#;

    fn valid_request() -> BacktestRequest {
        load_backtest_request(&make_config(VALID)).unwrap()
    }

    #[test]
    fn loads_full_request() {
        let req = valid_request();
        assert_eq!(req.symbol, "AAPL");
        assert_eq!(req.timeframe, Timeframe::D1);
        assert!((req.initial_capital - 50_000.0).abs() < f64::EPSILON);
        assert!((req.risk_percent - 2.0).abs() < f64::EPSILON);
        assert_eq!(req.strategy.short_entry, "false");
        assert_eq!(req.strategy.exit_condition.as_deref(), Some("bars_held > 10"));
        assert_eq!(req.indicators.len(), 3);
        assert_eq!(req.warmup_bars, None);
        assert!(validate_request(&req).is_ok());
    }

    #[test]
    fn defaults_applied() {
        let config = make_config(
            "[backtest]\nsymbol = X\nstart_date = 2020-01-01\nend_date = 2021-01-01\ntimeframe = 1h\n\
             [strategy]\nlong_entry = true\nstop_loss_percent = 1\n",
        );
        let req = load_backtest_request(&config).unwrap();
        assert!((req.initial_capital - DEFAULT_INITIAL_CAPITAL).abs() < f64::EPSILON);
        assert!((req.risk_percent - DEFAULT_RISK_PERCENT).abs() < f64::EPSILON);
        assert!((req.strategy.take_profit_percent - 0.0).abs() < f64::EPSILON);
        assert!(req.indicators.is_empty());
    }

    #[test]
    fn missing_symbol() {
        let config = make_config("[backtest]\nstart_date = 2020-01-01\n");
        let err = load_backtest_request(&config).unwrap_err();
        assert!(matches!(err, BarsmithError::ConfigMissing { key, .. } if key == "symbol"));
    }

    #[test]
    fn bad_date_format() {
        let config = make_config(&VALID.replace("2020-01-01", "01/01/2020"));
        let err = load_backtest_request(&config).unwrap_err();
        assert!(matches!(err, BarsmithError::ConfigInvalid { key, .. } if key == "start_date"));
    }

    #[test]
    fn bad_timeframe() {
        let config = make_config(&VALID.replace("timeframe = 1d", "timeframe = 2d"));
        let err = load_backtest_request(&config).unwrap_err();
        assert!(matches!(err, BarsmithError::ConfigInvalid { key, .. } if key == "timeframe"));
    }

    #[test]
    fn bad_indicator_list() {
        let config = make_config(&VALID.replace("RSI(14)", "RSX(14)"));
        let err = load_backtest_request(&config).unwrap_err();
        assert!(matches!(err, BarsmithError::InvalidIndicator { .. }));
    }

    #[test]
    fn start_must_precede_end() {
        let mut req = valid_request();
        req.end_date = req.start_date;
        let err = validate_request(&req).unwrap_err();
        assert!(matches!(err, BarsmithError::ConfigInvalid { key, .. } if key == "start_date"));
    }

    #[test]
    fn capital_and_risk_bounds() {
        let mut req = valid_request();
        req.initial_capital = 0.0;
        assert!(validate_request(&req).is_err());

        let mut req = valid_request();
        req.risk_percent = 0.0;
        assert!(validate_request(&req).is_err());
        req.risk_percent = 100.0;
        assert!(validate_request(&req).is_ok());
        req.risk_percent = 100.5;
        assert!(validate_request(&req).is_err());
    }

    #[test]
    fn stop_loss_must_be_positive() {
        let mut req = valid_request();
        req.strategy.stop_loss_percent = 0.0;
        let err = validate_request(&req).unwrap_err();
        assert!(
            matches!(err, BarsmithError::ConfigInvalid { key, .. } if key == "stop_loss_percent")
        );
    }

    #[test]
    fn take_profit_may_be_zero_not_negative() {
        let mut req = valid_request();
        req.strategy.take_profit_percent = 0.0;
        assert!(validate_request(&req).is_ok());
        req.strategy.take_profit_percent = -1.0;
        assert!(validate_request(&req).is_err());
    }

    #[test]
    fn condition_syntax_error_surfaces() {
        let mut req = valid_request();
        req.strategy.long_entry = "close >> 3".into();
        let err = validate_request(&req).unwrap_err();
        assert!(matches!(err, BarsmithError::ConditionParse { field, .. } if field == "long_entry"));
    }

    #[test]
    fn indicator_rules() {
        assert!(validate_indicator(&IndicatorSpec::Sma(0)).is_err());
        assert!(validate_indicator(&IndicatorSpec::Rsi(14)).is_ok());
        assert!(validate_indicator(&IndicatorSpec::Macd {
            fast: 26,
            slow: 12,
            signal: 9
        })
        .is_err());
        assert!(validate_indicator(&IndicatorSpec::Macd {
            fast: 12,
            slow: 26,
            signal: 0
        })
        .is_err());
        assert!(validate_indicator(&IndicatorSpec::bollinger(20, 0.0)).is_err());
        assert!(validate_indicator(&IndicatorSpec::bollinger(0, 2.0)).is_err());
        assert!(validate_indicator(&IndicatorSpec::bollinger(20, 2.0)).is_ok());
        assert!(validate_indicator(&IndicatorSpec::bollinger(20, -1.0)).is_err());
        assert!(validate_indicator(&IndicatorSpec::bollinger(20, f64::NAN)).is_err());
        assert!(validate_indicator(&IndicatorSpec::bollinger(20, 0.004)).is_ok());
    }

    #[test]
    fn loads_optimization_ranges() {
        let content = format!(
            "{VALID}\n[optimize]\nmetric = sharpeRatio\nrange.riskPercent = 1, 3, 1\nrange.take_profit_percent = 2, 6, 2\n"
        );
        let req = load_optimization_request(&make_config(&content)).unwrap();
        assert_eq!(req.metric, Metric::SharpeRatio);
        assert_eq!(req.ranges.len(), 2);
        assert_eq!(req.ranges[&Param::RiskPercent], ParamRange::new(1.0, 3.0, 1.0));
        assert!(validate_ranges(&req.ranges).is_ok());
    }

    #[test]
    fn unknown_parameter_rejected() {
        let content = format!("{VALID}\n[optimize]\nrange.leverage = 1, 2, 1\n");
        let err = load_optimization_request(&make_config(&content)).unwrap_err();
        assert!(matches!(err, BarsmithError::UnknownParameter { .. }));
    }

    #[test]
    fn optimization_requires_a_range() {
        let content = format!("{VALID}\n[optimize]\nmetric = win_rate\n");
        let err = load_optimization_request(&make_config(&content)).unwrap_err();
        assert!(matches!(err, BarsmithError::ConfigMissing { .. }));
    }

    #[test]
    fn malformed_range() {
        let content = format!("{VALID}\n[optimize]\nrange.risk_percent = 1, 3\n");
        let err = load_optimization_request(&make_config(&content)).unwrap_err();
        assert!(matches!(err, BarsmithError::ConfigInvalid { .. }));
    }

    #[test]
    fn range_rules() {
        let mut ranges = BTreeMap::new();
        ranges.insert(Param::RiskPercent, ParamRange::new(1.0, 3.0, 0.0));
        assert!(validate_ranges(&ranges).is_err());
        ranges.insert(Param::RiskPercent, ParamRange::new(3.0, 1.0, 1.0));
        assert!(validate_ranges(&ranges).is_err());
        ranges.insert(Param::RiskPercent, ParamRange::new(1.0, 1_000_000.0, 1.0));
        assert!(validate_ranges(&ranges).is_err());
        ranges.insert(Param::RiskPercent, ParamRange::new(1.0, 3.0, 1.0));
        assert!(validate_ranges(&ranges).is_ok());
    }

    #[test]
    fn reports_unknown_identifiers() {
        let mut req = valid_request();
        req.strategy.long_entry = "close > SMA_20 && RSI_14 < 30".into();
        req.strategy.short_entry = "bars_held > 1".into();
        let strategy = validate_request(&req).unwrap();
        let unknown = unknown_identifiers(&strategy, &req.indicators);
        assert_eq!(
            unknown,
            vec![
                ("long_entry", "SMA_20".to_string()),
                ("short_entry", "bars_held".to_string()),
            ]
        );
    }

    #[test]
    fn position_fields_known_in_exit_condition() {
        let strategy = valid_request().strategy.compile().unwrap();
        assert!(unknown_identifiers(&strategy, &valid_request().indicators).is_empty());
    }
}
