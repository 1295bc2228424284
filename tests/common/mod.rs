#![allow(dead_code)]

use barsmith::domain::backtest::BacktestRequest;
use barsmith::domain::error::BarsmithError;
use barsmith::domain::indicator::IndicatorSpec;
pub use barsmith::domain::ohlcv::{Candle, Timeframe};
use barsmith::domain::strategy::StrategySource;
use barsmith::ports::data_port::DataPort;
use chrono::{Duration, NaiveDate};
use std::cell::Cell;
use std::collections::HashMap;
use std::process::ExitCode;

pub struct MockDataPort {
    pub data: HashMap<String, Vec<Candle>>,
    pub errors: HashMap<String, String>,
    pub fetches: Cell<usize>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
            fetches: Cell::new(0),
        }
    }

    pub fn with_candles(mut self, symbol: &str, candles: Vec<Candle>) -> Self {
        self.data.insert(symbol.to_string(), candles);
        self
    }

    pub fn with_error(mut self, symbol: &str, reason: &str) -> Self {
        self.errors.insert(symbol.to_string(), reason.to_string());
        self
    }
}

impl DataPort for MockDataPort {
    fn fetch_candles(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
        _timeframe: Timeframe,
    ) -> Result<Vec<Candle>, BarsmithError> {
        self.fetches.set(self.fetches.get() + 1);
        if let Some(reason) = self.errors.get(symbol) {
            return Err(BarsmithError::DataSource {
                reason: reason.clone(),
            });
        }
        Ok(self
            .data
            .get(symbol)
            .map(|candles| {
                candles
                    .iter()
                    .filter(|c| c.timestamp.date() >= start && c.timestamp.date() <= end)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Daily candles from 2024-01-01, intrabar range of one point around close.
pub fn candles_from_closes(closes: &[f64]) -> Vec<Candle> {
    let start = date(2024, 1, 1).and_hms_opt(0, 0, 0).unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| Candle {
            timestamp: start + Duration::days(i as i64),
            open: close,
            high: close + 0.5,
            low: close - 0.5,
            close,
            volume: 1000.0,
        })
        .collect()
}

/// Closes rising by one point per bar from `start`.
pub fn rising(start: f64, count: usize) -> Vec<Candle> {
    let closes: Vec<f64> = (0..count).map(|i| start + i as f64).collect();
    candles_from_closes(&closes)
}

/// Deterministic zig-zag around 100 so both entries and exits occur.
pub fn oscillating(count: usize) -> Vec<Candle> {
    let closes: Vec<f64> = (0..count)
        .map(|i| {
            let phase = (i % 20) as f64;
            let wave = if phase < 10.0 { phase } else { 20.0 - phase };
            100.0 + wave * 1.5 + (i / 20) as f64 * 0.25
        })
        .collect();
    candles_from_closes(&closes)
}

pub fn sample_request(long_entry: &str, indicators: Vec<IndicatorSpec>) -> BacktestRequest {
    BacktestRequest {
        symbol: "TEST".into(),
        start_date: date(2024, 1, 1),
        end_date: date(2025, 12, 31),
        timeframe: Timeframe::D1,
        initial_capital: 10_000.0,
        risk_percent: 1.0,
        strategy: StrategySource {
            long_entry: long_entry.into(),
            short_entry: "false".into(),
            exit_condition: None,
            stop_loss_percent: 2.0,
            take_profit_percent: 4.0,
        },
        indicators,
        warmup_bars: None,
    }
}

/// Compare exit codes through their Debug form.
pub fn same_exit(actual: ExitCode, expected: u8) -> bool {
    format!("{actual:?}") == format!("{:?}", ExitCode::from(expected))
}
