//! MACD (Moving Average Convergence Divergence).
//!
//! MACD Line = EMA(fast) - EMA(slow)
//! Signal Line = EMA(signal) of MACD Line
//! Histogram = MACD Line - Signal Line
//!
//! All three columns inherit the first-value EMA seed, so they are defined
//! from index 0 whenever every period is valid for the input length.

use crate::domain::indicator::ema::ema_values;
use crate::domain::indicator::Series;

pub const DEFAULT_FAST: usize = 12;
pub const DEFAULT_SLOW: usize = 26;
pub const DEFAULT_SIGNAL: usize = 9;

#[derive(Debug, Clone, PartialEq)]
pub struct MacdSeries {
    pub line: Series,
    pub signal: Series,
    pub histogram: Series,
}

impl MacdSeries {
    fn undefined(len: usize) -> Self {
        MacdSeries {
            line: vec![None; len],
            signal: vec![None; len],
            histogram: vec![None; len],
        }
    }
}

pub fn calculate_macd(values: &[f64], fast: usize, slow: usize, signal_period: usize) -> MacdSeries {
    let len = values.len();
    let invalid = |p: usize| p == 0 || p > len;
    if invalid(fast) || invalid(slow) || invalid(signal_period) {
        return MacdSeries::undefined(len);
    }

    let ema_fast = ema_values(values, fast);
    let ema_slow = ema_values(values, slow);
    let line: Vec<f64> = ema_fast.iter().zip(&ema_slow).map(|(f, s)| f - s).collect();
    let signal = ema_values(&line, signal_period);
    let histogram: Vec<f64> = line.iter().zip(&signal).map(|(l, s)| l - s).collect();

    MacdSeries {
        line: line.into_iter().map(Some).collect(),
        signal: signal.into_iter().map(Some).collect(),
        histogram: histogram.into_iter().map(Some).collect(),
    }
}
