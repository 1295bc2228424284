//! Exponential Moving Average.
//!
//! k = 2/(n+1), seeded with the first value (not an SMA seed), then
//! EMA[i] = (P[i] - EMA[i-1]) * k + EMA[i-1].
//! No warmup: defined from index 0. MACD inherits this seeding.

use crate::domain::indicator::Series;

pub fn calculate_ema(values: &[f64], period: usize) -> Series {
    if period == 0 || period > values.len() {
        return vec![None; values.len()];
    }
    ema_values(values, period).into_iter().map(Some).collect()
}

/// Raw EMA recurrence over `values`; caller guarantees `values` is non-empty
/// and `period` is valid.
pub(crate) fn ema_values(values: &[f64], period: usize) -> Vec<f64> {
    let k = smoothing_factor(period);
    let mut out = Vec::with_capacity(values.len());
    let mut iter = values.iter();
    let Some(&seed) = iter.next() else {
        return out;
    };
    let mut ema = seed;
    out.push(ema);
    for &price in iter {
        ema = (price - ema) * k + ema;
        out.push(ema);
    }
    out
}

pub(crate) fn smoothing_factor(period: usize) -> f64 {
    2.0 / (period as f64 + 1.0)
}
