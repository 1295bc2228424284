//! Simple Moving Average.
//!
//! SMA(n)[i] = mean(values[i-n+1..=i]).
//! Warmup: first (n-1) positions are undefined.

use crate::domain::indicator::Series;

pub fn calculate_sma(values: &[f64], period: usize) -> Series {
    if period == 0 || period > values.len() {
        return vec![None; values.len()];
    }

    let mut out = Vec::with_capacity(values.len());
    for i in 0..values.len() {
        if i + 1 < period {
            out.push(None);
        } else {
            let window = &values[i + 1 - period..=i];
            out.push(Some(window.iter().sum::<f64>() / period as f64));
        }
    }
    out
}
