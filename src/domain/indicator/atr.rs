//! Average True Range.
//!
//! TR[i] = max(high-low, |high-prev_close|, |low-prev_close|) for i >= 1;
//! there is no true range for the first bar. ATR is the SMA of the TR
//! series, shifted right by one slot so it lines up with the candles:
//! ATR[i] = mean(TR[i-n+1..=i]), first defined at i = n.

use crate::domain::indicator::{calculate_sma, Series};
use crate::domain::ohlcv::Candle;

pub fn calculate_atr(candles: &[Candle], period: usize) -> Series {
    if period == 0 || period > candles.len() {
        return vec![None; candles.len()];
    }

    let true_ranges: Vec<f64> = candles
        .windows(2)
        .map(|w| w[1].true_range(w[0].close))
        .collect();

    let mut out = Vec::with_capacity(candles.len());
    out.push(None);
    out.extend(calculate_sma(&true_ranges, period));
    out
}
