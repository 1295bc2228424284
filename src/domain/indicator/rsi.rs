//! RSI (Relative Strength Index).
//!
//! Works on bar-to-bar deltas. For delta index `i`, the value is undefined
//! while `i < n`; otherwise avg_gain / avg_loss are plain (non-smoothed) means
//! of the `n` deltas preceding `i` (`deltas[i-n..i]`).
//!
//! RS = avg_gain / max(avg_loss, RSI_EPSILON), RSI = 100 - 100 / (1 + RS).
//!
//! The delta series is one shorter than the price series, so the output is
//! prefixed with one undefined slot to stay aligned with the prices.

use crate::domain::indicator::Series;

/// Floor for the average loss. Keeps RS finite on a run of pure gains,
/// which pins RSI just below 100 instead of dividing by zero.
pub const RSI_EPSILON: f64 = 1e-4;

pub fn calculate_rsi(values: &[f64], period: usize) -> Series {
    if period == 0 || period > values.len() {
        return vec![None; values.len()];
    }

    let deltas: Vec<f64> = values.windows(2).map(|w| w[1] - w[0]).collect();

    let mut out = Vec::with_capacity(values.len());
    out.push(None);

    for i in 0..deltas.len() {
        if i < period {
            out.push(None);
            continue;
        }
        let window = &deltas[i - period..i];
        let gain: f64 = window.iter().filter(|d| **d > 0.0).sum();
        let loss: f64 = window.iter().filter(|d| **d < 0.0).map(|d| -d).sum();
        let avg_gain = gain / period as f64;
        let avg_loss = loss / period as f64;

        let rs = avg_gain / avg_loss.max(RSI_EPSILON);
        out.push(Some(100.0 - 100.0 / (1.0 + rs)));
    }

    out
}
