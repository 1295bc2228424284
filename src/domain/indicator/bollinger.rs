//! Bollinger Bands.
//!
//! - Middle: SMA over n periods
//! - Upper: Middle + (multiplier × StdDev)
//! - Lower: Middle - (multiplier × StdDev)
//!
//! StdDev is the population standard deviation (divides by N, not N-1).
//! Warmup: first (period-1) positions are undefined.

use crate::domain::indicator::{calculate_sma, Series};

pub const DEFAULT_PERIOD: usize = 20;
pub const DEFAULT_MULTIPLIER: f64 = 2.0;

#[derive(Debug, Clone, PartialEq)]
pub struct BollingerSeries {
    pub upper: Series,
    pub middle: Series,
    pub lower: Series,
}

pub fn calculate_bollinger(values: &[f64], period: usize, multiplier: f64) -> BollingerSeries {
    let middle = calculate_sma(values, period);
    let mut upper = Vec::with_capacity(values.len());
    let mut lower = Vec::with_capacity(values.len());

    for (i, mid) in middle.iter().enumerate() {
        match mid {
            Some(mean) => {
                let window = &values[i + 1 - period..=i];
                let variance = window
                    .iter()
                    .map(|v| {
                        let diff = v - mean;
                        diff * diff
                    })
                    .sum::<f64>()
                    / period as f64;
                let band = multiplier * variance.sqrt();
                upper.push(Some(mean + band));
                lower.push(Some(mean - band));
            }
            None => {
                upper.push(None);
                lower.push(None);
            }
        }
    }

    BollingerSeries {
        upper,
        middle,
        lower,
    }
}
