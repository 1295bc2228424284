//! Technical indicator implementations.
//!
//! Every indicator produces one or more series aligned 1:1 with the input
//! candles. Positions that cannot be computed hold `None`; a period of zero
//! or longer than the input yields an all-`None` series rather than an error.
//!
//! - `IndicatorSpec`: indicator identity + parameters (also a HashMap key)
//! - `Series`: one aligned output column
//! - `IndicatorSet`: every named output column for a run

pub mod atr;
pub mod bollinger;
pub mod ema;
pub mod macd;
pub mod rsi;
pub mod sma;

pub use atr::calculate_atr;
pub use bollinger::{calculate_bollinger, BollingerSeries};
pub use ema::calculate_ema;
pub use macd::{calculate_macd, MacdSeries};
pub use rsi::calculate_rsi;
pub use sma::calculate_sma;

use crate::domain::ohlcv::{closes, Candle};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// One indicator output column; `None` marks warm-up / insufficient data.
pub type Series = Vec<Option<f64>>;

pub const MACD_LINE: &str = "MACD";
pub const MACD_SIGNAL: &str = "MACD_SIGNAL";
pub const MACD_HIST: &str = "MACD_HIST";
pub const BB_UPPER: &str = "BB_UPPER";
pub const BB_MIDDLE: &str = "BB_MIDDLE";
pub const BB_LOWER: &str = "BB_LOWER";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IndicatorSpec {
    Sma(usize),
    Ema(usize),
    Rsi(usize),
    Atr(usize),
    Macd {
        fast: usize,
        slow: usize,
        signal: usize,
    },
    /// The multiplier is held as its bit pattern so the spec stays `Eq + Hash`.
    Bollinger {
        period: usize,
        multiplier_bits: u64,
    },
}

impl IndicatorSpec {
    pub fn bollinger(period: usize, multiplier: f64) -> Self {
        IndicatorSpec::Bollinger {
            period,
            multiplier_bits: multiplier.to_bits(),
        }
    }

    /// Standard-deviation multiplier of a Bollinger spec.
    pub fn bollinger_multiplier(&self) -> Option<f64> {
        match self {
            IndicatorSpec::Bollinger {
                multiplier_bits, ..
            } => Some(f64::from_bits(*multiplier_bits)),
            _ => None,
        }
    }

    /// Context names this indicator publishes, in output order.
    pub fn output_names(&self) -> Vec<String> {
        match self {
            IndicatorSpec::Sma(p) => vec![format!("SMA_{}", p)],
            IndicatorSpec::Ema(p) => vec![format!("EMA_{}", p)],
            IndicatorSpec::Rsi(p) => vec![format!("RSI_{}", p)],
            IndicatorSpec::Atr(p) => vec![format!("ATR_{}", p)],
            IndicatorSpec::Macd { .. } => vec![
                MACD_LINE.to_string(),
                MACD_SIGNAL.to_string(),
                MACD_HIST.to_string(),
            ],
            IndicatorSpec::Bollinger { .. } => vec![
                BB_UPPER.to_string(),
                BB_MIDDLE.to_string(),
                BB_LOWER.to_string(),
            ],
        }
    }

    /// Index of the first bar at which the indicator is defined, given enough data.
    pub fn first_defined_index(&self) -> usize {
        match self {
            IndicatorSpec::Sma(p) | IndicatorSpec::Bollinger { period: p, .. } => {
                p.saturating_sub(1)
            }
            IndicatorSpec::Ema(_) | IndicatorSpec::Macd { .. } => 0,
            IndicatorSpec::Rsi(p) => p + 1,
            IndicatorSpec::Atr(p) => *p,
        }
    }

    /// Compute every output column of this indicator.
    pub fn compute(&self, candles: &[Candle]) -> Vec<(String, Series)> {
        let close = closes(candles);
        let names = self.output_names();
        match self {
            IndicatorSpec::Sma(p) => vec![(names[0].clone(), calculate_sma(&close, *p))],
            IndicatorSpec::Ema(p) => vec![(names[0].clone(), calculate_ema(&close, *p))],
            IndicatorSpec::Rsi(p) => vec![(names[0].clone(), calculate_rsi(&close, *p))],
            IndicatorSpec::Atr(p) => vec![(names[0].clone(), calculate_atr(candles, *p))],
            IndicatorSpec::Macd { fast, slow, signal } => {
                let macd = calculate_macd(&close, *fast, *slow, *signal);
                names
                    .into_iter()
                    .zip([macd.line, macd.signal, macd.histogram])
                    .collect()
            }
            IndicatorSpec::Bollinger {
                period,
                multiplier_bits,
            } => {
                let bands = calculate_bollinger(&close, *period, f64::from_bits(*multiplier_bits));
                names
                    .into_iter()
                    .zip([bands.upper, bands.middle, bands.lower])
                    .collect()
            }
        }
    }
}

impl fmt::Display for IndicatorSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndicatorSpec::Sma(period) => write!(f, "SMA({})", period),
            IndicatorSpec::Ema(period) => write!(f, "EMA({})", period),
            IndicatorSpec::Rsi(period) => write!(f, "RSI({})", period),
            IndicatorSpec::Atr(period) => write!(f, "ATR({})", period),
            IndicatorSpec::Macd { fast, slow, signal } => {
                write!(f, "MACD({},{},{})", fast, slow, signal)
            }
            IndicatorSpec::Bollinger {
                period,
                multiplier_bits,
            } => write!(f, "BOLLINGER({},{})", period, f64::from_bits(*multiplier_bits)),
        }
    }
}

impl FromStr for IndicatorSpec {
    type Err = String;

    /// Parses `SMA(50)`, `MACD(12,26,9)`, `BOLLINGER(20,2)` and friends.
    /// Parameters may be omitted for MACD (12,26,9) and BOLLINGER (20,2).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (name, args) = match s.find('(') {
            Some(open) => {
                let close = s
                    .rfind(')')
                    .filter(|&c| c > open && c == s.len() - 1)
                    .ok_or_else(|| format!("unbalanced parentheses in '{}'", s))?;
                (&s[..open], &s[open + 1..close])
            }
            None => (s, ""),
        };

        let params: Vec<f64> = if args.trim().is_empty() {
            Vec::new()
        } else {
            args.split(',')
                .map(|a| {
                    a.trim()
                        .parse::<f64>()
                        .map_err(|_| format!("invalid parameter '{}' in '{}'", a.trim(), s))
                })
                .collect::<Result<_, _>>()?
        };

        let int = |v: f64| -> Result<usize, String> {
            if v >= 0.0 && v.fract() == 0.0 {
                Ok(v as usize)
            } else {
                Err(format!("period must be a whole number in '{}'", s))
            }
        };
        let single = |params: &[f64]| -> Result<usize, String> {
            match params {
                [p] => int(*p),
                _ => Err(format!("'{}' takes exactly one period", s)),
            }
        };

        match name.trim().to_uppercase().as_str() {
            "SMA" => Ok(IndicatorSpec::Sma(single(&params)?)),
            "EMA" => Ok(IndicatorSpec::Ema(single(&params)?)),
            "RSI" => Ok(IndicatorSpec::Rsi(single(&params)?)),
            "ATR" => Ok(IndicatorSpec::Atr(single(&params)?)),
            "MACD" => match params.as_slice() {
                [] => Ok(IndicatorSpec::Macd {
                    fast: macd::DEFAULT_FAST,
                    slow: macd::DEFAULT_SLOW,
                    signal: macd::DEFAULT_SIGNAL,
                }),
                [fast, slow, signal] => Ok(IndicatorSpec::Macd {
                    fast: int(*fast)?,
                    slow: int(*slow)?,
                    signal: int(*signal)?,
                }),
                _ => Err(format!("'{}' takes (fast, slow, signal)", s)),
            },
            "BOLLINGER" | "BB" => match params.as_slice() {
                [] => Ok(IndicatorSpec::bollinger(
                    bollinger::DEFAULT_PERIOD,
                    bollinger::DEFAULT_MULTIPLIER,
                )),
                [period] => Ok(IndicatorSpec::bollinger(
                    int(*period)?,
                    bollinger::DEFAULT_MULTIPLIER,
                )),
                [period, mult] => Ok(IndicatorSpec::bollinger(int(*period)?, *mult)),
                _ => Err(format!("'{}' takes (period, multiplier)", s)),
            },
            other => Err(format!(
                "unknown indicator '{}' (expected SMA, EMA, RSI, MACD, BOLLINGER, ATR)",
                other
            )),
        }
    }
}

/// Parse a comma-separated indicator list such as `SMA(50), MACD(12,26,9)`.
///
/// Commas inside parentheses belong to the parameter list.
pub fn parse_indicator_list(input: &str) -> Result<Vec<IndicatorSpec>, String> {
    let mut specs = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    for (i, ch) in input.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                let item = input[start..i].trim();
                if !item.is_empty() {
                    specs.push(item.parse()?);
                }
                start = i + 1;
            }
            _ => {}
        }
    }
    let tail = input[start..].trim();
    if !tail.is_empty() {
        specs.push(tail.parse()?);
    }
    Ok(specs)
}

/// All computed indicator columns for one run, keyed by context name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndicatorSet {
    columns: BTreeMap<String, Series>,
}

impl IndicatorSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: String, series: Series) {
        self.columns.insert(name, series);
    }

    pub fn series(&self, name: &str) -> Option<&Series> {
        self.columns.get(name)
    }

    /// Value of `name` at `index`, or `None` when undefined there.
    pub fn value(&self, name: &str, index: usize) -> Option<f64> {
        self.columns.get(name)?.get(index).copied().flatten()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Compute every configured indicator over `candles`.
///
/// Duplicate specs are computed once; when two specs publish the same name
/// (e.g. two MACD configurations) the later one wins.
pub fn compute_indicators(candles: &[Candle], specs: &[IndicatorSpec]) -> IndicatorSet {
    let mut set = IndicatorSet::new();
    let mut seen = std::collections::HashSet::new();
    for spec in specs {
        if !seen.insert(spec.clone()) {
            continue;
        }
        for (name, series) in spec.compute(candles) {
            set.insert(name, series);
        }
    }
    set
}

/// First bar index at which every spec is defined.
pub fn warmup_offset(specs: &[IndicatorSpec]) -> usize {
    specs
        .iter()
        .map(IndicatorSpec::first_defined_index)
        .max()
        .unwrap_or(0)
}
