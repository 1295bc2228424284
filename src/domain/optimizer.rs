//! Grid-search parameter optimizer.
//!
//! The grid is the Cartesian product of every [`ParamRange`], generated in
//! parameter-name order with the last parameter varying fastest. Each
//! combination is run independently on the rayon pool, then the results are
//! stably sorted by score, so equal scores keep generation order.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use rayon::prelude::*;
use tracing::warn;

use super::error::BarsmithError;
use super::stats::{Metric, Stats};

/// Slack on the inclusive upper bound so `0.1 + 0.1 + 0.1` still reaches 0.3.
const RANGE_EPSILON: f64 = 1e-9;

/// Upper bound on grid size accepted by validation.
pub const MAX_COMBINATIONS: usize = 100_000;

/// Backtest parameter a grid can vary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Param {
    InitialCapital,
    RiskPercent,
    StopLossPercent,
    TakeProfitPercent,
}

impl Param {
    pub const ALL: [Param; 4] = [
        Param::InitialCapital,
        Param::RiskPercent,
        Param::StopLossPercent,
        Param::TakeProfitPercent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Param::InitialCapital => "initial_capital",
            Param::RiskPercent => "risk_percent",
            Param::StopLossPercent => "stop_loss_percent",
            Param::TakeProfitPercent => "take_profit_percent",
        }
    }
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Param {
    type Err = BarsmithError;

    /// Accepts `risk_percent` and `riskPercent` alike.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let folded: String = s
            .trim()
            .chars()
            .filter(|c| *c != '_')
            .map(|c| c.to_ascii_lowercase())
            .collect();
        Param::ALL
            .into_iter()
            .find(|p| p.as_str().replace('_', "") == folded)
            .ok_or_else(|| BarsmithError::UnknownParameter {
                name: s.to_string(),
            })
    }
}

/// Inclusive `min..=max` stepped by `step`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamRange {
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

impl ParamRange {
    pub fn new(min: f64, max: f64, step: f64) -> Self {
        ParamRange { min, max, step }
    }

    /// `min + k * step` for every `k` that stays within `max`.
    ///
    /// Values are computed from the index rather than accumulated, so
    /// rounding does not drift across long ranges. Empty when `step <= 0`
    /// or `min > max`.
    pub fn values(&self) -> Vec<f64> {
        if self.is_degenerate() {
            return Vec::new();
        }
        (0..self.count())
            .map(|k| self.min + k as f64 * self.step)
            .collect()
    }

    fn is_degenerate(&self) -> bool {
        self.step.is_nan() || self.step <= 0.0 || self.min > self.max
    }

    pub fn count(&self) -> usize {
        if self.is_degenerate() {
            return 0;
        }
        ((self.max - self.min) / self.step + RANGE_EPSILON).floor() as usize + 1
    }
}

pub type ParamSet = BTreeMap<Param, f64>;

/// Number of combinations [`build_grid`] would produce, saturating.
pub fn grid_size(ranges: &BTreeMap<Param, ParamRange>) -> usize {
    ranges
        .values()
        .fold(1usize, |acc, r| acc.saturating_mul(r.count()))
}

/// Cartesian product of all ranges, in generation order.
pub fn build_grid(ranges: &BTreeMap<Param, ParamRange>) -> Vec<ParamSet> {
    let axes: Vec<(Param, Vec<f64>)> = ranges.iter().map(|(p, r)| (*p, r.values())).collect();
    let mut out = Vec::with_capacity(grid_size(ranges));
    expand(&axes, &mut ParamSet::new(), &mut out);
    out
}

fn expand(axes: &[(Param, Vec<f64>)], current: &mut ParamSet, out: &mut Vec<ParamSet>) {
    let Some(((param, values), rest)) = axes.split_first() else {
        out.push(current.clone());
        return;
    };
    for &value in values {
        current.insert(*param, value);
        expand(rest, current, out);
    }
    current.remove(param);
}

#[derive(Debug, Clone, PartialEq)]
pub struct OptimizationEntry {
    pub params: ParamSet,
    /// `None` when this combination failed.
    pub stats: Option<Stats>,
    pub score: f64,
    pub error: Option<String>,
}

/// Run `evaluate` over every grid point and rank by `metric`, best first.
///
/// A failing combination is kept with score 0 and its error message.
pub fn optimize<F>(
    ranges: &BTreeMap<Param, ParamRange>,
    metric: Metric,
    evaluate: F,
) -> Vec<OptimizationEntry>
where
    F: Fn(&ParamSet) -> Result<Stats, BarsmithError> + Sync,
{
    let grid = build_grid(ranges);
    let mut entries: Vec<OptimizationEntry> = grid
        .into_par_iter()
        .map(|params| match evaluate(&params) {
            Ok(stats) => OptimizationEntry {
                score: stats.metric(metric),
                stats: Some(stats),
                params,
                error: None,
            },
            Err(e) => {
                warn!(params = %format_params(&params), error = %e, "combination failed");
                OptimizationEntry {
                    params,
                    stats: None,
                    score: 0.0,
                    error: Some(e.to_string()),
                }
            }
        })
        .collect();
    rank(&mut entries);
    entries
}

/// Stable sort by score descending, NaN last.
pub fn rank(entries: &mut [OptimizationEntry]) {
    entries.sort_by(|a, b| compare_scores(b.score, a.score));
}

fn compare_scores(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    }
}

/// `risk_percent=1, stop_loss_percent=2`
pub fn format_params(params: &ParamSet) -> String {
    params
        .iter()
        .map(|(p, v)| format!("{p}={v}"))
        .collect::<Vec<_>>()
        .join(", ")
}
