//! Summary statistics over a finished run.
//!
//! [`Stats::compute`] is the only constructor, so every field always agrees
//! with the trade list and equity curve it was derived from. Percentages
//! (`total_return`, `win_rate`, `max_drawdown`) are expressed 0..100.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use super::position::Trade;
use super::simulation::EquityPoint;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stats {
    pub total_return: f64,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub max_drawdown: f64,
    pub sharpe_ratio: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub largest_win: f64,
    /// Most negative trade PnL, reported as a negative number.
    pub largest_loss: f64,
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub final_equity: f64,
}

impl Stats {
    pub fn compute(trades: &[Trade], equity_curve: &[EquityPoint], initial_capital: f64) -> Self {
        let final_equity = equity_curve
            .last()
            .map(|p| p.equity)
            .unwrap_or(initial_capital);

        let total_return = if initial_capital > 0.0 {
            (final_equity - initial_capital) / initial_capital * 100.0
        } else {
            0.0
        };

        let mut winning_trades = 0usize;
        let mut losing_trades = 0usize;
        let mut total_wins = 0.0_f64;
        let mut total_losses = 0.0_f64;
        let mut largest_win = 0.0_f64;
        let mut largest_loss = 0.0_f64;

        // breakeven trades count toward total_trades only
        for trade in trades {
            let pnl = trade.pnl;
            if pnl > 0.0 {
                winning_trades += 1;
                total_wins += pnl;
                largest_win = largest_win.max(pnl);
            } else if pnl < 0.0 {
                losing_trades += 1;
                total_losses += pnl.abs();
                largest_loss = largest_loss.min(pnl);
            }
        }

        let total_trades = trades.len();
        let win_rate = if total_trades > 0 {
            winning_trades as f64 / total_trades as f64 * 100.0
        } else {
            0.0
        };

        let avg_win = if winning_trades > 0 {
            total_wins / winning_trades as f64
        } else {
            0.0
        };

        let avg_loss = if losing_trades > 0 {
            total_losses / losing_trades as f64
        } else {
            0.0
        };

        let gross_loss = avg_loss * losing_trades as f64;
        let profit_factor = if gross_loss > 0.0 {
            (avg_win * winning_trades as f64) / gross_loss
        } else {
            0.0
        };

        Stats {
            total_return,
            win_rate,
            profit_factor,
            max_drawdown: compute_drawdown(equity_curve),
            sharpe_ratio: compute_sharpe(equity_curve),
            avg_win,
            avg_loss,
            largest_win,
            largest_loss,
            total_trades,
            winning_trades,
            losing_trades,
            final_equity,
        }
    }

    pub fn metric(&self, metric: Metric) -> f64 {
        match metric {
            Metric::TotalReturn => self.total_return,
            Metric::WinRate => self.win_rate,
            Metric::ProfitFactor => self.profit_factor,
            Metric::MaxDrawdown => self.max_drawdown,
            Metric::SharpeRatio => self.sharpe_ratio,
            Metric::AvgWin => self.avg_win,
            Metric::AvgLoss => self.avg_loss,
            Metric::LargestWin => self.largest_win,
            Metric::LargestLoss => self.largest_loss,
            Metric::TotalTrades => self.total_trades as f64,
            Metric::FinalEquity => self.final_equity,
        }
    }
}

/// Largest peak-to-trough decline, in percent of the running peak.
fn compute_drawdown(equity_curve: &[EquityPoint]) -> f64 {
    let Some(first) = equity_curve.first() else {
        return 0.0;
    };

    let mut peak = first.equity;
    let mut max_dd = 0.0_f64;
    for point in equity_curve {
        if point.equity > peak {
            peak = point.equity;
        } else if peak > 0.0 {
            max_dd = max_dd.max((peak - point.equity) / peak * 100.0);
        }
    }
    max_dd
}

/// Mean over standard deviation of per-bar returns; zero risk-free rate.
fn compute_sharpe(equity_curve: &[EquityPoint]) -> f64 {
    if equity_curve.len() < 2 {
        return 0.0;
    }

    let returns: Vec<f64> = equity_curve
        .windows(2)
        .map(|w| {
            let prev = w[0].equity;
            if prev > 0.0 {
                (w[1].equity - prev) / prev
            } else {
                0.0
            }
        })
        .collect();

    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    let stddev = variance.sqrt();

    if stddev > 0.0 { mean / stddev } else { 0.0 }
}

/// Stat used to rank optimizer results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Metric {
    #[default]
    TotalReturn,
    WinRate,
    ProfitFactor,
    MaxDrawdown,
    SharpeRatio,
    AvgWin,
    AvgLoss,
    LargestWin,
    LargestLoss,
    TotalTrades,
    FinalEquity,
}

impl Metric {
    pub const ALL: [Metric; 11] = [
        Metric::TotalReturn,
        Metric::WinRate,
        Metric::ProfitFactor,
        Metric::MaxDrawdown,
        Metric::SharpeRatio,
        Metric::AvgWin,
        Metric::AvgLoss,
        Metric::LargestWin,
        Metric::LargestLoss,
        Metric::TotalTrades,
        Metric::FinalEquity,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::TotalReturn => "total_return",
            Metric::WinRate => "win_rate",
            Metric::ProfitFactor => "profit_factor",
            Metric::MaxDrawdown => "max_drawdown",
            Metric::SharpeRatio => "sharpe_ratio",
            Metric::AvgWin => "avg_win",
            Metric::AvgLoss => "avg_loss",
            Metric::LargestWin => "largest_win",
            Metric::LargestLoss => "largest_loss",
            Metric::TotalTrades => "total_trades",
            Metric::FinalEquity => "final_equity",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = String;

    /// Accepts `total_return` and `totalReturn` alike.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let folded: String = s
            .trim()
            .chars()
            .filter(|c| *c != '_')
            .map(|c| c.to_ascii_lowercase())
            .collect();
        Metric::ALL
            .into_iter()
            .find(|m| m.as_str().replace('_', "") == folded)
            .ok_or_else(|| format!("unknown metric '{s}'"))
    }
}
