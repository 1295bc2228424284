//! Open positions and closed trades.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::ohlcv::Candle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// +1 for long, -1 for short.
    pub fn sign(&self) -> f64 {
        match self {
            Side::Long => 1.0,
            Side::Short => -1.0,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Long => write!(f, "LONG"),
            Side::Short => write!(f, "SHORT"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    StrategyExit,
    EndOfData,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExitReason::StopLoss => "stop_loss",
            ExitReason::TakeProfit => "take_profit",
            ExitReason::StrategyExit => "strategy_exit",
            ExitReason::EndOfData => "end_of_data",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub side: Side,
    pub entry_price: f64,
    pub entry_time: NaiveDateTime,
    pub entry_index: usize,
    pub stop_loss: f64,
    /// `None` when the strategy has no profit target.
    pub take_profit: Option<f64>,
    pub quantity: f64,
}

impl Position {
    /// Realized PnL if the whole position exits at `price`.
    pub fn pnl_at(&self, price: f64) -> f64 {
        (price - self.entry_price) * self.quantity * self.side.sign()
    }

    /// Did the bar's intrabar range reach the stop?
    pub fn stop_triggered(&self, candle: &Candle) -> bool {
        match self.side {
            Side::Long => candle.low <= self.stop_loss,
            Side::Short => candle.high >= self.stop_loss,
        }
    }

    /// Did the bar's intrabar range reach the profit target?
    pub fn target_triggered(&self, candle: &Candle) -> bool {
        match (self.side, self.take_profit) {
            (_, None) => false,
            (Side::Long, Some(tp)) => candle.high >= tp,
            (Side::Short, Some(tp)) => candle.low <= tp,
        }
    }

    pub fn close(self, exit_price: f64, exit_time: NaiveDateTime, reason: ExitReason) -> Trade {
        Trade {
            side: self.side,
            entry_price: self.entry_price,
            exit_price,
            entry_time: self.entry_time,
            exit_time,
            quantity: self.quantity,
            pnl: self.pnl_at(exit_price),
            exit_reason: reason,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub side: Side,
    pub entry_price: f64,
    pub exit_price: f64,
    pub entry_time: NaiveDateTime,
    pub exit_time: NaiveDateTime,
    pub quantity: f64,
    pub pnl: f64,
    pub exit_reason: ExitReason,
}
