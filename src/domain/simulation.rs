//! Bar-by-bar simulation.
//!
//! The engine is a two-state machine, [`SimState::Flat`] and
//! [`SimState::InPosition`], threaded through the bar loop by value:
//! [`Simulator::step`] takes the state and equity before a bar and returns
//! the state, equity and closed trade (if any) after it.
//!
//! # Per-bar order
//!
//! 1. Flat: `long_entry` is evaluated, then `short_entry`. Long wins a tie.
//!    The position opens at the bar's close, sized so that hitting the stop
//!    loses `risk_percent` of current equity.
//! 2. In position: stop-loss is checked against the intrabar range, then
//!    take-profit, then `exit_condition` at the close. Stop and target fills
//!    happen at the level price. The entry bar itself is not checked.
//! 3. One [`EquityPoint`] is recorded, realized equity only.
//!
//! Bars before the warm-up offset only record equity. A position still open
//! after the last bar closes at its close with [`ExitReason::EndOfData`].

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::condition::Expr;
use crate::domain::condition_eval::{evaluate_condition, BarContext};
use crate::domain::indicator::IndicatorSet;
use crate::domain::ohlcv::Candle;
use crate::domain::position::{ExitReason, Position, Side, Trade};
use crate::domain::strategy::StrategyConfig;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: NaiveDateTime,
    pub equity: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationConfig {
    pub initial_capital: f64,
    pub risk_percent: f64,
    /// Bars skipped before any rule is evaluated.
    pub warmup_bars: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SimState {
    Flat,
    InPosition(Position),
}

/// State after one bar.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub state: SimState,
    pub equity: f64,
    pub closed: Option<Trade>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SimulationResult {
    pub trades: Vec<Trade>,
    pub equity_curve: Vec<EquityPoint>,
}

pub struct Simulator<'a> {
    candles: &'a [Candle],
    indicators: &'a IndicatorSet,
    strategy: &'a StrategyConfig,
    config: SimulationConfig,
}

impl<'a> Simulator<'a> {
    pub fn new(
        candles: &'a [Candle],
        indicators: &'a IndicatorSet,
        strategy: &'a StrategyConfig,
        config: SimulationConfig,
    ) -> Self {
        Simulator {
            candles,
            indicators,
            strategy,
            config,
        }
    }

    pub fn run(&self) -> SimulationResult {
        let mut result = SimulationResult {
            trades: Vec::new(),
            equity_curve: Vec::with_capacity(self.candles.len()),
        };
        let mut state = SimState::Flat;
        let mut equity = self.config.initial_capital;

        for (index, candle) in self.candles.iter().enumerate() {
            if index >= self.config.warmup_bars {
                let next = self.step(state, equity, index);
                state = next.state;
                equity = next.equity;
                result.trades.extend(next.closed);
            }
            result.equity_curve.push(EquityPoint {
                timestamp: candle.timestamp,
                equity,
            });
        }

        if let (SimState::InPosition(position), Some(last)) = (state, self.candles.last()) {
            let trade = position.close(last.close, last.timestamp, ExitReason::EndOfData);
            equity += trade.pnl;
            result.trades.push(trade);
            if let Some(point) = result.equity_curve.last_mut() {
                point.equity = equity;
            }
        }

        result
    }

    /// Advance the machine by one bar.
    pub fn step(&self, state: SimState, equity: f64, index: usize) -> Step {
        let candle = &self.candles[index];
        match state {
            SimState::Flat => Step {
                state: self
                    .try_enter(equity, index)
                    .map_or(SimState::Flat, SimState::InPosition),
                equity,
                closed: None,
            },
            SimState::InPosition(position) => match self.exit_signal(&position, index) {
                Some((price, reason)) => {
                    let trade = position.close(price, candle.timestamp, reason);
                    Step {
                        state: SimState::Flat,
                        equity: equity + trade.pnl,
                        closed: Some(trade),
                    }
                }
                None => Step {
                    state: SimState::InPosition(position),
                    equity,
                    closed: None,
                },
            },
        }
    }

    fn try_enter(&self, equity: f64, index: usize) -> Option<Position> {
        let side = if self.fires(&self.strategy.long_entry, "long_entry", index, None) {
            Side::Long
        } else if self.fires(&self.strategy.short_entry, "short_entry", index, None) {
            Side::Short
        } else {
            return None;
        };

        let candle = &self.candles[index];
        let entry_price = candle.close;
        let stop_loss = self.strategy.stop_loss_price(side, entry_price);
        let stop_distance = (entry_price - stop_loss).abs();
        let risk_amount = equity * self.config.risk_percent / 100.0;
        let quantity = risk_amount / stop_distance;
        if !(quantity.is_finite() && quantity > 0.0) {
            debug!(bar = index, equity, stop_distance, "entry skipped: cannot size position");
            return None;
        }

        Some(Position {
            side,
            entry_price,
            entry_time: candle.timestamp,
            entry_index: index,
            stop_loss,
            take_profit: self.strategy.take_profit_price(side, entry_price),
            quantity,
        })
    }

    fn exit_signal(&self, position: &Position, index: usize) -> Option<(f64, ExitReason)> {
        if index == position.entry_index {
            return None;
        }
        let candle = &self.candles[index];
        if position.stop_triggered(candle) {
            return Some((position.stop_loss, ExitReason::StopLoss));
        }
        if position.target_triggered(candle) {
            if let Some(tp) = position.take_profit {
                return Some((tp, ExitReason::TakeProfit));
            }
        }
        match &self.strategy.exit_condition {
            Some(rule) if self.fires(rule, "exit_condition", index, Some(position)) => {
                Some((candle.close, ExitReason::StrategyExit))
            }
            _ => None,
        }
    }

    fn fires(&self, rule: &Expr, name: &str, index: usize, position: Option<&Position>) -> bool {
        let ctx = BarContext {
            index,
            candle: &self.candles[index],
            indicators: self.indicators,
            position,
        };
        match evaluate_condition(rule, &ctx) {
            Ok(fired) => fired,
            Err(err) => {
                debug!(bar = index, rule = name, error = %err, "condition treated as false");
                false
            }
        }
    }
}
