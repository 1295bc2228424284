//! Strategy configuration: entry/exit conditions and the stop/target levels.

use crate::domain::condition::Expr;
use crate::domain::condition_parser;
use crate::domain::error::BarsmithError;
use crate::domain::position::Side;

/// Strategy as written in the config file, before parsing.
#[derive(Debug, Clone, PartialEq)]
pub struct StrategySource {
    pub long_entry: String,
    pub short_entry: String,
    pub exit_condition: Option<String>,
    pub stop_loss_percent: f64,
    pub take_profit_percent: f64,
}

impl StrategySource {
    /// Parse every condition. The failing field is named in the error.
    pub fn compile(&self) -> Result<StrategyConfig, BarsmithError> {
        let exit_condition = match self.exit_condition.as_deref() {
            Some(src) if !src.trim().is_empty() => Some(parse_field("exit_condition", src)?),
            _ => None,
        };
        Ok(StrategyConfig {
            long_entry: parse_field("long_entry", &self.long_entry)?,
            short_entry: parse_field("short_entry", &self.short_entry)?,
            exit_condition,
            stop_loss_percent: self.stop_loss_percent,
            take_profit_percent: self.take_profit_percent,
        })
    }
}

fn parse_field(field: &str, src: &str) -> Result<Expr, BarsmithError> {
    condition_parser::parse(src).map_err(|source| BarsmithError::ConditionParse {
        field: field.to_string(),
        source,
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct StrategyConfig {
    pub long_entry: Expr,
    pub short_entry: Expr,
    pub exit_condition: Option<Expr>,
    pub stop_loss_percent: f64,
    /// 0 disables the profit target.
    pub take_profit_percent: f64,
}

impl StrategyConfig {
    pub fn stop_loss_price(&self, side: Side, entry: f64) -> f64 {
        entry * (1.0 - side.sign() * self.stop_loss_percent / 100.0)
    }

    pub fn take_profit_price(&self, side: Side, entry: f64) -> Option<f64> {
        if self.take_profit_percent > 0.0 {
            Some(entry * (1.0 + side.sign() * self.take_profit_percent / 100.0))
        } else {
            None
        }
    }

    /// Every condition with its config key, for validation and reporting.
    pub fn conditions(&self) -> Vec<(&'static str, &Expr)> {
        let mut out = vec![
            ("long_entry", &self.long_entry),
            ("short_entry", &self.short_entry),
        ];
        if let Some(exit) = &self.exit_condition {
            out.push(("exit_condition", exit));
        }
        out
    }
}
