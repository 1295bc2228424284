//! Condition evaluation.
//!
//! Identifiers resolve strictly against a [`Scope`]; nothing else is
//! reachable from an expression.
//!
//! # Evaluation Semantics
//!
//! - Arithmetic and ordering comparisons take numbers only
//! - `==` / `!=` compare numbers within `EQUALITY_TOLERANCE`, or booleans exactly
//! - `&&` short-circuits on `false`, `||` short-circuits on `true`
//! - An identifier with no value in the scope is an [`EvalError`], which the
//!   simulation reads as "condition false" for that bar

use std::collections::HashMap;

use crate::domain::condition::{BinaryOp, Expr, UnaryOp, Value};
use crate::domain::error::EvalError;
use crate::domain::indicator::IndicatorSet;
use crate::domain::ohlcv::Candle;
use crate::domain::position::Position;

/// Tolerance for numeric `==` / `!=`.
pub const EQUALITY_TOLERANCE: f64 = 1e-9;

/// Bar fields always present in a [`BarContext`].
pub const BAR_FIELDS: [&str; 6] = ["open", "high", "low", "close", "volume", "bar_index"];

/// Fields present only while a position is open (exit evaluation).
pub const POSITION_FIELDS: [&str; 7] = [
    "entry_price",
    "stop_loss",
    "take_profit",
    "quantity",
    "side",
    "bars_held",
    "unrealized_pnl",
];

/// Source of named numeric values for one evaluation.
pub trait Scope {
    fn lookup(&self, name: &str) -> Option<f64>;
}

impl Scope for HashMap<String, f64> {
    fn lookup(&self, name: &str) -> Option<f64> {
        self.get(name).copied()
    }
}

/// Per-bar context: the candle's fields, every indicator value defined at
/// this bar and, when evaluating an exit, the open position's fields.
pub struct BarContext<'a> {
    pub index: usize,
    pub candle: &'a Candle,
    pub indicators: &'a IndicatorSet,
    pub position: Option<&'a Position>,
}

impl Scope for BarContext<'_> {
    fn lookup(&self, name: &str) -> Option<f64> {
        let c = self.candle;
        match name {
            "open" => return Some(c.open),
            "high" => return Some(c.high),
            "low" => return Some(c.low),
            "close" => return Some(c.close),
            "volume" => return Some(c.volume),
            "bar_index" => return Some(self.index as f64),
            _ => {}
        }
        if let Some(pos) = self.position {
            match name {
                "entry_price" => return Some(pos.entry_price),
                "stop_loss" => return Some(pos.stop_loss),
                "take_profit" => return pos.take_profit,
                "quantity" => return Some(pos.quantity),
                "side" => return Some(pos.side.sign()),
                "bars_held" => return Some(self.index.saturating_sub(pos.entry_index) as f64),
                "unrealized_pnl" => return Some(pos.pnl_at(c.close)),
                _ => {}
            }
        }
        self.indicators.value(name, self.index)
    }
}

pub fn evaluate(expr: &Expr, scope: &dyn Scope) -> Result<Value, EvalError> {
    match expr {
        Expr::Literal(v) => Ok(*v),
        Expr::Identifier(name) => scope
            .lookup(name)
            .map(Value::Number)
            .ok_or_else(|| EvalError::UndefinedIdentifier(name.clone())),
        Expr::Unary { op, expr } => {
            let v = evaluate(expr, scope)?;
            match op {
                UnaryOp::Not => Ok(Value::Bool(!as_bool(v)?)),
                UnaryOp::Neg => Ok(Value::Number(-as_number(v)?)),
            }
        }
        Expr::Binary { op, left, right } => match op {
            BinaryOp::And => {
                if !as_bool(evaluate(left, scope)?)? {
                    return Ok(Value::Bool(false));
                }
                Ok(Value::Bool(as_bool(evaluate(right, scope)?)?))
            }
            BinaryOp::Or => {
                if as_bool(evaluate(left, scope)?)? {
                    return Ok(Value::Bool(true));
                }
                Ok(Value::Bool(as_bool(evaluate(right, scope)?)?))
            }
            _ => {
                let l = evaluate(left, scope)?;
                let r = evaluate(right, scope)?;
                apply(*op, l, r)
            }
        },
    }
}

/// Evaluate an expression that must produce a boolean.
pub fn evaluate_condition(expr: &Expr, scope: &dyn Scope) -> Result<bool, EvalError> {
    as_bool(evaluate(expr, scope)?)
}

fn apply(op: BinaryOp, l: Value, r: Value) -> Result<Value, EvalError> {
    match op {
        BinaryOp::Eq | BinaryOp::Ne => {
            let equal = match (l, r) {
                (Value::Number(a), Value::Number(b)) => (a - b).abs() < EQUALITY_TOLERANCE,
                (Value::Bool(a), Value::Bool(b)) => a == b,
                (Value::Number(_), other) | (other, Value::Number(_)) => {
                    return Err(EvalError::TypeMismatch {
                        expected: "number",
                        found: other.type_name(),
                    });
                }
            };
            Ok(Value::Bool(if op == BinaryOp::Eq { equal } else { !equal }))
        }
        BinaryOp::Gt | BinaryOp::Ge | BinaryOp::Lt | BinaryOp::Le => {
            let (a, b) = (as_number(l)?, as_number(r)?);
            let result = match op {
                BinaryOp::Gt => a > b,
                BinaryOp::Ge => a >= b,
                BinaryOp::Lt => a < b,
                _ => a <= b,
            };
            Ok(Value::Bool(result))
        }
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div => {
            let (a, b) = (as_number(l)?, as_number(r)?);
            let result = match op {
                BinaryOp::Add => a + b,
                BinaryOp::Sub => a - b,
                BinaryOp::Mul => a * b,
                _ => {
                    if b == 0.0 {
                        return Err(EvalError::DivisionByZero);
                    }
                    a / b
                }
            };
            if !result.is_finite() {
                return Err(EvalError::NonFinite);
            }
            Ok(Value::Number(result))
        }
        BinaryOp::And => Ok(Value::Bool(as_bool(l)? && as_bool(r)?)),
        BinaryOp::Or => Ok(Value::Bool(as_bool(l)? || as_bool(r)?)),
    }
}

fn as_bool(v: Value) -> Result<bool, EvalError> {
    match v {
        Value::Bool(b) => Ok(b),
        other => Err(EvalError::TypeMismatch {
            expected: "boolean",
            found: other.type_name(),
        }),
    }
}

fn as_number(v: Value) -> Result<f64, EvalError> {
    match v {
        Value::Number(n) => Ok(n),
        other => Err(EvalError::TypeMismatch {
            expected: "number",
            found: other.type_name(),
        }),
    }
}
