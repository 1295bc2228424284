//! Core engine types and logic. Nothing in here performs I/O.

pub mod ohlcv;
pub mod position;
pub mod indicator;
pub mod condition;
pub mod condition_parser;
pub mod condition_eval;
pub mod strategy;
pub mod simulation;
pub mod stats;
pub mod optimizer;
pub mod config_validation;
pub mod backtest;
pub mod error;
