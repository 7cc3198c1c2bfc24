//! Core domain types and logic.

pub mod backtest;
pub mod calendar;
pub mod config_validation;
pub mod error;
pub mod meta;
pub mod metrics;
pub mod price_table;
pub mod ranking;
pub mod signal;
pub mod simulator;
pub mod strategy;
pub mod weights;
