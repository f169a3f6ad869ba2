//! Core domain types and logic: the cash and order ledger, holdings, and the
//! moving-average crossover backtest.

pub mod account;
pub mod backtest;
pub mod config_validation;
pub mod error;
pub mod holdings;
pub mod metrics;
pub mod moving_average;
pub mod order;
pub mod portfolio;
pub mod quote;
pub mod settlement;
pub mod synthetic;
