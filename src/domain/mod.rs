//! Core domain types and logic.

pub mod ohlcv;
pub mod error;
pub mod indicator;
pub mod indicator_helpers;
pub mod setup;
pub mod position;
pub mod metrics;
pub mod backtest;
pub mod stats;
pub mod edge_guardian;
pub mod decision;
pub mod config_validation;
