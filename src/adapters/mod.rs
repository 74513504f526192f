//! Concrete adapter implementations for ports.

pub mod csv_adapter;
pub mod fallback_source;
pub mod file_config_adapter;
pub mod json_report_adapter;
pub mod market_cache;
