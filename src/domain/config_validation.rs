//! Configuration validation and typed settings.
//!
//! Every section is validated before any market data is fetched.

use std::collections::HashSet;
use std::path::PathBuf;
use std::str::FromStr;

use crate::domain::backtest::{DEFAULT_FEE_BPS, DEFAULT_SLIPPAGE_BPS};
use crate::domain::decision::MAX_RISK_PERCENT;
use crate::domain::error::SignalDeskError;
use crate::ports::config_port::ConfigPort;

pub const DEFAULT_PROVIDER: &str = "csv";
pub const DEFAULT_CACHE_TTL_SECS: i64 = 60;
pub const DEFAULT_MAX_STALE_SECS: i64 = 720;
pub const DEFAULT_RISK_PERCENT: f64 = 1.0;

#[derive(Debug, Clone, PartialEq)]
pub struct DataSettings {
    pub path: PathBuf,
    pub provider: String,
    pub fallback_quote: Option<String>,
    /// Secondary CSV directory tried when the primary provider fails.
    pub fallback_path: Option<PathBuf>,
    pub cache_ttl_secs: u64,
    pub max_stale_secs: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AccountSettings {
    pub equity: f64,
    pub risk_percent: f64,
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisSettings {
    pub symbols: Vec<String>,
    pub quote: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CostSettings {
    pub fee_bps: f64,
    pub slippage_bps: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub data: DataSettings,
    pub account: AccountSettings,
    pub analysis: AnalysisSettings,
    pub costs: CostSettings,
}

pub fn load_app_config(config: &dyn ConfigPort) -> Result<AppConfig, SignalDeskError> {
    let data = load_data_settings(config)?;
    let analysis = load_analysis_settings(config)?;
    let account = load_account_settings(config, &analysis.quote)?;
    let costs = load_cost_settings(config)?;
    Ok(AppConfig {
        data,
        account,
        analysis,
        costs,
    })
}

fn load_data_settings(config: &dyn ConfigPort) -> Result<DataSettings, SignalDeskError> {
    let path = required_string(config, "data", "path")?;
    let provider = optional_string(config, "data", "provider")
        .unwrap_or_else(|| DEFAULT_PROVIDER.to_string());
    let fallback_quote = optional_string(config, "data", "fallback_quote").map(|q| q.to_uppercase());
    let fallback_path = optional_string(config, "data", "fallback_path").map(PathBuf::from);

    let cache_ttl_secs = number(config, "data", "cache_ttl_secs", DEFAULT_CACHE_TTL_SECS)?;
    if cache_ttl_secs <= 0 {
        return Err(invalid("data", "cache_ttl_secs", "cache_ttl_secs must be positive"));
    }
    let max_stale_secs = number(config, "data", "max_stale_secs", DEFAULT_MAX_STALE_SECS)?;
    if max_stale_secs < 0 {
        return Err(invalid("data", "max_stale_secs", "max_stale_secs must be non-negative"));
    }

    Ok(DataSettings {
        path: PathBuf::from(path),
        provider,
        fallback_quote,
        fallback_path,
        cache_ttl_secs: cache_ttl_secs as u64,
        max_stale_secs: max_stale_secs as u64,
    })
}

fn load_account_settings(
    config: &dyn ConfigPort,
    quote: &str,
) -> Result<AccountSettings, SignalDeskError> {
    let equity: f64 = number(config, "account", "equity", 0.0)?;
    if !equity.is_finite() || equity <= 0.0 {
        return Err(invalid("account", "equity", "equity must be positive"));
    }

    let risk_percent = number(config, "account", "risk_percent", DEFAULT_RISK_PERCENT)?;
    if !risk_percent.is_finite() || risk_percent <= 0.0 || risk_percent > MAX_RISK_PERCENT {
        return Err(invalid(
            "account",
            "risk_percent",
            "risk_percent must be greater than 0 and at most 5",
        ));
    }

    let currency = optional_string(config, "account", "currency")
        .map(|c| c.to_uppercase())
        .unwrap_or_else(|| quote.to_string());

    Ok(AccountSettings {
        equity,
        risk_percent,
        currency,
    })
}

fn load_analysis_settings(config: &dyn ConfigPort) -> Result<AnalysisSettings, SignalDeskError> {
    let symbols = parse_symbols(&required_string(config, "analysis", "symbols")?)?;
    let quote = required_string(config, "analysis", "quote")?.to_uppercase();
    Ok(AnalysisSettings { symbols, quote })
}

fn load_cost_settings(config: &dyn ConfigPort) -> Result<CostSettings, SignalDeskError> {
    let fee_bps = number(config, "backtest", "fee_bps", DEFAULT_FEE_BPS)?;
    if !fee_bps.is_finite() || fee_bps < 0.0 {
        return Err(invalid("backtest", "fee_bps", "fee_bps must be non-negative"));
    }
    let slippage_bps = number(config, "backtest", "slippage_bps", DEFAULT_SLIPPAGE_BPS)?;
    if !slippage_bps.is_finite() || slippage_bps < 0.0 {
        return Err(invalid(
            "backtest",
            "slippage_bps",
            "slippage_bps must be non-negative",
        ));
    }
    Ok(CostSettings {
        fee_bps,
        slippage_bps,
    })
}

/// Parse a comma-separated symbol list into upper-case symbols, rejecting
/// empty tokens and duplicates.
pub fn parse_symbols(input: &str) -> Result<Vec<String>, SignalDeskError> {
    let mut symbols = Vec::new();
    let mut seen = HashSet::new();

    for token in input.split(',') {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            return Err(invalid("analysis", "symbols", "empty symbol in list"));
        }
        let symbol = trimmed.to_uppercase();
        if !seen.insert(symbol.clone()) {
            return Err(invalid(
                "analysis",
                "symbols",
                &format!("duplicate symbol: {symbol}"),
            ));
        }
        symbols.push(symbol);
    }

    Ok(symbols)
}

fn optional_string(config: &dyn ConfigPort, section: &str, key: &str) -> Option<String> {
    config
        .get_string(section, key)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn required_string(config: &dyn ConfigPort, section: &str, key: &str) -> Result<String, SignalDeskError> {
    optional_string(config, section, key).ok_or_else(|| SignalDeskError::ConfigMissing {
        section: section.to_string(),
        key: key.to_string(),
    })
}

/// Absent keys take `default`; a present value that does not parse is an
/// error rather than a silent fallback.
fn number<T: FromStr>(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: T,
) -> Result<T, SignalDeskError> {
    match optional_string(config, section, key) {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|_| invalid(section, key, &format!("{key} is not a number: {raw}"))),
    }
}

fn invalid(section: &str, key: &str, reason: &str) -> SignalDeskError {
    SignalDeskError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.to_string(),
    }
}
