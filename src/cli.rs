//! CLI definition and dispatch.

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tracing::{info, warn};

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::fallback_source::FallbackSource;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::json_report_adapter::JsonReportAdapter;
use crate::adapters::market_cache::MarketCache;
use crate::domain::config_validation::{load_app_config, AppConfig, DataSettings};
use crate::domain::decision::{analyze, AnalysisRequest, AnalysisResult};
use crate::domain::error::SignalDeskError;
use crate::ports::data_port::{CandleSource, MarketDiagnostics, MarketSeries};
use crate::ports::report_port::ReportPort;

#[derive(Parser, Debug)]
#[command(name = "signaldesk", about = "Daily trend-breakout signal desk")]
pub struct Cli {
    /// Log level: trace, debug, info, warn or error
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Analyse one symbol
    Analyze {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        symbol: String,
        /// Evaluate an existing long position instead of a new entry
        #[arg(long, requires = "entry_price")]
        holding: bool,
        #[arg(long, requires = "holding")]
        entry_price: Option<f64>,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Analyse every configured symbol
    Scan {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Validate a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    init_logging(&cli.log_level);

    match cli.command {
        Command::Analyze {
            config,
            symbol,
            holding,
            entry_price,
            output,
        } => {
            let entry_price = if holding { entry_price } else { None };
            run_analyze(&config, &symbol, entry_price, output.as_deref())
        }
        Command::Scan { config, output } => run_scan(&config, output.as_deref()),
        Command::Validate { config } => run_validate(&config),
    }
}

/// Install the stderr subscriber. `RUST_LOG` overrides `--log-level`.
pub fn init_logging(level: &str) {
    let level = match level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => level.to_lowercase(),
        _ => "warn".to_string(),
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    // A second init (tests calling `run` twice) keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

pub fn load_config(path: &Path) -> Result<AppConfig, ExitCode> {
    let adapter = FileConfigAdapter::from_file(path).map_err(|e| {
        eprintln!("error: {e}");
        ExitCode::from(&e)
    })?;
    load_app_config(&adapter).map_err(|e| {
        eprintln!("error: {e}");
        ExitCode::from(&e)
    })
}

/// CSV source for the configured data directory, chained to the fallback
/// directory when one is set, behind the market cache.
pub fn build_source(data: &DataSettings) -> MarketCache<Box<dyn CandleSource + Send + Sync>> {
    let primary = CsvAdapter::new(data.path.clone())
        .with_provider(&data.provider)
        .with_fallback_quote(data.fallback_quote.clone());

    let source: Box<dyn CandleSource + Send + Sync> = match &data.fallback_path {
        Some(path) => {
            let secondary = CsvAdapter::new(path.clone())
                .with_provider(format!("{}-fallback", data.provider))
                .with_fallback_quote(data.fallback_quote.clone());
            Box::new(FallbackSource::new(primary, secondary))
        }
        None => Box::new(primary),
    };

    MarketCache::new(source)
        .with_ttl(Duration::from_secs(data.cache_ttl_secs))
        .with_max_stale(Duration::from_secs(data.max_stale_secs))
}

/// Fetch, analyse and annotate one symbol.
pub fn run_analysis_pipeline(
    source: &dyn CandleSource,
    config: &AppConfig,
    symbol: &str,
    entry_price: Option<f64>,
    as_of: DateTime<Utc>,
) -> Result<AnalysisResult, SignalDeskError> {
    let requested_quote = &config.analysis.quote;
    info!(symbol, quote = %requested_quote, provider = source.provider(), "fetching market data");

    let MarketSeries {
        symbol,
        quote_currency,
        candles,
        diagnostics,
        ..
    } = source.fetch_candles(symbol, requested_quote)?;

    let aligned = config.account.currency.eq_ignore_ascii_case(&quote_currency);
    let mut request = AnalysisRequest::new(
        symbol,
        candles,
        config.account.equity,
        config.account.risk_percent,
        quote_currency.clone(),
        as_of,
    )
    .with_currency_alignment(aligned)
    .with_costs(config.costs.fee_bps, config.costs.slippage_bps);
    if let Some(entry) = entry_price {
        request = request.with_holding(entry);
    }

    info!(symbol = %request.symbol, candles = request.candles.len(), "running analysis");
    let mut result = analyze(&request)?;
    result.warnings = append_provider_warnings(
        result.warnings,
        &diagnostics,
        requested_quote,
        &quote_currency,
        aligned,
    );
    Ok(result)
}

/// Analyse every configured symbol. Failing symbols are skipped; the call
/// fails only when none succeed.
pub fn run_scan_pipeline(
    source: &dyn CandleSource,
    config: &AppConfig,
    as_of: DateTime<Utc>,
) -> Result<Vec<AnalysisResult>, SignalDeskError> {
    let mut results = Vec::with_capacity(config.analysis.symbols.len());
    let mut last_error = None;

    for symbol in &config.analysis.symbols {
        match run_analysis_pipeline(source, config, symbol, None, as_of) {
            Ok(result) => results.push(result),
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "skipping symbol");
                eprintln!("warning: skipping {} ({})", symbol, e);
                last_error = Some(e);
            }
        }
    }

    match (results.is_empty(), last_error) {
        (true, Some(e)) => Err(e),
        _ => Ok(results),
    }
}

pub fn append_provider_warnings(
    warnings: Vec<String>,
    diagnostics: &MarketDiagnostics,
    requested_quote: &str,
    quote_currency: &str,
    risk_currency_aligned: bool,
) -> Vec<String> {
    let mut out = warnings;
    if diagnostics.stale_cache_used {
        let age = diagnostics.cache_age_secs.unwrap_or(0);
        out.push(format!("Using stale cached market data ({age}s old)."));
    }
    if diagnostics.conversion_fallback_used {
        out.push(format!(
            "{} conversion unavailable, so prices are shown in {}.",
            requested_quote.to_uppercase(),
            quote_currency.to_uppercase()
        ));
    }
    if let Some(from) = &diagnostics.fallback_from {
        out.push(format!(
            "Requested provider failed ({from}); fallback source was used."
        ));
    }
    if !risk_currency_aligned {
        out.push(
            "Risk sizing is disabled until account currency matches price quote currency."
                .to_string(),
        );
    }
    dedupe_warnings(out)
}

fn dedupe_warnings(warnings: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    warnings
        .into_iter()
        .filter(|w| seen.insert(w.clone()))
        .collect()
}

pub fn run_analyze(
    config_path: &Path,
    symbol: &str,
    entry_price: Option<f64>,
    output_path: Option<&Path>,
) -> ExitCode {
    eprintln!("Loading config from {}", config_path.display());
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };

    let source = build_source(&config.data);
    let result = match run_analysis_pipeline(&source, &config, symbol, entry_price, Utc::now()) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    print_summary(&result);
    emit(&[result], output_path)
}

pub fn run_scan(config_path: &Path, output_path: Option<&Path>) -> ExitCode {
    eprintln!("Loading config from {}", config_path.display());
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };

    eprintln!(
        "Scanning {} symbols in {}...",
        config.analysis.symbols.len(),
        config.analysis.quote
    );
    let source = build_source(&config.data);
    let results = match run_scan_pipeline(&source, &config, Utc::now()) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("error: no symbols could be analysed (last error: {e})");
            return (&e).into();
        }
    };

    eprintln!("\n=== Scan Results ===");
    for result in &results {
        eprintln!(
            "  {:<8} {:<8} confidence {:>3} ({:?})",
            result.symbol, result.action, result.quality.confidence_score, result.quality.grade
        );
    }
    emit(&results, output_path)
}

pub fn run_validate(config_path: &Path) -> ExitCode {
    eprintln!("Validating config: {}", config_path.display());
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };

    eprintln!("  Data path:   {}", config.data.path.display());
    eprintln!("  Provider:    {}", config.data.provider);
    eprintln!("  Symbols:     {}", config.analysis.symbols.join(", "));
    eprintln!("  Quote:       {}", config.analysis.quote);
    eprintln!(
        "  Account:     {:.2} {} at {}% risk",
        config.account.equity, config.account.currency, config.account.risk_percent
    );
    eprintln!("\nConfiguration is valid.");
    ExitCode::SUCCESS
}

fn print_summary(result: &AnalysisResult) {
    let plan = &result.risk_plan;
    let fmt_opt = |v: Option<f64>| v.map_or_else(|| "n/a".to_string(), |x| format!("{x:.4}"));

    eprintln!("\n=== {} ({}) ===", result.symbol, result.quote_currency);
    eprintln!("Action:           {}", result.action);
    eprintln!("As of:            {}", result.timestamp.to_rfc3339());
    eprintln!("Close:            {:.4}", result.market.close);
    eprintln!(
        "Confidence:       {} ({:?})",
        result.quality.confidence_score, result.quality.grade
    );
    eprintln!("Stop:             {}", fmt_opt(plan.stop));
    eprintln!("Trailing Stop:    {}", fmt_opt(plan.trailing_stop));
    eprintln!("Target (2R):      {}", fmt_opt(plan.tp1));
    eprintln!(
        "Risk:             {:.2}% ({:.2}) of {:.2}",
        plan.risk_percent, plan.risk_amount, plan.equity
    );
    eprintln!("Position Size:    {}", fmt_opt(plan.position_size));
    eprintln!("Backtest Trades:  {}", result.backtest.summary.trades);
    eprintln!("Edge Guardian:    {}", result.edge_guardian.gate_reason);

    if !result.reasons.is_empty() {
        eprintln!("\nReasons:");
        for reason in &result.reasons {
            eprintln!("  - {reason}");
        }
    }
    if !result.warnings.is_empty() {
        eprintln!("\nWarnings:");
        for warning in &result.warnings {
            eprintln!("  - {warning}");
        }
    }
}

/// JSON to the output file when given, otherwise to stdout.
fn emit(results: &[AnalysisResult], output_path: Option<&Path>) -> ExitCode {
    let reporter = JsonReportAdapter::new();
    let outcome = match output_path {
        Some(path) => reporter
            .write(results, &path.to_string_lossy())
            .map(|()| eprintln!("\nReport written to: {}", path.display())),
        None => reporter.render(results).map(|json| println!("{json}")),
    };
    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}
