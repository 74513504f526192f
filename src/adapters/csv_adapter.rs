//! CSV file candle source.
//!
//! Reads `{SYMBOL}_{QUOTE}.csv` files with a `time,open,high,low,close,volume`
//! header from one directory. `time` is RFC 3339 or `YYYY-MM-DD` (midnight
//! UTC); a blank volume means the provider did not report one.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use csv::StringRecord;
use tracing::debug;

use crate::domain::error::SignalDeskError;
use crate::domain::ohlcv::Candle;
use crate::ports::data_port::{CandleSource, MarketDiagnostics, MarketSeries};

pub struct CsvAdapter {
    base_path: PathBuf,
    provider: String,
    fallback_quote: Option<String>,
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self {
            base_path,
            provider: "csv".to_string(),
            fallback_quote: None,
        }
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = provider.into();
        self
    }

    /// Quote currency to read when no file exists for the requested one.
    pub fn with_fallback_quote(mut self, quote: Option<String>) -> Self {
        self.fallback_quote = quote;
        self
    }

    fn csv_path(&self, symbol: &str, quote: &str) -> PathBuf {
        self.base_path.join(format!("{symbol}_{quote}.csv"))
    }

    fn read_candles(&self, path: &Path) -> Result<Vec<Candle>, SignalDeskError> {
        let content = fs::read_to_string(path).map_err(|e| SignalDeskError::DataSource {
            reason: format!("failed to read {}: {}", path.display(), e),
        })?;

        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let mut candles = Vec::new();
        for (row, result) in rdr.records().enumerate() {
            let record = result.map_err(|e| SignalDeskError::DataSource {
                reason: format!("CSV parse error: {e}"),
            })?;
            candles.push(parse_candle(&record, row + 1)?);
        }

        candles.sort_by_key(|c| c.time);
        candles.dedup_by_key(|c| c.time);
        Ok(candles)
    }
}

impl CandleSource for CsvAdapter {
    fn provider(&self) -> &str {
        &self.provider
    }

    fn fetch_candles(&self, symbol: &str, quote: &str) -> Result<MarketSeries, SignalDeskError> {
        let symbol = symbol.to_uppercase();
        let quote = quote.to_uppercase();

        let mut diagnostics = MarketDiagnostics::default();
        let mut quote_currency = quote.clone();
        let mut path = self.csv_path(&symbol, &quote);

        if !path.exists() {
            match &self.fallback_quote {
                Some(fallback) if *fallback != quote && self.csv_path(&symbol, fallback).exists() => {
                    debug!(%symbol, %quote, %fallback, "using fallback quote file");
                    path = self.csv_path(&symbol, fallback);
                    quote_currency = fallback.clone();
                    diagnostics.conversion_fallback_used = true;
                }
                _ => return Err(SignalDeskError::NoData { symbol, quote }),
            }
        }

        let candles = self.read_candles(&path)?;
        if candles.is_empty() {
            return Err(SignalDeskError::NoData { symbol, quote });
        }

        Ok(MarketSeries {
            provider: self.provider.clone(),
            symbol,
            quote_currency,
            candles,
            diagnostics,
        })
    }
}

fn parse_candle(record: &StringRecord, row: usize) -> Result<Candle, SignalDeskError> {
    let time = parse_time(field(record, 0, "time", row)?, row)?;
    Ok(Candle {
        time,
        open: parse_price(record, 1, "open", row)?,
        high: parse_price(record, 2, "high", row)?,
        low: parse_price(record, 3, "low", row)?,
        close: parse_price(record, 4, "close", row)?,
        volume: parse_volume(record.get(5), row)?,
    })
}

fn field<'a>(record: &'a StringRecord, index: usize, name: &str, row: usize) -> Result<&'a str, SignalDeskError> {
    record
        .get(index)
        .map(str::trim)
        .ok_or_else(|| SignalDeskError::DataSource {
            reason: format!("row {row}: missing {name} column"),
        })
}

fn parse_time(value: &str, row: usize) -> Result<DateTime<Utc>, SignalDeskError> {
    if let Ok(time) = DateTime::parse_from_rfc3339(value) {
        return Ok(time.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| SignalDeskError::DataSource {
            reason: format!("row {row}: invalid time {value:?}, expected RFC 3339 or YYYY-MM-DD"),
        })
}

fn parse_price(record: &StringRecord, index: usize, name: &str, row: usize) -> Result<f64, SignalDeskError> {
    let raw = field(record, index, name, row)?;
    let value: f64 = raw.parse().map_err(|e| SignalDeskError::DataSource {
        reason: format!("row {row}: invalid {name} value {raw:?}: {e}"),
    })?;
    if !value.is_finite() {
        return Err(SignalDeskError::DataSource {
            reason: format!("row {row}: non-finite {name} value"),
        });
    }
    Ok(value)
}

fn parse_volume(raw: Option<&str>, row: usize) -> Result<Option<f64>, SignalDeskError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => s
            .parse::<f64>()
            .map(Some)
            .map_err(|e| SignalDeskError::DataSource {
                reason: format!("row {row}: invalid volume value {s:?}: {e}"),
            }),
    }
}
