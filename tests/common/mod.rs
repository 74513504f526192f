#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use signaldesk::domain::config_validation::{
    AccountSettings, AnalysisSettings, AppConfig, CostSettings, DataSettings,
};
use signaldesk::domain::error::SignalDeskError;
pub use signaldesk::domain::ohlcv::Candle;
use signaldesk::ports::data_port::{CandleSource, MarketDiagnostics, MarketSeries};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

pub struct MockCandleSource {
    pub data: HashMap<String, Vec<Candle>>,
    pub errors: HashMap<String, String>,
    pub quote_override: Option<String>,
    pub diagnostics: MarketDiagnostics,
}

impl MockCandleSource {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
            quote_override: None,
            diagnostics: MarketDiagnostics::default(),
        }
    }

    pub fn with_candles(mut self, symbol: &str, candles: Vec<Candle>) -> Self {
        self.data.insert(symbol.to_string(), candles);
        self
    }

    pub fn with_error(mut self, symbol: &str, reason: &str) -> Self {
        self.errors.insert(symbol.to_string(), reason.to_string());
        self
    }

    /// Serve every series in this quote regardless of the one requested.
    pub fn with_quote(mut self, quote: &str) -> Self {
        self.quote_override = Some(quote.to_string());
        self
    }

    pub fn with_diagnostics(mut self, diagnostics: MarketDiagnostics) -> Self {
        self.diagnostics = diagnostics;
        self
    }
}

impl CandleSource for MockCandleSource {
    fn provider(&self) -> &str {
        "mock"
    }

    fn fetch_candles(&self, symbol: &str, quote: &str) -> Result<MarketSeries, SignalDeskError> {
        if let Some(reason) = self.errors.get(symbol) {
            return Err(SignalDeskError::DataSource {
                reason: reason.clone(),
            });
        }
        let candles = self
            .data
            .get(symbol)
            .cloned()
            .ok_or_else(|| SignalDeskError::NoData {
                symbol: symbol.to_string(),
                quote: quote.to_string(),
            })?;
        Ok(MarketSeries {
            provider: "mock".to_string(),
            symbol: symbol.to_string(),
            quote_currency: self
                .quote_override
                .clone()
                .unwrap_or_else(|| quote.to_string()),
            candles,
            diagnostics: self.diagnostics.clone(),
        })
    }
}

/// Fixed reference instant; generated series end one day before it.
pub fn as_of() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
}

/// Daily candles ending the day before [`as_of`]. The generator receives the
/// index and returns `(open, high, low, close, volume)`.
pub fn generate_candles<F>(days: usize, generator: F) -> Vec<Candle>
where
    F: Fn(usize) -> (f64, f64, f64, f64, Option<f64>),
{
    (0..days)
        .map(|i| {
            let (open, high, low, close, volume) = generator(i);
            Candle {
                time: as_of() - Duration::days((days - i) as i64),
                open,
                high,
                low,
                close,
                volume,
            }
        })
        .collect()
}

fn trend_close(i: usize) -> f64 {
    100.0 + i as f64 * 0.35
}

fn trend_volume(i: usize) -> Option<f64> {
    Some(2000.0 + i as f64 * 4.0)
}

/// Smooth uptrend that never closes above its prior 20-day high.
pub fn rising_candles(days: usize) -> Vec<Candle> {
    generate_candles(days, |i| {
        let close = trend_close(i);
        (close - 0.6, close + 0.9, close - 1.5, close, trend_volume(i))
    })
}

pub fn declining_candles(days: usize) -> Vec<Candle> {
    generate_candles(days, |i| {
        let close = 300.0 - i as f64 * 0.4;
        (close + 0.4, close + 1.0, close - 1.0, close, Some(1000.0 + i as f64))
    })
}

/// Uptrend whose last candle breaks out on a volume spike.
pub fn final_breakout_candles(days: usize) -> Vec<Candle> {
    generate_candles(days, |i| {
        let mut close = trend_close(i);
        let mut volume = trend_volume(i);
        if i == days - 1 {
            close += 8.0;
            volume = Some(200_000.0);
        }
        (close - 0.6, close + 0.9, close - 1.5, close, volume)
    })
}

/// Uptrend breaking out on the last two candles: the first breakout fills
/// at the open of the final candle.
pub fn two_day_breakout_candles(days: usize) -> Vec<Candle> {
    generate_candles(days, |i| {
        let mut close = trend_close(i);
        let mut volume = trend_volume(i);
        if i == days - 2 {
            close += 10.0;
        }
        if i == days - 1 {
            close += 11.0;
        }
        if i >= days - 2 {
            volume = Some(300_000.0);
        }
        (close - 0.6, close + 1.2, close - 1.5, close, volume)
    })
}

/// Uptrend whose last candle collapses well below the recent lows.
pub fn final_drop_candles(days: usize) -> Vec<Candle> {
    generate_candles(days, |i| {
        let mut close = trend_close(i);
        if i == days - 1 {
            close -= 15.0;
        }
        (close - 0.6, close + 0.9, close - 1.5, close, trend_volume(i))
    })
}

pub fn sample_config(symbols: &[&str]) -> AppConfig {
    AppConfig {
        data: DataSettings {
            path: PathBuf::from("./data"),
            provider: "mock".to_string(),
            fallback_quote: None,
            fallback_path: None,
            cache_ttl_secs: 60,
            max_stale_secs: 720,
        },
        account: AccountSettings {
            equity: 10_000.0,
            risk_percent: 1.0,
            currency: "USD".to_string(),
        },
        analysis: AnalysisSettings {
            symbols: symbols.iter().map(|s| s.to_string()).collect(),
            quote: "USD".to_string(),
        },
        costs: CostSettings {
            fee_bps: 10.0,
            slippage_bps: 5.0,
        },
    }
}

/// Write candles as `{SYMBOL}_{QUOTE}.csv` under `dir`.
pub fn write_csv(dir: &Path, symbol: &str, quote: &str, candles: &[Candle]) -> PathBuf {
    let mut content = String::from("time,open,high,low,close,volume\n");
    for c in candles {
        let volume = c.volume.map(|v| v.to_string()).unwrap_or_default();
        writeln!(
            content,
            "{},{},{},{},{},{}",
            c.time.to_rfc3339(),
            c.open,
            c.high,
            c.low,
            c.close,
            volume
        )
        .unwrap();
    }
    let path = dir.join(format!("{symbol}_{quote}.csv"));
    std::fs::write(&path, content).unwrap();
    path
}
