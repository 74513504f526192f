//! Market data port.

use crate::domain::error::SignalDeskError;
use crate::domain::ohlcv::Candle;

/// How a series was obtained, for provider warnings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarketDiagnostics {
    /// A cached series was served after a failed refresh.
    pub stale_cache_used: bool,
    pub cache_age_secs: Option<u64>,
    /// Prices are quoted in a fallback currency instead of the requested one.
    pub conversion_fallback_used: bool,
    /// Provider that failed before a fallback source was used.
    pub fallback_from: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MarketSeries {
    pub provider: String,
    pub symbol: String,
    pub quote_currency: String,
    /// Ascending by time.
    pub candles: Vec<Candle>,
    pub diagnostics: MarketDiagnostics,
}

pub trait CandleSource {
    /// Label used to key caches and report provenance.
    fn provider(&self) -> &str;

    fn fetch_candles(&self, symbol: &str, quote: &str) -> Result<MarketSeries, SignalDeskError>;
}

impl<T: CandleSource + ?Sized> CandleSource for Box<T> {
    fn provider(&self) -> &str {
        (**self).provider()
    }

    fn fetch_candles(&self, symbol: &str, quote: &str) -> Result<MarketSeries, SignalDeskError> {
        (**self).fetch_candles(symbol, quote)
    }
}
