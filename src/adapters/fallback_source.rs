//! Primary/secondary candle source chain.
//!
//! When the primary provider fails, the secondary is asked for the same
//! series and the result records which provider failed.

use tracing::warn;

use crate::domain::error::SignalDeskError;
use crate::ports::data_port::{CandleSource, MarketSeries};

pub struct FallbackSource<P: CandleSource, F: CandleSource> {
    primary: P,
    fallback: F,
}

impl<P: CandleSource, F: CandleSource> FallbackSource<P, F> {
    pub fn new(primary: P, fallback: F) -> Self {
        Self { primary, fallback }
    }
}

impl<P: CandleSource, F: CandleSource> CandleSource for FallbackSource<P, F> {
    /// Keyed by the requested provider so cache entries survive a fallback.
    fn provider(&self) -> &str {
        self.primary.provider()
    }

    fn fetch_candles(&self, symbol: &str, quote: &str) -> Result<MarketSeries, SignalDeskError> {
        match self.primary.fetch_candles(symbol, quote) {
            Ok(series) => Ok(series),
            Err(primary_err) => {
                warn!(
                    symbol,
                    quote,
                    provider = self.primary.provider(),
                    fallback = self.fallback.provider(),
                    error = %primary_err,
                    "primary provider failed, trying fallback"
                );
                let mut series = self.fallback.fetch_candles(symbol, quote)?;
                series.diagnostics.fallback_from = Some(self.primary.provider().to_string());
                Ok(series)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::data_port::MarketDiagnostics;

    struct StubSource {
        label: &'static str,
        fails: bool,
    }

    impl CandleSource for StubSource {
        fn provider(&self) -> &str {
            self.label
        }

        fn fetch_candles(&self, symbol: &str, quote: &str) -> Result<MarketSeries, SignalDeskError> {
            if self.fails {
                return Err(SignalDeskError::NoData {
                    symbol: symbol.to_string(),
                    quote: quote.to_string(),
                });
            }
            Ok(MarketSeries {
                provider: self.label.to_string(),
                symbol: symbol.to_string(),
                quote_currency: quote.to_string(),
                candles: Vec::new(),
                diagnostics: MarketDiagnostics::default(),
            })
        }
    }

    fn stub(label: &'static str, fails: bool) -> StubSource {
        StubSource { label, fails }
    }

    #[test]
    fn primary_success_is_untouched() {
        let source = FallbackSource::new(stub("live", false), stub("archive", false));
        let series = source.fetch_candles("BTC", "USD").unwrap();
        assert_eq!(series.provider, "live");
        assert_eq!(series.diagnostics.fallback_from, None);
    }

    #[test]
    fn primary_failure_uses_fallback_and_records_it() {
        let source = FallbackSource::new(stub("live", true), stub("archive", false));
        let series = source.fetch_candles("BTC", "USD").unwrap();
        assert_eq!(series.provider, "archive");
        assert_eq!(series.diagnostics.fallback_from.as_deref(), Some("live"));
    }

    #[test]
    fn both_failing_returns_fallback_error() {
        let source = FallbackSource::new(stub("live", true), stub("archive", true));
        let err = source.fetch_candles("BTC", "USD").unwrap_err();
        assert!(matches!(err, SignalDeskError::NoData { .. }));
    }

    #[test]
    fn provider_label_is_primary() {
        let source = FallbackSource::new(stub("live", true), stub("archive", false));
        assert_eq!(source.provider(), "live");
    }
}
