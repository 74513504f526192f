//! Technical indicator implementations.
//!
//! Every indicator returns a [`Series`] aligned index-for-index with the
//! candle sequence. Entries inside a warmup window are `None`; an absent value
//! is never coerced to zero.

pub mod adx;
pub mod atr;
pub mod ema;
pub mod sma;

use crate::domain::ohlcv::Candle;

/// One optional value per candle.
pub type Series = Vec<Option<f64>>;

pub const SMA_FAST_PERIOD: usize = 50;
pub const SMA_SLOW_PERIOD: usize = 200;
pub const EMA_PERIOD: usize = 10;
pub const ATR_PERIOD: usize = 14;
pub const ADX_PERIOD: usize = 14;

/// All indicator series used by the setup evaluator and the backtest,
/// plus the raw price columns they are derived from.
#[derive(Debug, Clone, PartialEq)]
pub struct Indicators {
    pub closes: Vec<f64>,
    pub highs: Vec<f64>,
    pub lows: Vec<f64>,
    pub volumes: Vec<Option<f64>>,
    pub sma50: Series,
    pub sma200: Series,
    pub ema10: Series,
    pub atr14: Series,
    pub adx14: Series,
}

impl Indicators {
    pub fn compute(candles: &[Candle]) -> Self {
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        Indicators {
            highs: candles.iter().map(|c| c.high).collect(),
            lows: candles.iter().map(|c| c.low).collect(),
            volumes: candles.iter().map(|c| c.volume).collect(),
            sma50: sma::calculate_sma(&closes, SMA_FAST_PERIOD),
            sma200: sma::calculate_sma(&closes, SMA_SLOW_PERIOD),
            ema10: ema::calculate_ema(&closes, EMA_PERIOD),
            atr14: atr::calculate_atr(candles, ATR_PERIOD),
            adx14: adx::calculate_adx(candles, ADX_PERIOD),
            closes,
        }
    }

    pub fn len(&self) -> usize {
        self.closes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.closes.is_empty()
    }
}

/// Value of `series` at `index`, `None` when out of range or undefined.
pub fn value_at(series: &[Option<f64>], index: usize) -> Option<f64> {
    series.get(index).copied().flatten()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn make_candles(count: usize) -> Vec<Candle> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        (0..count)
            .map(|i| {
                let close = 100.0 + i as f64;
                Candle {
                    time: start + Duration::days(i as i64),
                    open: close - 0.5,
                    high: close + 1.0,
                    low: close - 1.0,
                    close,
                    volume: Some(1000.0),
                }
            })
            .collect()
    }

    #[test]
    fn all_series_aligned_with_candles() {
        let candles = make_candles(230);
        let ind = Indicators::compute(&candles);

        assert_eq!(ind.len(), 230);
        assert_eq!(ind.sma50.len(), 230);
        assert_eq!(ind.sma200.len(), 230);
        assert_eq!(ind.ema10.len(), 230);
        assert_eq!(ind.atr14.len(), 230);
        assert_eq!(ind.adx14.len(), 230);
    }

    #[test]
    fn all_series_defined_at_latest_index() {
        let candles = make_candles(230);
        let ind = Indicators::compute(&candles);
        let last = ind.len() - 1;

        assert!(value_at(&ind.sma50, last).is_some());
        assert!(value_at(&ind.sma200, last).is_some());
        assert!(value_at(&ind.ema10, last).is_some());
        assert!(value_at(&ind.atr14, last).is_some());
        assert!(value_at(&ind.adx14, last).is_some());
    }

    #[test]
    fn value_at_out_of_range_is_none() {
        let series = vec![Some(1.0), None];
        assert_eq!(value_at(&series, 0), Some(1.0));
        assert_eq!(value_at(&series, 1), None);
        assert_eq!(value_at(&series, 5), None);
    }

    #[test]
    fn compute_is_deterministic() {
        let candles = make_candles(250);
        assert_eq!(Indicators::compute(&candles), Indicators::compute(&candles));
    }
}
