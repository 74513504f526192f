//! Average True Range.
//!
//! True range starts at index 1 (it needs a previous close). The first value
//! lands at index `period` as the mean of TR[1..=period]; afterwards a moving
//! sum adds the newest TR and drops the one leaving the window.

use super::Series;
use crate::domain::ohlcv::Candle;

/// True range per candle; index 0 has no previous close and stays `None`.
pub fn true_ranges(candles: &[Candle]) -> Series {
    let mut tr = vec![None; candles.len()];
    for i in 1..candles.len() {
        tr[i] = Some(candles[i].true_range(candles[i - 1].close));
    }
    tr
}

pub fn calculate_atr(candles: &[Candle], period: usize) -> Series {
    let mut out = vec![None; candles.len()];
    if period == 0 || candles.len() < period + 1 {
        return out;
    }

    let tr: Vec<f64> = true_ranges(candles)
        .into_iter()
        .map(|v| v.unwrap_or(0.0))
        .collect();

    let mut sum: f64 = tr[1..=period].iter().sum();
    out[period] = Some(sum / period as f64);

    for i in (period + 1)..candles.len() {
        sum += tr[i] - tr[i - period];
        out[i] = Some(sum / period as f64);
    }
    out
}
