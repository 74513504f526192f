//! Average Directional Index.
//!
//! For each index i >= n the last n values of +DM, -DM and TR are summed into
//! +DI/-DI and DX = 100 * |+DI - -DI| / (+DI + -DI). ADX at i >= 2n-1 is the
//! mean of the last n DX values and is undefined if any of them is.

use super::Series;
use crate::domain::ohlcv::Candle;

/// Directional movement for one candle against its predecessor.
fn directional_movement(prev: &Candle, current: &Candle) -> (f64, f64) {
    let up_move = current.high - prev.high;
    let down_move = prev.low - current.low;
    let plus = if up_move > down_move && up_move > 0.0 {
        up_move
    } else {
        0.0
    };
    let minus = if down_move > up_move && down_move > 0.0 {
        down_move
    } else {
        0.0
    };
    (plus, minus)
}

fn directional_index(sum_plus: f64, sum_minus: f64, sum_tr: f64) -> Option<f64> {
    if !sum_tr.is_finite() || sum_tr <= 0.0 {
        return None;
    }
    let plus_di = 100.0 * sum_plus / sum_tr;
    let minus_di = 100.0 * sum_minus / sum_tr;
    let denominator = plus_di + minus_di;
    if denominator <= 0.0 {
        return None;
    }
    Some(100.0 * (plus_di - minus_di).abs() / denominator)
}

pub fn calculate_adx(candles: &[Candle], period: usize) -> Series {
    let len = candles.len();
    let mut out = vec![None; len];
    if period == 0 || len < period * 2 + 1 {
        return out;
    }

    let mut plus_dm = vec![0.0; len];
    let mut minus_dm = vec![0.0; len];
    let mut tr = vec![0.0; len];
    for i in 1..len {
        let (plus, minus) = directional_movement(&candles[i - 1], &candles[i]);
        plus_dm[i] = plus;
        minus_dm[i] = minus;
        tr[i] = candles[i].true_range(candles[i - 1].close);
    }

    let mut dx: Series = vec![None; len];
    for i in period..len {
        let window = (i + 1 - period)..=i;
        let sum_tr: f64 = tr[window.clone()].iter().sum();
        let sum_plus: f64 = plus_dm[window.clone()].iter().sum();
        let sum_minus: f64 = minus_dm[window].iter().sum();
        dx[i] = directional_index(sum_plus, sum_minus, sum_tr);
    }

    for i in (period * 2 - 1)..len {
        let window = &dx[(i + 1 - period)..=i];
        let defined: Option<Vec<f64>> = window.iter().copied().collect();
        out[i] = defined.map(|values| values.iter().sum::<f64>() / period as f64);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::{Duration, TimeZone, Utc};

    fn make_candles(count: usize, step: f64) -> Vec<Candle> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        (0..count)
            .map(|i| {
                let close = 100.0 + step * i as f64;
                Candle {
                    time: start + Duration::days(i as i64),
                    open: close,
                    high: close + 1.0,
                    low: close - 1.0,
                    close,
                    volume: Some(1000.0),
                }
            })
            .collect()
    }

    #[test]
    fn adx_warmup() {
        let candles = make_candles(40, 0.5);
        let series = calculate_adx(&candles, 14);

        assert!(series[..27].iter().all(Option::is_none));
        assert!(series[27..].iter().all(Option::is_some));
    }

    #[test]
    fn adx_steady_uptrend_is_100() {
        let candles = make_candles(40, 0.5);
        let series = calculate_adx(&candles, 14);
        // Only +DM is ever non-zero, so every DX is 100.
        assert_relative_eq!(series[39].unwrap(), 100.0);
    }

    #[test]
    fn adx_steady_downtrend_is_100() {
        let candles = make_candles(40, -0.5);
        let series = calculate_adx(&candles, 14);
        assert_relative_eq!(series[39].unwrap(), 100.0);
    }

    #[test]
    fn adx_flat_market_is_undefined() {
        // No directional movement at all: +DI + -DI == 0.
        let candles = make_candles(40, 0.0);
        let series = calculate_adx(&candles, 14);
        assert!(series.iter().all(Option::is_none));
    }

    #[test]
    fn adx_insufficient_candles() {
        let candles = make_candles(28, 0.5);
        let series = calculate_adx(&candles, 14);
        assert!(series.iter().all(Option::is_none));
    }

    #[test]
    fn directional_movement_inside_bar_is_zero() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let prev = Candle {
            time: start,
            open: 100.0,
            high: 110.0,
            low: 90.0,
            close: 100.0,
            volume: None,
        };
        let inside = Candle {
            high: 105.0,
            low: 95.0,
            ..prev.clone()
        };
        assert_eq!(directional_movement(&prev, &inside), (0.0, 0.0));
    }
}
