//! Trade-readiness conditions at one candle index.
//!
//! A long setup needs five filters to agree: trend regime (close above SMA200
//! with a rising SMA50), a 20-day breakout, volume expansion, ADX trend
//! strength and a sane volatility band. The signal score weights the same
//! filters into a 0-100 quality number used to compare setups.

use serde::Serialize;

use crate::domain::indicator::{value_at, Indicators};
use crate::domain::indicator_helpers::{max_prev, min_prev, volume_window_stats};

pub const BREAKOUT_LOOKBACK: usize = 20;
pub const VOLUME_LOOKBACK: usize = 20;
pub const SWING_LOOKBACK: usize = 5;
pub const MIN_VOLUME_COVERAGE: f64 = 0.6;
pub const VOLUME_EXPANSION_FACTOR: f64 = 1.2;
pub const ADX_THRESHOLD: f64 = 18.0;
pub const ATR_PCT_MIN: f64 = 0.35;
pub const ATR_PCT_MAX: f64 = 12.0;
pub const ATR_STOP_MULTIPLE: f64 = 1.5;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Setup {
    pub close: f64,
    pub volume: Option<f64>,
    pub volume_avg20: Option<f64>,
    pub volume_coverage: f64,
    pub breakout_level_20d: Option<f64>,
    pub breakout: bool,
    pub volume_expansion: bool,
    pub regime_long: bool,
    pub adx14: Option<f64>,
    pub adx_pass: bool,
    pub atr14: Option<f64>,
    pub atr_pct: Option<f64>,
    pub volatility_pass: bool,
    pub sma50: Option<f64>,
    pub sma200: Option<f64>,
    pub ema10: Option<f64>,
    pub swing_low: Option<f64>,
    pub suggested_stop: Option<f64>,
    pub risk_per_unit: Option<f64>,
    pub entry_signal: bool,
    pub signal_score: u32,
}

/// Lowest candidate strictly below `reference`, ignoring undefined ones.
pub fn stop_below(reference: f64, candidates: &[Option<f64>]) -> Option<f64> {
    candidates
        .iter()
        .flatten()
        .copied()
        .filter(|v| v.is_finite() && *v < reference)
        .reduce(f64::min)
}

pub fn evaluate_setup(index: usize, ind: &Indicators) -> Setup {
    let close = ind.closes[index];
    let volume = ind.volumes[index];
    let sma50 = value_at(&ind.sma50, index);
    let sma50_prev = index.checked_sub(1).and_then(|i| value_at(&ind.sma50, i));
    let sma200 = value_at(&ind.sma200, index);
    let ema10 = value_at(&ind.ema10, index);
    let atr14 = value_at(&ind.atr14, index);
    let adx14 = value_at(&ind.adx14, index);

    let breakout_level_20d = max_prev(&ind.highs, index, BREAKOUT_LOOKBACK);
    let breakout = breakout_level_20d.is_some_and(|level| close > level);

    let volume_window = volume_window_stats(&ind.volumes, index, VOLUME_LOOKBACK);
    let volume_expansion = volume_window.coverage >= MIN_VOLUME_COVERAGE
        && matches!(
            (volume_window.average, volume),
            (Some(avg), Some(v)) if v.is_finite() && v > avg * VOLUME_EXPANSION_FACTOR
        );

    let regime_long = matches!(
        (sma50, sma50_prev, sma200),
        (Some(fast), Some(fast_prev), Some(slow)) if close > slow && fast > fast_prev
    );

    let adx_pass = adx14.is_some_and(|adx| adx >= ADX_THRESHOLD);
    let atr_pct = atr14
        .filter(|_| close > 0.0)
        .map(|atr| atr / close * 100.0);
    let volatility_pass = atr_pct.is_some_and(|pct| (ATR_PCT_MIN..=ATR_PCT_MAX).contains(&pct));

    let swing_low = min_prev(&ind.lows, index, SWING_LOOKBACK);
    let atr_stop = atr14.map(|atr| close - ATR_STOP_MULTIPLE * atr);
    let suggested_stop = stop_below(close, &[swing_low, atr_stop]);
    let risk_per_unit = suggested_stop.map(|stop| close - stop);

    let entry_signal = regime_long && breakout && volume_expansion && adx_pass && volatility_pass;

    let mut setup = Setup {
        close,
        volume,
        volume_avg20: volume_window.average,
        volume_coverage: volume_window.coverage,
        breakout_level_20d,
        breakout,
        volume_expansion,
        regime_long,
        adx14,
        adx_pass,
        atr14,
        atr_pct,
        volatility_pass,
        sma50,
        sma200,
        ema10,
        swing_low,
        suggested_stop,
        risk_per_unit,
        entry_signal,
        signal_score: 0,
    };
    setup.signal_score = score_setup(&setup);
    setup
}

/// Weighted 0-100 score of filter agreement.
pub fn score_setup(setup: &Setup) -> u32 {
    let mut score = 0.0;
    if setup.regime_long {
        score += 26.0;
    }
    if setup.breakout {
        score += 22.0;
    }
    if setup.volume_expansion {
        score += 16.0;
    }
    if setup.adx_pass {
        score += 14.0;
    }
    if setup.volatility_pass {
        score += 10.0;
    }
    if setup.sma50.is_some_and(|sma| setup.close > sma) {
        score += 7.0;
    }
    if setup.atr_pct.is_some_and(|pct| (1.2..=8.0).contains(&pct)) {
        score += 5.0;
    }
    f64::round(score).clamp(0.0, 100.0) as u32
}

/// Trailing stop at `index`: the highest of the floor, EMA10 and the 5-day
/// prior low, skipping whichever are undefined.
pub fn trailing_stop(index: usize, ind: &Indicators, floor: Option<f64>) -> Option<f64> {
    [
        floor,
        value_at(&ind.ema10, index),
        min_prev(&ind.lows, index, SWING_LOOKBACK),
    ]
    .into_iter()
    .flatten()
    .filter(|v| v.is_finite())
    .reduce(f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ohlcv::Candle;
    use chrono::{Duration, TimeZone, Utc};

    fn build_candles<F>(days: usize, generator: F) -> Vec<Candle>
    where
        F: Fn(usize, usize) -> (f64, f64, f64, f64, Option<f64>),
    {
        let start = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        (0..days)
            .map(|i| {
                let (open, high, low, close, volume) = generator(i, days);
                Candle {
                    time: start + Duration::days(i as i64),
                    open,
                    high,
                    low,
                    close,
                    volume,
                }
            })
            .collect()
    }

    fn rising_with_final_breakout(volume_spike: bool) -> Vec<Candle> {
        build_candles(260, |i, days| {
            let mut close = 100.0 + i as f64 * 0.35;
            if i == days - 1 {
                close += 8.0;
            }
            let volume = if i == days - 1 && volume_spike {
                200_000.0
            } else {
                2000.0 + i as f64 * 4.0
            };
            (close - 0.6, close + 0.9, close - 1.5, close, Some(volume))
        })
    }

    #[test]
    fn breakout_with_volume_produces_entry_signal() {
        let candles = rising_with_final_breakout(true);
        let ind = Indicators::compute(&candles);
        let setup = evaluate_setup(candles.len() - 1, &ind);

        assert!(setup.regime_long);
        assert!(setup.breakout);
        assert!(setup.volume_expansion);
        assert!(setup.adx_pass);
        assert!(setup.volatility_pass);
        assert!(setup.entry_signal);
        assert!(setup.signal_score >= 88);
    }

    #[test]
    fn breakout_without_volume_is_not_an_entry() {
        let candles = rising_with_final_breakout(false);
        let ind = Indicators::compute(&candles);
        let setup = evaluate_setup(candles.len() - 1, &ind);

        assert!(setup.breakout);
        assert!(!setup.volume_expansion);
        assert!(!setup.entry_signal);
    }

    #[test]
    fn declining_series_fails_regime() {
        let candles = build_candles(260, |i, _| {
            let close = 300.0 - i as f64 * 0.4;
            (close + 0.4, close + 1.0, close - 1.0, close, Some(1000.0 + i as f64))
        });
        let ind = Indicators::compute(&candles);
        let setup = evaluate_setup(candles.len() - 1, &ind);

        assert!(!setup.regime_long);
        assert!(!setup.breakout);
        assert!(!setup.entry_signal);
    }

    #[test]
    fn thin_volume_coverage_blocks_expansion() {
        let candles = build_candles(260, |i, days| {
            let mut close = 100.0 + i as f64 * 0.35;
            if i == days - 1 {
                close += 8.0;
            }
            // Only every third day reports volume: coverage below 60%.
            let volume = if i == days - 1 {
                Some(200_000.0)
            } else if i % 3 == 0 {
                Some(2000.0)
            } else {
                None
            };
            (close - 0.6, close + 0.9, close - 1.5, close, volume)
        });
        let ind = Indicators::compute(&candles);
        let setup = evaluate_setup(candles.len() - 1, &ind);

        assert!(setup.volume_coverage < MIN_VOLUME_COVERAGE);
        assert!(!setup.volume_expansion);
    }

    #[test]
    fn suggested_stop_is_below_close() {
        let candles = rising_with_final_breakout(true);
        let ind = Indicators::compute(&candles);
        let setup = evaluate_setup(candles.len() - 1, &ind);

        let stop = setup.suggested_stop.unwrap();
        assert!(stop < setup.close);
        assert!(setup.risk_per_unit.unwrap() > 0.0);
    }

    #[test]
    fn early_index_leaves_windows_undefined() {
        let candles = rising_with_final_breakout(true);
        let ind = Indicators::compute(&candles);
        let setup = evaluate_setup(3, &ind);

        assert_eq!(setup.breakout_level_20d, None);
        assert!(!setup.breakout);
        assert_eq!(setup.volume_coverage, 0.0);
        assert_eq!(setup.sma200, None);
        assert!(!setup.regime_long);
        assert_eq!(setup.swing_low, None);
    }

    #[test]
    fn stop_below_picks_lowest_valid_candidate() {
        assert_eq!(stop_below(100.0, &[Some(95.0), Some(90.0)]), Some(90.0));
        assert_eq!(stop_below(100.0, &[Some(105.0), Some(90.0)]), Some(90.0));
        assert_eq!(stop_below(100.0, &[Some(105.0), None]), None);
        assert_eq!(stop_below(100.0, &[None, None]), None);
    }

    #[test]
    fn score_weights_sum_to_100() {
        let candles = rising_with_final_breakout(true);
        let ind = Indicators::compute(&candles);
        let mut setup = evaluate_setup(candles.len() - 1, &ind);
        setup.regime_long = true;
        setup.breakout = true;
        setup.volume_expansion = true;
        setup.adx_pass = true;
        setup.volatility_pass = true;
        setup.sma50 = Some(setup.close - 1.0);
        setup.atr_pct = Some(2.0);
        assert_eq!(score_setup(&setup), 100);

        setup.regime_long = false;
        setup.breakout = false;
        setup.volume_expansion = false;
        setup.adx_pass = false;
        setup.volatility_pass = false;
        setup.sma50 = None;
        setup.atr_pct = None;
        assert_eq!(score_setup(&setup), 0);
    }

    #[test]
    fn trailing_stop_takes_highest_defined_candidate() {
        let candles = rising_with_final_breakout(false);
        let ind = Indicators::compute(&candles);
        let last = candles.len() - 1;

        let without_floor = trailing_stop(last, &ind, None).unwrap();
        let with_high_floor = trailing_stop(last, &ind, Some(10_000.0)).unwrap();
        let with_low_floor = trailing_stop(last, &ind, Some(1.0)).unwrap();

        assert_eq!(with_high_floor, 10_000.0);
        assert_eq!(with_low_floor, without_floor);
    }

    #[test]
    fn trailing_stop_undefined_without_any_candidate() {
        let candles = rising_with_final_breakout(false);
        let ind = Indicators::compute(&candles);
        assert_eq!(trailing_stop(0, &ind, None), None);
    }
}
