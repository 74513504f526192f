//! Simulated long position and settled trades.

use serde::Serialize;

use crate::domain::indicator::{value_at, Indicators};
use crate::domain::indicator_helpers::min_prev;
use crate::domain::ohlcv::Candle;
use crate::domain::setup::{stop_below, ATR_STOP_MULTIPLE, SWING_LOOKBACK};

/// Maximum per-unit risk as a fraction of the entry price.
pub const MAX_RISK_FRACTION: f64 = 0.25;

/// An open long position. Only constructed through [`Position::open`], which
/// guarantees `0 < risk <= MAX_RISK_FRACTION * entry`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub entry: f64,
    pub stop: f64,
    pub risk: f64,
    pub signal_score: u32,
    pub entry_index: usize,
}

impl Position {
    /// Open at the next bar's open after a signal on `signal_index`.
    ///
    /// The stop is the lower of the 5-day prior swing low and
    /// `entry - 1.5 * ATR14`, both taken at the signal bar and restricted to
    /// values below the fill. Returns `None` when there is no next bar, no
    /// valid stop, or the implied risk is non-positive or excessive.
    pub fn open(
        signal_index: usize,
        candles: &[Candle],
        ind: &Indicators,
        signal_score: u32,
    ) -> Option<Position> {
        let entry = candles.get(signal_index + 1)?.open;
        if !entry.is_finite() || entry <= 0.0 {
            return None;
        }

        let swing_low = min_prev(&ind.lows, signal_index, SWING_LOOKBACK);
        let atr_stop = value_at(&ind.atr14, signal_index).map(|atr| entry - ATR_STOP_MULTIPLE * atr);
        let stop = stop_below(entry, &[swing_low, atr_stop])?;

        let risk = entry - stop;
        if !risk.is_finite() || risk <= 0.0 || risk / entry > MAX_RISK_FRACTION {
            return None;
        }

        Some(Position {
            entry,
            stop,
            risk,
            signal_score,
            entry_index: signal_index + 1,
        })
    }

    pub fn settle(&self, exit: f64, exit_index: usize, cost_per_side: f64) -> Trade {
        let gross_r = (exit - self.entry) / self.risk;
        let cost_r = (self.entry * cost_per_side + exit.abs() * cost_per_side) / self.risk;
        Trade {
            net_r: gross_r - cost_r,
            signal_score: self.signal_score,
            entry_index: self.entry_index,
            exit_index,
            entry: self.entry,
            exit,
            risk: self.risk,
        }
    }
}

/// Why a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ExitKind {
    /// Intrabar low touched the trailing stop.
    StopHit,
    /// Gapped open below the trailing stop; filled at the open.
    GapThroughStop,
    /// Close finished below the trailing stop without an intrabar touch.
    CloseBelowStop,
}

/// Exit decision for a bar given its trailing stop.
pub fn resolve_exit(candle: &Candle, trail: f64) -> Option<(f64, ExitKind)> {
    if candle.low <= trail {
        if candle.open.is_finite() && candle.open <= trail {
            Some((candle.open, ExitKind::GapThroughStop))
        } else {
            Some((trail, ExitKind::StopHit))
        }
    } else if candle.close < trail {
        Some((candle.close, ExitKind::CloseBelowStop))
    } else {
        None
    }
}

/// Settled outcome of one closed position, in R multiples of its initial risk.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Trade {
    pub net_r: f64,
    pub signal_score: u32,
    pub entry_index: usize,
    pub exit_index: usize,
    pub entry: f64,
    pub exit: f64,
    pub risk: f64,
}

impl Trade {
    pub fn is_win(&self) -> bool {
        self.net_r > 0.0
    }
}
