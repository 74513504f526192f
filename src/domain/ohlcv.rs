//! Daily candle representation.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// One day of open/high/low/close/volume for an asset.
///
/// `volume` is `None` when the data source did not report it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candle {
    pub time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: Option<f64>,
}

impl Candle {
    /// max(high - low, |high - prev_close|, |low - prev_close|)
    pub fn true_range(&self, prev_close: f64) -> f64 {
        let hl = self.high - self.low;
        let hc = (self.high - prev_close).abs();
        let lc = (self.low - prev_close).abs();
        hl.max(hc).max(lc)
    }

    /// Volume if it is known and strictly positive.
    pub fn positive_volume(&self) -> Option<f64> {
        self.volume.filter(|v| v.is_finite() && *v > 0.0)
    }
}
