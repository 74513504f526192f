//! Look-back window helpers shared by the setup evaluator and the backtest.
//!
//! All windows cover the `lookback` values strictly before `index`.

/// Maximum of the `lookback` values before `index`; `None` if the window
/// would start before the first value.
pub fn max_prev(values: &[f64], index: usize, lookback: usize) -> Option<f64> {
    let window = prior_window(values, index, lookback)?;
    Some(window.iter().copied().fold(f64::NEG_INFINITY, f64::max))
}

/// Minimum of the `lookback` values before `index`.
pub fn min_prev(values: &[f64], index: usize, lookback: usize) -> Option<f64> {
    let window = prior_window(values, index, lookback)?;
    Some(window.iter().copied().fold(f64::INFINITY, f64::min))
}

fn prior_window<T>(values: &[T], index: usize, lookback: usize) -> Option<&[T]> {
    if lookback == 0 || index < lookback || index > values.len() {
        return None;
    }
    Some(&values[index - lookback..index])
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolumeWindow {
    /// Mean of the known, positive volumes in the window.
    pub average: Option<f64>,
    /// Fraction of the window with a known, positive volume.
    pub coverage: f64,
}

pub fn volume_window_stats(volumes: &[Option<f64>], index: usize, lookback: usize) -> VolumeWindow {
    let Some(window) = prior_window(volumes, index, lookback) else {
        return VolumeWindow {
            average: None,
            coverage: 0.0,
        };
    };

    let known: Vec<f64> = window
        .iter()
        .flatten()
        .copied()
        .filter(|v| v.is_finite() && *v > 0.0)
        .collect();

    let average = if known.is_empty() {
        None
    } else {
        Some(known.iter().sum::<f64>() / known.len() as f64)
    };

    VolumeWindow {
        average,
        coverage: known.len() as f64 / lookback as f64,
    }
}
