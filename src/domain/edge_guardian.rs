//! Edge Guardian: statistical trade gate and risk throttle.
//!
//! Historical trades are weighted by how close their signal score is to the
//! current one. From the weighted sample we estimate post-cost expectancy with
//! a 95% interval, the probability that the edge is positive, a smoothed win
//! probability, walk-forward calibration of that probability, and drift of the
//! most recent trades against their baseline. The estimate then throttles the
//! requested risk and decides whether a fresh entry is allowed at all.

use std::fmt;

use tracing::debug;

use crate::domain::position::Trade;
use crate::domain::stats::{average, kernel_weight, normal_cdf, weighted_moments, KERNEL_BANDWIDTH};

pub const MIN_EFFECTIVE_SAMPLES: f64 = 8.0;
pub const MIN_PROBABILITY_POSITIVE: f64 = 0.6;
pub const BRIER_THROTTLE_THRESHOLD: f64 = 0.25;
pub const BRIER_GATE_THRESHOLD: f64 = 0.3;
pub const MIN_DRIFT_TRADES: usize = 12;
pub const MIN_CALIBRATION_TRADES: usize = 12;
/// Trades needed before the first walk-forward forecast is scored.
pub const CALIBRATION_WARMUP: usize = 8;
pub const MIN_RISK_MULTIPLIER: f64 = 0.1;

const Z_95: f64 = 1.96;
const DEGENERATE_SE: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq)]
pub struct EdgeEstimate {
    pub expected_net_r: Option<f64>,
    pub ci95_low_r: Option<f64>,
    pub ci95_high_r: Option<f64>,
    /// Probability in [0, 1] that the true expectancy is positive.
    pub probability_positive: Option<f64>,
    /// Laplace-smoothed weighted win probability in [0, 1].
    pub probability_win: Option<f64>,
    pub sample_size: usize,
    pub effective_sample_size: f64,
    pub std_dev_r: Option<f64>,
}

fn similarity(trade: &Trade, target_score: u32) -> f64 {
    let distance = (f64::from(trade.signal_score) - f64::from(target_score)).abs();
    kernel_weight(distance, KERNEL_BANDWIDTH)
}

fn win_indicator(trade: &Trade) -> f64 {
    if trade.is_win() { 1.0 } else { 0.0 }
}

pub fn compute_edge_estimate(trades: &[Trade], target_score: u32) -> EdgeEstimate {
    let weighted: Vec<(&Trade, f64)> = trades
        .iter()
        .filter(|t| t.net_r.is_finite())
        .map(|t| (t, similarity(t, target_score)))
        .filter(|(_, w)| *w > 0.0)
        .collect();

    let r_samples: Vec<(f64, f64)> = weighted.iter().map(|(t, w)| (t.net_r, *w)).collect();
    let win_samples: Vec<(f64, f64)> = weighted.iter().map(|(t, w)| (win_indicator(t), *w)).collect();
    let moments_r = weighted_moments(&r_samples);
    let moments_win = weighted_moments(&win_samples);

    let n_eff = moments_r.n_eff;
    let se = moments_r
        .std_dev
        .filter(|_| n_eff > 1.0)
        .map(|sd| sd / n_eff.sqrt());

    let (ci95_low_r, ci95_high_r) = match (moments_r.mean, se) {
        (Some(mean), Some(se)) => (Some(mean - Z_95 * se), Some(mean + Z_95 * se)),
        _ => (None, None),
    };

    let probability_positive = match (moments_r.mean, se) {
        (Some(mean), Some(se)) if se <= DEGENERATE_SE => Some(if mean > 0.0 { 1.0 } else { 0.0 }),
        (Some(mean), Some(se)) => normal_cdf(mean / se).map(|p| p.clamp(0.0, 1.0)),
        _ => None,
    };

    let probability_win = moments_win
        .mean
        .map(|mean| ((mean * moments_win.sum_w + 1.0) / (moments_win.sum_w + 2.0)).clamp(0.0, 1.0));

    EdgeEstimate {
        expected_net_r: moments_r.mean,
        ci95_low_r,
        ci95_high_r,
        probability_positive,
        probability_win,
        sample_size: r_samples.len(),
        effective_sample_size: n_eff,
        std_dev_r: moments_r.std_dev,
    }
}

/// Laplace-smoothed kernel-weighted win probability at `target_score`.
pub fn estimate_win_probability(trades: &[Trade], target_score: u32) -> Option<f64> {
    let (wins, total) = trades
        .iter()
        .map(|t| (t, similarity(t, target_score)))
        .filter(|(_, w)| w.is_finite() && *w > 0.0)
        .fold((0.0, 0.0), |(wins, total), (t, w)| {
            (wins + w * win_indicator(t), total + w)
        });

    if total <= 0.0 {
        return None;
    }
    Some(((wins + 1.0) / (total + 2.0)).clamp(0.0, 1.0))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    pub brier: Option<f64>,
    pub samples: usize,
}

/// Mean squared error of forecasting each trade's outcome from the trades
/// strictly before it.
pub fn walk_forward_brier(trades: &[Trade]) -> Calibration {
    if trades.len() < MIN_CALIBRATION_TRADES {
        return Calibration {
            brier: None,
            samples: 0,
        };
    }

    let (total_error, samples) = (CALIBRATION_WARMUP..trades.len())
        .filter_map(|k| {
            let forecast = estimate_win_probability(&trades[..k], trades[k].signal_score)?;
            Some((forecast - win_indicator(&trades[k])).powi(2))
        })
        .fold((0.0, 0usize), |(sum, n), err| (sum + err, n + 1));

    Calibration {
        brier: (samples > 0).then(|| total_error / samples as f64),
        samples,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Drift {
    pub baseline_expectancy_r: Option<f64>,
    pub recent_expectancy_r: Option<f64>,
    pub delta_r: Option<f64>,
    pub degraded: bool,
    pub hard_block: bool,
}

/// Compares the most recent trades against the block of trades before them.
pub fn detect_drift(trades: &[Trade]) -> Drift {
    let n = trades.len();
    if n < MIN_DRIFT_TRADES {
        return Drift {
            baseline_expectancy_r: None,
            recent_expectancy_r: None,
            delta_r: None,
            degraded: false,
            hard_block: false,
        };
    }

    let recent_count = ((n as f64 * 0.33).floor() as usize).clamp(6, 10);
    let baseline_count = (n - recent_count).min(30);
    let split = n - recent_count;

    let r_values = |slice: &[Trade]| slice.iter().map(|t| t.net_r).collect::<Vec<_>>();
    let recent = average(&r_values(&trades[split..]));
    let baseline = average(&r_values(&trades[split - baseline_count..split]));
    let delta = recent.zip(baseline).map(|(r, b)| r - b);

    let (degraded, hard_block) = match (recent, delta) {
        (Some(r), Some(d)) => (r < 0.0 || d < -0.2, r < -0.25 && d < -0.35),
        _ => (false, false),
    };

    Drift {
        baseline_expectancy_r: baseline,
        recent_expectancy_r: recent,
        delta_r: delta,
        degraded,
        hard_block,
    }
}

/// Why the requested risk was scaled down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleReason {
    ThinEvidence,
    IntervalIncludesLoss,
    LowEdgeProbability,
    WeakCalibration,
    DegradedDrift,
}

impl ThrottleReason {
    fn factor(self) -> f64 {
        match self {
            ThrottleReason::ThinEvidence => 0.65,
            ThrottleReason::IntervalIncludesLoss => 0.6,
            ThrottleReason::LowEdgeProbability => 0.7,
            ThrottleReason::WeakCalibration => 0.75,
            ThrottleReason::DegradedDrift => 0.5,
        }
    }
}

impl fmt::Display for ThrottleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ThrottleReason::ThinEvidence => "insufficient similar historical signals",
            ThrottleReason::IntervalIncludesLoss => {
                "expected value confidence interval includes non-positive outcomes"
            }
            ThrottleReason::LowEdgeProbability => "probability of positive edge is below 60%",
            ThrottleReason::WeakCalibration => "walk-forward calibration quality is weak",
            ThrottleReason::DegradedDrift => "recent live edge degraded versus baseline",
        };
        f.write_str(text)
    }
}

/// Gate outcome. Blocking variants are reported in evaluation order:
/// evidence, edge confidence, calibration, drift.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateVerdict {
    Allow,
    InsufficientEvidence,
    UnconfirmedEdge,
    UnreliableCalibration,
    SevereDrift,
}

impl fmt::Display for GateVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            GateVerdict::Allow => "Edge Guardian allows trade.",
            GateVerdict::InsufficientEvidence => {
                "Edge Guardian blocked: insufficient comparable signal history."
            }
            GateVerdict::UnconfirmedEdge => {
                "Edge Guardian blocked: post-cost edge is not positive with high confidence."
            }
            GateVerdict::UnreliableCalibration => {
                "Edge Guardian blocked: walk-forward calibration is unreliable."
            }
            GateVerdict::SevereDrift => "Edge Guardian blocked: severe negative drift detected.",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EdgeGuardian {
    pub verdict: GateVerdict,
    pub estimate: EdgeEstimate,
    pub calibration: Calibration,
    pub drift: Drift,
    pub risk_multiplier: f64,
    pub recommended_risk_percent: f64,
    pub throttle_reasons: Vec<ThrottleReason>,
}

impl EdgeGuardian {
    pub fn build(trades: &[Trade], target_score: u32, requested_risk_percent: f64) -> Self {
        let estimate = compute_edge_estimate(trades, target_score);
        let calibration = walk_forward_brier(trades);
        let drift = detect_drift(trades);

        let n_eff = estimate.effective_sample_size;
        let mut throttle_reasons = Vec::new();
        if !n_eff.is_finite() || n_eff < MIN_EFFECTIVE_SAMPLES {
            throttle_reasons.push(ThrottleReason::ThinEvidence);
        }
        if estimate.ci95_low_r.is_some_and(|low| low <= 0.0) {
            throttle_reasons.push(ThrottleReason::IntervalIncludesLoss);
        }
        if estimate
            .probability_positive
            .is_some_and(|p| p < MIN_PROBABILITY_POSITIVE)
        {
            throttle_reasons.push(ThrottleReason::LowEdgeProbability);
        }
        if calibration.brier.is_some_and(|b| b > BRIER_THROTTLE_THRESHOLD) {
            throttle_reasons.push(ThrottleReason::WeakCalibration);
        }
        if drift.degraded {
            throttle_reasons.push(ThrottleReason::DegradedDrift);
        }

        let risk_multiplier = throttle_reasons
            .iter()
            .map(|reason| reason.factor())
            .product::<f64>()
            .clamp(MIN_RISK_MULTIPLIER, 1.0);

        let verdict = gate_verdict(&estimate, &calibration, &drift);

        debug!(
            n_eff,
            expected_net_r = ?estimate.expected_net_r,
            brier = ?calibration.brier,
            risk_multiplier,
            ?verdict,
            "edge guardian evaluated"
        );

        EdgeGuardian {
            verdict,
            estimate,
            calibration,
            drift,
            risk_multiplier,
            recommended_risk_percent: requested_risk_percent * risk_multiplier,
            throttle_reasons,
        }
    }

    pub fn gate_allow(&self) -> bool {
        self.verdict == GateVerdict::Allow
    }

    pub fn gate_reason(&self) -> String {
        self.verdict.to_string()
    }

    pub fn throttle_reason(&self) -> String {
        if self.throttle_reasons.is_empty() {
            return "No risk throttle applied.".to_string();
        }
        let joined = self
            .throttle_reasons
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        format!("Risk throttled due to {joined}.")
    }
}

fn gate_verdict(estimate: &EdgeEstimate, calibration: &Calibration, drift: &Drift) -> GateVerdict {
    let enough_evidence = estimate.effective_sample_size.is_finite()
        && estimate.effective_sample_size >= MIN_EFFECTIVE_SAMPLES;
    let confident_edge = estimate.expected_net_r.is_some_and(|m| m > 0.0)
        && estimate.ci95_low_r.is_some_and(|low| low > 0.0)
        && estimate
            .probability_positive
            .is_some_and(|p| p >= MIN_PROBABILITY_POSITIVE);
    let calibrated = calibration.brier.is_none_or(|b| b <= BRIER_GATE_THRESHOLD);

    if !enough_evidence {
        GateVerdict::InsufficientEvidence
    } else if !confident_edge {
        GateVerdict::UnconfirmedEdge
    } else if !calibrated {
        GateVerdict::UnreliableCalibration
    } else if drift.hard_block {
        GateVerdict::SevereDrift
    } else {
        GateVerdict::Allow
    }
}
