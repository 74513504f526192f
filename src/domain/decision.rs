//! Decision and risk-plan composer.
//!
//! Runs the full per-asset pipeline (indicators, setup at the latest candle,
//! backtest replay, Edge Guardian) and turns the results into one action with
//! a sized risk plan, a confidence grade, and human-readable reasons.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::domain::backtest::{run_backtest, BacktestConfig, BacktestResult, TransitionAction};
use crate::domain::edge_guardian::EdgeGuardian;
use crate::domain::error::SignalDeskError;
use crate::domain::indicator::Indicators;
use crate::domain::metrics::Summary;
use crate::domain::ohlcv::Candle;
use crate::domain::setup::{evaluate_setup, trailing_stop, Setup};

pub const MIN_CANDLES: usize = 220;
pub const MAX_RISK_PERCENT: f64 = 5.0;
pub const BUY_CONFIDENCE_THRESHOLD: u32 = 65;
pub const STALE_WARNING_HOURS: f64 = 36.0;
pub const STALE_BLOCK_HOURS: f64 = 72.0;
pub const MIN_BACKTEST_TRADES: usize = 8;
pub const TARGET_R_MULTIPLE: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Buy,
    Sell,
    Hold,
    Abstain,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Action::Buy => "BUY",
            Action::Sell => "SELL",
            Action::Hold => "HOLD",
            Action::Abstain => "ABSTAIN",
        };
        f.pad(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Grade {
    A,
    B,
    C,
    D,
}

impl Grade {
    pub fn from_score(score: u32) -> Grade {
        match score {
            80.. => Grade::A,
            65..=79 => Grade::B,
            50..=64 => Grade::C,
            _ => Grade::D,
        }
    }
}

/// An existing long position in the analysed asset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Holding {
    pub entry_price: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisRequest {
    pub symbol: String,
    pub candles: Vec<Candle>,
    pub equity: f64,
    pub risk_percent: f64,
    pub holding: Option<Holding>,
    pub quote_currency: String,
    /// Whether the account currency matches the price quote currency.
    pub risk_currency_aligned: bool,
    /// Instant staleness is measured against.
    pub as_of: DateTime<Utc>,
    pub fee_bps: f64,
    pub slippage_bps: f64,
}

impl AnalysisRequest {
    pub fn new(
        symbol: impl Into<String>,
        candles: Vec<Candle>,
        equity: f64,
        risk_percent: f64,
        quote_currency: impl Into<String>,
        as_of: DateTime<Utc>,
    ) -> Self {
        let defaults = BacktestConfig::new(risk_percent);
        AnalysisRequest {
            symbol: symbol.into(),
            candles,
            equity,
            risk_percent,
            holding: None,
            quote_currency: quote_currency.into(),
            risk_currency_aligned: true,
            as_of,
            fee_bps: defaults.fee_bps,
            slippage_bps: defaults.slippage_bps,
        }
    }

    pub fn with_holding(mut self, entry_price: f64) -> Self {
        self.holding = Some(Holding { entry_price });
        self
    }

    pub fn with_currency_alignment(mut self, aligned: bool) -> Self {
        self.risk_currency_aligned = aligned;
        self
    }

    pub fn with_costs(mut self, fee_bps: f64, slippage_bps: f64) -> Self {
        self.fee_bps = fee_bps;
        self.slippage_bps = slippage_bps;
        self
    }

    pub fn validate(&self) -> Result<(), SignalDeskError> {
        if !self.equity.is_finite() || self.equity <= 0.0 {
            return Err(invalid("equity", "must be greater than 0"));
        }
        if !self.risk_percent.is_finite()
            || self.risk_percent <= 0.0
            || self.risk_percent > MAX_RISK_PERCENT
        {
            return Err(invalid("risk_percent", "must be in (0, 5]"));
        }
        if let Some(holding) = self.holding {
            if !holding.entry_price.is_finite() || holding.entry_price <= 0.0 {
                return Err(invalid("entry_price", "must be greater than 0 when holding"));
            }
        }
        for (field, bps) in [("fee_bps", self.fee_bps), ("slippage_bps", self.slippage_bps)] {
            if !bps.is_finite() || bps < 0.0 {
                return Err(invalid(field, "must be non-negative"));
            }
        }
        if self.candles.len() < MIN_CANDLES {
            return Err(SignalDeskError::InsufficientData {
                symbol: self.symbol.clone(),
                candles: self.candles.len(),
                minimum: MIN_CANDLES,
            });
        }
        Ok(())
    }

    fn backtest_config(&self) -> BacktestConfig {
        BacktestConfig {
            fee_bps: self.fee_bps,
            slippage_bps: self.slippage_bps,
            ..BacktestConfig::new(self.risk_percent)
        }
    }
}

fn invalid(field: &str, reason: &str) -> SignalDeskError {
    SignalDeskError::InvalidInput {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketSnapshot {
    pub close: f64,
    pub high: f64,
    pub low: f64,
    pub volume: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskPlan {
    pub equity: f64,
    /// Risk percent after the Edge Guardian throttle.
    pub risk_percent: f64,
    pub requested_risk_percent: f64,
    pub risk_amount: f64,
    pub requested_risk_amount: f64,
    pub entry: f64,
    pub stop: Option<f64>,
    pub trailing_stop: Option<f64>,
    pub tp1: Option<f64>,
    pub position_size_requested: Option<f64>,
    pub position_size: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Quality {
    pub confidence_score: u32,
    pub grade: Grade,
    pub stale_hours: f64,
    pub volume_coverage_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BacktestReport {
    pub window_days: usize,
    #[serde(flatten)]
    pub summary: Summary,
    pub open_trade: bool,
    pub forced_close_at_end: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemState {
    pub position_open: bool,
    pub latest_transition_action: Option<TransitionAction>,
    pub latest_transition_timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeGuardianReport {
    pub gate_allow: bool,
    pub gate_reason: String,
    pub expected_net_r: Option<f64>,
    pub ci95_low_r: Option<f64>,
    pub ci95_high_r: Option<f64>,
    pub probability_win_pct: Option<f64>,
    pub probability_positive_pct: Option<f64>,
    pub sample_size: usize,
    pub effective_sample_size: f64,
    pub walk_forward_brier: Option<f64>,
    pub walk_forward_samples: usize,
    pub drift_baseline_expectancy_r: Option<f64>,
    pub drift_recent_expectancy_r: Option<f64>,
    pub drift_delta_r: Option<f64>,
    pub drift_degraded: bool,
    pub risk_multiplier: f64,
    pub recommended_risk_percent: f64,
    pub throttle_reason: String,
}

impl From<&EdgeGuardian> for EdgeGuardianReport {
    fn from(guardian: &EdgeGuardian) -> Self {
        let estimate = &guardian.estimate;
        EdgeGuardianReport {
            gate_allow: guardian.gate_allow(),
            gate_reason: guardian.gate_reason(),
            expected_net_r: estimate.expected_net_r,
            ci95_low_r: estimate.ci95_low_r,
            ci95_high_r: estimate.ci95_high_r,
            probability_win_pct: estimate.probability_win.map(|p| p * 100.0),
            probability_positive_pct: estimate.probability_positive.map(|p| p * 100.0),
            sample_size: estimate.sample_size,
            effective_sample_size: estimate.effective_sample_size,
            walk_forward_brier: guardian.calibration.brier,
            walk_forward_samples: guardian.calibration.samples,
            drift_baseline_expectancy_r: guardian.drift.baseline_expectancy_r,
            drift_recent_expectancy_r: guardian.drift.recent_expectancy_r,
            drift_delta_r: guardian.drift.delta_r,
            drift_degraded: guardian.drift.degraded,
            risk_multiplier: guardian.risk_multiplier,
            recommended_risk_percent: guardian.recommended_risk_percent,
            throttle_reason: guardian.throttle_reason(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HoldingReport {
    pub enabled: bool,
    pub entry_price: Option<f64>,
    /// Unrealised P&L in R against the suggested stop.
    pub pnl_r: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub symbol: String,
    pub action: Action,
    pub timestamp: DateTime<Utc>,
    pub quote_currency: String,
    pub market: MarketSnapshot,
    pub setup: Setup,
    pub risk_plan: RiskPlan,
    pub quality: Quality,
    pub backtest: BacktestReport,
    pub system: SystemState,
    pub edge_guardian: EdgeGuardianReport,
    pub holding: HoldingReport,
    pub warnings: Vec<String>,
    pub reasons: Vec<String>,
}

/// Analyse one asset. Pure: the same request always yields the same result.
pub fn analyze(request: &AnalysisRequest) -> Result<AnalysisResult, SignalDeskError> {
    request.validate()?;

    let candles = &request.candles;
    let latest_index = candles.len() - 1;
    let latest = &candles[latest_index];

    let ind = Indicators::compute(candles);
    let setup = evaluate_setup(latest_index, &ind);
    let backtest = run_backtest(candles, &ind, &request.backtest_config());
    let guardian = EdgeGuardian::build(&backtest.trades, setup.signal_score, request.risk_percent);

    let stale_hours = (request.as_of - latest.time).num_milliseconds() as f64 / 3_600_000.0;
    let risk_plan = build_risk_plan(request, &setup, &guardian, &ind, latest_index);
    let confidence_score = confidence_score(&setup, &backtest.summary, &guardian, stale_hours);

    let mut reasons = filter_reasons(&setup, &backtest.summary);
    let (action, action_reason) = match request.holding {
        Some(_) => holding_action(setup.close, risk_plan.trailing_stop),
        None => entry_action(
            &setup,
            request.risk_currency_aligned,
            stale_hours,
            &guardian,
            risk_plan.position_size,
            confidence_score,
        ),
    };
    reasons.push(action_reason.to_string());

    let warnings = build_warnings(
        stale_hours,
        setup.volume_coverage,
        &backtest.summary,
        confidence_score,
        &guardian,
    );

    debug!(
        symbol = %request.symbol,
        %action,
        confidence_score,
        trades = backtest.summary.trades,
        "analysis complete"
    );

    Ok(AnalysisResult {
        symbol: request.symbol.clone(),
        action,
        timestamp: latest.time,
        quote_currency: request.quote_currency.clone(),
        market: MarketSnapshot {
            close: latest.close,
            high: latest.high,
            low: latest.low,
            volume: latest.volume,
        },
        holding: holding_report(request.holding, &setup),
        quality: Quality {
            confidence_score,
            grade: Grade::from_score(confidence_score),
            stale_hours,
            volume_coverage_pct: setup.volume_coverage * 100.0,
        },
        system: system_state(&backtest, candles),
        backtest: BacktestReport {
            window_days: backtest.window_days,
            summary: backtest.summary.clone(),
            open_trade: backtest.open_trade(),
            forced_close_at_end: backtest.forced_close_at_end(),
        },
        edge_guardian: EdgeGuardianReport::from(&guardian),
        setup,
        risk_plan,
        warnings,
        reasons,
    })
}

fn build_risk_plan(
    request: &AnalysisRequest,
    setup: &Setup,
    guardian: &EdgeGuardian,
    ind: &Indicators,
    latest_index: usize,
) -> RiskPlan {
    let requested_risk_amount = request.equity * request.risk_percent / 100.0;
    let adjusted_risk_percent = guardian.recommended_risk_percent;
    let risk_amount = request.equity * adjusted_risk_percent / 100.0;

    let sizing_unit = setup
        .risk_per_unit
        .filter(|r| request.risk_currency_aligned && *r > 0.0);

    RiskPlan {
        equity: request.equity,
        risk_percent: adjusted_risk_percent,
        requested_risk_percent: request.risk_percent,
        risk_amount,
        requested_risk_amount,
        entry: setup.close,
        stop: setup.suggested_stop,
        trailing_stop: trailing_stop(latest_index, ind, setup.suggested_stop),
        tp1: setup
            .risk_per_unit
            .map(|r| setup.close + TARGET_R_MULTIPLE * r),
        position_size_requested: sizing_unit.map(|r| requested_risk_amount / r),
        position_size: sizing_unit.map(|r| risk_amount / r),
    }
}

/// 0-100 confidence combining setup filters, backtest quality and data health.
pub fn confidence_score(
    setup: &Setup,
    summary: &Summary,
    guardian: &EdgeGuardian,
    stale_hours: f64,
) -> u32 {
    let mut score: i32 = 0;
    if setup.regime_long {
        score += 25;
    }
    if setup.breakout {
        score += 20;
    }
    if setup.volume_expansion {
        score += 15;
    }
    if setup.adx_pass {
        score += 15;
    }
    if setup.volatility_pass {
        score += 10;
    }
    if summary.expectancy_r.is_some_and(|e| e > 0.0) {
        score += 10;
    }
    if summary.profit_factor.is_some_and(|pf| pf >= 1.15) {
        score += 5;
    }
    if guardian
        .estimate
        .probability_positive
        .is_some_and(|p| p * 100.0 >= 60.0)
    {
        score += 5;
    }
    if setup.volume_coverage < 0.75 {
        score -= 10;
    }
    if stale_hours > STALE_WARNING_HOURS {
        score -= 20;
    }
    if summary.trades < MIN_BACKTEST_TRADES {
        score -= 5;
    }
    score.clamp(0, 100) as u32
}

fn filter_reasons(setup: &Setup, summary: &Summary) -> Vec<String> {
    let pick = |pass: bool, yes: &str, no: &str| (if pass { yes } else { no }).to_string();
    let mut reasons = vec![
        pick(setup.regime_long, "Trend filter passed.", "Trend filter failed."),
        pick(setup.breakout, "20-day breakout detected.", "No 20-day breakout."),
        pick(
            setup.volume_expansion,
            "Volume expansion confirmed.",
            "Volume expansion not confirmed.",
        ),
        pick(setup.adx_pass, "ADX confirms trend strength.", "ADX trend strength is weak."),
        pick(setup.volatility_pass, "Volatility filter passed.", "Volatility filter failed."),
    ];
    if let Some(expectancy) = summary.expectancy_r {
        reasons.push(pick(
            expectancy > 0.0,
            "Backtest expectancy is positive.",
            "Backtest expectancy is non-positive.",
        ));
    }
    reasons
}

fn holding_action(close: f64, trailing: Option<f64>) -> (Action, String) {
    if trailing.is_some_and(|stop| close < stop) {
        (Action::Sell, "Exit triggered: close fell below trailing stop.".into())
    } else {
        (Action::Hold, "Hold: trailing stop intact.".into())
    }
}

/// Entry gates in priority order; the first failure decides the action.
fn entry_action(
    setup: &Setup,
    risk_currency_aligned: bool,
    stale_hours: f64,
    guardian: &EdgeGuardian,
    position_size: Option<f64>,
    confidence_score: u32,
) -> (Action, String) {
    if !setup.entry_signal {
        return (Action::Hold, "Entry setup is not active.".into());
    }
    let blocked = if !risk_currency_aligned {
        Some("Entry blocked: account currency does not match price quote currency.".to_string())
    } else if stale_hours > STALE_BLOCK_HOURS {
        Some("Entry blocked: data is too stale for execution.".to_string())
    } else if !guardian.gate_allow() {
        Some(guardian.gate_reason())
    } else if !position_size.is_some_and(|size| size.is_finite() && size > 0.0) {
        Some("Entry blocked: invalid position sizing after risk throttle.".to_string())
    } else if confidence_score < BUY_CONFIDENCE_THRESHOLD {
        Some("Entry blocked: confidence score is below threshold.".to_string())
    } else {
        None
    };

    match blocked {
        Some(reason) => (Action::Abstain, reason),
        None => (
            Action::Buy,
            "Entry criteria and Edge Guardian gate both passed.".into(),
        ),
    }
}

pub fn build_warnings(
    stale_hours: f64,
    volume_coverage: f64,
    summary: &Summary,
    confidence_score: u32,
    guardian: &EdgeGuardian,
) -> Vec<String> {
    let mut warnings = Vec::new();
    if stale_hours > STALE_WARNING_HOURS {
        warnings.push("Market data is stale; avoid acting on delayed candles.".to_string());
    }
    if volume_coverage < 0.8 {
        warnings.push("Volume coverage is incomplete; breakout confirmation is weaker.".to_string());
    }
    if summary.trades < MIN_BACKTEST_TRADES {
        warnings.push("Backtest sample is small; expectancy may be noisy.".to_string());
    }
    if summary.expectancy_r.is_some_and(|e| e <= 0.0) {
        warnings.push("Backtest expectancy is non-positive on this market history.".to_string());
    }
    if confidence_score < BUY_CONFIDENCE_THRESHOLD {
        warnings.push("Confidence score is below buy threshold.".to_string());
    }
    if !guardian.gate_allow() {
        warnings.push(guardian.gate_reason());
    }
    if guardian.risk_multiplier < 1.0 {
        warnings.push(guardian.throttle_reason());
    }
    if guardian.drift.degraded {
        warnings.push("Recent edge drift is negative; risk throttle is active.".to_string());
    }
    warnings
}

fn holding_report(holding: Option<Holding>, setup: &Setup) -> HoldingReport {
    let entry_price = holding.map(|h| h.entry_price);
    let pnl_r = entry_price.zip(setup.suggested_stop).and_then(|(entry, stop)| {
        (entry > stop).then(|| (setup.close - entry) / (entry - stop))
    });
    HoldingReport {
        enabled: holding.is_some(),
        entry_price,
        pnl_r,
    }
}

fn system_state(backtest: &BacktestResult, candles: &[Candle]) -> SystemState {
    SystemState {
        position_open: backtest.open_trade(),
        latest_transition_action: backtest.latest_transition.map(|t| t.action),
        latest_transition_timestamp: backtest
            .latest_transition
            .and_then(|t| candles.get(t.index))
            .map(|c| c.time),
    }
}
