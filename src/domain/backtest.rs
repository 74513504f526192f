//! Single-position trailing-stop backtest.
//!
//! The replay is a two-state machine, `Flat` and `InPosition`. On every bar an
//! open position is first checked against its trailing stop; afterwards, if
//! flat and a next bar exists, the setup at that bar may open a new position
//! filled at the next bar's open. Positions still open at the final bar are
//! left open.

use serde::Serialize;
use tracing::debug;

use crate::domain::indicator::Indicators;
use crate::domain::metrics::{Summary, TradeLedger};
use crate::domain::ohlcv::Candle;
use crate::domain::position::{resolve_exit, ExitKind, Position, Trade};
use crate::domain::setup::{evaluate_setup, trailing_stop};

/// First replayed index; every indicator is defined from here on.
pub const WARMUP_INDEX: usize = 210;
pub const DEFAULT_FEE_BPS: f64 = 10.0;
pub const DEFAULT_SLIPPAGE_BPS: f64 = 5.0;

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestConfig {
    pub start_index: usize,
    pub fee_bps: f64,
    pub slippage_bps: f64,
    /// Percent of equity risked per 1R, used for the compounding equity curve.
    pub risk_percent: f64,
}

impl BacktestConfig {
    pub fn new(risk_percent: f64) -> Self {
        BacktestConfig {
            start_index: WARMUP_INDEX,
            fee_bps: DEFAULT_FEE_BPS,
            slippage_bps: DEFAULT_SLIPPAGE_BPS,
            risk_percent,
        }
    }

    /// Cost fraction charged on each side of a round trip.
    pub fn cost_per_side(&self) -> f64 {
        (self.fee_bps + self.slippage_bps) / 10_000.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BacktestState {
    Flat,
    InPosition(Position),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransitionAction {
    Buy,
    Sell,
}

/// A state change caused by the final bar of the replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Transition {
    pub action: TransitionAction,
    pub index: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestResult {
    pub summary: Summary,
    pub trades: Vec<Trade>,
    pub open_position: Option<Position>,
    pub latest_transition: Option<Transition>,
    pub window_days: usize,
}

impl BacktestResult {
    pub fn open_trade(&self) -> bool {
        self.open_position.is_some()
    }

    /// Open positions are never liquidated at the end of the window.
    pub fn forced_close_at_end(&self) -> bool {
        false
    }
}

/// `InPosition → Flat` transition: settle the position if bar `index`
/// breaches its trailing stop.
pub fn exit_step(
    position: &Position,
    index: usize,
    candles: &[Candle],
    ind: &Indicators,
    cost_per_side: f64,
) -> Option<(Trade, ExitKind)> {
    let trail = trailing_stop(index, ind, Some(position.stop))?;
    let (fill, kind) = resolve_exit(&candles[index], trail)?;
    Some((position.settle(fill, index, cost_per_side), kind))
}

/// `Flat → InPosition` transition: open a position if the setup at `index`
/// signals an entry and a valid next-bar fill exists.
pub fn entry_step(index: usize, candles: &[Candle], ind: &Indicators) -> Option<Position> {
    if index + 1 >= candles.len() {
        return None;
    }
    let setup = evaluate_setup(index, ind);
    if !setup.entry_signal || !setup.risk_per_unit.is_some_and(|r| r > 0.0) {
        return None;
    }
    Position::open(index, candles, ind, setup.signal_score)
}

pub fn run_backtest(candles: &[Candle], ind: &Indicators, config: &BacktestConfig) -> BacktestResult {
    let cost_per_side = config.cost_per_side();
    let mut ledger = TradeLedger::new(config.risk_percent);
    let mut state = BacktestState::Flat;
    let mut latest_transition = None;
    let latest_index = candles.len().saturating_sub(1);

    for i in config.start_index..candles.len() {
        let exit = match &state {
            BacktestState::InPosition(position) => {
                exit_step(position, i, candles, ind, cost_per_side)
            }
            BacktestState::Flat => None,
        };
        if let Some((trade, kind)) = exit {
            debug!(
                index = i,
                exit = trade.exit,
                net_r = trade.net_r,
                ?kind,
                "position closed"
            );
            ledger.record(trade);
            state = BacktestState::Flat;
            if i == latest_index {
                latest_transition = Some(Transition {
                    action: TransitionAction::Sell,
                    index: i,
                });
            }
        }

        if state == BacktestState::Flat {
            if let Some(position) = entry_step(i, candles, ind) {
                debug!(
                    index = position.entry_index,
                    entry = position.entry,
                    stop = position.stop,
                    score = position.signal_score,
                    "position opened"
                );
                if position.entry_index == latest_index {
                    latest_transition = Some(Transition {
                        action: TransitionAction::Buy,
                        index: latest_index,
                    });
                }
                state = BacktestState::InPosition(position);
            }
        }
    }

    let open_position = match state {
        BacktestState::InPosition(position) => Some(position),
        BacktestState::Flat => None,
    };

    BacktestResult {
        summary: ledger.summary(),
        trades: ledger.into_trades(),
        open_position,
        latest_transition,
        window_days: candles.len(),
    }
}
