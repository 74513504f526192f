//! Running trade statistics for a backtest replay.

use serde::Serialize;

use super::position::Trade;

/// Per-trade equity floor so a single catastrophic trade cannot zero the curve.
const MIN_EQUITY_FACTOR: f64 = 0.01;

/// Accumulates settled trades in order and compounds a unit equity curve at
/// `risk_percent` of equity per 1R.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeLedger {
    risk_percent: f64,
    trades: Vec<Trade>,
    wins: usize,
    losses: usize,
    gross_profit_r: f64,
    gross_loss_r: f64,
    equity_curve: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub trades: usize,
    pub wins: usize,
    pub losses: usize,
    /// Percent of trades with non-negative net R.
    pub win_rate: Option<f64>,
    pub expectancy_r: Option<f64>,
    pub profit_factor: Option<f64>,
    pub max_drawdown_pct: f64,
    pub return_pct: f64,
}

impl TradeLedger {
    pub fn new(risk_percent: f64) -> Self {
        TradeLedger {
            risk_percent,
            trades: Vec::new(),
            wins: 0,
            losses: 0,
            gross_profit_r: 0.0,
            gross_loss_r: 0.0,
            equity_curve: vec![1.0],
        }
    }

    pub fn record(&mut self, trade: Trade) {
        if trade.net_r >= 0.0 {
            self.wins += 1;
            self.gross_profit_r += trade.net_r;
        } else {
            self.losses += 1;
            self.gross_loss_r += trade.net_r.abs();
        }

        let trade_return = trade.net_r * (self.risk_percent / 100.0);
        let equity = self.equity() * (1.0 + trade_return).max(MIN_EQUITY_FACTOR);
        self.equity_curve.push(equity);
        self.trades.push(trade);
    }

    pub fn equity(&self) -> f64 {
        self.equity_curve.last().copied().unwrap_or(1.0)
    }

    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    pub fn into_trades(self) -> Vec<Trade> {
        self.trades
    }

    pub fn summary(&self) -> Summary {
        let count = self.trades.len();
        let (win_rate, expectancy_r) = if count > 0 {
            let total_r: f64 = self.trades.iter().map(|t| t.net_r).sum();
            (
                Some(self.wins as f64 / count as f64 * 100.0),
                Some(total_r / count as f64),
            )
        } else {
            (None, None)
        };

        let profit_factor = if self.gross_loss_r > 0.0 {
            Some(self.gross_profit_r / self.gross_loss_r)
        } else {
            None
        };

        Summary {
            trades: count,
            wins: self.wins,
            losses: self.losses,
            win_rate,
            expectancy_r,
            profit_factor,
            max_drawdown_pct: compute_drawdown(&self.equity_curve) * 100.0,
            return_pct: (self.equity() - 1.0) * 100.0,
        }
    }
}

/// Largest peak-to-trough decline as a fraction of the peak.
fn compute_drawdown(equity_curve: &[f64]) -> f64 {
    let Some(&first) = equity_curve.first() else {
        return 0.0;
    };

    let mut peak = first;
    let mut max_dd = 0.0_f64;
    for &equity in equity_curve {
        if equity > peak {
            peak = equity;
        } else if peak > 0.0 {
            max_dd = max_dd.max((peak - equity) / peak);
        }
    }
    max_dd
}
