//! Structured performance report emitted by [`super::calculator::PerformanceAnalyzer`]
//! (§4.9), serialisable into the persisted run artefact (§6).

use crate::domain::regime::Regime;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DrawdownInfo {
    /// Negative fraction, e.g. `-0.23` for a 23% drawdown.
    pub magnitude: Decimal,
    pub onset_day: NaiveDate,
    pub trough_day: NaiveDate,
    pub recovery_day: Option<NaiveDate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RegimeBreakdown {
    pub bull: usize,
    pub bear: usize,
}

impl RegimeBreakdown {
    pub fn record(&mut self, regime: Regime) {
        match regime {
            Regime::Bull | Regime::Warning => self.bull += 1,
            Regime::Bear => self.bear += 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceReport {
    pub cagr: Option<Decimal>,
    pub mdd: DrawdownInfo,
    pub annual_vol: Option<Decimal>,
    pub sharpe: Option<Decimal>,
    /// `None` is reported as "no downside observed" (read as `+inf`, §4.9).
    pub sortino: Option<Decimal>,
    pub calmar: Option<Decimal>,
    pub win_rate_daily: Decimal,
    pub win_rate_monthly: Decimal,
    pub best_day: Option<(NaiveDate, Decimal)>,
    pub worst_day: Option<(NaiveDate, Decimal)>,
    pub best_month: Option<(NaiveDate, Decimal)>,
    pub worst_month: Option<(NaiveDate, Decimal)>,
    /// `None` is reported as "no losing days" (read as `+inf`).
    pub profit_factor: Option<Decimal>,
    pub regime_breakdown: RegimeBreakdown,
    pub drawdown_series: Vec<Decimal>,
    /// `None` when the trade log produced no closed FIFO lots (§4.9).
    pub trade_stats: Option<TradeStats>,
}

/// Trade-level statistics (§4.9), reconstructed by replaying a symbol's
/// `NET_BUY`/`NET_SELL`/`LIQUIDATE` fills in FIFO lot order: every sell (or
/// liquidation) closes against the oldest still-open buy lots first, and
/// each closed lot's realized P&L becomes one "trade" for these counts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TradeStats {
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub win_rate: Decimal,
    pub gross_profit: Decimal,
    pub gross_loss: Decimal,
    /// `None` if no lot closed with a profit.
    pub average_win: Option<Decimal>,
    /// `None` if no lot closed with a loss.
    pub average_loss: Option<Decimal>,
    pub largest_win: Option<Decimal>,
    pub largest_loss: Option<Decimal>,
    pub max_consecutive_wins: usize,
    pub max_consecutive_losses: usize,
}
