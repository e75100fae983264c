//! Assembles a [`PerformanceReport`] from an equity curve, the regime events
//! observed along the way, and a risk-free rate (§4.9).

use super::metrics::{DrawdownInfo, PerformanceReport, RegimeBreakdown};
use super::stats;
use crate::domain::market::indicators::pct_change;
use crate::domain::regime::Regime;
use crate::domain::trading::{EquityPoint, TradeRecord};
use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;

fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).expect("1970-01-01 is a valid date")
}

pub struct PerformanceAnalyzer {
    risk_free_rate: Decimal,
}

impl PerformanceAnalyzer {
    pub fn new(risk_free_rate: Decimal) -> Self {
        Self { risk_free_rate }
    }

    /// `regime_events` need not line up 1:1 with `equity_curve` — it's every
    /// regime classification observed during the run, in the order they
    /// occurred. `trades` is the full run trade log; pass `&[]` when none is
    /// available (`trade_stats` on the resulting report is then always `None`).
    pub fn analyze(&self, equity_curve: &[EquityPoint], regime_events: &[Regime], trades: &[TradeRecord]) -> PerformanceReport {
        let values: Vec<Decimal> = equity_curve.iter().map(|p| p.total_base_ccy_value).collect();
        let days: Vec<NaiveDate> = equity_curve.iter().map(|p| p.day).collect();
        let daily_returns = pct_change(&values);
        let dated_daily_returns: Vec<(NaiveDate, Decimal)> = days
            .iter()
            .skip(1)
            .copied()
            .zip(daily_returns.iter().copied())
            .collect();

        let points: Vec<(NaiveDate, Decimal)> = days.iter().copied().zip(values.iter().copied()).collect();
        let mdd_summary = stats::max_drawdown(&points);
        let cagr = match (days.first(), days.last(), values.first(), values.last()) {
            (Some(first_day), Some(last_day), Some(&start), Some(&end)) => {
                stats::cagr(start, end, (*last_day - *first_day).num_days())
            }
            _ => None,
        };
        let calmar = match (cagr, &mdd_summary) {
            (Some(c), Some(m)) => stats::calmar_ratio(c, m.magnitude),
            _ => None,
        };

        let monthly_points = month_end_points(&points);
        let monthly_values: Vec<Decimal> = monthly_points.iter().map(|(_, v)| *v).collect();
        let monthly_returns = pct_change(&monthly_values);
        let dated_monthly_returns: Vec<(NaiveDate, Decimal)> = monthly_points
            .iter()
            .skip(1)
            .map(|(d, _)| *d)
            .zip(monthly_returns.iter().copied())
            .collect();

        let mut regime_breakdown = RegimeBreakdown::default();
        for regime in regime_events {
            regime_breakdown.record(*regime);
        }

        PerformanceReport {
            cagr,
            mdd: mdd_summary
                .map(|m| DrawdownInfo {
                    magnitude: m.magnitude,
                    onset_day: m.onset_day,
                    trough_day: m.trough_day,
                    recovery_day: m.recovery_day,
                })
                .unwrap_or(DrawdownInfo {
                    magnitude: Decimal::ZERO,
                    onset_day: days.first().copied().unwrap_or_else(epoch),
                    trough_day: days.first().copied().unwrap_or_else(epoch),
                    recovery_day: None,
                }),
            annual_vol: stats::annual_vol(&daily_returns),
            sharpe: stats::sharpe_ratio(&daily_returns, self.risk_free_rate),
            sortino: stats::sortino_ratio(&daily_returns),
            calmar,
            win_rate_daily: stats::win_rate(&daily_returns),
            win_rate_monthly: stats::win_rate(&monthly_returns),
            best_day: stats::extreme(&dated_daily_returns, true).copied(),
            worst_day: stats::extreme(&dated_daily_returns, false).copied(),
            best_month: stats::extreme(&dated_monthly_returns, true).copied(),
            worst_month: stats::extreme(&dated_monthly_returns, false).copied(),
            profit_factor: stats::profit_factor(&daily_returns),
            regime_breakdown,
            drawdown_series: stats::drawdown_series(&values),
            trade_stats: stats::reconstruct_trade_stats(trades),
        }
    }
}

/// Last observation of each calendar month, in day order.
fn month_end_points(points: &[(NaiveDate, Decimal)]) -> Vec<(NaiveDate, Decimal)> {
    let mut out: Vec<(NaiveDate, Decimal)> = Vec::new();
    for &(day, value) in points {
        match out.last_mut() {
            Some((last_day, last_value)) if last_day.year() == day.year() && last_day.month() == day.month() => {
                *last_day = day;
                *last_value = value;
            }
            _ => out.push((day, value)),
        }
    }
    out
}
