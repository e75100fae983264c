//! Pure statistical building blocks for [`super::calculator::PerformanceAnalyzer`].
//! Kept separate from `market::indicators` because these operate on equity
//! curves and returns series rather than bar windows, but follow the same
//! "pure function, `Option`/explicit-zero on insufficient data" discipline.

use super::metrics::TradeStats;
use crate::domain::market::indicators::{decimal_sqrt, std_dev};
use crate::domain::trading::{TradeAction, TradeRecord};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use std::collections::{HashMap, VecDeque};

/// `(equity_end/equity_start)^(365.25/days) - 1`, computed via `f64` powf
/// since `Decimal` has no fractional exponent. `None` if `days <= 0` or
/// `equity_start <= 0`.
pub fn cagr(equity_start: Decimal, equity_end: Decimal, days: i64) -> Option<Decimal> {
    if days <= 0 || equity_start <= Decimal::ZERO {
        return None;
    }
    let ratio: f64 = (equity_end / equity_start).to_f64().unwrap_or(0.0);
    if ratio <= 0.0 {
        return None;
    }
    let exponent = 365.25 / days as f64;
    let grown = ratio.powf(exponent) - 1.0;
    Decimal::from_f64_retain(grown)
}

/// Running drawdown at every point: `(equity - cummax(equity)) / cummax(equity)`.
/// Always `<= 0`.
pub fn drawdown_series(equity: &[Decimal]) -> Vec<Decimal> {
    let mut running_max = Decimal::MIN;
    let mut out = Vec::with_capacity(equity.len());
    for &e in equity {
        running_max = running_max.max(e);
        if running_max > Decimal::ZERO {
            out.push((e - running_max) / running_max);
        } else {
            out.push(Decimal::ZERO);
        }
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawdownSummary {
    pub magnitude: Decimal,
    pub onset_day: NaiveDate,
    pub trough_day: NaiveDate,
    /// `None` if the curve never recovers to the pre-drawdown peak within
    /// the run.
    pub recovery_day: Option<NaiveDate>,
}

/// Finds the maximum drawdown episode: the peak-to-trough decline with
/// largest magnitude, its onset (the peak day), its trough day, and the
/// first day equity closes back at or above the onset peak (if any).
pub fn max_drawdown(points: &[(NaiveDate, Decimal)]) -> Option<DrawdownSummary> {
    if points.is_empty() {
        return None;
    }
    let mut peak_value = points[0].1;
    let mut peak_day = points[0].0;
    let mut worst = DrawdownSummary {
        magnitude: Decimal::ZERO,
        onset_day: peak_day,
        trough_day: peak_day,
        recovery_day: None,
    };
    for &(day, value) in points {
        if value > peak_value {
            peak_value = value;
            peak_day = day;
        }
        if peak_value > Decimal::ZERO {
            let dd = (value - peak_value) / peak_value;
            if dd < worst.magnitude {
                worst = DrawdownSummary {
                    magnitude: dd,
                    onset_day: peak_day,
                    trough_day: day,
                    recovery_day: None,
                };
            }
        }
    }
    // Recovery: first day at/after the trough whose equity >= the onset peak value.
    let onset_peak_value = points
        .iter()
        .find(|(d, _)| *d == worst.onset_day)
        .map(|(_, v)| *v)
        .unwrap_or(peak_value);
    worst.recovery_day = points
        .iter()
        .filter(|(d, _)| *d > worst.trough_day)
        .find(|(_, v)| *v >= onset_peak_value)
        .map(|(d, _)| *d);
    Some(worst)
}

/// Annualised volatility: `std(daily_returns) * sqrt(252)`.
pub fn annual_vol(daily_returns: &[Decimal]) -> Option<Decimal> {
    std_dev(daily_returns, true)
}

/// `(mean(daily) - rf/252) / std(daily) * sqrt(252)`.
pub fn sharpe_ratio(daily_returns: &[Decimal], risk_free_rate: Decimal) -> Option<Decimal> {
    if daily_returns.len() < 2 {
        return None;
    }
    let n = Decimal::from(daily_returns.len());
    let mean = daily_returns.iter().sum::<Decimal>() / n;
    let sd = std_dev(daily_returns, false)?;
    if sd.is_zero() {
        return None;
    }
    let daily_rf = risk_free_rate / Decimal::from(252);
    let sqrt_252 = decimal_sqrt(Decimal::from(252))?;
    Some((mean - daily_rf) / sd * sqrt_252)
}

/// `mean(daily)*252 / (std(daily<0)*sqrt(252))`. `None` (read as `+inf`) if
/// there are no negative daily returns to form a downside deviation.
pub fn sortino_ratio(daily_returns: &[Decimal]) -> Option<Decimal> {
    if daily_returns.is_empty() {
        return None;
    }
    let negatives: Vec<Decimal> = daily_returns.iter().copied().filter(|r| *r < Decimal::ZERO).collect();
    if negatives.is_empty() {
        return None; // +infinity: no downside observed
    }
    let n = Decimal::from(daily_returns.len());
    let mean_annualised = (daily_returns.iter().sum::<Decimal>() / n) * Decimal::from(252);
    let downside_sd = std_dev(&negatives, true)?;
    if downside_sd.is_zero() {
        return None;
    }
    Some(mean_annualised / downside_sd)
}

/// `CAGR / |MDD|`. `None` if `mdd == 0`.
pub fn calmar_ratio(cagr: Decimal, mdd: Decimal) -> Option<Decimal> {
    if mdd.is_zero() {
        return None;
    }
    Some(cagr / mdd.abs())
}

/// Fraction of `values` that are strictly positive.
pub fn win_rate(values: &[Decimal]) -> Decimal {
    if values.is_empty() {
        return Decimal::ZERO;
    }
    let wins = values.iter().filter(|v| **v > Decimal::ZERO).count();
    Decimal::from(wins) / Decimal::from(values.len())
}

/// `Σ positive / |Σ negative|`. `None` (read as `+inf`) if there are no
/// negative values.
pub fn profit_factor(values: &[Decimal]) -> Option<Decimal> {
    let positive: Decimal = values.iter().filter(|v| **v > Decimal::ZERO).sum();
    let negative: Decimal = values.iter().filter(|v| **v < Decimal::ZERO).sum();
    if negative.is_zero() {
        return None;
    }
    Some(positive / negative.abs())
}

/// Index of the extreme (max if `want_max`, else min) value, paired with its
/// date, alongside the values themselves.
pub fn extreme<'a>(
    dated_values: &'a [(NaiveDate, Decimal)],
    want_max: bool,
) -> Option<&'a (NaiveDate, Decimal)> {
    if want_max {
        dated_values.iter().max_by(|a, b| a.1.cmp(&b.1))
    } else {
        dated_values.iter().min_by(|a, b| a.1.cmp(&b.1))
    }
}

/// One FIFO buy lot still open against a symbol, carrying the per-share
/// cost basis it was bought at (including the buy's own commission and
/// slippage, since `signed_base_ccy_amount` is already net of both).
struct OpenLot {
    shares: Decimal,
    cost_per_share: Decimal,
}

/// One closed trade: a sell (or liquidation) fill matched, in whole or in
/// part, against the oldest open lot(s) for that symbol.
struct ClosedLot {
    day: NaiveDate,
    pnl: Decimal,
}

/// Replays `trades` per symbol in FIFO lot order (§4.9) and reconstructs
/// trade-level statistics from the realized P&L of every closed lot.
/// `trades` need not be pre-sorted by day; this sorts the reconstructed
/// closes by day before computing win rate and consecutive-streak counts,
/// since a `HashMap`-grouped replay has no inherent cross-symbol ordering.
/// Returns `None` if no lot closes (e.g. an empty trade log, or a log of
/// buys with no matching sells).
pub fn reconstruct_trade_stats(trades: &[TradeRecord]) -> Option<TradeStats> {
    let mut by_symbol: HashMap<&str, Vec<&TradeRecord>> = HashMap::new();
    for trade in trades {
        by_symbol.entry(trade.symbol.as_str()).or_default().push(trade);
    }

    let mut closed: Vec<ClosedLot> = Vec::new();
    for records in by_symbol.values() {
        let mut lots: VecDeque<OpenLot> = VecDeque::new();
        for record in records {
            match record.action {
                TradeAction::NetBuy => {
                    let shares = record.signed_shares;
                    if shares > Decimal::ZERO {
                        lots.push_back(OpenLot {
                            shares,
                            cost_per_share: -record.signed_base_ccy_amount / shares,
                        });
                    }
                }
                TradeAction::NetSell | TradeAction::Liquidate => {
                    let mut shares_to_close = record.signed_shares.abs();
                    if shares_to_close.is_zero() {
                        continue;
                    }
                    let proceeds_per_share = record.signed_base_ccy_amount / shares_to_close;
                    while shares_to_close > Decimal::ZERO {
                        let Some(lot) = lots.front_mut() else { break };
                        let matched = shares_to_close.min(lot.shares);
                        closed.push(ClosedLot {
                            day: record.day,
                            pnl: (proceeds_per_share - lot.cost_per_share) * matched,
                        });
                        lot.shares -= matched;
                        shares_to_close -= matched;
                        if lot.shares.is_zero() {
                            lots.pop_front();
                        }
                    }
                }
            }
        }
    }

    if closed.is_empty() {
        return None;
    }
    closed.sort_by_key(|c| c.day);

    let total_trades = closed.len();
    let wins: Vec<Decimal> = closed.iter().filter(|c| c.pnl > Decimal::ZERO).map(|c| c.pnl).collect();
    let losses: Vec<Decimal> = closed.iter().filter(|c| c.pnl < Decimal::ZERO).map(|c| c.pnl).collect();
    let winning_trades = wins.len();
    let losing_trades = losses.len();
    let gross_profit: Decimal = wins.iter().sum();
    let gross_loss: Decimal = losses.iter().sum::<Decimal>().abs();

    let mut max_consecutive_wins = 0usize;
    let mut max_consecutive_losses = 0usize;
    let mut current_wins = 0usize;
    let mut current_losses = 0usize;
    for c in &closed {
        if c.pnl > Decimal::ZERO {
            current_wins += 1;
            current_losses = 0;
        } else if c.pnl < Decimal::ZERO {
            current_losses += 1;
            current_wins = 0;
        } else {
            current_wins = 0;
            current_losses = 0;
        }
        max_consecutive_wins = max_consecutive_wins.max(current_wins);
        max_consecutive_losses = max_consecutive_losses.max(current_losses);
    }

    Some(TradeStats {
        total_trades,
        winning_trades,
        losing_trades,
        win_rate: Decimal::from(winning_trades) / Decimal::from(total_trades),
        gross_profit,
        gross_loss,
        average_win: if winning_trades > 0 { Some(gross_profit / Decimal::from(winning_trades)) } else { None },
        average_loss: if losing_trades > 0 { Some(gross_loss / Decimal::from(losing_trades)) } else { None },
        largest_win: wins.iter().copied().max(),
        largest_loss: losses.iter().copied().map(|l| l.abs()).max(),
        max_consecutive_wins,
        max_consecutive_losses,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market::Market;
    use crate::domain::trading::Currency;
    use rust_decimal_macros::dec;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn drawdown_series_is_nonpositive() {
        let equity = vec![dec!(100), dec!(110), dec!(90), dec!(120), dec!(80)];
        let dd = drawdown_series(&equity);
        assert!(dd.iter().all(|v| *v <= Decimal::ZERO));
        // trough at 80 after peak 120: (80-120)/120 = -1/3
        assert_eq!(*dd.last().unwrap(), (dec!(80) - dec!(120)) / dec!(120));
    }

    #[test]
    fn max_drawdown_finds_worst_episode_and_recovery() {
        let points = vec![
            (d(2024, 1, 1), dec!(100)),
            (d(2024, 1, 2), dec!(120)),
            (d(2024, 1, 3), dec!(90)),
            (d(2024, 1, 4), dec!(125)),
        ];
        let summary = max_drawdown(&points).unwrap();
        assert_eq!(summary.onset_day, d(2024, 1, 2));
        assert_eq!(summary.trough_day, d(2024, 1, 3));
        assert_eq!(summary.recovery_day, Some(d(2024, 1, 4)));
    }

    #[test]
    fn max_drawdown_no_recovery_is_none() {
        let points = vec![
            (d(2024, 1, 1), dec!(100)),
            (d(2024, 1, 2), dec!(120)),
            (d(2024, 1, 3), dec!(90)),
        ];
        let summary = max_drawdown(&points).unwrap();
        assert_eq!(summary.recovery_day, None);
    }

    #[test]
    fn sortino_is_none_when_no_negative_returns() {
        let returns = vec![dec!(0.01), dec!(0.02), dec!(0.005)];
        assert_eq!(sortino_ratio(&returns), None);
    }

    #[test]
    fn profit_factor_none_when_no_losses() {
        let values = vec![dec!(1), dec!(2), dec!(3)];
        assert_eq!(profit_factor(&values), None);
    }

    #[test]
    fn win_rate_basic() {
        let values = vec![dec!(1), dec!(-1), dec!(2), dec!(-2)];
        assert_eq!(win_rate(&values), dec!(0.5));
    }

    fn trade(day: NaiveDate, symbol: &str, action: TradeAction, signed_shares: Decimal, signed_base_ccy_amount: Decimal) -> TradeRecord {
        TradeRecord {
            day,
            symbol: symbol.to_string(),
            action,
            signed_shares,
            market_price: Decimal::ZERO,
            exec_price: Decimal::ZERO,
            signed_base_ccy_amount,
            commission: Decimal::ZERO,
            slippage_cost: Decimal::ZERO,
            market: Market::DomesticRegular,
            currency: Currency::Krw,
        }
    }

    #[test]
    fn no_closed_lots_yields_none() {
        let trades = vec![trade(d(2024, 1, 1), "A", TradeAction::NetBuy, dec!(10), dec!(-1000))];
        assert_eq!(reconstruct_trade_stats(&trades), None);
    }

    #[test]
    fn single_symbol_winning_and_losing_round_trip() {
        let trades = vec![
            trade(d(2024, 1, 1), "A", TradeAction::NetBuy, dec!(10), dec!(-1000)), // cost 100/share
            trade(d(2024, 1, 5), "A", TradeAction::NetSell, dec!(-10), dec!(1200)), // proceeds 120/share -> +200
            trade(d(2024, 1, 6), "A", TradeAction::NetBuy, dec!(5), dec!(-500)), // cost 100/share
            trade(d(2024, 1, 10), "A", TradeAction::Liquidate, dec!(-5), dec!(400)), // proceeds 80/share -> -100
        ];
        let stats = reconstruct_trade_stats(&trades).unwrap();
        assert_eq!(stats.total_trades, 2);
        assert_eq!(stats.winning_trades, 1);
        assert_eq!(stats.losing_trades, 1);
        assert_eq!(stats.win_rate, dec!(0.5));
        assert_eq!(stats.gross_profit, dec!(200));
        assert_eq!(stats.gross_loss, dec!(100));
        assert_eq!(stats.largest_win, Some(dec!(200)));
        assert_eq!(stats.largest_loss, Some(dec!(100)));
        assert_eq!(stats.max_consecutive_wins, 1);
        assert_eq!(stats.max_consecutive_losses, 1);
    }

    #[test]
    fn partial_sell_splits_across_fifo_lots() {
        let trades = vec![
            trade(d(2024, 1, 1), "B", TradeAction::NetBuy, dec!(10), dec!(-1000)), // cost 100/share
            trade(d(2024, 1, 2), "B", TradeAction::NetBuy, dec!(10), dec!(-1100)), // cost 110/share
            // Sells 15 shares: all 10 from the first lot (pnl +200) plus 5 from the second (pnl +25).
            trade(d(2024, 1, 10), "B", TradeAction::NetSell, dec!(-15), dec!(1800)), // proceeds 120/share
        ];
        let stats = reconstruct_trade_stats(&trades).unwrap();
        assert_eq!(stats.total_trades, 2);
        assert_eq!(stats.winning_trades, 2);
        assert_eq!(stats.gross_profit, dec!(225));
    }

    #[test]
    fn consecutive_streaks_track_longest_run_not_just_the_last() {
        let trades = vec![
            trade(d(2024, 1, 1), "C", TradeAction::NetBuy, dec!(1), dec!(-100)),
            trade(d(2024, 1, 2), "C", TradeAction::NetSell, dec!(-1), dec!(120)), // win
            trade(d(2024, 1, 3), "C", TradeAction::NetBuy, dec!(1), dec!(-100)),
            trade(d(2024, 1, 4), "C", TradeAction::NetSell, dec!(-1), dec!(130)), // win
            trade(d(2024, 1, 5), "C", TradeAction::NetBuy, dec!(1), dec!(-100)),
            trade(d(2024, 1, 6), "C", TradeAction::NetSell, dec!(-1), dec!(90)), // loss
            trade(d(2024, 1, 7), "C", TradeAction::NetBuy, dec!(1), dec!(-100)),
            trade(d(2024, 1, 8), "C", TradeAction::NetSell, dec!(-1), dec!(110)), // win
        ];
        let stats = reconstruct_trade_stats(&trades).unwrap();
        assert_eq!(stats.max_consecutive_wins, 2);
        assert_eq!(stats.max_consecutive_losses, 1);
    }
}
