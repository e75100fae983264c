//! Daily-loop driver for the momentum-swing strategy (§4.7 "Swing
//! AlphaFilter" plus its ATR trailing-stop companion exit). Structured the
//! same way as [`crate::application::pullback_orchestrator::PullbackOrchestrator`]:
//! a day-by-day driver over the raw per-symbol `BarSeries` map rather than
//! the month-end-rebalance [`crate::application::orchestrator::BacktestOrchestrator`],
//! since the swing gate chain and trailing stop both need daily OHLC, not a
//! dense close-only panel.

use crate::domain::alpha::swing::{
    self, ATR_FALLBACK_FRACTION, ATR_STOP_MULTIPLE, ATR_TRAILING_LOOKBACK, SwingExitAction, SwingInput, SwingPosition,
};
use crate::domain::alpha::FilterVerdict;
use crate::domain::market::indicators::{adtv, atr, ema, return_n, rvol, sma};
use crate::domain::market::{Bar, BarSeries, Market};
use crate::domain::trading::{Currency, EquityPoint, TradeAction, TradeRecord};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use tracing::{debug, info};

/// Volatility-inverse position sizing slot model (§4.7's note that the ATR
/// trailing stop is an ambient supplement, not part of the distilled
/// specification): sizing itself is likewise not named by the spec, so this
/// crate carries over the platform's own 10-slot risk-parity sizer.
pub const MAX_SLOTS: usize = 10;
pub const RISK_PER_TRADE: Decimal = dec!(0.015);

pub struct SwingConfig {
    pub initial_capital: Decimal,
    pub warmup_days: usize,
}

pub struct SwingRunResult {
    pub equity_curve: Vec<EquityPoint>,
    pub trades: Vec<TradeRecord>,
}

struct OpenPosition {
    position: SwingPosition,
    shares: Decimal,
}

pub struct SwingOrchestrator;

impl SwingOrchestrator {
    pub fn run(series_by_symbol: &HashMap<String, (BarSeries, Market)>, config: &SwingConfig) -> SwingRunResult {
        let mut days: Vec<NaiveDate> = series_by_symbol
            .values()
            .flat_map(|(series, _)| series.bars().iter().map(|b| b.instant))
            .collect();
        days.sort();
        days.dedup();

        if config.warmup_days >= days.len() {
            return SwingRunResult {
                equity_curve: Vec::new(),
                trades: Vec::new(),
            };
        }
        let window = &days[config.warmup_days..];

        let mut cash = config.initial_capital;
        let mut open: HashMap<String, OpenPosition> = HashMap::new();
        let mut trades = Vec::new();
        let mut equity_curve = Vec::new();

        let total = window.len();
        let mut last_decile_reported = 0usize;

        for (i, &day) in window.iter().enumerate() {
            Self::evaluate_exits(day, series_by_symbol, &mut open, &mut cash, &mut trades);
            Self::scan_and_enter(day, series_by_symbol, &mut open, &mut cash, &mut trades);

            let total_value = Self::mark_to_market(day, series_by_symbol, &open, cash);
            equity_curve.push(EquityPoint {
                day,
                total_base_ccy_value: total_value,
            });

            let decile = (i + 1) * 10 / total;
            if decile > last_decile_reported {
                last_decile_reported = decile;
                info!(progress_pct = decile * 10, day = %day, "swing backtest progress");
            }
        }

        SwingRunResult { equity_curve, trades }
    }

    /// Advances every open position's ATR trailing stop one day and settles
    /// whatever it decides, selling into `cash` immediately — like the
    /// pullback loop, this strategy trades one symbol at a time so there is
    /// no separate sells-then-buys ordering to respect within a single day.
    fn evaluate_exits(
        day: NaiveDate,
        series_by_symbol: &HashMap<String, (BarSeries, Market)>,
        open: &mut HashMap<String, OpenPosition>,
        cash: &mut Decimal,
        trades: &mut Vec<TradeRecord>,
    ) {
        let mut closed = Vec::new();
        for (symbol, held) in open.iter_mut() {
            let Some((series, market)) = series_by_symbol.get(symbol) else {
                continue;
            };
            let bars = series.up_to(day);
            let Some(bar) = bars.last().filter(|b| b.instant == day) else {
                continue;
            };
            let prior_close = bars.get(bars.len().wrapping_sub(2)).map(|b| b.close).unwrap_or(held.position.entry_price);
            match held.position.evaluate_day(day, bar.low, bar.close, prior_close) {
                SwingExitAction::Hold => {}
                SwingExitAction::StopOut { price } => {
                    let proceeds = held.shares * price;
                    *cash += proceeds;
                    debug!(symbol, %day, %price, "swing stop-out");
                    trades.push(trade_record(day, symbol, *market, TradeAction::Liquidate, -held.shares, price, proceeds));
                    closed.push(symbol.clone());
                }
                SwingExitAction::HorizonClose { price } => {
                    let proceeds = held.shares * price;
                    *cash += proceeds;
                    debug!(symbol, %day, %price, "swing horizon close");
                    trades.push(trade_record(day, symbol, *market, TradeAction::Liquidate, -held.shares, price, proceeds));
                    closed.push(symbol.clone());
                }
            }
        }
        for symbol in closed {
            open.remove(&symbol);
        }
    }

    /// Scans every non-held symbol through the swing gate chain and, while
    /// open slots remain, fills at today's close sized via the volatility-
    /// inverse slot model (§4.3 of the position-sizing note above).
    fn scan_and_enter(
        day: NaiveDate,
        series_by_symbol: &HashMap<String, (BarSeries, Market)>,
        open: &mut HashMap<String, OpenPosition>,
        cash: &mut Decimal,
        trades: &mut Vec<TradeRecord>,
    ) {
        let available_slots = MAX_SLOTS.saturating_sub(open.len());
        if available_slots == 0 {
            return;
        }
        let total_equity = Self::mark_to_market(day, series_by_symbol, open, *cash);
        let slot_cap = total_equity / Decimal::from(MAX_SLOTS);

        let mut candidates: Vec<(String, Decimal, &[Bar])> = series_by_symbol
            .iter()
            .filter(|(symbol, _)| !open.contains_key(*symbol))
            .filter_map(|(symbol, (series, _))| {
                let bars = series.up_to(day);
                let last = bars.last()?;
                if last.instant != day || bars.len() < 21 {
                    return None;
                }
                let prior = &bars[..bars.len() - 1];
                let adtv20 = adtv(prior, 20)?;
                Some((symbol.clone(), adtv20, bars))
            })
            .collect();
        // Sort by descending ADTV, breaking ties by symbol so fill order
        // (and therefore which names consume the remaining slots) is
        // deterministic across repeated runs regardless of HashMap iteration
        // order (§8).
        candidates.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        let mut filled = 0usize;
        for (symbol, adtv20, bars) in candidates {
            if filled >= available_slots {
                break;
            }
            let closes: Vec<Decimal> = bars.iter().map(|b| b.close).collect();
            let today = bars.last().expect("bars non-empty, checked above");
            let input = SwingInput {
                adtv20: Some(adtv20),
                market_cap: None,
                rvol: rvol(bars, 20),
                close: today.close,
                sma10: sma(&closes, 10),
                ema20: ema(&closes, 20),
                daily_return: return_n(&closes, 1),
                sma20: sma(&closes, 20),
            };
            if swing::evaluate(input) != FilterVerdict::Pass {
                continue;
            }
            let entry_atr = atr(bars, ATR_TRAILING_LOOKBACK);
            let stop_distance = entry_atr.map(|a| a * ATR_STOP_MULTIPLE).unwrap_or(today.close * ATR_FALLBACK_FRACTION * ATR_STOP_MULTIPLE);
            if stop_distance.is_zero() {
                continue;
            }
            let risk_amount = total_equity * RISK_PER_TRADE;
            let shares = (risk_amount / stop_distance).trunc();
            let mut amount = shares * today.close;
            let mut final_shares = shares;
            if amount > slot_cap {
                final_shares = (slot_cap / today.close).trunc();
                amount = final_shares * today.close;
            }
            if final_shares <= Decimal::ZERO || amount > *cash {
                continue;
            }
            let Some(market) = series_by_symbol.get(&symbol).map(|(_, m)| *m) else {
                continue;
            };
            *cash -= amount;
            open.insert(
                symbol.clone(),
                OpenPosition {
                    position: SwingPosition::new(today.close, entry_atr, day),
                    shares: final_shares,
                },
            );
            debug!(symbol, %day, %amount, "swing position entered");
            trades.push(trade_record(day, &symbol, market, TradeAction::NetBuy, final_shares, today.close, -amount));
            filled += 1;
        }
    }

    fn mark_to_market(day: NaiveDate, series_by_symbol: &HashMap<String, (BarSeries, Market)>, open: &HashMap<String, OpenPosition>, cash: Decimal) -> Decimal {
        let mut total = cash;
        for (symbol, held) in open {
            let mark = series_by_symbol
                .get(symbol)
                .and_then(|(series, _)| series.up_to(day).last())
                .map(|b| b.close)
                .unwrap_or(held.position.entry_price);
            total += held.shares * mark;
        }
        total
    }
}

fn trade_record(day: NaiveDate, symbol: &str, market: Market, action: TradeAction, signed_shares: Decimal, exec_price: Decimal, signed_base_ccy_amount: Decimal) -> TradeRecord {
    TradeRecord {
        day,
        symbol: symbol.to_string(),
        action,
        signed_shares,
        market_price: exec_price,
        exec_price,
        signed_base_ccy_amount,
        commission: Decimal::ZERO,
        slippage_cost: Decimal::ZERO,
        market,
        currency: if market.is_domestic() { Currency::Krw } else { Currency::Usd },
    }
}
