//! Daily-loop driver for the surge-to-pullback strategy (§4.8 "Pullback
//! daily loop"). Unlike [`crate::application::orchestrator::BacktestOrchestrator`],
//! which drives month-end rebalances off the dense [`crate::application::data_handler::DataHandler`]
//! panel, this loop needs each candidate's raw intraday-free OHLC to run the
//! gap-down buy guard and the sell ladder — data the close-only panel does
//! not carry — so it reads directly from the per-symbol `BarSeries` map
//! instead.

use crate::domain::alpha::pullback::{
    self, ATR_LOOKBACK, ExitAction, HARD_STOP_ATR_MULTIPLE, PullbackDay, PullbackInput, PullbackPosition, SURGE_LOOKBACK_DAYS, simulate_staged_buy,
};
use crate::domain::alpha::FilterVerdict;
use crate::domain::market::indicators::{adtv, atr, ema, macd, return_n, rvol, sma};
use crate::domain::market::{Bar, BarSeries, Market};
use crate::domain::regime::{Regime, classify_domestic_strict};
use crate::domain::trading::{Currency, EquityPoint, TradeAction, TradeRecord};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Liquidity gate used both to admit a name into the scan universe and, via
/// [`crate::domain::alpha::pullback::LIQUIDITY_ADTV_THRESHOLD`], inside the
/// gate chain itself.
const REGIME_SMA_FAST: usize = 5;
const REGIME_SMA_SLOW: usize = 50;
const REGIME_MACD_FAST: usize = 12;
const REGIME_MACD_SLOW: usize = 26;
const REGIME_MACD_SIGNAL: usize = 9;

/// Fraction of total equity risked per new position before the regime scale
/// factor is applied (§4.8: "ATR-based position size (scaled by the
/// regime's scale factor)" names no precise formula; this crate resolves it
/// as a risk-parity sizing — position size such that a full stop-out at
/// `entry - ATR*1.2` loses this fraction of equity at the deployment scale
/// in force when the order was staged).
pub const RISK_PER_TRADE: Decimal = rust_decimal_macros::dec!(0.01);

pub struct PullbackConfig {
    pub initial_capital: Decimal,
    pub max_open_positions: usize,
    pub warmup_days: usize,
    pub benchmark_symbol: String,
}

pub struct PullbackRunResult {
    pub equity_curve: Vec<EquityPoint>,
    pub trades: Vec<TradeRecord>,
    pub regimes_observed: Vec<Regime>,
}

struct OpenPosition {
    position: PullbackPosition,
    shares: Decimal,
}

struct PendingOrder {
    symbol: String,
    prev_close: Decimal,
    target_amount: Decimal,
    entry_atr: Decimal,
}

pub struct PullbackOrchestrator;

impl PullbackOrchestrator {
    pub fn run(series_by_symbol: &HashMap<String, (BarSeries, Market)>, config: &PullbackConfig) -> PullbackRunResult {
        let mut days: Vec<NaiveDate> = series_by_symbol
            .values()
            .flat_map(|(series, _)| series.bars().iter().map(|b| b.instant))
            .collect();
        days.sort();
        days.dedup();

        if config.warmup_days >= days.len() {
            return PullbackRunResult {
                equity_curve: Vec::new(),
                trades: Vec::new(),
                regimes_observed: Vec::new(),
            };
        }
        let window = &days[config.warmup_days..];

        let mut cash = config.initial_capital;
        let mut open: HashMap<String, OpenPosition> = HashMap::new();
        let mut pending: Vec<PendingOrder> = Vec::new();
        let mut trades = Vec::new();
        let mut equity_curve = Vec::new();
        let mut regimes_observed = Vec::new();

        let total = window.len();
        let mut last_decile_reported = 0usize;

        for (i, &day) in window.iter().enumerate() {
            Self::evaluate_sells(day, series_by_symbol, &mut open, &mut cash, &mut trades);
            Self::process_pending_orders(day, series_by_symbol, &mut pending, &mut open, &mut cash, &mut trades);

            if let Some(regime) = Self::scan_and_stage(day, series_by_symbol, config, &mut open, &mut pending, cash) {
                regimes_observed.push(regime);
            }

            let total_value = Self::mark_to_market(day, series_by_symbol, &open, cash);
            equity_curve.push(EquityPoint {
                day,
                total_base_ccy_value: total_value,
            });

            let decile = (i + 1) * 10 / total;
            if decile > last_decile_reported {
                last_decile_reported = decile;
                info!(progress_pct = decile * 10, day = %day, "pullback backtest progress");
            }
        }

        PullbackRunResult {
            equity_curve,
            trades,
            regimes_observed,
        }
    }

    /// §4.8 steps 1-2: advance every open position one day and settle
    /// whatever its sell ladder decides, selling into `cash` immediately
    /// (this strategy trades one symbol at a time rather than netting a
    /// target-weight vector, so there is no separate sells-then-buys phase
    /// to order within a single day beyond "sells before the day's new
    /// stage" already encoded by calling this before [`Self::process_pending_orders`]).
    fn evaluate_sells(
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
            let Some(bar) = series.bars().iter().find(|b| b.instant == day) else {
                continue;
            };
            match held.position.evaluate_day(day, bar.open, bar.high, bar.low, bar.close) {
                ExitAction::Hold => {}
                ExitAction::TakePartialProfit { fraction, price } => {
                    let sell_shares = (held.shares * fraction).trunc();
                    if sell_shares > Decimal::ZERO {
                        let proceeds = sell_shares * price;
                        *cash += proceeds;
                        held.shares -= sell_shares;
                        debug!(symbol, %day, %price, "pullback partial take-profit");
                        trades.push(trade_record(day, symbol, *market, TradeAction::NetSell, -sell_shares, price, proceeds));
                    }
                }
                ExitAction::StopOut { price } => {
                    let proceeds = held.shares * price;
                    *cash += proceeds;
                    debug!(symbol, %day, %price, "pullback stop-out");
                    trades.push(trade_record(day, symbol, *market, TradeAction::Liquidate, -held.shares, price, proceeds));
                    closed.push(symbol.clone());
                }
                ExitAction::HorizonClose { price } => {
                    let proceeds = held.shares * price;
                    *cash += proceeds;
                    debug!(symbol, %day, %price, "pullback horizon close");
                    trades.push(trade_record(day, symbol, *market, TradeAction::Liquidate, -held.shares, price, proceeds));
                    closed.push(symbol.clone());
                }
            }
        }
        for symbol in closed {
            open.remove(&symbol);
        }
    }

    /// §4.8 step 3: fill (or silently drop) every order staged yesterday.
    fn process_pending_orders(
        day: NaiveDate,
        series_by_symbol: &HashMap<String, (BarSeries, Market)>,
        pending: &mut Vec<PendingOrder>,
        open: &mut HashMap<String, OpenPosition>,
        cash: &mut Decimal,
        trades: &mut Vec<TradeRecord>,
    ) {
        for order in std::mem::take(pending) {
            let Some((series, market)) = series_by_symbol.get(&order.symbol) else {
                continue;
            };
            let Some(bar) = series.bars().iter().find(|b| b.instant == day) else {
                continue;
            };
            let Some((fill_price, shares)) = simulate_staged_buy(bar.open, order.prev_close, order.target_amount) else {
                debug!(symbol = %order.symbol, %day, "pullback staged buy aborted");
                continue;
            };
            let cost = fill_price * shares;
            if cost > *cash {
                warn!(symbol = %order.symbol, %day, "pullback staged buy exceeds available cash, skipping");
                continue;
            }
            *cash -= cost;
            open.insert(
                order.symbol.clone(),
                OpenPosition {
                    position: PullbackPosition::new(fill_price, order.entry_atr, day),
                    shares,
                },
            );
            trades.push(trade_record(day, &order.symbol, *market, TradeAction::NetBuy, shares, fill_price, -cost));
        }
    }

    /// §4.8 step 4: classify the domestic regime off the benchmark series,
    /// then (while slots remain and the regime's scale factor is non-zero)
    /// scan a liquidity-ranked universe through the Pullback AlphaFilter and
    /// stage passing names up to the number of open slots.
    fn scan_and_stage(
        day: NaiveDate,
        series_by_symbol: &HashMap<String, (BarSeries, Market)>,
        config: &PullbackConfig,
        open: &mut HashMap<String, OpenPosition>,
        pending: &mut Vec<PendingOrder>,
        cash: Decimal,
    ) -> Option<Regime> {
        let (bench_series, _) = series_by_symbol.get(&config.benchmark_symbol)?;
        let bench_bars = bench_series.up_to(day);
        let bench_closes: Vec<Decimal> = bench_bars.iter().map(|b| b.close).collect();
        let sma5 = sma(&bench_closes, REGIME_SMA_FAST);
        let sma50 = sma(&bench_closes, REGIME_SMA_SLOW);
        let macd_signal = macd(&bench_closes, REGIME_MACD_FAST, REGIME_MACD_SLOW, REGIME_MACD_SIGNAL).map(|m| m.signal);
        let (regime, scale) = classify_domestic_strict(sma5, sma50, macd_signal);

        if scale.is_zero() {
            return Some(regime);
        }
        let available_slots = config.max_open_positions.saturating_sub(open.len() + pending.len());
        if available_slots == 0 {
            return Some(regime);
        }

        let total_equity = Self::mark_to_market(day, series_by_symbol, open, cash);
        let staged_symbols: Vec<String> = pending.iter().map(|o| o.symbol.clone()).collect();

        let mut candidates: Vec<(String, Decimal, &[Bar])> = series_by_symbol
            .iter()
            .filter(|(symbol, _)| **symbol != config.benchmark_symbol && !open.contains_key(*symbol) && !staged_symbols.contains(*symbol))
            .filter_map(|(symbol, (series, _))| {
                let bars = series.up_to(day);
                if bars.len() < 21 {
                    return None;
                }
                let prior = &bars[..bars.len() - 1];
                let adtv20 = adtv(prior, 20)?;
                Some((symbol.clone(), adtv20, bars))
            })
            .collect();
        // Descending ADTV, ties broken by symbol so which names consume the
        // remaining slots doesn't depend on HashMap iteration order (§8).
        candidates.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        let mut filled = 0usize;
        for (symbol, adtv20, bars) in candidates {
            if filled >= available_slots {
                break;
            }
            let input = PullbackInput {
                days: &build_pullback_days(bars),
                adtv20: Some(adtv20),
                ema5: ema(&bars.iter().map(|b| b.close).collect::<Vec<_>>(), 5),
            };
            if pullback::evaluate(input) != FilterVerdict::Pass {
                continue;
            }
            let Some(entry_atr) = atr(bars, ATR_LOOKBACK) else {
                continue;
            };
            let stop_distance = entry_atr * HARD_STOP_ATR_MULTIPLE;
            if stop_distance.is_zero() {
                continue;
            }
            let risk_dollars = total_equity * RISK_PER_TRADE * scale;
            let shares_for_risk = risk_dollars / stop_distance;
            let today_close = bars.last().expect("bars non-empty, checked above").close;
            let target_amount = shares_for_risk * today_close;
            if target_amount <= Decimal::ZERO {
                continue;
            }
            pending.push(PendingOrder {
                symbol: symbol.clone(),
                prev_close: today_close,
                target_amount,
                entry_atr,
            });
            debug!(symbol, %day, %target_amount, "pullback candidate staged");
            filled += 1;
        }

        Some(regime)
    }

    /// §4.8 step 5: cash plus each open position marked at its latest
    /// available close on or before `day`, falling back to entry price when
    /// no such close exists yet (a symbol missing today's bar entirely, e.g.
    /// a trading halt).
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

/// Builds the trailing `PullbackDay` slice the gate chain needs: today plus
/// up to [`SURGE_LOOKBACK_DAYS`] prior sessions, each carrying its own
/// point-in-time `rvol`/`daily_return` (computed from the history strictly
/// before it, matching §4.7's "that day's own adtv20").
fn build_pullback_days(bars: &[Bar]) -> Vec<PullbackDay> {
    let take = (SURGE_LOOKBACK_DAYS + 1).min(bars.len());
    let start = bars.len() - take;
    let closes: Vec<Decimal> = bars.iter().map(|b| b.close).collect();
    (start..bars.len())
        .map(|idx| {
            let prev_close = if idx == 0 { Decimal::ZERO } else { bars[idx - 1].close };
            PullbackDay {
                high: bars[idx].high,
                close: bars[idx].close,
                prev_close,
                volume: bars[idx].volume,
                rvol: rvol(&bars[..=idx], 20),
                daily_return: return_n(&closes[..=idx], 1),
            }
        })
        .collect()
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

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn ohlc(d: i64, open: Decimal, high: Decimal, low: Decimal, close: Decimal, volume: Decimal) -> Bar {
        Bar {
            instant: NaiveDate::from_ymd_opt(2023, 1, 1).unwrap() + chrono::Duration::days(d),
            open,
            high,
            low,
            close,
            volume,
            trade_value: None,
        }
    }

    fn flat_benchmark(n: i64) -> BarSeries {
        let bars: Vec<Bar> = (0..n).map(|i| ohlc(i, dec!(1000), dec!(1000), dec!(1000), dec!(1000), dec!(1_000_000))).collect();
        BarSeries::from_unsorted(bars).0
    }

    #[test]
    fn bear_regime_stages_nothing_and_equity_stays_flat() {
        // Flat/declining benchmark with sma5 < sma50 and no macd confirmation
        // never clears the scale-factor gate, so no candidate is ever staged
        // and the only thing moving equity is the (absent) flow of cash.
        let mut series_by_symbol = HashMap::new();
        series_by_symbol.insert("BENCH".to_string(), (flat_benchmark(60), Market::Benchmark));
        let candidate: Vec<Bar> = (0..60).map(|i| ohlc(i, dec!(100), dec!(101), dec!(99), dec!(100), dec!(1_000_000))).collect();
        series_by_symbol.insert("A".to_string(), (BarSeries::from_unsorted(candidate).0, Market::DomesticRegular));

        let config = PullbackConfig {
            initial_capital: dec!(10_000_000),
            max_open_positions: 3,
            warmup_days: 55,
            benchmark_symbol: "BENCH".to_string(),
        };
        let result = PullbackOrchestrator::run(&series_by_symbol, &config);
        assert!(result.trades.is_empty());
        let first = result.equity_curve.first().unwrap().total_base_ccy_value;
        let last = result.equity_curve.last().unwrap().total_base_ccy_value;
        assert_eq!(first, last);
        assert_eq!(first, dec!(10_000_000));
    }

    #[test]
    fn missing_bar_for_a_held_symbol_is_skipped_without_panicking() {
        let mut series_by_symbol = HashMap::new();
        series_by_symbol.insert("BENCH".to_string(), (flat_benchmark(30), Market::Benchmark));
        let config = PullbackConfig {
            initial_capital: dec!(1_000_000),
            max_open_positions: 1,
            warmup_days: 0,
            benchmark_symbol: "BENCH".to_string(),
        };
        let result = PullbackOrchestrator::run(&series_by_symbol, &config);
        assert_eq!(result.equity_curve.len(), 30);
    }

    #[test]
    fn empty_warmup_window_returns_empty_result() {
        let mut series_by_symbol = HashMap::new();
        series_by_symbol.insert("BENCH".to_string(), (flat_benchmark(10), Market::Benchmark));
        let config = PullbackConfig {
            initial_capital: dec!(1_000_000),
            max_open_positions: 1,
            warmup_days: 1000,
            benchmark_symbol: "BENCH".to_string(),
        };
        let result = PullbackOrchestrator::run(&series_by_symbol, &config);
        assert!(result.equity_curve.is_empty());
    }
}
