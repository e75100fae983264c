//! Hybrid vectorised/event-driven backtest loop (§4.8): advances the panel's
//! day index, triggers the Scorer → Rebalancer → PortfolioManager pipeline
//! on rebalance days, and records equity for both the strategy and a
//! parallel benchmark portfolio.

use crate::application::data_handler::{DataHandler, PanelView};
use crate::domain::errors::BacktestError;
use crate::domain::market::Market;
use crate::domain::market::indicators::return_n;
use crate::domain::regime::rebalancer::{RebalanceEvent, Rebalancer, WeightMethod};
use crate::domain::regime::{Regime, classify_domestic};
use crate::domain::scoring::global::{CASH_EQUIVALENT_TICKER, DOMESTIC_EQUITY_PROXY_TICKER, Preset, select_global_allocation};
use crate::domain::scoring::{ScoreInput, select_domestic_assets};
use crate::domain::trading::PortfolioManager;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use tracing::info;

pub(crate) const LIQUIDITY_THRESHOLD_DOMESTIC: Decimal = rust_decimal_macros::dec!(50_000_000_000);
const MONTHS_3: usize = 63;
const MONTHS_6: usize = 126;
const MONTHS_12: usize = 252;
const INV_VOL_WINDOW: usize = 20;

/// Which Scorer/Rebalancer pairing drives rebalance days.
pub enum RebalanceStrategy {
    DomesticMomentum {
        top_n: usize,
        weight_method: WeightMethod,
    },
    GlobalPreset {
        preset: Preset,
        kr_top_n: usize,
    },
}

pub struct BacktestConfig {
    pub initial_capital: Decimal,
    pub benchmark_weights: HashMap<String, Decimal>,
    pub risk_free_rate: Decimal,
    pub usdkrw: Decimal,
    pub warmup_days: usize,
    pub strategy: RebalanceStrategy,
}

pub struct RunResult {
    pub portfolio: PortfolioManager,
    pub benchmark: PortfolioManager,
    pub rebalance_events: Vec<RebalanceEvent>,
    pub regimes_observed: Vec<Regime>,
}

pub struct BacktestOrchestrator;

impl BacktestOrchestrator {
    pub fn run(data: &DataHandler, config: &BacktestConfig) -> Result<RunResult, BacktestError> {
        let window = data.backtest_window(config.warmup_days);
        if window.is_empty() {
            return Ok(RunResult {
                portfolio: PortfolioManager::new(config.initial_capital),
                benchmark: PortfolioManager::new(config.initial_capital),
                rebalance_events: Vec::new(),
                regimes_observed: Vec::new(),
            });
        }

        let month_end_set: HashSet<NaiveDate> = data.month_end_days().into_iter().collect();
        let markets = data.markets();
        let mut portfolio = PortfolioManager::new(config.initial_capital);
        let mut benchmark = PortfolioManager::new(config.initial_capital);
        let mut rebalance_events = Vec::new();
        let mut regimes_observed = Vec::new();

        let total = window.len();
        let mut last_decile_reported = 0usize;

        for (i, &day) in window.iter().enumerate() {
            let prices = data.current_prices(day);
            portfolio.record_daily_equity(day, &prices, markets, config.usdkrw);
            benchmark.record_daily_equity(day, &prices, markets, config.usdkrw);

            if month_end_set.contains(&day) {
                let view = data.view_at(day);
                match Self::decide_weights(data, &view, day, config) {
                    Ok((weights, event, regime)) => {
                        portfolio.execute_trades(day, &weights, &prices, markets, config.usdkrw)?;
                        portfolio.record_daily_equity(day, &prices, markets, config.usdkrw);
                        rebalance_events.push(event);
                        regimes_observed.push(regime);
                    }
                    Err(err) => {
                        tracing::warn!(%day, error = %err, "rebalance decision failed, holding prior weights");
                    }
                }
                benchmark.execute_trades(day, &config.benchmark_weights, &prices, markets, config.usdkrw)?;
                benchmark.record_daily_equity(day, &prices, markets, config.usdkrw);
            }

            let decile = (i + 1) * 10 / total;
            if decile > last_decile_reported {
                last_decile_reported = decile;
                info!(progress_pct = decile * 10, day = %day, "backtest progress");
            }
        }

        Ok(RunResult {
            portfolio,
            benchmark,
            rebalance_events,
            regimes_observed,
        })
    }

    fn decide_weights(
        data: &DataHandler,
        view: &PanelView,
        day: NaiveDate,
        config: &BacktestConfig,
    ) -> Result<(HashMap<String, Decimal>, RebalanceEvent, Regime), BacktestError> {
        match &config.strategy {
            RebalanceStrategy::DomesticMomentum { top_n, weight_method } => {
                let regime = classify_domestic(
                    view.benchmark_close.unwrap_or(Decimal::ZERO),
                    view.benchmark_sma200,
                );
                let candidates = score_inputs_with_history(data, view, day);
                let selected = select_domestic_assets(&candidates, LIQUIDITY_THRESHOLD_DOMESTIC, *top_n, config.risk_free_rate);
                let daily_returns = daily_returns_20d(data, day, &selected);
                let event = Rebalancer::assign_domestic_weights(day, &selected, regime, *weight_method, &daily_returns)?;
                let weights = event.target_weights.clone();
                Ok((weights, event, regime))
            }
            RebalanceStrategy::GlobalPreset { preset, kr_top_n } => {
                let scores: HashMap<String, ScoreInput> = view
                    .prices
                    .keys()
                    .map(|symbol| (symbol.clone(), score_input_for_history(data, view, day, symbol)))
                    .collect();
                let allocation = select_global_allocation(*preset, &scores, config.risk_free_rate);

                let domestic_candidates = score_inputs_with_history(data, view, day);
                let kr_selected = select_domestic_assets(&domestic_candidates, LIQUIDITY_THRESHOLD_DOMESTIC, *kr_top_n, config.risk_free_rate);

                let mut per_ticker_regime = HashMap::new();
                for symbol in allocation.ticker_weights.keys() {
                    if symbol == CASH_EQUIVALENT_TICKER || symbol == DOMESTIC_EQUITY_PROXY_TICKER {
                        continue;
                    }
                    let close = view.prices.get(symbol).copied().unwrap_or(Decimal::ZERO);
                    let sma200 = view.sma200.get(symbol).copied();
                    let regime = crate::domain::regime::classify_per_asset(symbol, CASH_EQUIVALENT_TICKER, close, sma200);
                    per_ticker_regime.insert(symbol.clone(), regime);
                }

                let event = Rebalancer::assign_global_weights(
                    day,
                    &allocation.ticker_weights,
                    &per_ticker_regime,
                    CASH_EQUIVALENT_TICKER,
                    DOMESTIC_EQUITY_PROXY_TICKER,
                    &kr_selected,
                );
                let weights = event.target_weights.clone();
                let overall_regime = if per_ticker_regime.values().all(|r| *r == Regime::Bear) {
                    Regime::Bear
                } else {
                    Regime::Bull
                };
                Ok((weights, event, overall_regime))
            }
        }
    }
}

/// `return_n` over three windows built from a trailing-close history slice
/// per symbol, used by callers (orchestrator/screener) that hold the full
/// panel history rather than a single `ViewAt` row.
pub fn score_input_with_history(adtv20: Option<Decimal>, trailing_closes: &[Decimal]) -> ScoreInput {
    ScoreInput {
        adtv20,
        r3: return_n(trailing_closes, MONTHS_3),
        r6: return_n(trailing_closes, MONTHS_6),
        r12: return_n(trailing_closes, MONTHS_12),
    }
}

pub(crate) fn score_input_for_history(data: &DataHandler, view: &PanelView, day: NaiveDate, symbol: &str) -> ScoreInput {
    let closes = data.trailing_closes(symbol, day);
    score_input_with_history(view.adtv20.get(symbol).copied(), &closes)
}

/// Builds `(symbol, ScoreInput)` pairs with real 3/6/12-month returns, pulling
/// each symbol's trailing-close history from the panel rather than the
/// single-row `ViewAt` snapshot.
pub(crate) fn score_inputs_with_history(data: &DataHandler, view: &PanelView, day: NaiveDate) -> Vec<(String, ScoreInput)> {
    view.prices
        .keys()
        .map(|symbol| (symbol.clone(), score_input_for_history(data, view, day, symbol)))
        .collect()
}

/// Last `INV_VOL_WINDOW` daily returns for each selected symbol, used by
/// `Rebalancer::assign_domestic_weights`'s inverse-volatility path. Symbols
/// with too short a history to produce at least one return are omitted,
/// which the rebalancer treats as a fall-back to equal weight for that name.
fn daily_returns_20d(data: &DataHandler, day: NaiveDate, selected: &[String]) -> HashMap<String, Vec<Decimal>> {
    selected
        .iter()
        .filter_map(|symbol| {
            let closes = data.trailing_closes(symbol, day);
            let window_start = closes.len().saturating_sub(INV_VOL_WINDOW + 1);
            let returns = crate::domain::market::indicators::pct_change(&closes[window_start..]);
            if returns.is_empty() {
                None
            } else {
                Some((symbol.clone(), returns))
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market::{Bar, BarSeries};
    use rust_decimal_macros::dec;

    fn bar(d: i64, close: Decimal) -> Bar {
        Bar {
            instant: NaiveDate::from_ymd_opt(2022, 1, 1).unwrap() + chrono::Duration::days(d),
            open: close,
            high: close,
            low: close,
            close,
            volume: dec!(1_000_000),
            trade_value: None,
        }
    }

    #[test]
    fn empty_window_returns_untouched_portfolios() {
        let mut map = HashMap::new();
        let bars: Vec<Bar> = (0..25).map(|i| bar(i, Decimal::from(100 + i))).collect();
        map.insert("A".to_string(), (BarSeries::from_unsorted(bars.clone()).0, Market::DomesticRegular));
        map.insert("BENCH".to_string(), (BarSeries::from_unsorted(bars).0, Market::Benchmark));
        let handler = DataHandler::rebuild(&map, "BENCH").unwrap();

        let config = BacktestConfig {
            initial_capital: dec!(1_000_000),
            benchmark_weights: HashMap::new(),
            risk_free_rate: Decimal::ZERO,
            usdkrw: Decimal::ONE,
            warmup_days: 1000, // larger than the panel, forces an empty window
            strategy: RebalanceStrategy::DomesticMomentum {
                top_n: 5,
                weight_method: WeightMethod::EqualWeight,
            },
        };
        let result = BacktestOrchestrator::run(&handler, &config).unwrap();
        assert_eq!(result.portfolio.equity_curve().len(), 0);
        assert!(result.rebalance_events.is_empty());
    }

    #[test]
    fn bear_regime_produces_bear_labelled_rebalance_event() {
        // Benchmark closes decline monotonically below a flat early SMA window,
        // so by the trigger day the regime classifies BEAR.
        let mut map = HashMap::new();
        let a_bars: Vec<Bar> = (0..230).map(|i| bar(i, dec!(100))).collect();
        let bench_bars: Vec<Bar> = (0..230)
            .map(|i| bar(i, if i < 210 { dec!(1000) } else { dec!(500) }))
            .collect();
        map.insert("A".to_string(), (BarSeries::from_unsorted(a_bars).0, Market::DomesticRegular));
        map.insert("BENCH".to_string(), (BarSeries::from_unsorted(bench_bars).0, Market::Benchmark));
        let handler = DataHandler::rebuild(&map, "BENCH").unwrap();

        let config = BacktestConfig {
            initial_capital: dec!(1_000_000),
            benchmark_weights: HashMap::new(),
            risk_free_rate: Decimal::ZERO,
            usdkrw: Decimal::ONE,
            warmup_days: 0,
            strategy: RebalanceStrategy::DomesticMomentum {
                top_n: 5,
                weight_method: WeightMethod::EqualWeight,
            },
        };
        let result = BacktestOrchestrator::run(&handler, &config).unwrap();
        assert!(result.regimes_observed.contains(&Regime::Bear));
    }

    /// Regression test for the momentum-scoring wiring: a symbol with a
    /// twelve-month losing streak must never survive the absolute-momentum
    /// gate, while a rising one with the same liquidity is selected.
    #[test]
    fn real_trailing_history_selects_the_winner_and_gates_out_the_loser() {
        let mut map = HashMap::new();
        let rising: Vec<Bar> = (0..260).map(|i| bar(i, Decimal::from(100_000 + i))).collect();
        let falling: Vec<Bar> = (0..260).map(|i| bar(i, Decimal::from(100_000 - i))).collect();
        let bench: Vec<Bar> = (0..260).map(|i| bar(i, dec!(1000))).collect();
        map.insert("WINNER".to_string(), (BarSeries::from_unsorted(rising).0, Market::DomesticRegular));
        map.insert("LOSER".to_string(), (BarSeries::from_unsorted(falling).0, Market::DomesticRegular));
        map.insert("BENCH".to_string(), (BarSeries::from_unsorted(bench).0, Market::Benchmark));
        let handler = DataHandler::rebuild(&map, "BENCH").unwrap();

        let config = BacktestConfig {
            initial_capital: dec!(1_000_000),
            benchmark_weights: HashMap::new(),
            risk_free_rate: Decimal::ZERO,
            usdkrw: Decimal::ONE,
            warmup_days: 0,
            strategy: RebalanceStrategy::DomesticMomentum {
                top_n: 5,
                weight_method: WeightMethod::EqualWeight,
            },
        };
        let result = BacktestOrchestrator::run(&handler, &config).unwrap();
        let last_event = result.rebalance_events.last().expect("at least one month-end rebalance fired");
        assert!(last_event.target_weights.contains_key("WINNER"));
        assert!(!last_event.target_weights.contains_key("LOSER"));
    }
}
