//! Point-in-time screener (§4.10, C10): the same Scorer → Rebalancer
//! pipeline a backtest drives day by day, evaluated once at the panel's
//! last available row and short-circuited after target weights are
//! assigned — no `PortfolioManager` execution, no performance report.

use crate::application::data_handler::DataHandler;
use crate::application::orchestrator::{LIQUIDITY_THRESHOLD_DOMESTIC, score_inputs_with_history};
use crate::domain::errors::BacktestError;
use crate::domain::regime::classify_domestic;
use crate::domain::regime::rebalancer::{RebalanceEvent, Rebalancer, WeightMethod};
use crate::domain::scoring::{ScoreInput, UniverseEntry, score_universe, select_domestic_assets};
use crate::infrastructure::persistence::{save_json, screener_result_path};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

/// The combined screener result persisted to `cache/screener/<strategy>_latest.json`
/// (§4.10 step 5): the full diagnostic universe, the Top-N selection, the
/// resolved target weights, and the regime label, all for one reference day.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenerResult {
    pub reference_day: NaiveDate,
    pub universe: Vec<ScreenerUniverseEntry>,
    pub selected: Vec<String>,
    pub target_weights: HashMap<String, Decimal>,
    pub regime: String,
}

/// [`UniverseEntry`] translated into an owned, serialisable record — the
/// domain type holds `Decimal`s that already serialise, but keeping a
/// dedicated wire type here keeps the domain layer free of `serde`
/// dependencies it doesn't otherwise need.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenerUniverseEntry {
    pub symbol: String,
    pub adtv20: Option<Decimal>,
    pub r3: Option<Decimal>,
    pub r6: Option<Decimal>,
    pub r12: Option<Decimal>,
    pub score: Option<Decimal>,
    pub passes: bool,
    pub rank: Option<usize>,
    pub reason: String,
}

impl From<UniverseEntry> for ScreenerUniverseEntry {
    fn from(e: UniverseEntry) -> Self {
        Self {
            symbol: e.symbol,
            adtv20: e.adtv20,
            r3: e.r3,
            r6: e.r6,
            r12: e.r12,
            score: e.score,
            passes: e.passes,
            rank: e.rank,
            reason: e.reason,
        }
    }
}

pub struct Screener;

impl Screener {
    /// Runs the domestic dual-momentum screen at the panel's most recent
    /// day and returns the combined diagnostic result, without persisting
    /// it (§4.10 steps 1-4; step 5 is [`Self::run_and_persist`]).
    pub fn run(data: &DataHandler, top_n: usize, weight_method: WeightMethod, risk_free_rate: Decimal) -> Result<ScreenerResult, BacktestError> {
        let Some(&reference_day) = data.days().last() else {
            return Ok(ScreenerResult {
                reference_day: NaiveDate::from_ymd_opt(1970, 1, 1).expect("1970-01-01 is a valid date"),
                universe: Vec::new(),
                selected: Vec::new(),
                target_weights: HashMap::new(),
                regime: "UNKNOWN".to_string(),
            });
        };
        let view = data.view_at(reference_day);
        let candidates: Vec<(String, ScoreInput)> = score_inputs_with_history(data, &view, reference_day);

        let universe = score_universe(&candidates, LIQUIDITY_THRESHOLD_DOMESTIC, risk_free_rate);
        for entry in &universe {
            info!(symbol = %entry.symbol, passes = entry.passes, rank = ?entry.rank, reason = %entry.reason, "screener candidate diagnostic");
        }

        let selected = select_domestic_assets(&candidates, LIQUIDITY_THRESHOLD_DOMESTIC, top_n, risk_free_rate);

        let regime = classify_domestic(view.benchmark_close.unwrap_or(Decimal::ZERO), view.benchmark_sma200);
        let daily_returns: HashMap<String, Vec<Decimal>> = selected
            .iter()
            .filter_map(|symbol| {
                let closes = data.trailing_closes(symbol, reference_day);
                if closes.len() < 2 {
                    return None;
                }
                let returns = crate::domain::market::indicators::pct_change(&closes);
                if returns.is_empty() { None } else { Some((symbol.clone(), returns)) }
            })
            .collect();
        let event: RebalanceEvent = Rebalancer::assign_domestic_weights(reference_day, &selected, regime, weight_method, &daily_returns)?;

        Ok(ScreenerResult {
            reference_day,
            universe: universe.into_iter().map(ScreenerUniverseEntry::from).collect(),
            selected,
            target_weights: event.target_weights,
            regime: regime.to_string(),
        })
    }

    pub async fn run_and_persist(
        data: &DataHandler,
        top_n: usize,
        weight_method: WeightMethod,
        risk_free_rate: Decimal,
        cache_root: &Path,
        strategy_name: &str,
    ) -> Result<ScreenerResult, BacktestError> {
        let result = Self::run(data, top_n, weight_method, risk_free_rate)?;
        let path = screener_result_path(cache_root, strategy_name);
        if let Err(err) = save_json(&path, &result).await {
            tracing::warn!(error = %err, "failed to persist screener result");
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market::{Bar, BarSeries, Market};
    use rust_decimal_macros::dec;
    use std::collections::HashMap as Map;

    fn bar(d: i64, close: Decimal, volume: Decimal) -> Bar {
        Bar {
            instant: NaiveDate::from_ymd_opt(2022, 1, 1).unwrap() + chrono::Duration::days(d),
            open: close,
            high: close,
            low: close,
            close,
            volume,
            trade_value: None,
        }
    }

    fn handler_with_one_liquid_winner() -> DataHandler {
        let mut map = Map::new();
        // 400 days of steady appreciation, ample volume: a clear
        // absolute-momentum-passing, liquid winner.
        let bars: Vec<Bar> = (0..400).map(|i| bar(i, Decimal::from(100) + Decimal::from(i) / Decimal::from(10), dec!(1_000_000_000))).collect();
        map.insert("WINNER".to_string(), (BarSeries::from_unsorted(bars).0, Market::DomesticRegular));
        let bench_bars: Vec<Bar> = (0..400).map(|i| bar(i, Decimal::from(1000 + i), dec!(1))).collect();
        map.insert("BENCH".to_string(), (BarSeries::from_unsorted(bench_bars).0, Market::Benchmark));
        DataHandler::rebuild(&map, "BENCH").unwrap()
    }

    #[test]
    fn screener_selects_the_liquid_winner_and_reports_its_rank() {
        let handler = handler_with_one_liquid_winner();
        let result = Screener::run(&handler, 10, WeightMethod::EqualWeight, dec!(0.02)).unwrap();

        assert!(result.selected.contains(&"WINNER".to_string()));
        let winner_entry = result.universe.iter().find(|e| e.symbol == "WINNER").unwrap();
        assert_eq!(winner_entry.rank, Some(1));
        assert!(winner_entry.passes);
        assert!((result.target_weights.values().copied().sum::<Decimal>() - Decimal::ONE).abs() < dec!(0.0001));
    }

    #[test]
    fn empty_panel_yields_empty_result_without_panicking() {
        let map: Map<String, (BarSeries, Market)> = Map::new();
        let handler = DataHandler::rebuild(&map, "BENCH").unwrap();
        let result = Screener::run(&handler, 10, WeightMethod::EqualWeight, dec!(0.02)).unwrap();
        assert!(result.selected.is_empty());
    }
}
