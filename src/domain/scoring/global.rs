//! Global multi-asset preset allocation (§4.4 steps 1-4). Presets and
//! category/ticker tables are fixed platform knowledge (§10 configuration
//! notes), declared as consts rather than re-parsed from config at runtime.
//!
//! Ticker universe and preset weights are reconciled against the real
//! asset-class registry (see `DESIGN.md`'s grounding entry for this file):
//! `GlobalEquity` (`SPY`/`IWM`/`EFA`/`EEM`), `Bonds` (`AGG`/`IEF`/`TLT`/
//! `TIP`), `Commodities` (`VNQ`/`DBC`/`GLD`), `DomesticEquity` (the
//! Korean-equity proxy ticker), and `Cash` (absorbs the registry's
//! `domestic_bond` + `cash` categories, both of which resolve to the same
//! cash-equivalent ticker upstream).

use super::ScoreInput;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use tracing::info;

/// The cash-equivalent ticker that absorbs diverted BEAR-regime weight
/// (§4.4 step 2, §4.5).
pub const CASH_EQUIVALENT_TICKER: &str = "SHY";

/// A synthetic ticker standing in for "run the domestic Scorer and expand
/// this weight across its `kr_top_n` output" (§4.4 step 3). Never priced or
/// traded directly; `Rebalancer::assign_global_weights` always expands or
/// removes it before the weights reach `PortfolioManager`.
pub const DOMESTIC_EQUITY_PROXY_TICKER: &str = "KR_EQUITY_PROXY";

/// Mirrors the 5-category breakdown this platform's global ETF universe is
/// organised around: `equity` (ex-Korea), `alternative` (real assets),
/// `foreign_bond`, `domestic_bond` and `cash`. `domestic_bond` and `cash`
/// both resolve to the same cash-equivalent ticker, so they are folded into
/// a single [`AssetCategory::Cash`] bucket here rather than scored twice;
/// `DomesticEquity` is the Korean-equity slice of the `equity` category,
/// broken out on its own because it never trades as an ETF — it always
/// expands into the domestic Scorer's `kr_top_n` picks (§4.4 step 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetCategory {
    GlobalEquity,
    Bonds,
    Commodities,
    DomesticEquity,
    Cash,
}

const GLOBAL_EQUITY_TICKERS: &[&str] = &["SPY", "IWM", "EFA", "EEM"];
const BOND_TICKERS: &[&str] = &["AGG", "IEF", "TLT", "TIP"];
const COMMODITY_TICKERS: &[&str] = &["VNQ", "DBC", "GLD"];

pub fn category_tickers(category: AssetCategory) -> &'static [&'static str] {
    match category {
        AssetCategory::GlobalEquity => GLOBAL_EQUITY_TICKERS,
        AssetCategory::Bonds => BOND_TICKERS,
        AssetCategory::Commodities => COMMODITY_TICKERS,
        AssetCategory::DomesticEquity | AssetCategory::Cash => &[],
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Preset {
    Growth,
    GrowthSeeking,
    Balanced,
    StabilitySeeking,
    Stable,
}

impl std::str::FromStr for Preset {
    type Err = crate::domain::errors::BacktestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "growth" => Ok(Preset::Growth),
            "growth_seeking" => Ok(Preset::GrowthSeeking),
            "balanced" => Ok(Preset::Balanced),
            "stability_seeking" => Ok(Preset::StabilitySeeking),
            "stable" => Ok(Preset::Stable),
            other => Err(crate::domain::errors::BacktestError::UnknownPreset {
                name: other.to_string(),
            }),
        }
    }
}

/// Per-category strategic weights, summing to 1 (§4.4). Reconciled against
/// the real preset table (`equity`/`alternative`/`foreign_bond`/
/// `domestic_bond`/`cash`): each preset's `equity` weight is split 4/5 into
/// `GlobalEquity` and 1/5 into `DomesticEquity` (the Korean-equity ticker is
/// one of five names scored inside that source category), and its
/// `domestic_bond` + `cash` weights are summed directly into `Cash` (both
/// resolve to the same cash-equivalent ticker there, with no momentum
/// scoring in between).
pub fn preset_weights(preset: Preset) -> HashMap<AssetCategory, Decimal> {
    use AssetCategory::*;
    let table: [(AssetCategory, Decimal); 5] = match preset {
        // source: equity .55, alternative .25, foreign_bond .15, domestic_bond .00, cash .05
        Preset::Growth => [
            (GlobalEquity, dec!(0.44)),
            (DomesticEquity, dec!(0.11)),
            (Bonds, dec!(0.15)),
            (Commodities, dec!(0.25)),
            (Cash, dec!(0.05)),
        ],
        // source: equity .50, alternative .15, foreign_bond .20, domestic_bond .05, cash .10
        Preset::GrowthSeeking => [
            (GlobalEquity, dec!(0.40)),
            (DomesticEquity, dec!(0.10)),
            (Bonds, dec!(0.20)),
            (Commodities, dec!(0.15)),
            (Cash, dec!(0.15)),
        ],
        // source: equity .35, alternative .15, foreign_bond .30, domestic_bond .10, cash .10
        Preset::Balanced => [
            (GlobalEquity, dec!(0.28)),
            (DomesticEquity, dec!(0.07)),
            (Bonds, dec!(0.30)),
            (Commodities, dec!(0.15)),
            (Cash, dec!(0.20)),
        ],
        // source: equity .20, alternative .10, foreign_bond .35, domestic_bond .25, cash .10
        Preset::StabilitySeeking => [
            (GlobalEquity, dec!(0.16)),
            (DomesticEquity, dec!(0.04)),
            (Bonds, dec!(0.35)),
            (Commodities, dec!(0.10)),
            (Cash, dec!(0.35)),
        ],
        // source: equity .10, alternative .05, foreign_bond .50, domestic_bond .25, cash .10
        Preset::Stable => [
            (GlobalEquity, dec!(0.08)),
            (DomesticEquity, dec!(0.02)),
            (Bonds, dec!(0.50)),
            (Commodities, dec!(0.05)),
            (Cash, dec!(0.35)),
        ],
    };
    table.into_iter().collect()
}

/// Output of the global selection path: a ticker-level weight map
/// (including the cash-equivalent and domestic-equity-proxy tickers, both
/// still subject to Rebalancer expansion/diversion) plus the domestic
/// Scorer's own selection to carry forward for the proxy expansion.
#[derive(Debug, Clone)]
pub struct GlobalAllocation {
    pub ticker_weights: HashMap<String, Decimal>,
}

/// `scores` must have an entry for every ticker named in the category
/// tables that is present in the global ETF panel; tickers absent from
/// `scores` are treated as absent from the panel (§4.4 step 2: "enumerate
/// the category's tickers that exist in the panel").
pub fn select_global_allocation(
    preset: Preset,
    scores: &HashMap<String, ScoreInput>,
    risk_free_rate: Decimal,
) -> GlobalAllocation {
    let weights_by_category = preset_weights(preset);
    let mut ticker_weights: HashMap<String, Decimal> = HashMap::new();
    let mut cash_weight = Decimal::ZERO;

    for (category, category_weight) in &weights_by_category {
        if *category == AssetCategory::DomesticEquity {
            ticker_weights.insert(
                DOMESTIC_EQUITY_PROXY_TICKER.to_string(),
                *category_weight,
            );
            continue;
        }
        if *category == AssetCategory::Cash {
            // domestic_bond + cash route straight to the cash-equivalent
            // ticker in the source platform too (both categories map to a
            // single-ticker list there); no momentum scoring applies.
            cash_weight += *category_weight;
            continue;
        }
        let present: Vec<&str> = category_tickers(*category)
            .iter()
            .copied()
            .filter(|t| scores.contains_key(*t))
            .collect();
        if present.is_empty() {
            cash_weight += *category_weight;
            continue;
        }

        let mut passing: Vec<(String, Decimal)> = Vec::new();
        let mut fail_count = 0usize;
        for ticker in &present {
            let input = &scores[*ticker];
            let score = super::blended_score(input);
            let gated = super::apply_absolute_momentum_gate(score, input.r12, risk_free_rate);
            match gated {
                Some(s) => passing.push((ticker.to_string(), s)),
                None => fail_count += 1,
            }
        }

        let fail_fraction = Decimal::from(fail_count) / Decimal::from(present.len());
        cash_weight += *category_weight * fail_fraction;

        if passing.is_empty() {
            continue;
        }
        let remaining_weight = *category_weight * (Decimal::ONE - fail_fraction);
        // Proportion by a shifted-positive score so equal scores => equal weight.
        let min_score = passing.iter().map(|(_, s)| *s).min().unwrap_or(Decimal::ZERO);
        let epsilon = dec!(0.0001);
        let shifted: Vec<(String, Decimal)> = passing
            .into_iter()
            .map(|(t, s)| (t, s - min_score + epsilon))
            .collect();
        let shifted_total: Decimal = shifted.iter().map(|(_, s)| *s).sum();
        for (ticker, shifted_score) in shifted {
            let weight = remaining_weight * shifted_score / shifted_total;
            *ticker_weights.entry(ticker).or_insert(Decimal::ZERO) += weight;
        }
    }

    *ticker_weights
        .entry(CASH_EQUIVALENT_TICKER.to_string())
        .or_insert(Decimal::ZERO) += cash_weight;

    let total: Decimal = ticker_weights.values().sum();
    if total > Decimal::ZERO {
        for w in ticker_weights.values_mut() {
            *w /= total;
        }
    }

    info!(preset = ?preset, n_tickers = ticker_weights.len(), "global allocation computed");
    GlobalAllocation { ticker_weights }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn passing_input() -> ScoreInput {
        ScoreInput {
            adtv20: None,
            r3: Some(dec!(0.1)),
            r6: Some(dec!(0.1)),
            r12: Some(dec!(0.1)),
        }
    }

    fn failing_input() -> ScoreInput {
        ScoreInput {
            adtv20: None,
            r3: Some(dec!(-0.1)),
            r6: Some(dec!(-0.1)),
            r12: Some(dec!(-0.1)),
        }
    }

    #[test]
    fn weights_sum_to_one() {
        let mut scores = HashMap::new();
        for t in GLOBAL_EQUITY_TICKERS {
            scores.insert(t.to_string(), passing_input());
        }
        for t in BOND_TICKERS {
            scores.insert(t.to_string(), passing_input());
        }
        for t in COMMODITY_TICKERS {
            scores.insert(t.to_string(), passing_input());
        }
        let allocation = select_global_allocation(Preset::Growth, &scores, Decimal::ZERO);
        let total: Decimal = allocation.ticker_weights.values().sum();
        assert!((total - Decimal::ONE).abs() < dec!(0.0001));
    }

    #[test]
    fn failing_momentum_diverts_weight_to_cash() {
        let mut scores = HashMap::new();
        scores.insert("SPY".to_string(), failing_input());
        scores.insert("IWM".to_string(), passing_input());
        let allocation = select_global_allocation(Preset::Growth, &scores, Decimal::ZERO);
        assert!(!allocation.ticker_weights.contains_key("SPY"));
        assert!(allocation.ticker_weights[CASH_EQUIVALENT_TICKER] > Decimal::ZERO);
    }

    #[test]
    fn domestic_equity_category_becomes_proxy_ticker() {
        let scores = HashMap::new();
        let allocation = select_global_allocation(Preset::Balanced, &scores, Decimal::ZERO);
        assert!(allocation.ticker_weights.contains_key(DOMESTIC_EQUITY_PROXY_TICKER));
    }
}
