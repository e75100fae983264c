//! Weight assignment (§4.5): turns a selected-instrument list plus regime
//! classification into a target-weight map, and records the decision as a
//! [`RebalanceEvent`] for audit/reporting.

use super::Regime;
use crate::domain::errors::BacktestError;
use crate::domain::market::indicators::std_dev;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WeightMethod {
    EqualWeight,
    InverseVolatility,
}

impl std::str::FromStr for WeightMethod {
    type Err = BacktestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "equal_weight" => Ok(WeightMethod::EqualWeight),
            "inverse_volatility" => Ok(WeightMethod::InverseVolatility),
            other => Err(BacktestError::UnsupportedWeightMethod {
                name: other.to_string(),
            }),
        }
    }
}

/// `(day, regime_label, weight_method, n_selected, per_ticker_regime?, target_weights)` (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebalanceEvent {
    pub day: NaiveDate,
    pub regime_label: Regime,
    pub weight_method: WeightMethod,
    pub n_selected: usize,
    pub per_ticker_regime: Option<HashMap<String, Regime>>,
    pub target_weights: HashMap<String, Decimal>,
}

const WEIGHT_SUM_EPSILON: Decimal = Decimal::from_parts(1, 0, 0, false, 6); // 1e-6

pub struct Rebalancer;

impl Rebalancer {
    /// Domestic weight assignment (§4.5). `daily_returns_20d` must hold at
    /// least the last 20 trading days of returns per selected symbol for the
    /// `InverseVolatility` path; entries missing or too short are dropped
    /// from that method (and the whole selection falls back to equal
    /// weight if none qualify).
    pub fn assign_domestic_weights(
        day: NaiveDate,
        selected: &[String],
        regime: Regime,
        method: WeightMethod,
        daily_returns_20d: &HashMap<String, Vec<Decimal>>,
    ) -> Result<RebalanceEvent, BacktestError> {
        let mut weights = HashMap::new();
        if regime.is_bear() || selected.is_empty() {
            let event = RebalanceEvent {
                day,
                regime_label: regime,
                weight_method: method,
                n_selected: selected.len(),
                per_ticker_regime: None,
                target_weights: weights,
            };
            return Ok(event);
        }

        match method {
            WeightMethod::EqualWeight => {
                let w = Decimal::ONE / Decimal::from(selected.len());
                for symbol in selected {
                    weights.insert(symbol.clone(), w);
                }
            }
            WeightMethod::InverseVolatility => {
                let mut inv_vols: HashMap<String, Decimal> = HashMap::new();
                for symbol in selected {
                    let Some(returns) = daily_returns_20d.get(symbol) else {
                        continue;
                    };
                    let Some(sigma) = std_dev(returns, true) else {
                        continue;
                    };
                    if sigma.is_zero() {
                        continue;
                    }
                    inv_vols.insert(symbol.clone(), Decimal::ONE / sigma);
                }
                if inv_vols.is_empty() {
                    warn!("no valid volatility estimates, falling back to equal weight");
                    let w = Decimal::ONE / Decimal::from(selected.len());
                    for symbol in selected {
                        weights.insert(symbol.clone(), w);
                    }
                } else {
                    let total: Decimal = inv_vols.values().sum();
                    for (symbol, inv_vol) in inv_vols {
                        weights.insert(symbol, inv_vol / total);
                    }
                }
            }
        }

        let sum: Decimal = weights.values().sum();
        if sum > Decimal::ONE + WEIGHT_SUM_EPSILON {
            return Err(BacktestError::WeightsExceedOne { sum });
        }
        info!(%day, %regime, n = weights.len(), "domestic rebalance weights assigned");
        Ok(RebalanceEvent {
            day,
            regime_label: regime,
            weight_method: method,
            n_selected: selected.len(),
            per_ticker_regime: None,
            target_weights: weights,
        })
    }

    /// Global weight assignment (§4.5). `scorer_weights` is the Scorer's
    /// per-ticker allocation (non-cash ETFs plus the domestic-equity-proxy
    /// ticker and `cash_equivalent_ticker`, summing to ~1). `per_ticker_regime`
    /// classifies every non-proxy, non-cash ticker. `kr_top_n` is the
    /// domestic Scorer's selection to expand the proxy weight into.
    pub fn assign_global_weights(
        day: NaiveDate,
        scorer_weights: &HashMap<String, Decimal>,
        per_ticker_regime: &HashMap<String, Regime>,
        cash_equivalent_ticker: &str,
        domestic_equity_proxy_ticker: &str,
        kr_top_n: &[String],
    ) -> RebalanceEvent {
        let mut weights = scorer_weights.clone();

        // Move any non-cash, BEAR-regime ETF's weight to the cash-equivalent ticker.
        let mut cash_weight = weights.remove(cash_equivalent_ticker).unwrap_or(Decimal::ZERO);
        let symbols: Vec<String> = weights.keys().cloned().collect();
        for symbol in symbols {
            if symbol == domestic_equity_proxy_ticker {
                continue;
            }
            if matches!(per_ticker_regime.get(&symbol), Some(Regime::Bear)) {
                if let Some(w) = weights.remove(&symbol) {
                    cash_weight += w;
                }
            }
        }
        weights.insert(cash_equivalent_ticker.to_string(), cash_weight);

        // Expand the domestic-equity proxy into the kr_top_n list, or keep it if empty.
        if let Some(proxy_weight) = weights.remove(domestic_equity_proxy_ticker) {
            if kr_top_n.is_empty() {
                weights.insert(domestic_equity_proxy_ticker.to_string(), proxy_weight);
            } else {
                let per_ticker = proxy_weight / Decimal::from(kr_top_n.len());
                for symbol in kr_top_n {
                    *weights.entry(symbol.clone()).or_insert(Decimal::ZERO) += per_ticker;
                }
            }
        }

        let total: Decimal = weights.values().sum();
        if total > Decimal::ZERO {
            for w in weights.values_mut() {
                *w /= total;
            }
        }

        info!(%day, n = weights.len(), "global rebalance weights assigned");
        RebalanceEvent {
            day,
            regime_label: Regime::Bull, // global mode carries regime per-asset, not a single label
            weight_method: WeightMethod::EqualWeight,
            n_selected: weights.len(),
            per_ticker_regime: Some(per_ticker_regime.clone()),
            target_weights: weights,
        }
    }
}
