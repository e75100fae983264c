//! Persisted run artefact (§6): the single JSON object written at the end
//! of a backtest or screener run to `cache/momentum/latest_result.json` /
//! `cache/screener/<strategy>_latest.json`, built from an atomic
//! write-temp-then-rename exactly like [`crate::infrastructure::bar_store`].

use crate::domain::errors::BarStoreError;
use crate::domain::performance::calculator::PerformanceAnalyzer;
use crate::domain::performance::metrics::PerformanceReport;
use crate::domain::regime::Regime;
use crate::domain::trading::{EquityPoint, TradeAction, TradeRecord};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegimeSummary {
    #[serde(rename = "BULL")]
    pub bull: usize,
    #[serde(rename = "BEAR")]
    pub bear: usize,
}

impl RegimeSummary {
    pub fn from_events(events: &[Regime]) -> Self {
        let mut summary = Self::default();
        for regime in events {
            match regime {
                Regime::Bull | Regime::Warning => summary.bull += 1,
                Regime::Bear => summary.bear += 1,
            }
        }
        summary
    }
}

pub fn trade_summary(trades: &[TradeRecord]) -> HashMap<String, usize> {
    let mut summary: HashMap<String, usize> = HashMap::new();
    for trade in trades {
        let key = match trade.action {
            TradeAction::Liquidate => "LIQUIDATE",
            TradeAction::NetSell => "NET_SELL",
            TradeAction::NetBuy => "NET_BUY",
        };
        *summary.entry(key.to_string()).or_insert(0) += 1;
    }
    summary
}

pub fn equity_curve_map(points: &[EquityPoint]) -> HashMap<String, Decimal> {
    points.iter().map(|p| (p.day.format("%Y-%m-%d").to_string(), p.total_base_ccy_value)).collect()
}

/// One entry of `global_allocation[]`: the resolved weight this run assigned
/// to one asset in the global-preset pipeline (§4.4/§4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalAllocationEntry {
    pub symbol: String,
    pub weight: Decimal,
}

/// The full persisted run artefact (§6). Domestic-mode runs leave the
/// `global_*` fields `None`; serialisation keeps them out of the emitted
/// JSON entirely rather than writing explicit nulls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunArtefact {
    pub timestamp: String,
    pub config: Value,
    pub metrics: PerformanceReport,
    pub equity_curve: HashMap<String, Decimal>,
    pub trade_summary: HashMap<String, usize>,
    pub regime_summary: RegimeSummary,
    pub elapsed_sec: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub benchmark_equity: Option<HashMap<String, Decimal>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub global_allocation: Option<Vec<GlobalAllocationEntry>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub regime_by_class: Option<HashMap<String, RegimeSummary>>,
}

#[allow(clippy::too_many_arguments)]
pub struct RunArtefactBuilder {
    pub timestamp: String,
    pub config: Value,
    pub equity_curve: Vec<EquityPoint>,
    pub trades: Vec<TradeRecord>,
    pub regimes: Vec<Regime>,
    pub risk_free_rate: Decimal,
    pub elapsed_sec: f64,
    pub benchmark_equity: Option<Vec<EquityPoint>>,
    pub global_allocation: Option<Vec<GlobalAllocationEntry>>,
    pub regime_by_class: Option<HashMap<String, Vec<Regime>>>,
}

impl RunArtefactBuilder {
    pub fn build(self) -> RunArtefact {
        let analyzer = PerformanceAnalyzer::new(self.risk_free_rate);
        let metrics = analyzer.analyze(&self.equity_curve, &self.regimes, &self.trades);
        RunArtefact {
            timestamp: self.timestamp,
            config: self.config,
            metrics,
            equity_curve: equity_curve_map(&self.equity_curve),
            trade_summary: trade_summary(&self.trades),
            regime_summary: RegimeSummary::from_events(&self.regimes),
            elapsed_sec: self.elapsed_sec,
            benchmark_equity: self.benchmark_equity.as_deref().map(equity_curve_map),
            global_allocation: self.global_allocation,
            regime_by_class: self.regime_by_class.map(|by_class| by_class.into_iter().map(|(k, events)| (k, RegimeSummary::from_events(&events))).collect()),
        }
    }
}

/// Generic write-temp-then-rename JSON save, shared by the backtest run
/// artefact and the screener's own result schema (§4.1, §9, §10).
pub async fn save_json<T: Serialize + Sync>(path: &Path, value: &T) -> Result<(), BarStoreError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(|e| BarStoreError::CacheIo {
            symbol: path.display().to_string(),
            reason: e.to_string(),
        })?;
    }
    let content = serde_json::to_string_pretty(value).map_err(|e| BarStoreError::CacheIo {
        symbol: path.display().to_string(),
        reason: e.to_string(),
    })?;
    let tmp_path = path.with_extension("tmp");
    tokio::fs::write(&tmp_path, content).await.map_err(|e| BarStoreError::CacheIo {
        symbol: path.display().to_string(),
        reason: e.to_string(),
    })?;
    tokio::fs::rename(&tmp_path, path).await.map_err(|e| BarStoreError::CacheIo {
        symbol: path.display().to_string(),
        reason: e.to_string(),
    })?;
    Ok(())
}

pub async fn load_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, BarStoreError> {
    let content = tokio::fs::read_to_string(path).await.map_err(|e| BarStoreError::CacheIo {
        symbol: path.display().to_string(),
        reason: e.to_string(),
    })?;
    serde_json::from_str(&content).map_err(|e| BarStoreError::CacheIo {
        symbol: path.display().to_string(),
        reason: e.to_string(),
    })
}

pub async fn save_artefact(path: &Path, artefact: &RunArtefact) -> Result<(), BarStoreError> {
    save_json(path, artefact).await
}

pub async fn load_artefact(path: &Path) -> Result<RunArtefact, BarStoreError> {
    load_json(path).await
}

/// Where a run's result artefact lands, per §6's cache layout and the
/// screener's `<strategy>_latest.json` naming convention.
pub fn momentum_result_path(cache_root: &Path) -> std::path::PathBuf {
    cache_root.join("momentum").join("latest_result.json")
}

pub fn screener_result_path(cache_root: &Path, strategy: &str) -> std::path::PathBuf {
    cache_root.join("screener").join(format!("{strategy}_latest.json"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market::Market;
    use crate::domain::trading::Currency;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicU64, Ordering};

    static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

    fn temp_dir() -> std::path::PathBuf {
        let unique = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
        std::env::temp_dir().join(format!("quantrade_persistence_test_{}_{}", std::process::id(), unique))
    }

    fn sample_equity() -> Vec<EquityPoint> {
        vec![
            EquityPoint {
                day: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
                total_base_ccy_value: dec!(1_000_000),
            },
            EquityPoint {
                day: NaiveDate::from_ymd_opt(2024, 1, 3).unwrap(),
                total_base_ccy_value: dec!(1_010_000),
            },
        ]
    }

    fn sample_trade() -> TradeRecord {
        TradeRecord {
            day: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            symbol: "005930".to_string(),
            action: TradeAction::NetBuy,
            signed_shares: dec!(10),
            market_price: dec!(70000),
            exec_price: dec!(70050),
            signed_base_ccy_amount: dec!(-700500),
            commission: dec!(105),
            slippage_cost: dec!(500),
            market: Market::DomesticRegular,
            currency: Currency::Krw,
        }
    }

    #[test]
    fn trade_summary_counts_by_action() {
        let trades = vec![sample_trade(), sample_trade()];
        let summary = trade_summary(&trades);
        assert_eq!(summary.get("NET_BUY"), Some(&2));
    }

    #[test]
    fn regime_summary_groups_warning_with_bull() {
        let events = vec![Regime::Bull, Regime::Warning, Regime::Bear];
        let summary = RegimeSummary::from_events(&events);
        assert_eq!(summary.bull, 2);
        assert_eq!(summary.bear, 1);
    }

    #[tokio::test]
    async fn save_then_load_round_trips_an_artefact() {
        let dir = temp_dir();
        let path = momentum_result_path(&dir);

        let artefact = RunArtefactBuilder {
            timestamp: "2024-01-03T00:00:00Z".to_string(),
            config: serde_json::json!({"top_n": 10}),
            equity_curve: sample_equity(),
            trades: vec![sample_trade()],
            regimes: vec![Regime::Bull],
            risk_free_rate: dec!(0.02),
            elapsed_sec: 1.5,
            benchmark_equity: None,
            global_allocation: None,
            regime_by_class: None,
        }
        .build();

        save_artefact(&path, &artefact).await.unwrap();
        let loaded = load_artefact(&path).await.unwrap();
        assert_eq!(loaded.timestamp, artefact.timestamp);
        assert_eq!(loaded.equity_curve.len(), 2);
        assert!(loaded.benchmark_equity.is_none());

        tokio::fs::remove_dir_all(&dir).await.ok();
    }

    #[test]
    fn global_mode_extras_are_omitted_when_absent() {
        let artefact = RunArtefactBuilder {
            timestamp: "2024-01-03T00:00:00Z".to_string(),
            config: serde_json::json!({}),
            equity_curve: sample_equity(),
            trades: vec![],
            regimes: vec![],
            risk_free_rate: dec!(0.02),
            elapsed_sec: 0.1,
            benchmark_equity: None,
            global_allocation: None,
            regime_by_class: None,
        }
        .build();
        let json = serde_json::to_string(&artefact).unwrap();
        assert!(!json.contains("benchmark_equity"));
        assert!(!json.contains("global_allocation"));
    }
}
