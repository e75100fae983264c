//! Configuration module, composing a `Config` from per-concern sub-configs
//! (§10): trade-date range and capital, the
//! strategy selection and its parameters, cost overrides, and the cache
//! directory root.

mod broker_config;
mod cost_config;
mod strategy_config;

pub use broker_config::{DaishinBridgeEnvConfig, KiwoomEnvConfig};
pub use cost_config::CostOverrideEnvConfig;
pub use strategy_config::{StrategyEnvConfig, StrategyKind};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::env;
use std::path::PathBuf;

/// Main run configuration, aggregating every sub-config plus the core
/// capital/date-range/cache-root settings that don't belong to any one
/// sub-config.
#[derive(Debug, Clone)]
pub struct Config {
    pub initial_capital: Decimal,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub risk_free_rate: Decimal,
    pub usdkrw: Decimal,
    pub warmup_days: usize,
    pub cache_root: PathBuf,

    pub strategy: StrategyEnvConfig,
    pub cost_overrides: CostOverrideEnvConfig,
    pub kiwoom: KiwoomEnvConfig,
    pub daishin_bridge: DaishinBridgeEnvConfig,
}

fn parse_date(var: &str, default: &str) -> Result<NaiveDate> {
    let raw = env::var(var).unwrap_or_else(|_| default.to_string());
    NaiveDate::parse_from_str(&raw, "%Y-%m-%d").with_context(|| format!("parsing {var} (expected YYYY-MM-DD)"))
}

impl Config {
    /// Loads configuration from environment variables, reading a `.env`
    /// file first when present (§10). Missing variables fall back to
    /// sensible platform defaults rather than failing the run.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let initial_capital = env::var("INITIAL_CAPITAL")
            .unwrap_or_else(|_| "100000000".to_string())
            .parse::<Decimal>()
            .context("parsing INITIAL_CAPITAL")?;

        let start_date = parse_date("START_DATE", "2015-01-01")?;
        let end_date = parse_date("END_DATE", "2024-12-31")?;
        if start_date >= end_date {
            anyhow::bail!("START_DATE {start_date} must be before END_DATE {end_date}");
        }

        let risk_free_rate = env::var("RISK_FREE_RATE")
            .unwrap_or_else(|_| "0.03".to_string())
            .parse::<Decimal>()
            .context("parsing RISK_FREE_RATE")?;

        let usdkrw = env::var("USDKRW")
            .unwrap_or_else(|_| "1350.0".to_string())
            .parse::<Decimal>()
            .context("parsing USDKRW")?;

        let warmup_days = env::var("WARMUP_DAYS")
            .unwrap_or_else(|_| "252".to_string())
            .parse::<usize>()
            .context("parsing WARMUP_DAYS")?;

        let cache_root = PathBuf::from(env::var("CACHE_ROOT").unwrap_or_else(|_| "cache".to_string()));

        let strategy = StrategyEnvConfig::from_env().context("loading strategy config")?;
        let cost_overrides = CostOverrideEnvConfig::from_env().context("loading cost override config")?;
        let kiwoom = KiwoomEnvConfig::from_env();
        let daishin_bridge = DaishinBridgeEnvConfig::from_env();

        Ok(Self {
            initial_capital,
            start_date,
            end_date,
            risk_free_rate,
            usdkrw,
            warmup_days,
            cache_root,
            strategy,
            cost_overrides,
            kiwoom,
            daishin_bridge,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_date_falls_back_to_default_when_unset() {
        // Precondition of the test harness: this variable is not set by the
        // test runner's environment.
        env::remove_var("QUANTRADE_TEST_UNSET_DATE");
        let d = parse_date("QUANTRADE_TEST_UNSET_DATE", "2020-06-15").unwrap();
        assert_eq!(d, NaiveDate::from_ymd_opt(2020, 6, 15).unwrap());
    }
}
