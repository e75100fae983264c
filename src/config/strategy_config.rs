//! Strategy selection and its tuning parameters (§10), parsed from
//! environment variables.

use crate::domain::regime::rebalancer::WeightMethod;
use crate::domain::scoring::global::Preset;
use anyhow::{Context, Result};
use rust_decimal::Decimal;
use std::env;
use std::str::FromStr;

/// Which pipeline a run drives (§4.4, §4.7, §4.8): the domestic-only
/// dual-momentum screen, the global multi-asset preset allocator, or one of
/// the two daily-loop AlphaFilter strategies (Pullback, Swing), both driven
/// by their own orchestrator rather than the month-end `BacktestOrchestrator`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    DomesticMomentum,
    GlobalPreset,
    Pullback,
    Swing,
}

impl FromStr for StrategyKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "domestic_momentum" => Ok(StrategyKind::DomesticMomentum),
            "global_preset" => Ok(StrategyKind::GlobalPreset),
            "pullback" => Ok(StrategyKind::Pullback),
            "swing" => Ok(StrategyKind::Swing),
            other => anyhow::bail!("unknown STRATEGY: {other}, expected domestic_momentum, global_preset, pullback, or swing"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StrategyEnvConfig {
    pub kind: StrategyKind,
    pub top_n: usize,
    pub weight_method: WeightMethod,
    pub min_trading_value: Decimal,
    pub preset: Preset,
}

impl StrategyEnvConfig {
    pub fn from_env() -> Result<Self> {
        let kind_str = env::var("STRATEGY").unwrap_or_else(|_| "domestic_momentum".to_string());
        let kind = StrategyKind::from_str(&kind_str).context("parsing STRATEGY")?;

        let top_n = env::var("TOP_N")
            .unwrap_or_else(|_| "10".to_string())
            .parse::<usize>()
            .context("parsing TOP_N")?;

        let weight_method_str = env::var("WEIGHT_METHOD").unwrap_or_else(|_| "equal_weight".to_string());
        let weight_method = WeightMethod::from_str(&weight_method_str).context("parsing WEIGHT_METHOD")?;

        let min_trading_value = env::var("MIN_TRADING_VALUE")
            .unwrap_or_else(|_| "50000000000".to_string())
            .parse::<Decimal>()
            .context("parsing MIN_TRADING_VALUE")?;

        let preset_str = env::var("PRESET").unwrap_or_else(|_| "balanced".to_string());
        let preset = Preset::from_str(&preset_str).map_err(|e| anyhow::anyhow!(e.to_string())).context("parsing PRESET")?;

        Ok(Self {
            kind,
            top_n,
            weight_method,
            min_trading_value,
            preset,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_kind_rejects_unknown_values() {
        assert!(StrategyKind::from_str("nonsense").is_err());
    }

    #[test]
    fn strategy_kind_accepts_all_known_values() {
        assert!(matches!(StrategyKind::from_str("domestic_momentum").unwrap(), StrategyKind::DomesticMomentum));
        assert!(matches!(StrategyKind::from_str("global_preset").unwrap(), StrategyKind::GlobalPreset));
        assert!(matches!(StrategyKind::from_str("pullback").unwrap(), StrategyKind::Pullback));
        assert!(matches!(StrategyKind::from_str("swing").unwrap(), StrategyKind::Swing));
    }
}
