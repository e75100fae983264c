//! Cost-model overrides (§10 "cost overrides"): optional environment
//! overrides for the fixed per-market commission/slippage figures in
//! [`crate::domain::trading::fees::cost_params_for`]. `None` means "use the
//! platform default for that market" (§4.6).

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use std::env;

#[derive(Debug, Clone, Default)]
pub struct CostOverrideEnvConfig {
    pub domestic_commission: Option<Decimal>,
    pub domestic_slippage: Option<Decimal>,
    pub global_commission: Option<Decimal>,
    pub global_slippage: Option<Decimal>,
}

fn parse_optional_decimal(var: &str) -> Result<Option<Decimal>> {
    match env::var(var) {
        Ok(raw) => Ok(Some(raw.parse::<Decimal>().with_context(|| format!("parsing {var}"))?)),
        Err(_) => Ok(None),
    }
}

impl CostOverrideEnvConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            domestic_commission: parse_optional_decimal("COST_DOMESTIC_COMMISSION")?,
            domestic_slippage: parse_optional_decimal("COST_DOMESTIC_SLIPPAGE")?,
            global_commission: parse_optional_decimal("COST_GLOBAL_COMMISSION")?,
            global_slippage: parse_optional_decimal("COST_GLOBAL_SLIPPAGE")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_env_vars_yield_all_none() {
        let cfg = CostOverrideEnvConfig::default();
        assert!(cfg.domestic_commission.is_none());
        assert!(cfg.global_slippage.is_none());
    }
}
