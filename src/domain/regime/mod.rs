//! Market-regime classification and weight assignment (§4.5).

pub mod rebalancer;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub use rebalancer::{RebalanceEvent, Rebalancer, WeightMethod};

/// A discrete market-state classification driving position sizing or
/// weight zeroing (glossary: Regime).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Regime {
    Bull,
    /// Downscale-but-not-zero state produced only by the stricter
    /// SMA(5)/SMA(50)/MACD classifier (§4.5); the binary close-vs-SMA(200)
    /// classifier never emits this.
    Warning,
    Bear,
}

impl Regime {
    pub fn is_bear(&self) -> bool {
        matches!(self, Regime::Bear)
    }
}

impl std::fmt::Display for Regime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Regime::Bull => "BULL",
            Regime::Warning => "WARNING",
            Regime::Bear => "BEAR",
        };
        write!(f, "{s}")
    }
}

/// Binary domestic-benchmark classification: `BULL` if the benchmark close
/// is at or above its SMA(200), else `BEAR` (§4.5).
pub fn classify_domestic(benchmark_close: Decimal, benchmark_sma200: Option<Decimal>) -> Regime {
    match benchmark_sma200 {
        Some(sma) if benchmark_close >= sma => Regime::Bull,
        Some(_) => Regime::Bear,
        // Insufficient history for SMA(200) (warm-up period) defaults to
        // BULL, matching the original platform's NaN defense.
        None => Regime::Bull,
    }
}

/// Stricter three-state classifier used to scale capital deployment down
/// before it reaches full BEAR (§4.5): `SMA(5) >= SMA(50)` is `BULL`
/// (100% deployment); below that, a negative MACD signal confirms `BEAR`
/// (0% deployment), otherwise the softer `WARNING` state applies (50%
/// deployment). Returns the regime and its capital-deployment fraction.
pub fn classify_domestic_strict(
    sma5: Option<Decimal>,
    sma50: Option<Decimal>,
    macd_signal: Option<Decimal>,
) -> (Regime, Decimal) {
    match (sma5, sma50) {
        (Some(s5), Some(s50)) if s5 >= s50 => (Regime::Bull, Decimal::ONE),
        (Some(_), Some(_)) => match macd_signal {
            Some(signal) if signal < Decimal::ZERO => (Regime::Bear, Decimal::ZERO),
            _ => (Regime::Warning, Decimal::new(5, 1)), // 0.5
        },
        _ => (Regime::Bear, Decimal::ZERO),
    }
}

/// Per-asset classification for the global multi-asset mode: each ETF is
/// `BULL` if its close is at or above its own SMA(200), else `BEAR`. The
/// cash-equivalent ticker (`SHY`) is always treated as `BULL` (§4.5).
pub fn classify_per_asset(
    symbol: &str,
    cash_equivalent_ticker: &str,
    close: Decimal,
    sma200: Option<Decimal>,
) -> Regime {
    if symbol == cash_equivalent_ticker {
        return Regime::Bull;
    }
    match sma200 {
        Some(sma) if close >= sma => Regime::Bull,
        Some(_) => Regime::Bear,
        // Same NaN-defense-to-BULL convention as `classify_domestic`.
        None => Regime::Bull,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn classify_domestic_bull_when_close_at_or_above_sma() {
        assert_eq!(classify_domestic(dec!(100), Some(dec!(100))), Regime::Bull);
        assert_eq!(classify_domestic(dec!(99), Some(dec!(100))), Regime::Bear);
    }

    #[test]
    fn classify_domestic_defaults_to_bull_during_sma200_warmup() {
        assert_eq!(classify_domestic(dec!(100), None), Regime::Bull);
    }

    #[test]
    fn classify_per_asset_defaults_to_bull_when_sma_missing() {
        assert_eq!(classify_per_asset("QQQ", "SHY", dec!(100), None), Regime::Bull);
    }

    #[test]
    fn classify_domestic_strict_three_states() {
        assert_eq!(
            classify_domestic_strict(Some(dec!(110)), Some(dec!(100)), Some(dec!(-1))).0,
            Regime::Bull
        );
        assert_eq!(
            classify_domestic_strict(Some(dec!(90)), Some(dec!(100)), Some(dec!(-1))).0,
            Regime::Bear
        );
        assert_eq!(
            classify_domestic_strict(Some(dec!(90)), Some(dec!(100)), Some(dec!(1))).0,
            Regime::Warning
        );
    }

    #[test]
    fn shy_is_always_bull() {
        assert_eq!(
            classify_per_asset("SHY", "SHY", dec!(50), None),
            Regime::Bull
        );
    }
}
