//! Dual-momentum scoring (§4.4): the 3/6/12-month blend and
//! absolute-momentum gate shared by the domestic and global selection
//! paths.

pub mod domestic;
pub mod global;

use rust_decimal::Decimal;

pub use domestic::{UniverseEntry, score_universe, select_domestic_assets};
pub use global::{GlobalAllocation, Preset, select_global_allocation};

/// Trailing returns for one instrument, already point-in-time sliced by the
/// caller (`DataHandler::ViewAt`). `None` fields mean insufficient history
/// for that window (§4.2 `Return`).
#[derive(Debug, Clone, Copy, Default)]
pub struct ScoreInput {
    pub adtv20: Option<Decimal>,
    pub r3: Option<Decimal>,
    pub r6: Option<Decimal>,
    pub r12: Option<Decimal>,
}

/// `(r3 + r6 + r12) / 3`. `None` unless all three windows are defined —
/// an instrument with a partial history is excluded from ranking rather
/// than scored on fewer windows, keeping symbols comparable.
pub fn blended_score(input: &ScoreInput) -> Option<Decimal> {
    let (r3, r6, r12) = (input.r3?, input.r6?, input.r12?);
    Some((r3 + r6 + r12) / Decimal::from(3))
}

/// Absolute-momentum gate (§4.4 step 4): a blended score is suppressed to
/// `None` when 12-month return is below the risk-free rate.
pub fn apply_absolute_momentum_gate(
    score: Option<Decimal>,
    r12: Option<Decimal>,
    risk_free_rate: Decimal,
) -> Option<Decimal> {
    match r12 {
        Some(r12) if r12 < risk_free_rate => None,
        _ => score,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn blended_score_requires_all_three_windows() {
        let partial = ScoreInput {
            adtv20: None,
            r3: Some(dec!(0.1)),
            r6: Some(dec!(0.1)),
            r12: None,
        };
        assert_eq!(blended_score(&partial), None);

        let full = ScoreInput {
            adtv20: None,
            r3: Some(dec!(0.1)),
            r6: Some(dec!(0.2)),
            r12: Some(dec!(0.3)),
        };
        assert_eq!(blended_score(&full), Some(dec!(0.2)));
    }

    #[test]
    fn s2_absolute_momentum_filter_suppresses_negative_r12() {
        let score = Some(dec!(0.05));
        let gated = apply_absolute_momentum_gate(score, Some(dec!(-0.10)), Decimal::ZERO);
        assert_eq!(gated, None);
    }
}
