//! Theme-driven phoenix strategy (§4.7/§4.8): a deterministic static target
//! list keyed by date (no computed gates) paired with a fixed 09:14
//! snapshot-return decision rule and a time-banded exit table.

use chrono::{NaiveDate, NaiveTime};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;

/// The one fixed snapshot time the whole strategy hinges on: a 09:14
/// decision rule is replicated exactly rather than re-derived from intraday
/// bars.
pub fn decision_time() -> NaiveTime {
    NaiveTime::from_hms_opt(9, 14, 0).unwrap()
}

/// A deterministic static list of theme targets keyed by trading day,
/// sourced (at the infrastructure layer) from an external text file rather
/// than computed from any gate. This type only holds the parsed table and
/// answers lookups; parsing the source file is an infrastructure concern.
#[derive(Debug, Clone, Default)]
pub struct PhoenixTargetList {
    by_day: HashMap<NaiveDate, Vec<String>>,
}

impl PhoenixTargetList {
    pub fn new(by_day: HashMap<NaiveDate, Vec<String>>) -> Self {
        Self { by_day }
    }

    pub fn targets_for(&self, day: NaiveDate) -> &[String] {
        self.by_day.get(&day).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.by_day.is_empty()
    }
}

/// A band in the time-banded exit table (§4.8), named for its
/// `profit_rate_914` range rather than session position — the windows
/// themselves are not monotone through the session (a deep loss and a
/// strong gain both exit earlier than a flat snapshot).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitBand {
    /// `profit_rate_914 <= -0.09`: deep loss, cut fast.
    DeepLoss,
    /// `(-0.09, -0.04]`.
    ModerateLoss,
    /// `(-0.04, 0.00)`.
    MildLoss,
    /// `[0.00, 0.04]`.
    MildGain,
    /// `(0.04, 0.09]`.
    ModerateGain,
    /// `> 0.09`: strong confirmed momentum, ride it.
    StrongGain,
}

impl ExitBand {
    /// Target exit window for a position that lands in this band and is
    /// not closed earlier by the upper-limit trailing stop (§4.8's table,
    /// window start used as the single representative instant).
    pub fn exit_window(&self) -> (NaiveTime, NaiveTime) {
        match self {
            ExitBand::DeepLoss => (NaiveTime::from_hms_opt(9, 24, 0).unwrap(), NaiveTime::from_hms_opt(9, 27, 0).unwrap()),
            ExitBand::ModerateLoss => (NaiveTime::from_hms_opt(9, 21, 0).unwrap(), NaiveTime::from_hms_opt(9, 22, 0).unwrap()),
            ExitBand::MildLoss => (NaiveTime::from_hms_opt(9, 19, 0).unwrap(), NaiveTime::from_hms_opt(9, 20, 0).unwrap()),
            ExitBand::MildGain => (NaiveTime::from_hms_opt(9, 24, 0).unwrap(), NaiveTime::from_hms_opt(9, 27, 0).unwrap()),
            ExitBand::ModerateGain => (NaiveTime::from_hms_opt(9, 20, 0).unwrap(), NaiveTime::from_hms_opt(9, 24, 0).unwrap()),
            ExitBand::StrongGain => (NaiveTime::from_hms_opt(9, 17, 0).unwrap(), NaiveTime::from_hms_opt(9, 19, 0).unwrap()),
        }
    }

    pub fn target_exit_time(&self) -> NaiveTime {
        self.exit_window().0
    }
}

/// Classifies the 09:14 snapshot return into its exit band per §4.8's table.
///
/// Read literally (`<=`/`<`/`[..]` exactly as the table states them), the
/// six ranges are already mutually exclusive and exhaustive — every value
/// lands in exactly one band, including the boundary values themselves
/// (`-0.09`, `-0.04`, `0.00`, `0.04`, `0.09`). This resolves the open
/// question named in §9: no extra tie-break convention is needed once the
/// table's own bracket notation is applied as written.
pub fn classify_exit_band(profit_rate_914: Decimal) -> ExitBand {
    if profit_rate_914 <= dec!(-0.09) {
        ExitBand::DeepLoss
    } else if profit_rate_914 <= dec!(-0.04) {
        ExitBand::ModerateLoss
    } else if profit_rate_914 < dec!(0) {
        ExitBand::MildLoss
    } else if profit_rate_914 <= dec!(0.04) {
        ExitBand::MildGain
    } else if profit_rate_914 <= dec!(0.09) {
        ExitBand::ModerateGain
    } else {
        ExitBand::StrongGain
    }
}

/// The Korean market's daily upper price-limit ratio (+30%, §4.8).
pub const DAILY_LIMIT_RATIO: Decimal = dec!(1.30);
/// A price within this fraction of the limit is "at the limit" for the
/// purposes of arming the trailing stop (§4.8: "reaches >= 99% of the
/// limit").
pub const LIMIT_ARM_THRESHOLD: Decimal = dec!(0.99);
/// The trailing stop sits at this fraction of the peak price reached once
/// armed (§4.8: "92% of the peak price reached").
pub const TRAILING_STOP_FRACTION: Decimal = dec!(0.92);

/// Tracks one phoenix position's upper-limit trailing-stop mode (§4.8,
/// independent of the time-banded exit table): once price first reaches
/// [`LIMIT_ARM_THRESHOLD`] of the daily limit, the stop arms at
/// [`TRAILING_STOP_FRACTION`] of the running peak and ratchets up with it.
#[derive(Debug, Clone, Copy, Default)]
pub struct LimitTrailingStop {
    armed: bool,
    peak: Decimal,
}

impl LimitTrailingStop {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one intraday price observation from within the arming window
    /// (the first 15 minutes of the session, per §4.8; the caller is
    /// responsible for only calling this while that window is open).
    /// Returns the trailing-stop price to exit at, if this observation
    /// falls through an already-armed stop.
    pub fn observe(&mut self, price: Decimal, prev_close: Decimal) -> Option<Decimal> {
        let limit = prev_close * DAILY_LIMIT_RATIO;
        if !self.armed {
            if limit.is_zero() {
                return None;
            }
            if price / limit >= LIMIT_ARM_THRESHOLD {
                self.armed = true;
                self.peak = price;
            }
            return None;
        }
        self.peak = self.peak.max(price);
        let stop = self.peak * TRAILING_STOP_FRACTION;
        if price < stop { Some(stop) } else { None }
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_list_lookup_defaults_to_empty() {
        let mut by_day = HashMap::new();
        let d = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
        by_day.insert(d, vec!["005930".to_string(), "000660".to_string()]);
        let list = PhoenixTargetList::new(by_day);

        assert_eq!(list.targets_for(d), &["005930".to_string(), "000660".to_string()]);
        assert!(list.targets_for(NaiveDate::from_ymd_opt(2024, 3, 5).unwrap()).is_empty());
    }

    #[test]
    fn boundary_values_resolve_per_the_tables_own_bracket_notation() {
        assert_eq!(classify_exit_band(dec!(-0.09)), ExitBand::DeepLoss);
        assert_eq!(classify_exit_band(dec!(-0.04)), ExitBand::ModerateLoss);
        assert_eq!(classify_exit_band(dec!(0)), ExitBand::MildGain);
        assert_eq!(classify_exit_band(dec!(0.04)), ExitBand::MildGain);
        assert_eq!(classify_exit_band(dec!(0.09)), ExitBand::ModerateGain);
    }

    #[test]
    fn deep_loss_and_strong_gain_hit_the_outer_bands() {
        assert_eq!(classify_exit_band(dec!(-0.25)), ExitBand::DeepLoss);
        assert_eq!(classify_exit_band(dec!(0.25)), ExitBand::StrongGain);
    }

    #[test]
    fn mid_session_gap_falls_in_mild_loss() {
        assert_eq!(classify_exit_band(dec!(-0.02)), ExitBand::MildLoss);
    }

    #[test]
    fn trailing_stop_arms_at_99pct_of_limit_and_ratchets_with_the_peak() {
        let mut stop = LimitTrailingStop::new();
        let prev_close = dec!(1000);
        // limit = 1300; 99% of limit = 1287.
        assert!(stop.observe(dec!(1200), prev_close).is_none());
        assert!(!stop.is_armed());
        assert!(stop.observe(dec!(1290), prev_close).is_none());
        assert!(stop.is_armed());
        // peak now 1290, trailing stop = 1290*0.92 = 1186.8; a higher print
        // ratchets the peak and the stop up before any exit fires.
        assert!(stop.observe(dec!(1300), prev_close).is_none());
        let exit = stop.observe(dec!(1190), prev_close);
        assert_eq!(exit, Some(dec!(1300) * TRAILING_STOP_FRACTION));
    }
}
