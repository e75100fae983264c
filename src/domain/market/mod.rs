//! Core market data types: bars, bar series, and instrument identity.

pub mod indicators;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Which venue/category an instrument trades on. Determines cost parameters
/// (`domain::trading::fees::cost_params_for`) and currency convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Market {
    DomesticRegular,
    DomesticAts,
    GlobalEtf,
    Benchmark,
}

impl Market {
    /// Korean numeric stock codes trade domestically; alphabetic tickers
    /// (US ETFs) are global. Used at cost-lookup sites that only have a
    /// bare symbol string, mirroring the original platform's market
    /// detection.
    pub fn infer_from_symbol(symbol: &str) -> Self {
        if symbol.chars().all(|c| c.is_ascii_digit()) {
            Market::DomesticRegular
        } else {
            Market::GlobalEtf
        }
    }

    /// Domestic instruments are quoted and settled in KRW directly; global
    /// instruments need an FX conversion to base currency.
    pub fn is_domestic(&self) -> bool {
        matches!(self, Market::DomesticRegular | Market::DomesticAts)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Instrument {
    pub symbol: String,
    pub market: Market,
}

impl Instrument {
    pub fn new(symbol: impl Into<String>, market: Market) -> Self {
        Self {
            symbol: symbol.into(),
            market,
        }
    }
}

/// A single OHLCV observation at minute or day granularity.
///
/// `trade_value` is optional for minute bars; when absent it is imputed as
/// `close * volume` by [`Bar::trade_value_or_imputed`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub instant: NaiveDate,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub trade_value: Option<Decimal>,
}

impl Bar {
    pub fn trade_value_or_imputed(&self) -> Decimal {
        self.trade_value.unwrap_or(self.close * self.volume)
    }

    /// A bar is eligible for inclusion in a series when its numeric fields
    /// are non-negative and `close > 0` (§3).
    pub fn is_valid(&self) -> bool {
        self.close > Decimal::ZERO
            && self.open >= Decimal::ZERO
            && self.high >= Decimal::ZERO
            && self.low >= Decimal::ZERO
            && self.volume >= Decimal::ZERO
    }
}

/// An ordered, deduplicated, strictly-monotone-in-`instant` sequence of bars
/// for one instrument. Persisted as a JSON blob per instrument (§4.1).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BarSeries {
    bars: Vec<Bar>,
}

impl BarSeries {
    pub fn new() -> Self {
        Self { bars: Vec::new() }
    }

    /// Builds a series from an unsorted, possibly-duplicated, possibly-dirty
    /// bar list: invalid bars are dropped, the rest sorted ascending by
    /// `instant` and deduplicated keeping the last-seen value for a given
    /// day. Returns the dropped-bar count for the caller to log (§4.1
    /// failure model: "dropped silently with a logged count").
    pub fn from_unsorted(mut bars: Vec<Bar>) -> (Self, usize) {
        let before = bars.len();
        bars.retain(|b| b.is_valid());
        // stable sort: for equal instants, keep input order so `dedup_by`
        // (which keeps the *first* of a run) can be paired with a reverse
        // sort to prefer the last-inserted (freshest) duplicate.
        bars.sort_by_key(|b| b.instant);
        bars.dedup_by(|a, b| {
            if a.instant == b.instant {
                // `dedup_by` calls with (next, prev); keep `prev`'s slot but
                // overwrite it with the later element so the freshest wins.
                std::mem::swap(a, b);
                true
            } else {
                false
            }
        });
        let dropped = before - bars.len();
        (Self { bars }, dropped)
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn earliest(&self) -> Option<NaiveDate> {
        self.bars.first().map(|b| b.instant)
    }

    pub fn latest(&self) -> Option<NaiveDate> {
        self.bars.last().map(|b| b.instant)
    }

    /// Merge `incoming` into this series, with a fresh fetch overwriting any
    /// stale cached bar on the same `instant` (§4.1 merge-by-key rule).
    /// Returns the number of bars dropped as invalid during the merge.
    pub fn merge(&mut self, incoming: Vec<Bar>) -> usize {
        let mut combined = self.bars.clone();
        combined.extend(incoming);
        let (merged, dropped) = Self::from_unsorted(combined);
        *self = merged;
        dropped
    }

    /// All bars with `instant <= day` (the point-in-time slicing gate).
    pub fn up_to(&self, day: NaiveDate) -> &[Bar] {
        let idx = self.bars.partition_point(|b| b.instant <= day);
        &self.bars[..idx]
    }

    /// All bars with `instant < day` — the strict "no look-ahead" slice used
    /// whenever a decision at `day` needs a rolling derivative (§3 shift(1)
    /// invariant).
    pub fn before(&self, day: NaiveDate) -> &[Bar] {
        let idx = self.bars.partition_point(|b| b.instant < day);
        &self.bars[..idx]
    }

    pub fn closes(&self) -> Vec<Decimal> {
        self.bars.iter().map(|b| b.close).collect()
    }

    /// True iff `bars` is strictly increasing in `instant` with no
    /// duplicates — the invariant this type is supposed to maintain
    /// internally; exposed so callers who build a `BarSeries` by hand (e.g.
    /// test fixtures) can assert it.
    pub fn is_strictly_monotone(&self) -> bool {
        self.bars.windows(2).all(|w| w[0].instant < w[1].instant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn bar(y: i32, m: u32, d: u32, close: Decimal) -> Bar {
        Bar {
            instant: NaiveDate::from_ymd_opt(y, m, d).unwrap(),
            open: close,
            high: close,
            low: close,
            close,
            volume: dec!(1000),
            trade_value: None,
        }
    }

    #[test]
    fn from_unsorted_sorts_dedups_and_drops_invalid() {
        let bars = vec![
            bar(2024, 1, 3, dec!(100)),
            bar(2024, 1, 1, dec!(98)),
            bar(2024, 1, 2, dec!(99)),
            bar(2024, 1, 1, dec!(97)),
            Bar {
                instant: NaiveDate::from_ymd_opt(2024, 1, 4).unwrap(),
                open: dec!(0),
                high: dec!(0),
                low: dec!(0),
                close: dec!(0),
                volume: dec!(0),
                trade_value: None,
            },
        ];
        let (series, dropped) = BarSeries::from_unsorted(bars);
        assert_eq!(dropped, 2);
        assert_eq!(series.len(), 3);
        assert!(series.is_strictly_monotone());
    }

    #[test]
    fn merge_keeps_freshest_duplicate() {
        let (mut series, _) = BarSeries::from_unsorted(vec![bar(2024, 1, 1, dec!(100))]);
        series.merge(vec![bar(2024, 1, 1, dec!(105)), bar(2024, 1, 2, dec!(110))]);
        assert_eq!(series.len(), 2);
        assert_eq!(series.bars()[0].close, dec!(105));
    }

    #[test]
    fn up_to_and_before_clamp_at_day() {
        let (series, _) = BarSeries::from_unsorted(vec![
            bar(2024, 1, 1, dec!(100)),
            bar(2024, 1, 2, dec!(101)),
            bar(2024, 1, 3, dec!(102)),
        ]);
        let d2 = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        assert_eq!(series.up_to(d2).len(), 2);
        assert_eq!(series.before(d2).len(), 1);
    }

    #[test]
    fn trade_value_imputed_from_close_and_volume() {
        let b = bar(2024, 1, 1, dec!(100));
        assert_eq!(b.trade_value_or_imputed(), dec!(100) * dec!(1000));
    }
}
