//! Momentum-swing AlphaFilter (§4.7): four short-circuiting entry gates,
//! plus the ATR trailing-stop exit engine the swing strategy pairs them
//! with.

use super::FilterVerdict;
use super::gate;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

pub const LIQUIDITY_ADTV_THRESHOLD: Decimal = dec!(50_000_000_000);
pub const LIQUIDITY_MARKET_CAP_THRESHOLD: Decimal = dec!(300_000_000_000);
pub const RVOL_THRESHOLD: Decimal = dec!(2.5);
pub const DAILY_RETURN_THRESHOLD: Decimal = dec!(0.04);
pub const DISPARITY_LOWER: Decimal = dec!(100);
pub const DISPARITY_UPPER: Decimal = dec!(112);

/// `ATR(5)` lookback the entry stop distance is sized from (§4.7).
pub const ATR_TRAILING_LOOKBACK: usize = 5;
pub const ATR_STOP_MULTIPLE: Decimal = dec!(2.5);
/// Stand-in stop distance, as a fraction of entry price, when ATR cannot be
/// computed at entry (§4.7: "falling back to 2% of entry price").
pub const ATR_FALLBACK_FRACTION: Decimal = dec!(0.02);
pub const MAX_HOLDING_DAYS: i64 = 5;

#[derive(Debug, Clone, Copy)]
pub struct SwingInput {
    pub adtv20: Option<Decimal>,
    pub market_cap: Option<Decimal>,
    pub rvol: Option<Decimal>,
    pub close: Decimal,
    pub sma10: Option<Decimal>,
    pub ema20: Option<Decimal>,
    pub daily_return: Option<Decimal>,
    pub sma20: Option<Decimal>,
}

/// Gate order (§4.7): liquidity, RVOL, momentum, disparity. Each gate's
/// `None` input (insufficient history) fails that gate rather than
/// skipping it.
pub fn evaluate(input: SwingInput) -> FilterVerdict {
    let liquidity_ok = input.adtv20.is_some_and(|v| v >= LIQUIDITY_ADTV_THRESHOLD)
        || input.market_cap.is_some_and(|v| v >= LIQUIDITY_MARKET_CAP_THRESHOLD);
    gate!(
        liquidity_ok,
        "liquidity",
        format!(
            "adtv20={:?} market_cap={:?} below thresholds {}/{}",
            input.adtv20, input.market_cap, LIQUIDITY_ADTV_THRESHOLD, LIQUIDITY_MARKET_CAP_THRESHOLD
        )
    );

    let rvol_ok = input.rvol.is_some_and(|v| v >= RVOL_THRESHOLD);
    gate!(
        rvol_ok,
        "rvol",
        format!("rvol={:?} below {}", input.rvol, RVOL_THRESHOLD)
    );

    let momentum_ok = input.sma10.is_some_and(|sma10| input.close > sma10)
        && input.ema20.is_some_and(|ema20| input.close > ema20)
        && input.daily_return.is_some_and(|r| r >= DAILY_RETURN_THRESHOLD);
    gate!(
        momentum_ok,
        "momentum",
        format!(
            "close={} sma10={:?} ema20={:?} daily_return={:?}",
            input.close, input.sma10, input.ema20, input.daily_return
        )
    );

    let disparity_ok = input.sma20.is_some_and(|sma20| {
        if sma20.is_zero() {
            return false;
        }
        let disparity = input.close / sma20 * Decimal::from(100);
        disparity > DISPARITY_LOWER && disparity <= DISPARITY_UPPER
    });
    gate!(
        disparity_ok,
        "disparity",
        format!("close={} sma20={:?} outside (100, 112]", input.close, input.sma20)
    );

    FilterVerdict::Pass
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SwingExitAction {
    Hold,
    StopOut { price: Decimal },
    HorizonClose { price: Decimal },
}

/// Tracks one filled swing position through its pure ATR trailing-stop exit
/// (§4.7): the stop line only ratchets upward and a position past
/// [`MAX_HOLDING_DAYS`] is force-closed regardless of where the stop sits.
#[derive(Debug, Clone)]
pub struct SwingPosition {
    pub entry_price: Decimal,
    pub entry_day: NaiveDate,
    pub stop_distance: Decimal,
    pub stop_line: Decimal,
}

impl SwingPosition {
    /// `entry_atr` is `ATR(5)` as of the entry date; `None` falls back to
    /// [`ATR_FALLBACK_FRACTION`] of entry price.
    pub fn new(entry_price: Decimal, entry_atr: Option<Decimal>, entry_day: NaiveDate) -> Self {
        let atr = entry_atr.unwrap_or(entry_price * ATR_FALLBACK_FRACTION);
        let stop_distance = atr * ATR_STOP_MULTIPLE;
        Self {
            entry_price,
            entry_day,
            stop_distance,
            stop_line: entry_price - stop_distance,
        }
    }

    /// Checks today's low against the stop line as it stood coming into the
    /// day (ratcheted by yesterday's close), then, if the position survives,
    /// pulls the line up using today's own close for tomorrow's check. A
    /// position whose holding period has exceeded [`MAX_HOLDING_DAYS`] is
    /// force-closed at the prior day's close rather than today's — the same
    /// "decide before today's bar settles" convention the other alpha
    /// filters use for their own horizon checks.
    pub fn evaluate_day(&mut self, day: NaiveDate, low: Decimal, close: Decimal, prior_close: Decimal) -> SwingExitAction {
        let days_held = (day - self.entry_day).num_days();
        if days_held > MAX_HOLDING_DAYS {
            return SwingExitAction::HorizonClose { price: prior_close };
        }
        if low <= self.stop_line {
            return SwingExitAction::StopOut { price: self.stop_line };
        }
        self.stop_line = self.stop_line.max(close - self.stop_distance);
        SwingExitAction::Hold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn passing_input() -> SwingInput {
        SwingInput {
            adtv20: Some(dec!(60_000_000_000)),
            market_cap: None,
            rvol: Some(dec!(3.0)),
            close: dec!(105),
            sma10: Some(dec!(100)),
            ema20: Some(dec!(100)),
            daily_return: Some(dec!(0.05)),
            sma20: Some(dec!(100)),
        }
    }

    #[test]
    fn all_gates_pass() {
        assert_eq!(evaluate(passing_input()), FilterVerdict::Pass);
    }

    #[test]
    fn liquidity_gate_fails_first() {
        let mut input = passing_input();
        input.adtv20 = Some(dec!(10_000_000_000));
        input.market_cap = None;
        let verdict = evaluate(input);
        assert!(matches!(verdict, FilterVerdict::Fail { gate: "liquidity", .. }));
    }

    #[test]
    fn market_cap_can_satisfy_liquidity_without_adtv() {
        let mut input = passing_input();
        input.adtv20 = None;
        input.market_cap = Some(dec!(400_000_000_000));
        assert_eq!(evaluate(input), FilterVerdict::Pass);
    }

    #[test]
    fn disparity_upper_bound_is_inclusive_lower_exclusive() {
        let mut input = passing_input();
        input.close = dec!(100);
        input.sma20 = Some(dec!(100)); // disparity exactly 100 -> fails (must be > 100)
        assert!(matches!(evaluate(input), FilterVerdict::Fail { gate: "disparity", .. }));

        let mut input2 = passing_input();
        input2.close = dec!(112);
        input2.sma20 = Some(dec!(100)); // disparity exactly 112 -> passes (<=112)
        assert_eq!(evaluate(input2), FilterVerdict::Pass);
    }

    #[test]
    fn trailing_stop_ratchets_up_and_never_down() {
        let entry_day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let mut pos = SwingPosition::new(dec!(100), Some(dec!(10)), entry_day);
        assert_eq!(pos.stop_line, dec!(75)); // 100 - 10*2.5

        let d1 = entry_day + chrono::Duration::days(1);
        assert_eq!(pos.evaluate_day(d1, dec!(80), dec!(110), dec!(100)), SwingExitAction::Hold);
        assert_eq!(pos.stop_line, dec!(85)); // ratcheted to 110 - 25

        let d2 = entry_day + chrono::Duration::days(2);
        // A lower close must not pull the stop line back down.
        assert_eq!(pos.evaluate_day(d2, dec!(90), dec!(95), dec!(110)), SwingExitAction::Hold);
        assert_eq!(pos.stop_line, dec!(85));

        let d3 = entry_day + chrono::Duration::days(3);
        assert_eq!(pos.evaluate_day(d3, dec!(80), dec!(90), dec!(95)), SwingExitAction::StopOut { price: dec!(85) });
    }

    #[test]
    fn missing_atr_falls_back_to_two_percent_of_entry_price() {
        let entry_day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let pos = SwingPosition::new(dec!(100), None, entry_day);
        assert_eq!(pos.stop_distance, dec!(5)); // 100 * 0.02 * 2.5
        assert_eq!(pos.stop_line, dec!(95));
    }

    #[test]
    fn stale_position_force_closes_at_prior_close_past_max_holding_days() {
        let entry_day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let mut pos = SwingPosition::new(dec!(100), Some(dec!(10)), entry_day);
        let late_day = entry_day + chrono::Duration::days(MAX_HOLDING_DAYS + 1);
        assert_eq!(
            pos.evaluate_day(late_day, dec!(200), dec!(200), dec!(198)),
            SwingExitAction::HorizonClose { price: dec!(198) }
        );
    }
}
