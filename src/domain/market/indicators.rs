//! Pure, stateless indicator kernels (§4.2). Every function here takes an
//! ordered slice of recent bars/closes and returns `None` when there isn't
//! enough history — callers treat that as the `DataGapError` recovery case
//! (§7): skip the symbol/day, never panic.
//!
//! Rolling-mean/shift/cummax/pct_change helpers live here too (§9 design
//! notes: "keep them in one inner module so vectorisation is localised").
//! Panel-level callers (`application::data_handler`) apply [`shift1`] to
//! whatever this module produces before handing it to a decision — that is
//! the one place the point-in-time discipline is enforced structurally.

use super::Bar;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal_macros::dec;

/// Simple moving average of the last `n` closes. `None` if `len < n` or
/// `n == 0`.
pub fn sma(prices: &[Decimal], n: usize) -> Option<Decimal> {
    if n == 0 || prices.len() < n {
        return None;
    }
    let window = &prices[prices.len() - n..];
    Some(window.iter().sum::<Decimal>() / Decimal::from(n))
}

/// Exponential moving average: SMA of the first `n` observations seeds the
/// recursion, then `ema_i = close_i * k + ema_{i-1} * (1-k)` with
/// `k = 2/(n+1)`. Returns the EMA value aligned to the last input price.
pub fn ema(prices: &[Decimal], n: usize) -> Option<Decimal> {
    ema_series(prices, n).into_iter().next_back().flatten()
}

/// Full EMA series aligned 1:1 with `prices`. Entries before the seed window
/// fills are `None`.
pub fn ema_series(prices: &[Decimal], n: usize) -> Vec<Option<Decimal>> {
    if n == 0 || prices.len() < n {
        return vec![None; prices.len()];
    }
    let k = Decimal::TWO / Decimal::from(n + 1);
    let mut out = vec![None; prices.len()];
    let seed = prices[..n].iter().sum::<Decimal>() / Decimal::from(n);
    out[n - 1] = Some(seed);
    let mut prev = seed;
    for (i, price) in prices.iter().enumerate().skip(n) {
        let value = *price * k + prev * (Decimal::ONE - k);
        out[i] = Some(value);
        prev = value;
    }
    out
}

/// Average Daily Trading Value: mean of `trade_value` (imputed when absent)
/// over the last `n` bars.
pub fn adtv(bars: &[Bar], n: usize) -> Option<Decimal> {
    if n == 0 || bars.len() < n {
        return None;
    }
    let window = &bars[bars.len() - n..];
    let sum: Decimal = window.iter().map(Bar::trade_value_or_imputed).sum();
    Some(sum / Decimal::from(n))
}

/// Relative Volume: today's (the last bar's) trading value divided by the
/// ADTV of the `n` bars strictly before it. `None` if fewer than `n+1` bars
/// or the prior ADTV is zero.
pub fn rvol(bars: &[Bar], n: usize) -> Option<Decimal> {
    if bars.len() < n + 1 {
        return None;
    }
    let today = bars.last()?;
    let prior = &bars[bars.len() - n - 1..bars.len() - 1];
    let prior_adtv = adtv(prior, n)?;
    if prior_adtv.is_zero() {
        return None;
    }
    Some(today.trade_value_or_imputed() / prior_adtv)
}

/// True range of `bars[i]` against `bars[i-1]`'s close.
fn true_range(curr: &Bar, prev_close: Decimal) -> Decimal {
    let hl = curr.high - curr.low;
    let hc = (curr.high - prev_close).abs();
    let lc = (curr.low - prev_close).abs();
    hl.max(hc).max(lc)
}

/// Average True Range over the last `n` bars. Needs `n+1` bars since the
/// first true range in the window references the bar before it.
pub fn atr(bars: &[Bar], n: usize) -> Option<Decimal> {
    if n == 0 || bars.len() < n + 1 {
        return None;
    }
    let window = &bars[bars.len() - n - 1..];
    let mut sum = Decimal::ZERO;
    for pair in window.windows(2) {
        sum += true_range(&pair[1], pair[0].close);
    }
    Some(sum / Decimal::from(n))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MacdValue {
    pub macd: Decimal,
    pub signal: Decimal,
    pub histogram: Decimal,
}

/// MACD(12, 26, 9): `ema(fast) - ema(slow)`, its own 9-period EMA as signal,
/// and the macd-minus-signal histogram. `None` until enough history exists
/// for the slow EMA plus the signal's own warm-up.
pub fn macd(prices: &[Decimal], fast: usize, slow: usize, signal_n: usize) -> Option<MacdValue> {
    let fast_series = ema_series(prices, fast);
    let slow_series = ema_series(prices, slow);
    let macd_series: Vec<Option<Decimal>> = fast_series
        .iter()
        .zip(slow_series.iter())
        .map(|(f, s)| match (f, s) {
            (Some(f), Some(s)) => Some(f - s),
            _ => None,
        })
        .collect();
    // signal is the EMA of the macd line over the portion where macd is defined.
    let defined_start = macd_series.iter().position(|v| v.is_some())?;
    let macd_values: Vec<Decimal> = macd_series[defined_start..]
        .iter()
        .map(|v| v.expect("slice starts at first defined value"))
        .collect();
    let signal_series = ema_series(&macd_values, signal_n);
    let latest_macd = *macd_values.last()?;
    let latest_signal = (*signal_series.last()?)?;
    Some(MacdValue {
        macd: latest_macd,
        signal: latest_signal,
        histogram: latest_macd - latest_signal,
    })
}

/// `prices[-1] / prices[-n-1] - 1`. `None` if `len <= n` (strictly fewer
/// than `n+1` observations).
pub fn return_n(prices: &[Decimal], n: usize) -> Option<Decimal> {
    if prices.len() <= n || n == 0 {
        return None;
    }
    let last = *prices.last()?;
    let anchor = prices[prices.len() - n - 1];
    if anchor.is_zero() {
        return None;
    }
    Some(last / anchor - Decimal::ONE)
}

/// `(price/sma) * 100`.
pub fn disparity(price: Decimal, sma: Decimal) -> Option<Decimal> {
    if sma.is_zero() {
        return None;
    }
    Some(price / sma * Decimal::from(100))
}

/// Day-over-day percent changes, one shorter than the input.
pub fn pct_change(values: &[Decimal]) -> Vec<Decimal> {
    values
        .windows(2)
        .filter_map(|w| {
            if w[0].is_zero() {
                None
            } else {
                Some(w[1] / w[0] - Decimal::ONE)
            }
        })
        .collect()
}

/// Sample standard deviation (n-1 denominator), optionally annualised by
/// `sqrt(252)` for use as a daily-return volatility measure (§4.5 inverse
/// volatility weighting).
pub fn std_dev(values: &[Decimal], annualize: bool) -> Option<Decimal> {
    if values.len() < 2 {
        return None;
    }
    let n = Decimal::from(values.len());
    let mean = values.iter().sum::<Decimal>() / n;
    let sum_sq: Decimal = values.iter().map(|v| (*v - mean) * (*v - mean)).sum();
    let variance = sum_sq / Decimal::from(values.len() - 1);
    let sd = decimal_sqrt(variance)?;
    if annualize {
        Some(sd * decimal_sqrt(Decimal::from(252))?)
    } else {
        Some(sd)
    }
}

/// `rust_decimal` has no native sqrt; round-trip through `f64` for
/// variance-derived quantities.
pub fn decimal_sqrt(value: Decimal) -> Option<Decimal> {
    if value < Decimal::ZERO {
        return None;
    }
    let f = value.to_f64()?;
    Decimal::from_f64_retain(f.sqrt())
}

/// Rolling mean over a fixed window, aligned 1:1 with `values`; entries
/// before the window fills are `None`. The panel-construction building
/// block behind `adtv20` (§3).
pub fn rolling_mean(values: &[Decimal], window: usize) -> Vec<Option<Decimal>> {
    if window == 0 {
        return vec![None; values.len()];
    }
    let mut out = vec![None; values.len()];
    let mut sum = Decimal::ZERO;
    for (i, v) in values.iter().enumerate() {
        sum += *v;
        if i >= window {
            sum -= values[i - window];
        }
        if i + 1 >= window {
            out[i] = Some(sum / Decimal::from(window));
        }
    }
    out
}

/// Shifts a series forward by one slot, discarding the last value and
/// inserting `None` at the front — the `shift(1)` realisation of the
/// point-in-time invariant (§3, §4.2): whatever sat at index `i` now sits at
/// index `i+1`, so a decision reading index `i` sees yesterday's value.
pub fn shift1<T: Clone>(values: &[Option<T>]) -> Vec<Option<T>> {
    if values.is_empty() {
        return Vec::new();
    }
    let mut out = Vec::with_capacity(values.len());
    out.push(None);
    out.extend_from_slice(&values[..values.len() - 1]);
    out
}

/// Running maximum, aligned 1:1 with `values`.
pub fn cummax(values: &[Decimal]) -> Vec<Decimal> {
    let mut out = Vec::with_capacity(values.len());
    let mut running = Decimal::MIN;
    for v in values {
        running = running.max(*v);
        out.push(running);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn bar(d: i64, close: Decimal, high: Decimal, low: Decimal, volume: Decimal) -> Bar {
        Bar {
            instant: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + chrono::Duration::days(d),
            open: close,
            high,
            low,
            close,
            volume,
            trade_value: None,
        }
    }

    #[test]
    fn sma_requires_exact_window() {
        let prices = vec![dec!(10), dec!(20), dec!(30)];
        assert_eq!(sma(&prices, 3), Some(dec!(20)));
        assert_eq!(sma(&prices, 4), None);
    }

    #[test]
    fn ema_matches_hand_rolled_seed_then_recursion() {
        let prices = vec![dec!(10), dec!(20), dec!(30), dec!(40), dec!(50)];
        // n=3: seed = mean(10,20,30) = 20, k = 2/4 = 0.5
        // next: 40*0.5 + 20*0.5 = 30
        // next: 50*0.5 + 30*0.5 = 40
        let result = ema(&prices, 3).unwrap();
        assert_eq!(result, dec!(40));
    }

    #[test]
    fn adtv_uses_imputed_trade_value() {
        let bars = vec![
            bar(0, dec!(100), dec!(100), dec!(100), dec!(10)),
            bar(1, dec!(200), dec!(200), dec!(200), dec!(10)),
        ];
        // trade values: 1000, 2000 -> mean 1500
        assert_eq!(adtv(&bars, 2), Some(dec!(1500)));
        assert_eq!(adtv(&bars, 3), None);
    }

    #[test]
    fn rvol_divides_today_by_prior_window() {
        let bars = vec![
            bar(0, dec!(100), dec!(100), dec!(100), dec!(10)), // tv 1000
            bar(1, dec!(100), dec!(100), dec!(100), dec!(10)), // tv 1000
            bar(2, dec!(100), dec!(100), dec!(100), dec!(40)), // tv 4000, today
        ];
        // prior 2 bars adtv = 1000, today tv = 4000 -> rvol = 4
        assert_eq!(rvol(&bars, 2), Some(dec!(4)));
    }

    #[test]
    fn atr_needs_n_plus_one_bars() {
        let bars = vec![
            bar(0, dec!(100), dec!(105), dec!(95), dec!(1)),
            bar(1, dec!(102), dec!(108), dec!(100), dec!(1)),
            bar(2, dec!(101), dec!(103), dec!(99), dec!(1)),
        ];
        assert!(atr(&bars, 2).is_some());
        assert!(atr(&bars, 3).is_none());
    }

    #[test]
    fn return_n_none_at_exact_n_defined_at_n_plus_one() {
        let prices: Vec<Decimal> = (0..=10).map(Decimal::from).collect();
        assert_eq!(return_n(&prices[..10], 9), None);
        assert!(return_n(&prices[..11], 9).is_some());
    }

    #[test]
    fn disparity_basic() {
        assert_eq!(disparity(dec!(110), dec!(100)), Some(dec!(110)));
        assert_eq!(disparity(dec!(110), dec!(0)), None);
    }

    #[test]
    fn shift1_drops_last_prepends_none() {
        let values = vec![Some(1), Some(2), Some(3)];
        let shifted = shift1(&values);
        assert_eq!(shifted, vec![None, Some(1), Some(2)]);
    }

    #[test]
    fn rolling_mean_fills_only_after_window() {
        let values = vec![dec!(1), dec!(2), dec!(3), dec!(4)];
        let means = rolling_mean(&values, 2);
        assert_eq!(means, vec![None, Some(dec!(1.5)), Some(dec!(2.5)), Some(dec!(3.5))]);
    }

    #[test]
    fn cummax_is_nondecreasing() {
        let values = vec![dec!(1), dec!(3), dec!(2), dec!(5), dec!(4)];
        assert_eq!(cummax(&values), vec![dec!(1), dec!(3), dec!(3), dec!(5), dec!(5)]);
    }
}
