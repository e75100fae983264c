//! Builds the dense, point-in-time-safe panel matrices BarStore feeds the
//! Scorer and Rebalancer (§4.3). The only place direct index access into a
//! day-ordered array is allowed; everything else reaches the panel through
//! [`DataHandler::view_at`] or [`DataHandler::current_prices`].

use crate::domain::errors::BacktestError;
use crate::domain::market::indicators::{rolling_mean, shift1, sma};
use crate::domain::market::{Bar, BarSeries, Market};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::{info, warn};

/// Instruments dropped from the panel for having fewer than this many bars
/// (§4.3 Rebuild: "Drop instruments with fewer than 20 rows").
pub const MIN_ROWS: usize = 20;
const ADTV_WINDOW: usize = 20;
const BENCHMARK_SMA_WINDOW: usize = 200;

/// One instrument's series aligned to the panel's day index: forward-filled
/// close, zero-filled volume, and the ADTV-20 input (`close * volume`,
/// `None` before the instrument's first observed bar).
struct AlignedColumn {
    close: Vec<Option<Decimal>>,
    volume: Vec<Decimal>,
    trade_value: Vec<Option<Decimal>>,
}

/// Per-instrument SMA(200) of close, computed along the instrument's own
/// bar sequence (not the panel's shared day index) then forward-filled and
/// shifted onto that index (§4.5 per-asset regime classification needs each
/// ETF's own SMA200, not just the benchmark's).
fn sma200_aligned(days: &[NaiveDate], bars: &[Bar]) -> Vec<Option<Decimal>> {
    let closes_only: Vec<Decimal> = bars.iter().map(|b| b.close).collect();
    let sma_raw: Vec<Option<Decimal>> = (0..closes_only.len())
        .map(|i| sma(&closes_only[..=i], BENCHMARK_SMA_WINDOW))
        .collect();
    let by_day: HashMap<NaiveDate, Option<Decimal>> =
        bars.iter().zip(sma_raw.iter()).map(|(bar, v)| (bar.instant, *v)).collect();
    let mut out = Vec::with_capacity(days.len());
    let mut last = None;
    for day in days {
        if let Some(v) = by_day.get(day) {
            last = *v;
        }
        out.push(last);
    }
    shift1(&out)
}

fn align_to_days(days: &[NaiveDate], bars: &[Bar]) -> AlignedColumn {
    let by_day: HashMap<NaiveDate, &Bar> = bars.iter().map(|b| (b.instant, b)).collect();
    let mut close = Vec::with_capacity(days.len());
    let mut volume = Vec::with_capacity(days.len());
    let mut trade_value = Vec::with_capacity(days.len());
    let mut last_close: Option<Decimal> = None;
    for day in days {
        if let Some(bar) = by_day.get(day) {
            last_close = Some(bar.close);
            close.push(last_close);
            volume.push(bar.volume);
            trade_value.push(Some(bar.trade_value_or_imputed()));
        } else {
            close.push(last_close);
            volume.push(Decimal::ZERO);
            trade_value.push(None);
        }
    }
    AlignedColumn {
        close,
        volume,
        trade_value,
    }
}

/// The dense `(tradingDay, instrument)` matrices plus the derived ADTV-20
/// and benchmark series (§3 Panel).
pub struct Panel {
    pub days: Vec<NaiveDate>,
    pub markets: HashMap<String, Market>,
    prices: HashMap<String, Vec<Option<Decimal>>>,
    volumes: HashMap<String, Vec<Decimal>>,
    adtv20: HashMap<String, Vec<Option<Decimal>>>,
    sma200: HashMap<String, Vec<Option<Decimal>>>,
    benchmark_close: Vec<Option<Decimal>>,
    benchmark_sma200: Vec<Option<Decimal>>,
}

/// A point-in-time read of the panel at one trading day, clamped to the
/// most recent row at or before that day (§4.3: "tolerate market
/// holidays").
#[derive(Debug, Clone)]
pub struct PanelView {
    pub prices: HashMap<String, Decimal>,
    pub trading_value: HashMap<String, Decimal>,
    pub adtv20: HashMap<String, Decimal>,
    pub sma200: HashMap<String, Decimal>,
    pub benchmark_close: Option<Decimal>,
    pub benchmark_sma200: Option<Decimal>,
}

pub struct DataHandler {
    panel: Panel,
}

impl DataHandler {
    /// `series_by_symbol` maps symbol to its loaded `BarSeries` and market.
    /// `benchmark_symbol` must be a key in that map (typically a
    /// `Market::Benchmark` instrument, e.g. KOSPI or a 60/40 SPY/AGG blend
    /// proxy).
    pub fn rebuild(
        series_by_symbol: &HashMap<String, (BarSeries, Market)>,
        benchmark_symbol: &str,
    ) -> Result<Self, BacktestError> {
        let mut days: Vec<NaiveDate> = series_by_symbol
            .values()
            .flat_map(|(series, _)| series.bars().iter().map(|b| b.instant))
            .collect();
        days.sort();
        days.dedup();

        let mut markets = HashMap::new();
        let mut prices = HashMap::new();
        let mut volumes = HashMap::new();
        let mut adtv20 = HashMap::new();
        let mut sma200 = HashMap::new();
        let mut dropped = 0usize;

        for (symbol, (series, market)) in series_by_symbol {
            if series.len() < MIN_ROWS {
                dropped += 1;
                continue;
            }
            let aligned = align_to_days(&days, series.bars());
            let trade_value_filled: Vec<Decimal> =
                aligned.trade_value.iter().map(|v| v.unwrap_or(Decimal::ZERO)).collect();
            let adtv_raw = rolling_mean(&trade_value_filled, ADTV_WINDOW);
            let adtv_shifted = shift1(&adtv_raw);

            markets.insert(symbol.clone(), *market);
            sma200.insert(symbol.clone(), sma200_aligned(&days, series.bars()));
            prices.insert(symbol.clone(), aligned.close);
            volumes.insert(symbol.clone(), aligned.volume);
            adtv20.insert(symbol.clone(), adtv_shifted);
        }
        if dropped > 0 {
            info!(dropped, "dropped instruments with fewer than {MIN_ROWS} rows during panel rebuild");
        }

        let (benchmark_close, benchmark_sma200) = match series_by_symbol.get(benchmark_symbol) {
            Some((series, _)) => {
                let aligned = align_to_days(&days, series.bars());
                (aligned.close, sma200_aligned(&days, series.bars()))
            }
            None => {
                warn!(benchmark_symbol, "benchmark series absent from panel input");
                (vec![None; days.len()], vec![None; days.len()])
            }
        };

        let panel = Panel {
            days,
            markets,
            prices,
            volumes,
            adtv20,
            sma200,
            benchmark_close,
            benchmark_sma200,
        };
        Ok(Self { panel })
    }

    pub fn days(&self) -> &[NaiveDate] {
        &self.panel.days
    }

    pub fn markets(&self) -> &HashMap<String, Market> {
        &self.panel.markets
    }

    fn row_at_or_before(&self, day: NaiveDate) -> Option<usize> {
        let idx = self.panel.days.partition_point(|d| *d <= day);
        if idx == 0 { None } else { Some(idx - 1) }
    }

    /// Read-only point-in-time slice (§4.3 `ViewAt`). Every decision-time
    /// scalar must come through here or [`Self::current_prices`] — direct
    /// indexing into `Panel` elsewhere is a defect.
    pub fn view_at(&self, day: NaiveDate) -> PanelView {
        let Some(row) = self.row_at_or_before(day) else {
            return PanelView {
                prices: HashMap::new(),
                trading_value: HashMap::new(),
                adtv20: HashMap::new(),
                sma200: HashMap::new(),
                benchmark_close: None,
                benchmark_sma200: None,
            };
        };

        let mut prices = HashMap::new();
        let mut trading_value = HashMap::new();
        let mut adtv20 = HashMap::new();
        let mut sma200 = HashMap::new();
        for symbol in self.panel.prices.keys() {
            if let Some(Some(p)) = self.panel.prices.get(symbol).map(|v| v[row]) {
                prices.insert(symbol.clone(), p);
            }
            if let Some(v) = self.panel.volumes.get(symbol).map(|v| v[row]) {
                trading_value.insert(symbol.clone(), v);
            }
            if let Some(Some(a)) = self.panel.adtv20.get(symbol).map(|v| v[row]) {
                adtv20.insert(symbol.clone(), a);
            }
            if let Some(Some(s)) = self.panel.sma200.get(symbol).map(|v| v[row]) {
                sma200.insert(symbol.clone(), s);
            }
        }

        PanelView {
            prices,
            trading_value,
            adtv20,
            sma200,
            benchmark_close: self.panel.benchmark_close[row],
            benchmark_sma200: self.panel.benchmark_sma200[row],
        }
    }

    /// Same clamping rule as [`Self::view_at`], but just the price map
    /// (§4.3 `CurrentPrices`), which is all `PortfolioManager` needs for
    /// mark-to-market and trade execution.
    pub fn current_prices(&self, day: NaiveDate) -> HashMap<String, Decimal> {
        let Some(row) = self.row_at_or_before(day) else {
            return HashMap::new();
        };
        self.panel
            .prices
            .iter()
            .filter_map(|(symbol, series)| series[row].map(|p| (symbol.clone(), p)))
            .collect()
    }

    /// Last trading day of each calendar month present in the panel
    /// (§4.3 `MonthEndDays`).
    pub fn month_end_days(&self) -> Vec<NaiveDate> {
        use chrono::Datelike;
        let mut out = Vec::new();
        for window in self.panel.days.windows(2) {
            let (current, next) = (window[0], window[1]);
            if current.year() != next.year() || current.month() != next.month() {
                out.push(current);
            }
        }
        if let Some(&last) = self.panel.days.last() {
            out.push(last);
        }
        out
    }

    /// Forward-filled closes for `symbol` from the first observed bar up to
    /// and including the row at or before `day`, in day order. Used by
    /// callers that need a trailing-close slice for multi-month momentum
    /// (`return_n`) rather than a single point-in-time scalar — `view_at`
    /// cannot serve that since it only exposes one row at a time.
    pub fn trailing_closes(&self, symbol: &str, day: NaiveDate) -> Vec<Decimal> {
        let Some(row) = self.row_at_or_before(day) else {
            return Vec::new();
        };
        match self.panel.prices.get(symbol) {
            Some(series) => series[..=row].iter().filter_map(|v| *v).collect(),
            None => Vec::new(),
        }
    }

    /// The day index from `warmup` trading days after the first row onward
    /// (§4.3 `BacktestWindow`).
    pub fn backtest_window(&self, warmup: usize) -> &[NaiveDate] {
        if warmup >= self.panel.days.len() {
            &[]
        } else {
            &self.panel.days[warmup..]
        }
    }
}
