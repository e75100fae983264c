//! The `BarSource` capability (§6 External interfaces): the abstraction
//! `BarStore` fetches through, implemented once per upstream backend
//! (Kiwoom-style domestic REST, Yahoo-style global ETF/FX, the desktop-COM
//! bridge) plus a deterministic in-memory fixture for tests.

use crate::domain::errors::BarStoreError;
use crate::domain::market::Bar;
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Per-symbol static metadata used by the liquidity gate (§4.7) when ADTV
/// alone is unavailable, and by cost/market inference.
#[derive(Debug, Clone, Default)]
pub struct InstrumentInfo {
    pub market_type: Option<String>,
    pub sector: Option<String>,
    pub market_cap: Option<Decimal>,
    pub ats_eligible: bool,
}

/// One upstream backend capable of producing bars for a symbol. Adapters own
/// their own pagination and retry policy internally; `BarStore` only sees a
/// flat `[fromDay, toDay]` request and a monotone ascending result.
#[async_trait]
pub trait BarSource: Send + Sync {
    /// A short, stable identifier used to partition the on-disk cache
    /// (`cache/<name>/<symbol>...json`, §6).
    fn name(&self) -> &str;

    async fn fetch_minute_bars(&self, symbol: &str, from: NaiveDate, to: NaiveDate) -> Result<Vec<Bar>, BarStoreError>;

    async fn fetch_daily_bars(&self, symbol: &str, from: NaiveDate, to: NaiveDate) -> Result<Vec<Bar>, BarStoreError>;

    /// Batched metadata lookup (≤200 symbols per call, §6); adapters that
    /// cannot batch may simply loop internally.
    async fn fetch_instrument_info(&self, symbols: &[String]) -> Result<HashMap<String, InstrumentInfo>, BarStoreError>;
}

/// A deterministic, in-memory `BarSource` backed by fixture data (§6): the
/// reference implementation exercised by the test suite in place of any
/// network call.
#[derive(Debug, Default)]
pub struct FixtureBarSource {
    name: String,
    daily: HashMap<String, Vec<Bar>>,
    minute: HashMap<String, Vec<Bar>>,
    info: HashMap<String, InstrumentInfo>,
}

impl FixtureBarSource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            daily: HashMap::new(),
            minute: HashMap::new(),
            info: HashMap::new(),
        }
    }

    pub fn with_daily_bars(mut self, symbol: impl Into<String>, bars: Vec<Bar>) -> Self {
        self.daily.insert(symbol.into(), bars);
        self
    }

    pub fn with_minute_bars(mut self, symbol: impl Into<String>, bars: Vec<Bar>) -> Self {
        self.minute.insert(symbol.into(), bars);
        self
    }

    pub fn with_instrument_info(mut self, symbol: impl Into<String>, info: InstrumentInfo) -> Self {
        self.info.insert(symbol.into(), info);
        self
    }
}

#[async_trait]
impl BarSource for FixtureBarSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_minute_bars(&self, symbol: &str, from: NaiveDate, to: NaiveDate) -> Result<Vec<Bar>, BarStoreError> {
        Ok(self
            .minute
            .get(symbol)
            .map(|bars| bars.iter().filter(|b| b.instant >= from && b.instant <= to).copied().collect())
            .unwrap_or_default())
    }

    async fn fetch_daily_bars(&self, symbol: &str, from: NaiveDate, to: NaiveDate) -> Result<Vec<Bar>, BarStoreError> {
        Ok(self
            .daily
            .get(symbol)
            .map(|bars| bars.iter().filter(|b| b.instant >= from && b.instant <= to).copied().collect())
            .unwrap_or_default())
    }

    async fn fetch_instrument_info(&self, symbols: &[String]) -> Result<HashMap<String, InstrumentInfo>, BarStoreError> {
        Ok(symbols
            .iter()
            .filter_map(|s| self.info.get(s).map(|info| (s.clone(), info.clone())))
            .collect())
    }
}
