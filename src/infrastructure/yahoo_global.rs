//! Global ETF and USD/KRW FX adapter (§6), modelled on Yahoo Finance's
//! public chart endpoint. Serves the fixed global-ETF universe the preset
//! allocator scores against (§4.4) plus the `USDKRW=X` FX pair
//! `PortfolioManager` needs for base-currency conversion (§4.6).

use crate::domain::errors::BarStoreError;
use crate::domain::market::Bar;
use crate::infrastructure::bar_source::{BarSource, InstrumentInfo};
use crate::infrastructure::http_client::HttpClientFactory;
use crate::infrastructure::rate_limiter::RateLimiter;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest_middleware::ClientWithMiddleware;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::info;

/// The platform's fixed global multi-asset universe: exactly the tickers
/// named across `domain::scoring::global`'s category tables
/// (`GlobalEquity`/`Bonds`/`Commodities`), plus the cash-equivalent ticker.
/// Kept in lockstep with those tables so a fetch using this list always has
/// a panel row for every ticker the preset allocator can select.
pub const DEFAULT_TICKERS: &[&str] =
    &["SPY", "IWM", "EFA", "EEM", "AGG", "IEF", "TLT", "TIP", "VNQ", "DBC", "GLD", "SHY"];

/// The FX pair `PortfolioManager` needs to convert global-market prices into
/// KRW base currency.
pub const USDKRW_SYMBOL: &str = "USDKRW=X";

#[derive(Debug, Deserialize)]
struct YahooChartResponse {
    chart: YahooChart,
}

#[derive(Debug, Deserialize)]
struct YahooChart {
    result: Option<Vec<YahooChartResult>>,
}

#[derive(Debug, Deserialize)]
struct YahooChartResult {
    timestamp: Option<Vec<i64>>,
    indicators: YahooIndicators,
}

#[derive(Debug, Deserialize)]
struct YahooIndicators {
    quote: Vec<YahooQuote>,
}

#[derive(Debug, Deserialize, Default)]
struct YahooQuote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

fn to_decimal(v: Option<f64>) -> Decimal {
    v.and_then(Decimal::from_f64).unwrap_or(Decimal::ZERO)
}

fn parse_chart(body: YahooChartResponse) -> Vec<Bar> {
    let Some(result) = body.chart.result.and_then(|mut r| if r.is_empty() { None } else { Some(r.remove(0)) }) else {
        return Vec::new();
    };
    let Some(timestamps) = result.timestamp else {
        return Vec::new();
    };
    let Some(quote) = result.indicators.quote.into_iter().next() else {
        return Vec::new();
    };

    timestamps
        .into_iter()
        .enumerate()
        .filter_map(|(i, ts)| {
            let instant = DateTime::<Utc>::from_timestamp(ts, 0)?.date_naive();
            let close = to_decimal(quote.close.get(i).copied().flatten());
            if close <= Decimal::ZERO {
                return None;
            }
            Some(Bar {
                instant,
                open: to_decimal(quote.open.get(i).copied().flatten()),
                high: to_decimal(quote.high.get(i).copied().flatten()),
                low: to_decimal(quote.low.get(i).copied().flatten()),
                close,
                volume: to_decimal(quote.volume.get(i).copied().flatten()),
                trade_value: None,
            })
        })
        .collect()
}

pub struct YahooGlobalBarSource {
    client: ClientWithMiddleware,
    base_url: String,
    rate_limiter: RateLimiter,
}

impl YahooGlobalBarSource {
    pub fn new() -> Self {
        Self {
            client: HttpClientFactory::create_client(),
            base_url: "https://query1.finance.yahoo.com".to_string(),
            rate_limiter: RateLimiter::default_for_rest(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

impl Default for YahooGlobalBarSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BarSource for YahooGlobalBarSource {
    fn name(&self) -> &str {
        "yahoo_global"
    }

    async fn fetch_minute_bars(&self, symbol: &str, _from: NaiveDate, _to: NaiveDate) -> Result<Vec<Bar>, BarStoreError> {
        Err(BarStoreError::Fetch {
            symbol: symbol.to_string(),
            source: self.name().to_string(),
            reason: "minute granularity is not served for the global ETF/FX universe".to_string(),
        })
    }

    async fn fetch_daily_bars(&self, symbol: &str, from: NaiveDate, to: NaiveDate) -> Result<Vec<Bar>, BarStoreError> {
        self.rate_limiter.throttle(None).await;

        let url = format!("{}/v8/finance/chart/{symbol}", self.base_url);
        let period1 = from.and_hms_opt(0, 0, 0).unwrap().and_utc().timestamp();
        let period2 = to.and_hms_opt(23, 59, 59).unwrap().and_utc().timestamp();

        let response = self
            .client
            .get(&url)
            .query(&[("period1", period1.to_string()), ("period2", period2.to_string()), ("interval", "1d".to_string())])
            .send()
            .await
            .map_err(|e| BarStoreError::Fetch {
                symbol: symbol.to_string(),
                source: self.name().to_string(),
                reason: e.to_string(),
            })?;

        let body: YahooChartResponse = response.json().await.map_err(|e| BarStoreError::Fetch {
            symbol: symbol.to_string(),
            source: self.name().to_string(),
            reason: e.to_string(),
        })?;

        let bars: Vec<Bar> = parse_chart(body).into_iter().filter(|b| b.instant >= from && b.instant <= to).collect();
        info!(symbol, n_bars = bars.len(), "yahoo global bars fetched");
        Ok(bars)
    }

    async fn fetch_instrument_info(&self, symbols: &[String]) -> Result<HashMap<String, InstrumentInfo>, BarStoreError> {
        Ok(symbols
            .iter()
            .map(|s| {
                (
                    s.clone(),
                    InstrumentInfo {
                        market_type: Some("global_etf".to_string()),
                        ..Default::default()
                    },
                )
            })
            .collect())
    }
}
