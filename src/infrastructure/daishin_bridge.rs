//! Desktop COM-bridge adapter (§6): a `BarSource` that talks to a
//! same-host FastAPI process fronting a 32-bit HTS COM object, reached over
//! plain localhost HTTP rather than in-process COM interop.

use crate::domain::errors::BarStoreError;
use crate::domain::market::Bar;
use crate::infrastructure::bar_source::{BarSource, InstrumentInfo};
use crate::infrastructure::http_client::HttpClientFactory;
use crate::infrastructure::rate_limiter::RateLimiter;
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest_middleware::ClientWithMiddleware;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::info;

/// Domestic codes are addressed on the bridge with an `A` market prefix,
/// the standard `"A" + code` convention for KOSPI/KOSDAQ.
fn bridge_code(symbol: &str) -> String {
    if symbol.chars().all(|c| c.is_ascii_digit()) {
        format!("A{symbol}")
    } else {
        symbol.to_string()
    }
}

#[derive(Debug, Deserialize)]
struct BridgeChartResponse {
    status: String,
    #[serde(default)]
    data: Vec<BridgeChartRow>,
}

#[derive(Debug, Deserialize)]
struct BridgeChartRow {
    date: String,
    open: Decimal,
    high: Decimal,
    low: Decimal,
    close: Decimal,
    volume: Decimal,
}

fn parse_row(row: &BridgeChartRow) -> Option<Bar> {
    let instant = NaiveDate::parse_from_str(&row.date, "%Y%m%d").ok().or_else(|| NaiveDate::parse_from_str(&row.date, "%Y-%m-%d").ok())?;
    Some(Bar {
        instant,
        open: row.open,
        high: row.high,
        low: row.low,
        close: row.close,
        volume: row.volume,
        trade_value: None,
    })
}

/// Talks to a locally-running bridge process exposing `GET
/// /api/dostk/chart?stk_cd=...&count=...`. The bridge owns the HTS login
/// session; this adapter assumes it is already authenticated and simply
/// polls for chart data.
pub struct DaishinBridgeBarSource {
    client: ClientWithMiddleware,
    base_url: String,
    rate_limiter: RateLimiter,
}

impl DaishinBridgeBarSource {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: HttpClientFactory::create_client(),
            base_url: base_url.into(),
            rate_limiter: RateLimiter::default_for_rest(),
        }
    }
}

#[async_trait]
impl BarSource for DaishinBridgeBarSource {
    fn name(&self) -> &str {
        "daishin_bridge"
    }

    async fn fetch_minute_bars(&self, symbol: &str, _from: NaiveDate, _to: NaiveDate) -> Result<Vec<Bar>, BarStoreError> {
        Err(BarStoreError::Fetch {
            symbol: symbol.to_string(),
            source: self.name().to_string(),
            reason: "the bridge's chart endpoint serves daily bars only".to_string(),
        })
    }

    async fn fetch_daily_bars(&self, symbol: &str, from: NaiveDate, to: NaiveDate) -> Result<Vec<Bar>, BarStoreError> {
        self.rate_limiter.throttle(None).await;

        // requested span plus a small cushion, capped generously: the bridge
        // has no date-range parameter, only a trailing-count window.
        let span_days = (to - from).num_days().max(1) as u32 + 10;

        let url = format!("{}/api/dostk/chart", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("stk_cd", bridge_code(symbol)), ("count", span_days.to_string())])
            .send()
            .await
            .map_err(|e| BarStoreError::Fetch {
                symbol: symbol.to_string(),
                source: self.name().to_string(),
                reason: e.to_string(),
            })?;

        let body: BridgeChartResponse = response.json().await.map_err(|e| BarStoreError::Fetch {
            symbol: symbol.to_string(),
            source: self.name().to_string(),
            reason: e.to_string(),
        })?;
        if body.status != "success" {
            return Err(BarStoreError::Fetch {
                symbol: symbol.to_string(),
                source: self.name().to_string(),
                reason: format!("bridge returned status {}", body.status),
            });
        }

        let bars: Vec<Bar> = body.data.iter().filter_map(parse_row).filter(|b| b.instant >= from && b.instant <= to).collect();
        info!(symbol, n_bars = bars.len(), "daishin bridge bars fetched");
        Ok(bars)
    }

    async fn fetch_instrument_info(&self, symbols: &[String]) -> Result<HashMap<String, InstrumentInfo>, BarStoreError> {
        Ok(symbols.iter().map(|s| (s.clone(), InstrumentInfo::default())).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bridge_code_prefixes_numeric_symbols() {
        assert_eq!(bridge_code("005930"), "A005930");
        assert_eq!(bridge_code("SPY"), "SPY");
    }

    #[test]
    fn parse_row_accepts_compact_and_hyphenated_dates() {
        let compact = BridgeChartRow {
            date: "20240115".to_string(),
            open: Decimal::new(100, 0),
            high: Decimal::new(101, 0),
            low: Decimal::new(99, 0),
            close: Decimal::new(100, 0),
            volume: Decimal::new(10, 0),
        };
        assert!(parse_row(&compact).is_some());

        let hyphenated = BridgeChartRow {
            date: "2024-01-15".to_string(),
            ..compact
        };
        assert_eq!(parse_row(&hyphenated).unwrap().instant, NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
    }
}
