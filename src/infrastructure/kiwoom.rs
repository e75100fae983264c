//! Domestic brokerage REST adapter (§6), modelled on the Kiwoom `ka10081`
//! daily-chart endpoint: `POST /api/dostk/chart` with an `api-id` header
//! selecting the report and a `cont-yn`/`next-key` header pair driving
//! continuation pagination.

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
use tracing::{info, warn};

/// Pagination is bounded at this many continuation requests per symbol
/// (§4.1 "bounded... when cursor state repeats").
const MAX_PAGES: usize = 3;
/// Stop paginating once this many raw records have accumulated, a headroom
/// bound rather than a hard daily-bar count.
const MIN_RECORDS_BEFORE_EARLY_STOP: usize = 20;

#[derive(Debug, Deserialize)]
struct KiwoomDailyResponse {
    #[serde(rename = "stk_dt_pole_chart_qr", default)]
    rows: Vec<KiwoomDailyRow>,
}

#[derive(Debug, Deserialize)]
struct KiwoomDailyRow {
    dt: String,
    open_pric: String,
    high_pric: String,
    low_pric: String,
    cur_prc: String,
    trde_qty: String,
}

fn parse_signed_decimal(raw: &str) -> Decimal {
    raw.replace('+', "").parse().unwrap_or(Decimal::ZERO)
}

fn parse_row(row: &KiwoomDailyRow) -> Option<Bar> {
    let instant = NaiveDate::parse_from_str(&row.dt, "%Y%m%d").ok()?;
    let open = parse_signed_decimal(&row.open_pric);
    let high = parse_signed_decimal(&row.high_pric);
    let low = parse_signed_decimal(&row.low_pric);
    let close = parse_signed_decimal(&row.cur_prc);
    let volume = parse_signed_decimal(&row.trde_qty);
    Some(Bar {
        instant,
        open,
        high,
        low,
        close,
        volume,
        trade_value: None,
    })
}

pub struct KiwoomBarSource {
    client: ClientWithMiddleware,
    domain: String,
    access_token: String,
    rate_limiter: RateLimiter,
}

impl KiwoomBarSource {
    pub fn new(domain: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            client: HttpClientFactory::create_client(),
            domain: domain.into(),
            access_token: access_token.into(),
            rate_limiter: RateLimiter::default_for_rest(),
        }
    }

    async fn fetch_page(&self, symbol: &str, base_day: NaiveDate, cont_yn: &str, next_key: &str) -> Result<(Vec<KiwoomDailyRow>, String, String), BarStoreError> {
        self.rate_limiter.throttle(None).await;

        let url = format!("{}/api/dostk/chart", self.domain);
        let mut request = self
            .client
            .post(&url)
            .header("api-id", "ka10081")
            .header("authorization", format!("Bearer {}", self.access_token))
            .header("Content-Type", "application/json;charset=UTF-8")
            .json(&serde_json::json!({
                "stk_cd": symbol,
                "base_dt": base_day.format("%Y%m%d").to_string(),
                "upd_stkpc_tp": "1",
            }));
        if cont_yn == "Y" {
            request = request.header("cont-yn", "Y").header("next-key", next_key);
        }

        let response = request.send().await.map_err(|e| BarStoreError::Fetch {
            symbol: symbol.to_string(),
            source: self.name().to_string(),
            reason: e.to_string(),
        })?;

        let next_cont_yn = response.headers().get("cont-yn").and_then(|v| v.to_str().ok()).unwrap_or("N").to_string();
        let next_next_key = response.headers().get("next-key").and_then(|v| v.to_str().ok()).unwrap_or("").to_string();

        let body: KiwoomDailyResponse = response.json().await.map_err(|e| BarStoreError::Fetch {
            symbol: symbol.to_string(),
            source: self.name().to_string(),
            reason: e.to_string(),
        })?;
        Ok((body.rows, next_cont_yn, next_next_key))
    }
}

#[async_trait]
impl BarSource for KiwoomBarSource {
    fn name(&self) -> &str {
        "kiwoom"
    }

    async fn fetch_minute_bars(&self, symbol: &str, _from: NaiveDate, _to: NaiveDate) -> Result<Vec<Bar>, BarStoreError> {
        Err(BarStoreError::Fetch {
            symbol: symbol.to_string(),
            source: self.name().to_string(),
            reason: "minute bars are not served by the ka10081 daily-chart report".to_string(),
        })
    }

    /// Pages backward from `to` via the `cont-yn`/`next-key` cursor, bounded
    /// at [`MAX_PAGES`] requests or until the cursor stops advancing or the
    /// fetch crosses `from` (§4.1).
    async fn fetch_daily_bars(&self, symbol: &str, from: NaiveDate, to: NaiveDate) -> Result<Vec<Bar>, BarStoreError> {
        let mut all_rows: Vec<KiwoomDailyRow> = Vec::new();
        let mut cont_yn = String::new();
        let mut next_key = String::new();
        let mut seen_keys: Vec<String> = Vec::new();

        for _ in 0..MAX_PAGES {
            let (rows, next_cont_yn, new_next_key) = self.fetch_page(symbol, to, &cont_yn, &next_key).await?;
            if rows.is_empty() {
                break;
            }
            all_rows.extend(rows);

            if all_rows.len() >= MIN_RECORDS_BEFORE_EARLY_STOP {
                break;
            }
            if next_cont_yn != "Y" {
                break;
            }
            if seen_keys.contains(&new_next_key) {
                warn!(symbol, "kiwoom pagination cursor repeated, stopping (loop detection)");
                break;
            }
            seen_keys.push(new_next_key.clone());
            cont_yn = next_cont_yn;
            next_key = new_next_key;

            let oldest_seen = all_rows.last().and_then(|r| NaiveDate::parse_from_str(&r.dt, "%Y%m%d").ok());
            if oldest_seen.is_some_and(|d| d < from) {
                break;
            }
        }

        let bars: Vec<Bar> = all_rows.iter().filter_map(parse_row).filter(|b| b.instant >= from && b.instant <= to).collect();
        info!(symbol, n_bars = bars.len(), "kiwoom daily bars fetched");
        Ok(bars)
    }

    async fn fetch_instrument_info(&self, symbols: &[String]) -> Result<HashMap<String, InstrumentInfo>, BarStoreError> {
        // The ka10081 report carries no sector/market-cap metadata; a real
        // deployment would call the companion stock-basic-info report here.
        Ok(symbols.iter().map(|s| (s.clone(), InstrumentInfo::default())).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_row_strips_sign_prefix_and_parses_date() {
        let row = KiwoomDailyRow {
            dt: "20240115".to_string(),
            open_pric: "+10500".to_string(),
            high_pric: "+10800".to_string(),
            low_pric: "-10300".to_string(),
            cur_prc: "+10700".to_string(),
            trde_qty: "123456".to_string(),
        };
        let bar = parse_row(&row).unwrap();
        assert_eq!(bar.instant, NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
        assert_eq!(bar.open, Decimal::new(10500, 0));
        assert_eq!(bar.low, Decimal::new(-10300, 0));
    }

    #[test]
    fn parse_row_rejects_unparseable_date() {
        let row = KiwoomDailyRow {
            dt: "not-a-date".to_string(),
            open_pric: "100".to_string(),
            high_pric: "100".to_string(),
            low_pric: "100".to_string(),
            cur_prc: "100".to_string(),
            trde_qty: "100".to_string(),
        };
        assert!(parse_row(&row).is_none());
    }
}
