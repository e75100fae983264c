//! `BarStore` (§4.1): the incremental, cache-first `BarSeries` provider
//! every component above the infrastructure layer reads through.

use crate::domain::errors::BarStoreError;
use crate::domain::market::BarSeries;
use crate::infrastructure::bar_source::BarSource;
use chrono::{Local, NaiveDate};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Cache-first, incrementally-filled `BarSeries` store (§4.1). One instance
/// is shared (by reference) across every `BarSource` adapter in a run; the
/// in-memory map is keyed by `(source name, symbol)` so the same symbol
/// fetched from two backends never collides.
pub struct BarStore {
    cache_root: PathBuf,
    memory: RwLock<HashMap<(String, String), BarSeries>>,
}

impl BarStore {
    pub fn new(cache_root: impl Into<PathBuf>) -> Self {
        Self {
            cache_root: cache_root.into(),
            memory: RwLock::new(HashMap::new()),
        }
    }

    fn cache_path(&self, source_name: &str, symbol: &str) -> PathBuf {
        self.cache_root.join(source_name).join(format!("{symbol}.json"))
    }

    /// `Load(symbol)` (§4.1): the full in-memory series for one source,
    /// reading through to disk on first access. Never touches the network.
    pub async fn load(&self, source_name: &str, symbol: &str) -> Result<BarSeries, BarStoreError> {
        if let Some(series) = self.memory.read().await.get(&(source_name.to_string(), symbol.to_string())) {
            return Ok(series.clone());
        }
        let series = read_disk(&self.cache_path(source_name, symbol)).await?.unwrap_or_default();
        self.memory
            .write()
            .await
            .insert((source_name.to_string(), symbol.to_string()), series.clone());
        Ok(series)
    }

    /// `EnsureRange(symbol, source, fromDay, toDay)` (§4.1): the minimal
    /// incremental fetch that guarantees the returned series covers
    /// `[fromDay, toDay]` (clamped to today). On the hot path (cache already
    /// sufficient) this performs no I/O at all beyond the initial `Load`.
    pub async fn ensure_range(&self, symbol: &str, source: &dyn BarSource, from: NaiveDate, to: NaiveDate) -> Result<BarSeries, BarStoreError> {
        let today = Local::now().date_naive();
        let clamped_to = to.min(today);
        let cached = self.load(source.name(), symbol).await?;

        let sufficient = match (cached.earliest(), cached.latest()) {
            (Some(min_cached), Some(max_cached)) => min_cached <= from && max_cached >= clamped_to,
            _ => false,
        };
        if sufficient {
            return Ok(cached);
        }

        let fetch_from = cached.earliest().map(|d| d.min(from)).unwrap_or(from);
        let fetched = match source.fetch_daily_bars(symbol, fetch_from, clamped_to).await {
            Ok(bars) => bars,
            Err(err) => {
                if !cached.is_empty() {
                    warn!(symbol, source = source.name(), error = %err, "bar fetch failed, serving cache");
                    return Ok(cached);
                }
                return Err(BarStoreError::NoCacheAvailable {
                    symbol: symbol.to_string(),
                    reason: err.to_string(),
                });
            }
        };

        let mut merged = cached;
        let dropped = merged.merge(fetched);
        if dropped > 0 {
            info!(symbol, source = source.name(), dropped, "dropped invalid/duplicate bars during merge");
        }

        write_disk(&self.cache_path(source.name(), symbol), &merged).await?;
        self.memory
            .write()
            .await
            .insert((source.name().to_string(), symbol.to_string()), merged.clone());
        Ok(merged)
    }
}

async fn read_disk(path: &Path) -> Result<Option<BarSeries>, BarStoreError> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => {
            let series: BarSeries = serde_json::from_str(&content).map_err(|e| BarStoreError::CacheIo {
                symbol: path.display().to_string(),
                reason: e.to_string(),
            })?;
            Ok(Some(series))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(BarStoreError::CacheIo {
            symbol: path.display().to_string(),
            reason: e.to_string(),
        }),
    }
}

/// Atomic write-temp-then-rename (§4.1, §9, §10): guards against a partial
/// file on a crash mid-write.
async fn write_disk(path: &Path, series: &BarSeries) -> Result<(), BarStoreError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(|e| BarStoreError::CacheIo {
            symbol: path.display().to_string(),
            reason: e.to_string(),
        })?;
    }
    let content = serde_json::to_string_pretty(series).map_err(|e| BarStoreError::CacheIo {
        symbol: path.display().to_string(),
        reason: e.to_string(),
    })?;
    let tmp_path = path.with_extension("tmp");
    tokio::fs::write(&tmp_path, content).await.map_err(|e| BarStoreError::CacheIo {
        symbol: path.display().to_string(),
        reason: e.to_string(),
    })?;
    tokio::fs::rename(&tmp_path, path).await.map_err(|e| BarStoreError::CacheIo {
        symbol: path.display().to_string(),
        reason: e.to_string(),
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market::Bar;
    use crate::infrastructure::bar_source::FixtureBarSource;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicU64, Ordering};

    static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

    fn temp_cache_dir() -> PathBuf {
        let unique = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
        std::env::temp_dir().join(format!("quantrade_barstore_test_{}_{}", std::process::id(), unique))
    }

    fn bar(d: i64, close: Decimal) -> Bar {
        Bar {
            instant: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap() + chrono::Duration::days(d),
            open: close,
            high: close,
            low: close,
            close,
            volume: dec!(1000),
            trade_value: None,
        }
    }

    #[tokio::test]
    async fn ensure_range_fetches_then_caches_to_disk() {
        let dir = temp_cache_dir();
        let store = BarStore::new(&dir);
        let bars: Vec<Bar> = (0..30).map(|i| bar(i, Decimal::from(100 + i))).collect();
        let source = FixtureBarSource::new("fixture").with_daily_bars("A", bars);

        let from = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        let to = NaiveDate::from_ymd_opt(2020, 1, 10).unwrap();
        let series = store.ensure_range("A", &source, from, to).await.unwrap();
        assert!(!series.is_empty());

        let path = store.cache_path("fixture", "A");
        assert!(path.exists());

        tokio::fs::remove_dir_all(&dir).await.ok();
    }

    #[tokio::test]
    async fn ensure_range_is_idempotent_on_sufficient_cache() {
        let dir = temp_cache_dir();
        let store = BarStore::new(&dir);
        let bars: Vec<Bar> = (0..30).map(|i| bar(i, Decimal::from(100 + i))).collect();
        let source = FixtureBarSource::new("fixture").with_daily_bars("A", bars);

        let from = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        let to = NaiveDate::from_ymd_opt(2020, 1, 10).unwrap();
        let first = store.ensure_range("A", &source, from, to).await.unwrap();

        // A source with no data at all: a second EnsureRange call within the
        // already-cached range must not need to fetch anything.
        let empty_source = FixtureBarSource::new("fixture");
        let second = store.ensure_range("A", &empty_source, from, to).await.unwrap();
        assert_eq!(first.len(), second.len());

        tokio::fs::remove_dir_all(&dir).await.ok();
    }

    #[tokio::test]
    async fn fetch_failure_with_cache_falls_back_to_cache() {
        struct FailingSource;
        #[async_trait::async_trait]
        impl BarSource for FailingSource {
            fn name(&self) -> &str {
                "failing"
            }
            async fn fetch_minute_bars(&self, _s: &str, _f: NaiveDate, _t: NaiveDate) -> Result<Vec<Bar>, BarStoreError> {
                unreachable!()
            }
            async fn fetch_daily_bars(&self, symbol: &str, _f: NaiveDate, _t: NaiveDate) -> Result<Vec<Bar>, BarStoreError> {
                Err(BarStoreError::Fetch {
                    symbol: symbol.to_string(),
                    source: "failing".to_string(),
                    reason: "network down".to_string(),
                })
            }
            async fn fetch_instrument_info(&self, _s: &[String]) -> Result<HashMap<String, crate::infrastructure::bar_source::InstrumentInfo>, BarStoreError> {
                Ok(HashMap::new())
            }
        }

        let dir = temp_cache_dir();
        let store = BarStore::new(&dir);
        let bars: Vec<Bar> = (0..30).map(|i| bar(i, Decimal::from(100 + i))).collect();
        let seed_source = FixtureBarSource::new("failing").with_daily_bars("A", bars);
        let from = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        let to = NaiveDate::from_ymd_opt(2020, 1, 10).unwrap();
        store.ensure_range("A", &seed_source, from, to).await.unwrap();

        // Force a cache miss on a wider range so the store must call the
        // (failing) source; cache still has data, so EnsureRange degrades
        // gracefully instead of erroring.
        let wider_to = NaiveDate::from_ymd_opt(2020, 2, 1).unwrap();
        let result = store.ensure_range("A", &FailingSource, from, wider_to).await;
        assert!(result.is_ok());

        tokio::fs::remove_dir_all(&dir).await.ok();
    }

    #[tokio::test]
    async fn fetch_failure_with_no_cache_errors() {
        struct FailingSource;
        #[async_trait::async_trait]
        impl BarSource for FailingSource {
            fn name(&self) -> &str {
                "failing_empty"
            }
            async fn fetch_minute_bars(&self, _s: &str, _f: NaiveDate, _t: NaiveDate) -> Result<Vec<Bar>, BarStoreError> {
                unreachable!()
            }
            async fn fetch_daily_bars(&self, symbol: &str, _f: NaiveDate, _t: NaiveDate) -> Result<Vec<Bar>, BarStoreError> {
                Err(BarStoreError::Fetch {
                    symbol: symbol.to_string(),
                    source: "failing_empty".to_string(),
                    reason: "network down".to_string(),
                })
            }
            async fn fetch_instrument_info(&self, _s: &[String]) -> Result<HashMap<String, crate::infrastructure::bar_source::InstrumentInfo>, BarStoreError> {
                Ok(HashMap::new())
            }
        }

        let dir = temp_cache_dir();
        let store = BarStore::new(&dir);
        let from = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        let to = NaiveDate::from_ymd_opt(2020, 1, 10).unwrap();
        let result = store.ensure_range("Z", &FailingSource, from, to).await;
        assert!(matches!(result, Err(BarStoreError::NoCacheAvailable { .. })));

        tokio::fs::remove_dir_all(&dir).await.ok();
    }
}
