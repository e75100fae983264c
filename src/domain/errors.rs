//! Typed domain error kinds (§7). Per-symbol/per-day failures are recovered
//! locally by the caller (logged and skipped); [`BacktestError`] variants are
//! run-fatal and abort the orchestrator.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use thiserror::Error;

/// Errors surfaced by [`crate::infrastructure::bar_store::BarStore`] and the
/// `BarSource` adapters that feed it.
#[derive(Debug, Error)]
pub enum BarStoreError {
    /// Insufficient history for the indicator window requested. Recovered
    /// locally by the caller treating the result as `none`.
    #[error("data gap for {symbol}: need {needed} bars, have {available}")]
    DataGap {
        symbol: String,
        needed: usize,
        available: usize,
    },

    /// Transient network/backend error while fetching bars. Recoverable with
    /// a cached fallback when one exists.
    #[error("fetch failed for {symbol} from {source}: {reason}")]
    Fetch {
        symbol: String,
        source: String,
        reason: String,
    },

    /// Upstream signalled throttling; caller should sleep and retry within
    /// the retry budget, converting to `Fetch` once the budget is exhausted.
    #[error("rate limited by {source}: retry after {retry_after_ms}ms")]
    RateLimitBackoff { source: String, retry_after_ms: u64 },

    #[error("cache io error for {symbol}: {reason}")]
    CacheIo { symbol: String, reason: String },

    #[error("no cached data available for {symbol} and fetch failed: {reason}")]
    NoCacheAvailable { symbol: String, reason: String },
}

/// Errors that abort a backtest or screener run outright (§7
/// `ConfigError` / `InvariantViolation`).
#[derive(Debug, Error)]
pub enum BacktestError {
    #[error("unknown preset: {name}")]
    UnknownPreset { name: String },

    #[error("unsupported weight method: {name}")]
    UnsupportedWeightMethod { name: String },

    #[error("invalid date range: start {start} is not before end {end}")]
    InvalidDateRange { start: NaiveDate, end: NaiveDate },

    #[error("panel is not strictly monotone at index {index} (day {day})")]
    NonMonotonePanel { index: usize, day: NaiveDate },

    #[error("cash went negative: {cash}")]
    NegativeCash { cash: Decimal },

    #[error("target weights sum to {sum}, exceeding 1+eps")]
    WeightsExceedOne { sum: Decimal },

    #[error("bear regime rebalance has non-zero weight for {symbol}: {weight}")]
    BearRegimeNonZeroWeight { symbol: String, weight: Decimal },

    #[error(transparent)]
    BarStore(#[from] BarStoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_gap_message_names_symbol_and_counts() {
        let err = BarStoreError::DataGap {
            symbol: "005930".into(),
            needed: 252,
            available: 40,
        };
        let msg = err.to_string();
        assert!(msg.contains("005930"));
        assert!(msg.contains("252"));
        assert!(msg.contains("40"));
    }

    #[test]
    fn backtest_error_wraps_bar_store_error() {
        let inner = BarStoreError::Fetch {
            symbol: "SPY".into(),
            source: "yahoo".into(),
            reason: "timeout".into(),
        };
        let wrapped: BacktestError = inner.into();
        assert!(wrapped.to_string().contains("SPY"));
    }
}
