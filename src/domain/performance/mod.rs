//! Post-run performance analysis (§4.9): CAGR, drawdown, risk-adjusted
//! ratios, win rates, regime breakdown, and FIFO-replayed trade-level
//! statistics, computed from an equity curve and trade log.

pub mod calculator;
pub mod metrics;
pub mod stats;

pub use calculator::PerformanceAnalyzer;
pub use metrics::{DrawdownInfo, PerformanceReport, RegimeBreakdown, TradeStats};
