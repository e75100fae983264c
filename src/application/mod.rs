//! Application layer: wires the domain's pure decision logic to a
//! [`crate::infrastructure::bar_store::BarStore`]-backed panel, driving
//! either a full historical backtest or a single point-in-time screen.

pub mod data_handler;
pub mod orchestrator;
pub mod pullback_orchestrator;
pub mod screener;
pub mod swing_orchestrator;
