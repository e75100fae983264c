//! Infrastructure layer: everything that touches disk or the network. The
//! domain layer never imports from here; `application` wires these adapters
//! into the domain's pure decision logic.

pub mod bar_source;
pub mod bar_store;
pub mod concurrency;
pub mod daishin_bridge;
pub mod http_client;
pub mod kiwoom;
pub mod persistence;
pub mod phoenix_loader;
pub mod rate_limiter;
pub mod yahoo_global;
