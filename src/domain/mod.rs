//! Domain layer: the bar/instrument data model, indicator kernels, scoring,
//! regime classification, portfolio execution, alpha filters, and
//! performance analysis. No I/O lives here — only [`crate::infrastructure`]
//! and [`crate::application`] touch disk or the network.

pub mod alpha;
pub mod errors;
pub mod market;
pub mod performance;
pub mod regime;
pub mod scoring;
pub mod trading;
