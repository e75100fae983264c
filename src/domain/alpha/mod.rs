//! Per-strategy screening predicates (§4.7): short-circuiting gate chains
//! that decide whether a candidate is actionable, plus the exit engines the
//! pullback and phoenix strategies pair with.

pub mod phoenix;
pub mod pullback;
pub mod swing;

/// Outcome of a short-circuiting gate chain. `Fail` carries the gate name
/// and a human-readable reason so the Screener can surface diagnostics
/// (§2 C10: "emitting a ranked target list plus diagnostic reasons").
#[derive(Debug, Clone, PartialEq)]
pub enum FilterVerdict {
    Pass,
    Fail { gate: &'static str, reason: String },
}

impl FilterVerdict {
    pub fn is_pass(&self) -> bool {
        matches!(self, FilterVerdict::Pass)
    }
}

/// Runs gates in order, stopping at (and returning) the first failure.
macro_rules! gate {
    ($cond:expr, $name:expr, $reason:expr) => {
        if !$cond {
            return FilterVerdict::Fail {
                gate: $name,
                reason: $reason,
            };
        }
    };
}
pub(crate) use gate;
