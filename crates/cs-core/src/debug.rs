//! Per-component diagnostic switches

use serde::{Deserialize, Serialize};

/// Which components log their individual decisions at `info`
///
/// Passed to each component at construction. Decisions are always logged at
/// `debug`; a set flag promotes them so they show up under the default filter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugOptions {
    pub presence: bool,
    pub schedule: bool,
    pub buffer: bool,
}

impl DebugOptions {
    /// Every component verbose
    pub fn all() -> Self {
        Self {
            presence: true,
            schedule: true,
            buffer: true,
        }
    }
}

#[doc(hidden)]
pub use tracing as __tracing;

/// Log a component decision at `info` when `$verbose` is set, else at `debug`
///
/// ```ignore
/// decision!(self.debug.buffer, entity = %entity, delta, "Suppressing change");
/// ```
#[macro_export]
macro_rules! decision {
    ($verbose:expr, $($arg:tt)+) => {
        if $verbose {
            $crate::__tracing::info!($($arg)+)
        } else {
            $crate::__tracing::debug!($($arg)+)
        }
    };
}
