//! Process-wide degradation switch.

use concierge_core::DegradationMode;
use std::sync::atomic::{AtomicU8, Ordering};
use tracing::warn;

use crate::observability::metrics as resilience_metrics;

/// Holds the current [`DegradationMode`].
///
/// Reads and writes are single atomic operations; a new mode is visible to
/// every subsequent reader.
#[derive(Debug, Default)]
pub struct DegradationController {
    mode: AtomicU8,
}

impl DegradationController {
    pub fn new(mode: DegradationMode) -> Self {
        Self {
            mode: AtomicU8::new(mode.as_u8()),
        }
    }

    /// Overwrites the mode unconditionally and returns the previous one.
    pub fn set_mode(&self, mode: DegradationMode) -> DegradationMode {
        let previous = DegradationMode::from_u8(self.mode.swap(mode.as_u8(), Ordering::SeqCst))
            .unwrap_or_default();
        if previous != mode {
            warn!(from = %previous, to = %mode, "Degradation mode changed");
        }
        resilience_metrics::record_degradation_mode(mode);
        previous
    }

    pub fn mode(&self) -> DegradationMode {
        DegradationMode::from_u8(self.mode.load(Ordering::SeqCst)).unwrap_or_default()
    }

    pub fn is_read_only(&self) -> bool {
        self.mode().is_read_only()
    }

    pub fn is_offline(&self) -> bool {
        self.mode().is_offline()
    }
}
