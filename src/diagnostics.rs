//! Session-scoped, de-duplicated warnings.
//!
//! Non-fatal anomalies (sequence mismatch, odd versions, short value cells,
//! misflagged names) are reported through `tracing` once per parsing session
//! and kept so callers can inspect them after a walk.

use std::collections::BTreeSet;
use std::sync::Mutex;
use tracing::warn;

/// De-duplicating warning sink owned by one [`Hive`](crate::Hive).
#[derive(Debug, Default)]
pub struct Diagnostics {
    seen: Mutex<BTreeSet<String>>,
}

impl Diagnostics {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Logs `message` at warn level unless it has been logged before.
    ///
    /// Returns true when the message was new.
    pub fn warn_once(&self, message: impl Into<String>) -> bool {
        let message = message.into();
        let mut seen = self.seen.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if seen.contains(&message) {
            return false;
        }
        warn!(%message, "hive anomaly");
        seen.insert(message);
        true
    }

    /// All distinct messages recorded so far, sorted.
    pub fn messages(&self) -> Vec<String> {
        self.seen
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    /// True when nothing has been reported.
    pub fn is_empty(&self) -> bool {
        self.seen
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warn_once_deduplicates() {
        let diagnostics = Diagnostics::new();
        assert!(diagnostics.is_empty());
        assert!(diagnostics.warn_once("sequence mismatch: 3 != 4"));
        assert!(!diagnostics.warn_once("sequence mismatch: 3 != 4"));
        assert!(diagnostics.warn_once("unexpected version 2.0"));
        assert_eq!(diagnostics.messages().len(), 2);
    }
}
