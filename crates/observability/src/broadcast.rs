//! Broadcast message log
//!
//! Default [`BroadcastSink`]: every message is logged at WARN under the
//! `broadcast` target and kept in a bounded history for display.
//! When full, the oldest message is overwritten.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use contracts::BroadcastSink;
use ringbuf::{traits::*, HeapRb};

/// Default number of retained messages
pub const DEFAULT_BROADCAST_HISTORY: usize = 64;

/// Bounded log of user-visible broadcast messages
pub struct BroadcastLog {
    history: Mutex<HeapRb<String>>,
    total: AtomicU64,
}

impl fmt::Debug for BroadcastLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BroadcastLog")
            .field("retained", &self.history.lock().unwrap().occupied_len())
            .field("total", &self.total_messages())
            .finish()
    }
}

impl Default for BroadcastLog {
    fn default() -> Self {
        Self::new(DEFAULT_BROADCAST_HISTORY)
    }
}

impl BroadcastLog {
    /// Create a log keeping the last `history` messages (at least one)
    pub fn new(history: usize) -> Self {
        Self {
            history: Mutex::new(HeapRb::new(history.max(1))),
            total: AtomicU64::new(0),
        }
    }

    /// Retained messages, oldest first
    pub fn recent(&self) -> Vec<String> {
        self.history.lock().unwrap().iter().cloned().collect()
    }

    /// Messages received since creation, including overwritten ones
    pub fn total_messages(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    /// Retained messages containing `needle`
    pub fn count_containing(&self, needle: &str) -> usize {
        self.history
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.contains(needle))
            .count()
    }
}

impl BroadcastSink for BroadcastLog {
    fn send_broadcast_message(&self, text: &str) {
        tracing::warn!(target: "broadcast", message = %text);
        self.total.fetch_add(1, Ordering::Relaxed);
        self.history
            .lock()
            .unwrap()
            .push_overwrite(text.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retains_recent_messages() {
        let log = BroadcastLog::new(2);
        log.send_broadcast_message("first");
        log.send_broadcast_message("second");
        log.send_broadcast_message("third");

        assert_eq!(log.recent(), vec!["second".to_string(), "third".to_string()]);
        assert_eq!(log.total_messages(), 3);
    }

    #[test]
    fn test_count_containing() {
        let log = BroadcastLog::default();
        log.send_broadcast_message("NPX TIMESTAMP JUMP: 50");
        log.send_broadcast_message("calibration missing");
        assert_eq!(log.count_containing("TIMESTAMP JUMP"), 1);
    }

    #[test]
    fn test_usable_as_dyn_sink() {
        let log = std::sync::Arc::new(BroadcastLog::default());
        let sink: std::sync::Arc<dyn BroadcastSink> = log.clone();
        sink.send_broadcast_message("hello");
        assert_eq!(log.recent(), vec!["hello".to_string()]);
    }
}
