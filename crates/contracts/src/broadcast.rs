//! BroadcastSink trait - user-visible status messages
//!
//! Acquisition code reports conditions the operator should see (timestamp
//! jumps, missing calibration) through a fire-and-forget sink.

/// Receiver of user-visible broadcast messages
///
/// Implementations must not block: the acquisition thread calls this from
/// its hot loop.
pub trait BroadcastSink: Send + Sync {
    fn send_broadcast_message(&self, text: &str);
}

impl<F> BroadcastSink for F
where
    F: Fn(&str) + Send + Sync,
{
    fn send_broadcast_message(&self, text: &str) {
        self(text)
    }
}
