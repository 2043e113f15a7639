//! Recording message dispatcher.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)]

use racepay_core::BoxFuture;
use racepay_core::dispatch::{DispatchError, MessageDispatcher, OutboundMessage};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

/// Dispatcher that records delivered messages.
///
/// It can be told to fail its first `n` sends (transiently) or to refuse
/// every message outright.
#[derive(Debug, Default)]
pub struct RecordingDispatcher {
    sent: Mutex<Vec<OutboundMessage>>,
    failures_left: AtomicU32,
    attempts: AtomicU32,
    reject_all: bool,
}

impl RecordingDispatcher {
    /// Dispatcher that accepts everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Dispatcher whose first `n` sends fail with a transport error.
    #[must_use]
    pub fn failing_first(n: u32) -> Self {
        Self {
            failures_left: AtomicU32::new(n),
            ..Self::default()
        }
    }

    /// Dispatcher that rejects every message.
    #[must_use]
    pub fn rejecting() -> Self {
        Self {
            reject_all: true,
            ..Self::default()
        }
    }

    /// Messages delivered so far.
    #[must_use]
    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().unwrap().clone()
    }

    /// Send attempts, failed ones included.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl MessageDispatcher for RecordingDispatcher {
    fn send(&self, message: OutboundMessage) -> BoxFuture<'_, Result<(), DispatchError>> {
        Box::pin(async move {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if self.reject_all {
                return Err(DispatchError::Rejected(format!(
                    "recipient {} refused",
                    message.recipient
                )));
            }
            let failed = self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
                .is_ok();
            if failed {
                return Err(DispatchError::Transport("mail relay unreachable".to_string()));
            }
            self.sent.lock().unwrap().push(message);
            Ok(())
        })
    }
}
