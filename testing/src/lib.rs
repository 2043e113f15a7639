//! # Racepay Testing
//!
//! Testing utilities for the registration services.
//!
//! This crate provides:
//! - Deterministic clocks and reference generators
//! - [`InMemoryRegistrationStore`] with failure injection
//! - [`ScriptedTransport`], a gateway that replays canned responses
//! - [`RecordingDispatcher`], a message dispatcher that records what it sends
//! - proptest strategies for inventory keys and hold requests
//! - fixture builders for runners, registrants and groups
//!
//! ## Example
//!
//! ```ignore
//! use racepay_testing::{InMemoryRegistrationStore, ScriptedTransport, Step, test_clock};
//!
//! #[tokio::test]
//! async fn test_mobile_payment_approved() {
//!     let store = Arc::new(InMemoryRegistrationStore::new());
//!     let transport = Arc::new(ScriptedTransport::new([Step::approved()]));
//!     // build the orchestrator around them...
//! }
//! ```

use chrono::{DateTime, Duration, Utc};
use racepay_core::environment::{Clock, ReferenceGenerator};

pub mod dispatch_mocks;
pub mod fixtures;
pub mod gateway_mocks;
pub mod memory_store;
pub mod strategies;

pub use dispatch_mocks::RecordingDispatcher;
pub use gateway_mocks::{ScriptedTransport, Step};
pub use memory_store::{FailPoint, InMemoryRegistrationStore};
pub use mocks::{FixedClock, ManualClock, SequentialReferences, test_clock};

/// Mock implementations of Environment traits
pub mod mocks {
    #![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity

    use super::{Clock, DateTime, Duration, ReferenceGenerator, Utc};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::{Arc, Mutex};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use racepay_testing::mocks::FixedClock;
    /// use racepay_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Clock that only moves when told to.
    ///
    /// Clones share the same time, so a test can keep one handle and hand the
    /// other to the code under test.
    #[derive(Debug, Clone)]
    pub struct ManualClock {
        time: Arc<Mutex<DateTime<Utc>>>,
    }

    impl ManualClock {
        /// Start at `time`.
        #[must_use]
        pub fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Arc::new(Mutex::new(time)),
            }
        }

        /// Move forward by `by`.
        pub fn advance(&self, by: Duration) {
            let mut time = self.time.lock().unwrap();
            *time += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.time.lock().unwrap()
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(epoch())
    }

    /// 2025-01-01 00:00:00 UTC.
    #[must_use]
    pub fn epoch() -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_735_689_600, 0).unwrap_or_default()
    }

    /// Predictable references: `{prefix}000001`, `{prefix}000002`, ...
    ///
    /// Scripted values are handed out first, which lets a test force a
    /// collision with an already recorded reference.
    #[derive(Debug)]
    pub struct SequentialReferences {
        prefix: String,
        next: AtomicU64,
        script: Mutex<VecDeque<String>>,
    }

    impl SequentialReferences {
        /// Sequential references with the given prefix.
        #[must_use]
        pub fn new(prefix: impl Into<String>) -> Self {
            Self {
                prefix: prefix.into(),
                next: AtomicU64::new(1),
                script: Mutex::new(VecDeque::new()),
            }
        }

        /// Hand out `values` before falling back to the sequence.
        #[must_use]
        pub fn with_script<I, S>(self, values: I) -> Self
        where
            I: IntoIterator<Item = S>,
            S: Into<String>,
        {
            self.script
                .lock()
                .unwrap()
                .extend(values.into_iter().map(Into::into));
            self
        }
    }

    impl Default for SequentialReferences {
        fn default() -> Self {
            Self::new("REF")
        }
    }

    impl ReferenceGenerator for SequentialReferences {
        fn next_reference(&self) -> String {
            if let Some(scripted) = self.script.lock().unwrap().pop_front() {
                return scripted;
            }
            let n = self.next.fetch_add(1, Ordering::SeqCst);
            format!("{}{n:06}", self.prefix)
        }
    }
}
