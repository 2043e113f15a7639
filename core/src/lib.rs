//! # Racepay Core
//!
//! Core types and contracts for selling a strictly limited race slot inventory
//! through several payment channels.
//!
//! This crate has no I/O of its own. It defines:
//!
//! - **Domain types**: sizes, genders, inventory counters, registration groups,
//!   gateway attempts ([`types`])
//! - **Gateway contract**: the closed error taxonomy and the transport trait the
//!   payment adapter drives ([`gateway`])
//! - **Persistence contract**: the transactional store the ledger, orchestrator
//!   and sweeper write through ([`store`])
//! - **Message dispatch contract**: used by the confirmation notifier ([`dispatch`])
//! - **Environment**: injected clock and reference generation ([`environment`])
//!
//! ## Architecture Principles
//!
//! - Inventory counters are only written through the store's atomic operations
//! - Every external dependency sits behind a trait and is injected
//! - Traits used behind `Arc<dyn _>` return boxed futures to stay dyn-compatible

pub mod dispatch;
pub mod gateway;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};

use std::future::Future;
use std::pin::Pin;

/// Boxed, sendable future returned by dyn-compatible traits in this workspace.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Environment module - Dependency injection traits
///
/// Time and reference generation are abstracted so that reservation windows,
/// expiry and gateway references are deterministic under test.
pub mod environment {
    use chrono::{DateTime, Utc};
    use uuid::Uuid;

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```
    /// use racepay_core::environment::{Clock, SystemClock};
    ///
    /// let clock = SystemClock;
    /// let _now = clock.now();
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Production clock backed by the system time.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }

    /// Source of payment references.
    ///
    /// Every gateway call carries a reference that must never have been used
    /// before. Generators only propose candidates; uniqueness against recorded
    /// attempts is checked by the caller.
    pub trait ReferenceGenerator: Send + Sync {
        /// Propose a fresh reference.
        fn next_reference(&self) -> String;
    }

    /// Random reference generator (`RP` + 16 upper-case hex digits).
    #[derive(Debug, Clone, Copy, Default)]
    pub struct RandomReferenceGenerator;

    impl ReferenceGenerator for RandomReferenceGenerator {
        fn next_reference(&self) -> String {
            let simple = Uuid::new_v4().simple().to_string().to_uppercase();
            format!("RP{}", &simple[..16])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::environment::{RandomReferenceGenerator, ReferenceGenerator};

    #[test]
    fn random_references_are_prefixed_and_distinct() {
        let generator = RandomReferenceGenerator;
        let first = generator.next_reference();
        let second = generator.next_reference();

        assert!(first.starts_with("RP"));
        assert_eq!(first.len(), 18);
        assert_ne!(first, second);
    }
}
