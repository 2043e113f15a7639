//! Application state shared by the HTTP handlers.

use crate::ledger::Ledger;
use crate::notifier::Notifier;
use crate::orchestrator::Orchestrator;
use axum::extract::FromRef;
use racepay_core::store::RegistrationStore;
use std::sync::Arc;

/// Handles to every service a handler may need. Cloned per request.
#[derive(Clone)]
pub struct AppState {
    /// Registration and payment flow
    pub orchestrator: Arc<Orchestrator>,
    /// Confirmation queue and manual resend
    pub notifier: Notifier,
    /// Inventory counters
    pub ledger: Ledger,
    /// Backing store, for readiness probes
    pub store: Arc<dyn RegistrationStore>,
}

impl AppState {
    /// Bundle the services.
    #[must_use]
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        notifier: Notifier,
        ledger: Ledger,
        store: Arc<dyn RegistrationStore>,
    ) -> Self {
        Self {
            orchestrator,
            notifier,
            ledger,
            store,
        }
    }
}

// Lets the shared readiness handler extract the store from AppState
impl FromRef<AppState> for Arc<dyn RegistrationStore> {
    fn from_ref(state: &AppState) -> Self {
        Arc::clone(&state.store)
    }
}
