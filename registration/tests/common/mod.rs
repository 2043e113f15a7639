//! Shared wiring for the registration integration tests.
//!
//! Every service runs against the in-memory store, the scripted gateway and
//! the recording dispatcher, with a manual clock so reservation windows can be
//! crossed without waiting.

#![allow(clippy::unwrap_used, dead_code)]

use racepay_core::store::RegistrationStore;
use racepay_core::types::{Gender, InventoryKey, PaymentMethod, Size};
use racepay_registration::config::{NotifierConfig, RegistrationConfig};
use racepay_registration::gateway::GatewayAdapter;
use racepay_registration::orchestrator::{RegistrationRequest, RunnerInput};
use racepay_registration::{Notifier, NotifierWorker, Orchestrator, Sweeper};
use racepay_runtime::RetryPolicy;
use racepay_testing::fixtures::registrant;
use racepay_testing::mocks::epoch;
use racepay_testing::{
    InMemoryRegistrationStore, ManualClock, RecordingDispatcher, ScriptedTransport,
    SequentialReferences, Step,
};
use std::sync::Arc;
use std::time::Duration;

pub fn registration_config() -> RegistrationConfig {
    RegistrationConfig {
        reservation_window_hours: 72,
        slot_price_cents: 2_500,
        currency: "USD".to_string(),
        max_runners_per_group: 20,
    }
}

/// Notifier settings at their defaults, minus the pauses.
pub fn notifier_config() -> NotifierConfig {
    NotifierConfig {
        max_retries: 3,
        base_delay_ms: 0,
        resend_attempts: 2,
        queue_capacity: 16,
        webhook_url: None,
    }
}

/// Backoff without pauses so retries run at full speed.
pub fn instant_policy(attempts: u32) -> RetryPolicy {
    RetryPolicy::builder()
        .max_attempts(attempts)
        .initial_delay(Duration::ZERO)
        .max_delay(Duration::ZERO)
        .build()
}

pub struct World {
    pub store: InMemoryRegistrationStore,
    pub transport: Arc<ScriptedTransport>,
    pub dispatcher: Arc<RecordingDispatcher>,
    pub clock: ManualClock,
    pub orchestrator: Arc<Orchestrator>,
    pub notifier: Notifier,
    pub worker: Option<NotifierWorker>,
    pub sweeper: Sweeper,
}

impl World {
    pub async fn new(steps: Vec<Step>, stock: &[(InventoryKey, u32)]) -> Self {
        Self::with_dispatcher(steps, stock, RecordingDispatcher::new()).await
    }

    pub async fn with_dispatcher(
        steps: Vec<Step>,
        stock: &[(InventoryKey, u32)],
        dispatcher: RecordingDispatcher,
    ) -> Self {
        let store = InMemoryRegistrationStore::new();
        for (key, units) in stock {
            store.configure_stock(*key, *units).await.unwrap();
        }
        let shared: Arc<dyn RegistrationStore> = Arc::new(store.clone());

        let transport = Arc::new(ScriptedTransport::new(steps));
        let dispatcher = Arc::new(dispatcher);
        let clock = ManualClock::new(epoch());

        let notifier_config = notifier_config();
        let (notifier, worker) = Notifier::new(
            Arc::clone(&shared),
            dispatcher.clone(),
            notifier_config.queue_capacity,
            notifier_config.delivery_policy(),
            notifier_config.resend_policy(),
        );

        let orchestrator = Orchestrator::new(
            Arc::clone(&shared),
            GatewayAdapter::new(transport.clone(), Duration::from_secs(15)),
            notifier.clone(),
            instant_policy(3),
            registration_config(),
        )
        .with_clock(Arc::new(clock.clone()))
        .with_references(Arc::new(SequentialReferences::new("RP")));

        let sweeper = Sweeper::new(shared, 100).with_clock(Arc::new(clock.clone()));

        Self {
            store,
            transport,
            dispatcher,
            clock,
            orchestrator: Arc::new(orchestrator),
            notifier,
            worker: Some(worker),
            sweeper,
        }
    }
}

pub fn medium_female() -> InventoryKey {
    InventoryKey::new(Size::M, Gender::Female)
}

pub fn large_male() -> InventoryKey {
    InventoryKey::new(Size::L, Gender::Male)
}

pub fn runner_input(identification: &str, key: InventoryKey) -> RunnerInput {
    RunnerInput {
        full_name: format!("Runner {identification}"),
        identification: identification.to_string(),
        size: key.size.to_string(),
        gender: key.gender.to_string(),
        birth_date: None,
        email: None,
    }
}

pub fn request(runners: Vec<RunnerInput>, payment_method: PaymentMethod) -> RegistrationRequest {
    RegistrationRequest {
        idempotency_key: None,
        registrant: registrant(),
        runners,
        payment_method,
    }
}
