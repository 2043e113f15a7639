//! Application wiring and lifecycle.
//!
//! [`run`] brings the service up and down:
//!
//! 1. **Startup**: validate config, install the metrics recorder, connect and
//!    migrate `PostgreSQL`, build the gateway transport and dispatcher
//! 2. **Runtime**: serve the API, the metrics endpoint, the reservation
//!    sweeper and the notifier worker
//! 3. **Shutdown**: on Ctrl+C or SIGTERM the API stops accepting requests,
//!    background tasks are signalled and awaited up to the configured timeout

use crate::config::{Config, ConfigError};
use crate::gateway::{GatewayAdapter, HttpGatewayTransport};
use crate::ledger::Ledger;
use crate::metrics::{install_recorder, metrics_router};
use crate::notifier::{ConsoleDispatcher, Notifier, NotifierWorker, WebhookDispatcher};
use crate::orchestrator::Orchestrator;
use crate::server::{AppState, build_router, shutdown_signal};
use crate::sweeper::Sweeper;
use metrics_exporter_prometheus::BuildError;
use racepay_core::dispatch::{DispatchError, MessageDispatcher};
use racepay_core::gateway::{GatewayTransport, TransportError};
use racepay_core::store::{RegistrationStore, StoreError};
use racepay_postgres::PostgresRegistrationStore;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Failures that stop the service from starting.
#[derive(Error, Debug)]
pub enum StartupError {
    /// Configuration is unusable
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Database connection or migration failed
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Gateway HTTP client could not be built
    #[error("gateway transport error: {0}")]
    Transport(#[from] TransportError),

    /// Notification dispatcher could not be built
    #[error("dispatcher error: {0}")]
    Dispatch(#[from] DispatchError),

    /// Prometheus recorder could not be installed
    #[error("metrics error: {0}")]
    Metrics(#[from] BuildError),

    /// Listener bind or serve failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Everything the service runs, wired but not yet started.
pub struct Services {
    /// Handler state
    pub state: AppState,
    /// Reservation sweeper
    pub sweeper: Sweeper,
    /// Notifier queue consumer
    pub notifier_worker: NotifierWorker,
}

impl Services {
    /// Wire the services over the given store, gateway transport and
    /// dispatcher.
    #[must_use]
    pub fn build(
        config: &Config,
        store: Arc<dyn RegistrationStore>,
        transport: Arc<dyn GatewayTransport>,
        dispatcher: Arc<dyn MessageDispatcher>,
    ) -> Self {
        let (notifier, notifier_worker) = Notifier::new(
            Arc::clone(&store),
            dispatcher,
            config.notifier.queue_capacity,
            config.notifier.delivery_policy(),
            config.notifier.resend_policy(),
        );

        let gateway = GatewayAdapter::new(transport, config.gateway.timeout());
        let orchestrator = Orchestrator::new(
            Arc::clone(&store),
            gateway,
            notifier.clone(),
            config.gateway.retry_policy(),
            config.registration.clone(),
        );

        let sweeper = Sweeper::new(Arc::clone(&store), config.sweeper.batch_size);
        let state = AppState::new(
            Arc::new(orchestrator),
            notifier,
            Ledger::new(Arc::clone(&store)),
            store,
        );

        Self {
            state,
            sweeper,
            notifier_worker,
        }
    }
}

/// Run the service until a shutdown signal arrives.
///
/// # Errors
///
/// Returns [`StartupError`] if any component fails to start or the API
/// listener fails while serving.
pub async fn run(config: Config) -> Result<(), StartupError> {
    config.validate()?;

    let metrics_handle = install_recorder()?;
    info!("✓ Metrics recorder installed");

    info!(max_connections = config.database.max_connections, "Connecting to PostgreSQL");
    let store = PostgresRegistrationStore::connect(
        &config.database.url,
        config.database.max_connections,
        config.database.connect_timeout,
    )
    .await?;
    store.migrate().await?;
    info!("✓ Store ready");

    let transport = HttpGatewayTransport::new(
        config.gateway.url.clone(),
        config.gateway.api_key.clone(),
        config.gateway.timeout(),
    )?;

    let dispatcher: Arc<dyn MessageDispatcher> = match &config.notifier.webhook_url {
        Some(url) => {
            info!(url = %url, "Delivering confirmations by webhook");
            Arc::new(WebhookDispatcher::new(url.clone(), config.gateway.timeout())?)
        },
        None => {
            info!("No webhook configured, logging confirmations to the console");
            Arc::new(ConsoleDispatcher)
        },
    };

    let services = Services::build(&config, Arc::new(store), Arc::new(transport), dispatcher);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut handles: Vec<(&'static str, JoinHandle<()>)> = Vec::new();

    let sweeper = services.sweeper;
    let sweep_period = config.sweeper.interval();
    let rx = shutdown_rx.clone();
    handles.push((
        "sweeper",
        tokio::spawn(async move { sweeper.run(sweep_period, rx).await }),
    ));

    let worker = services.notifier_worker;
    let rx = shutdown_rx.clone();
    handles.push(("notifier", tokio::spawn(worker.run(rx))));

    let metrics_listener = tokio::net::TcpListener::bind(config.server.metrics_address()).await?;
    info!(address = %config.server.metrics_address(), "Metrics endpoint listening");
    let mut rx = shutdown_rx.clone();
    handles.push((
        "metrics",
        tokio::spawn(async move {
            let stopped = async move {
                let _ = rx.wait_for(|stop| *stop).await;
            };
            if let Err(e) = axum::serve(metrics_listener, metrics_router(metrics_handle))
                .with_graceful_shutdown(stopped)
                .await
            {
                warn!(error = %e, "Metrics server failed");
            }
        }),
    ));

    let listener = tokio::net::TcpListener::bind(config.server.address()).await?;
    info!(address = %config.server.address(), "HTTP server listening for requests");

    let served = axum::serve(listener, build_router(services.state))
        .with_graceful_shutdown(shutdown_signal())
        .await;

    info!("HTTP server stopped, initiating graceful shutdown...");
    let _ = shutdown_tx.send(true);
    await_shutdown(handles, Duration::from_secs(config.server.shutdown_timeout)).await;

    served?;
    info!("Graceful shutdown complete");
    Ok(())
}

async fn await_shutdown(handles: Vec<(&'static str, JoinHandle<()>)>, timeout: Duration) {
    let deadline = tokio::time::Instant::now() + timeout;
    for (task, handle) in handles {
        match tokio::time::timeout_at(deadline, handle).await {
            Ok(Ok(())) => info!(task, "Task stopped gracefully"),
            Ok(Err(e)) => warn!(task, error = %e, "Task failed"),
            Err(_) => warn!(task, "Task shutdown timed out"),
        }
    }
}
