//! Fixed-interval background loops.
//!
//! A pass is awaited inline, so a slow pass delays the next tick instead of
//! running alongside it. Shutdown is observed between passes; a pass that has
//! started always finishes.

use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval};

/// Run `pass` every `period` until `shutdown` flips to `true` or its sender is
/// dropped.
///
/// The first pass runs immediately.
pub async fn run_periodic<F, Fut>(
    name: &'static str,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
    mut pass: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tracing::info!(task = name, period_ms = period.as_millis(), "Periodic task started");

    while !*shutdown.borrow() {
        tokio::select! {
            _ = ticker.tick() => {
                pass().await;
            }
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    tracing::info!(task = name, "Periodic task stopped");
}
