//! Reservation sweeper.
//!
//! Expires groups whose reservation window closed without a terminal status
//! and returns their held units. The transition is conditional on the group
//! still being pending or processing, so a confirmation that lands between
//! the scan and the update wins and the sweeper skips the group.

use crate::ledger::Ledger;
use crate::metrics;
use racepay_core::environment::{Clock, SystemClock};
use racepay_core::store::{HoldDisposition, RegistrationStore, SettleOutcome, Settlement};
use racepay_core::types::PaymentStatus;
use racepay_runtime::run_periodic;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Counts from one sweeper pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Overdue groups found
    pub scanned: usize,
    /// Groups moved to `expired`
    pub expired: usize,
    /// Groups that settled elsewhere before the sweeper got to them
    pub skipped: usize,
    /// Groups left for the next pass because the store failed
    pub failed: usize,
}

/// Periodic expiry of overdue holds.
pub struct Sweeper {
    store: Arc<dyn RegistrationStore>,
    ledger: Ledger,
    clock: Arc<dyn Clock>,
    batch_size: usize,
}

impl Sweeper {
    /// Sweeper expiring at most `batch_size` groups per pass.
    #[must_use]
    pub fn new(store: Arc<dyn RegistrationStore>, batch_size: usize) -> Self {
        Self {
            ledger: Ledger::new(Arc::clone(&store)),
            store,
            clock: Arc::new(SystemClock),
            batch_size,
        }
    }

    /// Replace the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Run one pass.
    ///
    /// Never fails: store errors are logged and the affected groups are
    /// retried on the next pass.
    pub async fn sweep_once(&self) -> SweepReport {
        let now = self.clock.now();
        let mut report = SweepReport::default();

        let overdue = match self.store.overdue_groups(now, self.batch_size).await {
            Ok(groups) => groups,
            Err(e) => {
                tracing::warn!(error = %e, "Sweeper could not list overdue groups");
                report.failed = 1;
                return report;
            },
        };
        report.scanned = overdue.len();

        for group in overdue {
            let settlement = Settlement {
                code: group.code.clone(),
                expected: PaymentStatus::OPEN.to_vec(),
                to: PaymentStatus::Expired,
                disposition: HoldDisposition::Release,
                at: now,
                gateway_reference: None,
            };

            match self.ledger.settle(settlement).await {
                Ok(SettleOutcome::Settled { .. }) => {
                    report.expired += 1;
                    metrics::record_registration(PaymentStatus::Expired);
                    tracing::info!(
                        group_code = %group.code,
                        reserved_until = %group.reserved_until,
                        runners = group.runners.len(),
                        "Reservation expired"
                    );
                },
                Ok(SettleOutcome::Stale { current }) => {
                    report.skipped += 1;
                    tracing::debug!(group_code = %group.code, %current, "Expiry skipped: group settled meanwhile");
                },
                Ok(SettleOutcome::HoldUnavailable { state }) => {
                    report.skipped += 1;
                    tracing::error!(
                        group_code = %group.code,
                        status = %group.status,
                        hold_state = state.as_str(),
                        "Open group holds committed inventory; needs an operator"
                    );
                },
                Ok(SettleOutcome::NotFound) => {
                    report.skipped += 1;
                },
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(group_code = %group.code, error = %e, "Expiry failed; retrying next pass");
                },
            }
        }

        if report.expired > 0 {
            metrics::record_expired(report.expired as u64);
        }
        if report.scanned > 0 {
            tracing::info!(
                scanned = report.scanned,
                expired = report.expired,
                skipped = report.skipped,
                failed = report.failed,
                "Sweeper pass finished"
            );
        }

        report
    }

    /// Sweep every `period` until `shutdown` flips. Passes never overlap.
    pub async fn run(&self, period: Duration, shutdown: watch::Receiver<bool>) {
        run_periodic("reservation_sweeper", period, shutdown, || async {
            self.sweep_once().await;
        })
        .await;
    }
}
