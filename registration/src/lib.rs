//! Race slot registration service.
//!
//! Sells a strictly limited inventory of race slots, each bound to a shirt
//! `(size, gender)`, to groups of runners paying through a mobile payment
//! gateway or a manual channel (bank transfer, cash).
//!
//! # Flow
//!
//! ```text
//! POST /api/registrations
//!        │
//!        ▼
//!   validate ──► idempotency replay? ──► hold inventory (atomic, all lines)
//!                                               │
//!                                               ▼
//!                                     persist group (pending)
//!                                               │
//!                  ┌────────────────────────────┴───────────────┐
//!                  ▼                                            ▼
//!          mobile payment                               manual payment
//!     gateway, bounded retries                        confirm immediately
//!        │            │         │
//!        ▼            ▼         ▼
//!    confirmed     rejected   ambiguous (rejected, manual review)
//!    commit hold   release    release
//!        │
//!        ▼
//!   notifier queue (never blocks or fails the payment)
//! ```
//!
//! Groups left open past their reservation window are expired by the
//! [`sweeper`], which releases their holds.
//!
//! # Modules
//!
//! - [`ledger`]: hold, commit and release of inventory units
//! - [`gateway`]: payment adapter with response classification
//! - [`orchestrator`]: the registration and payment workflow
//! - [`notifier`]: confirmation delivery with retries and manual resend
//! - [`sweeper`]: periodic expiry of stale reservations
//! - [`api`] and [`server`]: HTTP surface
//! - [`app`]: wiring and lifecycle

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod api;
pub mod app;
pub mod config;
pub mod gateway;
pub mod ledger;
pub mod metrics;
pub mod notifier;
pub mod orchestrator;
pub mod server;
pub mod sweeper;

pub use app::{Services, StartupError, run};
pub use config::{Config, ConfigError};
pub use ledger::{Ledger, LedgerError};
pub use notifier::{Notifier, NotifierWorker, NotifyError};
pub use orchestrator::{Orchestrator, RegistrationError};
pub use server::{AppState, build_router};
pub use sweeper::{SweepReport, Sweeper};
