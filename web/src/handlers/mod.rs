//! HTTP request handlers shared by racepay services.

pub mod health;

pub use health::{health_check, readiness};
