//! Retry logic with exponential backoff for handling transient failures.
//!
//! A [`RetryPolicy`] bounds the number of *attempts* (first try included) and
//! computes the pause after each failed attempt: `initial_delay * multiplier^n`,
//! capped at `max_delay`, plus up to `jitter` of random spread so that callers
//! failing together do not retry in lockstep.
//!
//! # Example
//!
//! ```rust
//! use racepay_runtime::retry::{RetryPolicy, retry_with_predicate};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let policy = RetryPolicy::builder()
//!     .max_attempts(3)
//!     .initial_delay(Duration::from_secs(1))
//!     .max_delay(Duration::from_secs(8))
//!     .jitter(Duration::from_millis(250))
//!     .build();
//!
//! let value = retry_with_predicate(
//!     &policy,
//!     || async { Ok::<_, String>(42) },
//!     |err: &String| err.contains("transient"),
//! )
//! .await?;
//! # Ok(())
//! # }
//! ```

use rand::Rng;
use std::fmt;
use std::time::Duration;
use tokio::time::sleep;

/// Retry policy configuration for exponential backoff.
///
/// # Default Values
///
/// - `max_attempts`: 3
/// - `initial_delay`: 100ms
/// - `max_delay`: 30 seconds
/// - `multiplier`: 2.0 (delay doubles each retry)
/// - `jitter`: none
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts, the first one included
    pub max_attempts: u32,
    /// Delay after the first failed attempt
    pub initial_delay: Duration,
    /// Maximum delay between attempts (cap for exponential backoff)
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub multiplier: f64,
    /// Upper bound of the random spread added to each delay
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl RetryPolicy {
    /// Create a new policy builder.
    #[must_use]
    pub const fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: Duration::ZERO,
        }
    }

    /// Whether another attempt is allowed after `attempts` have been made.
    #[must_use]
    pub const fn allows_another(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }

    /// Delay after the failed attempt with 0-based index `failed_attempt`,
    /// without jitter.
    ///
    /// `initial_delay * multiplier^failed_attempt`, capped at `max_delay`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    pub fn delay_for_attempt(&self, failed_attempt: u32) -> Duration {
        if failed_attempt == 0 {
            return self.initial_delay.min(self.max_delay);
        }

        let exponent = i32::try_from(failed_attempt).unwrap_or(i32::MAX);
        let delay_ms = self.initial_delay.as_millis() as f64 * self.multiplier.powi(exponent);

        if !delay_ms.is_finite() || delay_ms >= self.max_delay.as_millis() as f64 {
            self.max_delay
        } else {
            Duration::from_millis(delay_ms as u64)
        }
    }

    /// [`Self::delay_for_attempt`] plus a uniform random spread in `[0, jitter]`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn jittered_delay(&self, failed_attempt: u32) -> Duration {
        let base = self.delay_for_attempt(failed_attempt);
        let spread = self.jitter.as_millis() as u64;
        if spread == 0 {
            return base;
        }
        base + Duration::from_millis(rand::thread_rng().gen_range(0..=spread))
    }
}

/// Builder for [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct RetryPolicyBuilder {
    max_attempts: u32,
    initial_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
    jitter: Duration,
}

impl RetryPolicyBuilder {
    /// Set maximum number of attempts (at least one is always made).
    #[must_use]
    pub const fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Set delay after the first failed attempt.
    #[must_use]
    pub const fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set maximum delay (cap for exponential backoff).
    #[must_use]
    pub const fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set multiplier for exponential backoff.
    #[must_use]
    pub const fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Set the random spread added to each delay.
    #[must_use]
    pub const fn jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    /// Build the [`RetryPolicy`].
    #[must_use]
    pub fn build(self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            initial_delay: self.initial_delay,
            max_delay: self.max_delay,
            multiplier: self.multiplier,
            jitter: self.jitter,
        }
    }
}

/// Why a retried operation gave up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryError<E> {
    /// Every allowed attempt failed.
    Exhausted {
        /// Attempts made
        attempts: u32,
        /// Error of the last attempt
        error: E,
    },
    /// An attempt failed with an error the predicate refused to retry.
    NotRetryable {
        /// Attempts made
        attempts: u32,
        /// The non-retryable error
        error: E,
    },
}

impl<E> RetryError<E> {
    /// Attempts made before giving up.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        match self {
            Self::Exhausted { attempts, .. } | Self::NotRetryable { attempts, .. } => *attempts,
        }
    }

    /// The last error.
    #[must_use]
    pub const fn error(&self) -> &E {
        match self {
            Self::Exhausted { error, .. } | Self::NotRetryable { error, .. } => error,
        }
    }

    /// Consume into the last error.
    pub fn into_error(self) -> E {
        match self {
            Self::Exhausted { error, .. } | Self::NotRetryable { error, .. } => error,
        }
    }
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exhausted { attempts, error } => {
                write!(f, "gave up after {attempts} attempts: {error}")
            },
            Self::NotRetryable { attempts, error } => {
                write!(f, "non-retryable failure on attempt {attempts}: {error}")
            },
        }
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for RetryError<E> {}

/// Retry an async operation with exponential backoff, treating every error as
/// retryable.
///
/// # Errors
///
/// Returns [`RetryError::Exhausted`] with the last error once
/// `policy.max_attempts` attempts have failed.
pub async fn retry_with_backoff<F, Fut, T, E>(
    policy: &RetryPolicy,
    operation: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    retry_with_predicate(policy, operation, |_| true).await
}

/// Retry an async operation while `is_retryable` accepts its errors.
///
/// # Errors
///
/// Returns [`RetryError::NotRetryable`] on the first refused error, or
/// [`RetryError::Exhausted`] once every attempt has failed.
pub async fn retry_with_predicate<F, Fut, T, E, P>(
    policy: &RetryPolicy,
    mut operation: F,
    is_retryable: P,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: fmt::Display,
    P: Fn(&E) -> bool,
{
    let mut attempts = 0;

    loop {
        attempts += 1;
        match operation().await {
            Ok(result) => {
                if attempts > 1 {
                    tracing::info!(attempts, "Operation succeeded after retry");
                }
                return Ok(result);
            },
            Err(error) => {
                if !is_retryable(&error) {
                    tracing::warn!(attempts, error = %error, "Error is not retryable, failing immediately");
                    return Err(RetryError::NotRetryable { attempts, error });
                }

                if !policy.allows_another(attempts) {
                    tracing::error!(attempts, error = %error, "Operation failed after max attempts");
                    return Err(RetryError::Exhausted { attempts, error });
                }

                let delay = policy.jittered_delay(attempts - 1);
                tracing::warn!(
                    attempts,
                    delay_ms = delay.as_millis(),
                    error = %error,
                    "Operation failed, retrying..."
                );
                sleep(delay).await;
            },
        }
    }
}
