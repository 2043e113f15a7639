//! Dispatcher posting messages to a webhook.

use racepay_core::BoxFuture;
use racepay_core::dispatch::{DispatchError, MessageDispatcher, OutboundMessage};
use reqwest::{Client, StatusCode};
use std::time::Duration;

/// POSTs `{recipient, template, payload}` to a delivery service.
///
/// 5xx and 429 responses and network errors are transient; other non-2xx
/// responses are refusals.
#[derive(Clone)]
pub struct WebhookDispatcher {
    client: Client,
    url: String,
}

impl WebhookDispatcher {
    /// Dispatcher posting to `url`.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Transport`] if the HTTP client cannot be built.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, DispatchError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DispatchError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

fn classify(status: StatusCode, body: String) -> Result<(), DispatchError> {
    if status.is_success() {
        Ok(())
    } else if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        Err(DispatchError::Transport(format!("{status}: {body}")))
    } else {
        Err(DispatchError::Rejected(format!("{status}: {body}")))
    }
}

impl MessageDispatcher for WebhookDispatcher {
    fn send(&self, message: OutboundMessage) -> BoxFuture<'_, Result<(), DispatchError>> {
        Box::pin(async move {
            let response = self
                .client
                .post(&self.url)
                .json(&message)
                .send()
                .await
                .map_err(|e| DispatchError::Transport(e.to_string()))?;

            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            classify(status, body)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_are_transient() {
        let err = classify(StatusCode::BAD_GATEWAY, String::new());
        assert!(err.is_err_and(|e| e.is_transient()));

        let throttled = classify(StatusCode::TOO_MANY_REQUESTS, String::new());
        assert!(throttled.is_err_and(|e| e.is_transient()));
    }

    #[test]
    fn client_errors_are_refusals() {
        let err = classify(StatusCode::UNPROCESSABLE_ENTITY, "bad address".to_string());
        assert_eq!(
            err,
            Err(DispatchError::Rejected("422 Unprocessable Entity: bad address".to_string()))
        );
    }

    #[test]
    fn success_is_ok() {
        assert_eq!(classify(StatusCode::ACCEPTED, String::new()), Ok(()));
    }
}
