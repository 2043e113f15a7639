//! HTTP transport to the mobile-payment provider.

use racepay_core::BoxFuture;
use racepay_core::gateway::{GatewayRequest, GatewayTransport, RawGatewayResponse, TransportError};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

/// Outbound JSON body.
#[derive(Debug, Serialize)]
struct PaymentBody<'a> {
    reference: &'a str,
    amount_cents: u64,
    currency: &'a str,
    payer_id: &'a str,
    phone: &'a str,
    bank_code: &'a str,
}

impl<'a> From<&'a GatewayRequest> for PaymentBody<'a> {
    fn from(request: &'a GatewayRequest) -> Self {
        Self {
            reference: &request.reference,
            amount_cents: request.amount.cents(),
            currency: &request.currency,
            payer_id: &request.payer_id,
            phone: &request.phone,
            bank_code: &request.bank_code,
        }
    }
}

/// reqwest-backed [`GatewayTransport`].
///
/// Any HTTP response, whatever its status, is returned as a
/// [`RawGatewayResponse`]; only a missing response is an error.
#[derive(Clone)]
pub struct HttpGatewayTransport {
    client: Client,
    url: String,
    api_key: String,
}

impl HttpGatewayTransport {
    /// Transport posting to `url` with a bearer `api_key`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Other`] if the HTTP client cannot be built.
    pub fn new(
        url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Other(e.to_string()))?;

        Ok(Self {
            client,
            url: url.into(),
            api_key: api_key.into(),
        })
    }
}

fn transport_error(error: &reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout
    } else if error.is_connect() || error.is_request() {
        TransportError::Connection(error.to_string())
    } else {
        TransportError::Other(error.to_string())
    }
}

impl GatewayTransport for HttpGatewayTransport {
    fn send(
        &self,
        request: GatewayRequest,
    ) -> BoxFuture<'_, Result<RawGatewayResponse, TransportError>> {
        Box::pin(async move {
            let response = self
                .client
                .post(&self.url)
                .bearer_auth(&self.api_key)
                .json(&PaymentBody::from(&request))
                .send()
                .await
                .map_err(|e| transport_error(&e))?;

            let status = response.status().as_u16();
            let body = response.text().await.map_err(|e| transport_error(&e))?;

            Ok(RawGatewayResponse::new(status, body))
        })
    }
}
