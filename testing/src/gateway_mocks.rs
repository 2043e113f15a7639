//! Scripted payment gateway transport.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)]

use racepay_core::BoxFuture;
use racepay_core::gateway::{GatewayRequest, GatewayTransport, RawGatewayResponse, TransportError};
use std::collections::VecDeque;
use std::sync::Mutex;

/// One scripted reaction of the transport.
#[derive(Debug, Clone)]
pub enum Step {
    /// Return this HTTP response
    Respond(RawGatewayResponse),
    /// Fail without a response
    Fail(TransportError),
    /// Never answer (exercises caller timeouts)
    Hang,
}

impl Step {
    /// `200` approval echoing no reference (the sent one is used).
    #[must_use]
    pub fn approved() -> Self {
        Self::Respond(RawGatewayResponse::new(200, r#"{"status":"approved"}"#))
    }

    /// Non-2xx refusal carrying a provider code.
    #[must_use]
    pub fn rejected(status: u16, code: &str, message: &str) -> Self {
        let body = serde_json::json!({ "status": "rejected", "code": code, "message": message });
        Self::Respond(RawGatewayResponse::new(status, body.to_string()))
    }

    /// Raw response with an arbitrary body.
    #[must_use]
    pub fn raw(status: u16, body: &str) -> Self {
        Self::Respond(RawGatewayResponse::new(status, body))
    }
}

/// Gateway transport replaying a script of [`Step`]s.
///
/// Every request is recorded. Once the script runs out, calls fail with a
/// connection error.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Step>>,
    requests: Mutex<Vec<GatewayRequest>>,
}

impl ScriptedTransport {
    /// Transport replaying `steps` in order.
    #[must_use]
    pub fn new(steps: impl IntoIterator<Item = Step>) -> Self {
        Self {
            script: Mutex::new(steps.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Requests received so far.
    #[must_use]
    pub fn requests(&self) -> Vec<GatewayRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Number of calls received.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl GatewayTransport for ScriptedTransport {
    fn send(
        &self,
        request: GatewayRequest,
    ) -> BoxFuture<'_, Result<RawGatewayResponse, TransportError>> {
        Box::pin(async move {
            self.requests.lock().unwrap().push(request);
            let step = self.script.lock().unwrap().pop_front();
            match step {
                Some(Step::Respond(response)) => Ok(response),
                Some(Step::Fail(error)) => Err(error),
                Some(Step::Hang) => std::future::pending().await,
                None => Err(TransportError::Connection("script exhausted".to_string())),
            }
        })
    }
}
