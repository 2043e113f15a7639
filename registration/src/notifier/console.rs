//! Dispatcher that writes messages to the log.

use racepay_core::BoxFuture;
use racepay_core::dispatch::{DispatchError, MessageDispatcher, OutboundMessage};

/// Logs every message instead of delivering it. Used when no webhook is
/// configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleDispatcher;

impl MessageDispatcher for ConsoleDispatcher {
    fn send(&self, message: OutboundMessage) -> BoxFuture<'_, Result<(), DispatchError>> {
        Box::pin(async move {
            tracing::info!(
                recipient = %message.recipient,
                template = %message.template,
                payload = %message.payload,
                "Outbound message"
            );
            Ok(())
        })
    }
}
