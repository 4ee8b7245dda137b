#[cfg(test)]
#[path = "relay_test.rs"]
mod tests;

use std::sync::Arc;

use super::SessionContext;
use crate::domain::models::BackendBox;
use crate::domain::models::InboundMessage;

/// Forwards inbound messages to the backend and sends whatever it answers
/// back to the sender.
#[derive(Clone)]
pub struct RelayService {
    backend: Arc<BackendBox>,
    session: SessionContext,
    fallback: String,
}

impl RelayService {
    pub fn new(backend: BackendBox, session: SessionContext, fallback: &str) -> RelayService {
        return RelayService {
            backend: Arc::new(backend),
            session,
            fallback: fallback.to_string(),
        };
    }

    async fn reply(&self, message: &InboundMessage, text: &str) {
        let res = self.session.send(&message.phone_number, text).await;
        if !res.success {
            tracing::error!(
                phone_number = %message.phone_number,
                message_id = %message.message_id,
                error = %res.error.unwrap_or_default(),
                "Failed to reply to message"
            );
        }
    }

    /// Never fails. A backend error is answered with the fallback message,
    /// at most once per inbound message.
    pub async fn handle(&self, message: InboundMessage) {
        tracing::info!(
            phone_number = %message.phone_number,
            message_id = %message.message_id,
            "Message received"
        );

        match self.backend.forward_message(&message).await {
            Ok(Some(reply)) => {
                self.reply(&message, &reply).await;
            }
            Ok(None) => {
                tracing::debug!(message_id = %message.message_id, "Backend had no reply");
            }
            Err(err) => {
                tracing::error!(
                    error = ?err,
                    message_id = %message.message_id,
                    "Failed to forward message to backend"
                );
                self.reply(&message, &self.fallback).await;
            }
        }
    }
}
