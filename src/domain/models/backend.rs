use anyhow::Result;
use async_trait::async_trait;

use super::InboundMessage;

#[async_trait]
pub trait Backend {
    /// Hands an inbound message over to the backend for processing. Returns
    /// the reply text to send back to the sender, if the backend wants one.
    async fn forward_message(&self, message: &InboundMessage) -> Result<Option<String>>;
}

pub type BackendBox = Box<dyn Backend + Send + Sync>;
