#[cfg(test)]
#[path = "noop_test.rs"]
mod tests;

use anyhow::anyhow;
use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::domain::models::Connector;
use crate::domain::models::ConnectorName;
use crate::domain::models::SessionEvent;

/// Never pairs. Lets the HTTP surface run without a gateway.
#[derive(Default)]
pub struct NoopConnector {}

#[async_trait]
impl Connector for NoopConnector {
    fn name(&self) -> ConnectorName {
        return ConnectorName::None;
    }

    #[allow(clippy::implicit_return)]
    async fn health_check(&self) -> Result<()> {
        return Ok(());
    }

    #[allow(clippy::implicit_return)]
    async fn connect<'a>(&self, _tx: &'a mpsc::UnboundedSender<SessionEvent>) -> Result<()> {
        tracing::warn!("Running with the none connector, no WhatsApp session will be established");
        return Ok(());
    }

    #[allow(clippy::implicit_return)]
    async fn send_text(&self, _jid: &str, _text: &str) -> Result<()> {
        return Err(anyhow!(
            "None/noop connector does not support sending messages. Consider using the 'evolution' connector instead"
        ));
    }

    #[allow(clippy::implicit_return)]
    async fn logout(&self) -> Result<()> {
        return Err(anyhow!("None/noop connector has no session to log out of"));
    }
}
