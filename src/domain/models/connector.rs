#[cfg(test)]
#[path = "connector_test.rs"]
mod tests;

use std::fmt;

use anyhow::Result;
use async_trait::async_trait;
use strum::EnumIter;
use strum::EnumVariantNames;
use strum::IntoEnumIterator;
use tokio::sync::mpsc;

use super::SessionEvent;

#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, EnumVariantNames, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum ConnectorName {
    Evolution,
    None,
}

impl ConnectorName {
    pub fn parse(text: String) -> Option<ConnectorName> {
        return ConnectorName::iter().find(|e| return e.to_string() == text);
    }
}

/// Returned by `Connector::decode_webhook` for deliveries that do not carry
/// the gateway's credentials.
#[derive(Debug, PartialEq, Eq)]
pub struct UnauthorizedWebhook;

impl fmt::Display for UnauthorizedWebhook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        return write!(f, "Webhook delivery is not signed with the gateway token");
    }
}

impl std::error::Error for UnauthorizedWebhook {}

/// The messaging collaborator. Implementations own the WhatsApp Web session
/// itself (pairing, credentials, transport) and report its lifecycle as
/// `SessionEvent`s.
#[async_trait]
pub trait Connector {
    fn name(&self) -> ConnectorName;

    /// Used at startup to verify the connector is reachable.
    async fn health_check(&self) -> Result<()>;

    /// Establishes the session using whatever credentials the collaborator
    /// has persisted. Progress (connecting, QR codes, open) is reported
    /// through the channel, either before returning or later on through
    /// `decode_webhook`. An error means the session could not be started at
    /// all and will be retried.
    async fn connect<'a>(&self, tx: &'a mpsc::UnboundedSender<SessionEvent>) -> Result<()>;

    /// Sends a text message to a full JID.
    async fn send_text(&self, jid: &str, text: &str) -> Result<()>;

    async fn logout(&self) -> Result<()>;

    /// Decodes an event delivery pushed by the collaborator to `POST
    /// /webhook`. Connectors without push delivery have nothing to decode.
    /// Deliveries that cannot be attributed to the collaborator fail with
    /// `UnauthorizedWebhook`.
    fn decode_webhook(&self, _body: &[u8]) -> Result<Vec<SessionEvent>> {
        return Ok(vec![]);
    }
}

pub type ConnectorBox = Box<dyn Connector + Send + Sync>;
