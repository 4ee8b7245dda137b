use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;

use anyhow::bail;
use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::domain::models::Connector;
use crate::domain::models::ConnectorName;
use crate::domain::models::SessionEvent;
use crate::domain::models::UnauthorizedWebhook;

/// Scripted connector for tests. Clones share their recordings, so keep one
/// around to inspect after boxing another.
#[derive(Clone, Default)]
pub struct RecordingConnector {
    sent: Arc<Mutex<Vec<(String, String)>>>,
    connects: Arc<AtomicUsize>,
    logouts: Arc<AtomicUsize>,
    failing_connects: Arc<AtomicUsize>,
    connect_events: Vec<SessionEvent>,
    webhook_events: Vec<SessionEvent>,
    failing_sends: bool,
    unauthorized_webhooks: bool,
}

impl RecordingConnector {
    pub fn with_connect_events(mut self, events: Vec<SessionEvent>) -> RecordingConnector {
        self.connect_events = events;
        return self;
    }

    pub fn with_webhook_events(mut self, events: Vec<SessionEvent>) -> RecordingConnector {
        self.webhook_events = events;
        return self;
    }

    /// The first `count` connects fail before any event is reported.
    pub fn with_failing_connects(self, count: usize) -> RecordingConnector {
        self.failing_connects.store(count, Ordering::SeqCst);
        return self;
    }

    pub fn with_failing_sends(mut self) -> RecordingConnector {
        self.failing_sends = true;
        return self;
    }

    pub fn with_unauthorized_webhooks(mut self) -> RecordingConnector {
        self.unauthorized_webhooks = true;
        return self;
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        return self.sent.lock().unwrap().clone();
    }

    pub fn connects(&self) -> usize {
        return self.connects.load(Ordering::SeqCst);
    }

    pub fn logouts(&self) -> usize {
        return self.logouts.load(Ordering::SeqCst);
    }
}

#[async_trait]
impl Connector for RecordingConnector {
    fn name(&self) -> ConnectorName {
        return ConnectorName::None;
    }

    #[allow(clippy::implicit_return)]
    async fn health_check(&self) -> Result<()> {
        return Ok(());
    }

    #[allow(clippy::implicit_return)]
    async fn connect<'a>(&self, tx: &'a mpsc::UnboundedSender<SessionEvent>) -> Result<()> {
        self.connects.fetch_add(1, Ordering::SeqCst);

        let remaining = self.failing_connects.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_connects.store(remaining - 1, Ordering::SeqCst);
            bail!("Gateway is not running");
        }

        for event in self.connect_events.iter() {
            tx.send(event.clone())?;
        }

        return Ok(());
    }

    #[allow(clippy::implicit_return)]
    async fn send_text(&self, jid: &str, text: &str) -> Result<()> {
        if self.failing_sends {
            bail!("Gateway failed to send message with status 500");
        }

        self.sent
            .lock()
            .unwrap()
            .push((jid.to_string(), text.to_string()));

        return Ok(());
    }

    #[allow(clippy::implicit_return)]
    async fn logout(&self) -> Result<()> {
        self.logouts.fetch_add(1, Ordering::SeqCst);
        return Ok(());
    }

    fn decode_webhook(&self, body: &[u8]) -> Result<Vec<SessionEvent>> {
        serde_json::from_slice::<serde_json::Value>(body)?;
        if self.unauthorized_webhooks {
            return Err(UnauthorizedWebhook.into());
        }

        return Ok(self.webhook_events.clone());
    }
}
