#[cfg(test)]
#[path = "session_test.rs"]
mod tests;

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio::time;

use super::RelayService;
use crate::domain::models::to_jid;
use crate::domain::models::ConnectorBox;
use crate::domain::models::Followup;
use crate::domain::models::InboundMessage;
use crate::domain::models::SendResult;
use crate::domain::models::SessionEvent;
use crate::domain::models::SessionState;

pub const NOT_CONNECTED: &str = "WhatsApp is not connected";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Wait before restarting a session that closed for any reason other
    /// than a logout.
    pub reconnect_delay: Duration,
    /// Wait before retrying a session that could not be started.
    pub init_retry_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> ReconnectPolicy {
        return ReconnectPolicy {
            reconnect_delay: Duration::from_secs(5),
            init_retry_delay: Duration::from_secs(10),
        };
    }
}

/// Handle onto the session passed to everything outside of the dispatcher:
/// HTTP handlers read state and send through it, the relay sends replies
/// through it. Cloning is cheap.
#[derive(Clone)]
pub struct SessionContext {
    connector: Arc<ConnectorBox>,
    state: watch::Receiver<SessionState>,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl SessionContext {
    pub fn new(
        connector: Arc<ConnectorBox>,
        state: watch::Receiver<SessionState>,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> SessionContext {
        return SessionContext {
            connector,
            state,
            events,
        };
    }

    pub fn state(&self) -> SessionState {
        return self.state.borrow().clone();
    }

    /// Sends a text message, never failing outright. Anything that goes
    /// wrong is carried in the result.
    pub async fn send(&self, recipient: &str, text: &str) -> SendResult {
        let connected = self.state.borrow().is_connected();
        if !connected {
            tracing::error!(recipient, "Unable to send message, {NOT_CONNECTED}");
            return SendResult::failed(NOT_CONNECTED);
        }

        let jid = to_jid(recipient);
        if let Err(err) = self.connector.send_text(&jid, text).await {
            tracing::error!(error = ?err, recipient, "Failed to send message");
            return SendResult::failed(&err.to_string());
        }

        tracing::info!(recipient, "Message sent");
        return SendResult::ok();
    }

    /// Decodes a webhook delivery with the active connector and queues the
    /// resulting events for the dispatcher.
    pub fn ingest_webhook(&self, body: &[u8]) -> Result<usize> {
        let events = self.connector.decode_webhook(body)?;
        let count = events.len();
        for event in events {
            self.events.send(event)?;
        }

        return Ok(count);
    }

    pub async fn logout(&self) -> Result<()> {
        return self.connector.logout().await;
    }
}

/// Owns the session state and is the only place it changes. Events from the
/// connector, webhooks and timers are applied one at a time, in order.
pub struct SessionService {
    connector: Arc<ConnectorBox>,
    policy: ReconnectPolicy,
    restart_pending: AtomicBool,
    state: watch::Sender<SessionState>,
    tx: mpsc::UnboundedSender<SessionEvent>,
    rx: mpsc::UnboundedReceiver<SessionEvent>,
}

impl SessionService {
    pub fn new(connector: ConnectorBox, policy: ReconnectPolicy) -> SessionService {
        let (state, _) = watch::channel(SessionState::default());
        let (tx, rx) = mpsc::unbounded_channel::<SessionEvent>();

        return SessionService {
            connector: Arc::new(connector),
            policy,
            restart_pending: AtomicBool::new(false),
            state,
            tx,
            rx,
        };
    }

    pub fn context(&self) -> SessionContext {
        return SessionContext::new(
            self.connector.clone(),
            self.state.subscribe(),
            self.tx.clone(),
        );
    }

    /// At most one restart is pending at a time. Further requests are folded
    /// into it until its `Start` has been dispatched.
    fn schedule_start(&self, delay: Duration) {
        if self.restart_pending.swap(true, Ordering::SeqCst) {
            tracing::debug!("Session restart already pending");
            return;
        }

        tracing::info!(delay_ms = delay.as_millis() as u64, "Scheduling session restart");

        let tx = self.tx.clone();
        tokio::spawn(async move {
            time::sleep(delay).await;
            if tx.send(SessionEvent::Start()).is_err() {
                tracing::debug!("Session dispatcher is gone, dropping restart");
            }
        });
    }

    async fn connect(&self) {
        tracing::info!(connector = %self.connector.name(), "Starting WhatsApp session");

        if let Err(err) = self.connector.connect(&self.tx).await {
            tracing::error!(error = ?err, "Failed to start WhatsApp session");
            if self.tx.send(SessionEvent::InitFailed(err.to_string())).is_err() {
                tracing::debug!("Session dispatcher is gone, dropping init failure");
            }
        }
    }

    fn relay(&self, relay: &RelayService, messages: Vec<InboundMessage>) {
        let relay = relay.clone();
        tokio::spawn(async move {
            for message in messages {
                relay.handle(message).await;
            }
        });
    }

    fn log_transition(state: &SessionState) {
        match state.qr() {
            Some(_) => {
                tracing::info!(status = %state.status, "QR code generated, scan it with WhatsApp");
            }
            None => {
                tracing::info!(
                    status = %state.status,
                    user = ?state.user.as_ref().map(|e| return &e.id),
                    "Connection state changed"
                );
            }
        }
    }

    pub async fn dispatch(&self, event: SessionEvent, relay: &RelayService) {
        if matches!(event, SessionEvent::Start()) {
            self.restart_pending.store(false, Ordering::SeqCst);
        }

        let mut followup = Followup::Nothing;
        let mut changed = false;
        self.state.send_modify(|state| {
            let before = state.clone();
            followup = state.apply(event);
            changed = before != *state;
        });

        if changed {
            SessionService::log_transition(&self.state.borrow());
        }

        match followup {
            Followup::Nothing => {}
            Followup::Connect => self.connect().await,
            Followup::RetryInit => self.schedule_start(self.policy.init_retry_delay),
            Followup::Reconnect => self.schedule_start(self.policy.reconnect_delay),
            Followup::Relay(messages) => self.relay(relay, messages),
        }
    }

    /// Starts the session and runs the dispatcher until the process exits.
    pub async fn start(mut self, relay: RelayService) -> Result<()> {
        self.tx.send(SessionEvent::Start())?;

        while let Some(event) = self.rx.recv().await {
            tracing::debug!(event = ?event, "Session event");
            self.dispatch(event, &relay).await;
        }

        return Ok(());
    }
}
