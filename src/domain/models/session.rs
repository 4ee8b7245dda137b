#[cfg(test)]
#[path = "session_test.rs"]
mod tests;

use super::ConnectionState;
use super::InboundMessage;
use super::SessionEvent;
use super::SessionUser;

/// What the dispatcher has to do after a transition was applied.
#[derive(Debug, PartialEq, Eq)]
pub enum Followup {
    Nothing,
    Connect,
    RetryInit,
    Reconnect,
    Relay(Vec<InboundMessage>),
}

/// Connection state as seen by the HTTP surface. The QR payload is private so
/// it can only be set through a transition, which keeps it present only while
/// waiting on a scan.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionState {
    pub status: ConnectionState,
    pub user: Option<SessionUser>,
    qr: Option<String>,
}

impl SessionState {
    pub fn qr(&self) -> Option<&str> {
        return self.qr.as_deref();
    }

    pub fn is_connected(&self) -> bool {
        return self.status == ConnectionState::Connected;
    }

    fn transition(&mut self, status: ConnectionState) {
        self.status = status;
        if status != ConnectionState::QrGenerated {
            self.qr = None;
        }
        if status != ConnectionState::Connected {
            self.user = None;
        }
    }

    pub fn apply(&mut self, event: SessionEvent) -> Followup {
        match event {
            SessionEvent::Start() => {
                // A restart scheduled before the session came back is stale.
                if self.is_connected() {
                    return Followup::Nothing;
                }
                return Followup::Connect;
            }
            SessionEvent::InitFailed(_) => {
                self.transition(ConnectionState::Error);
                return Followup::RetryInit;
            }
            SessionEvent::Connecting() => {
                self.transition(ConnectionState::Connecting);
                return Followup::Nothing;
            }
            SessionEvent::QrCode(code) => {
                self.transition(ConnectionState::QrGenerated);
                self.qr = Some(code);
                return Followup::Nothing;
            }
            SessionEvent::Open(user) => {
                self.transition(ConnectionState::Connected);
                self.user = user;
                return Followup::Nothing;
            }
            SessionEvent::Closed(reason) => {
                self.transition(ConnectionState::Disconnected);
                if reason.should_reconnect() {
                    return Followup::Reconnect;
                }
                return Followup::Nothing;
            }
            SessionEvent::Messages(upsert) => {
                if !upsert.notify {
                    return Followup::Nothing;
                }

                let messages = upsert
                    .messages
                    .iter()
                    .filter_map(InboundMessage::from_received)
                    .collect::<Vec<InboundMessage>>();

                if messages.is_empty() {
                    return Followup::Nothing;
                }

                return Followup::Relay(messages);
            }
        }
    }
}
