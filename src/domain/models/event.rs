use super::DisconnectReason;
use super::ReceivedMessage;
use super::SessionUser;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageUpsert {
    /// Only `notify` upserts are new messages. Anything else is history sync
    /// or an append of already seen messages.
    pub notify: bool,
    pub messages: Vec<ReceivedMessage>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionEvent {
    /// Establish (or re-establish) the session.
    Start(),
    InitFailed(String),
    Connecting(),
    QrCode(String),
    Open(Option<SessionUser>),
    Closed(DisconnectReason),
    Messages(MessageUpsert),
}
