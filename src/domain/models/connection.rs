use serde::Deserialize;
use serde::Serialize;

#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    QrGenerated,
    Connected,
    Error,
}

/// Identity of the paired account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The device was unlinked from the phone, or the session logged out.
    /// Reconnecting would only produce a fresh QR nobody asked for.
    LoggedOut,
    Other(String),
}

impl DisconnectReason {
    /// Status code the gateway reports when the session was logged out.
    pub const LOGGED_OUT_STATUS: u16 = 401;

    pub fn from_status(status: Option<u16>) -> DisconnectReason {
        match status {
            Some(DisconnectReason::LOGGED_OUT_STATUS) => return DisconnectReason::LoggedOut,
            Some(code) => return DisconnectReason::Other(format!("status {code}")),
            None => return DisconnectReason::Other("unknown".to_string()),
        }
    }

    pub fn should_reconnect(&self) -> bool {
        return *self != DisconnectReason::LoggedOut;
    }
}
