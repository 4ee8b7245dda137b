#[cfg(test)]
#[path = "evolution_test.rs"]
mod tests;

use std::time::Duration;

use anyhow::bail;
use anyhow::Result;
use async_trait::async_trait;
use reqwest::Method;
use reqwest::StatusCode;
use serde::Deserialize;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::configuration::Config;
use crate::configuration::ConfigKey;
use crate::domain::models::Connector;
use crate::domain::models::ConnectorName;
use crate::domain::models::DisconnectReason;
use crate::domain::models::MessageContent;
use crate::domain::models::MessageUpsert;
use crate::domain::models::ReceivedMessage;
use crate::domain::models::SessionEvent;
use crate::domain::models::SessionUser;
use crate::domain::models::UnauthorizedWebhook;

const WEBHOOK_EVENTS: [&str; 3] = ["QRCODE_UPDATED", "CONNECTION_UPDATE", "MESSAGES_UPSERT"];

#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateInstanceRequest {
    instance_name: String,
    qrcode: bool,
    integration: String,
}

#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Webhook {
    enabled: bool,
    url: String,
    by_events: bool,
    base64: bool,
    events: Vec<String>,
}

#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct WebhookRequest {
    webhook: Webhook,
}

#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct InstanceState {
    state: String,
}

#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct ConnectionStateResponse {
    instance: InstanceState,
}

#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct ConnectResponse {
    #[serde(default)]
    code: Option<String>,
}

#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InstanceInfo {
    #[serde(default)]
    owner_jid: Option<String>,
    #[serde(default)]
    profile_name: Option<String>,
}

#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct SendTextRequest {
    number: String,
    text: String,
}

#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
struct WebhookPayload {
    event: String,
    instance: String,
    #[serde(default)]
    apikey: Option<String>,
    #[serde(default)]
    data: serde_json::Value,
}

#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct QrCode {
    #[serde(default)]
    code: Option<String>,
}

#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct QrCodeData {
    qrcode: QrCode,
}

#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConnectionUpdateData {
    state: String,
    #[serde(default)]
    status_reason: Option<u16>,
    #[serde(default)]
    wuid: Option<String>,
    #[serde(default)]
    profile_name: Option<String>,
}

#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageKey {
    remote_jid: String,
    #[serde(default)]
    from_me: bool,
    id: String,
}

#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct ExtendedTextMessage {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageBody {
    #[serde(default)]
    conversation: Option<String>,
    #[serde(default)]
    extended_text_message: Option<ExtendedTextMessage>,
}

#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireMessage {
    key: MessageKey,
    #[serde(default)]
    message: Option<MessageBody>,
    /// Either a number or a numeric string depending on the gateway version.
    #[serde(default)]
    message_timestamp: Option<serde_json::Value>,
}

impl WireMessage {
    fn into_received(self) -> ReceivedMessage {
        let timestamp = match self.message_timestamp {
            Some(serde_json::Value::Number(number)) => number.as_i64(),
            Some(serde_json::Value::String(text)) => text.parse::<i64>().ok(),
            _ => None,
        };

        let content = self.message.map(|body| {
            if let Some(text) = body.conversation.filter(|e| return !e.is_empty()) {
                return MessageContent::Conversation(text);
            }

            if let Some(text) = body
                .extended_text_message
                .and_then(|e| return e.text)
                .filter(|e| return !e.is_empty())
            {
                return MessageContent::ExtendedText(text);
            }

            return MessageContent::Other;
        });

        return ReceivedMessage {
            remote_jid: self.key.remote_jid,
            id: self.key.id,
            from_me: self.key.from_me,
            timestamp,
            content,
        };
    }
}

/// Batch shape some gateway versions deliver upserts in, carrying the
/// upsert kind next to the messages.
#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
struct UpsertEnvelope {
    messages: Vec<WireMessage>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
}

/// Pulls a readable reason out of a gateway error body, such as
/// `{"status": 400, "error": "Bad Request", "response": {"message": [...]}}`.
fn gateway_error_message(body: &str) -> Option<String> {
    let payload = serde_json::from_str::<serde_json::Value>(body).ok()?;

    let detail = match payload.pointer("/response/message") {
        Some(serde_json::Value::String(text)) => text.to_string(),
        Some(serde_json::Value::Array(items)) => items
            .iter()
            .map(|e| match e {
                serde_json::Value::String(text) => return text.to_string(),
                other => return other.to_string(),
            })
            .collect::<Vec<String>>()
            .join(", "),
        _ => payload.get("error")?.as_str()?.to_string(),
    };

    if detail.is_empty() {
        return None;
    }

    return Some(detail);
}

/// Connector for an Evolution API gateway. The gateway runs the WhatsApp Web
/// multi-device client and persists its credentials; this side drives it over
/// REST and receives its events on `POST /webhook`.
pub struct Evolution {
    url: String,
    token: String,
    instance: String,
    webhook_url: String,
    timeout: String,
}

impl Default for Evolution {
    fn default() -> Evolution {
        return Evolution {
            url: Config::get(ConfigKey::GatewayURL),
            token: Config::get(ConfigKey::GatewayToken),
            instance: Config::get(ConfigKey::Instance),
            webhook_url: Config::get(ConfigKey::WebhookURL),
            timeout: Config::get(ConfigKey::GatewayTimeout),
        };
    }
}

impl Evolution {
    fn request(&self, method: Method, path: &str) -> Result<reqwest::RequestBuilder> {
        let url = format!("{}{path}", self.url.trim_end_matches('/'));
        let req = reqwest::Client::new()
            .request(method, url)
            .header("apikey", &self.token)
            .timeout(Duration::from_millis(self.timeout.parse::<u64>()?));

        return Ok(req);
    }

    async fn create_instance(&self) -> Result<()> {
        let req = CreateInstanceRequest {
            instance_name: self.instance.to_string(),
            qrcode: false,
            integration: "WHATSAPP-BAILEYS".to_string(),
        };

        let res = self
            .request(Method::POST, "/instance/create")?
            .json(&req)
            .send()
            .await?;

        if !res.status().is_success() {
            tracing::error!(
                status = res.status().as_u16(),
                instance = %self.instance,
                "Failed to create gateway instance"
            );
            bail!(format!(
                "Failed to create instance {} on the gateway",
                self.instance
            ));
        }

        tracing::info!(instance = %self.instance, "Created gateway instance");
        return Ok(());
    }

    /// Returns the gateway's view of the session, creating the instance first
    /// when the gateway does not know about it yet.
    async fn connection_state(&self) -> Result<String> {
        let res = self
            .request(
                Method::GET,
                &format!("/instance/connectionState/{}", self.instance),
            )?
            .send()
            .await?;

        if res.status() == StatusCode::NOT_FOUND {
            self.create_instance().await?;
            return Ok("close".to_string());
        }

        if !res.status().is_success() {
            bail!(format!(
                "Gateway connection state request failed with status {}",
                res.status().as_u16()
            ));
        }

        let body = res.json::<ConnectionStateResponse>().await?;
        return Ok(body.instance.state);
    }

    async fn set_webhook(&self) -> Result<()> {
        let req = WebhookRequest {
            webhook: Webhook {
                enabled: true,
                url: self.webhook_url.to_string(),
                by_events: false,
                base64: false,
                events: WEBHOOK_EVENTS.iter().map(|e| return e.to_string()).collect(),
            },
        };

        let res = self
            .request(Method::POST, &format!("/webhook/set/{}", self.instance))?
            .json(&req)
            .send()
            .await?;

        if !res.status().is_success() {
            bail!(format!(
                "Failed to register webhook {} on the gateway, status {}",
                self.webhook_url,
                res.status().as_u16()
            ));
        }

        return Ok(());
    }

    async fn owner(&self) -> Option<SessionUser> {
        let res = match self
            .request(
                Method::GET,
                &format!("/instance/fetchInstances?instanceName={}", self.instance),
            ) {
            Ok(req) => req.send().await,
            Err(err) => {
                tracing::warn!(error = ?err, "Unable to build instance lookup");
                return None;
            }
        };

        let instances = match res {
            Ok(res) => res.json::<Vec<InstanceInfo>>().await,
            Err(err) => {
                tracing::warn!(error = ?err, "Unable to look up the session owner");
                return None;
            }
        };

        let info = instances.ok()?.into_iter().next()?;
        return Some(SessionUser {
            id: info.owner_jid?,
            name: info.profile_name,
        });
    }

    fn decode_connection_update(data: serde_json::Value) -> Result<Option<SessionEvent>> {
        let update = serde_json::from_value::<ConnectionUpdateData>(data)?;

        match update.state.as_str() {
            "open" => {
                let user = update.wuid.map(|id| {
                    return SessionUser {
                        id,
                        name: update.profile_name,
                    };
                });
                return Ok(Some(SessionEvent::Open(user)));
            }
            "connecting" => return Ok(Some(SessionEvent::Connecting())),
            "close" => {
                return Ok(Some(SessionEvent::Closed(DisconnectReason::from_status(
                    update.status_reason,
                ))));
            }
            _ => return Ok(None),
        }
    }

    fn decode_messages(data: serde_json::Value) -> Result<Option<SessionEvent>> {
        // A bare message or a list of them is always a live delivery. Only the
        // envelope says otherwise.
        let is_envelope = data.get("messages").is_some();
        let (messages, notify) = match data {
            serde_json::Value::Array(_) => {
                (serde_json::from_value::<Vec<WireMessage>>(data)?, true)
            }
            serde_json::Value::Object(_) if is_envelope => {
                let envelope = serde_json::from_value::<UpsertEnvelope>(data)?;
                let notify = envelope
                    .kind
                    .as_deref()
                    .map_or(true, |kind| return kind == "notify");
                (envelope.messages, notify)
            }
            _ => (vec![serde_json::from_value::<WireMessage>(data)?], true),
        };

        return Ok(Some(SessionEvent::Messages(MessageUpsert {
            notify,
            messages: messages
                .into_iter()
                .map(|e| return e.into_received())
                .collect(),
        })));
    }
}

#[async_trait]
impl Connector for Evolution {
    fn name(&self) -> ConnectorName {
        return ConnectorName::Evolution;
    }

    #[allow(clippy::implicit_return)]
    async fn health_check(&self) -> Result<()> {
        let res = match self.request(Method::GET, "/")?.send().await {
            Ok(res) => res,
            Err(err) => {
                tracing::error!(error = ?err, "Gateway is not running");
                bail!("Gateway is not running");
            }
        };

        if !res.status().is_success() {
            tracing::error!(status = res.status().as_u16(), "Gateway health check failed");
            bail!("Gateway health check failed");
        }

        return Ok(());
    }

    #[allow(clippy::implicit_return)]
    async fn connect<'a>(&self, tx: &'a mpsc::UnboundedSender<SessionEvent>) -> Result<()> {
        tx.send(SessionEvent::Connecting())?;

        let state = self.connection_state().await?;
        self.set_webhook().await?;

        if state == "open" {
            tx.send(SessionEvent::Open(self.owner().await))?;
            return Ok(());
        }

        let res = self
            .request(Method::GET, &format!("/instance/connect/{}", self.instance))?
            .send()
            .await?;

        if !res.status().is_success() {
            bail!(format!(
                "Gateway refused to connect instance {}, status {}",
                self.instance,
                res.status().as_u16()
            ));
        }

        let body = res.json::<ConnectResponse>().await?;
        if let Some(code) = body.code {
            tx.send(SessionEvent::QrCode(code))?;
        }

        return Ok(());
    }

    #[allow(clippy::implicit_return)]
    async fn send_text(&self, jid: &str, text: &str) -> Result<()> {
        let req = SendTextRequest {
            number: jid.to_string(),
            text: text.to_string(),
        };

        let res = self
            .request(Method::POST, &format!("/message/sendText/{}", self.instance))?
            .json(&req)
            .send()
            .await?;

        if !res.status().is_success() {
            let status = res.status().as_u16();
            let body = res.text().await.unwrap_or_default();
            tracing::error!(status, body = %body, "Gateway failed to send message");

            match gateway_error_message(&body) {
                Some(reason) => bail!(format!(
                    "Gateway failed to send message with status {status}: {reason}"
                )),
                None => bail!(format!("Gateway failed to send message with status {status}")),
            }
        }

        return Ok(());
    }

    #[allow(clippy::implicit_return)]
    async fn logout(&self) -> Result<()> {
        let res = self
            .request(Method::DELETE, &format!("/instance/logout/{}", self.instance))?
            .send()
            .await?;

        if !res.status().is_success() {
            bail!(format!(
                "Gateway failed to log out instance {}, status {}",
                self.instance,
                res.status().as_u16()
            ));
        }

        return Ok(());
    }

    fn decode_webhook(&self, body: &[u8]) -> Result<Vec<SessionEvent>> {
        let payload = serde_json::from_slice::<WebhookPayload>(body)?;
        if payload.apikey.as_deref() != Some(self.token.as_str()) {
            tracing::warn!(
                instance = %payload.instance,
                event = %payload.event,
                "Rejecting webhook with an invalid apikey"
            );
            return Err(UnauthorizedWebhook.into());
        }

        if payload.instance != self.instance {
            tracing::debug!(
                instance = %payload.instance,
                "Ignoring webhook for another instance"
            );
            return Ok(vec![]);
        }

        // Deliveries name events either `connection.update` or
        // `CONNECTION_UPDATE`, depending on how the webhook was registered.
        let event_name = payload.event.to_lowercase().replace('_', ".");
        let event = match event_name.as_str() {
            "qrcode.updated" => {
                let data = serde_json::from_value::<QrCodeData>(payload.data)?;
                data.qrcode.code.map(SessionEvent::QrCode)
            }
            "connection.update" => Evolution::decode_connection_update(payload.data)?,
            "messages.upsert" => Evolution::decode_messages(payload.data)?,
            _ => None,
        };

        return Ok(event.into_iter().collect());
    }
}
