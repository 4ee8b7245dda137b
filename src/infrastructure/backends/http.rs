#[cfg(test)]
#[path = "http_test.rs"]
mod tests;

use std::time::Duration;

use anyhow::bail;
use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;

use crate::configuration::Config;
use crate::configuration::ConfigKey;
use crate::domain::models::Backend;
use crate::domain::models::InboundMessage;

#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct MessageResponse {
    #[serde(default)]
    reply: Option<String>,
}

/// Backend reachable over HTTP, receiving each inbound message on
/// `POST {url}/api/whatsapp/message`.
pub struct HttpBackend {
    url: String,
    timeout: String,
}

impl Default for HttpBackend {
    fn default() -> HttpBackend {
        return HttpBackend {
            url: Config::get(ConfigKey::BackendURL),
            timeout: Config::get(ConfigKey::BackendTimeout),
        };
    }
}

#[async_trait]
impl Backend for HttpBackend {
    #[allow(clippy::implicit_return)]
    async fn forward_message(&self, message: &InboundMessage) -> Result<Option<String>> {
        let url = format!(
            "{url}/api/whatsapp/message",
            url = self.url.trim_end_matches('/')
        );

        let res = reqwest::Client::new()
            .post(url)
            .timeout(Duration::from_millis(self.timeout.parse::<u64>()?))
            .json(message)
            .send()
            .await?;

        if !res.status().is_success() {
            tracing::error!(
                status = res.status().as_u16(),
                message_id = %message.message_id,
                "Backend rejected message"
            );
            bail!(format!(
                "Backend responded with status {}",
                res.status().as_u16()
            ));
        }

        let body = res.json::<MessageResponse>().await?;
        tracing::debug!(body = ?body, "Backend response");

        return Ok(body.reply.filter(|reply| return !reply.is_empty()));
    }
}
