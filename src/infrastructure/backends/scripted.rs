use std::sync::Arc;
use std::sync::Mutex;

use anyhow::bail;
use anyhow::Result;
use async_trait::async_trait;

use crate::domain::models::Backend;
use crate::domain::models::InboundMessage;

/// Backend for tests that answers every message the same way and keeps what
/// it received.
#[derive(Clone, Default)]
pub struct ScriptedBackend {
    reply: Option<String>,
    failing: bool,
    received: Arc<Mutex<Vec<InboundMessage>>>,
}

impl ScriptedBackend {
    pub fn with_reply(mut self, reply: &str) -> ScriptedBackend {
        self.reply = Some(reply.to_string());
        return self;
    }

    pub fn with_failure(mut self) -> ScriptedBackend {
        self.failing = true;
        return self;
    }

    pub fn received(&self) -> Vec<InboundMessage> {
        return self.received.lock().unwrap().clone();
    }
}

#[async_trait]
impl Backend for ScriptedBackend {
    #[allow(clippy::implicit_return)]
    async fn forward_message(&self, message: &InboundMessage) -> Result<Option<String>> {
        self.received.lock().unwrap().push(message.clone());

        if self.failing {
            bail!("Backend responded with status 500");
        }

        return Ok(self.reply.clone());
    }
}
