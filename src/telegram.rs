// ===============================
// src/telegram.rs
// ===============================
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};

use crate::domain::RegistryChange;
use crate::notify::{deliver, Notifier, NotifyError};

pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";

#[derive(Debug, Deserialize)]
struct ApiReply {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

/// Telegram Bot API `sendMessage`, plain text.
pub struct TelegramNotifier {
    http: reqwest::Client,
    api_base: String,
    bot_token: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(bot_token: &str, chat_id: &str, timeout: Duration) -> Result<Self, NotifyError> {
        Self::with_api_base(DEFAULT_API_BASE, bot_token, chat_id, timeout)
    }

    pub fn with_api_base(api_base: &str, bot_token: &str, chat_id: &str, timeout: Duration) -> Result<Self, NotifyError> {
        if bot_token.trim().is_empty() || chat_id.trim().is_empty() {
            return Err(NotifyError::NotConfigured);
        }
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            bot_token: bot_token.trim().to_string(),
            chat_id: chat_id.trim().to_string(),
        })
    }

    fn send_url(&self) -> String {
        format!("{}/bot{}/sendMessage", self.api_base, self.bot_token)
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, text: &str) -> Result<(), NotifyError> {
        let rsp = self
            .http
            .post(self.send_url())
            .form(&[("chat_id", self.chat_id.as_str()), ("text", text)])
            .send()
            .await?;
        let status = rsp.status();
        let reply: ApiReply = rsp.json().await?;
        if !reply.ok {
            return Err(NotifyError::Api(reply.description.unwrap_or_else(|| status.to_string())));
        }
        debug!(len = text.len(), "telegram message sent");
        Ok(())
    }
}

/// Text command a remote instance understands for a registry change.
/// Renames have no remote counterpart.
pub fn mirror_command(change: &RegistryChange) -> Option<String> {
    match change {
        RegistryChange::Added(t) => Some(format!("/sync_add {} {}", t.code, t.display_name)),
        RegistryChange::Removed(code) => Some(format!("/sync_remove {code}")),
        RegistryChange::Renamed(_) => None,
    }
}

/// Mirror registry changes outward through the bot chat.
pub async fn run_mirror(mut rx: broadcast::Receiver<RegistryChange>, notifier: Arc<dyn Notifier>) {
    info!("telegram: registry mirroring enabled");
    loop {
        match rx.recv().await {
            Ok(change) => {
                if let Some(cmd) = mirror_command(&change) {
                    deliver(notifier.as_ref(), &cmd).await;
                }
            }
            Err(RecvError::Lagged(n)) => warn!(skipped = n, "telegram: mirror lagged"),
            Err(RecvError::Closed) => break,
        }
    }
}
