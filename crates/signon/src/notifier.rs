//! Operator notifications.
//!
//! Delivery is best-effort: nothing here returns an error to the caller.

use async_trait::async_trait;
use std::time::Duration;
use tracing::{info, instrument, warn};

pub const TELEGRAM_API_BASE: &str = "https://api.telegram.org";
const SEND_TIMEOUT: Duration = Duration::from_secs(10);

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Send `message`; failures are logged and swallowed.
    async fn notify(&self, message: &str);
}

/// Sends Markdown messages through a Telegram bot.
#[derive(Clone)]
pub struct TelegramNotifier {
    client: reqwest::Client,
    api_base: String,
    bot_token: Option<String>,
    chat_id: Option<String>,
}

impl std::fmt::Debug for TelegramNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramNotifier")
            .field("api_base", &self.api_base)
            .field("configured", &self.is_configured())
            .finish()
    }
}

impl TelegramNotifier {
    pub fn new(bot_token: Option<String>, chat_id: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(SEND_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                warn!("falling back to default HTTP client: {e}");
                reqwest::Client::new()
            });
        Self {
            client,
            api_base: TELEGRAM_API_BASE.to_string(),
            bot_token: bot_token.filter(|t| !t.trim().is_empty()),
            chat_id: chat_id.filter(|c| !c.trim().is_empty()),
        }
    }

    /// Point the notifier at another Bot API host.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn is_configured(&self) -> bool {
        self.bot_token.is_some() && self.chat_id.is_some()
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    #[instrument(level = "debug", skip_all)]
    async fn notify(&self, message: &str) {
        let (Some(token), Some(chat_id)) = (&self.bot_token, &self.chat_id) else {
            info!("Telegram is not configured, skipping notification");
            return;
        };

        let url = format!("{}/bot{}/sendMessage", self.api_base, token);
        let form = [
            ("chat_id", chat_id.as_str()),
            ("text", message),
            ("parse_mode", "Markdown"),
        ];

        match self.client.post(&url).form(&form).send().await {
            Ok(response) if response.status().is_success() => {
                info!("notification delivered");
            }
            Ok(response) => {
                warn!(status = %response.status(), "Telegram rejected the notification");
            }
            // reqwest errors carry the URL, which embeds the bot token.
            Err(e) => warn!("Telegram notification failed: {}", e.without_url()),
        }
    }
}
