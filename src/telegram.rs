use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::{info, warn};

use crate::settings::Settings;

pub const DELIVERY_TIMEOUT: Duration = Duration::from_secs(10);
pub const PARSE_MODE: &str = "Markdown";

#[derive(Serialize, Debug)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'a str,
}

/// Posts the finished digest to a Telegram chat.
pub struct TelegramSink {
    client: Client,
    base_url: String,
    settings: Settings,
    timeout: Duration,
}

impl TelegramSink {
    pub fn new(client: Client, base_url: impl Into<String>, settings: Settings) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            settings,
            timeout: DELIVERY_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/bot{}/sendMessage",
            self.base_url.trim_end_matches('/'),
            self.settings.bot_token
        )
    }

    /// Returns whether the message was accepted. Failures are logged, never raised.
    pub async fn send(&self, text: &str) -> bool {
        let payload = SendMessage {
            chat_id: &self.settings.chat_id,
            text,
            parse_mode: PARSE_MODE,
        };

        let result = self
            .client
            .post(self.endpoint())
            .json(&payload)
            .timeout(self.timeout)
            .send()
            .await
            .and_then(|response| response.error_for_status());

        match result {
            Ok(_) => {
                info!(chat_id = %self.settings.chat_id, "digest delivered");
                true
            }
            Err(e) => {
                // reqwest puts the URL, and with it the token, into its error text.
                warn!(error = %e.without_url(), "Telegram delivery failed");
                false
            }
        }
    }
}
