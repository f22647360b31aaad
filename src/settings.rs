use config::{Config, ConfigError, Environment};
use serde::Deserialize;
use std::fmt;

/// Delivery credentials, read once at startup and handed to the sink.
///
/// `TELEGRAM_BOT_TOKEN` -> `bot_token`, `TELEGRAM_CHAT_ID` -> `chat_id`.
#[derive(Clone, Deserialize)]
pub struct Settings {
    pub bot_token: String,
    pub chat_id: String,
}

// The token grants full control of the bot; keep it out of logs.
impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("bot_token", &"<redacted>")
            .field("chat_id", &self.chat_id)
            .finish()
    }
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        Self::from_source(Environment::with_prefix("TELEGRAM"))
    }

    fn from_source(env: Environment) -> Result<Self, ConfigError> {
        let mut s = Config::new();
        s.merge(env)?;
        let settings: Settings = s.try_into()?;
        if settings.bot_token.trim().is_empty() {
            return Err(ConfigError::Message("TELEGRAM_BOT_TOKEN is empty".into()));
        }
        if settings.chat_id.trim().is_empty() {
            return Err(ConfigError::Message("TELEGRAM_CHAT_ID is empty".into()));
        }
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Each test uses its own prefix so parallel tests never share variables.

    #[test]
    fn reads_both_values_from_environment() {
        unsafe {
            std::env::set_var("DIGESTTESTA_BOT_TOKEN", "123:abc");
            std::env::set_var("DIGESTTESTA_CHAT_ID", "-10042");
        }
        let settings = Settings::from_source(Environment::with_prefix("DIGESTTESTA")).unwrap();
        assert_eq!(settings.bot_token, "123:abc");
        assert_eq!(settings.chat_id, "-10042");
    }

    #[test]
    fn missing_chat_id_fails_fast() {
        unsafe {
            std::env::set_var("DIGESTTESTB_BOT_TOKEN", "123:abc");
        }
        assert!(Settings::from_source(Environment::with_prefix("DIGESTTESTB")).is_err());
    }

    #[test]
    fn debug_output_hides_token() {
        let settings = Settings {
            bot_token: "secret-token".to_string(),
            chat_id: "1".to_string(),
        };
        assert!(!format!("{:?}", settings).contains("secret-token"));
    }
}
