//! Runtime configuration.

use std::fmt::Display;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::mail::{LogMailer, Mailer, WebhookMailer};
use crate::outbox::OutboxConfig;
use crate::queue::CalendarConfig;

/// Top-level configuration for the request queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrarConfig {
    /// Working window used for completion estimates
    pub calendar: CalendarConfig,

    /// Retry policy of the mail dispatcher
    pub outbox: OutboxConfig,

    /// Public base URL of the portal, used to build links in account emails
    pub base_url: String,

    /// HTTP mail relay endpoint. When unset, [`RegistrarConfig::mailer`]
    /// falls back to logging email.
    pub mail_relay_url: Option<String>,

    /// Bearer token for the mail relay
    pub mail_relay_api_key: Option<String>,
}

impl Default for RegistrarConfig {
    fn default() -> Self {
        Self {
            calendar: CalendarConfig::default(),
            outbox: OutboxConfig::default(),
            base_url: "http://localhost:3000".to_string(),
            mail_relay_url: None,
            mail_relay_api_key: None,
        }
    }
}

impl RegistrarConfig {
    /// Load from `REGISTRAR_*` environment variables.
    ///
    /// Missing or unparseable values fall back to the defaults with a log line.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let loader = Loader { lookup };

        Self {
            calendar: CalendarConfig {
                work_start_hour: loader.parse(
                    "REGISTRAR_WORK_START_HOUR",
                    defaults.calendar.work_start_hour,
                ),
                work_end_hour: loader
                    .parse("REGISTRAR_WORK_END_HOUR", defaults.calendar.work_end_hour),
                utc_offset_minutes: loader.parse(
                    "REGISTRAR_UTC_OFFSET_MINUTES",
                    defaults.calendar.utc_offset_minutes,
                ),
            },
            outbox: OutboxConfig {
                max_retries: loader.parse("REGISTRAR_MAIL_MAX_RETRIES", defaults.outbox.max_retries),
                backoff_ms: loader.parse("REGISTRAR_MAIL_BACKOFF_MS", defaults.outbox.backoff_ms),
                backoff_factor: loader.parse(
                    "REGISTRAR_MAIL_BACKOFF_FACTOR",
                    defaults.outbox.backoff_factor,
                ),
                max_backoff_ms: loader.parse(
                    "REGISTRAR_MAIL_MAX_BACKOFF_MS",
                    defaults.outbox.max_backoff_ms,
                ),
            },
            base_url: loader
                .parse::<String>("REGISTRAR_BASE_URL", defaults.base_url)
                .trim_end_matches('/')
                .to_string(),
            mail_relay_url: loader.optional("REGISTRAR_MAIL_RELAY_URL"),
            mail_relay_api_key: loader.optional("REGISTRAR_MAIL_RELAY_API_KEY"),
        }
    }
}

impl RegistrarConfig {
    /// The mailer to hand to [`MailOutbox::start`](crate::outbox::MailOutbox::start):
    /// a [`WebhookMailer`] when a relay URL is configured, otherwise a [`LogMailer`].
    pub fn mailer(&self) -> Arc<dyn Mailer> {
        match &self.mail_relay_url {
            Some(url) => {
                tracing::info!(relay = %url, "Delivering email through the mail relay");
                Arc::new(WebhookMailer::new(url.clone(), self.mail_relay_api_key.clone()))
            }
            None => {
                tracing::info!("No mail relay configured, email will only be logged");
                Arc::new(LogMailer)
            }
        }
    }
}

struct Loader<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> Loader<F> {
    fn parse<T>(&self, key: &str, default: T) -> T
    where
        T: FromStr + Display,
        T::Err: Display,
    {
        let Some(raw) = (self.lookup)(key) else {
            info!("{key} not set, using default: {default}");
            return default;
        };
        raw.trim().parse().unwrap_or_else(|e| {
            warn!("Invalid {key} value '{raw}': {e}, using default: {default}");
            default
        })
    }

    fn optional(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_empty_environment_gives_defaults() {
        let config = RegistrarConfig::from_lookup(lookup(&[]));
        assert_eq!(config, RegistrarConfig::default());
    }

    #[test]
    fn test_overrides_are_applied() {
        let config = RegistrarConfig::from_lookup(lookup(&[
            ("REGISTRAR_WORK_START_HOUR", "8"),
            ("REGISTRAR_UTC_OFFSET_MINUTES", "-300"),
            ("REGISTRAR_MAIL_MAX_RETRIES", "5"),
            ("REGISTRAR_BASE_URL", "https://portal.example.edu/"),
            ("REGISTRAR_MAIL_RELAY_URL", "https://mail.example.edu/send"),
        ]));

        assert_eq!(config.calendar.work_start_hour, 8);
        assert_eq!(config.calendar.work_end_hour, 17);
        assert_eq!(config.calendar.utc_offset_minutes, -300);
        assert_eq!(config.outbox.max_retries, 5);
        assert_eq!(config.base_url, "https://portal.example.edu");
        assert_eq!(
            config.mail_relay_url.as_deref(),
            Some("https://mail.example.edu/send")
        );
        assert_eq!(config.mail_relay_api_key, None);
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = RegistrarConfig::from_lookup(lookup(&[
            ("REGISTRAR_WORK_END_HOUR", "five pm"),
            ("REGISTRAR_MAIL_BACKOFF_MS", "-1"),
            ("REGISTRAR_MAIL_RELAY_API_KEY", "   "),
        ]));
        assert_eq!(config.calendar.work_end_hour, 17);
        assert_eq!(config.outbox.backoff_ms, 1000);
        assert_eq!(config.mail_relay_api_key, None);
    }

    #[tokio::test]
    async fn test_mailer_follows_relay_setting() {
        let email = crate::mail::Email::new("amira@example.edu", "Subject", "Body");

        // Without a relay, delivery is only logged and always succeeds.
        let logging = RegistrarConfig::default().mailer();
        assert!(logging.send(&email).await.is_ok());

        // With one, delivery goes over HTTP; nothing listens on the discard port.
        let relayed = RegistrarConfig::from_lookup(lookup(&[(
            "REGISTRAR_MAIL_RELAY_URL",
            "http://127.0.0.1:9/send",
        )]))
        .mailer();
        assert!(relayed.send(&email).await.is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: RegistrarConfig =
            serde_json::from_str(r#"{"calendar": {"work_end_hour": 16}}"#).unwrap();
        assert_eq!(config.calendar.work_start_hour, 9);
        assert_eq!(config.calendar.work_end_hour, 16);
        assert_eq!(config.outbox, OutboxConfig::default());
    }
}
