//! Pushover Notifier
//!
//! Posts to the Pushover messages API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use super::Notifier;
use crate::error::{AssistantError, Result};

const PUSHOVER_URL: &str = "https://api.pushover.net/1/messages.json";

/// Pushover credentials
#[derive(Clone, Debug)]
pub struct PushoverConfig {
    /// User key
    pub user: String,

    /// Application token
    pub token: String,

    /// Messages endpoint
    pub api_url: String,
}

impl PushoverConfig {
    pub fn new(user: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            token: token.into(),
            api_url: PUSHOVER_URL.into(),
        }
    }

    /// Read `PUSHOVER_USER` and `PUSHOVER_TOKEN`; `None` unless both are set
    pub fn from_env() -> Option<Self> {
        let user = std::env::var("PUSHOVER_USER").ok().filter(|v| !v.is_empty())?;
        let token = std::env::var("PUSHOVER_TOKEN").ok().filter(|v| !v.is_empty())?;
        Some(Self::new(user, token))
    }
}

#[derive(Serialize)]
struct PushoverForm<'a> {
    user: &'a str,
    token: &'a str,
    message: &'a str,
}

/// Pushover notification sink
pub struct PushoverNotifier {
    client: Client,
    config: PushoverConfig,
}

impl PushoverNotifier {
    pub fn new(config: PushoverConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AssistantError::Config(format!("HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }
}

#[async_trait]
impl Notifier for PushoverNotifier {
    async fn deliver(&self, message: &str) -> Result<()> {
        tracing::debug!("Push: {}", message);

        let form = PushoverForm {
            user: &self.config.user,
            token: &self.config.token,
            message,
        };

        let response = self
            .client
            .post(&self.config.api_url)
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(AssistantError::Notification(format!("{}: {}", status, body.trim())))
        }
    }

    fn name(&self) -> &str {
        "pushover"
    }
}
