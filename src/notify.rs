//! "Your deck is ready" notifications.
//!
//! Notification is best-effort: the pipeline logs and swallows any error a
//! [`Notifier`] returns. The webhook provider posts a JSON body to a mail
//! relay:
//!
//! ```json
//! {"to": "...", "template": "deck_ready", "title": "...",
//!  "sections": 12, "flashcards": 0, "link": "https://app/decks/<id>"}
//! ```
//!
//! `NOTIFY_API_KEY`, when set, is sent as a bearer token.

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

use crate::config::NotifyConfig;
use crate::error::ApiError;

/// What the recipient is told about a finished run.
#[derive(Debug, Clone, Serialize)]
pub struct DeckReadyNotice {
    pub to: String,
    pub title: String,
    pub sections: usize,
    pub flashcards: usize,
    pub link: String,
}

impl DeckReadyNotice {
    pub fn new(
        config: &NotifyConfig,
        to: &str,
        document_id: &str,
        title: &str,
        sections: usize,
        flashcards: usize,
    ) -> Self {
        Self {
            to: to.to_string(),
            title: title.to_string(),
            sections,
            flashcards,
            link: format!("{}/decks/{}", config.app_url.trim_end_matches('/'), document_id),
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_ready(&self, notice: &DeckReadyNotice) -> Result<()>;
}

/// Drops every notice.
pub struct DisabledNotifier;

#[async_trait]
impl Notifier for DisabledNotifier {
    async fn notify_ready(&self, notice: &DeckReadyNotice) -> Result<()> {
        tracing::debug!(to = %notice.to, "notifications disabled, skipping");
        Ok(())
    }
}

pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
}

#[derive(Serialize)]
struct WebhookBody<'a> {
    template: &'static str,
    #[serde(flatten)]
    notice: &'a DeckReadyNotice,
}

impl WebhookNotifier {
    pub fn new(config: &NotifyConfig) -> Result<Self> {
        let url = config
            .url
            .clone()
            .ok_or_else(|| anyhow::anyhow!("notify.url required for webhook provider"))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            url,
            api_key: std::env::var("NOTIFY_API_KEY").ok(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify_ready(&self, notice: &DeckReadyNotice) -> Result<()> {
        let body = WebhookBody {
            template: "deck_ready",
            notice,
        };
        let mut req = self.client.post(&self.url).json(&body);
        if let Some(ref key) = self.api_key {
            req = req.bearer_auth(key);
        }

        let response = req.send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ApiError::from_body("notify", status.as_u16(), &text).into());
        }
        Ok(())
    }
}

/// | Config Value | Notifier |
/// |-------------|----------|
/// | `"disabled"` | [`DisabledNotifier`] |
/// | `"webhook"` | [`WebhookNotifier`] |
pub fn create_notifier(config: &NotifyConfig) -> Result<Box<dyn Notifier>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledNotifier)),
        "webhook" => Ok(Box::new(WebhookNotifier::new(config)?)),
        other => bail!("Unknown notify provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn webhook_body_carries_template_and_link() {
        let config = NotifyConfig {
            app_url: "https://study.example/".to_string(),
            ..NotifyConfig::default()
        };
        let notice = DeckReadyNotice::new(&config, "ana@example.com", "doc-9", "Cells", 4, 0);
        let body = serde_json::to_value(WebhookBody {
            template: "deck_ready",
            notice: &notice,
        })
        .unwrap();
        assert_eq!(body["template"], "deck_ready");
        assert_eq!(body["to"], "ana@example.com");
        assert_eq!(body["sections"], 4);
        assert_eq!(body["link"], "https://study.example/decks/doc-9");
    }

    #[test]
    fn webhook_requires_url() {
        let config = NotifyConfig {
            provider: "webhook".to_string(),
            ..NotifyConfig::default()
        };
        assert!(create_notifier(&config).is_err());
    }
}
