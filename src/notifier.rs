use anyhow::{Context, Result};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

use crate::analyzer::AnalysisRecord;
use crate::config::Config;

pub const ALERT_TITLE: &str = "🚨 GoldSentinel Alert";
pub const ALERT_FOOTER: &str = "Powered by Gemini 2.0 & GitHub Actions";
/// Embed color when gold is expected to fall.
pub const COLOR_BEARISH: u32 = 15158332;
/// Embed color for everything else, including missing forecasts.
pub const COLOR_BULLISH: u32 = 3066993;

const NOT_AVAILABLE: &str = "N/A";

// ─── Webhook payload ───

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebhookPayload {
    pub embeds: Vec<Embed>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Embed {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub color: u32,
    pub fields: Vec<EmbedField>,
    pub footer: EmbedFooter,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedFooter {
    pub text: String,
}

pub fn alert_color(gold_forecast: Option<&str>) -> u32 {
    match gold_forecast {
        Some(forecast) if forecast.contains("Bearish") => COLOR_BEARISH,
        _ => COLOR_BULLISH,
    }
}

pub fn build_payload(record: &AnalysisRecord) -> WebhookPayload {
    let field = |name: &str, value: &Option<String>, inline: bool| EmbedField {
        name: name.to_string(),
        value: value.clone().unwrap_or_else(|| NOT_AVAILABLE.to_string()),
        inline,
    };

    WebhookPayload {
        embeds: vec![Embed {
            title: ALERT_TITLE.to_string(),
            description: record.source_text.clone(),
            color: alert_color(record.gold_forecast.as_deref()),
            fields: vec![
                field("Sentiment", &record.sentiment, true),
                field("Gold Forecast", &record.gold_forecast, true),
                field("Reasoning", &record.reasoning, false),
            ],
            footer: EmbedFooter {
                text: ALERT_FOOTER.to_string(),
            },
        }],
    }
}

pub struct DiscordNotifier {
    client: Client,
    webhook_url: String,
}

impl DiscordNotifier {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.webhook_request_timeout_secs))
            .build()
            .context("Failed to build webhook HTTP client")?;

        Ok(DiscordNotifier {
            client,
            webhook_url: config.discord_webhook_url.clone(),
        })
    }

    #[cfg(test)]
    fn with_client(client: Client, webhook_url: String) -> Self {
        DiscordNotifier {
            client,
            webhook_url,
        }
    }

    /// One POST, no retries.
    pub async fn send_alert(&self, record: &AnalysisRecord) -> Result<()> {
        let payload = build_payload(record);
        let response = self
            .client
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await
            .context("Discord webhook request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Discord webhook returned {}: {}", status, body);
        }
        debug!("Discord webhook accepted alert ({})", status);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn bearish_record() -> AnalysisRecord {
        AnalysisRecord {
            found_new_update: true,
            source_text: Some("Trump says deal imminent".to_string()),
            timestamp: Some("2024-01-01 00:00".to_string()),
            sentiment: Some("Doveish".to_string()),
            gold_forecast: Some("Bearish".to_string()),
            reasoning: Some("Peace reduces haven demand".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_alert_color() {
        assert_eq!(alert_color(Some("Bearish")), COLOR_BEARISH);
        assert_eq!(alert_color(Some("Strongly Bearish (crash)")), COLOR_BEARISH);
        assert_eq!(alert_color(Some("Bullish")), COLOR_BULLISH);
        assert_eq!(alert_color(Some("bearish")), COLOR_BULLISH);
        assert_eq!(alert_color(Some("???")), COLOR_BULLISH);
        assert_eq!(alert_color(Some("")), COLOR_BULLISH);
        assert_eq!(alert_color(None), COLOR_BULLISH);
    }

    #[test]
    fn test_build_payload_json_shape() {
        let payload = serde_json::to_value(build_payload(&bearish_record())).unwrap();
        assert_eq!(
            payload,
            serde_json::json!({
                "embeds": [{
                    "title": "🚨 GoldSentinel Alert",
                    "description": "Trump says deal imminent",
                    "color": 15158332,
                    "fields": [
                        {"name": "Sentiment", "value": "Doveish", "inline": true},
                        {"name": "Gold Forecast", "value": "Bearish", "inline": true},
                        {"name": "Reasoning", "value": "Peace reduces haven demand", "inline": false}
                    ],
                    "footer": {"text": "Powered by Gemini 2.0 & GitHub Actions"}
                }]
            })
        );
    }

    #[test]
    fn test_build_payload_defaults_missing_fields() {
        let record = AnalysisRecord {
            found_new_update: true,
            ..Default::default()
        };
        let payload = build_payload(&record);
        let embed = &payload.embeds[0];
        assert_eq!(embed.color, COLOR_BULLISH);
        assert!(embed.description.is_none());
        assert!(embed.fields.iter().all(|f| f.value == "N/A"));
    }

    #[tokio::test]
    async fn test_send_alert_posts_payload() {
        let server = MockServer::start().await;
        let record = bearish_record();
        Mock::given(method("POST"))
            .and(path("/api/webhooks/1/abc"))
            .and(body_json(build_payload(&record)))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = DiscordNotifier::with_client(
            Client::new(),
            format!("{}/api/webhooks/1/abc", server.uri()),
        );
        notifier.send_alert(&record).await.unwrap();
    }

    #[tokio::test]
    async fn test_send_alert_non_success_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad embed"))
            .mount(&server)
            .await;

        let notifier = DiscordNotifier::with_client(Client::new(), server.uri());
        let err = notifier.send_alert(&bearish_record()).await.unwrap_err();
        assert!(err.to_string().contains("400"));
    }

    #[tokio::test]
    async fn test_send_alert_network_error() {
        let notifier =
            DiscordNotifier::with_client(Client::new(), "http://127.0.0.1:1/hook".to_string());
        assert!(notifier.send_alert(&bearish_record()).await.is_err());
    }
}
