use anyhow::{Context, Result};
use chrono::Local;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::Config;

/// Local wall-clock format used for record timestamps.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M";

const PROMPT_TEMPLATE: &str = r#"You are GoldSentinel, an expert geopolitical analyst covering the gold market.

LATEST RAW NEWS / SEARCH RESULTS:
{{news}}

INSTRUCTIONS:
1. Focus: look for ANY statement from the last 24 hours by Donald Trump or US/Iran officials about the Iran nuclear deal or a possible war.
2. If the news is old, irrelevant, or a generic summary, return "found_new_update": false.
3. If there is relevant breaking news, classify it:
   - SENTIMENT: "Hawkish" (war, threats) or "Doveish" (diplomacy, deal). Use "Neutral" if neither.
   - GOLD_FORECAST: "Bullish" (price up) when sentiment is Hawkish or uncertain,
     "Bearish" (price down) when sentiment is Doveish or a peace deal is near.

RETURN ONLY RAW JSON, NO MARKDOWN:
{
    "found_new_update": true,
    "source_text": "A brief one-sentence summary of the specific event or post.",
    "timestamp": "{{timestamp}}",
    "sentiment": "Hawkish/Doveish/Neutral",
    "gold_forecast": "Bullish/Bearish",
    "reasoning": "A short explanation of why gold will move this way."
}
"#;

// ─── Analysis record ───

/// The model's verdict on a batch of news. Enum-like fields are free text,
/// and non-string values in text fields are kept as their JSON text.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AnalysisRecord {
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub found_new_update: bool,
    #[serde(
        default,
        deserialize_with = "deserialize_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub source_text: Option<String>,
    #[serde(
        default,
        deserialize_with = "deserialize_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub timestamp: Option<String>,
    #[serde(
        default,
        deserialize_with = "deserialize_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub sentiment: Option<String>,
    #[serde(
        default,
        deserialize_with = "deserialize_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub gold_forecast: Option<String>,
    #[serde(
        default,
        deserialize_with = "deserialize_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub reasoning: Option<String>,
    /// Keys the model added beyond the documented six.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// Accepts booleans, numbers, "true"/"yes"/"1" strings and null
fn deserialize_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Bool(b) => b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => matches!(s.trim().to_lowercase().as_str(), "true" | "yes" | "1"),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
        Value::Null => false,
    })
}

fn deserialize_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    })
}

impl AnalysisRecord {
    pub fn no_update() -> Self {
        AnalysisRecord::default()
    }
}

// ─── Gemini API types ───

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<RequestContent>,
}

#[derive(Debug, Serialize)]
struct RequestContent {
    role: String,
    parts: Vec<RequestPart>,
}

#[derive(Debug, Serialize)]
struct RequestPart {
    text: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u64,
    #[serde(default)]
    candidates_token_count: u64,
}

// ─── The Analyzer ───

pub struct Analyzer {
    client: Client,
    api_url: String,
    api_key: String,
    model: String,
}

impl Analyzer {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.analyzer_request_timeout_secs))
            .build()
            .context("Failed to build Analyzer HTTP client")?;

        Ok(Analyzer {
            client,
            api_url: config.gemini_api_url.clone(),
            api_key: config.gemini_api_key.clone(),
            model: config.gemini_model.clone(),
        })
    }

    #[cfg(test)]
    fn with_client(client: Client, api_url: String, api_key: String) -> Self {
        Analyzer {
            client,
            api_url,
            api_key,
            model: "gemini-2.0-flash".to_string(),
        }
    }

    /// Classify a block of news. Never fails: empty input, transport errors
    /// and unparseable output all come back as "no update".
    pub async fn analyze(&self, news_text: &str) -> AnalysisRecord {
        if news_text.trim().is_empty() {
            debug!("No news text to analyze, skipping Gemini call");
            return AnalysisRecord::no_update();
        }

        let timestamp = Local::now().format(TIMESTAMP_FORMAT).to_string();
        match self.classify(news_text, &timestamp).await {
            Ok(record) => record,
            Err(e) => {
                warn!("AI analysis failed: {:#}", e);
                AnalysisRecord::no_update()
            }
        }
    }

    async fn classify(&self, news_text: &str, timestamp: &str) -> Result<AnalysisRecord> {
        let prompt = render_prompt(news_text, timestamp);
        let response = self.call_gemini(&prompt).await?;

        if let Some(usage) = &response.usage_metadata {
            debug!(
                "Gemini usage: {} prompt tokens, {} output tokens",
                usage.prompt_token_count, usage.candidates_token_count
            );
        }

        let text = extract_text(&response)?;
        let mut record = parse_analysis(&text)?;

        if !record.found_new_update {
            debug!("Model reported no new update");
            return Ok(AnalysisRecord::no_update());
        }
        if record.timestamp.is_none() {
            record.timestamp = Some(timestamp.to_string());
        }
        info!(
            "Analysis: sentiment={}, gold_forecast={}",
            record.sentiment.as_deref().unwrap_or("?"),
            record.gold_forecast.as_deref().unwrap_or("?"),
        );
        Ok(record)
    }

    async fn call_gemini(&self, prompt: &str) -> Result<GenerateResponse> {
        let request = GenerateRequest {
            contents: vec![RequestContent {
                role: "user".to_string(),
                parts: vec![RequestPart {
                    text: prompt.to_string(),
                }],
            }],
        };

        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.api_url.trim_end_matches('/'),
            self.model
        );
        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .context("Gemini API request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Gemini API returned {}: {}", status, body);
        }

        response
            .json::<GenerateResponse>()
            .await
            .context("Failed to parse Gemini API response")
    }
}

pub fn render_prompt(news_text: &str, timestamp: &str) -> String {
    PROMPT_TEMPLATE
        .replace("{{news}}", news_text)
        .replace("{{timestamp}}", timestamp)
}

/// Remove every markdown code-fence marker the model may have added.
pub fn strip_code_fences(text: &str) -> String {
    text.replace("```json", "")
        .replace("```", "")
        .trim()
        .to_string()
}

pub fn parse_analysis(text: &str) -> Result<AnalysisRecord> {
    serde_json::from_str(&strip_code_fences(text))
        .context("Failed to parse Gemini output as AnalysisRecord JSON")
}

fn extract_text(response: &GenerateResponse) -> Result<String> {
    let text: String = response
        .candidates
        .first()
        .and_then(|c| c.content.as_ref())
        .map(|content| {
            content
                .parts
                .iter()
                .filter_map(|p| p.text.as_deref())
                .collect::<String>()
        })
        .context("No candidates in Gemini response")?;
    if text.trim().is_empty() {
        anyhow::bail!("Empty text in Gemini response");
    }
    Ok(text)
}
