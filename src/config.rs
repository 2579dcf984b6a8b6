use std::env;
use std::str::FromStr;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{0} is not set. Make sure GEMINI_API_KEY and DISCORD_WEBHOOK_URL are provided as secrets")]
    Missing(&'static str),
}

#[derive(Debug, Clone)]
pub struct Config {
    // Secrets
    pub gemini_api_key: String,
    pub discord_webhook_url: String,
    // Gemini
    pub gemini_api_url: String,
    pub gemini_model: String,
    pub analyzer_request_timeout_secs: u64,
    // Search
    pub search_url: String,
    pub search_query: String,
    pub search_max_results: usize,
    pub search_request_timeout_secs: u64,
    // Webhook
    pub webhook_request_timeout_secs: u64,
    // History
    pub history_path: String,
    pub history_cap: usize,
    pub dedup_enabled: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Don't fail if .env missing
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build a config from an arbitrary variable source.
    pub fn from_lookup<F>(mut lookup: F) -> Result<Self, ConfigError>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let mut required = |name: &'static str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing(name))
        };
        let gemini_api_key = required("GEMINI_API_KEY")?;
        let discord_webhook_url = required("DISCORD_WEBHOOK_URL")?;

        let mut or_default =
            |name: &str, default: &str| lookup(name).unwrap_or_else(|| default.to_string());

        let gemini_api_url =
            or_default("GEMINI_API_URL", "https://generativelanguage.googleapis.com");
        let gemini_model = or_default("GEMINI_MODEL", "gemini-2.0-flash");
        let analyzer_timeout = or_default("ANALYZER_REQUEST_TIMEOUT_SECS", "30");
        let search_url = or_default("SEARCH_URL", "https://html.duckduckgo.com/html/");
        let search_query = or_default(
            "SEARCH_QUERY",
            "Donald Trump Truth Social Iran nuclear deal latest news",
        );
        let search_max_results = or_default("SEARCH_MAX_RESULTS", "5");
        let search_timeout = or_default("SEARCH_REQUEST_TIMEOUT_SECS", "15");
        let webhook_timeout = or_default("WEBHOOK_REQUEST_TIMEOUT_SECS", "10");
        let history_path = or_default("HISTORY_PATH", "data/history.json");
        let history_cap = or_default("HISTORY_CAP", "50");
        let dedup_enabled = or_default("DEDUP_ENABLED", "false");

        Ok(Config {
            gemini_api_key,
            discord_webhook_url,
            gemini_api_url,
            gemini_model,
            analyzer_request_timeout_secs: parse_or(
                "ANALYZER_REQUEST_TIMEOUT_SECS",
                &analyzer_timeout,
                30,
            ),
            search_url,
            search_query,
            search_max_results: parse_or("SEARCH_MAX_RESULTS", &search_max_results, 5),
            search_request_timeout_secs: parse_or(
                "SEARCH_REQUEST_TIMEOUT_SECS",
                &search_timeout,
                15,
            ),
            webhook_request_timeout_secs: parse_or(
                "WEBHOOK_REQUEST_TIMEOUT_SECS",
                &webhook_timeout,
                10,
            ),
            history_path,
            history_cap: parse_or("HISTORY_CAP", &history_cap, 50),
            dedup_enabled: parse_bool_or("DEDUP_ENABLED", &dedup_enabled, false),
        })
    }
}

/// Tunables never abort a run: an unparseable value logs and keeps the default.
fn parse_or<T>(name: &str, value: &str, default: T) -> T
where
    T: FromStr + std::fmt::Display,
{
    value.trim().parse().unwrap_or_else(|_| {
        warn!("Ignoring invalid {}='{}', using {}", name, value, default);
        default
    })
}

fn parse_bool_or(name: &str, value: &str, default: bool) -> bool {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" | "" => false,
        _ => {
            warn!("Ignoring invalid {}='{}', using {}", name, value, default);
            default
        }
    }
}
