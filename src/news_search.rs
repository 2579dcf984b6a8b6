use anyhow::{anyhow, Context, Result};
use regex::Regex;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::Config;

const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
    (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// A single search hit used as context for the analyzer.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub title: String,
    pub body: String,
}

pub struct NewsSearcher {
    client: Client,
    search_url: String,
    max_results: usize,
}

impl NewsSearcher {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.search_request_timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to build search HTTP client")?;

        Ok(NewsSearcher {
            client,
            search_url: config.search_url.clone(),
            max_results: config.search_max_results,
        })
    }

    #[cfg(test)]
    fn with_client(client: Client, search_url: String, max_results: usize) -> Self {
        NewsSearcher {
            client,
            search_url,
            max_results,
        }
    }

    /// Best-effort search: any failure is logged and yields no results.
    pub async fn search(&self, query: &str) -> Vec<SearchResult> {
        info!("Searching for latest news: \"{}\"", query);
        match self.fetch(query).await {
            Ok(results) => {
                info!("Search returned {} results", results.len());
                results
            }
            Err(e) => {
                warn!("Search failed: {:#}", e);
                vec![]
            }
        }
    }

    pub async fn fetch(&self, query: &str) -> Result<Vec<SearchResult>> {
        let response = self
            .client
            .post(&self.search_url)
            .form(&[("q", query)])
            .header("Accept", "text/html")
            .send()
            .await
            .context("Failed to reach search provider")?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("Search provider returned {}", status);
        }

        let body = response
            .text()
            .await
            .context("Failed to read search response body")?;
        debug!("Search response: {} bytes", body.len());

        parse_results(&body, self.max_results)
    }
}

/// Extract result titles and snippets from a DuckDuckGo HTML results page.
pub fn parse_results(html: &str, max_results: usize) -> Result<Vec<SearchResult>> {
    let result_sel = selector(".result")?;
    let title_sel = selector("a.result__a")?;
    let snippet_sel = selector(".result__snippet")?;
    let whitespace = Regex::new(r"\s+").context("Invalid whitespace pattern")?;

    let doc = Html::parse_document(html);
    let mut results = Vec::new();
    for node in doc.select(&result_sel) {
        if results.len() >= max_results {
            break;
        }
        if is_sponsored(node, &title_sel) {
            continue;
        }
        let title = node
            .select(&title_sel)
            .next()
            .map(|el| el.text().collect::<String>())
            .unwrap_or_default();
        let title = whitespace.replace_all(title.trim(), " ").into_owned();
        if title.is_empty() {
            continue;
        }
        let body = node
            .select(&snippet_sel)
            .next()
            .map(|el| el.text().collect::<String>())
            .unwrap_or_default();
        let body = whitespace.replace_all(body.trim(), " ").into_owned();

        results.push(SearchResult { title, body });
    }
    Ok(results)
}

/// Ads carry the `result--ad` class and link through the `y.js` redirect.
fn is_sponsored(node: ElementRef<'_>, title_sel: &Selector) -> bool {
    node.value().classes().any(|c| c == "result--ad")
        || node
            .select(title_sel)
            .next()
            .and_then(|el| el.value().attr("href"))
            .is_some_and(|href| href.contains("duckduckgo.com/y.js"))
}

fn selector(css: &'static str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow!("Invalid selector {}: {}", css, e))
}

/// Join snippets into the text block handed to the analyzer.
pub fn format_snippets(results: &[SearchResult]) -> String {
    results
        .iter()
        .map(|r| format!("- {}: {}", r.title, r.body))
        .collect::<Vec<_>>()
        .join("\n")
}
