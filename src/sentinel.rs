use anyhow::Result;
use tracing::{debug, error, info, warn};

use crate::analyzer::{AnalysisRecord, Analyzer};
use crate::config::Config;
use crate::history::{is_duplicate, HistoryStore};
use crate::news_search::{format_snippets, NewsSearcher};
use crate::notifier::DiscordNotifier;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Stage {
    Searching,
    Analyzing,
    Alerting,
    Done,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Searching => write!(f, "searching"),
            Stage::Analyzing => write!(f, "analyzing"),
            Stage::Alerting => write!(f, "alerting"),
            Stage::Done => write!(f, "done"),
        }
    }
}

/// How a single run ended. Every variant maps to exit status 0.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    NoUpdate,
    /// Dedup is on and the summary matches the latest history entry.
    Duplicate(AnalysisRecord),
    Alerted {
        record: AnalysisRecord,
        delivered: bool,
        persisted: bool,
    },
}

pub struct Sentinel {
    searcher: NewsSearcher,
    analyzer: Analyzer,
    notifier: DiscordNotifier,
    history: HistoryStore,
    query: String,
    dedup_enabled: bool,
}

impl Sentinel {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Sentinel {
            searcher: NewsSearcher::new(config)?,
            analyzer: Analyzer::new(config)?,
            notifier: DiscordNotifier::new(config)?,
            history: HistoryStore::new(&config.history_path, config.history_cap),
            query: config.search_query.clone(),
            dedup_enabled: config.dedup_enabled,
        })
    }

    pub async fn run_once(&self) -> RunOutcome {
        enter(Stage::Searching);
        let results = self.searcher.search(&self.query).await;
        let news_text = format_snippets(&results);

        enter(Stage::Analyzing);
        let analysis = self.analyzer.analyze(&news_text).await;
        if !analysis.found_new_update {
            info!("No significant new updates found.");
            enter(Stage::Done);
            return RunOutcome::NoUpdate;
        }

        enter(Stage::Alerting);
        let outcome = self.alert_and_record(analysis).await;
        enter(Stage::Done);
        outcome
    }

    async fn alert_and_record(&self, record: AnalysisRecord) -> RunOutcome {
        let history = self.history.load();

        if self.dedup_enabled && is_duplicate(&history, &record) {
            info!(
                "Update matches latest history entry, not alerting: {}",
                record.source_text.as_deref().unwrap_or_default()
            );
            return RunOutcome::Duplicate(record);
        }

        info!(
            "New update found: {}",
            record.source_text.as_deref().unwrap_or("(no summary)")
        );

        let delivered = match self.notifier.send_alert(&record).await {
            Ok(()) => {
                info!("Alert sent to Discord.");
                true
            }
            Err(e) => {
                warn!("Discord alert failed: {:#}", e);
                false
            }
        };

        let history = self.history.prepend(history, record.clone());
        let persisted = match self.history.save(&history) {
            Ok(()) => {
                info!(
                    "History updated ({} records) at {}",
                    history.len(),
                    self.history.path().display()
                );
                true
            }
            Err(e) => {
                error!("Failed to save history: {:#}", e);
                false
            }
        };

        RunOutcome::Alerted {
            record,
            delivered,
            persisted,
        }
    }
}

fn enter(stage: Stage) {
    debug!("Stage: {}", stage);
}
