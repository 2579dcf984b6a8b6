use anyhow::{Context, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use serde_json::Value;
use tracing::{debug, warn};

use crate::analyzer::AnalysisRecord;

/// Rolling, newest-first list of past alerts kept as a JSON array on disk.
pub struct HistoryStore {
    path: PathBuf,
    cap: usize,
}

impl HistoryStore {
    pub fn new(path: impl Into<PathBuf>, cap: usize) -> Self {
        HistoryStore {
            path: path.into(),
            cap,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing or unreadable history is treated as empty. Entries are decoded
    /// one by one so a single odd entry never discards the rest.
    pub fn load(&self) -> Vec<AnalysisRecord> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) => {
                debug!("No history at {}: {}", self.path.display(), e);
                return vec![];
            }
        };
        let entries: Vec<Value> = match serde_json::from_str(&raw) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(
                    "Ignoring unreadable history file {}: {}",
                    self.path.display(),
                    e
                );
                return vec![];
            }
        };

        entries
            .into_iter()
            .enumerate()
            .filter_map(|(i, entry)| match serde_json::from_value(entry) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(
                        "Skipping history entry {} in {}: {}",
                        i,
                        self.path.display(),
                        e
                    );
                    None
                }
            })
            .collect()
    }

    /// Write the first `cap` records, replacing the file atomically.
    pub fn save(&self, records: &[AnalysisRecord]) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => {
                fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create history directory: {}", parent.display())
                })?;
                parent.to_path_buf()
            }
            _ => PathBuf::from("."),
        };

        let kept = &records[..records.len().min(self.cap)];
        let json = serde_json::to_string_pretty(kept).context("Failed to serialize history")?;

        let file_name = self
            .path
            .file_name()
            .with_context(|| format!("History path has no file name: {}", self.path.display()))?;
        let tmp = dir.join(format!(".{}.tmp", file_name.to_string_lossy()));

        if let Err(e) = self.replace_with(&tmp, &json) {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }

        debug!("Saved {} history records to {}", kept.len(), self.path.display());
        Ok(())
    }

    fn replace_with(&self, tmp: &Path, json: &str) -> Result<()> {
        let mut file = fs::File::create(tmp)
            .with_context(|| format!("Failed to create {}", tmp.display()))?;
        file.write_all(json.as_bytes())
            .and_then(|_| file.sync_all())
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        fs::rename(tmp, &self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))
    }

    /// Put `record` at the front and drop whatever falls past the cap.
    pub fn prepend(
        &self,
        mut history: Vec<AnalysisRecord>,
        record: AnalysisRecord,
    ) -> Vec<AnalysisRecord> {
        history.insert(0, record);
        history.truncate(self.cap);
        history
    }
}

/// True when `record` repeats the summary of the most recent entry.
pub fn is_duplicate(history: &[AnalysisRecord], record: &AnalysisRecord) -> bool {
    history
        .first()
        .is_some_and(|last| last.source_text.is_some() && last.source_text == record.source_text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(n: usize) -> AnalysisRecord {
        AnalysisRecord {
            found_new_update: true,
            source_text: Some(format!("Event {}", n)),
            timestamp: Some(format!("2025-01-01 00:{:02}", n % 60)),
            sentiment: Some("Hawkish".to_string()),
            gold_forecast: Some("Bullish".to_string()),
            reasoning: Some("Tension".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = HistoryStore::new(dir.path().join("history.json"), 50);
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_load_corrupt_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.json");
        fs::write(&path, "{not json").unwrap();
        let store = HistoryStore::new(&path, 50);
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_load_keeps_entries_around_an_odd_one() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.json");
        fs::write(
            &path,
            r#"[
  {"found_new_update": true, "source_text": "Newest"},
  {"found_new_update": 1, "source_text": "Middle", "reasoning": ["list", "value"]},
  "not an object",
  {"found_new_update": true, "source_text": "Oldest"}
]"#,
        )
        .unwrap();
        let store = HistoryStore::new(&path, 50);

        let loaded = store.load();
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded[1].reasoning.as_deref(), Some(r#"["list","value"]"#));

        let history = store.prepend(loaded, record(9));
        store.save(&history).unwrap();
        let summaries: Vec<_> = store
            .load()
            .into_iter()
            .map(|r| r.source_text.unwrap_or_default())
            .collect();
        assert_eq!(summaries, vec!["Event 9", "Newest", "Middle", "Oldest"]);
    }

    #[test]
    fn test_failed_save_removes_temp_file() {
        let dir = TempDir::new().unwrap();
        // A non-empty directory at the target path makes the rename fail
        let path = dir.path().join("history.json");
        fs::create_dir(&path).unwrap();
        fs::write(path.join("keep"), "x").unwrap();
        let store = HistoryStore::new(&path, 50);

        assert!(store.save(&[record(1)]).is_err());
        assert!(!dir.path().join(".history.json.tmp").exists());
        assert!(path.join("keep").exists());
    }

    #[test]
    fn test_save_creates_directory_and_pretty_prints() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data").join("history.json");
        let store = HistoryStore::new(&path, 50);

        store.save(&[record(1)]).unwrap();

        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.starts_with("[\n  {\n    \"found_new_update\": true"));
        assert!(!dir.path().join("data").join(".history.json.tmp").exists());
        assert_eq!(store.load(), vec![record(1)]);
    }

    #[test]
    fn test_save_truncates_to_cap() {
        let dir = TempDir::new().unwrap();
        let store = HistoryStore::new(dir.path().join("history.json"), 3);
        let records: Vec<_> = (0..5).map(record).collect();

        store.save(&records).unwrap();

        assert_eq!(store.load(), records[..3].to_vec());
    }

    #[test]
    fn test_repeated_prepend_keeps_newest_fifty() {
        let dir = TempDir::new().unwrap();
        let store = HistoryStore::new(dir.path().join("history.json"), 50);

        for n in 0..60 {
            let history = store.prepend(store.load(), record(n));
            store.save(&history).unwrap();
        }

        let loaded = store.load();
        assert_eq!(loaded.len(), 50);
        assert_eq!(loaded[0], record(59));
        assert_eq!(loaded[49], record(10));
        let expected: Vec<_> = (10..60).rev().map(record).collect();
        assert_eq!(loaded, expected);
    }

    #[test]
    fn test_save_load_round_trip_preserves_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.json");
        let mut odd = record(7);
        odd.gold_forecast = None;
        odd.extra.insert("confidence".to_string(), serde_json::json!("high"));
        let store = HistoryStore::new(&path, 50);
        store.save(&[record(1), odd.clone()]).unwrap();
        let first = fs::read_to_string(&path).unwrap();

        store.save(&store.load()).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), first);
        assert_eq!(store.load(), vec![record(1), odd]);
    }

    #[test]
    fn test_is_duplicate() {
        let history = vec![record(2), record(1)];
        assert!(is_duplicate(&history, &record(2)));
        assert!(!is_duplicate(&history, &record(1)));
        assert!(!is_duplicate(&[], &record(1)));

        let blank = AnalysisRecord {
            found_new_update: true,
            ..Default::default()
        };
        assert!(!is_duplicate(&[blank.clone()], &blank));
    }
}
