//! Item source over a JSON-lines export (mail, chat or social feed dumps).
//!
//! Each non-empty line is one record. The record's `id` field, when present, is its
//! identity; otherwise the digest of the line is.

use crate::error::{Result, ScrapeError};
use crate::pipeline::{ItemSource, SourceItem, content_hash};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashSet;
use std::path::PathBuf;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::sync::Mutex;

#[derive(Default)]
struct FeedSession {
    lines: Option<Lines<BufReader<File>>>,
    line_number: usize,
    seen: HashSet<String>,
    matched_hashes: HashSet<String>,
}

pub struct JsonLinesSource {
    path: PathBuf,
    skip_item_hashes: HashSet<String>,
    session: Mutex<FeedSession>,
}

/// Identity of a record: its `id` field or the digest of the line
fn record_hash(record: &Value, line: &str) -> String {
    match record.get("id") {
        Some(Value::String(id)) if !id.is_empty() => id.clone(),
        Some(Value::Number(id)) => id.to_string(),
        _ => content_hash(line),
    }
}

impl JsonLinesSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            skip_item_hashes: HashSet::new(),
            session: Mutex::new(FeedSession::default()),
        }
    }

    pub fn skip_item_hashes(mut self, hashes: impl IntoIterator<Item = String>) -> Self {
        self.skip_item_hashes = hashes.into_iter().collect();
        self
    }

    /// Skip-list hashes found in the file during the current session
    pub async fn matched_hashes(&self) -> HashSet<String> {
        self.session.lock().await.matched_hashes.clone()
    }
}

#[async_trait]
impl ItemSource for JsonLinesSource {
    async fn init(&self) -> Result<()> {
        let file = File::open(&self.path)
            .await
            .map_err(|e| ScrapeError::SourceInit(format!("Failed to open {}: {}", self.path.display(), e)))?;
        *self.session.lock().await = FeedSession {
            lines: Some(BufReader::new(file).lines()),
            ..FeedSession::default()
        };
        log::info!("Reading records from {}", self.path.display());
        Ok(())
    }

    async fn next_items(&self, n: usize) -> Result<Option<Vec<SourceItem>>> {
        let mut guard = self.session.lock().await;
        let session = &mut *guard;
        let Some(lines) = session.lines.as_mut() else {
            return Ok(None);
        };

        let mut items = Vec::new();
        while items.len() < n {
            let Some(line) = lines.next_line().await? else {
                session.lines = None;
                break;
            };
            session.line_number += 1;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let record: Value = match serde_json::from_str(line) {
                Ok(record) => record,
                Err(e) => {
                    log::warn!("Skipping line {} of {}: {}", session.line_number, self.path.display(), e);
                    continue;
                }
            };
            let hash = record_hash(&record, line);
            if self.skip_item_hashes.contains(&hash) {
                session.matched_hashes.insert(hash);
                continue;
            }
            if session.seen.insert(hash.clone()) {
                items.push(SourceItem::new(hash, line));
            }
        }

        Ok(if items.is_empty() { None } else { Some(items) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn feed(lines: &[&str]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for line in lines {
            writeln!(file, "{}", line).unwrap();
        }
        file
    }

    #[test]
    fn test_record_hash() {
        let line = r#"{"subject": "hi"}"#;
        let record: Value = serde_json::from_str(line).unwrap();
        assert_eq!(record_hash(&record, line), content_hash(line));
        assert_eq!(record_hash(&serde_json::json!({"id": "m-1"}), ""), "m-1");
        assert_eq!(record_hash(&serde_json::json!({"id": 42}), ""), "42");
    }

    #[tokio::test]
    async fn test_reads_in_batches() {
        let file = feed(&[
            r#"{"id": 1, "subject": "a"}"#,
            "",
            r#"{"id": 2, "subject": "b"}"#,
            "not json",
            r#"{"id": 1, "subject": "a again"}"#,
            r#"{"id": 3, "subject": "c"}"#,
        ]);
        let source = JsonLinesSource::new(file.path());
        source.init().await.unwrap();

        let first = source.next_items(2).await.unwrap().unwrap();
        assert_eq!(first.iter().map(|i| i.hash.as_str()).collect::<Vec<_>>(), vec!["1", "2"]);
        let second = source.next_items(2).await.unwrap().unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].hash, "3");
        assert!(source.next_items(2).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_resume_and_restart() {
        let file = feed(&[r#"{"id": "a"}"#, r#"{"id": "b"}"#]);
        let source = JsonLinesSource::new(file.path()).skip_item_hashes(vec!["a".to_string()]);

        source.init().await.unwrap();
        let items = source.next_items(10).await.unwrap().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(source.matched_hashes().await, HashSet::from(["a".to_string()]));

        source.init().await.unwrap();
        assert_eq!(source.next_items(10).await.unwrap().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_file_fails_init() {
        let source = JsonLinesSource::new("/definitely/not/here.jsonl");
        assert!(matches!(source.init().await, Err(ScrapeError::SourceInit(_))));
    }
}
