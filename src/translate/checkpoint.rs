use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use cnidarium::{StateDelta, StateRead, StateWrite, Storage};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::corpus::fingerprint;

const TRANSLATION_PREFIX: &str = "translation";

fn entry_key(slot_id: &str) -> String {
    format!("{}/{}", TRANSLATION_PREFIX, slot_id)
}

/// One committed translation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointEntry {
    pub text: String,
    /// blake3 of the source text the translation was made from.
    pub source_fingerprint: String,
    pub translated_at: i64,
}

impl CheckpointEntry {
    /// True if this translation was made from exactly `source_text`.
    pub fn matches_source(&self, source_text: &str) -> bool {
        self.source_fingerprint == fingerprint(source_text)
    }
}

/// Resumable record of finished translations, keyed by slot ID.
pub struct Checkpoint {
    storage: Storage,
}

impl Checkpoint {
    pub async fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let storage = Storage::load(dir.to_path_buf(), vec![TRANSLATION_PREFIX.to_string()])
            .await
            .context("Failed to init checkpoint storage")?;
        Ok(Self { storage })
    }

    /// Commit `(slot_id, source_text, translated_text)` triples in one delta.
    pub async fn record(&self, entries: &[(&str, &str, &str)]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let snapshot = self.storage.latest_snapshot();
        let mut delta = StateDelta::new(snapshot);
        let now = chrono::Utc::now().timestamp();
        for (slot_id, source_text, text) in entries {
            let entry = CheckpointEntry {
                text: text.to_string(),
                source_fingerprint: fingerprint(source_text),
                translated_at: now,
            };
            delta.put_raw(
                entry_key(slot_id),
                serde_json::to_vec(&entry).context("serialize checkpoint entry")?,
            );
        }
        self.storage.commit(delta).await?;
        debug!(entries = entries.len(), "checkpoint committed");
        Ok(())
    }

    /// Every committed entry.
    pub async fn entries(&self) -> Result<HashMap<String, CheckpointEntry>> {
        let snapshot = self.storage.latest_snapshot();
        let prefix = format!("{}/", TRANSLATION_PREFIX);
        let mut stream = snapshot.prefix_raw(&prefix);
        let mut out = HashMap::new();

        while let Some(entry) = stream.next().await {
            match entry {
                Ok((key, value)) => {
                    let Some(slot_id) = key.strip_prefix(&prefix) else {
                        continue;
                    };
                    match serde_json::from_slice::<CheckpointEntry>(&value) {
                        Ok(parsed) => {
                            out.insert(slot_id.to_string(), parsed);
                        }
                        Err(e) => warn!(slot_id, error = %e, "unreadable checkpoint entry"),
                    }
                }
                Err(e) => warn!(error = %e, "checkpoint scan error"),
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_checkpoint_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let cp = Checkpoint::open(dir.path()).await.unwrap();
            cp.record(&[("q_1#question", "Who?", "誰？"), ("doc_1#content", "Paris.", "巴黎。")])
                .await
                .unwrap();
            assert_eq!(cp.entries().await.unwrap()["q_1#question"].text, "誰？");
            cp.storage.release().await;
        }

        let cp = Checkpoint::open(dir.path()).await.unwrap();
        let entries = cp.entries().await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries["doc_1#content"].text, "巴黎。");
        // A changed source invalidates the cached translation.
        assert!(entries["q_1#question"].matches_source("Who?"));
        assert!(!entries["q_1#question"].matches_source("Who is it?"));
    }
}
