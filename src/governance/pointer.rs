//! The active-model pointer and its promotion history.
//!
//! The pointer file holds a single line, the path of the active artifact.
//! It is only ever replaced whole (write-new-then-rename), so a concurrent
//! reader sees either the old pointer or the new one. Every promotion also
//! appends one JSON line to the history log; the pointer's version is the
//! number of recorded promotions.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core::config::GovernanceConfig;
use crate::core::errors::{Result, ResultExt, SpecLensError};
use crate::core::file_utils::{append_line, atomic_write, FileReader};

/// Reference to the model serving should use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveModelPointer {
    /// Artifact path
    pub artifact: PathBuf,
    /// Promotions recorded so far (0 when the pointer was written by hand)
    pub version: usize,
}

/// One line of the promotion history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromotionRecord {
    /// Version this promotion produced
    pub version: usize,
    /// Candidate name
    pub candidate: String,
    /// Artifact the pointer now names
    pub artifact: PathBuf,
    /// Held-out RISKY recall of the candidate
    pub recall: f64,
    /// Threshold in force
    pub threshold: f64,
    /// When the pointer was replaced
    pub promoted_at: DateTime<Utc>,
}

/// Filesystem home of the pointer and history log.
#[derive(Debug, Clone)]
pub struct PointerStore {
    pointer_path: PathBuf,
    history_path: PathBuf,
}

impl PointerStore {
    /// Store over explicit paths
    pub fn new(pointer_path: impl Into<PathBuf>, history_path: impl Into<PathBuf>) -> Self {
        Self {
            pointer_path: pointer_path.into(),
            history_path: history_path.into(),
        }
    }

    /// Store over the configured paths
    pub fn from_config(config: &GovernanceConfig) -> Self {
        Self::new(&config.pointer_path, &config.history_path)
    }

    /// Pointer file path
    pub fn pointer_path(&self) -> &Path {
        &self.pointer_path
    }

    /// History log path
    pub fn history_path(&self) -> &Path {
        &self.history_path
    }

    /// Current pointer, or `None` when nothing has been promoted yet.
    pub fn read(&self) -> Result<Option<ActiveModelPointer>> {
        if !self.pointer_path.is_file() {
            return Ok(None);
        }
        let text = FileReader::read_to_string(&self.pointer_path)?;
        let artifact = text.trim();
        if artifact.is_empty() {
            return Ok(None);
        }
        Ok(Some(ActiveModelPointer {
            artifact: PathBuf::from(artifact),
            version: self.history()?.len(),
        }))
    }

    /// Recorded promotions, oldest first
    pub fn history(&self) -> Result<Vec<PromotionRecord>> {
        if !self.history_path.is_file() {
            return Ok(Vec::new());
        }
        let text = FileReader::read_to_string(&self.history_path)?;
        text.lines()
            .filter(|line| !line.trim().is_empty())
            .enumerate()
            .map(|(i, line)| {
                serde_json::from_str(line).map_err(|e| {
                    SpecLensError::validation_field(
                        format!("history line {} is not a promotion record: {e}", i + 1),
                        self.history_path.display().to_string(),
                    )
                })
            })
            .collect()
    }

    /// Replace the pointer and record the promotion.
    pub fn promote(
        &self,
        candidate: &str,
        artifact: &Path,
        recall: f64,
        threshold: f64,
    ) -> Result<ActiveModelPointer> {
        let version = self.history()?.len() + 1;
        let line = format!("{}\n", artifact.display());
        atomic_write(&self.pointer_path, line.as_bytes())
            .with_context(|| "Failed to replace the active-model pointer".to_string())?;

        let record = PromotionRecord {
            version,
            candidate: candidate.to_string(),
            artifact: artifact.to_path_buf(),
            recall,
            threshold,
            promoted_at: Utc::now(),
        };
        append_line(&self.history_path, &serde_json::to_string(&record)?)?;
        debug!(history = %self.history_path.display(), version, "Recorded promotion");
        info!(
            candidate,
            artifact = %artifact.display(),
            version,
            "Active model pointer updated"
        );

        Ok(ActiveModelPointer {
            artifact: artifact.to_path_buf(),
            version,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(dir: &Path) -> PointerStore {
        PointerStore::new(dir.join("active_model.txt"), dir.join("promotions.jsonl"))
    }

    #[test]
    fn fresh_store_has_no_pointer() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        assert_eq!(store.read().unwrap(), None);
        assert!(store.history().unwrap().is_empty());
    }

    #[test]
    fn promotions_bump_the_version() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());

        let first = store.promote("logistic", Path::new("models/logistic.json"), 0.9, 0.8).unwrap();
        assert_eq!(first.version, 1);
        let second = store.promote("tree", Path::new("models/tree.json"), 0.95, 0.8).unwrap();
        assert_eq!(second.version, 2);

        let current = store.read().unwrap().unwrap();
        assert_eq!(current, second);

        let history = store.history().unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].candidate, "logistic");
        assert_eq!(history[1].artifact, PathBuf::from("models/tree.json"));
    }

    #[test]
    fn hand_written_pointer_has_version_zero() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        std::fs::write(store.pointer_path(), "  models/manual.json \n").unwrap();

        let pointer = store.read().unwrap().unwrap();
        assert_eq!(pointer.artifact, PathBuf::from("models/manual.json"));
        assert_eq!(pointer.version, 0);
    }

    #[test]
    fn blank_pointer_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        std::fs::write(store.pointer_path(), "\n").unwrap();
        assert_eq!(store.read().unwrap(), None);
    }

    #[test]
    fn corrupt_history_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        std::fs::write(store.history_path(), "not json\n").unwrap();
        assert!(store.history().is_err());
    }
}
