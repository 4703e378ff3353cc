//! Promotion governor: choose at most one candidate to become active.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::pointer::{ActiveModelPointer, PointerStore};
use crate::core::config::{CandidateEntry, GovernanceConfig};
use crate::core::errors::Result;
use crate::dataset::Dataset;
use crate::models::{recall_risky, ArtifactStore, Classifier, FsArtifactStore, ModelArtifact};

/// A named model artifact up for promotion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateModel {
    /// Candidate name
    pub name: String,
    /// Artifact path
    pub path: PathBuf,
}

impl CandidateModel {
    /// Candidate from a name and artifact path
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }
}

impl From<&CandidateEntry> for CandidateModel {
    fn from(entry: &CandidateEntry) -> Self {
        Self::new(&entry.name, &entry.path)
    }
}

/// Loads candidate artifacts.
pub trait ModelRegistry {
    /// The candidate's artifact, `Ok(None)` when it is not present
    fn load(&self, candidate: &CandidateModel) -> Result<Option<ModelArtifact>>;
}

/// Registry backed by an [`ArtifactStore`].
#[derive(Debug, Clone, Default)]
pub struct StoreRegistry<S = FsArtifactStore> {
    store: S,
}

impl<S: ArtifactStore> StoreRegistry<S> {
    /// Registry over `store`
    pub fn new(store: S) -> Self {
        Self { store }
    }
}

impl<S: ArtifactStore> ModelRegistry for StoreRegistry<S> {
    fn load(&self, candidate: &CandidateModel) -> Result<Option<ModelArtifact>> {
        self.store.load(&candidate.path)
    }
}

/// How one candidate fared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CandidateStatus {
    /// Scored on the held-out set
    Evaluated {
        /// RISKY-class recall
        recall: f64,
    },
    /// Not scored
    Skipped {
        /// Why
        reason: String,
    },
}

/// Per-candidate line of the report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateEvaluation {
    /// Candidate
    pub candidate: CandidateModel,
    /// Outcome
    pub status: CandidateStatus,
}

impl CandidateEvaluation {
    /// Recall, when the candidate was scored
    pub fn recall(&self) -> Option<f64> {
        match self.status {
            CandidateStatus::Evaluated { recall } => Some(recall),
            CandidateStatus::Skipped { .. } => None,
        }
    }
}

/// What the governor decided.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum PromotionDecision {
    /// The pointer now names this candidate's artifact
    Promoted {
        /// Winning candidate
        candidate: String,
        /// Its artifact
        artifact: PathBuf,
        /// Its recall
        recall: f64,
    },
    /// The best candidate is already active; nothing was written
    AlreadyActive {
        /// Winning candidate
        candidate: String,
        /// Its artifact
        artifact: PathBuf,
        /// Its recall
        recall: f64,
    },
    /// The best candidate missed the threshold; the pointer is unchanged
    BelowThreshold {
        /// Best candidate
        candidate: String,
        /// Its recall
        recall: f64,
        /// Required recall
        threshold: f64,
    },
    /// No candidate artifact could be scored
    NoCandidates,
}

impl PromotionDecision {
    /// True when the pointer was replaced
    pub fn is_promoted(&self) -> bool {
        matches!(self, Self::Promoted { .. })
    }
}

/// Full result of one governor run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromotionReport {
    /// One entry per candidate, in registration order
    pub evaluations: Vec<CandidateEvaluation>,
    /// Decision
    pub decision: PromotionDecision,
    /// Pointer before the run
    pub pointer_before: Option<ActiveModelPointer>,
    /// Pointer after the run
    pub pointer_after: Option<ActiveModelPointer>,
}

impl PromotionReport {
    /// Highest-recall candidate (first seen on ties), whether or not it was promoted
    pub fn selected(&self) -> Option<&CandidateEvaluation> {
        select_best(&self.evaluations).map(|(index, _)| &self.evaluations[index])
    }
}

fn select_best(evaluations: &[CandidateEvaluation]) -> Option<(usize, f64)> {
    let mut best: Option<(usize, f64)> = None;
    for (index, evaluation) in evaluations.iter().enumerate() {
        if let Some(recall) = evaluation.recall() {
            if best.map_or(true, |(_, top)| recall > top) {
                best = Some((index, recall));
            }
        }
    }
    best
}

/// Single writer of the active-model pointer.
pub struct PromotionGovernor<R = StoreRegistry> {
    registry: R,
    pointers: PointerStore,
    min_recall: f64,
}

impl PromotionGovernor<StoreRegistry> {
    /// Governor over the configured pointer paths, loading artifacts from disk
    pub fn from_config(config: &GovernanceConfig) -> Self {
        Self::new(
            StoreRegistry::default(),
            PointerStore::from_config(config),
            config.min_recall,
        )
    }
}

impl<R: ModelRegistry> PromotionGovernor<R> {
    /// Governor with an explicit registry and pointer store
    pub fn new(registry: R, pointers: PointerStore, min_recall: f64) -> Self {
        Self {
            registry,
            pointers,
            min_recall,
        }
    }

    /// Pointer store this governor writes
    pub fn pointers(&self) -> &PointerStore {
        &self.pointers
    }

    /// Score every candidate on `held_out` and promote the best one if it
    /// clears the threshold.
    ///
    /// Missing or unreadable artifacts are skipped. Re-running with the same
    /// inputs after a promotion yields [`PromotionDecision::AlreadyActive`]
    /// and writes nothing.
    pub fn run(&self, candidates: &[CandidateModel], held_out: &Dataset) -> Result<PromotionReport> {
        let pointer_before = self.pointers.read()?;
        if held_out.risky_count() == 0 {
            warn!(
                rows = held_out.len(),
                "Held-out dataset has no RISKY rows; every recall is 0.0"
            );
        }

        let evaluations: Vec<CandidateEvaluation> = candidates
            .iter()
            .map(|candidate| CandidateEvaluation {
                candidate: candidate.clone(),
                status: self.evaluate(candidate, held_out),
            })
            .collect();

        let Some((index, recall)) = select_best(&evaluations) else {
            warn!(candidates = candidates.len(), "No candidate artifact available; nothing promoted");
            return Ok(PromotionReport {
                evaluations,
                decision: PromotionDecision::NoCandidates,
                pointer_after: pointer_before.clone(),
                pointer_before,
            });
        };
        let winner = &evaluations[index].candidate;

        let (decision, pointer_after) = if recall < self.min_recall {
            info!(
                candidate = %winner.name,
                recall,
                threshold = self.min_recall,
                "Best candidate is below the recall threshold; pointer unchanged"
            );
            (
                PromotionDecision::BelowThreshold {
                    candidate: winner.name.clone(),
                    recall,
                    threshold: self.min_recall,
                },
                pointer_before.clone(),
            )
        } else if pointer_before
            .as_ref()
            .is_some_and(|pointer| pointer.artifact == winner.path)
        {
            info!(candidate = %winner.name, recall, "Best candidate is already active");
            (
                PromotionDecision::AlreadyActive {
                    candidate: winner.name.clone(),
                    artifact: winner.path.clone(),
                    recall,
                },
                pointer_before.clone(),
            )
        } else {
            let pointer = self
                .pointers
                .promote(&winner.name, &winner.path, recall, self.min_recall)?;
            (
                PromotionDecision::Promoted {
                    candidate: winner.name.clone(),
                    artifact: winner.path.clone(),
                    recall,
                },
                Some(pointer),
            )
        };

        Ok(PromotionReport {
            evaluations,
            decision,
            pointer_before,
            pointer_after,
        })
    }

    fn evaluate(&self, candidate: &CandidateModel, held_out: &Dataset) -> CandidateStatus {
        let artifact = match self.registry.load(candidate) {
            Ok(Some(artifact)) => artifact,
            Ok(None) => {
                warn!(
                    candidate = %candidate.name,
                    path = %candidate.path.display(),
                    "Candidate artifact not found; skipping"
                );
                return CandidateStatus::Skipped {
                    reason: format!("artifact not found: {}", candidate.path.display()),
                };
            }
            Err(e) => {
                warn!(candidate = %candidate.name, error = %e, "Candidate artifact unreadable; skipping");
                return CandidateStatus::Skipped {
                    reason: e.to_string(),
                };
            }
        };

        let predicted = artifact.model.predict(&held_out.features(&artifact.schema));
        let recall = recall_risky(&held_out.labels(), &predicted);
        info!(candidate = %candidate.name, recall, "Evaluated candidate");
        CandidateStatus::Evaluated { recall }
    }
}

#[cfg(test)]
#[path = "governor_tests.rs"]
mod tests;
