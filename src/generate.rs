//! Sequential per-section AI content generation.
//!
//! One batch run walks the enabled sections in stable order and calls the
//! generation provider once per section. A section failure is recorded as a
//! typed `Skipped` outcome and the batch keeps going; only a fatal provider
//! error aborts the batch, and even then the partial content gathered so far
//! travels with the error. Sequential on purpose: it bounds concurrent load
//! on the provider and keeps progress readable.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::SectionKey;

/// Error from one per-section generation call. `Provider` failures skip the
/// section; `Fatal` (e.g. malformed lead input) aborts the whole batch.
#[derive(Debug, Error)]
pub enum SectionError {
    #[error("section generation failed: {0}")]
    Provider(String),
    #[error("unrecoverable generation error: {0}")]
    Fatal(String),
}

/// External per-section generation call.
#[async_trait]
pub trait SectionGenerator: Send + Sync {
    async fn generate_section(
        &self,
        key: SectionKey,
        lead: &Value,
        enrichment: &Value,
    ) -> Result<Value, SectionError>;
}

/// What happened to one section in a batch.
#[derive(Debug, Clone)]
pub enum SectionOutcome {
    Generated(Value),
    Skipped(String),
}

/// Progress after each attempted section, monotonically non-decreasing;
/// reaches 100% once every enabled section was attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub attempted: usize,
    pub total: usize,
}

impl Progress {
    pub fn percent(self) -> u32 {
        if self.total == 0 {
            return 100;
        }
        (self.attempted * 100 / self.total) as u32
    }
}

/// Aggregated result of one batch run.
#[derive(Debug, Default)]
pub struct BatchResult {
    pub outcomes: BTreeMap<SectionKey, SectionOutcome>,
}

impl BatchResult {
    /// Artifacts of the sections that succeeded, keyed for a single merge
    /// into the report record.
    pub fn content(&self) -> BTreeMap<SectionKey, Value> {
        self.outcomes
            .iter()
            .filter_map(|(k, o)| match o {
                SectionOutcome::Generated(v) => Some((*k, v.clone())),
                SectionOutcome::Skipped(_) => None,
            })
            .collect()
    }

    pub fn generated_count(&self) -> usize {
        self.outcomes
            .values()
            .filter(|o| matches!(o, SectionOutcome::Generated(_)))
            .count()
    }

    pub fn skipped(&self) -> Vec<(SectionKey, &str)> {
        self.outcomes
            .iter()
            .filter_map(|(k, o)| match o {
                SectionOutcome::Skipped(reason) => Some((*k, reason.as_str())),
                SectionOutcome::Generated(_) => None,
            })
            .collect()
    }
}

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("no sections enabled for generation")]
    NoSectionsEnabled,
    #[error("generation batch aborted: {reason}")]
    BatchAborted {
        reason: String,
        /// Content of sections that had already succeeded.
        partial: BTreeMap<SectionKey, Value>,
    },
}

/// Run one generation batch over `sections`, sequentially, calling
/// `on_progress` after every attempt.
///
/// Returns the outcome of every attempted section; the caller merges
/// `result.content()` into the report in one write. An empty `sections` set
/// fails fast with `NoSectionsEnabled` before any provider call.
pub async fn run_sections(
    generator: &dyn SectionGenerator,
    sections: &[SectionKey],
    lead: &Value,
    enrichment: &Value,
    mut on_progress: impl FnMut(Progress) + Send,
) -> Result<BatchResult, OrchestratorError> {
    // Stable order, duplicates collapsed
    let enabled: BTreeSet<SectionKey> = sections.iter().copied().collect();
    if enabled.is_empty() {
        return Err(OrchestratorError::NoSectionsEnabled);
    }

    let total = enabled.len();
    let mut result = BatchResult::default();

    for (attempted, key) in enabled.into_iter().enumerate() {
        match generator.generate_section(key, lead, enrichment).await {
            Ok(artifact) => {
                debug!(section = key.as_str(), "section generated");
                result.outcomes.insert(key, SectionOutcome::Generated(artifact));
            }
            Err(SectionError::Provider(reason)) => {
                warn!(section = key.as_str(), %reason, "section skipped");
                result.outcomes.insert(key, SectionOutcome::Skipped(reason));
            }
            Err(SectionError::Fatal(reason)) => {
                return Err(OrchestratorError::BatchAborted {
                    reason,
                    partial: result.content(),
                });
            }
        }
        on_progress(Progress {
            attempted: attempted + 1,
            total,
        });
    }

    Ok(result)
}
