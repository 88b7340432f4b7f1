//! Background generation pipeline.
//!
//! One spawned task per lifecycle run. The task is the single authoritative
//! writer of the report's status and generated content for that run: it
//! advances `processing -> fetching_enrichment -> generating_ai ->
//! completed`, or fails the run with the underlying message. Section
//! content lands in one record write after the whole batch finishes.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::generate::{run_sections, OrchestratorError, SectionGenerator};
use crate::lifecycle::{LifecycleError, LifecycleTracker};
use crate::models::{ReportStatus, SectionKey};
use crate::storage::Storage;

/// External enrichment lookup (news/company data), consumed as an opaque
/// call that either returns structured data or fails.
#[async_trait]
pub trait EnrichmentSource: Send + Sync {
    async fn fetch(&self, lead: &Value) -> Result<Value, EnrichmentError>;
}

#[derive(Debug, Error)]
#[error("enrichment fetch failed: {0}")]
pub struct EnrichmentError(pub String);

/// Drives lifecycle runs. Cheap to clone behind the Arcs; the REST layer
/// holds one and spawns a task per created/regenerated report.
#[derive(Clone)]
pub struct Pipeline {
    storage: Arc<Storage>,
    tracker: LifecycleTracker,
    generator: Arc<dyn SectionGenerator>,
    enrichment: Arc<dyn EnrichmentSource>,
}

impl Pipeline {
    pub fn new(
        storage: Arc<Storage>,
        generator: Arc<dyn SectionGenerator>,
        enrichment: Arc<dyn EnrichmentSource>,
    ) -> Self {
        let tracker = LifecycleTracker::new(storage.clone());
        Self {
            storage,
            tracker,
            generator,
            enrichment,
        }
    }

    /// Kick off one lifecycle run in the background.
    pub fn spawn_run(&self, report_id: Uuid) {
        let pipeline = self.clone();
        tokio::spawn(async move {
            pipeline.run(report_id).await;
        });
    }

    /// Execute one lifecycle run to its terminal state. Lifecycle or storage
    /// errors here are invariant breaks (a concurrent writer, a vanished
    /// record); they abandon the run and go to the log, not to a user.
    pub async fn run(&self, report_id: Uuid) {
        if let Err(e) = self.run_inner(report_id).await {
            error!(report_id = %report_id, error = %e, "lifecycle run abandoned");
        }
    }

    async fn run_inner(&self, report_id: Uuid) -> Result<(), LifecycleError> {
        let report = self
            .storage
            .get_report(&report_id)?
            .ok_or(LifecycleError::NotFound)?;
        let lead = report.lead.clone();
        let enabled = report.enabled_sections.clone();

        // Phase 1: enrichment
        self.tracker.advance(&report_id, ReportStatus::FetchingEnrichment)?;
        let enrichment = match self.enrichment.fetch(&lead).await {
            Ok(data) => data,
            Err(e) => {
                self.tracker.fail(&report_id, &e.to_string())?;
                return Ok(());
            }
        };
        let mut record = self
            .storage
            .get_report(&report_id)?
            .ok_or(LifecycleError::NotFound)?;
        record.enrichment = Some(enrichment.clone());
        self.storage.update_report(record)?;

        // Phase 2: section generation
        self.tracker.advance(&report_id, ReportStatus::GeneratingAi)?;
        let batch = run_sections(self.generator.as_ref(), &enabled, &lead, &enrichment, |p| {
            debug!(report_id = %report_id, attempted = p.attempted, total = p.total, percent = p.percent(), "generation progress");
        })
        .await;

        match batch {
            Ok(result) => {
                self.merge_content(&report_id, result.content())?;
                self.tracker.advance(&report_id, ReportStatus::Completed)?;
                info!(
                    report_id = %report_id,
                    generated = result.generated_count(),
                    skipped = result.skipped().len(),
                    "report generation completed"
                );
            }
            Err(OrchestratorError::NoSectionsEnabled) => {
                self.tracker
                    .fail(&report_id, "no sections enabled for generation")?;
            }
            Err(OrchestratorError::BatchAborted { reason, partial }) => {
                // Keep what was generated before the abort, then fail the run
                self.merge_content(&report_id, partial)?;
                self.tracker.fail(&report_id, &reason)?;
            }
        }

        Ok(())
    }

    /// Merge generated artifacts into the record with a single write.
    fn merge_content(
        &self,
        report_id: &Uuid,
        content: BTreeMap<SectionKey, Value>,
    ) -> Result<(), LifecycleError> {
        if content.is_empty() {
            return Ok(());
        }
        let mut record = self
            .storage
            .get_report(report_id)?
            .ok_or(LifecycleError::NotFound)?;
        record.section_content.extend(content);
        self.storage.update_report(record)?;
        Ok(())
    }
}
