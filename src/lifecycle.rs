//! Report lifecycle state machine.
//!
//! Status moves strictly forward along `processing -> fetching_enrichment ->
//! generating_ai -> completed`, with `failed` reachable from any non-terminal
//! state via `fail` only. Terminal states never transition again; a
//! regenerate starts a new run by resetting the record, not by advancing it.

use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

use crate::models::{ReportStatus, StatusView};
use crate::storage::{Storage, StorageError};

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition {
        from: ReportStatus,
        to: ReportStatus,
    },
    #[error("report not found")]
    NotFound,
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// True if `advance` may move a report from `from` to `to`.
///
/// Any strictly forward position on the chain is reachable; same-state,
/// backward, and anything out of a terminal state are not. `failed` is never
/// an advance target.
pub fn can_advance(from: ReportStatus, to: ReportStatus) -> bool {
    if from.is_terminal() || to == ReportStatus::Failed {
        return false;
    }
    to.rank() > from.rank()
}

/// Owns status transitions for stored reports. The generation pipeline is
/// the only caller of `advance`/`fail`; the polling surface calls `read`.
#[derive(Clone)]
pub struct LifecycleTracker {
    storage: Arc<Storage>,
}

impl LifecycleTracker {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    /// Move a report forward to `next`. Rejects unreachable targets with
    /// `InvalidTransition`; callers treat that as an internal invariant
    /// break, not a user error.
    pub fn advance(&self, report_id: &Uuid, next: ReportStatus) -> Result<(), LifecycleError> {
        let mut report = self
            .storage
            .get_report(report_id)?
            .ok_or(LifecycleError::NotFound)?;

        if !can_advance(report.status, next) {
            return Err(LifecycleError::InvalidTransition {
                from: report.status,
                to: next,
            });
        }

        report.status = next;
        report.error = None;
        self.storage.update_report(report)?;
        Ok(())
    }

    /// Terminate the run as failed, recording the message. Valid from any
    /// non-terminal state.
    pub fn fail(&self, report_id: &Uuid, message: &str) -> Result<(), LifecycleError> {
        let mut report = self
            .storage
            .get_report(report_id)?
            .ok_or(LifecycleError::NotFound)?;

        if report.status.is_terminal() {
            return Err(LifecycleError::InvalidTransition {
                from: report.status,
                to: ReportStatus::Failed,
            });
        }

        report.status = ReportStatus::Failed;
        report.error = Some(message.to_string());
        self.storage.update_report(report)?;
        Ok(())
    }

    /// Status-only view; full content is served elsewhere, behind access
    /// control and the completed gate.
    pub fn read(&self, report_id: &Uuid) -> Result<StatusView, LifecycleError> {
        let report = self
            .storage
            .get_report(report_id)?
            .ok_or(LifecycleError::NotFound)?;
        Ok(StatusView {
            status: report.status,
            error: report.error,
        })
    }
}
