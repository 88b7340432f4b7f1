//! Client-side status polling.
//!
//! One polling campaign repeatedly queries a report's status surface at a
//! fixed interval until it observes a terminal state, then resolves to
//! exactly one outcome. Cancellation is an explicit watch channel owned by
//! the hosting context; once cancelled, no further polls are scheduled and
//! no terminal outcome is delivered. A transport or decode error during a
//! poll resolves the campaign as failed rather than retrying silently --
//! such errors are assumed persistent absent an explicit operator retry,
//! which starts a fresh campaign.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::debug;
use uuid::Uuid;

use crate::models::{Report, ReportStatus, StatusView};

#[derive(Debug, Error)]
pub enum PollError {
    #[error("status request failed: {0}")]
    Transport(String),
    #[error("report not found")]
    NotFound,
}

/// Remote status/record surface the poller talks to.
#[async_trait]
pub trait StatusClient: Send + Sync {
    async fn fetch_status(&self, report_id: Uuid) -> Result<StatusView, PollError>;
    async fn fetch_report(&self, report_id: Uuid) -> Result<Report, PollError>;
}

#[derive(Debug, Clone, Copy)]
pub struct PollConfig {
    pub interval: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
        }
    }
}

/// The single terminal resolution of one polling campaign.
#[derive(Debug)]
pub enum PollOutcome {
    /// Generation finished; carries the full record.
    Completed(Box<Report>),
    /// Generation failed, or the poll itself could not complete.
    Failed(String),
    /// The hosting context tore the campaign down before a terminal state.
    Cancelled,
}

/// Run one polling campaign to its single outcome.
///
/// `cancel` is a watch channel; setting it to `true` (or dropping the
/// sender) stops the campaign at the next suspension point.
pub async fn poll_until_terminal(
    client: &dyn StatusClient,
    report_id: Uuid,
    config: PollConfig,
    mut cancel: watch::Receiver<bool>,
) -> PollOutcome {
    loop {
        if *cancel.borrow() {
            return PollOutcome::Cancelled;
        }

        let view = match client.fetch_status(report_id).await {
            Ok(view) => view,
            // Poll errors surface as failure, same as a failed run
            Err(e) => return PollOutcome::Failed(e.to_string()),
        };
        debug!(report_id = %report_id, status = view.status.as_str(), "poll");

        match view.status {
            ReportStatus::Completed => {
                return match client.fetch_report(report_id).await {
                    Ok(report) => PollOutcome::Completed(Box::new(report)),
                    Err(e) => PollOutcome::Failed(e.to_string()),
                };
            }
            ReportStatus::Failed => {
                return PollOutcome::Failed(
                    view.error
                        .unwrap_or_else(|| "report generation failed".to_string()),
                );
            }
            _ => {}
        }

        tokio::select! {
            _ = sleep(config.interval) => {}
            changed = cancel.changed() => {
                match changed {
                    // Sender dropped: hosting context is gone
                    Err(_) => return PollOutcome::Cancelled,
                    Ok(()) if *cancel.borrow() => return PollOutcome::Cancelled,
                    Ok(()) => {}
                }
            }
        }
    }
}
