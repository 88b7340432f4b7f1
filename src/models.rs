use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Processing phases of a report's generation run.
///
/// Forward order is `Processing < FetchingEnrichment < GeneratingAi <
/// Completed`; `Failed` is a side exit reachable from any non-terminal
/// phase. `Completed` and `Failed` are terminal.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Processing,
    FetchingEnrichment,
    GeneratingAi,
    Completed,
    Failed,
}

impl ReportStatus {
    /// Position along the forward chain.
    pub fn rank(self) -> u8 {
        match self {
            ReportStatus::Processing => 0,
            ReportStatus::FetchingEnrichment => 1,
            ReportStatus::GeneratingAi => 2,
            ReportStatus::Completed => 3,
            ReportStatus::Failed => 4,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ReportStatus::Completed | ReportStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ReportStatus::Processing => "processing",
            ReportStatus::FetchingEnrichment => "fetching_enrichment",
            ReportStatus::GeneratingAi => "generating_ai",
            ReportStatus::Completed => "completed",
            ReportStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Recognized report sections. Ord gives the stable order the generation
/// batch iterates in.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SectionKey {
    Overview,
    Company,
    News,
    Meeting,
    Outreach,
}

impl SectionKey {
    pub const ALL: [SectionKey; 5] = [
        SectionKey::Overview,
        SectionKey::Company,
        SectionKey::News,
        SectionKey::Meeting,
        SectionKey::Outreach,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SectionKey::Overview => "overview",
            SectionKey::Company => "company",
            SectionKey::News => "news",
            SectionKey::Meeting => "meeting",
            SectionKey::Outreach => "outreach",
        }
    }
}

/// A lead report and its generation state.
///
/// `error` is set iff `status == Failed`; `section_content` keys are always
/// a subset of `enabled_sections`. The generation pipeline is the only
/// writer of `status`/`error`/`enrichment`; content edits come through the
/// REST layer as whole-record updates.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Report {
    pub id: Uuid,
    pub project: String,
    /// Opaque lead data supplied at creation (name, company, notes, ...).
    pub lead: serde_json::Value,
    /// Structured enrichment payload, present once the fetch phase ran.
    #[serde(default)]
    pub enrichment: Option<serde_json::Value>,
    pub enabled_sections: Vec<SectionKey>,
    /// Section key -> generated artifact, only for sections that succeeded.
    #[serde(default)]
    pub section_content: BTreeMap<SectionKey, serde_json::Value>,
    pub status: ReportStatus,
    #[serde(default)]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Report {
    pub fn new(project: String, lead: serde_json::Value, enabled_sections: Vec<SectionKey>) -> Self {
        let now = Utc::now();
        Report {
            id: Uuid::new_v4(),
            project,
            lead,
            enrichment: None,
            enabled_sections,
            section_content: BTreeMap::new(),
            status: ReportStatus::Processing,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Roles the service recognizes. Anything else fails to decode, and a
/// request whose role cannot be decoded is denied before touching data.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    ProjectUser,
    Client,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    /// Meaningful for `ProjectUser`/`Client`; an `Admin` sees every project
    /// regardless of this field.
    #[serde(default)]
    pub assigned_projects: BTreeSet<String>,
}

/// Request-scoped identity derived from a credential, refreshed against the
/// stored User record where possible.
#[derive(Debug, Clone)]
pub struct Principal {
    pub user_id: Uuid,
    pub role: Role,
    pub assigned_projects: BTreeSet<String>,
}

impl Principal {
    pub fn from_user(user: &User) -> Self {
        Principal {
            user_id: user.id,
            role: user.role,
            assigned_projects: user.assigned_projects.clone(),
        }
    }
}

/// JWT claims carried by the bearer token.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Claims {
    pub sub: Uuid,
    pub role: Role,
    pub projects: BTreeSet<String>,
    pub exp: usize,
}

impl Claims {
    /// Fallback principal for when the stored User cannot be read.
    pub fn to_principal(&self) -> Principal {
        Principal {
            user_id: self.sub,
            role: self.role,
            assigned_projects: self.projects.clone(),
        }
    }
}

/// Status-only view of a report, the shape the polling surface returns.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct StatusView {
    pub status: ReportStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
