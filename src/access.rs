//! Project-scoped access control.
//!
//! Every data path calls through here instead of branching on role at the
//! call site. The decision itself is a pure function of (role, assigned
//! projects, target project); `resolve_principal` supplies the freshness
//! rule that privileged checks need.

use std::sync::Arc;

use tracing::warn;

use crate::models::{Claims, Principal, Role};
use crate::storage::Storage;

/// Whether `principal` may see or mutate data in `project`.
///
/// Admins pass unconditionally. Project users and clients pass only for a
/// non-empty project they are assigned to, so a report left in an empty or
/// "Unassigned" project is admin-only.
pub fn can_access(principal: &Principal, project: &str) -> bool {
    match principal.role {
        Role::Admin => true,
        Role::ProjectUser | Role::Client => {
            !project.is_empty() && principal.assigned_projects.contains(project)
        }
    }
}

/// Subset of `all_projects` the principal may see, in input order.
/// Computes visible project lists without a per-item decision round trip.
pub fn filter_accessible_projects<'a>(
    principal: &Principal,
    all_projects: &'a [String],
) -> Vec<&'a String> {
    all_projects
        .iter()
        .filter(|p| can_access(principal, p))
        .collect()
}

/// Build the principal for a request, preferring the stored User record
/// over the token's embedded claims.
///
/// A token outlives role/project edits made by an admin, so the persisted
/// record is authoritative. The claims are used only when storage itself
/// errs; a missing record (user deleted since the token was issued) yields
/// no principal at all.
pub fn resolve_principal(storage: &Arc<Storage>, claims: &Claims) -> Option<Principal> {
    match storage.get_user(&claims.sub) {
        Ok(Some(user)) => Some(Principal::from_user(&user)),
        Ok(None) => None,
        Err(e) => {
            warn!(user_id = %claims.sub, error = %e, "principal lookup failed, falling back to token claims");
            Some(claims.to_principal())
        }
    }
}
