//! Differencing between two snapshots of the same solution.
//!
//! Added and removed sets are plain identity-set differences. Changed
//! detection is identity-based: an entry counts as changed only when
//! the stored object differs AND at least one side is resolved, so
//! deciding "did anything change" never forces a deferred load. Change
//! detection among still-deferred pairs is deferred until one of them
//! materializes (the conservative default; see [`DiffPolicy`]).

use crate::error::{Result, SnapshotError};
use crate::ids::ProjectId;
use crate::snapshot::{ProjectEntry, Solution};
use serde::Serialize;
use std::sync::Arc;

/// What to report for two unresolved deferred entries with different
/// lazy-value identities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DiffPolicy {
    /// Not a change until one side resolves.
    #[default]
    DeferUnresolved,
    /// Any identity difference is a change.
    ReportUnresolvedPairs,
}

/// Lazy view of what changed between two snapshots of one lineage.
///
/// The iterators are restartable: each call walks the underlying
/// persistent tables afresh, in the new snapshot's project order
/// (old order for removals).
#[derive(Debug, Clone)]
pub struct SolutionDiff {
    old: Solution,
    new: Solution,
    policy: DiffPolicy,
}

impl SolutionDiff {
    pub fn between(old: Solution, new: Solution) -> Result<Self> {
        if old.id() != new.id() {
            return Err(SnapshotError::LineageMismatch {
                old: old.id().clone(),
                new: new.id().clone(),
            });
        }
        Ok(Self {
            old,
            new,
            policy: DiffPolicy::default(),
        })
    }

    pub fn with_policy(mut self, policy: DiffPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn old_snapshot(&self) -> &Solution {
        &self.old
    }

    pub fn new_snapshot(&self) -> &Solution {
        &self.new
    }

    /// Ids present in new, absent in old.
    pub fn added(&self) -> impl Iterator<Item = &ProjectId> + '_ {
        self.new
            .project_ids()
            .filter(|id| !self.old.contains_project(id))
    }

    /// Ids present in old, absent in new.
    pub fn removed(&self) -> impl Iterator<Item = &ProjectId> + '_ {
        self.old
            .project_ids()
            .filter(|id| !self.new.contains_project(id))
    }

    /// Ids present in both whose stored state differs.
    pub fn changed(&self) -> impl Iterator<Item = &ProjectId> + '_ {
        self.new.project_ids().filter(|id| {
            match (self.old.entry(id), self.new.entry(id)) {
                (Some(old_entry), Some(new_entry)) => {
                    entry_changed(old_entry, new_entry, self.policy)
                }
                _ => false,
            }
        })
    }

    pub fn is_empty(&self) -> bool {
        self.added().next().is_none()
            && self.removed().next().is_none()
            && self.changed().next().is_none()
    }

    /// Eager, serializable summary for logging or host handoff.
    pub fn summary(&self) -> DiffSummary {
        DiffSummary {
            added: self.added().cloned().collect(),
            removed: self.removed().cloned().collect(),
            changed: self.changed().cloned().collect(),
        }
    }
}

fn entry_changed(old: &ProjectEntry, new: &ProjectEntry, policy: DiffPolicy) -> bool {
    if old.same_identity(new) {
        return false;
    }
    // A deferred entry swapped for the state it resolved to differs in
    // representation only; both sides hold the same stored object.
    if let (Some(old_state), Some(new_state)) = (old.try_state(), new.try_state()) {
        if Arc::ptr_eq(&old_state, &new_state) {
            return false;
        }
    }
    match policy {
        DiffPolicy::DeferUnresolved => old.is_resolved() || new.is_resolved(),
        DiffPolicy::ReportUnresolvedPairs => true,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DiffSummary {
    pub added: Vec<ProjectId>,
    pub removed: Vec<ProjectId>,
    pub changed: Vec<ProjectId>,
}
