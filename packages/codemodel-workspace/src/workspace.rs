//! The workspace: owner of the current snapshot.
//!
//! Exactly one snapshot is current at a time. Snapshots are immutable
//! once published, so atomic replacement reduces to swapping a single
//! reference under the writer lock; in-flight readers keep the
//! snapshot they already hold.

use crate::dependency_graph::DependencyGraph;
use crate::error::{Result, WorkspaceError};
use codemodel_core::{
    DocumentId, ProjectEntry, ProjectId, ProjectState, Solution, SolutionDiff,
};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info};

pub struct Workspace {
    current: RwLock<Solution>,
    // Open-consumer tracking: pinned projects are exempt from
    // eviction back to the deferred state.
    pins: DashMap<ProjectId, usize>,
    open_documents: DashMap<DocumentId, ProjectId>,
}

impl Workspace {
    pub fn new(initial: Solution) -> Self {
        info!(solution = %initial.id(), projects = initial.len(), "workspace initialized");
        Self {
            current: RwLock::new(initial),
            pins: DashMap::new(),
            open_documents: DashMap::new(),
        }
    }

    /// The current snapshot. Cheap: persistent value, shared sub-trees.
    pub fn current_snapshot(&self) -> Solution {
        self.current.read().clone()
    }

    /// Atomically replace the current snapshot, returning the diff
    /// against the previous one. Rejects snapshots of another lineage.
    pub fn apply_snapshot(&self, new: Solution) -> Result<SolutionDiff> {
        let mut current = self.current.write();
        let diff = SolutionDiff::between(current.clone(), new.clone())?;
        *current = new;
        drop(current);

        let summary = diff.summary();
        info!(
            added = summary.added.len(),
            removed = summary.removed.len(),
            changed = summary.changed.len(),
            "snapshot applied"
        );
        Ok(diff)
    }

    /// Resident state only; never loads, never suspends.
    pub fn try_get_project(&self, id: &ProjectId) -> Option<Arc<ProjectState>> {
        self.current.read().try_get_project(id)
    }

    /// The project's state, materializing a deferred entry on demand.
    ///
    /// On materialization the current snapshot's entry is swapped for
    /// the resolved state, so later accesses bypass the lazy cell. If
    /// the current snapshot moved on while the load was in flight, the
    /// swap is skipped — the result is still returned to this caller.
    pub async fn get_project(&self, id: &ProjectId) -> Result<Option<Arc<ProjectState>>> {
        let snapshot = self.current_snapshot();
        let entry = match snapshot.entry(id) {
            None => return Ok(None),
            Some(entry) => entry.clone(),
        };

        match entry {
            ProjectEntry::Materialized(state) => Ok(Some(state)),
            ProjectEntry::Deferred(cell) => {
                let state = cell.resolve().await.map_err(WorkspaceError::Load)?;
                debug!(project = %id, "materialized deferred project");

                let mut current = self.current.write();
                let still_same = matches!(
                    current.entry(id),
                    Some(ProjectEntry::Deferred(live)) if Arc::ptr_eq(live, &cell)
                );
                if still_same {
                    let next = current
                        .with_project_entry(id, ProjectEntry::Materialized(state.clone()));
                    *current = next;
                }
                Ok(Some(state))
            }
        }
    }

    pub fn get_project_blocking(&self, id: &ProjectId) -> Result<Option<Arc<ProjectState>>> {
        futures::executor::block_on(self.get_project(id))
    }

    pub fn all_project_ids(&self) -> Vec<ProjectId> {
        self.current.read().project_ids().cloned().collect()
    }

    pub fn referenced_project_ids(&self, id: &ProjectId) -> Vec<ProjectId> {
        self.current.read().referenced_ids(id).unwrap_or_default()
    }

    pub fn referencing_project_ids(&self, id: &ProjectId) -> Vec<ProjectId> {
        self.dependency_graph().referencing_ids(id).to_vec()
    }

    /// Reference graph over currently-known ids. Never forces a load.
    pub fn dependency_graph(&self) -> DependencyGraph {
        DependencyGraph::from_snapshot(&self.current.read())
    }

    /// Warm a dependency set before a bulk operation: force
    /// materialization of every listed project. Fails on the first
    /// unknown id or load error.
    pub async fn ensure_projects_available(&self, ids: &[ProjectId]) -> Result<()> {
        for id in ids {
            if self.get_project(id).await?.is_none() {
                return Err(WorkspaceError::ProjectNotFound(id.clone()));
            }
        }
        Ok(())
    }

    /// Evict materialized projects with no open consumers back to the
    /// deferred state, if they were originally deferred. Returns the
    /// evicted ids. This is the one place the model un-materializes.
    pub fn remove_unnecessary_projects(&self) -> Vec<ProjectId> {
        let mut current = self.current.write();
        let ids: Vec<ProjectId> = current.project_ids().cloned().collect();
        let mut evicted = Vec::new();

        for id in ids {
            if self.pin_count(&id) > 0 {
                continue;
            }
            let resolved = current
                .entry(&id)
                .map(ProjectEntry::is_resolved)
                .unwrap_or(false);
            if !resolved {
                continue;
            }
            if let Some(entry) = current.redeferred_entry(&id) {
                let next = current.with_project_entry(&id, entry);
                *current = next;
                evicted.push(id);
            }
        }
        drop(current);

        if !evicted.is_empty() {
            info!(count = evicted.len(), "returned unpinned projects to deferred state");
        }
        evicted
    }

    pub fn pin_project(&self, id: &ProjectId) {
        *self.pins.entry(id.clone()).or_insert(0) += 1;
    }

    pub fn unpin_project(&self, id: &ProjectId) {
        if let Some(mut count) = self.pins.get_mut(id) {
            *count = count.saturating_sub(1);
        }
        self.pins.remove_if(id, |_, count| *count == 0);
    }

    pub fn pin_count(&self, id: &ProjectId) -> usize {
        self.pins.get(id).map(|count| *count).unwrap_or(0)
    }

    /// Track an opened document; pins its project. Returns false if
    /// the document was already open.
    pub fn open_document(&self, project: &ProjectId, document: &DocumentId) -> bool {
        if self.open_documents.contains_key(document) {
            return false;
        }
        self.open_documents.insert(document.clone(), project.clone());
        self.pin_project(project);
        true
    }

    /// Returns false if the document was not open.
    pub fn close_document(&self, document: &DocumentId) -> bool {
        match self.open_documents.remove(document) {
            Some((_, project)) => {
                self.unpin_project(&project);
                true
            }
            None => false,
        }
    }

    pub fn open_document_count(&self) -> usize {
        self.open_documents.len()
    }
}

impl std::fmt::Debug for Workspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workspace")
            .field("current", &*self.current.read())
            .field("pinned", &self.pins.len())
            .field("open_documents", &self.open_documents.len())
            .finish()
    }
}
