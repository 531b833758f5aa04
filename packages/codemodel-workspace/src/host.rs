//! Host push protocol: replaying snapshot changes to an external host
//! in dependency order.
//!
//! A project is never announced before the projects it references, and
//! already-pushed projects are skipped, so hosts see each addition at
//! most once even when push sets overlap.

use crate::error::{Result, WorkspaceError};
use crate::workspace::Workspace;
use codemodel_core::{
    DocumentId, ProjectId, ProjectReference, ProjectState, Solution, SolutionDiff,
};
use dashmap::DashSet;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Callbacks consumed by the external host. All default to no-ops so
/// hosts implement only what they care about.
pub trait WorkspaceHost: Send + Sync {
    fn on_solution_added(&self, _solution: &Solution) {}
    fn on_project_added(&self, _project: &ProjectState) {}
    fn on_project_removed(&self, _id: &ProjectId) {}
    fn on_project_reference_added(&self, _id: &ProjectId, _reference: &ProjectReference) {}
    fn on_project_reference_removed(&self, _id: &ProjectId, _reference: &ProjectReference) {}
    fn on_document_added(&self, _project: &ProjectId, _document: &DocumentId) {}
    fn on_document_removed(&self, _project: &ProjectId, _document: &DocumentId) {}
    fn on_document_opened(&self, _project: &ProjectId, _document: &DocumentId) {}
    fn on_document_closed(&self, _project: &ProjectId, _document: &DocumentId) {}
}

/// Tracks what the host has already seen and replays changes to it.
pub struct HostSync {
    host: Arc<dyn WorkspaceHost>,
    pushed: DashSet<ProjectId>,
    solution_pushed: AtomicBool,
}

impl HostSync {
    pub fn new(host: Arc<dyn WorkspaceHost>) -> Self {
        Self {
            host,
            pushed: DashSet::new(),
            solution_pushed: AtomicBool::new(false),
        }
    }

    pub fn is_pushed(&self, id: &ProjectId) -> bool {
        self.pushed.contains(id)
    }

    /// Announce the solution itself, once.
    pub fn push_solution(&self, workspace: &Workspace) {
        if !self.solution_pushed.swap(true, Ordering::SeqCst) {
            let snapshot = workspace.current_snapshot();
            info!(solution = %snapshot.id(), "pushing solution to host");
            self.host.on_solution_added(&snapshot);
        }
    }

    /// Push `ids` and everything they reference, referenced projects
    /// first. Materializes each project as it is announced. Returns
    /// the ids actually pushed, in announcement order.
    pub async fn push_projects(
        &self,
        workspace: &Workspace,
        ids: &[ProjectId],
    ) -> Result<Vec<ProjectId>> {
        let graph = workspace.dependency_graph();

        // Reference closure of the requested set, restricted to known ids.
        let mut closure = Vec::new();
        let mut seen = HashSet::new();
        let mut pending: Vec<ProjectId> = ids.to_vec();
        while let Some(id) = pending.pop() {
            if !graph.contains(&id) || !seen.insert(id.clone()) {
                continue;
            }
            for target in graph.referenced_ids(&id) {
                pending.push(target.clone());
            }
            closure.push(id);
        }

        let mut pushed_now = Vec::new();
        for id in graph.topological_order(&closure) {
            if self.pushed.contains(&id) {
                continue;
            }
            let state = workspace
                .get_project(&id)
                .await?
                .ok_or_else(|| WorkspaceError::ProjectNotFound(id.clone()))?;
            self.host.on_project_added(&state);
            self.pushed.insert(id.clone());
            debug!(project = %id, "pushed project to host");
            pushed_now.push(id);
        }
        Ok(pushed_now)
    }

    /// Replay a snapshot diff: removals first, then additions in
    /// dependency order, then reference and document deltas for
    /// changed projects the host already knows.
    pub async fn replay_diff(&self, workspace: &Workspace, diff: &SolutionDiff) -> Result<()> {
        for id in diff.removed() {
            if self.pushed.remove(id).is_some() {
                self.host.on_project_removed(id);
            }
        }

        let added: Vec<ProjectId> = diff.added().cloned().collect();
        if !added.is_empty() {
            self.push_projects(workspace, &added).await?;
        }

        for id in diff.changed() {
            if !self.pushed.contains(id) {
                continue;
            }
            // Deltas need both sides resident; a changed-but-unresolved
            // side is replayed when it materializes.
            let (Some(old_state), Some(new_state)) = (
                diff.old_snapshot().try_get_project(id),
                diff.new_snapshot().try_get_project(id),
            ) else {
                continue;
            };
            self.replay_project_delta(id, &old_state, &new_state);
        }
        Ok(())
    }

    fn replay_project_delta(&self, id: &ProjectId, old: &ProjectState, new: &ProjectState) {
        let old_refs: HashSet<&ProjectReference> = old.references().iter().collect();
        let new_refs: HashSet<&ProjectReference> = new.references().iter().collect();
        for reference in new.references() {
            if !old_refs.contains(reference) {
                self.host.on_project_reference_added(id, reference);
            }
        }
        for reference in old.references() {
            if !new_refs.contains(reference) {
                self.host.on_project_reference_removed(id, reference);
            }
        }

        let old_docs: HashSet<&DocumentId> = old.documents().iter().map(|d| d.id()).collect();
        let new_docs: HashSet<&DocumentId> = new.documents().iter().map(|d| d.id()).collect();
        for document in new.documents() {
            if !old_docs.contains(document.id()) {
                self.host.on_document_added(id, document.id());
            }
        }
        for document in old.documents() {
            if !new_docs.contains(document.id()) {
                self.host.on_document_removed(id, document.id());
            }
        }
    }

    /// Forward an open to the host, tracking the pin in the workspace.
    pub fn document_opened(
        &self,
        workspace: &Workspace,
        project: &ProjectId,
        document: &DocumentId,
    ) {
        if workspace.open_document(project, document) {
            self.host.on_document_opened(project, document);
        }
    }

    pub fn document_closed(
        &self,
        workspace: &Workspace,
        project: &ProjectId,
        document: &DocumentId,
    ) {
        if workspace.close_document(document) {
            self.host.on_document_closed(project, document);
        }
    }
}

impl std::fmt::Debug for HostSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostSync")
            .field("pushed", &self.pushed.len())
            .field("solution_pushed", &self.solution_pushed.load(Ordering::SeqCst))
            .finish()
    }
}
