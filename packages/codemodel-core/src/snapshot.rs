//! The persistent solution snapshot.
//!
//! A `Solution` is an immutable point-in-time view of the whole
//! codebase: a table from project identity to either fully materialized
//! state or a deferred entry bound to a loader. Every mutation returns
//! a new snapshot sharing untouched entries with the input, so history
//! stays valid and diffing stays cheap.

use crate::error::{LoadError, Result, SnapshotError};
use crate::ids::{DocumentId, ProjectId, SolutionId, VersionStamp};
use crate::lazy::AsyncLazy;
use crate::loader::ProjectLoader;
use crate::project::{DeferredProjectDescriptor, ProjectReference, ProjectState};
use futures::FutureExt;
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// One slot in the project table: loaded state, or a memoized cell
/// that will produce it on first observation.
#[derive(Clone)]
pub enum ProjectEntry {
    Materialized(Arc<ProjectState>),
    Deferred(Arc<AsyncLazy<Arc<ProjectState>>>),
}

impl ProjectEntry {
    pub fn is_materialized(&self) -> bool {
        matches!(self, ProjectEntry::Materialized(_))
    }

    /// The state if resident (materialized, or deferred-and-resolved).
    /// Never forces a load.
    pub fn try_state(&self) -> Option<Arc<ProjectState>> {
        match self {
            ProjectEntry::Materialized(state) => Some(state.clone()),
            ProjectEntry::Deferred(cell) => cell.try_peek(),
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.try_state().is_some()
    }

    /// Identity comparison used by diffing: same stored object, not
    /// equal contents. Lets "nothing changed" be decided without
    /// forcing any computation.
    pub fn same_identity(&self, other: &ProjectEntry) -> bool {
        match (self, other) {
            (ProjectEntry::Materialized(a), ProjectEntry::Materialized(b)) => Arc::ptr_eq(a, b),
            (ProjectEntry::Deferred(a), ProjectEntry::Deferred(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for ProjectEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProjectEntry::Materialized(state) => write!(f, "Materialized({})", state.id()),
            ProjectEntry::Deferred(cell) if cell.is_resolved() => write!(f, "Deferred(resolved)"),
            ProjectEntry::Deferred(_) => write!(f, "Deferred(pending)"),
        }
    }
}

/// Immutable snapshot of a solution.
#[derive(Clone)]
pub struct Solution {
    id: SolutionId,
    version: VersionStamp,
    file_path: Option<PathBuf>,
    table: im::HashMap<ProjectId, ProjectEntry>,
    order: im::Vector<ProjectId>,
    // Descriptors declared at create time, retained across
    // materialization so projects can be returned to the deferred
    // state and so references are known without forcing a load.
    deferred: im::HashMap<ProjectId, Arc<DeferredProjectDescriptor>>,
    loader: Option<Arc<dyn ProjectLoader>>,
}

impl Solution {
    /// Build the initial snapshot.
    ///
    /// Every reference declared by `projects` or `deferred` must point
    /// at a project present in one of the two collections; anything
    /// else is rejected with `DanglingReference`. Insertion order is
    /// `projects` then `deferred`, and is preserved by all derived
    /// snapshots until a project is removed.
    pub fn create(
        id: SolutionId,
        version: VersionStamp,
        file_path: Option<PathBuf>,
        projects: Vec<ProjectState>,
        deferred: Vec<DeferredProjectDescriptor>,
        loader: Option<Arc<dyn ProjectLoader>>,
    ) -> Result<Self> {
        if !deferred.is_empty() && loader.is_none() {
            return Err(SnapshotError::LoaderRequired);
        }

        let mut known = HashSet::new();
        for project in &projects {
            if !known.insert(project.id().clone()) {
                return Err(SnapshotError::DuplicateProject(project.id().clone()));
            }
        }
        for descriptor in &deferred {
            if !known.insert(descriptor.id.clone()) {
                return Err(SnapshotError::DuplicateProject(descriptor.id.clone()));
            }
        }

        for project in &projects {
            for target in project.referenced_ids() {
                if !known.contains(target) {
                    return Err(SnapshotError::DanglingReference {
                        from: project.id().clone(),
                        to: target.clone(),
                    });
                }
            }
        }
        for descriptor in &deferred {
            for target in &descriptor.referenced_project_ids {
                if !known.contains(target) {
                    return Err(SnapshotError::DanglingReference {
                        from: descriptor.id.clone(),
                        to: target.clone(),
                    });
                }
            }
        }

        let mut table = im::HashMap::new();
        let mut order = im::Vector::new();
        let mut deferred_map = im::HashMap::new();

        for project in projects {
            let project_id = project.id().clone();
            table.insert(project_id.clone(), ProjectEntry::Materialized(Arc::new(project)));
            order.push_back(project_id);
        }
        for descriptor in deferred {
            let Some(loader) = loader.as_ref() else {
                return Err(SnapshotError::LoaderRequired);
            };
            let project_id = descriptor.id.clone();
            let cell = deferred_cell(Arc::clone(loader), project_id.clone());
            table.insert(project_id.clone(), ProjectEntry::Deferred(cell));
            deferred_map.insert(project_id.clone(), Arc::new(descriptor));
            order.push_back(project_id);
        }

        Ok(Self {
            id,
            version,
            file_path,
            table,
            order,
            deferred: deferred_map,
            loader,
        })
    }

    pub fn id(&self) -> &SolutionId {
        &self.id
    }

    pub fn version(&self) -> VersionStamp {
        self.version
    }

    pub fn file_path(&self) -> Option<&PathBuf> {
        self.file_path.as_ref()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains_project(&self, id: &ProjectId) -> bool {
        self.table.contains_key(id)
    }

    /// Project ids in insertion order.
    pub fn project_ids(&self) -> impl Iterator<Item = &ProjectId> + '_ {
        self.order.iter()
    }

    pub fn entry(&self, id: &ProjectId) -> Option<&ProjectEntry> {
        self.table.get(id)
    }

    /// Resident state only; never triggers a load.
    pub fn try_get_project(&self, id: &ProjectId) -> Option<Arc<ProjectState>> {
        self.table.get(id)?.try_state()
    }

    /// The project's state, materializing a deferred entry on demand.
    /// Unknown ids yield `Ok(None)` rather than an error: references to
    /// projects outside the snapshot are treated as external. Load
    /// failures surface as `SnapshotError::Load`.
    pub async fn get_project(&self, id: &ProjectId) -> Result<Option<Arc<ProjectState>>> {
        match self.table.get(id) {
            None => Ok(None),
            Some(ProjectEntry::Materialized(state)) => Ok(Some(state.clone())),
            Some(ProjectEntry::Deferred(cell)) => {
                debug!(project = %id, "resolving deferred project");
                Ok(Some(cell.resolve().await?))
            }
        }
    }

    pub fn get_project_blocking(&self, id: &ProjectId) -> Result<Option<Arc<ProjectState>>> {
        futures::executor::block_on(self.get_project(id))
    }

    /// Declared outgoing references, without forcing: from the resident
    /// state when available, otherwise from the deferred declaration.
    pub fn referenced_ids(&self, id: &ProjectId) -> Option<Vec<ProjectId>> {
        let entry = self.table.get(id)?;
        if let Some(state) = entry.try_state() {
            Some(state.referenced_ids().cloned().collect())
        } else {
            self.deferred
                .get(id)
                .map(|d| d.referenced_project_ids.clone())
        }
    }

    /// New snapshot with `state` appended. The added project's
    /// references may point outside the snapshot; they are treated as
    /// external until the targets are added.
    pub fn with_project_added(&self, state: ProjectState) -> Result<Self> {
        let project_id = state.id().clone();
        if self.table.contains_key(&project_id) {
            return Err(SnapshotError::DuplicateProject(project_id));
        }
        let mut next = self.clone();
        next.table
            .insert(project_id.clone(), ProjectEntry::Materialized(Arc::new(state)));
        next.order.push_back(project_id);
        next.version = self.version.next();
        Ok(next)
    }

    /// New snapshot without `id`. A no-op clone if the id is unknown.
    pub fn with_project_removed(&self, id: &ProjectId) -> Self {
        if !self.table.contains_key(id) {
            return self.clone();
        }
        let mut next = self.clone();
        next.table.remove(id);
        next.deferred.remove(id);
        next.order = self.order.iter().filter(|p| *p != id).cloned().collect();
        next.version = self.version.next();
        next
    }

    pub fn with_project_reference_added(
        &self,
        id: &ProjectId,
        reference: ProjectReference,
    ) -> Result<Self> {
        self.replace_state(id, |state| Ok(state.with_reference_added(reference.clone())))
    }

    pub fn with_project_reference_removed(
        &self,
        id: &ProjectId,
        target: &ProjectId,
    ) -> Result<Self> {
        self.replace_state(id, |state| Ok(state.with_reference_removed(target)))
    }

    pub fn with_document_text(
        &self,
        project_id: &ProjectId,
        document_id: &DocumentId,
        text: &str,
    ) -> Result<Self> {
        self.replace_state(project_id, |state| {
            state
                .with_document_text(document_id, text)
                .ok_or_else(|| SnapshotError::DocumentNotFound {
                    project: project_id.clone(),
                    document: document_id.clone(),
                })
        })
    }

    /// Swap the stored entry for `id` without changing the solution
    /// version: used when a deferred entry is replaced by the state it
    /// resolved to, which changes representation, not content. A no-op
    /// clone if the id is unknown.
    pub fn with_project_entry(&self, id: &ProjectId, entry: ProjectEntry) -> Self {
        if !self.table.contains_key(id) {
            return self.clone();
        }
        let mut next = self.clone();
        next.table.insert(id.clone(), entry);
        next
    }

    /// A fresh deferred entry for a project that was declared deferred
    /// at create time; `None` for projects that never were, or when no
    /// loader is attached. The cell is unresolved, so the next access
    /// goes back through the loader.
    pub fn redeferred_entry(&self, id: &ProjectId) -> Option<ProjectEntry> {
        self.deferred.get(id)?;
        let loader = self.loader.clone()?;
        Some(ProjectEntry::Deferred(deferred_cell(loader, id.clone())))
    }

    /// Whether `id` was declared deferred when this lineage was created.
    pub fn was_deferred(&self, id: &ProjectId) -> bool {
        self.deferred.contains_key(id)
    }

    fn replace_state<F>(&self, id: &ProjectId, build: F) -> Result<Self>
    where
        F: FnOnce(&ProjectState) -> Result<ProjectState>,
    {
        let entry = self
            .table
            .get(id)
            .ok_or_else(|| SnapshotError::ProjectNotFound(id.clone()))?;
        let state = entry
            .try_state()
            .ok_or_else(|| SnapshotError::ProjectNotLoaded(id.clone()))?;
        let next_state = build(&state)?;
        let mut next = self.clone();
        next.table
            .insert(id.clone(), ProjectEntry::Materialized(Arc::new(next_state)));
        next.version = self.version.next();
        Ok(next)
    }
}

impl fmt::Debug for Solution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Solution")
            .field("id", &self.id.to_string())
            .field("version", &self.version)
            .field("projects", &self.order.len())
            .finish()
    }
}

fn deferred_cell(
    loader: Arc<dyn ProjectLoader>,
    id: ProjectId,
) -> Arc<AsyncLazy<Arc<ProjectState>>> {
    Arc::new(AsyncLazy::new(move || {
        let loader = Arc::clone(&loader);
        let id = id.clone();
        async move {
            let state = loader.load_project(&id).await?;
            if state.id() != &id {
                return Err(LoadError::failed(format!(
                    "loader returned state for {} when asked for {}",
                    state.id(),
                    id
                )));
            }
            Ok(Arc::new(state))
        }
        .boxed()
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::StaticProjectLoader;
    use crate::project::ProjectInfo;

    fn project(name: &str, references: Vec<ProjectReference>) -> ProjectState {
        ProjectState::new(
            ProjectId::new_named(name),
            ProjectInfo::new(name, "rust"),
            references,
            vec![],
        )
    }

    fn solution_of(projects: Vec<ProjectState>) -> Solution {
        Solution::create(
            SolutionId::new_named("sln"),
            VersionStamp::new(),
            None,
            projects,
            vec![],
            None,
        )
        .unwrap()
    }

    #[test]
    fn test_create_rejects_dangling_reference() {
        let stranger = ProjectId::new_named("stranger");
        let a = project("a", vec![ProjectReference::new(stranger.clone())]);

        let err = Solution::create(
            SolutionId::new(),
            VersionStamp::new(),
            None,
            vec![a],
            vec![],
            None,
        )
        .unwrap_err();
        assert!(matches!(err, SnapshotError::DanglingReference { to, .. } if to == stranger));
    }

    #[test]
    fn test_create_accepts_reference_to_deferred_project() {
        let b_id = ProjectId::new_named("b");
        let a = project("a", vec![ProjectReference::new(b_id.clone())]);
        let loader: Arc<dyn ProjectLoader> = Arc::new(StaticProjectLoader::new());

        let solution = Solution::create(
            SolutionId::new(),
            VersionStamp::new(),
            None,
            vec![a],
            vec![DeferredProjectDescriptor::new(b_id.clone(), vec![])],
            Some(loader),
        )
        .unwrap();
        assert!(solution.contains_project(&b_id));
        assert!(!solution.entry(&b_id).unwrap().is_materialized());
    }

    #[test]
    fn test_create_rejects_duplicates() {
        let a = project("a", vec![]);
        let duplicate = DeferredProjectDescriptor::new(a.id().clone(), vec![]);
        let loader: Arc<dyn ProjectLoader> = Arc::new(StaticProjectLoader::new());

        let err = Solution::create(
            SolutionId::new(),
            VersionStamp::new(),
            None,
            vec![a],
            vec![duplicate],
            Some(loader),
        )
        .unwrap_err();
        assert!(matches!(err, SnapshotError::DuplicateProject(_)));
    }

    #[test]
    fn test_create_requires_loader_for_deferred() {
        let err = Solution::create(
            SolutionId::new(),
            VersionStamp::new(),
            None,
            vec![],
            vec![DeferredProjectDescriptor::new(ProjectId::new(), vec![])],
            None,
        )
        .unwrap_err();
        assert!(matches!(err, SnapshotError::LoaderRequired));
    }

    #[test]
    fn test_insertion_order_is_preserved() {
        let names = ["alpha", "beta", "gamma", "delta"];
        let projects: Vec<_> = names.iter().map(|n| project(n, vec![])).collect();
        let expected: Vec<ProjectId> = projects.iter().map(|p| p.id().clone()).collect();

        let solution = solution_of(projects);
        let ids: Vec<_> = solution.project_ids().cloned().collect();
        assert_eq!(ids, expected);

        // Removal keeps the rest in order.
        let trimmed = solution.with_project_removed(&expected[1]);
        let ids: Vec<_> = trimmed.project_ids().cloned().collect();
        assert_eq!(ids, vec![expected[0].clone(), expected[2].clone(), expected[3].clone()]);
    }

    #[test]
    fn test_with_project_added_shares_existing_entries() {
        let solution = solution_of(vec![project("a", vec![]), project("b", vec![])]);
        let ids: Vec<_> = solution.project_ids().cloned().collect();

        let grown = solution.with_project_added(project("c", vec![])).unwrap();

        for id in &ids {
            assert!(solution.entry(id).unwrap().same_identity(grown.entry(id).unwrap()));
        }
        assert_eq!(grown.len(), 3);
        assert!(grown.version() > solution.version());
    }

    #[test]
    fn test_with_document_text_touches_only_that_project() {
        let doc = crate::project::DocumentState::new(
            DocumentId::new_named("main.rs"),
            "main.rs",
            "fn main() {}",
        );
        let a = project("a", vec![]).with_document_added(doc);
        let a_id = a.id().clone();
        let doc_id = a.documents()[0].id().clone();
        let b = project("b", vec![]);
        let b_id = b.id().clone();

        let solution = solution_of(vec![a, b]);
        let edited = solution
            .with_document_text(&a_id, &doc_id, "fn main() { run() }")
            .unwrap();

        assert!(!solution.entry(&a_id).unwrap().same_identity(edited.entry(&a_id).unwrap()));
        assert!(solution.entry(&b_id).unwrap().same_identity(edited.entry(&b_id).unwrap()));

        let text = edited.try_get_project(&a_id).unwrap().documents()[0]
            .try_text()
            .unwrap();
        assert_eq!(&*text, "fn main() { run() }");
    }

    #[test]
    fn test_previous_snapshot_stays_valid_after_mutation() {
        let a = project("a", vec![]);
        let a_id = a.id().clone();
        let solution = solution_of(vec![a]);
        let removed = solution.with_project_removed(&a_id);

        assert!(solution.contains_project(&a_id));
        assert!(!removed.contains_project(&a_id));
        assert!(solution.try_get_project(&a_id).is_some());
    }

    #[test]
    fn test_reference_mutation_on_deferred_project_is_rejected() {
        let b_id = ProjectId::new_named("b");
        let loader: Arc<dyn ProjectLoader> = Arc::new(StaticProjectLoader::new());
        let solution = Solution::create(
            SolutionId::new(),
            VersionStamp::new(),
            None,
            vec![],
            vec![DeferredProjectDescriptor::new(b_id.clone(), vec![])],
            Some(loader),
        )
        .unwrap();

        let err = solution
            .with_project_reference_added(&b_id, ProjectReference::new(ProjectId::new()))
            .unwrap_err();
        assert!(matches!(err, SnapshotError::ProjectNotLoaded(_)));
    }

    #[tokio::test]
    async fn test_get_project_materializes_deferred_entry() {
        let b_id = ProjectId::new_named("b");
        let loader = StaticProjectLoader::new().with_project(ProjectState::new(
            b_id.clone(),
            ProjectInfo::new("b", "rust"),
            vec![],
            vec![],
        ));
        let solution = Solution::create(
            SolutionId::new(),
            VersionStamp::new(),
            None,
            vec![],
            vec![DeferredProjectDescriptor::new(b_id.clone(), vec![])],
            Some(Arc::new(loader)),
        )
        .unwrap();

        assert!(solution.try_get_project(&b_id).is_none());
        let state = solution.get_project(&b_id).await.unwrap().unwrap();
        assert_eq!(state.id(), &b_id);

        // The memoized cell now answers without the loader.
        assert!(solution.try_get_project(&b_id).is_some());
    }

    #[tokio::test]
    async fn test_load_failure_surfaces_as_snapshot_error() {
        let ghost = ProjectId::new_named("ghost");
        let loader: Arc<dyn ProjectLoader> = Arc::new(StaticProjectLoader::new());
        let solution = Solution::create(
            SolutionId::new(),
            VersionStamp::new(),
            None,
            vec![],
            vec![DeferredProjectDescriptor::new(ghost.clone(), vec![])],
            Some(loader),
        )
        .unwrap();

        let err = solution.get_project(&ghost).await.unwrap_err();
        assert!(matches!(err, SnapshotError::Load(LoadError::NotDeferred { .. })));
    }

    #[tokio::test]
    async fn test_get_project_unknown_id_is_none_not_error() {
        let solution = solution_of(vec![]);
        assert!(solution.get_project(&ProjectId::new()).await.unwrap().is_none());
    }

    #[test]
    fn test_referenced_ids_without_forcing() {
        let b_id = ProjectId::new_named("b");
        let c_id = ProjectId::new_named("c");
        let loader: Arc<dyn ProjectLoader> = Arc::new(StaticProjectLoader::new());
        let solution = Solution::create(
            SolutionId::new(),
            VersionStamp::new(),
            None,
            vec![],
            vec![
                DeferredProjectDescriptor::new(b_id.clone(), vec![c_id.clone()]),
                DeferredProjectDescriptor::new(c_id.clone(), vec![]),
            ],
            Some(loader),
        )
        .unwrap();

        assert_eq!(solution.referenced_ids(&b_id), Some(vec![c_id.clone()]));
        // Still unresolved: reading references must not have loaded anything.
        assert!(solution.try_get_project(&b_id).is_none());
    }
}
