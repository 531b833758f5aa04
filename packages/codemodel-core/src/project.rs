//! Immutable project and document state.
//!
//! A `ProjectState` is owned by the snapshot that contains it and is
//! never mutated in place: every `with_*` builder returns a new sibling
//! with a bumped version, sharing untouched documents and references.

use crate::error::LoadError;
use crate::ids::{DocumentId, ProjectId, VersionStamp};
use crate::lazy::AsyncLazy;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Resolution-mode hint for a project reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ReferenceResolution {
    #[default]
    Default,
    CompileOnly,
    RuntimeOnly,
}

/// Declared dependency on another project, by identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProjectReference {
    pub project_id: ProjectId,
    pub resolution: ReferenceResolution,
}

impl ProjectReference {
    pub fn new(project_id: ProjectId) -> Self {
        Self {
            project_id,
            resolution: ReferenceResolution::Default,
        }
    }

    pub fn with_resolution(mut self, resolution: ReferenceResolution) -> Self {
        self.resolution = resolution;
        self
    }
}

/// Declared project metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectInfo {
    pub name: String,
    pub assembly_name: String,
    pub language: String,
    pub version: VersionStamp,
}

impl ProjectInfo {
    pub fn new(name: impl Into<String>, language: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            assembly_name: name.clone(),
            name,
            language: language.into(),
            version: VersionStamp::new(),
        }
    }

    pub fn with_assembly_name(mut self, assembly_name: impl Into<String>) -> Self {
        self.assembly_name = assembly_name.into();
        self
    }
}

/// A document whose text is loaded on first observation.
#[derive(Debug, Clone)]
pub struct DocumentState {
    id: DocumentId,
    name: String,
    version: VersionStamp,
    text: Arc<AsyncLazy<Arc<str>>>,
}

impl DocumentState {
    /// Document with its text already resident.
    pub fn new(id: DocumentId, name: impl Into<String>, text: impl Into<Arc<str>>) -> Self {
        Self {
            id,
            name: name.into(),
            version: VersionStamp::new(),
            text: Arc::new(AsyncLazy::resolved(text.into())),
        }
    }

    /// Document whose text is produced on demand (file read, generator).
    pub fn with_text_producer<F>(id: DocumentId, name: impl Into<String>, producer: F) -> Self
    where
        F: Fn() -> BoxFuture<'static, Result<Arc<str>, LoadError>> + Send + Sync + 'static,
    {
        Self {
            id,
            name: name.into(),
            version: VersionStamp::new(),
            text: Arc::new(AsyncLazy::new(producer)),
        }
    }

    pub fn id(&self) -> &DocumentId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> VersionStamp {
        self.version
    }

    pub async fn text(&self) -> Result<Arc<str>, LoadError> {
        self.text.resolve().await
    }

    pub fn try_text(&self) -> Option<Arc<str>> {
        self.text.try_peek()
    }

    /// Replace the text, producing a new sibling with a newer version.
    pub fn with_text(&self, text: impl Into<Arc<str>>) -> Self {
        Self {
            id: self.id.clone(),
            name: self.name.clone(),
            version: self.version.next(),
            text: Arc::new(AsyncLazy::resolved(text.into())),
        }
    }
}

/// Immutable, fully-described state of one project.
#[derive(Debug, Clone)]
pub struct ProjectState {
    id: ProjectId,
    info: ProjectInfo,
    references: Vec<ProjectReference>,
    documents: Vec<DocumentState>,
}

impl ProjectState {
    pub fn new(
        id: ProjectId,
        info: ProjectInfo,
        references: Vec<ProjectReference>,
        documents: Vec<DocumentState>,
    ) -> Self {
        Self {
            id,
            info,
            references,
            documents,
        }
    }

    pub fn id(&self) -> &ProjectId {
        &self.id
    }

    pub fn info(&self) -> &ProjectInfo {
        &self.info
    }

    pub fn version(&self) -> VersionStamp {
        self.info.version
    }

    pub fn references(&self) -> &[ProjectReference] {
        &self.references
    }

    pub fn referenced_ids(&self) -> impl Iterator<Item = &ProjectId> + '_ {
        self.references.iter().map(|r| &r.project_id)
    }

    pub fn documents(&self) -> &[DocumentState] {
        &self.documents
    }

    pub fn document(&self, id: &DocumentId) -> Option<&DocumentState> {
        self.documents.iter().find(|d| d.id() == id)
    }

    fn next_version(&self) -> ProjectInfo {
        let mut info = self.info.clone();
        info.version = info.version.next();
        info
    }

    pub fn with_reference_added(&self, reference: ProjectReference) -> Self {
        let mut references = self.references.clone();
        references.push(reference);
        Self {
            id: self.id.clone(),
            info: self.next_version(),
            references,
            documents: self.documents.clone(),
        }
    }

    pub fn with_reference_removed(&self, target: &ProjectId) -> Self {
        Self {
            id: self.id.clone(),
            info: self.next_version(),
            references: self
                .references
                .iter()
                .filter(|r| &r.project_id != target)
                .cloned()
                .collect(),
            documents: self.documents.clone(),
        }
    }

    pub fn with_document_added(&self, document: DocumentState) -> Self {
        let mut documents = self.documents.clone();
        documents.push(document);
        Self {
            id: self.id.clone(),
            info: self.next_version(),
            references: self.references.clone(),
            documents,
        }
    }

    pub fn with_document_removed(&self, document_id: &DocumentId) -> Self {
        Self {
            id: self.id.clone(),
            info: self.next_version(),
            references: self.references.clone(),
            documents: self
                .documents
                .iter()
                .filter(|d| d.id() != document_id)
                .cloned()
                .collect(),
        }
    }

    /// Replace one document's text; `None` if the document is unknown.
    pub fn with_document_text(
        &self,
        document_id: &DocumentId,
        text: impl Into<Arc<str>>,
    ) -> Option<Self> {
        let position = self.documents.iter().position(|d| d.id() == document_id)?;
        let mut documents = self.documents.clone();
        documents[position] = documents[position].with_text(text);
        Some(Self {
            id: self.id.clone(),
            info: self.next_version(),
            references: self.references.clone(),
            documents,
        })
    }
}

/// Declares that a project exists and what it references, without any
/// loaded content. Produced independently of any loader so dependency
/// graphs can be built before anything is materialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeferredProjectDescriptor {
    pub id: ProjectId,
    pub referenced_project_ids: Vec<ProjectId>,
}

impl DeferredProjectDescriptor {
    pub fn new(id: ProjectId, referenced_project_ids: Vec<ProjectId>) -> Self {
        Self {
            id,
            referenced_project_ids,
        }
    }
}

impl fmt::Display for DeferredProjectDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "deferred {} ({} refs)", self.id, self.referenced_project_ids.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_project() -> ProjectState {
        let doc = DocumentState::new(DocumentId::new_named("lib.rs"), "lib.rs", "fn main() {}");
        ProjectState::new(
            ProjectId::new_named("core"),
            ProjectInfo::new("core", "rust"),
            vec![],
            vec![doc],
        )
    }

    #[test]
    fn test_with_reference_added_bumps_version_and_preserves_original() {
        let original = sample_project();
        let dep = ProjectId::new_named("util");
        let updated = original.with_reference_added(ProjectReference::new(dep.clone()));

        assert_eq!(original.references().len(), 0);
        assert_eq!(updated.references().len(), 1);
        assert_eq!(&updated.references()[0].project_id, &dep);
        assert!(updated.version() > original.version());
        assert_eq!(updated.id(), original.id());
    }

    #[test]
    fn test_with_reference_removed() {
        let dep = ProjectId::new_named("util");
        let project = sample_project().with_reference_added(ProjectReference::new(dep.clone()));
        let stripped = project.with_reference_removed(&dep);
        assert!(stripped.references().is_empty());
    }

    #[test]
    fn test_with_document_text_replaces_only_that_document() {
        let project = sample_project();
        let doc_id = project.documents()[0].id().clone();
        let updated = project.with_document_text(&doc_id, "fn main() { run() }").unwrap();

        assert_eq!(
            updated.documents()[0].try_text().as_deref(),
            Some("fn main() { run() }")
        );
        assert_eq!(
            project.documents()[0].try_text().as_deref(),
            Some("fn main() {}")
        );
        assert!(updated.documents()[0].version() > project.documents()[0].version());
    }

    #[test]
    fn test_with_document_text_unknown_document() {
        let project = sample_project();
        assert!(project.with_document_text(&DocumentId::new(), "x").is_none());
    }

    #[tokio::test]
    async fn test_document_text_producer_is_lazy() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use futures::FutureExt;

        let reads = Arc::new(AtomicUsize::new(0));
        let doc = DocumentState::with_text_producer(DocumentId::new(), "gen.rs", {
            let reads = reads.clone();
            move || {
                let reads = reads.clone();
                async move {
                    reads.fetch_add(1, Ordering::SeqCst);
                    Ok(Arc::from("generated"))
                }
                .boxed()
            }
        });

        assert_eq!(doc.try_text(), None);
        assert_eq!(reads.load(Ordering::SeqCst), 0);

        assert_eq!(&*doc.text().await.unwrap(), "generated");
        assert_eq!(&*doc.text().await.unwrap(), "generated");
        assert_eq!(reads.load(Ordering::SeqCst), 1);
    }
}
