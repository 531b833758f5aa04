use crate::ids::{DocumentId, ProjectId, SolutionId};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SnapshotError>;

/// Failure of a deferred load.
///
/// Cloneable so a shared in-flight computation can hand the same
/// failure to every waiter. A `LoadError` is never cached: the lazy
/// cell resets and the next resolve retries the producer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    #[error("project {project_id} is not registered as deferred")]
    NotDeferred { project_id: ProjectId },

    #[error("project load failed: {reason}")]
    Failed { reason: String },
}

impl LoadError {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }
}

/// Snapshot construction and mutation errors.
///
/// Construction-time invariant violations are surfaced synchronously
/// to the caller; the rejected snapshot never becomes current.
#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("project {from} references undeclared project {to}")]
    DanglingReference { from: ProjectId, to: ProjectId },

    #[error("duplicate project id {0}")]
    DuplicateProject(ProjectId),

    #[error("project not found in snapshot: {0}")]
    ProjectNotFound(ProjectId),

    #[error("document not found in project {project}: {document}")]
    DocumentNotFound {
        project: ProjectId,
        document: DocumentId,
    },

    #[error("project {0} is deferred and not yet materialized")]
    ProjectNotLoaded(ProjectId),

    #[error("deferred projects declared without a loader")]
    LoaderRequired,

    #[error("snapshots belong to different solutions ({old} vs {new})")]
    LineageMismatch { old: SolutionId, new: SolutionId },

    #[error(transparent)]
    Load(#[from] LoadError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_error_is_cloneable() {
        let err = LoadError::failed("loader crashed");
        let clone = err.clone();
        assert_eq!(err, clone);
        assert_eq!(clone.to_string(), "project load failed: loader crashed");
    }

    #[test]
    fn test_not_deferred_names_the_project() {
        let id = ProjectId::new_named("orphan");
        let err = LoadError::NotDeferred { project_id: id };
        assert!(err.to_string().contains("orphan"));
    }
}
