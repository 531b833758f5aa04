use codemodel_core::{LoadError, ProjectId, SnapshotError};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, WorkspaceError>;

#[derive(Error, Debug)]
pub enum WorkspaceError {
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("project not found in workspace: {0}")]
    ProjectNotFound(ProjectId),
}
