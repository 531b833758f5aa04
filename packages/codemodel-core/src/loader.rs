//! Loader capability: the pluggable source of deferred project state.

use crate::error::LoadError;
use crate::ids::ProjectId;
use crate::project::ProjectState;
use async_trait::async_trait;
use std::collections::HashMap;

/// Supplies the full state of projects that were declared deferred.
///
/// Implementations must fail with [`LoadError::NotDeferred`] when asked
/// for an id they do not recognize, rather than a generic fault.
#[async_trait]
pub trait ProjectLoader: Send + Sync {
    async fn load_project(&self, id: &ProjectId) -> Result<ProjectState, LoadError>;
}

/// Map-backed loader serving pre-built states. Useful for hosts that
/// compute everything up front and for tests.
#[derive(Debug, Default)]
pub struct StaticProjectLoader {
    projects: HashMap<ProjectId, ProjectState>,
}

impl StaticProjectLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, state: ProjectState) {
        self.projects.insert(state.id().clone(), state);
    }

    pub fn with_project(mut self, state: ProjectState) -> Self {
        self.insert(state);
        self
    }
}

#[async_trait]
impl ProjectLoader for StaticProjectLoader {
    async fn load_project(&self, id: &ProjectId) -> Result<ProjectState, LoadError> {
        self.projects
            .get(id)
            .cloned()
            .ok_or_else(|| LoadError::NotDeferred {
                project_id: id.clone(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::ProjectInfo;

    #[tokio::test]
    async fn test_static_loader_serves_known_projects() {
        let id = ProjectId::new_named("core");
        let state = ProjectState::new(id.clone(), ProjectInfo::new("core", "rust"), vec![], vec![]);
        let loader = StaticProjectLoader::new().with_project(state);

        let loaded = loader.load_project(&id).await.unwrap();
        assert_eq!(loaded.id(), &id);
    }

    #[tokio::test]
    async fn test_static_loader_rejects_unknown_ids() {
        let loader = StaticProjectLoader::new();
        let err = loader.load_project(&ProjectId::new()).await.unwrap_err();
        assert!(matches!(err, LoadError::NotDeferred { .. }));
    }
}
