/*
 * codemodel-workspace - Workspace Synchronization Layer
 *
 * Owns the current solution snapshot, exposes mutation-by-replacement,
 * and pushes consistent, dependency-ordered change sets to an external
 * host.
 *
 * Architecture:
 * - Workspace (single current snapshot behind a writer lock)
 * - DependencyGraph (reference graph over known, not-yet-loaded ids)
 * - HostSync (idempotent, dependency-ordered host notifications)
 */

pub mod dependency_graph;
pub mod error;
pub mod host;
pub mod workspace;

pub use dependency_graph::DependencyGraph;
pub use error::{Result, WorkspaceError};
pub use host::{HostSync, WorkspaceHost};
pub use workspace::Workspace;
