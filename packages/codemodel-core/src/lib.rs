/*
 * codemodel-core - Immutable Solution Snapshot Model
 *
 * The in-memory representation of "the current state of a codebase" as
 * a single, cheaply-copyable, versioned value.
 *
 * Architecture:
 * - Identity tokens (solution/project/document, debug-named uuids)
 * - Memoized lazy values (at-most-once deferred computation)
 * - Immutable project/document state
 * - Persistent solution snapshots with structural sharing
 * - Identity-based snapshot differencing
 */

pub mod diff;
pub mod error;
pub mod ids;
pub mod lazy;
pub mod loader;
pub mod project;
pub mod snapshot;

pub use diff::{DiffPolicy, DiffSummary, SolutionDiff};
pub use error::{LoadError, Result, SnapshotError};
pub use ids::{DocumentId, ProjectId, SolutionId, VersionStamp};
pub use lazy::AsyncLazy;
pub use loader::{ProjectLoader, StaticProjectLoader};
pub use project::{
    DeferredProjectDescriptor, DocumentState, ProjectInfo, ProjectReference, ProjectState,
    ReferenceResolution,
};
pub use snapshot::{ProjectEntry, Solution};
