//! Identity tokens for solutions, projects and documents.
//!
//! Tokens are pure value types: a process-unique uuid plus an optional
//! debug name. Equality and hashing go by uuid only, so a token stays
//! stable while the state behind it is replaced snapshot after snapshot.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Serialize, Deserialize)]
        pub struct $name {
            uuid: Uuid,
            debug_name: Option<String>,
        }

        impl $name {
            pub fn new() -> Self {
                Self {
                    uuid: Uuid::new_v4(),
                    debug_name: None,
                }
            }

            pub fn new_named(name: impl Into<String>) -> Self {
                Self {
                    uuid: Uuid::new_v4(),
                    debug_name: Some(name.into()),
                }
            }

            pub fn debug_name(&self) -> Option<&str> {
                self.debug_name.as_deref()
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        // Debug name is display-only; identity is the uuid.
        impl PartialEq for $name {
            fn eq(&self, other: &Self) -> bool {
                self.uuid == other.uuid
            }
        }

        impl Eq for $name {}

        impl Hash for $name {
            fn hash<H: Hasher>(&self, state: &mut H) {
                self.uuid.hash(state);
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match &self.debug_name {
                    Some(name) => write!(f, "{}", name),
                    None => write!(f, "{}", &self.uuid.as_simple().to_string()[..8]),
                }
            }
        }
    };
}

define_id!(
    /// Identity of a solution across all of its snapshots.
    SolutionId
);
define_id!(
    /// Identity of a project, stable across state replacement.
    ProjectId
);
define_id!(
    /// Identity of a document within a project.
    DocumentId
);

/// Logical version for change detection.
///
/// Wall-clock millisecond resolution plus an increment counter, so
/// `next` is strictly newer even within the same clock tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VersionStamp {
    unix_millis: u64,
    increment: u32,
}

impl VersionStamp {
    pub fn new() -> Self {
        Self {
            unix_millis: now_millis(),
            increment: 0,
        }
    }

    /// A stamp strictly newer than `self`.
    pub fn next(&self) -> Self {
        let now = now_millis();
        if now > self.unix_millis {
            Self {
                unix_millis: now,
                increment: 0,
            }
        } else {
            Self {
                unix_millis: self.unix_millis,
                increment: self.increment + 1,
            }
        }
    }

    pub fn newer_of(a: Self, b: Self) -> Self {
        if a >= b {
            a
        } else {
            b
        }
    }
}

impl Default for VersionStamp {
    fn default() -> Self {
        Self::new()
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
