use camino::Utf8PathBuf;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::change::FileChange;

/// One immutable snapshot of the mined repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revision {
    /// Backend-defined identifier (e.g., a git SHA).
    pub id: String,
    /// Instant the revision was recorded.
    pub timestamp: DateTime<Utc>,
    /// Author information when available.
    #[serde(default)]
    pub author: Option<Signature>,
    /// Summary line of the revision message.
    #[serde(default)]
    pub message: Option<String>,
    /// Directory (or file, in single-file mode) holding this revision's checkout.
    pub root: Utf8PathBuf,
}

/// Structured author identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    /// Display name for the individual.
    pub name: String,
    /// Optional email address.
    #[serde(default)]
    pub email: Option<String>,
}

impl Signature {
    /// Convenience constructor.
    pub fn new(name: impl Into<String>, email: Option<impl Into<String>>) -> Self {
        Self {
            name: name.into(),
            email: email.map(Into::into),
        }
    }
}

/// The delta step between two consecutive mined revisions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionRange {
    /// Revision reached by this step.
    pub revision: Revision,
    /// Previously mined revision. Absent only for the first step.
    #[serde(default)]
    pub predecessor: Option<Revision>,
    /// Classified file-level changes between `predecessor` and `revision`.
    #[serde(default)]
    pub file_changes: Vec<FileChange>,
}

impl RevisionRange {
    /// Returns `true` for the baseline step of a pass.
    #[must_use]
    pub const fn is_first(&self) -> bool {
        self.predecessor.is_none()
    }

    /// Finds the change whose old side is the given relative path.
    #[must_use]
    pub fn change_for_old_path(&self, relative_path: &str) -> Option<&FileChange> {
        self.file_changes.iter().find(|change| {
            change
                .old_file()
                .is_some_and(|file| file.relative_path == relative_path)
        })
    }
}

/// Window of history selected for mining.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Interval {
    /// Every revision reachable from the backend's current head.
    All,
    /// Revisions recorded within `since..=until`.
    Time {
        /// Inclusive lower bound.
        since: DateTime<Utc>,
        /// Inclusive upper bound.
        until: DateTime<Utc>,
    },
    /// Revisions between two references, both inclusive.
    Revisions {
        /// Oldest revision of the window.
        from: String,
        /// Newest revision of the window.
        to: String,
    },
}
