use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

/// A file as it exists in one mined revision.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VcsFileRef {
    /// Location of the file inside the revision's checkout.
    pub absolute_path: Utf8PathBuf,
    /// Forward-slash path relative to the mining root. Empty in single-file mode.
    pub relative_path: String,
    /// Identifier of the revision owning this file version.
    pub revision: String,
}

impl VcsFileRef {
    /// Create a new file reference.
    pub fn new(
        absolute_path: impl Into<Utf8PathBuf>,
        relative_path: impl Into<String>,
        revision: impl Into<String>,
    ) -> Self {
        Self {
            absolute_path: absolute_path.into(),
            relative_path: relative_path.into(),
            revision: revision.into(),
        }
    }

    /// Returns `true` when the mining root is itself the tracked file.
    #[must_use]
    pub fn is_root_file(&self) -> bool {
        self.relative_path.is_empty()
    }
}

/// Kind of a classified file change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// File only exists in the newer revision.
    Add,
    /// File only exists in the older revision.
    Remove,
    /// File exists in both revisions under the same path.
    Modify,
    /// File moved to a different path, possibly with edits.
    Relocate,
}

/// Classified add/remove/modify/relocate event for one file between two revisions.
///
/// The variants carry exactly the sides that exist, so an ADD can never hold
/// an old file and a REMOVE can never hold a new one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FileChange {
    /// File created in the newer revision.
    Added {
        /// The created file.
        new: VcsFileRef,
    },
    /// File deleted in the newer revision.
    Removed {
        /// The deleted file.
        old: VcsFileRef,
    },
    /// File content changed in place.
    Modified {
        /// Previous version.
        old: VcsFileRef,
        /// Current version.
        new: VcsFileRef,
    },
    /// File moved; `old.relative_path` differs from `new.relative_path`.
    Relocated {
        /// Previous location.
        old: VcsFileRef,
        /// Current location.
        new: VcsFileRef,
    },
}

impl FileChange {
    /// Kind of this change.
    #[must_use]
    pub const fn kind(&self) -> ChangeKind {
        match self {
            Self::Added { .. } => ChangeKind::Add,
            Self::Removed { .. } => ChangeKind::Remove,
            Self::Modified { .. } => ChangeKind::Modify,
            Self::Relocated { .. } => ChangeKind::Relocate,
        }
    }

    /// The file before the change, absent for additions.
    #[must_use]
    pub const fn old_file(&self) -> Option<&VcsFileRef> {
        match self {
            Self::Added { .. } => None,
            Self::Removed { old } | Self::Modified { old, .. } | Self::Relocated { old, .. } => {
                Some(old)
            }
        }
    }

    /// The file after the change, absent for removals.
    #[must_use]
    pub const fn new_file(&self) -> Option<&VcsFileRef> {
        match self {
            Self::Removed { .. } => None,
            Self::Added { new } | Self::Modified { new, .. } | Self::Relocated { new, .. } => {
                Some(new)
            }
        }
    }
}

/// Unclassified change feed reported by a backend for one revision step.
///
/// Paths are relative to the mining root. The sets are unordered and may
/// contain duplicates; the classifier normalizes them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawChanges {
    /// Paths only present in the newer revision.
    #[serde(default)]
    pub added: Vec<String>,
    /// Paths only present in the older revision.
    #[serde(default)]
    pub removed: Vec<String>,
    /// Paths present in both revisions with different content.
    #[serde(default)]
    pub modified: Vec<String>,
    /// `(old, new)` pairs of moved files.
    #[serde(default)]
    pub relocated: Vec<(String, String)>,
}

impl RawChanges {
    /// Returns `true` when the feed reports no change at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
            && self.removed.is_empty()
            && self.modified.is_empty()
            && self.relocated.is_empty()
    }
}

/// Direction of a single line operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineChangeKind {
    /// Line present only in the new content.
    Insert,
    /// Line present only in the old content.
    Delete,
}

/// One insert or delete operation of a line-level diff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineChange {
    /// Operation kind.
    pub kind: LineChangeKind,
    /// 1-based line number: old file for deletes, new file for inserts.
    pub line: u32,
    /// Text of the line without its terminator.
    pub content: String,
}

impl LineChange {
    /// A line removed from the old content.
    pub fn delete(line: u32, content: impl Into<String>) -> Self {
        Self {
            kind: LineChangeKind::Delete,
            line,
            content: content.into(),
        }
    }

    /// A line introduced in the new content.
    pub fn insert(line: u32, content: impl Into<String>) -> Self {
        Self {
            kind: LineChangeKind::Insert,
            line,
            content: content.into(),
        }
    }
}
