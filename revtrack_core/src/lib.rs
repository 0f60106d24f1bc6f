//! Core library for mining repository history step by step.
//!
//! The crate is layered around three primary responsibilities:
//! - interval resolution: which revisions a pass visits
//! - change classification: which files participate in each step
//! - range mapping: where a source location went in the next revision
//!
//! [`RevisionEngine`] glues them into a lazy sequence of [`RevisionRange`]s.

#![warn(
    clippy::all,
    clippy::cargo,
    clippy::nursery,
    clippy::pedantic,
    missing_docs
)]
#![cfg_attr(
    not(test),
    deny(
        clippy::dbg_macro,
        clippy::expect_used,
        clippy::panic,
        clippy::print_stderr,
        clippy::print_stdout,
        clippy::todo,
        clippy::unwrap_used
    )
)]

mod cache;
mod charset;
/// Raw change feed classification.
pub mod classify;
/// Engine configuration.
pub mod config;
/// Line-level diff adapter.
pub mod diff;
/// Revision sequence production.
pub mod engine;
/// History window resolution.
pub mod interval;
/// Cross-revision range mapping.
pub mod mapping;

pub use classify::ChangeSetClassifier;
pub use config::EngineConfig;
pub use diff::{DiffEngine, LineDiff};
pub use engine::{RevisionEngine, RevisionRanges};
pub use interval::IntervalResolver;
pub use mapping::{LineFate, RangeMapper};
pub use revtrack_api::{
    ChangeKind, FileChange, Interval, LineChange, LineChangeKind, Position, Range, RawChanges,
    Revision, RevisionRange, Signature, VcsFileRef,
};
pub use revtrack_backend_api::{BackendError, BackendResult, VcsBackend};

/// Common result type for the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the core library.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The requested history window is out of order.
    #[error("illegal interval: {reason}")]
    IllegalInterval {
        /// Description of the ordering violation.
        reason: String,
    },
    /// A backend returned data violating its contract.
    #[error("backend '{backend}' returned inconsistent data: {reason}")]
    IllegalReturn {
        /// Identifier of the offending backend.
        backend: &'static str,
        /// Description of the violation.
        reason: String,
    },
    /// A backend operation failed.
    #[error("backend '{backend}' failed: {source}")]
    Backend {
        /// Identifier of the failing backend.
        backend: &'static str,
        /// Original backend error.
        #[source]
        source: BackendError,
    },
    /// A range given to the mapper breaks its preconditions.
    #[error("invalid range: {reason}")]
    InvalidRange {
        /// Description of the violated precondition.
        reason: String,
    },
    /// A range was tracked through a change of a different file.
    #[error("range belongs to {expected} but the change concerns {found}")]
    RangeFileMismatch {
        /// File (path@revision) the range refers to.
        expected: String,
        /// Old side of the change (path@revision), or a marker for additions.
        found: String,
    },
    /// A line diff does not describe a valid edit of the old content.
    #[error("inconsistent line diff: {reason}")]
    InconsistentDiff {
        /// Description of the inconsistency.
        reason: String,
    },
    /// A cache lock was poisoned by a panicking caller.
    #[error("revision cache is poisoned")]
    CachePoisoned,
}

impl Error {
    pub(crate) fn backend(backend: &'static str, source: BackendError) -> Self {
        Self::Backend { backend, source }
    }

    pub(crate) fn illegal_return(backend: &'static str, reason: impl Into<String>) -> Self {
        Self::IllegalReturn {
            backend,
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_range(reason: impl Into<String>) -> Self {
        Self::InvalidRange {
            reason: reason.into(),
        }
    }
}
