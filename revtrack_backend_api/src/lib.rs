//! Capability interface between the revtrack engine and concrete VCS tooling.

mod error;

pub use error::{BackendError, BackendResult};

use revtrack_api::{Interval, RawChanges, Revision};

/// Narrow set of operations the engine needs from a version-control backend.
///
/// Implementations wrap one concrete tool (git, a plain directory, an
/// in-memory script). All paths crossing this boundary are relative to the
/// backend's mining root and use forward slashes.
pub trait VcsBackend: std::fmt::Debug {
    /// Stable identifier used for logging.
    fn id(&self) -> &'static str;

    /// Resolve a user-facing reference (branch, tag, abbreviated id) to a
    /// canonical revision id. Unknown references resolve to `None`.
    ///
    /// # Errors
    ///
    /// Implementors surface repository access failures.
    fn resolve_revision(&self, reference: &str) -> BackendResult<Option<String>>;

    /// List the revisions inside `interval`, oldest first.
    ///
    /// For [`Interval::Revisions`] the references are already canonical ids.
    ///
    /// # Errors
    ///
    /// Implementors surface repository access failures.
    fn list_revisions(&self, interval: &Interval) -> BackendResult<Vec<String>>;

    /// Make the given revision available on disk and describe it.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::IllegalTarget`] for unknown revisions.
    fn checkout(&self, revision: &str) -> BackendResult<Revision>;

    /// Report the files that differ between `from` and `to`. When `from` is
    /// `None`, every file present in `to` is reported as added.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::IllegalTarget`] for unknown revisions.
    fn raw_changes(&self, from: Option<&str>, to: &str) -> BackendResult<RawChanges>;

    /// Read the content of `path` as stored in `revision`.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::IllegalTarget`] when the file does not exist in
    /// that revision.
    fn read_bytes(&self, path: &str, revision: &str) -> BackendResult<Vec<u8>>;
}

impl<T: VcsBackend + ?Sized> VcsBackend for &T {
    fn id(&self) -> &'static str {
        (**self).id()
    }

    fn resolve_revision(&self, reference: &str) -> BackendResult<Option<String>> {
        (**self).resolve_revision(reference)
    }

    fn list_revisions(&self, interval: &Interval) -> BackendResult<Vec<String>> {
        (**self).list_revisions(interval)
    }

    fn checkout(&self, revision: &str) -> BackendResult<Revision> {
        (**self).checkout(revision)
    }

    fn raw_changes(&self, from: Option<&str>, to: &str) -> BackendResult<RawChanges> {
        (**self).raw_changes(from, to)
    }

    fn read_bytes(&self, path: &str, revision: &str) -> BackendResult<Vec<u8>> {
        (**self).read_bytes(path, revision)
    }
}

impl<T: VcsBackend + ?Sized> VcsBackend for Box<T> {
    fn id(&self) -> &'static str {
        (**self).id()
    }

    fn resolve_revision(&self, reference: &str) -> BackendResult<Option<String>> {
        (**self).resolve_revision(reference)
    }

    fn list_revisions(&self, interval: &Interval) -> BackendResult<Vec<String>> {
        (**self).list_revisions(interval)
    }

    fn checkout(&self, revision: &str) -> BackendResult<Revision> {
        (**self).checkout(revision)
    }

    fn raw_changes(&self, from: Option<&str>, to: &str) -> BackendResult<RawChanges> {
        (**self).raw_changes(from, to)
    }

    fn read_bytes(&self, path: &str, revision: &str) -> BackendResult<Vec<u8>> {
        (**self).read_bytes(path, revision)
    }
}
