/// Errors surfaced by backend implementations.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The mining root is not a repository this backend can handle.
    #[error("not a usable repository: {path}")]
    IllegalRepository {
        /// Path that failed to open.
        path: String,
    },
    /// A revision or file requested from the backend does not exist.
    #[error("illegal target {target}: {reason}")]
    IllegalTarget {
        /// Revision id or path that was requested.
        target: String,
        /// Why the target could not be served.
        reason: String,
    },
    /// Filesystem interaction failed.
    #[error("failed to access {path}: {source}")]
    Io {
        /// Filesystem path involved in the failed operation.
        path: String,
        /// Source I/O error returned by the standard library.
        #[source]
        source: std::io::Error,
    },
    /// The underlying VCS tooling reported an error.
    #[error("vcs error: {source}")]
    Vcs {
        /// Original tool error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// Generic failure surfaced by the backend.
    #[error("{message}")]
    Failure {
        /// Human-readable error message.
        message: String,
    },
}

impl BackendError {
    /// Helper to construct a failure from any displayable message.
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Failure {
            message: message.into(),
        }
    }

    /// Helper for unknown revisions or paths.
    #[must_use]
    pub fn illegal_target(target: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::IllegalTarget {
            target: target.into(),
            reason: reason.into(),
        }
    }

    /// Wrap an error raised by the VCS tooling.
    pub fn vcs(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Vcs {
            source: Box::new(source),
        }
    }
}

/// Convenience result alias for backend operations.
pub type BackendResult<T> = std::result::Result<T, BackendError>;
