//! Concrete [`VcsBackend`](revtrack_backend_api::VcsBackend) implementations.

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

mod fs;
mod git;
mod memory;

pub use fs::{FileSystemBackend, WORKING_TREE};
pub use git::{GitBackend, GitOptions};
pub use memory::{MemoryBackend, Snapshot};

use std::path::Path;

use camino::Utf8PathBuf;
use revtrack_backend_api::{BackendError, BackendResult};

/// Canonicalize `path` and require it to be valid UTF-8.
fn canonical_utf8(path: &Path) -> BackendResult<Utf8PathBuf> {
    let canonical = std::fs::canonicalize(path).map_err(|source| BackendError::Io {
        path: path.display().to_string(),
        source,
    })?;
    Utf8PathBuf::from_path_buf(canonical).map_err(|path| BackendError::IllegalRepository {
        path: path.display().to_string(),
    })
}
