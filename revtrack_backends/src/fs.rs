//! A plain directory (or file) mined as a single revision.

use std::path::Path;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use revtrack_api::{Interval, RawChanges, Revision};
use revtrack_backend_api::{BackendError, BackendResult, VcsBackend};
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

use crate::canonical_utf8;

/// Identifier of the only revision a [`FileSystemBackend`] exposes.
pub const WORKING_TREE: &str = "working-tree";

const VCS_DIRS: [&str; 3] = [".git", ".hg", ".svn"];

/// Backend exposing the current state of a directory without history.
#[derive(Debug, Clone)]
pub struct FileSystemBackend {
    root: Utf8PathBuf,
    single_file: bool,
}

impl FileSystemBackend {
    /// Mine `path`, which may be a directory or a single file.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Io`] when `path` does not exist and
    /// [`BackendError::IllegalRepository`] for non UTF-8 paths.
    pub fn open(path: impl AsRef<Path>) -> BackendResult<Self> {
        let root = canonical_utf8(path.as_ref())?;
        Ok(Self {
            single_file: root.is_file(),
            root,
        })
    }

    /// Canonical mining root.
    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    fn require_working_tree(revision: &str) -> BackendResult<()> {
        if revision == WORKING_TREE {
            Ok(())
        } else {
            Err(BackendError::illegal_target(
                revision,
                "only the working tree is available",
            ))
        }
    }

    fn modified_at(&self) -> BackendResult<DateTime<Utc>> {
        std::fs::metadata(&self.root)
            .and_then(|metadata| metadata.modified())
            .map(DateTime::<Utc>::from)
            .map_err(|source| self.io_error(&self.root, source))
    }

    fn files(&self) -> BackendResult<Vec<String>> {
        if self.single_file {
            return Ok(vec![String::new()]);
        }

        let mut files = Vec::new();
        let walker = WalkDir::new(&self.root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|entry| !is_vcs_dir(entry));
        for entry in walker {
            let entry = entry.map_err(|err| BackendError::Io {
                path: self.root.to_string(),
                source: err.into(),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(&self.root)
                .ok()
                .and_then(Path::to_str)
                .ok_or_else(|| {
                    BackendError::message(format!("unusable path {}", entry.path().display()))
                })?;
            files.push(relative.replace('\\', "/"));
        }
        files.sort();
        Ok(files)
    }

    fn io_error(&self, path: &Utf8Path, source: std::io::Error) -> BackendError {
        debug!(root = %self.root, %path, %source, "filesystem access failed");
        BackendError::Io {
            path: path.to_string(),
            source,
        }
    }
}

impl VcsBackend for FileSystemBackend {
    fn id(&self) -> &'static str {
        "filesystem"
    }

    fn resolve_revision(&self, reference: &str) -> BackendResult<Option<String>> {
        Ok(matches!(reference, WORKING_TREE | "HEAD").then(|| WORKING_TREE.to_owned()))
    }

    fn list_revisions(&self, interval: &Interval) -> BackendResult<Vec<String>> {
        let listed = match interval {
            Interval::All => true,
            Interval::Time { since, until } => {
                let at = self.modified_at()?;
                *since <= at && at <= *until
            }
            Interval::Revisions { from, to } => from == WORKING_TREE && to == WORKING_TREE,
        };
        Ok(if listed {
            vec![WORKING_TREE.to_owned()]
        } else {
            Vec::new()
        })
    }

    fn checkout(&self, revision: &str) -> BackendResult<Revision> {
        Self::require_working_tree(revision)?;
        Ok(Revision {
            id: WORKING_TREE.to_owned(),
            timestamp: self.modified_at()?,
            author: None,
            message: None,
            root: self.root.clone(),
        })
    }

    fn raw_changes(&self, from: Option<&str>, to: &str) -> BackendResult<RawChanges> {
        Self::require_working_tree(to)?;
        match from {
            None => Ok(RawChanges {
                added: self.files()?,
                ..RawChanges::default()
            }),
            Some(from) => {
                Self::require_working_tree(from)?;
                Ok(RawChanges::default())
            }
        }
    }

    fn read_bytes(&self, path: &str, revision: &str) -> BackendResult<Vec<u8>> {
        Self::require_working_tree(revision)?;
        let file = if path.is_empty() {
            self.root.clone()
        } else if self.single_file {
            return Err(BackendError::illegal_target(
                path,
                "single-file roots only contain the empty path",
            ));
        } else {
            self.root.join(path)
        };
        std::fs::read(&file).map_err(|source| self.io_error(&file, source))
    }
}

fn is_vcs_dir(entry: &DirEntry) -> bool {
    entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| VCS_DIRS.contains(&name))
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn fixture() -> TempDir {
        let temp = TempDir::new().expect("tempdir");
        std::fs::create_dir_all(temp.path().join("src")).expect("mkdir");
        std::fs::create_dir_all(temp.path().join(".git")).expect("mkdir");
        std::fs::write(temp.path().join("src/lib.rs"), "fn a() {}\n").expect("write");
        std::fs::write(temp.path().join("README.md"), "hello\n").expect("write");
        std::fs::write(temp.path().join(".git/HEAD"), "ref\n").expect("write");
        temp
    }

    #[test]
    fn lists_files_outside_vcs_metadata() -> BackendResult<()> {
        let temp = fixture();
        let backend = FileSystemBackend::open(temp.path())?;
        let raw = backend.raw_changes(None, WORKING_TREE)?;
        assert_eq!(raw.added, vec!["README.md", "src/lib.rs"]);
        assert!(backend.raw_changes(Some(WORKING_TREE), WORKING_TREE)?.is_empty());
        Ok(())
    }

    #[test]
    fn exposes_a_single_revision() -> BackendResult<()> {
        let temp = fixture();
        let backend = FileSystemBackend::open(temp.path())?;
        assert_eq!(backend.list_revisions(&Interval::All)?, vec![WORKING_TREE]);
        assert_eq!(
            backend.resolve_revision("HEAD")?.as_deref(),
            Some(WORKING_TREE)
        );
        assert_eq!(backend.resolve_revision("main")?, None);
        assert!(matches!(
            backend.checkout("abc123"),
            Err(BackendError::IllegalTarget { .. })
        ));

        let revision = backend.checkout(WORKING_TREE)?;
        assert_eq!(revision.root, backend.root());
        Ok(())
    }

    #[test]
    fn single_file_root_uses_the_empty_path() -> BackendResult<()> {
        let temp = fixture();
        let backend = FileSystemBackend::open(temp.path().join("src/lib.rs"))?;
        let raw = backend.raw_changes(None, WORKING_TREE)?;
        assert_eq!(raw.added, vec![String::new()]);
        assert_eq!(backend.read_bytes("", WORKING_TREE)?, b"fn a() {}\n");
        assert!(backend.read_bytes("other", WORKING_TREE).is_err());
        Ok(())
    }
}
