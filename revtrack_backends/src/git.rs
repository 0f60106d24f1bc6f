//! History mining on top of libgit2.

use std::fmt;
use std::path::Path;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, TimeZone, Utc};
use git2::build::CheckoutBuilder;
use git2::{
    Commit, Delta, DiffFindOptions, DiffOptions, ErrorClass, ErrorCode, Oid, Repository, Sort,
    Tree,
};
use revtrack_api::{Interval, RawChanges, Revision, Signature};
use revtrack_backend_api::{BackendError, BackendResult, VcsBackend};
use tempfile::TempDir;
use tracing::debug;

use crate::canonical_utf8;

/// Settings for a [`GitBackend`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GitOptions {
    checkout_dir: Option<Utf8PathBuf>,
}

impl GitOptions {
    /// Options materializing revisions into a temporary directory that is
    /// removed together with the backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Materialize each checked-out revision under `<dir>/<revision id>`.
    #[must_use]
    pub fn checkout_dir(mut self, dir: impl Into<Utf8PathBuf>) -> Self {
        self.checkout_dir = Some(dir.into());
        self
    }
}

/// Backend mining a git repository along its first-parent history.
///
/// The mining root may be the repository itself, one of its directories, or a
/// single tracked file. In the last case every change concerns the empty
/// relative path.
pub struct GitBackend {
    repo: Repository,
    workdir: Utf8PathBuf,
    prefix: String,
    single_file: bool,
    checkouts: Utf8PathBuf,
    _scratch: Option<TempDir>,
}

impl GitBackend {
    /// Open the repository containing `path` and mine below `path`.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::IllegalRepository`] when `path` is not inside a
    /// non-bare git repository and [`BackendError::Io`] when it does not exist.
    pub fn open(path: impl AsRef<Path>) -> BackendResult<Self> {
        Self::open_with(path, GitOptions::default())
    }

    /// Like [`GitBackend::open`] with explicit options.
    ///
    /// # Errors
    ///
    /// See [`GitBackend::open`].
    pub fn open_with(path: impl AsRef<Path>, options: GitOptions) -> BackendResult<Self> {
        let canonical = canonical_utf8(path.as_ref())?;

        let repo = match Repository::discover(&canonical) {
            Ok(repo) => repo,
            Err(err)
                if err.class() == ErrorClass::Repository && err.code() == ErrorCode::NotFound =>
            {
                return Err(BackendError::IllegalRepository {
                    path: canonical.to_string(),
                })
            }
            Err(err) => return Err(BackendError::vcs(err)),
        };

        let workdir = repo
            .workdir()
            .ok_or_else(|| BackendError::IllegalRepository {
                path: canonical.to_string(),
            })
            .and_then(canonical_utf8)?;

        let prefix = canonical
            .strip_prefix(&workdir)
            .map_err(|_| BackendError::IllegalRepository {
                path: canonical.to_string(),
            })?
            .components()
            .map(|component| component.as_str())
            .collect::<Vec<_>>()
            .join("/");
        if prefix == ".git" || prefix.starts_with(".git/") {
            return Err(BackendError::IllegalRepository {
                path: canonical.to_string(),
            });
        }

        let (checkouts, scratch) = match options.checkout_dir {
            Some(dir) => (dir, None),
            None => {
                let scratch = tempfile::Builder::new()
                    .prefix("revtrack-")
                    .tempdir()
                    .map_err(|source| BackendError::Io {
                        path: std::env::temp_dir().display().to_string(),
                        source,
                    })?;
                let dir = Utf8PathBuf::from_path_buf(scratch.path().to_path_buf()).map_err(
                    |path| {
                        BackendError::message(format!(
                            "non UTF-8 checkout directory {}",
                            path.display()
                        ))
                    },
                )?;
                (dir, Some(scratch))
            }
        };

        debug!(%workdir, %prefix, %checkouts, "opened git repository");
        Ok(Self {
            single_file: canonical.is_file(),
            repo,
            workdir,
            prefix,
            checkouts,
            _scratch: scratch,
        })
    }

    /// Working directory of the underlying repository.
    #[must_use]
    pub fn workdir(&self) -> &Utf8Path {
        &self.workdir
    }

    /// Mining root relative to the working directory, empty for the whole
    /// repository.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Directory holding one materialized checkout per revision.
    #[must_use]
    pub fn checkouts(&self) -> &Utf8Path {
        &self.checkouts
    }

    /// Returns `true` when the mining root is a single file.
    #[must_use]
    pub const fn is_single_file(&self) -> bool {
        self.single_file
    }

    fn commit(&self, revision: &str) -> BackendResult<Commit<'_>> {
        let oid = Oid::from_str(revision)
            .map_err(|_| BackendError::illegal_target(revision, "not a commit id"))?;
        match self.repo.find_commit(oid) {
            Ok(commit) => Ok(commit),
            Err(err) if err.code() == ErrorCode::NotFound => {
                Err(BackendError::illegal_target(revision, "unknown commit"))
            }
            Err(err) => Err(BackendError::vcs(err)),
        }
    }

    fn head(&self) -> BackendResult<Option<Oid>> {
        match self.repo.head() {
            Ok(head) => Ok(head.target()),
            Err(err)
                if matches!(
                    (err.class(), err.code()),
                    (
                        ErrorClass::Reference,
                        ErrorCode::NotFound | ErrorCode::UnbornBranch
                    )
                ) =>
            {
                Ok(None)
            }
            Err(err) => Err(BackendError::vcs(err)),
        }
    }

    /// First-parent chain ending at `tip`, newest first. With `stop`, the
    /// ancestors of `stop` are never walked.
    fn first_parent_chain(&self, tip: Oid, stop: Option<Oid>) -> BackendResult<Vec<Commit<'_>>> {
        let mut walk = self.repo.revwalk().map_err(BackendError::vcs)?;
        walk.push(tip).map_err(BackendError::vcs)?;
        if let Some(stop) = stop {
            let stop = self.repo.find_commit(stop).map_err(BackendError::vcs)?;
            for parent in stop.parent_ids() {
                walk.hide(parent).map_err(BackendError::vcs)?;
            }
        }
        walk.simplify_first_parent().map_err(BackendError::vcs)?;
        walk.set_sorting(Sort::TOPOLOGICAL)
            .map_err(BackendError::vcs)?;

        walk.map(|oid| {
            oid.and_then(|oid| self.repo.find_commit(oid))
                .map_err(BackendError::vcs)
        })
        .collect()
    }

    /// Returns `true` when `commit` changes anything below the mining root.
    fn touches_root(&self, commit: &Commit<'_>) -> BackendResult<bool> {
        if self.prefix.is_empty() {
            return Ok(true);
        }
        let current = self.root_entry(&commit.tree().map_err(BackendError::vcs)?)?;
        let previous = if commit.parent_count() == 0 {
            None
        } else {
            let parent = commit.parent(0).map_err(BackendError::vcs)?;
            self.root_entry(&parent.tree().map_err(BackendError::vcs)?)?
        };
        Ok(current != previous)
    }

    fn root_entry(&self, tree: &Tree<'_>) -> BackendResult<Option<Oid>> {
        entry_id(tree, &self.prefix)
    }

    /// Path relative to the mining root, or `None` outside of it.
    fn relative(&self, path: Option<&Path>) -> BackendResult<Option<String>> {
        let Some(path) = path else {
            return Ok(None);
        };
        let path = path
            .to_str()
            .ok_or_else(|| BackendError::message(format!("non UTF-8 path {}", path.display())))?;
        if self.prefix.is_empty() {
            return Ok(Some(path.to_owned()));
        }
        Ok(path
            .strip_prefix(self.prefix.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
            .map(str::to_owned))
    }

    fn repository_path(&self, path: &str) -> String {
        match (self.prefix.is_empty(), path.is_empty()) {
            (true, _) => path.to_owned(),
            (false, true) => self.prefix.clone(),
            (false, false) => format!("{}/{path}", self.prefix),
        }
    }

    fn root_of(&self, commit: &Commit<'_>) -> BackendResult<Utf8PathBuf> {
        let target = self.checkouts.join(commit.id().to_string());
        std::fs::create_dir_all(&target).map_err(|source| BackendError::Io {
            path: target.to_string(),
            source,
        })?;
        let mut checkout = CheckoutBuilder::new();
        checkout
            .target_dir(target.as_std_path())
            .update_index(false)
            .recreate_missing(true)
            .force();
        self.repo
            .checkout_tree(commit.as_object(), Some(&mut checkout))
            .map_err(BackendError::vcs)?;
        debug!(revision = %commit.id(), %target, "materialized checkout");
        Ok(self.below(&target))
    }

    fn below(&self, base: &Utf8Path) -> Utf8PathBuf {
        if self.prefix.is_empty() {
            base.to_owned()
        } else {
            base.join(&self.prefix)
        }
    }

    fn single_file_changes(
        &self,
        from: Option<&Tree<'_>>,
        to: &Tree<'_>,
    ) -> BackendResult<RawChanges> {
        let old = from.map(|tree| self.root_entry(tree)).transpose()?.flatten();
        let new = self.root_entry(to)?;
        let mut raw = RawChanges::default();
        match (old, new) {
            (None, Some(_)) => raw.added.push(String::new()),
            (Some(_), None) => raw.removed.push(String::new()),
            (Some(old), Some(new)) if old != new => raw.modified.push(String::new()),
            _ => {}
        }
        Ok(raw)
    }
}

impl VcsBackend for GitBackend {
    fn id(&self) -> &'static str {
        "git"
    }

    fn resolve_revision(&self, reference: &str) -> BackendResult<Option<String>> {
        match self.repo.revparse_single(reference) {
            Ok(object) => Ok(object
                .peel_to_commit()
                .ok()
                .map(|commit| commit.id().to_string())),
            Err(err)
                if matches!(
                    err.code(),
                    ErrorCode::NotFound | ErrorCode::InvalidSpec | ErrorCode::UnbornBranch
                ) =>
            {
                Ok(None)
            }
            Err(err) => Err(BackendError::vcs(err)),
        }
    }

    fn list_revisions(&self, interval: &Interval) -> BackendResult<Vec<String>> {
        let (tip, stop) = match interval {
            Interval::Revisions { from, to } => (
                Some(self.commit(to)?.id()),
                Some(self.commit(from)?.id()),
            ),
            Interval::All | Interval::Time { .. } => (self.head()?, None),
        };
        let Some(tip) = tip else {
            return Ok(Vec::new());
        };

        let mut ids = Vec::new();
        for commit in self.first_parent_chain(tip, stop)? {
            let listed = match interval {
                Interval::Revisions { .. } => {
                    commit.id() == tip
                        || Some(commit.id()) == stop
                        || self.touches_root(&commit)?
                }
                Interval::All => self.touches_root(&commit)?,
                Interval::Time { since, until } => {
                    let at = timestamp(&commit)?;
                    (*since..=*until).contains(&at) && self.touches_root(&commit)?
                }
            };
            if listed {
                ids.push(commit.id().to_string());
            }
            if Some(commit.id()) == stop {
                break;
            }
        }
        ids.reverse();

        debug!(revisions = ids.len(), "listed first-parent history");
        Ok(ids)
    }

    fn checkout(&self, revision: &str) -> BackendResult<Revision> {
        let commit = self.commit(revision)?;
        let author = commit.author();
        Ok(Revision {
            id: commit.id().to_string(),
            timestamp: timestamp(&commit)?,
            author: author
                .name()
                .map(|name| Signature::new(name, author.email())),
            message: commit.summary().map(str::to_owned),
            root: self.root_of(&commit)?,
        })
    }

    fn raw_changes(&self, from: Option<&str>, to: &str) -> BackendResult<RawChanges> {
        let to_tree = self.commit(to)?.tree().map_err(BackendError::vcs)?;
        let from_tree = from
            .map(|from| self.commit(from)?.tree().map_err(BackendError::vcs))
            .transpose()?;

        if self.single_file {
            return self.single_file_changes(from_tree.as_ref(), &to_tree);
        }

        let mut options = DiffOptions::new();
        if !self.prefix.is_empty() {
            options
                .pathspec(self.prefix.as_str())
                .disable_pathspec_match(true);
        }
        let mut diff = self
            .repo
            .diff_tree_to_tree(from_tree.as_ref(), Some(&to_tree), Some(&mut options))
            .map_err(BackendError::vcs)?;
        diff.find_similar(Some(DiffFindOptions::new().renames(true)))
            .map_err(BackendError::vcs)?;

        let mut raw = RawChanges::default();
        for delta in diff.deltas() {
            let old = self.relative(delta.old_file().path())?;
            let new = self.relative(delta.new_file().path())?;
            match (delta.status(), old, new) {
                (Delta::Added | Delta::Copied, _, Some(new)) => raw.added.push(new),
                (Delta::Deleted, Some(old), _) => raw.removed.push(old),
                (Delta::Modified | Delta::Typechange, Some(old), _) => raw.modified.push(old),
                (Delta::Renamed, Some(old), Some(new)) => raw.relocated.push((old, new)),
                (Delta::Renamed, None, Some(new)) => raw.added.push(new),
                (Delta::Renamed, Some(old), None) => raw.removed.push(old),
                _ => {}
            }
        }
        Ok(raw)
    }

    fn read_bytes(&self, path: &str, revision: &str) -> BackendResult<Vec<u8>> {
        if self.single_file && !path.is_empty() {
            return Err(BackendError::illegal_target(
                path,
                "single-file roots only contain the empty path",
            ));
        }

        let tree = self.commit(revision)?.tree().map_err(BackendError::vcs)?;
        let full = self.repository_path(path);
        let entry = match tree.get_path(Path::new(&full)) {
            Ok(entry) => entry,
            Err(err) if err.code() == ErrorCode::NotFound => {
                return Err(BackendError::illegal_target(
                    path,
                    format!("not present in {revision}"),
                ))
            }
            Err(err) => return Err(BackendError::vcs(err)),
        };
        let blob = entry
            .to_object(&self.repo)
            .and_then(|object| object.peel_to_blob())
            .map_err(|_| BackendError::illegal_target(path, "not a file"))?;
        Ok(blob.content().to_vec())
    }
}

fn entry_id(tree: &Tree<'_>, path: &str) -> BackendResult<Option<Oid>> {
    if path.is_empty() {
        return Ok(Some(tree.id()));
    }
    match tree.get_path(Path::new(path)) {
        Ok(entry) => Ok(Some(entry.id())),
        Err(err) if err.code() == ErrorCode::NotFound => Ok(None),
        Err(err) => Err(BackendError::vcs(err)),
    }
}

fn timestamp(commit: &Commit<'_>) -> BackendResult<DateTime<Utc>> {
    let seconds = commit.time().seconds();
    Utc.timestamp_opt(seconds, 0)
        .single()
        .ok_or_else(|| BackendError::message(format!("commit time {seconds} out of range")))
}

impl fmt::Debug for GitBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitBackend")
            .field("workdir", &self.workdir)
            .field("prefix", &self.prefix)
            .field("single_file", &self.single_file)
            .field("checkouts", &self.checkouts)
            .finish_non_exhaustive()
    }
}
