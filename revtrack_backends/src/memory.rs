//! Scripted in-memory history.

use std::collections::{BTreeMap, BTreeSet};

use camino::Utf8PathBuf;
use chrono::{DateTime, Utc};
use revtrack_api::{Interval, RawChanges, Revision, Signature};
use revtrack_backend_api::{BackendError, BackendResult, VcsBackend};

/// Complete file set of one scripted revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    id: String,
    timestamp: DateTime<Utc>,
    author: Option<Signature>,
    message: Option<String>,
    files: BTreeMap<String, Vec<u8>>,
    relocations: Vec<(String, String)>,
    raw: Option<RawChanges>,
}

impl Snapshot {
    /// Empty revision `id` recorded at `timestamp`.
    pub fn new(id: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            timestamp,
            author: None,
            message: None,
            files: BTreeMap::new(),
            relocations: Vec::new(),
            raw: None,
        }
    }

    /// Copy of `self` as revision `id`, keeping its files.
    #[must_use]
    pub fn followed_by(&self, id: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            files: self.files.clone(),
            ..Self::new(id, timestamp)
        }
    }

    /// Set the author.
    #[must_use]
    pub fn author(mut self, author: Signature) -> Self {
        self.author = Some(author);
        self
    }

    /// Set the message summary.
    #[must_use]
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Add or replace a file. The empty path makes the root a single file.
    #[must_use]
    pub fn file(mut self, path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        self.files.insert(path.into(), content.into());
        self
    }

    /// Drop a file.
    #[must_use]
    pub fn without(mut self, path: &str) -> Self {
        self.files.remove(path);
        self
    }

    /// Move a file, reporting the move as a relocation rather than a
    /// removal plus an addition.
    #[must_use]
    pub fn relocate(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        let (from, to) = (from.into(), to.into());
        if let Some(content) = self.files.remove(&from) {
            self.files.insert(to.clone(), content);
        }
        self.relocations.push((from, to));
        self
    }

    /// Report `raw` verbatim instead of comparing against the predecessor.
    #[must_use]
    pub fn raw_changes(mut self, raw: RawChanges) -> Self {
        self.raw = Some(raw);
        self
    }
}

/// Backend serving a scripted list of [`Snapshot`]s, oldest first.
///
/// Ids are served exactly as scripted, duplicates included.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    root: Utf8PathBuf,
    snapshots: Vec<Snapshot>,
}

impl MemoryBackend {
    /// Backend whose revisions are rooted at `<root>/<id>`.
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self {
            root: root.into(),
            snapshots: Vec::new(),
        }
    }

    /// Append a revision.
    #[must_use]
    pub fn with_snapshot(mut self, snapshot: Snapshot) -> Self {
        self.snapshots.push(snapshot);
        self
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.snapshots.iter().position(|snapshot| snapshot.id == id)
    }

    fn snapshot(&self, id: &str) -> BackendResult<&Snapshot> {
        self.position(id)
            .map(|index| &self.snapshots[index])
            .ok_or_else(|| BackendError::illegal_target(id, "unknown revision"))
    }
}

impl VcsBackend for MemoryBackend {
    fn id(&self) -> &'static str {
        "memory"
    }

    fn resolve_revision(&self, reference: &str) -> BackendResult<Option<String>> {
        let snapshot = if reference == "HEAD" {
            self.snapshots.last()
        } else {
            self.position(reference).map(|index| &self.snapshots[index])
        };
        Ok(snapshot.map(|snapshot| snapshot.id.clone()))
    }

    fn list_revisions(&self, interval: &Interval) -> BackendResult<Vec<String>> {
        let ids = match interval {
            Interval::All => self.snapshots.iter().map(|s| s.id.clone()).collect(),
            Interval::Time { since, until } => self
                .snapshots
                .iter()
                .filter(|snapshot| (*since..=*until).contains(&snapshot.timestamp))
                .map(|snapshot| snapshot.id.clone())
                .collect(),
            Interval::Revisions { from, to } => match (self.position(from), self.position(to)) {
                (Some(start), Some(stop)) if start <= stop => self.snapshots[start..=stop]
                    .iter()
                    .map(|snapshot| snapshot.id.clone())
                    .collect(),
                _ => Vec::new(),
            },
        };
        Ok(ids)
    }

    fn checkout(&self, revision: &str) -> BackendResult<Revision> {
        let snapshot = self.snapshot(revision)?;
        Ok(Revision {
            id: snapshot.id.clone(),
            timestamp: snapshot.timestamp,
            author: snapshot.author.clone(),
            message: snapshot.message.clone(),
            root: self.root.join(&snapshot.id),
        })
    }

    fn raw_changes(&self, from: Option<&str>, to: &str) -> BackendResult<RawChanges> {
        let current = self.snapshot(to)?;
        if let Some(raw) = &current.raw {
            return Ok(raw.clone());
        }

        let empty = BTreeMap::new();
        let previous = match from {
            Some(from) => &self.snapshot(from)?.files,
            None => &empty,
        };

        let mut removed: BTreeSet<&String> = previous
            .keys()
            .filter(|path| !current.files.contains_key(*path))
            .collect();
        let mut added: BTreeSet<&String> = current
            .files
            .keys()
            .filter(|path| !previous.contains_key(*path))
            .collect();

        let mut raw = RawChanges::default();
        for (old, new) in &current.relocations {
            if removed.contains(old) && added.contains(new) {
                removed.remove(old);
                added.remove(new);
                raw.relocated.push((old.clone(), new.clone()));
            }
        }
        raw.added = added.into_iter().cloned().collect();
        raw.removed = removed.into_iter().cloned().collect();
        raw.modified = current
            .files
            .iter()
            .filter(|(path, content)| {
                previous
                    .get(*path)
                    .is_some_and(|before| before != *content)
            })
            .map(|(path, _)| path.clone())
            .collect();
        Ok(raw)
    }

    fn read_bytes(&self, path: &str, revision: &str) -> BackendResult<Vec<u8>> {
        self.snapshot(revision)?
            .files
            .get(path)
            .cloned()
            .ok_or_else(|| BackendError::illegal_target(path, format!("not present in {revision}")))
    }
}
