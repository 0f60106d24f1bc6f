use std::iter::FusedIterator;
use std::sync::Arc;

use tracing::debug;

use crate::cache::BoundedCache;
use crate::classify::ChangeSetClassifier;
use crate::config::EngineConfig;
use crate::diff::{DiffEngine, LineDiff};
use crate::interval::IntervalResolver;
use crate::mapping::RangeMapper;
use crate::{Error, FileChange, Range, Result, Revision, RevisionRange, VcsBackend, VcsFileRef};

/// Produces the [`RevisionRange`] steps of a history window.
///
/// The engine itself holds no per-pass state; every call to
/// [`RevisionEngine::revisions`] starts an independent pass over the backend.
#[derive(Debug)]
pub struct RevisionEngine<B> {
    backend: B,
    resolver: IntervalResolver,
    config: EngineConfig,
    differ: DiffEngine,
}

impl<B: VcsBackend> RevisionEngine<B> {
    /// Engine with the default configuration.
    pub fn new(backend: B, resolver: IntervalResolver) -> Self {
        Self::with_config(backend, resolver, EngineConfig::default())
    }

    /// Engine with an explicit configuration.
    pub fn with_config(backend: B, resolver: IntervalResolver, config: EngineConfig) -> Self {
        Self {
            differ: DiffEngine::from_config(&config),
            backend,
            resolver,
            config,
        }
    }

    /// The backend this engine mines.
    pub const fn backend(&self) -> &B {
        &self.backend
    }

    /// The history window this engine covers.
    pub const fn resolver(&self) -> &IntervalResolver {
        &self.resolver
    }

    /// Active configuration.
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Start a new pass over the window.
    ///
    /// Nothing touches the backend until the first step is pulled.
    pub fn revisions(&self) -> RevisionRanges<'_, B> {
        RevisionRanges {
            engine: self,
            ids: None,
            previous: None,
            checkouts: BoundedCache::new("checkouts", self.config.cache_capacity),
            contents: BoundedCache::new("contents", self.config.cache_capacity),
            finished: false,
        }
    }

    /// Line diff between the two sides of `change`, read without caching.
    ///
    /// An added file is compared against empty content, a removed file
    /// against empty new content.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Backend`] when a file cannot be read.
    pub fn line_diff(&self, change: &FileChange) -> Result<LineDiff> {
        self.diff_change(change, |file| self.read_file(file))
    }

    /// Locate `range` after `change`, reading contents without caching.
    ///
    /// `Ok(None)` means the range was destroyed, which includes every range
    /// of a removed file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RangeFileMismatch`] when the range does not belong to
    /// the old side of `change`, [`Error::InvalidRange`] for ranges outside
    /// the old content and [`Error::Backend`] for read failures.
    pub fn track(&self, range: &Range, change: &FileChange) -> Result<Option<Range>> {
        self.track_with(range, change, |file| self.read_file(file))
    }

    fn read_file(&self, file: &VcsFileRef) -> Result<Arc<[u8]>> {
        self.backend
            .read_bytes(&file.relative_path, &file.revision)
            .map(Arc::from)
            .map_err(|source| Error::backend(self.backend.id(), source))
    }

    fn diff_change<R>(&self, change: &FileChange, mut read: R) -> Result<LineDiff>
    where
        R: FnMut(&VcsFileRef) -> Result<Arc<[u8]>>,
    {
        let old = change.old_file().map(&mut read).transpose()?;
        let new = change.new_file().map(&mut read).transpose()?;
        Ok(self.differ.diff_bytes(
            old.as_deref().unwrap_or_default(),
            new.as_deref().unwrap_or_default(),
        ))
    }

    fn track_with<R>(&self, range: &Range, change: &FileChange, read: R) -> Result<Option<Range>>
    where
        R: FnMut(&VcsFileRef) -> Result<Arc<[u8]>>,
    {
        let Some(old) = change.old_file() else {
            return Err(Error::RangeFileMismatch {
                expected: describe(&range.file),
                found: "an added file".to_owned(),
            });
        };
        if old.relative_path != range.file.relative_path || old.revision != range.file.revision {
            return Err(Error::RangeFileMismatch {
                expected: describe(&range.file),
                found: describe(old),
            });
        }
        let Some(new) = change.new_file() else {
            debug!(file = %describe(old), "range dropped with removed file");
            return Ok(None);
        };

        let diff = self.diff_change(change, read)?;
        RangeMapper::new(&diff)?.apply(range, new)
    }
}

impl<'e, B: VcsBackend> IntoIterator for &'e RevisionEngine<B> {
    type Item = Result<RevisionRange>;
    type IntoIter = RevisionRanges<'e, B>;

    fn into_iter(self) -> Self::IntoIter {
        self.revisions()
    }
}

/// One lazy pass over the engine's window.
///
/// Owns the caches for checked-out revisions and file contents. Once the
/// window is exhausted or a step fails, the iterator only yields `None`.
#[derive(Debug)]
pub struct RevisionRanges<'e, B> {
    engine: &'e RevisionEngine<B>,
    ids: Option<std::vec::IntoIter<String>>,
    previous: Option<Revision>,
    checkouts: BoundedCache<String, Revision>,
    contents: BoundedCache<(String, String), Arc<[u8]>>,
    finished: bool,
}

impl<B: VcsBackend> RevisionRanges<'_, B> {
    /// Line diff between the two sides of `change`, reusing cached contents.
    ///
    /// # Errors
    ///
    /// See [`RevisionEngine::line_diff`].
    pub fn line_diff(&self, change: &FileChange) -> Result<LineDiff> {
        self.engine.diff_change(change, |file| self.read_file(file))
    }

    /// Locate `range` after `change`, reusing cached contents.
    ///
    /// # Errors
    ///
    /// See [`RevisionEngine::track`].
    pub fn track(&self, range: &Range, change: &FileChange) -> Result<Option<Range>> {
        self.engine
            .track_with(range, change, |file| self.read_file(file))
    }

    /// Check out `id`, reusing an earlier checkout of this pass.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Backend`] when the checkout fails and
    /// [`Error::IllegalReturn`] when the backend answers with another revision.
    pub fn checkout(&self, id: &str) -> Result<Revision> {
        let backend = &self.engine.backend;
        self.checkouts.get_or_try_insert_with(id.to_owned(), || {
            let revision = backend
                .checkout(id)
                .map_err(|source| Error::backend(backend.id(), source))?;
            if revision.id != id {
                return Err(Error::illegal_return(
                    backend.id(),
                    format!("checkout of {id} produced revision {}", revision.id),
                ));
            }
            Ok(revision)
        })
    }

    fn read_file(&self, file: &VcsFileRef) -> Result<Arc<[u8]>> {
        let key = (file.revision.clone(), file.relative_path.clone());
        self.contents
            .get_or_try_insert_with(key, || self.engine.read_file(file))
    }

    fn step(&mut self, id: &str) -> Result<RevisionRange> {
        let backend = &self.engine.backend;
        let revision = self.checkout(id)?;
        let raw = backend
            .raw_changes(self.previous.as_ref().map(|prev| prev.id.as_str()), id)
            .map_err(|source| Error::backend(backend.id(), source))?;
        let file_changes =
            ChangeSetClassifier::new(backend.id(), self.previous.as_ref(), &revision)
                .classify(raw)?;

        debug!(
            backend = backend.id(),
            revision = %revision.id,
            predecessor = self.previous.as_ref().map(|prev| prev.id.as_str()),
            changes = file_changes.len(),
            "produced revision step"
        );

        let predecessor = self.previous.replace(revision.clone());
        Ok(RevisionRange {
            revision,
            predecessor,
            file_changes,
        })
    }
}

impl<B: VcsBackend> Iterator for RevisionRanges<'_, B> {
    type Item = Result<RevisionRange>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        if self.ids.is_none() {
            match self.engine.resolver.resolve(&self.engine.backend) {
                Ok(ids) => self.ids = Some(ids.into_iter()),
                Err(err) => {
                    self.finished = true;
                    return Some(Err(err));
                }
            }
        }
        let Some(id) = self.ids.as_mut().and_then(Iterator::next) else {
            self.finished = true;
            return None;
        };

        let step = self.step(&id);
        if step.is_err() {
            self.finished = true;
        }
        Some(step)
    }
}

impl<B: VcsBackend> FusedIterator for RevisionRanges<'_, B> {}

fn describe(file: &VcsFileRef) -> String {
    format!("{}@{}", file.relative_path, file.revision)
}
