use std::collections::HashSet;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::{Error, Interval, Result, VcsBackend};

/// Turns a user-facing history window into an ordered list of revision ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntervalResolver {
    interval: Interval,
}

impl IntervalResolver {
    /// Visit the entire history.
    #[must_use]
    pub const fn all() -> Self {
        Self {
            interval: Interval::All,
        }
    }

    /// Visit revisions recorded within `since..=until`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IllegalInterval`] when `since` is after `until`.
    pub fn between_times(since: DateTime<Utc>, until: DateTime<Utc>) -> Result<Self> {
        if since > until {
            return Err(Error::IllegalInterval {
                reason: format!("since {since} is after until {until}"),
            });
        }
        Ok(Self {
            interval: Interval::Time { since, until },
        })
    }

    /// Visit revisions from `from` to `to`, both inclusive.
    ///
    /// The order of the two references is only checked on resolution, since
    /// resolving branch names or tags needs the backend.
    pub fn between_revisions(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            interval: Interval::Revisions {
                from: from.into(),
                to: to.into(),
            },
        }
    }

    /// The window this resolver covers.
    #[must_use]
    pub const fn interval(&self) -> &Interval {
        &self.interval
    }

    /// List the revision ids of the window, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IllegalInterval`] when `from` does not precede `to`,
    /// [`Error::IllegalReturn`] when the backend lists a revision twice, and
    /// [`Error::Backend`] for backend failures.
    pub fn resolve<B: VcsBackend + ?Sized>(&self, backend: &B) -> Result<Vec<String>> {
        let ids = match &self.interval {
            Interval::All | Interval::Time { .. } => backend
                .list_revisions(&self.interval)
                .map_err(|source| Error::backend(backend.id(), source))?,
            Interval::Revisions { from, to } => {
                let (Some(from_id), Some(to_id)) = (
                    resolve_reference(backend, from)?,
                    resolve_reference(backend, to)?,
                ) else {
                    return Ok(Vec::new());
                };

                let ids = backend
                    .list_revisions(&Interval::Revisions {
                        from: from_id.clone(),
                        to: to_id.clone(),
                    })
                    .map_err(|source| Error::backend(backend.id(), source))?;

                if ids.first() != Some(&from_id) || ids.last() != Some(&to_id) {
                    return Err(Error::IllegalInterval {
                        reason: format!("revision {from} does not precede {to}"),
                    });
                }
                ids
            }
        };

        let mut seen = HashSet::with_capacity(ids.len());
        if let Some(duplicate) = ids.iter().find(|id| !seen.insert(id.as_str())) {
            return Err(Error::illegal_return(
                backend.id(),
                format!("revision {duplicate} listed twice"),
            ));
        }

        debug!(backend = backend.id(), revisions = ids.len(), "resolved interval");
        Ok(ids)
    }
}

fn resolve_reference<B: VcsBackend + ?Sized>(
    backend: &B,
    reference: &str,
) -> Result<Option<String>> {
    let resolved = backend
        .resolve_revision(reference)
        .map_err(|source| Error::backend(backend.id(), source))?;
    if resolved.is_none() {
        warn!(backend = backend.id(), reference, "reference does not resolve");
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use revtrack_api::{RawChanges, Revision};
    use revtrack_backend_api::{BackendError, BackendResult};

    use super::*;

    /// Linear history `r1..rN` with one revision per day.
    #[derive(Debug)]
    struct Linear {
        ids: Vec<String>,
        duplicate: bool,
    }

    impl Linear {
        fn new(count: usize) -> Self {
            Self {
                ids: (1..=count).map(|n| format!("r{n}")).collect(),
                duplicate: false,
            }
        }

        fn day(index: usize) -> DateTime<Utc> {
            let day = i64::try_from(index).expect("small index");
            Utc.timestamp_opt(day * 86_400, 0).single().expect("timestamp")
        }
    }

    impl VcsBackend for Linear {
        fn id(&self) -> &'static str {
            "linear"
        }

        fn resolve_revision(&self, reference: &str) -> BackendResult<Option<String>> {
            let resolved = if reference == "HEAD" {
                self.ids.last().cloned()
            } else {
                self.ids.iter().find(|id| *id == reference).cloned()
            };
            Ok(resolved)
        }

        fn list_revisions(&self, interval: &Interval) -> BackendResult<Vec<String>> {
            let mut ids: Vec<String> = match interval {
                Interval::All => self.ids.clone(),
                Interval::Time { since, until } => (0..self.ids.len())
                    .filter(|&index| (*since..=*until).contains(&Self::day(index)))
                    .map(|index| self.ids[index].clone())
                    .collect(),
                Interval::Revisions { from, to } => {
                    let start = self.ids.iter().position(|id| id == from).unwrap_or(0);
                    let stop = self.ids.iter().position(|id| id == to).unwrap_or(0);
                    self.ids
                        .get(start..=stop)
                        .map(<[String]>::to_vec)
                        .unwrap_or_default()
                }
            };
            if let Some(first) = ids.first().cloned().filter(|_| self.duplicate) {
                ids.push(first);
            }
            Ok(ids)
        }

        fn checkout(&self, revision: &str) -> BackendResult<Revision> {
            Err(BackendError::illegal_target(revision, "not used"))
        }

        fn raw_changes(&self, _from: Option<&str>, to: &str) -> BackendResult<RawChanges> {
            Err(BackendError::illegal_target(to, "not used"))
        }

        fn read_bytes(&self, path: &str, _revision: &str) -> BackendResult<Vec<u8>> {
            Err(BackendError::illegal_target(path, "not used"))
        }
    }

    #[test]
    fn reversed_time_window_fails_before_io() {
        let result = IntervalResolver::between_times(Linear::day(3), Linear::day(1));
        assert!(matches!(result, Err(Error::IllegalInterval { .. })));
    }

    #[test]
    fn degenerate_time_window_yields_one_revision() -> Result<()> {
        let backend = Linear::new(4);
        let resolver = IntervalResolver::between_times(Linear::day(2), Linear::day(2))?;
        assert_eq!(resolver.resolve(&backend)?, vec!["r3".to_string()]);

        let empty = IntervalResolver::between_times(Linear::day(9), Linear::day(9))?;
        assert!(empty.resolve(&backend)?.is_empty());
        Ok(())
    }

    #[test]
    fn revision_window_is_inclusive() -> Result<()> {
        let backend = Linear::new(5);
        let ids = IntervalResolver::between_revisions("r2", "HEAD").resolve(&backend)?;
        assert_eq!(ids, vec!["r2", "r3", "r4", "r5"]);
        Ok(())
    }

    #[test]
    fn degenerate_revision_window() -> Result<()> {
        let backend = Linear::new(3);
        let ids = IntervalResolver::between_revisions("r2", "r2").resolve(&backend)?;
        assert_eq!(ids, vec!["r2"]);

        let missing = IntervalResolver::between_revisions("r7", "r7").resolve(&backend)?;
        assert!(missing.is_empty());
        Ok(())
    }

    #[test]
    fn reversed_revision_window_fails_lazily() {
        let backend = Linear::new(3);
        let resolver = IntervalResolver::between_revisions("r3", "r1");
        assert!(matches!(
            resolver.resolve(&backend),
            Err(Error::IllegalInterval { .. })
        ));
    }

    #[test]
    fn duplicate_ids_are_a_contract_violation() {
        let backend = Linear {
            duplicate: true,
            ..Linear::new(2)
        };
        assert!(matches!(
            IntervalResolver::all().resolve(&backend),
            Err(Error::IllegalReturn { .. })
        ));
    }
}
