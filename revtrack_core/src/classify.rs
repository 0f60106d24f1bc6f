use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use tracing::debug;

use crate::{Error, FileChange, RawChanges, Result, Revision, VcsFileRef};

/// Raw category a path was reported under, on one side of the step.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Reported {
    Added,
    Removed,
    Modified,
    RelocatedFrom(String),
    RelocatedTo(String),
}

impl Reported {
    const fn label(&self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Removed => "removed",
            Self::Modified => "modified",
            Self::RelocatedFrom(_) => "relocated from",
            Self::RelocatedTo(_) => "relocated to",
        }
    }
}

/// Builds the normalized [`FileChange`] list of one revision step.
#[derive(Debug, Clone, Copy)]
pub struct ChangeSetClassifier<'a> {
    backend: &'static str,
    predecessor: Option<&'a Revision>,
    revision: &'a Revision,
}

impl<'a> ChangeSetClassifier<'a> {
    /// Classifier for the step from `predecessor` (if any) to `revision`.
    /// `backend` names the feed's origin in error reports.
    #[must_use]
    pub const fn new(
        backend: &'static str,
        predecessor: Option<&'a Revision>,
        revision: &'a Revision,
    ) -> Self {
        Self {
            backend,
            predecessor,
            revision,
        }
    }

    /// Classify a raw change feed.
    ///
    /// The result is sorted by (old path presence, new path, old path) so
    /// identical feeds always produce identical lists.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IllegalReturn`] when a path is reported under two
    /// different categories, a relocation keeps its path, the root file is
    /// reported next to other paths, or the first step reports anything but
    /// additions.
    pub fn classify(&self, raw: RawChanges) -> Result<Vec<FileChange>> {
        let mut old_side = BTreeMap::new();
        let mut new_side = BTreeMap::new();
        let mut categories = BTreeMap::new();

        for path in raw.added {
            let path = normalize_path(&path);
            self.claim(&mut categories, &path, "added")?;
            self.record(&mut new_side, path, Reported::Added)?;
        }
        for path in raw.removed {
            let path = normalize_path(&path);
            self.claim(&mut categories, &path, "removed")?;
            self.record(&mut old_side, path, Reported::Removed)?;
        }
        for path in raw.modified {
            let path = normalize_path(&path);
            self.claim(&mut categories, &path, "modified")?;
            self.record(&mut old_side, path.clone(), Reported::Modified)?;
            self.record(&mut new_side, path, Reported::Modified)?;
        }
        for (from, to) in raw.relocated {
            let (from, to) = (normalize_path(&from), normalize_path(&to));
            if from == to {
                return Err(self.violation(format!("relocation of '{from}' keeps its path")));
            }
            self.claim(&mut categories, &from, "relocated")?;
            self.claim(&mut categories, &to, "relocated")?;
            self.record(&mut old_side, from.clone(), Reported::RelocatedFrom(to.clone()))?;
            self.record(&mut new_side, to, Reported::RelocatedTo(from))?;
        }

        for side in [&old_side, &new_side] {
            if side.contains_key("") && side.len() > 1 {
                return Err(self.violation("root file reported alongside other paths"));
            }
        }

        let mut changes = Vec::with_capacity(old_side.len() + new_side.len());
        for (path, reported) in &new_side {
            match reported {
                Reported::Added => changes.push(FileChange::Added {
                    new: file_ref(self.revision, path),
                }),
                Reported::Modified => changes.push(FileChange::Modified {
                    old: file_ref(self.predecessor()?, path),
                    new: file_ref(self.revision, path),
                }),
                Reported::RelocatedTo(from) => changes.push(FileChange::Relocated {
                    old: file_ref(self.predecessor()?, from),
                    new: file_ref(self.revision, path),
                }),
                Reported::Removed | Reported::RelocatedFrom(_) => {}
            }
        }
        for (path, reported) in &old_side {
            if *reported == Reported::Removed {
                changes.push(FileChange::Removed {
                    old: file_ref(self.predecessor()?, path),
                });
            }
        }

        changes.sort_by(|a, b| sort_key(a).cmp(&sort_key(b)));
        debug!(
            revision = %self.revision.id,
            changes = changes.len(),
            "classified change set"
        );
        Ok(changes)
    }

    /// Each path may appear under a single raw category, whichever side it
    /// is on.
    fn claim(
        &self,
        categories: &mut BTreeMap<String, &'static str>,
        path: &str,
        category: &'static str,
    ) -> Result<()> {
        match categories.entry(path.to_owned()) {
            Entry::Vacant(slot) => {
                slot.insert(category);
                Ok(())
            }
            Entry::Occupied(existing) if *existing.get() == category => Ok(()),
            Entry::Occupied(existing) => Err(self.violation(format!(
                "'{path}' reported as both {} and {category}",
                existing.get()
            ))),
        }
    }

    fn record(
        &self,
        side: &mut BTreeMap<String, Reported>,
        path: String,
        reported: Reported,
    ) -> Result<()> {
        match side.entry(path) {
            Entry::Vacant(slot) => {
                slot.insert(reported);
                Ok(())
            }
            Entry::Occupied(existing) if *existing.get() == reported => Ok(()),
            Entry::Occupied(existing) => Err(self.violation(format!(
                "'{}' reported as both {} and {}",
                existing.key(),
                existing.get().label(),
                reported.label()
            ))),
        }
    }

    fn predecessor(&self) -> Result<&'a Revision> {
        self.predecessor.ok_or_else(|| {
            self.violation(format!(
                "first revision {} reports changes to pre-existing files",
                self.revision.id
            ))
        })
    }

    fn violation(&self, reason: impl Into<String>) -> Error {
        Error::illegal_return(self.backend, reason)
    }
}

/// Reference to `path` inside the checkout of `revision`.
///
/// The empty path denotes the checkout root itself (single-file mode).
#[must_use]
pub fn file_ref(revision: &Revision, path: &str) -> VcsFileRef {
    let absolute_path = if path.is_empty() {
        revision.root.clone()
    } else {
        revision.root.join(path)
    };
    VcsFileRef::new(absolute_path, path, revision.id.clone())
}

/// Normalize a backend path to the forward-slash, root-relative form.
#[must_use]
pub fn normalize_path(path: &str) -> String {
    path.replace('\\', "/")
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}

fn sort_key(change: &FileChange) -> (bool, Option<&str>, Option<&str>) {
    let old = change.old_file().map(|file| file.relative_path.as_str());
    let new = change.new_file().map(|file| file.relative_path.as_str());
    (old.is_some(), new, old)
}

#[cfg(test)]
mod tests {
    use camino::Utf8PathBuf;
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::ChangeKind;

    fn revision(id: &str) -> Revision {
        Revision {
            id: id.into(),
            timestamp: Utc.timestamp_opt(0, 0).single().expect("epoch"),
            author: None,
            message: None,
            root: Utf8PathBuf::from(format!("/checkouts/{id}")),
        }
    }

    fn strings(paths: &[&str]) -> Vec<String> {
        paths.iter().map(|path| (*path).to_string()).collect()
    }

    fn summary(changes: &[FileChange]) -> Vec<(ChangeKind, String, String)> {
        changes
            .iter()
            .map(|change| {
                let path = |file: Option<&VcsFileRef>| {
                    file.map_or_else(String::new, |file| file.relative_path.clone())
                };
                (change.kind(), path(change.old_file()), path(change.new_file()))
            })
            .collect()
    }

    #[test]
    fn classifies_and_orders_deterministically() -> Result<()> {
        let (r1, r2) = (revision("r1"), revision("r2"));
        let raw = RawChanges {
            added: strings(&["src\\new.rs", "b.txt", "b.txt"]),
            removed: strings(&["gone.txt"]),
            modified: strings(&["./src/lib.rs"]),
            relocated: vec![("old/name.rs".into(), "a/name.rs".into())],
        };

        let changes = ChangeSetClassifier::new("test", Some(&r1), &r2).classify(raw)?;
        assert_eq!(
            summary(&changes),
            vec![
                (ChangeKind::Add, String::new(), "b.txt".into()),
                (ChangeKind::Add, String::new(), "src/new.rs".into()),
                (ChangeKind::Remove, "gone.txt".into(), String::new()),
                (ChangeKind::Relocate, "old/name.rs".into(), "a/name.rs".into()),
                (ChangeKind::Modify, "src/lib.rs".into(), "src/lib.rs".into()),
            ]
        );

        let relocated = &changes[3];
        assert_eq!(
            relocated.old_file().map(|file| file.absolute_path.clone()),
            Some(Utf8PathBuf::from("/checkouts/r1/old/name.rs"))
        );
        assert_eq!(
            relocated.new_file().map(|file| file.revision.as_str()),
            Some("r2")
        );
        Ok(())
    }

    #[test]
    fn order_ignores_feed_order() -> Result<()> {
        let (r1, r2) = (revision("r1"), revision("r2"));
        let forward = RawChanges {
            modified: strings(&["a", "b", "c"]),
            ..RawChanges::default()
        };
        let backward = RawChanges {
            modified: strings(&["c", "a", "b"]),
            ..RawChanges::default()
        };
        let classifier = ChangeSetClassifier::new("test", Some(&r1), &r2);
        assert_eq!(classifier.classify(forward)?, classifier.classify(backward)?);
        Ok(())
    }

    #[test]
    fn conflicting_categories_are_rejected() {
        let (r1, r2) = (revision("r1"), revision("r2"));
        let classifier = ChangeSetClassifier::new("test", Some(&r1), &r2);

        let modified_and_removed = RawChanges {
            removed: strings(&["x.rs"]),
            modified: strings(&["x.rs"]),
            ..RawChanges::default()
        };
        assert!(matches!(
            classifier.classify(modified_and_removed),
            Err(Error::IllegalReturn { .. })
        ));

        let added_and_removed = RawChanges {
            added: strings(&["x.rs"]),
            removed: strings(&["x.rs"]),
            ..RawChanges::default()
        };
        assert!(matches!(
            classifier.classify(added_and_removed),
            Err(Error::IllegalReturn { .. })
        ));

        let removed_and_relocated_to = RawChanges {
            removed: strings(&["b"]),
            relocated: vec![("a".into(), "b".into())],
            ..RawChanges::default()
        };
        assert!(matches!(
            classifier.classify(removed_and_relocated_to),
            Err(Error::IllegalReturn { .. })
        ));

        let relocated_twice = RawChanges {
            relocated: vec![("a".into(), "b".into()), ("a".into(), "c".into())],
            ..RawChanges::default()
        };
        assert!(matches!(
            classifier.classify(relocated_twice),
            Err(Error::IllegalReturn { .. })
        ));

        let relocated_in_place = RawChanges {
            relocated: vec![("a".into(), "./a".into())],
            ..RawChanges::default()
        };
        assert!(matches!(
            classifier.classify(relocated_in_place),
            Err(Error::IllegalReturn { .. })
        ));
    }

    #[test]
    fn relocation_endpoints_cannot_be_reported_again() {
        let (r1, r2) = (revision("r1"), revision("r2"));
        let classifier = ChangeSetClassifier::new("test", Some(&r1), &r2);

        let source_recreated = RawChanges {
            added: strings(&["a"]),
            relocated: vec![("a".into(), "b".into())],
            ..RawChanges::default()
        };
        assert!(matches!(
            classifier.classify(source_recreated),
            Err(Error::IllegalReturn { .. })
        ));

        let target_modified = RawChanges {
            modified: strings(&["b"]),
            relocated: vec![("a".into(), "b".into())],
            ..RawChanges::default()
        };
        assert!(matches!(
            classifier.classify(target_modified),
            Err(Error::IllegalReturn { .. })
        ));
    }

    #[test]
    fn relocation_chains_are_accepted() -> Result<()> {
        let (r1, r2) = (revision("r1"), revision("r2"));
        let raw = RawChanges {
            relocated: vec![("a".into(), "b".into()), ("b".into(), "c".into())],
            ..RawChanges::default()
        };
        let changes = ChangeSetClassifier::new("test", Some(&r1), &r2).classify(raw)?;
        assert_eq!(
            summary(&changes),
            vec![
                (ChangeKind::Relocate, "a".into(), "b".into()),
                (ChangeKind::Relocate, "b".into(), "c".into()),
            ]
        );
        Ok(())
    }

    #[test]
    fn first_step_only_adds() {
        let r1 = revision("r1");
        let raw = RawChanges {
            removed: strings(&["x"]),
            ..RawChanges::default()
        };
        assert!(matches!(
            ChangeSetClassifier::new("test", None, &r1).classify(raw),
            Err(Error::IllegalReturn { .. })
        ));
    }

    #[test]
    fn single_file_root_is_empty_path() -> Result<()> {
        let r1 = revision("r1");
        let raw = RawChanges {
            added: strings(&[""]),
            ..RawChanges::default()
        };
        let changes = ChangeSetClassifier::new("test", None, &r1).classify(raw)?;
        assert_eq!(changes.len(), 1);
        let added = changes[0].new_file().expect("added file");
        assert!(added.is_root_file());
        assert_eq!(added.absolute_path, r1.root);
        Ok(())
    }

    #[test]
    fn root_file_cannot_mix_with_paths() {
        let r1 = revision("r1");
        let raw = RawChanges {
            added: strings(&["", "other"]),
            ..RawChanges::default()
        };
        assert!(matches!(
            ChangeSetClassifier::new("test", None, &r1).classify(raw),
            Err(Error::IllegalReturn { .. })
        ));
    }

    #[test]
    fn normalizes_separators() {
        assert_eq!(normalize_path("a\\b//c/./d"), "a/b/c/d");
        assert_eq!(normalize_path("/abs/path/"), "abs/path");
        assert_eq!(normalize_path("./"), "");
    }
}
