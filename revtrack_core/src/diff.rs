//! Line-level diff adapter producing [`LineChange`] records.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use similar::{Algorithm, ChangeTag, DiffableStr, TextDiff};
use tracing::{debug, warn};

use crate::charset;
use crate::config::EngineConfig;
use crate::{Error, LineChange, LineChangeKind, Result};

/// Ordered line operations turning one file content into another.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineDiff {
    /// Number of lines in the old content.
    pub old_line_count: u32,
    /// Number of lines in the new content.
    pub new_line_count: u32,
    /// Deletes and inserts in diff order.
    #[serde(default)]
    pub changes: Vec<LineChange>,
}

impl LineDiff {
    /// Returns `true` when old and new content have identical lines.
    #[must_use]
    pub fn is_unchanged(&self) -> bool {
        self.changes.is_empty()
    }

    /// Number of inserted lines.
    #[must_use]
    pub fn insertions(&self) -> usize {
        self.count(LineChangeKind::Insert)
    }

    /// Number of deleted lines.
    #[must_use]
    pub fn deletions(&self) -> usize {
        self.count(LineChangeKind::Delete)
    }

    fn count(&self, kind: LineChangeKind) -> usize {
        self.changes.iter().filter(|change| change.kind == kind).count()
    }

    /// Apply the changes to `old_lines`, producing the new line sequence.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InconsistentDiff`] when the changes do not describe an
    /// edit of `old_lines`.
    pub fn replay<S: AsRef<str>>(&self, old_lines: &[S]) -> Result<Vec<String>> {
        if old_lines.len() != self.old_line_count as usize {
            return Err(inconsistent(format!(
                "expected {} old lines, got {}",
                self.old_line_count,
                old_lines.len()
            )));
        }

        let mut deleted = BTreeSet::new();
        let mut inserted = BTreeMap::new();
        for change in &self.changes {
            let fresh = match change.kind {
                LineChangeKind::Delete => deleted.insert(change.line),
                LineChangeKind::Insert => inserted
                    .insert(change.line, change.content.as_str())
                    .is_none(),
            };
            if !fresh {
                return Err(inconsistent(format!(
                    "line {} is changed twice",
                    change.line
                )));
            }
        }

        let mut kept = old_lines
            .iter()
            .zip(1u32..)
            .filter(|(_, number)| !deleted.contains(number))
            .map(|(line, _)| line.as_ref());

        let mut lines = Vec::with_capacity(self.new_line_count as usize);
        for number in 1..=self.new_line_count {
            let line = match inserted.get(&number) {
                Some(content) => *content,
                None => kept
                    .next()
                    .ok_or_else(|| inconsistent("old content exhausted before new content"))?,
            };
            lines.push(line.to_owned());
        }

        if kept.next().is_some() {
            return Err(inconsistent("old lines left over after replay"));
        }

        Ok(lines)
    }
}

/// Entry point for line diff generation.
#[derive(Debug, Clone, Default)]
pub struct DiffEngine {
    timeout: Option<Duration>,
}

impl DiffEngine {
    /// Construct a diff engine without a timeout.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Construct a diff engine honouring the configured timeout.
    #[must_use]
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            timeout: config.diff_timeout(),
        }
    }

    /// Diff two raw file contents.
    ///
    /// Each side is decoded with its own guessed charset. When either side
    /// fails to decode, both are compared as raw byte lines instead.
    #[must_use]
    pub fn diff_bytes(&self, old: &[u8], new: &[u8]) -> LineDiff {
        match (charset::decode(old), charset::decode(new)) {
            (Some(old), Some(new)) => self.diff_text(&old, &new),
            (old_text, new_text) => {
                warn!(
                    old_decoded = old_text.is_some(),
                    new_decoded = new_text.is_some(),
                    "content is not decodable, falling back to byte lines"
                );
                let mut config = TextDiff::configure();
                config.algorithm(Algorithm::Myers);
                if let Some(timeout) = self.timeout {
                    config.timeout(timeout);
                }
                collect(&config.diff_lines(old, new))
            }
        }
    }

    /// Diff two decoded file contents.
    #[must_use]
    pub fn diff_text(&self, old: &str, new: &str) -> LineDiff {
        let mut config = TextDiff::configure();
        config.algorithm(Algorithm::Myers);
        if let Some(timeout) = self.timeout {
            config.timeout(timeout);
        }
        let diff = collect(&config.diff_lines(old, new));
        debug!(
            old_lines = diff.old_line_count,
            new_lines = diff.new_line_count,
            changes = diff.changes.len(),
            "computed line diff"
        );
        diff
    }
}

fn collect<'a, T: DiffableStr + ?Sized>(diff: &TextDiff<'a, 'a, '_, T>) -> LineDiff {
    let mut changes = Vec::new();
    for change in diff.iter_all_changes() {
        let (kind, index) = match change.tag() {
            ChangeTag::Equal => continue,
            ChangeTag::Delete => (LineChangeKind::Delete, change.old_index()),
            ChangeTag::Insert => (LineChangeKind::Insert, change.new_index()),
        };
        let Some(index) = index else {
            continue;
        };
        let content = change.to_string_lossy();
        changes.push(LineChange {
            kind,
            line: line_number(index + 1),
            content: strip_terminator(&content).to_owned(),
        });
    }

    LineDiff {
        old_line_count: line_number(diff.old_slices().len()),
        new_line_count: line_number(diff.new_slices().len()),
        changes,
    }
}

fn line_number(value: usize) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

fn strip_terminator(line: &str) -> &str {
    line.strip_suffix('\n')
        .map_or(line, |rest| rest.strip_suffix('\r').unwrap_or(rest))
}

fn inconsistent(reason: impl Into<String>) -> Error {
    Error::InconsistentDiff {
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(text: &str) -> Vec<&str> {
        text.lines().collect()
    }

    #[test]
    fn replacement_is_delete_plus_insert() {
        let diff = DiffEngine::new().diff_text("a\nb\nc\n", "a\nx\nc\n");
        assert_eq!(diff.old_line_count, 3);
        assert_eq!(diff.new_line_count, 3);
        assert_eq!(
            diff.changes,
            vec![LineChange::delete(2, "b"), LineChange::insert(2, "x")]
        );
    }

    #[test]
    fn identical_content_has_no_changes() {
        let diff = DiffEngine::new().diff_text("same\n", "same\n");
        assert!(diff.is_unchanged());
        assert_eq!(diff.insertions(), 0);
        assert_eq!(diff.deletions(), 0);
    }

    #[test]
    fn crlf_terminators_are_stripped() {
        let diff = DiffEngine::new().diff_text("a\r\nb\r\n", "a\r\n");
        assert_eq!(diff.changes, vec![LineChange::delete(2, "b")]);
    }

    #[test]
    fn replay_reproduces_new_content() -> Result<()> {
        let old = "fn a() {}\nfn b() {}\n\nfn c() {}\nfn d() {}\n";
        let new = "fn z() {}\nfn a() {}\n\nfn c() { todo }\nfn d() {}\nfn e() {}\n";
        let diff = DiffEngine::new().diff_text(old, new);
        assert_eq!(diff.replay(&lines(old))?, lines(new));
        Ok(())
    }

    #[test]
    fn replay_reproduces_edge_contents() -> Result<()> {
        let cases = [
            ("", "first\nsecond\n"),
            ("first\nsecond\n", ""),
            ("a\nb", "a\nb\n"),
            ("a\nb\n", "a\nc"),
            ("a\r\nb\r\n", "a\r\nx\r\nb\r\n"),
            ("a\r\nb\r\n", "a\nb\n"),
            ("\n\n", "\nx\n\n"),
            ("same\n", "same\n"),
        ];
        for (old, new) in cases {
            let diff = DiffEngine::new().diff_text(old, new);
            assert_eq!(diff.old_line_count as usize, lines(old).len(), "{old:?}");
            assert_eq!(diff.new_line_count as usize, lines(new).len(), "{new:?}");
            assert_eq!(diff.replay(&lines(old))?, lines(new), "{old:?} -> {new:?}");
        }
        Ok(())
    }

    #[test]
    fn replay_rejects_wrong_base() {
        let diff = DiffEngine::new().diff_text("a\nb\n", "a\n");
        assert!(matches!(
            diff.replay(&["only"]),
            Err(Error::InconsistentDiff { .. })
        ));
    }

    #[test]
    fn charsets_are_decoded_independently() {
        let old = b"alpha\nbeta\n".to_vec();
        let mut new = vec![0xFF, 0xFE];
        for unit in "alpha\ngamma\n".encode_utf16() {
            new.extend_from_slice(&unit.to_le_bytes());
        }

        let diff = DiffEngine::new().diff_bytes(&old, &new);
        assert_eq!(
            diff.changes,
            vec![LineChange::delete(2, "beta"), LineChange::insert(2, "gamma")]
        );
    }

    #[test]
    fn undecodable_content_degrades_to_byte_lines() {
        let old = b"keep\n\xC3\x28 broken\n".to_vec();
        let new = b"keep\nfixed\n".to_vec();

        let diff = DiffEngine::new().diff_bytes(&old, &new);
        assert_eq!(diff.old_line_count, 2);
        assert_eq!(diff.new_line_count, 2);
        assert_eq!(diff.deletions(), 1);
        assert_eq!(diff.changes[1], LineChange::insert(2, "fixed"));
    }

    #[test]
    fn timeout_is_taken_from_config() {
        let config = EngineConfig {
            diff_timeout_ms: Some(5),
            ..EngineConfig::default()
        };
        let engine = DiffEngine::from_config(&config);
        assert_eq!(engine.timeout, Some(Duration::from_millis(5)));
        let diff = engine.diff_text("a\n", "b\n");
        assert_eq!(diff.changes.len(), 2);
    }
}
