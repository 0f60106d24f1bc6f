//! Projection of source ranges through a line diff.
//!
//! A [`RangeMapper`] aligns the deletes and inserts of a [`LineDiff`] into
//! hunks once, then maps any number of ranges of the old file version. A
//! range either maps to exactly one location in the new version or is
//! destroyed; the mapper never guesses.

use crate::diff::LineDiff;
use crate::{Error, LineChange, LineChangeKind, Position, Range, Result, VcsFileRef};

/// What happened to one line of the old file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineFate<'a> {
    /// The line survived untouched at the given new line number.
    Kept(u32),
    /// The line was rewritten in place: deleted and paired with an insert.
    Edited {
        /// New line number of the replacement.
        line: u32,
        /// Old text of the line.
        old: &'a str,
        /// Replacement text.
        new: &'a str,
    },
    /// The line was deleted without replacement.
    Deleted,
}

/// Maximal run of deletes and inserts between two kept lines.
#[derive(Debug)]
struct Hunk<'a> {
    old_start: u32,
    new_start: u32,
    deleted: Vec<&'a str>,
    inserted: Vec<&'a str>,
    /// Cumulative line shift for old lines after this hunk.
    shift_after: i64,
}

impl Hunk<'_> {
    fn old_end(&self) -> u32 {
        self.old_start + count(self.deleted.len())
    }
}

/// Maps ranges of an old file version onto the new version.
#[derive(Debug)]
pub struct RangeMapper<'a> {
    hunks: Vec<Hunk<'a>>,
    old_line_count: u32,
    new_line_count: u32,
}

impl<'a> RangeMapper<'a> {
    /// Prepare a mapper for the given diff.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InconsistentDiff`] when the diff's changes do not fit
    /// its line counts.
    pub fn new(diff: &'a LineDiff) -> Result<Self> {
        Self::from_changes(diff.old_line_count, diff.new_line_count, &diff.changes)
    }

    /// Prepare a mapper from bare line changes and the two line counts.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InconsistentDiff`] when a line is changed twice, lies
    /// outside its file, or the number of kept lines differs between sides.
    pub fn from_changes(
        old_line_count: u32,
        new_line_count: u32,
        changes: &'a [LineChange],
    ) -> Result<Self> {
        let deletes = sorted_side(changes, LineChangeKind::Delete, old_line_count)?;
        let inserts = sorted_side(changes, LineChangeKind::Insert, new_line_count)?;

        let kept_old = i64::from(old_line_count) - signed(deletes.len());
        let kept_new = i64::from(new_line_count) - signed(inserts.len());
        if kept_old != kept_new {
            return Err(Error::InconsistentDiff {
                reason: format!("{kept_old} kept old lines but {kept_new} kept new lines"),
            });
        }

        let mut hunks = Vec::new();
        let (mut old, mut new) = (1u32, 1u32);
        let (mut d, mut n) = (0usize, 0usize);
        let mut shift = 0i64;

        // Kept lines advance both cursors in lock-step; jump straight to the
        // next change instead of visiting them one by one.
        while d < deletes.len() || n < inserts.len() {
            let gap = match (deletes.get(d), inserts.get(n)) {
                (Some(del), Some(ins)) => (del.line - old).min(ins.line - new),
                (Some(del), None) => del.line - old,
                (None, Some(ins)) => ins.line - new,
                (None, None) => break,
            };
            old += gap;
            new += gap;

            let mut hunk = Hunk {
                old_start: old,
                new_start: new,
                deleted: Vec::new(),
                inserted: Vec::new(),
                shift_after: 0,
            };
            loop {
                let mut progressed = false;
                while let Some(del) = deletes.get(d).copied().filter(|del| del.line == old) {
                    hunk.deleted.push(del.content.as_str());
                    d += 1;
                    old += 1;
                    progressed = true;
                }
                while let Some(ins) = inserts.get(n).copied().filter(|ins| ins.line == new) {
                    hunk.inserted.push(ins.content.as_str());
                    n += 1;
                    new += 1;
                    progressed = true;
                }
                if !progressed {
                    break;
                }
            }

            shift += signed(hunk.inserted.len()) - signed(hunk.deleted.len());
            hunk.shift_after = shift;
            hunks.push(hunk);
        }

        Ok(Self {
            hunks,
            old_line_count,
            new_line_count,
        })
    }

    /// Number of lines in the new file version.
    #[must_use]
    pub const fn new_line_count(&self) -> u32 {
        self.new_line_count
    }

    /// Determine the fate of a single old line.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRange`] when `line` is outside the old file.
    pub fn map_line(&self, line: u32) -> Result<LineFate<'a>> {
        if line == 0 || line > self.old_line_count {
            return Err(Error::invalid_range(format!(
                "line {line} is outside the old file (1..={})",
                self.old_line_count
            )));
        }

        let preceding = self.hunks.partition_point(|hunk| hunk.old_start <= line);
        let Some(hunk) = preceding.checked_sub(1).map(|index| &self.hunks[index]) else {
            return Ok(LineFate::Kept(line));
        };

        if line < hunk.old_end() {
            let slot = (line - hunk.old_start) as usize;
            return Ok(match hunk.inserted.get(slot) {
                Some(&new) => LineFate::Edited {
                    line: hunk.new_start + count(slot),
                    old: hunk.deleted[slot],
                    new,
                },
                None => LineFate::Deleted,
            });
        }

        let shifted = i64::from(line) + hunk.shift_after;
        Ok(LineFate::Kept(u32::try_from(shifted).map_err(|_| {
            Error::InconsistentDiff {
                reason: format!("line {line} shifts to {shifted}"),
            }
        })?))
    }

    /// Map `range` onto the new file version, re-targeting it to `file`.
    ///
    /// Returns `Ok(None)` when the range is destroyed: one of its lines was
    /// deleted without replacement, or an endpoint's text was rewritten and
    /// cannot be found again on the replacement line. When the old text
    /// occurs several times on the replacement line, the leftmost occurrence
    /// wins.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRange`] when the range is unordered, uses a
    /// zero line or column, or reaches outside the old file.
    pub fn apply(&self, range: &Range, file: &VcsFileRef) -> Result<Option<Range>> {
        validate(range)?;
        let (begin, end) = (range.begin, range.end);

        let begin_fate = self.map_line(begin.line)?;
        let end_fate = self.map_line(end.line)?;

        if self.destroys_interior(begin.line, end.line) {
            return Ok(None);
        }

        let mapped = if begin.line == end.line {
            match begin_fate {
                LineFate::Deleted => None,
                LineFate::Kept(line) => Some((
                    Position { line, ..begin },
                    Position { line, ..end },
                )),
                LineFate::Edited { line, old, new } => {
                    let covered = char_slice(old, begin.column, end.end_column())?;
                    find_column(new, covered).map(|column| {
                        (
                            Position {
                                line,
                                column,
                                ..begin
                            },
                            Position {
                                line,
                                column: column + (end.column - begin.column),
                                ..end
                            },
                        )
                    })
                }
            }
        } else {
            let mapped_begin = match begin_fate {
                LineFate::Deleted => None,
                LineFate::Kept(line) => Some(Position { line, ..begin }),
                LineFate::Edited { line, old, new } => {
                    let line_end = count(old.chars().count()) + 1;
                    let covered = char_slice(old, begin.column, line_end.max(begin.column))?;
                    find_column(new, covered).map(|column| Position {
                        line,
                        column,
                        ..begin
                    })
                }
            };
            let mapped_end = match end_fate {
                LineFate::Deleted => None,
                LineFate::Kept(line) => Some(Position { line, ..end }),
                LineFate::Edited { line, old, new } => {
                    let covered = char_slice(old, 1, end.end_column())?;
                    find_column(new, covered).map(|column| Position {
                        line,
                        column: column + end.column - 1,
                        ..end
                    })
                }
            };
            mapped_begin.zip(mapped_end)
        };

        Ok(mapped
            .filter(|(begin, end)| begin <= end)
            .map(|(begin, end)| Range::new(begin, end, file.clone())))
    }

    /// Whether a line strictly between `first` and `last` was deleted
    /// without replacement.
    fn destroys_interior(&self, first: u32, last: u32) -> bool {
        let start = self.hunks.partition_point(|hunk| hunk.old_end() <= first);
        self.hunks[start..]
            .iter()
            .take_while(|hunk| hunk.old_start < last)
            .any(|hunk| {
                (hunk.inserted.len()..hunk.deleted.len())
                    .map(|slot| hunk.old_start + count(slot))
                    .any(|line| line > first && line < last)
            })
    }
}

/// Map a single range through `diff`, re-targeting it to `file`.
///
/// # Errors
///
/// See [`RangeMapper::new`] and [`RangeMapper::apply`].
pub fn apply(range: &Range, diff: &LineDiff, file: &VcsFileRef) -> Result<Option<Range>> {
    RangeMapper::new(diff)?.apply(range, file)
}

fn sorted_side(
    changes: &[LineChange],
    kind: LineChangeKind,
    line_count: u32,
) -> Result<Vec<&LineChange>> {
    let mut side: Vec<&LineChange> = changes
        .iter()
        .filter(|change| change.kind == kind)
        .collect();
    side.sort_by_key(|change| change.line);

    for change in &side {
        if change.line == 0 || change.line > line_count {
            return Err(Error::InconsistentDiff {
                reason: format!(
                    "{kind:?} at line {} outside 1..={line_count}",
                    change.line
                ),
            });
        }
    }
    if let Some(pair) = side.windows(2).find(|pair| pair[0].line == pair[1].line) {
        return Err(Error::InconsistentDiff {
            reason: format!("{kind:?} at line {} appears twice", pair[0].line),
        });
    }

    Ok(side)
}

fn validate(range: &Range) -> Result<()> {
    let (begin, end) = (range.begin, range.end);
    if begin.line == 0 || end.line == 0 || begin.column == 0 || end.column == 0 {
        return Err(Error::invalid_range(format!(
            "positions are 1-based, got {}:{} .. {}:{}",
            begin.line, begin.column, end.line, end.column
        )));
    }
    if !range.is_ordered() {
        return Err(Error::invalid_range(format!(
            "begin {}:{} comes after end {}:{}",
            begin.line, begin.column, end.line, end.column
        )));
    }
    Ok(())
}

/// Characters in columns `from..to` (1-based, `to` exclusive) of `line`.
fn char_slice(line: &str, from: u32, to: u32) -> Result<&str> {
    let offset = |column: u32| {
        let skip = (column - 1) as usize;
        line.char_indices()
            .map(|(index, _)| index)
            .chain(std::iter::once(line.len()))
            .nth(skip)
    };

    match (offset(from), offset(to)) {
        (Some(start), Some(stop)) if start <= stop => Ok(&line[start..stop]),
        _ => Err(Error::invalid_range(format!(
            "columns {from}..{to} exceed line of {} characters",
            line.chars().count()
        ))),
    }
}

/// 1-based column of the leftmost occurrence of `needle` in `haystack`.
/// Empty text cannot be anchored.
fn find_column(haystack: &str, needle: &str) -> Option<u32> {
    if needle.is_empty() {
        return None;
    }
    haystack
        .find(needle)
        .map(|index| count(haystack[..index].chars().count()) + 1)
}

fn count(value: usize) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

fn signed(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
