//! Line-range replacement.
//!
//! `splice` builds `lines[..start] + replacement + lines[end..]` as a new
//! [`Document`]; the input is never mutated, so a splice can be previewed or
//! retried freely. Lines outside the range are carried over byte-for-byte.

use crate::document::{split_lines, Document, LineRange, RangeError};

/// Spliced document plus line bookkeeping for reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "PatchResult holds the new document"]
pub struct PatchResult {
    pub document: Document,
    pub lines_removed: usize,
    pub lines_inserted: usize,
}

/// Replace the lines covered by `range` with `replacement`.
pub fn splice(
    document: &Document,
    range: LineRange,
    replacement: &str,
) -> Result<Document, RangeError> {
    splice_with_stats(document, range, replacement).map(|result| result.document)
}

pub fn splice_with_stats(
    document: &Document,
    range: LineRange,
    replacement: &str,
) -> Result<PatchResult, RangeError> {
    range.validate(document.len())?;

    let lines = document.lines();
    let ending = document.line_ending().as_str();
    let mut inserted = split_lines(replacement);

    let mut spliced = Vec::with_capacity(lines.len() - range.len() + inserted.len());
    spliced.extend_from_slice(&lines[..range.start]);

    if !inserted.is_empty() {
        // Appending after an unterminated final line: terminate it so the
        // two lines do not merge.
        if let Some(previous) = spliced.last_mut() {
            if !previous.ends_with('\n') {
                previous.push_str(ending);
            }
        }
        // A dangling replacement line only stays unterminated at end of file.
        if range.end < lines.len() {
            if let Some(last) = inserted.last_mut() {
                if !last.ends_with('\n') {
                    last.push_str(ending);
                }
            }
        }
    }

    let lines_inserted = inserted.len();
    spliced.extend(inserted);
    spliced.extend_from_slice(&lines[range.end..]);

    Ok(PatchResult {
        document: Document::with_ending(spliced, document.line_ending()),
        lines_removed: range.len(),
        lines_inserted,
    })
}
