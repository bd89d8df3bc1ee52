//! In-memory line model of a text file.
//!
//! A [`Document`] is an ordered list of lines where every line keeps its own
//! terminator (`"\n"` or `"\r\n"`). Only the final line may be unterminated.
//! Concatenating the lines reproduces the original bytes exactly, which is
//! what lets an identity splice round-trip a file byte-for-byte.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Line terminator convention of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineEnding {
    #[default]
    Lf,
    CrLf,
}

impl LineEnding {
    pub fn as_str(self) -> &'static str {
        match self {
            LineEnding::Lf => "\n",
            LineEnding::CrLf => "\r\n",
        }
    }

    /// Detect the convention from the first terminated line, defaulting to LF.
    pub fn detect(text: &str) -> Self {
        match text.find('\n') {
            Some(idx) if idx > 0 && text.as_bytes()[idx - 1] == b'\r' => LineEnding::CrLf,
            _ => LineEnding::Lf,
        }
    }
}

/// Half-open span `[start, end)` of zero-based line indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct LineRange {
    pub start: usize,
    pub end: usize,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid line range [{start}, {end}) in document of {len} lines")]
pub struct RangeError {
    pub start: usize,
    pub end: usize,
    pub len: usize,
}

impl LineRange {
    /// Build a range without checking it against any document.
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Build a range, enforcing `start <= end <= len`.
    pub fn checked(start: usize, end: usize, len: usize) -> Result<Self, RangeError> {
        let range = Self { start, end };
        range.validate(len)?;
        Ok(range)
    }

    /// Empty range positioned before line `at`.
    pub fn empty_at(at: usize) -> Self {
        Self { start: at, end: at }
    }

    pub fn validate(&self, len: usize) -> Result<(), RangeError> {
        if self.start > self.end || self.end > len {
            return Err(RangeError {
                start: self.start,
                end: self.end,
                len,
            });
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Display for LineRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Document {
    lines: Vec<String>,
    ending: LineEnding,
}

impl Document {
    /// Split `text` into terminator-preserving lines.
    pub fn parse(text: &str) -> Self {
        Self {
            lines: split_lines(text),
            ending: LineEnding::detect(text),
        }
    }

    /// Build a document from lines that already carry their terminators.
    pub fn from_lines(lines: Vec<String>) -> Self {
        let ending = lines
            .iter()
            .find(|line| line.ends_with('\n'))
            .map(|line| LineEnding::detect(line))
            .unwrap_or_default();
        Self { lines, ending }
    }

    /// Build a derived document that keeps an existing line convention.
    pub(crate) fn with_ending(lines: Vec<String>, ending: LineEnding) -> Self {
        Self { lines, ending }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn into_lines(self) -> Vec<String> {
        self.lines
    }

    pub fn line(&self, idx: usize) -> Option<&str> {
        self.lines.get(idx).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn line_ending(&self) -> LineEnding {
        self.ending
    }

    /// Lines covered by `range`.
    pub fn slice(&self, range: LineRange) -> Result<&[String], RangeError> {
        range.validate(self.len())?;
        Ok(&self.lines[range.start..range.end])
    }

    /// Whether the final line carries a terminator (vacuously true when empty).
    pub fn ends_with_terminator(&self) -> bool {
        self.lines.last().map_or(true, |line| line.ends_with('\n'))
    }

    /// Rewrite every terminator in `text` to this document's convention.
    pub fn normalize_line_endings(&self, text: &str) -> String {
        let ending = self.ending.as_str();
        split_lines(text)
            .into_iter()
            .map(|line| {
                if line.ends_with('\n') {
                    format!("{}{}", strip_terminator(&line), ending)
                } else {
                    line
                }
            })
            .collect()
    }

    /// Concatenate all lines back into the original byte stream.
    pub fn to_text(&self) -> String {
        self.lines.concat()
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in &self.lines {
            f.write_str(line)?;
        }
        Ok(())
    }
}

/// Split text into lines, each keeping its `\n` or `\r\n` terminator.
pub fn split_lines(text: &str) -> Vec<String> {
    text.split_inclusive('\n').map(str::to_string).collect()
}

/// Number of lines `text` would occupy in a document.
pub fn count_lines(text: &str) -> usize {
    text.split_inclusive('\n').count()
}

/// Line content without its terminator.
pub fn strip_terminator(line: &str) -> &str {
    line.strip_suffix('\n')
        .map(|rest| rest.strip_suffix('\r').unwrap_or(rest))
        .unwrap_or(line)
}
