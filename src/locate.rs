//! Marker-based block location.
//!
//! A block is bounded by two markers: the first line matching the start
//! marker opens it, and the first later line matching the stop marker closes
//! it (exclusive). Without a stop marker the block runs to end of document.
//! A marker that matches nothing is a hard failure; the locator never guesses.

use crate::document::{strip_terminator, Document, LineRange};
use regex::Regex;
use std::fmt;
use thiserror::Error;

/// Similarity needed before a line is offered as a "did you mean" hint.
const SUGGESTION_THRESHOLD: f64 = 0.6;

/// Predicate over a single line, tested without its terminator.
#[derive(Debug, Clone)]
pub enum Marker {
    /// Line contains this exact substring
    Literal(String),
    /// Line matches this regular expression
    Pattern(Regex),
}

impl Marker {
    pub fn literal(text: impl Into<String>) -> Self {
        Marker::Literal(text.into())
    }

    pub fn pattern(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Marker::Pattern(Regex::new(pattern)?))
    }

    pub fn matches(&self, line: &str) -> bool {
        let content = strip_terminator(line);
        match self {
            Marker::Literal(text) => content.contains(text.as_str()),
            Marker::Pattern(regex) => regex.is_match(content),
        }
    }
}

impl From<&str> for Marker {
    fn from(text: &str) -> Self {
        Marker::literal(text)
    }
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Marker::Literal(text) => write!(f, "{text:?}"),
            Marker::Pattern(regex) => write!(f, "/{}/", regex.as_str()),
        }
    }
}

/// Closest line to a literal marker that matched nothing.
#[derive(Debug, Clone, PartialEq)]
pub struct Suggestion {
    /// Zero-based line index
    pub line: usize,
    pub text: String,
    pub similarity: f64,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LocateError {
    #[error("start marker {marker} matched no line at or after line {}{}", .from_line + 1, hint(.suggestion))]
    NotFound {
        marker: String,
        from_line: usize,
        suggestion: Option<Suggestion>,
    },

    #[error("stop marker {marker} matched no line after the block start at line {}", .start + 1)]
    StopNotFound { marker: String, start: usize },

    #[error("start marker {marker} is ambiguous: matched {} lines ({})", .lines.len(), line_list(.lines))]
    Ambiguous { marker: String, lines: Vec<usize> },

    #[error("scan offset {from_line} is past the end of a document of {len} lines")]
    OutOfBounds { from_line: usize, len: usize },
}

fn hint(suggestion: &Option<Suggestion>) -> String {
    match suggestion {
        Some(s) => format!(" (closest: line {}: {:?})", s.line + 1, s.text),
        None => String::new(),
    }
}

fn line_list(lines: &[usize]) -> String {
    lines
        .iter()
        .map(|idx| format!("line {}", idx + 1))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Configurable two-marker scan over a [`Document`].
#[derive(Debug, Clone)]
#[must_use = "Locator does nothing until locate() is called"]
pub struct Locator<'m> {
    start: &'m Marker,
    stop: Option<&'m Marker>,
    from_line: usize,
    unique: bool,
    body_only: bool,
}

impl<'m> Locator<'m> {
    pub fn new(start: &'m Marker) -> Self {
        Self {
            start,
            stop: None,
            from_line: 0,
            unique: false,
            body_only: false,
        }
    }

    /// Close the block at the first line after the start matching `stop`.
    pub fn stop(mut self, stop: &'m Marker) -> Self {
        self.stop = Some(stop);
        self
    }

    pub fn stop_opt(mut self, stop: Option<&'m Marker>) -> Self {
        self.stop = stop;
        self
    }

    /// Zero-based line to begin scanning from.
    pub fn from_line(mut self, from_line: usize) -> Self {
        self.from_line = from_line;
        self
    }

    /// Reject start markers that match more than one line.
    pub fn unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }

    /// Exclude the start line itself from the located range.
    pub fn body_only(mut self, body_only: bool) -> Self {
        self.body_only = body_only;
        self
    }

    pub fn locate(&self, document: &Document) -> Result<LineRange, LocateError> {
        let len = document.len();
        if self.from_line > len {
            return Err(LocateError::OutOfBounds {
                from_line: self.from_line,
                len,
            });
        }

        let lines = document.lines();
        let mut hits = lines
            .iter()
            .enumerate()
            .skip(self.from_line)
            .filter(|(_, line)| self.start.matches(line))
            .map(|(idx, _)| idx);

        let Some(start) = hits.next() else {
            return Err(LocateError::NotFound {
                marker: self.start.to_string(),
                from_line: self.from_line,
                suggestion: suggest(document, self.start, self.from_line),
            });
        };

        if self.unique {
            let others: Vec<usize> = hits.collect();
            if !others.is_empty() {
                return Err(LocateError::Ambiguous {
                    marker: self.start.to_string(),
                    lines: std::iter::once(start).chain(others).collect(),
                });
            }
        }

        let end = match self.stop {
            None => len,
            Some(stop) => lines
                .iter()
                .enumerate()
                .skip(start + 1)
                .find(|(_, line)| stop.matches(line))
                .map(|(idx, _)| idx)
                .ok_or_else(|| LocateError::StopNotFound {
                    marker: stop.to_string(),
                    start,
                })?,
        };

        let begin = if self.body_only { start + 1 } else { start };
        Ok(LineRange::new(begin, end))
    }
}

/// Locate a block: the first line at or after `from_line` matching `start`,
/// up to (not including) the next line matching `stop`, or to end of document.
pub fn locate(
    document: &Document,
    start: &Marker,
    stop: Option<&Marker>,
    from_line: usize,
) -> Result<LineRange, LocateError> {
    Locator::new(start)
        .stop_opt(stop)
        .from_line(from_line)
        .locate(document)
}

/// Find the line most similar to a literal marker, for error hints.
fn suggest(document: &Document, marker: &Marker, from_line: usize) -> Option<Suggestion> {
    let Marker::Literal(wanted) = marker else {
        return None;
    };
    let wanted = wanted.trim();

    document
        .lines()
        .iter()
        .enumerate()
        .skip(from_line)
        .map(|(idx, line)| {
            let text = strip_terminator(line).trim();
            (idx, text, strsim::normalized_levenshtein(wanted, text))
        })
        .filter(|(_, _, similarity)| *similarity >= SUGGESTION_THRESHOLD)
        .max_by(|a, b| a.2.total_cmp(&b.2))
        .map(|(line, text, similarity)| Suggestion {
            line,
            text: text.to_string(),
            similarity,
        })
}
