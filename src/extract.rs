//! Raw block extraction.

use crate::document::{strip_terminator, Document, LineRange, RangeError};

/// Extracted text of a located block, with layout metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub range: LineRange,
    /// Concatenated lines, terminators included
    pub text: String,
    pub line_count: usize,
    /// Indentation of the first line
    pub leading_whitespace: String,
    /// Whitespace suffix of the text, terminators included
    pub trailing_whitespace: String,
}

impl Block {
    pub fn is_empty(&self) -> bool {
        self.line_count == 0
    }
}

/// Join the lines covered by `range` without altering a single byte.
pub fn extract(document: &Document, range: LineRange) -> Result<String, RangeError> {
    Ok(document.slice(range)?.concat())
}

pub fn extract_block(document: &Document, range: LineRange) -> Result<Block, RangeError> {
    let lines = document.slice(range)?;
    let text = lines.concat();

    let leading_whitespace = lines
        .first()
        .map(|line| {
            let content = strip_terminator(line);
            let indent = content.len() - content.trim_start().len();
            content[..indent].to_string()
        })
        .unwrap_or_default();
    let trailing_whitespace = text[text.trim_end().len()..].to_string();

    Ok(Block {
        range,
        line_count: lines.len(),
        leading_whitespace,
        trailing_whitespace,
        text,
    })
}
