//! Ordered text substitution.
//!
//! Rules run in declaration order over the whole text, each rule seeing the
//! output of the previous one. Two rules whose matches overlap therefore do
//! not commute: `a -> b` then `b -> c` turns `a` into `c`, the reverse order
//! leaves `b`. Matches may span line boundaries.

use regex::Regex;
use std::fmt;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum RewriteError {
    #[error("literal substitution rule has an empty match string")]
    EmptyLiteral,

    #[error("invalid substitution pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("required substitution rule #{} ({rule}) matched nothing", .index + 1)]
    Unmatched { index: usize, rule: String },
}

#[derive(Debug, Clone)]
enum RuleMatcher {
    Literal(String),
    Pattern(Regex),
}

/// A single `(match, replacement)` pair.
#[derive(Debug, Clone)]
pub struct SubstitutionRule {
    matcher: RuleMatcher,
    replace: String,
    required: bool,
}

impl SubstitutionRule {
    /// Replace every non-overlapping occurrence of `find`, leftmost first.
    pub fn literal(
        find: impl Into<String>,
        replace: impl Into<String>,
    ) -> Result<Self, RewriteError> {
        let find = find.into();
        if find.is_empty() {
            return Err(RewriteError::EmptyLiteral);
        }
        Ok(Self {
            matcher: RuleMatcher::Literal(find),
            replace: replace.into(),
            required: false,
        })
    }

    /// Replace every match of `pattern`; `replace` may use `$1` or `${name}`.
    pub fn pattern(pattern: &str, replace: impl Into<String>) -> Result<Self, RewriteError> {
        let regex = Regex::new(pattern).map_err(|source| RewriteError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })?;
        Ok(Self {
            matcher: RuleMatcher::Pattern(regex),
            replace: replace.into(),
            required: false,
        })
    }

    /// Fail the rewrite when this rule matches nothing.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn set_required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    /// Whether the replacement can itself be matched again by this rule,
    /// making repeated application non-idempotent.
    ///
    /// A pattern whose replacement re-emits a capture group is treated as
    /// self-matching: the expanded output usually contains the match again.
    pub fn is_self_matching(&self) -> bool {
        match &self.matcher {
            RuleMatcher::Literal(find) => self.replace.contains(find.as_str()),
            RuleMatcher::Pattern(regex) => {
                has_capture_ref(&self.replace) || regex.is_match(&self.replace)
            }
        }
    }

    /// Apply the rule, returning the new text and the number of matches.
    pub fn apply(&self, text: &str) -> (String, usize) {
        match &self.matcher {
            RuleMatcher::Literal(find) => {
                let count = text.matches(find.as_str()).count();
                if count == 0 {
                    return (text.to_string(), 0);
                }
                (text.replace(find.as_str(), &self.replace), count)
            }
            RuleMatcher::Pattern(regex) => {
                let count = regex.find_iter(text).count();
                if count == 0 {
                    return (text.to_string(), 0);
                }
                (
                    regex.replace_all(text, self.replace.as_str()).into_owned(),
                    count,
                )
            }
        }
    }
}

impl fmt::Display for SubstitutionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.matcher {
            RuleMatcher::Literal(find) => write!(f, "{:?} -> {:?}", find, self.replace),
            RuleMatcher::Pattern(regex) => write!(f, "/{}/ -> {:?}", regex.as_str(), self.replace),
        }
    }
}

/// Output of a rewrite, with per-rule match counts in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rewritten {
    pub text: String,
    pub counts: Vec<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct Rewriter {
    rules: Vec<SubstitutionRule>,
}

impl Rewriter {
    pub fn new(rules: Vec<SubstitutionRule>) -> Self {
        for rule in rules.iter().filter(|rule| rule.is_self_matching()) {
            warn!(%rule, "substitution output matches its own input; reapplying is not idempotent");
        }
        Self { rules }
    }

    pub fn rewrite(&self, text: &str) -> Result<Rewritten, RewriteError> {
        let mut current = text.to_string();
        let mut counts = Vec::with_capacity(self.rules.len());

        for (index, rule) in self.rules.iter().enumerate() {
            let (next, count) = rule.apply(&current);
            debug!(index, %rule, count, "applied substitution rule");
            if count == 0 && rule.required {
                return Err(RewriteError::Unmatched {
                    index,
                    rule: rule.to_string(),
                });
            }
            counts.push(count);
            current = next;
        }

        Ok(Rewritten {
            text: current,
            counts,
        })
    }
}

/// `$1`, `$name` or `${name}` in a replacement template; `$$` is a literal `$`.
fn has_capture_ref(template: &str) -> bool {
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '$' {
            continue;
        }
        match chars.peek() {
            Some('$') => {
                chars.next();
            }
            Some(next) if *next == '{' || *next == '_' || next.is_ascii_alphanumeric() => {
                return true;
            }
            _ => {}
        }
    }
    false
}

/// Apply `rules` in order to the whole of `text`.
pub fn rewrite(text: &str, rules: &[SubstitutionRule]) -> Result<String, RewriteError> {
    Rewriter::new(rules.to_vec())
        .rewrite(text)
        .map(|rewritten| rewritten.text)
}
