use crate::locate::Marker;
use crate::rewrite::{RewriteError, SubstitutionRule};
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;

#[derive(Debug, Deserialize, Default, Clone)]
pub struct PatchConfig {
    #[serde(default)]
    pub meta: Metadata,
    #[serde(default)]
    pub patches: Vec<PatchDefinition>,
}

impl PatchConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();

        if self.patches.is_empty() {
            issues.push(ValidationIssue::EmptyPatchList);
        }

        let mut seen = HashSet::new();
        for patch in &self.patches {
            let id = Some(patch.id.clone());

            if patch.id.trim().is_empty() {
                issues.push(ValidationIssue::MissingField {
                    patch_id: None,
                    field: "id",
                });
            } else if !seen.insert(patch.id.as_str()) {
                issues.push(ValidationIssue::InvalidCombo {
                    patch_id: id.clone(),
                    message: "duplicate patch id".to_string(),
                });
            }
            if patch.file.trim().is_empty() {
                issues.push(ValidationIssue::MissingField {
                    patch_id: id.clone(),
                    field: "file",
                });
            }

            // Donor: inline text or a selected block, never both
            match &patch.source.text {
                Some(_) => {
                    if patch.source.selector.is_set() {
                        issues.push(ValidationIssue::InvalidCombo {
                            patch_id: id.clone(),
                            message: "source.text cannot be combined with a block selector"
                                .to_string(),
                        });
                    }
                    if patch.source.file.is_some() {
                        issues.push(ValidationIssue::InvalidCombo {
                            patch_id: id.clone(),
                            message: "source.text cannot name a source file".to_string(),
                        });
                    }
                }
                None => {
                    patch
                        .source
                        .selector
                        .check(&id, "source.start", &mut issues);
                    if matches!(&patch.source.file, Some(file) if file.trim().is_empty()) {
                        issues.push(ValidationIssue::MissingField {
                            patch_id: id.clone(),
                            field: "source.file",
                        });
                    }
                }
            }

            patch
                .target
                .selector
                .check(&id, "target.start", &mut issues);
            if patch.target.mode != SpliceMode::Replace && patch.target.selector.body_only {
                issues.push(ValidationIssue::InvalidCombo {
                    patch_id: id.clone(),
                    message: format!("body_only is not supported with mode '{}'", patch.target.mode),
                });
            }

            for rule in &patch.rules {
                if rule.match_text().is_empty() {
                    issues.push(ValidationIssue::MissingField {
                        patch_id: id.clone(),
                        field: match rule {
                            RuleSpec::Literal { .. } => "rules.find",
                            RuleSpec::Pattern { .. } => "rules.pattern",
                        },
                    });
                } else if let Err(e) = rule.compile() {
                    issues.push(ValidationIssue::InvalidCombo {
                        patch_id: id.clone(),
                        message: e.to_string(),
                    });
                }
            }

            if let Some(Verify::Hash { expected, .. }) = &patch.verify {
                if parse_hash(expected).is_none() {
                    issues.push(ValidationIssue::InvalidCombo {
                        patch_id: id.clone(),
                        message: format!("invalid hash value: {expected}"),
                    });
                }
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct Metadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Resolve patch files against the workspace root instead of the cwd
    #[serde(default)]
    pub workspace_relative: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PatchDefinition {
    pub id: String,
    /// Destination document
    pub file: String,
    pub source: Source,
    #[serde(default)]
    pub rules: Vec<RuleSpec>,
    pub target: Target,
    #[serde(default)]
    pub verify: Option<Verify>,
    /// Convert donor terminators to the destination's convention
    #[serde(default)]
    pub normalize_line_endings: bool,
}

/// Where the replacement text comes from.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Source {
    /// Donor document; defaults to the destination document
    #[serde(default)]
    pub file: Option<String>,
    /// Inline replacement text
    #[serde(default)]
    pub text: Option<String>,
    #[serde(flatten)]
    pub selector: Selector,
}

/// Where the replacement goes.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Target {
    #[serde(flatten)]
    pub selector: Selector,
    #[serde(default)]
    pub mode: SpliceMode,
}

/// Block selection by markers or by explicit line numbers.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Selector {
    #[serde(default)]
    pub start: Option<MarkerSpec>,
    #[serde(default)]
    pub stop: Option<MarkerSpec>,
    /// 1-based inclusive `[first, last]`
    #[serde(default)]
    pub lines: Option<[usize; 2]>,
    /// Zero-based line the marker scan begins at
    #[serde(default)]
    pub from_line: usize,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub body_only: bool,
}

impl Selector {
    pub fn is_set(&self) -> bool {
        self.start.is_some() || self.stop.is_some() || self.lines.is_some()
    }

    fn check(
        &self,
        patch_id: &Option<String>,
        field: &'static str,
        issues: &mut Vec<ValidationIssue>,
    ) {
        let combo = |message: &str| ValidationIssue::InvalidCombo {
            patch_id: patch_id.clone(),
            message: format!("{}: {message}", field.trim_end_matches(".start")),
        };

        match (&self.start, &self.lines) {
            (None, None) => issues.push(ValidationIssue::MissingField {
                patch_id: patch_id.clone(),
                field,
            }),
            (Some(_), Some(_)) => issues.push(combo("start and lines are mutually exclusive")),
            (None, Some([first, last])) => {
                if *first == 0 || first > last {
                    issues.push(combo("lines must satisfy 1 <= first <= last"));
                }
                if self.stop.is_some() {
                    issues.push(combo("stop requires start"));
                }
                // Marker-scan options mean nothing for a fixed line span
                if self.from_line != 0 {
                    issues.push(combo("from_line requires start"));
                }
                if self.unique {
                    issues.push(combo("unique requires start"));
                }
                if self.body_only {
                    issues.push(combo("body_only requires start"));
                }
            }
            (Some(_), None) => {}
        }

        for marker in [&self.start, &self.stop].into_iter().flatten() {
            if marker.text().trim().is_empty() {
                issues.push(combo("markers cannot be empty"));
            } else if let Err(e) = marker.compile() {
                issues.push(combo(&format!("invalid marker pattern: {e}")));
            }
        }
    }
}

/// A line marker as written in a patch file: `{ literal = ".." }` or `{ pattern = ".." }`.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MarkerSpec {
    Literal(String),
    Pattern(String),
}

impl MarkerSpec {
    pub fn text(&self) -> &str {
        match self {
            MarkerSpec::Literal(text) | MarkerSpec::Pattern(text) => text,
        }
    }

    pub fn compile(&self) -> Result<Marker, regex::Error> {
        match self {
            MarkerSpec::Literal(text) => Ok(Marker::literal(text.clone())),
            MarkerSpec::Pattern(pattern) => Marker::pattern(pattern),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum RuleSpec {
    Literal {
        find: String,
        #[serde(default)]
        replace: String,
        #[serde(default)]
        required: bool,
    },
    Pattern {
        pattern: String,
        #[serde(default)]
        replace: String,
        #[serde(default)]
        required: bool,
    },
}

impl RuleSpec {
    fn match_text(&self) -> &str {
        match self {
            RuleSpec::Literal { find, .. } => find,
            RuleSpec::Pattern { pattern, .. } => pattern,
        }
    }

    pub fn compile(&self) -> Result<SubstitutionRule, RewriteError> {
        match self {
            RuleSpec::Literal {
                find,
                replace,
                required,
            } => Ok(SubstitutionRule::literal(find.clone(), replace.clone())?.set_required(*required)),
            RuleSpec::Pattern {
                pattern,
                replace,
                required,
            } => Ok(SubstitutionRule::pattern(pattern, replace.clone())?.set_required(*required)),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SpliceMode {
    /// Replace the selected range
    #[default]
    Replace,
    /// Insert directly before the selection
    InsertBefore,
    /// Insert directly after the selection
    InsertAfter,
}

impl fmt::Display for SpliceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SpliceMode::Replace => "replace",
            SpliceMode::InsertBefore => "insert-before",
            SpliceMode::InsertAfter => "insert-after",
        })
    }
}

/// Guard on the current destination text before it is replaced.
#[derive(Debug, Deserialize, Clone)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum Verify {
    ExactMatch {
        expected_text: String,
    },
    Hash {
        algorithm: Option<HashAlgorithm>,
        expected: String,
    },
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum HashAlgorithm {
    Xxh3,
}

/// Parse a hex xxh3 digest, with or without a `0x` prefix.
pub fn parse_hash(value: &str) -> Option<u64> {
    u64::from_str_radix(value.trim().trim_start_matches("0x"), 16).ok()
}

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, issue) in self.issues.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone)]
pub enum ValidationIssue {
    EmptyPatchList,
    MissingField {
        patch_id: Option<String>,
        field: &'static str,
    },
    InvalidCombo {
        patch_id: Option<String>,
        message: String,
    },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::EmptyPatchList => write!(f, "patch config contains no patches"),
            ValidationIssue::MissingField { patch_id, field } => match patch_id {
                Some(id) => write!(f, "patch '{id}' missing required field '{field}'"),
                None => write!(f, "patch missing required field '{field}'"),
            },
            ValidationIssue::InvalidCombo { patch_id, message } => match patch_id {
                Some(id) => write!(f, "patch '{id}' has invalid configuration: {message}"),
                None => write!(f, "invalid patch configuration: {message}"),
            },
        }
    }
}
