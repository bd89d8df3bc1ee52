//! Patch applicator - runs the locate / extract / rewrite / splice pipeline
//!
//! Each patch definition is one pipeline run:
//! - read the destination (and donor, if any) fresh from storage
//! - locate and extract the donor block, or take inline text
//! - rewrite it with the patch's ordered rules
//! - locate the destination range and splice
//! - hand storage the complete new document, only once it fully exists
//!
//! Any failure aborts that patch before its write. Patches run in
//! declaration order, so later patches see the results of earlier ones.

use crate::config::schema::{
    parse_hash, PatchConfig, PatchDefinition, Selector, SpliceMode, Verify,
};
use crate::document::{count_lines, Document, LineRange, RangeError};
use crate::extract::extract;
use crate::locate::{LocateError, Locator};
use crate::rewrite::{RewriteError, Rewriter, SubstitutionRule};
use crate::splice::{splice_with_stats, PatchResult};
use crate::storage::{Overlay, Storage};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use xxhash_rust::xxh3::xxh3_64;

/// Which document a pipeline step was working on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// The donor document the block is extracted from
    Source,
    /// The destination document the block is grafted into
    Target,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Source => "source",
            Stage::Target => "target",
        })
    }
}

/// Outcome of a single patch
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "PatchStatus should be checked"]
pub enum PatchStatus {
    /// Destination was rewritten (or would be, in a dry run)
    Applied {
        file: PathBuf,
        lines_removed: usize,
        lines_inserted: usize,
    },
    /// Destination already holds the replacement at the target position
    AlreadyApplied { file: PathBuf },
}

impl fmt::Display for PatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatchStatus::Applied {
                file,
                lines_removed,
                lines_inserted,
            } => write!(
                f,
                "Applied to {} (-{} +{} lines)",
                file.display(),
                lines_removed,
                lines_inserted
            ),
            PatchStatus::AlreadyApplied { file } => {
                write!(f, "Already applied to {}", file.display())
            }
        }
    }
}

/// Errors that abort a patch before anything is written
#[derive(Debug)]
pub enum PatchError {
    /// Reading or writing a document failed
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    /// A marker pattern failed to compile
    Marker {
        stage: Stage,
        file: PathBuf,
        source: regex::Error,
    },
    /// A marker matched nothing, matched ambiguously, or scanned out of bounds
    Locate {
        stage: Stage,
        file: PathBuf,
        source: LocateError,
    },
    /// A computed range does not fit the document
    Range {
        stage: Stage,
        file: PathBuf,
        source: RangeError,
    },
    /// A substitution rule was invalid or required but unmatched
    Rewrite { file: PathBuf, source: RewriteError },
    /// The destination block differs from what the patch expects to replace
    VerificationFailed {
        file: PathBuf,
        range: LineRange,
        expected: String,
        found: String,
    },
    /// An in-place rewrite would change its own output again on every run
    NotIdempotent { file: PathBuf, range: LineRange },
}

impl fmt::Display for PatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatchError::Io { path, source } => {
                write!(f, "I/O error on {}: {}", path.display(), source)
            }
            PatchError::Marker {
                stage,
                file,
                source,
            } => write!(
                f,
                "invalid {} marker for {}: {}",
                stage,
                file.display(),
                source
            ),
            PatchError::Locate {
                stage,
                file,
                source,
            } => write!(f, "{} block not found in {}: {}", stage, file.display(), source),
            PatchError::Range {
                stage,
                file,
                source,
            } => write!(f, "{} range error in {}: {}", stage, file.display(), source),
            PatchError::Rewrite { file, source } => {
                write!(f, "rewrite failed for {}: {}", file.display(), source)
            }
            PatchError::VerificationFailed {
                file,
                range,
                expected,
                found,
            } => write!(
                f,
                "target lines {} of {} failed verification (expected {}, found {})",
                range,
                file.display(),
                expected,
                found
            ),
            PatchError::NotIdempotent { file, range } => write!(
                f,
                "rewriting lines {} of {} in place changes its own output; \
                 add a verify guard or use an insert mode",
                range,
                file.display()
            ),
        }
    }
}

impl std::error::Error for PatchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PatchError::Io { source, .. } => Some(source),
            PatchError::Marker { source, .. } => Some(source),
            PatchError::Locate { source, .. } => Some(source),
            PatchError::Range { source, .. } => Some(source),
            PatchError::Rewrite { source, .. } => Some(source),
            PatchError::VerificationFailed { .. } | PatchError::NotIdempotent { .. } => None,
        }
    }
}

/// A fully computed patch, not yet written.
#[derive(Debug, Clone)]
pub struct PlannedPatch {
    pub id: String,
    pub file: PathBuf,
    /// Destination text as read from storage
    pub original: String,
    /// Range of the destination that is replaced
    pub range: LineRange,
    /// `None` when the destination already holds the replacement
    pub result: Option<PatchResult>,
}

impl PlannedPatch {
    pub fn status(&self) -> PatchStatus {
        match &self.result {
            Some(result) => PatchStatus::Applied {
                file: self.file.clone(),
                lines_removed: result.lines_removed,
                lines_inserted: result.lines_inserted,
            },
            None => PatchStatus::AlreadyApplied {
                file: self.file.clone(),
            },
        }
    }

    /// Destination text after the patch.
    pub fn patched(&self) -> String {
        match &self.result {
            Some(result) => result.document.to_text(),
            None => self.original.clone(),
        }
    }
}

/// Resolve a patch file path against the workspace when requested.
pub fn resolve_path(workspace_root: &Path, workspace_relative: bool, file: &str) -> PathBuf {
    if workspace_relative {
        workspace_root.join(file)
    } else {
        PathBuf::from(file)
    }
}

/// Apply every patch in order, writing each destination once its new
/// document has been fully built.
pub fn apply_patches(
    config: &PatchConfig,
    workspace_root: &Path,
    storage: &dyn Storage,
) -> Vec<(String, Result<PatchStatus, PatchError>)> {
    run_patches(config, workspace_root, storage)
        .into_iter()
        .map(|(id, planned)| (id, planned.map(|p| p.status())))
        .collect()
}

/// Report what `apply_patches` would do without writing anything.
///
/// Writes are captured in an [`Overlay`], so `Applied` means "would apply"
/// and later patches still see earlier ones.
pub fn check_patches(
    config: &PatchConfig,
    workspace_root: &Path,
    storage: &dyn Storage,
) -> Vec<(String, Result<PatchStatus, PatchError>)> {
    let overlay = Overlay::new(storage);
    apply_patches(config, workspace_root, &overlay)
}

/// Plan and commit each patch, keeping the planned documents for reporting.
pub fn run_patches(
    config: &PatchConfig,
    workspace_root: &Path,
    storage: &dyn Storage,
) -> Vec<(String, Result<PlannedPatch, PatchError>)> {
    config
        .patches
        .iter()
        .map(|patch| {
            let outcome = plan_patch(
                patch,
                workspace_root,
                config.meta.workspace_relative,
                storage,
            )
            .and_then(|planned| commit(planned, storage));
            if let Err(e) = &outcome {
                warn!(patch = %patch.id, error = %e, "patch aborted");
            }
            (patch.id.clone(), outcome)
        })
        .collect()
}

/// Write a planned patch; already-applied patches are not written.
pub fn commit(planned: PlannedPatch, storage: &dyn Storage) -> Result<PlannedPatch, PatchError> {
    if let Some(result) = &planned.result {
        storage
            .write(&planned.file, &result.document.to_text())
            .map_err(|source| PatchError::Io {
                path: planned.file.clone(),
                source,
            })?;
        info!(
            patch = %planned.id,
            file = %planned.file.display(),
            removed = result.lines_removed,
            inserted = result.lines_inserted,
            "patch applied"
        );
    } else {
        info!(patch = %planned.id, file = %planned.file.display(), "patch already applied");
    }
    Ok(planned)
}

/// Run one patch pipeline up to, but not including, the write.
pub fn plan_patch(
    patch: &PatchDefinition,
    workspace_root: &Path,
    workspace_relative: bool,
    storage: &dyn Storage,
) -> Result<PlannedPatch, PatchError> {
    let file = resolve_path(workspace_root, workspace_relative, &patch.file);
    let original = read(storage, &file)?;
    let destination = Document::parse(&original);

    // 1. Donor text: inline, or a block located in the donor document.
    // `in_place` holds the donor range when it was read from the destination.
    let mut in_place = None;
    let donor_text = match &patch.source.text {
        Some(text) => text.clone(),
        None => {
            let donor_file = patch
                .source
                .file
                .as_deref()
                .map(|f| resolve_path(workspace_root, workspace_relative, f))
                .unwrap_or_else(|| file.clone());
            let donor = if donor_file == file {
                destination.clone()
            } else {
                Document::parse(&read(storage, &donor_file)?)
            };
            let range = select(&patch.source.selector, &donor, false, Stage::Source, &donor_file)?;
            debug!(patch = %patch.id, file = %donor_file.display(), %range, "located source block");
            if donor_file == file {
                in_place = Some(range);
            }
            extract(&donor, range).map_err(|source| PatchError::Range {
                stage: Stage::Source,
                file: donor_file.clone(),
                source,
            })?
        }
    };

    // 2. Rewrite
    let rules = patch
        .rules
        .iter()
        .map(|rule| rule.compile())
        .collect::<Result<Vec<SubstitutionRule>, _>>()
        .map_err(|source| PatchError::Rewrite {
            file: file.clone(),
            source,
        })?;
    let rewriter = Rewriter::new(rules);
    let rewritten = rewriter
        .rewrite(&donor_text)
        .map_err(|source| PatchError::Rewrite {
            file: file.clone(),
            source,
        })?;
    // A second pass that changes nothing means re-runs are harmless
    let settles = in_place.is_none()
        || rewriter
            .rewrite(&rewritten.text)
            .map_or(true, |again| again.text == rewritten.text);
    let text = if patch.normalize_line_endings {
        destination.normalize_line_endings(&rewritten.text)
    } else {
        rewritten.text
    };

    // 3. Destination range, located fresh against the destination itself
    let insert = patch.target.mode != SpliceMode::Replace;
    let anchor = select(&patch.target.selector, &destination, insert, Stage::Target, &file)?;
    let range = match patch.target.mode {
        SpliceMode::Replace => anchor,
        SpliceMode::InsertBefore => LineRange::empty_at(anchor.start),
        SpliceMode::InsertAfter => LineRange::empty_at(anchor.end),
    };
    debug!(patch = %patch.id, file = %file.display(), %range, mode = %patch.target.mode, "located target range");

    if already_present(&destination, range, patch.target.mode, &text) {
        return Ok(PlannedPatch {
            id: patch.id.clone(),
            file,
            original,
            range,
            result: None,
        });
    }

    // A block rewritten onto itself is read back patched on the next run.
    // Unless the rules reach a fixed point, only a guard stops a second pass.
    if let Some(donor_range) = in_place {
        if !settles && patch.verify.is_none() && overlaps(donor_range, range) {
            warn!(patch = %patch.id, file = %file.display(), %range, "in-place rewrite is not idempotent");
            return Err(PatchError::NotIdempotent { file, range });
        }
    }

    // 4. Guard the text about to be replaced (or the insertion anchor)
    if let Some(verify) = &patch.verify {
        let guarded = if insert { anchor } else { range };
        let current = extract(&destination, guarded).map_err(|source| PatchError::Range {
            stage: Stage::Target,
            file: file.clone(),
            source,
        })?;
        verify_text(verify, &current, &file, guarded)?;
    }

    // 5. Splice into a new document
    let result =
        splice_with_stats(&destination, range, &text).map_err(|source| PatchError::Range {
            stage: Stage::Target,
            file: file.clone(),
            source,
        })?;

    Ok(PlannedPatch {
        id: patch.id.clone(),
        file,
        original,
        range,
        result: Some(result),
    })
}

fn read(storage: &dyn Storage, path: &Path) -> Result<String, PatchError> {
    storage.read(path).map_err(|source| PatchError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Resolve a selector to a range of `document`.
///
/// With `anchor_only`, a start marker without a stop selects just its own
/// line instead of running to end of document.
fn select(
    selector: &Selector,
    document: &Document,
    anchor_only: bool,
    stage: Stage,
    file: &Path,
) -> Result<LineRange, PatchError> {
    if let Some([first, last]) = selector.lines {
        return LineRange::checked(first.saturating_sub(1), last, document.len()).map_err(
            |source| PatchError::Range {
                stage,
                file: file.to_path_buf(),
                source,
            },
        );
    }

    let compile = |spec: &crate::config::schema::MarkerSpec| {
        spec.compile().map_err(|source| PatchError::Marker {
            stage,
            file: file.to_path_buf(),
            source,
        })
    };
    let start = match &selector.start {
        Some(spec) => compile(spec)?,
        None => {
            return Err(PatchError::Range {
                stage,
                file: file.to_path_buf(),
                source: RangeError {
                    start: 0,
                    end: 0,
                    len: document.len(),
                },
            })
        }
    };
    let stop = selector.stop.as_ref().map(compile).transpose()?;

    let range = Locator::new(&start)
        .stop_opt(stop.as_ref())
        .from_line(selector.from_line)
        .unique(selector.unique)
        .body_only(selector.body_only)
        .locate(document)
        .map_err(|source| PatchError::Locate {
            stage,
            file: file.to_path_buf(),
            source,
        })?;

    if anchor_only && stop.is_none() {
        return Ok(LineRange::new(range.start, range.start + 1));
    }
    Ok(range)
}

fn overlaps(a: LineRange, b: LineRange) -> bool {
    a == b || (a.start < b.end && b.start < a.end)
}

/// Whether the destination already holds `text` where the splice would put it.
fn already_present(document: &Document, range: LineRange, mode: SpliceMode, text: &str) -> bool {
    let ending = document.line_ending().as_str();
    let same = |candidate: LineRange| match extract(document, candidate) {
        Ok(existing) => {
            existing == text
                || (!text.is_empty()
                    && !text.ends_with('\n')
                    && existing.strip_suffix(ending) == Some(text))
        }
        Err(_) => false,
    };

    let n = count_lines(text);
    match mode {
        SpliceMode::Replace => same(range),
        SpliceMode::InsertBefore => {
            n == 0 || (range.start >= n && same(LineRange::new(range.start - n, range.start)))
        }
        SpliceMode::InsertAfter => n == 0 || same(LineRange::new(range.end, range.end + n)),
    }
}

fn verify_text(
    verify: &Verify,
    current: &str,
    file: &Path,
    range: LineRange,
) -> Result<(), PatchError> {
    let failed = |expected: String, found: String| PatchError::VerificationFailed {
        file: file.to_path_buf(),
        range,
        expected,
        found,
    };

    match verify {
        Verify::ExactMatch { expected_text } => {
            if current != expected_text {
                return Err(failed(
                    format!("{expected_text:?}"),
                    format!("{current:?}"),
                ));
            }
        }
        Verify::Hash { expected, .. } => {
            let actual = xxh3_64(current.as_bytes());
            match parse_hash(expected) {
                Some(hash) if hash == actual => {}
                _ => return Err(failed(expected.clone(), format!("{actual:#x}"))),
            }
        }
    }
    Ok(())
}
