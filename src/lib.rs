//! Block Splicer: marker-based block grafting for structured text files
//!
//! Locates a named block in one document, extracts it, rewrites literal or
//! pattern substrings, and splices the result into a located range of a
//! destination document, leaving every byte outside that range untouched.
//!
//! # Architecture
//!
//! The pipeline is four pure steps over an in-memory [`Document`]:
//!
//! 1. [`locate`]: two-marker scan yielding a half-open [`LineRange`]
//! 2. [`extract`]: raw slice of the range, terminators included
//! 3. [`rewrite`]: ordered [`SubstitutionRule`]s over the whole text
//! 4. [`splice`]: `lines[..start] + replacement + lines[end..]` as a new document
//!
//! [`config`] drives the pipeline from declarative TOML patch files and is
//! the only place that talks to [`storage`]. A destination is written once,
//! after its complete new document exists; any failure aborts before that.
//!
//! # Example
//!
//! ```
//! use block_splicer::{extract, locate, rewrite, splice, Document, Marker, SubstitutionRule};
//!
//! let doc = Document::parse("function A(app)\n  x=1;\nend\nfunction B(app)\n");
//! let range = locate(&doc, &Marker::literal("function A"), Some(&Marker::literal("function B")), 0)?;
//! let block = extract(&doc, range)?;
//! let rules = [SubstitutionRule::literal("x=1", "x=2")?];
//! let patched = splice(&doc, range, &rewrite(&block, &rules)?)?;
//!
//! assert_eq!(patched.to_text(), "function A(app)\n  x=2;\nend\nfunction B(app)\n");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod config;
pub mod document;
pub mod extract;
pub mod locate;
pub mod rewrite;
pub mod splice;
pub mod storage;

// Re-exports
pub use config::{
    apply_patches, check_patches, load_from_path, load_from_str, ConfigError, PatchConfig,
    PatchError, PatchStatus,
};
pub use document::{count_lines, Document, LineEnding, LineRange, RangeError};
pub use extract::{extract, extract_block, Block};
pub use locate::{locate, LocateError, Locator, Marker, Suggestion};
pub use rewrite::{rewrite, RewriteError, Rewriter, Rewritten, SubstitutionRule};
pub use splice::{splice, splice_with_stats, PatchResult};
pub use storage::{FsStorage, MemoryStorage, Overlay, Storage};
