pub mod applicator;
pub mod loader;
pub mod schema;

pub use applicator::{
    apply_patches, check_patches, commit, plan_patch, resolve_path, run_patches, PatchError,
    PatchStatus, PlannedPatch, Stage,
};
pub use loader::{discover_patch_files, load_from_path, load_from_str, ConfigError};
pub use schema::{
    HashAlgorithm, MarkerSpec, Metadata, PatchConfig, PatchDefinition, RuleSpec, Selector,
    Source, SpliceMode, Target, ValidationError, ValidationIssue, Verify,
};
