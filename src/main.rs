use anyhow::{Context, Result};
use block_splicer::config::{
    discover_patch_files, load_from_path, run_patches, PatchError, PatchStatus, PlannedPatch,
};
use block_splicer::{
    extract, Document, FsStorage, LineRange, LocateError, Locator, Marker, Overlay, Storage,
};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use serde::Serialize;
use similar::{ChangeTag, TextDiff};
use std::env;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "block-splicer")]
#[command(about = "Locate, rewrite and splice named blocks between text files", long_about = None)]
#[command(version)]
struct Cli {
    /// Log pipeline steps (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply patch files to a workspace
    Apply {
        /// Workspace root (defaults to BLOCK_SPLICER_WORKSPACE, then the cwd)
        #[arg(short, long)]
        workspace: Option<PathBuf>,

        /// Specific patch file to apply (otherwise applies all in patches/)
        #[arg(short, long)]
        patches: Option<PathBuf>,

        /// Dry run - show what would be changed without modifying files
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Show unified diff of changes
        #[arg(short, long)]
        diff: bool,
    },

    /// Report which patches are applied without modifying files
    Check {
        /// Workspace root (defaults to BLOCK_SPLICER_WORKSPACE, then the cwd)
        #[arg(short, long)]
        workspace: Option<PathBuf>,

        /// Specific patch file to check (otherwise checks all in patches/)
        #[arg(short, long)]
        patches: Option<PathBuf>,
    },

    /// Print the line range of a block
    Locate {
        #[command(flatten)]
        block: BlockArgs,

        /// Reject a start marker that matches more than one line
        #[arg(long)]
        unique: bool,

        /// Emit the range as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the raw text of a block
    Extract {
        #[command(flatten)]
        block: BlockArgs,
    },
}

#[derive(Args)]
struct BlockArgs {
    /// Document to search
    file: PathBuf,

    /// Start marker (first matching line opens the block)
    #[arg(short, long)]
    start: String,

    /// Stop marker (first later matching line closes the block, exclusive)
    #[arg(short = 'e', long)]
    stop: Option<String>,

    /// Treat markers as regular expressions instead of literal substrings
    #[arg(long)]
    pattern: bool,

    /// Zero-based line to start scanning from
    #[arg(long, default_value_t = 0)]
    from_line: usize,

    /// Exclude the start line from the block
    #[arg(long)]
    body_only: bool,
}

#[derive(Serialize)]
struct LocateReport<'a> {
    file: &'a Path,
    range: LineRange,
    line_count: usize,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Apply {
            workspace,
            patches,
            dry_run,
            diff,
        } => cmd_apply(workspace, patches, dry_run, diff),

        Commands::Check { workspace, patches } => cmd_check(workspace, patches),

        Commands::Locate {
            block,
            unique,
            json,
        } => cmd_locate(&block, unique, json),

        Commands::Extract { block } => cmd_extract(&block),
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    // A second init (e.g. under a test harness) is harmless
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .try_init();
}

/// Resolve workspace path
///
/// Priority order:
/// 1. Explicit --workspace flag
/// 2. BLOCK_SPLICER_WORKSPACE environment variable
/// 3. Current directory
fn resolve_workspace(cli_workspace: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(path) = cli_workspace {
        return path
            .canonicalize()
            .with_context(|| format!("workspace not found: {}", path.display()));
    }

    if let Ok(env_path) = env::var("BLOCK_SPLICER_WORKSPACE") {
        let path = PathBuf::from(&env_path);
        if path.exists() {
            return Ok(path.canonicalize()?);
        }
        eprintln!(
            "{}",
            format!(
                "Warning: BLOCK_SPLICER_WORKSPACE is set but path doesn't exist: {}",
                env_path
            )
            .yellow()
        );
    }

    Ok(env::current_dir()?)
}

/// Explicit patch file, or every .toml in `<workspace>/patches` then `./patches`.
fn patch_files(workspace: &Path, patches: Option<PathBuf>) -> Result<Vec<PathBuf>> {
    if let Some(path) = patches {
        return Ok(vec![path]);
    }

    let mut candidates = vec![workspace.join("patches")];
    if let Ok(cwd) = env::current_dir() {
        let cwd_patches = cwd.join("patches");
        if cwd_patches != candidates[0] {
            candidates.push(cwd_patches);
        }
    }
    Ok(discover_patch_files(&candidates)?)
}

/// Show unified diff between original and patched content
fn display_diff(file: &Path, original: &str, modified: &str) {
    println!(
        "\n{}",
        format!("--- {} (original)", file.display()).dimmed()
    );
    println!("{}", format!("+++ {} (patched)", file.display()).dimmed());

    let diff = TextDiff::from_lines(original, modified);

    for hunk in diff.unified_diff().context_radius(3).iter_hunks() {
        println!("{}", hunk.header().to_string().cyan());
        for change in hunk.iter_changes() {
            let line = match change.tag() {
                ChangeTag::Delete => format!("-{}", change).red(),
                ChangeTag::Insert => format!("+{}", change).green(),
                ChangeTag::Equal => format!(" {}", change).normal(),
            };
            print!("{}", line);
            if change.missing_newline() {
                println!();
            }
        }
    }
}

fn print_error_details(err: &PatchError) {
    match err {
        PatchError::Locate { source, .. } => match source {
            LocateError::NotFound {
                suggestion: Some(suggestion),
                ..
            } => {
                eprintln!(
                    "  {} line {}: {}",
                    "Did you mean".yellow(),
                    suggestion.line + 1,
                    suggestion.text
                );
            }
            LocateError::NotFound { .. } | LocateError::StopNotFound { .. } => {
                eprintln!("  Possible causes:");
                eprintln!("    - Block was renamed or removed");
                eprintln!("    - Marker text changed (whitespace, signature)");
                eprintln!("    - Block lives in a different file");
            }
            LocateError::Ambiguous { .. } => {
                eprintln!("  Action: Refine the marker or set from_line to skip earlier matches");
            }
            LocateError::OutOfBounds { .. } => {}
        },
        PatchError::VerificationFailed { .. } => {
            eprintln!("  The target block changed since the patch was written; review it first");
        }
        _ => {}
    }
}

fn cmd_apply(
    workspace: Option<PathBuf>,
    patches: Option<PathBuf>,
    dry_run: bool,
    show_diff: bool,
) -> Result<()> {
    let workspace = resolve_workspace(workspace)?;
    let patch_files = patch_files(&workspace, patches)?;

    println!("Workspace: {}", workspace.display());
    println!();

    let mut total_applied = 0;
    let mut total_already_applied = 0;
    let mut total_failed = 0;

    let overlay = Overlay::new(&FsStorage);
    let storage: &dyn Storage = if dry_run { &overlay } else { &FsStorage };

    for patch_file in patch_files {
        println!("Loading patches from {}...", patch_file.display());

        let config = load_from_path(&patch_file)?;
        if dry_run {
            println!("{}", "  [DRY RUN - showing what would be applied]".cyan());
        }

        for (patch_id, result) in run_patches(&config, &workspace, storage) {
            match result {
                Ok(planned) => match planned.status() {
                    PatchStatus::Applied {
                        file,
                        lines_removed,
                        lines_inserted,
                    } => {
                        let verb = if dry_run { "Would apply to" } else { "Applied to" };
                        println!(
                            "{} {}: {} {} (lines {}: -{} +{})",
                            "✓".green(),
                            patch_id,
                            verb,
                            file.display(),
                            display_range(planned.range),
                            lines_removed,
                            lines_inserted
                        );
                        total_applied += 1;

                        if show_diff {
                            display_planned_diff(&planned);
                        }
                    }
                    PatchStatus::AlreadyApplied { file } => {
                        println!(
                            "{} {}: Already applied to {}",
                            "⊙".yellow(),
                            patch_id,
                            file.display()
                        );
                        total_already_applied += 1;
                    }
                },
                Err(e) => {
                    eprintln!("{} {}: Error - {}", "✗".red(), patch_id, e);
                    print_error_details(&e);
                    total_failed += 1;
                }
            }
        }

        println!();
    }

    println!("{}", "Summary:".bold());
    println!("  {} applied", format!("{}", total_applied).green());
    println!(
        "  {} already applied",
        format!("{}", total_already_applied).yellow()
    );
    println!("  {} failed", format!("{}", total_failed).red());

    if total_failed > 0 {
        std::process::exit(1);
    }

    Ok(())
}

fn display_planned_diff(planned: &PlannedPatch) {
    let patched = planned.patched();
    if planned.original != patched {
        display_diff(&planned.file, &planned.original, &patched);
    }
}

fn display_range(range: LineRange) -> String {
    if range.is_empty() {
        format!("before {}", range.start + 1)
    } else {
        format!("{}-{}", range.start + 1, range.end)
    }
}

fn cmd_check(workspace: Option<PathBuf>, patches: Option<PathBuf>) -> Result<()> {
    let workspace = resolve_workspace(workspace)?;
    let patch_files = patch_files(&workspace, patches)?;

    println!("{}", "Patch Status Report".bold());
    println!("Workspace: {}", workspace.display());
    println!();

    let mut applied = Vec::new();
    let mut pending = Vec::new();
    let mut failed = Vec::new();

    // Read-only: every write lands in the overlay
    let overlay = Overlay::new(&FsStorage);
    for patch_file in patch_files {
        let config = load_from_path(&patch_file)?;
        for (patch_id, result) in run_patches(&config, &workspace, &overlay) {
            match result.map(|planned| planned.status()) {
                Ok(PatchStatus::AlreadyApplied { .. }) => applied.push(patch_id),
                Ok(PatchStatus::Applied { .. }) => pending.push(patch_id),
                Err(e) => failed.push((patch_id, e.to_string())),
            }
        }
    }

    if !applied.is_empty() {
        println!(
            "{} {} ({} patches)",
            "✓".green(),
            "APPLIED".green().bold(),
            applied.len()
        );
        for id in &applied {
            println!("  - {}", id);
        }
        println!();
    }

    if !pending.is_empty() {
        println!(
            "{} {} ({} patches)",
            "⊙".yellow(),
            "NOT APPLIED".yellow().bold(),
            pending.len()
        );
        for id in &pending {
            println!("  - {}", id);
        }
        println!();
    }

    if !failed.is_empty() {
        println!(
            "{} {} ({} patches)",
            "✗".red(),
            "FAILED".red().bold(),
            failed.len()
        );
        for (id, reason) in &failed {
            println!("  - {} ({})", id, reason.dimmed());
        }
        println!();
        std::process::exit(1);
    }

    Ok(())
}

fn block_marker(text: &str, pattern: bool) -> Result<Marker> {
    if pattern {
        Marker::pattern(text).with_context(|| format!("invalid marker pattern: {text}"))
    } else {
        Ok(Marker::literal(text))
    }
}

fn locate_block(args: &BlockArgs, unique: bool) -> Result<(Document, LineRange)> {
    let contents = FsStorage
        .read(&args.file)
        .with_context(|| format!("failed to read {}", args.file.display()))?;
    let document = Document::parse(&contents);

    let start = block_marker(&args.start, args.pattern)?;
    let stop = args
        .stop
        .as_deref()
        .map(|stop| block_marker(stop, args.pattern))
        .transpose()?;

    let range = Locator::new(&start)
        .stop_opt(stop.as_ref())
        .from_line(args.from_line)
        .unique(unique)
        .body_only(args.body_only)
        .locate(&document)
        .with_context(|| format!("in {}", args.file.display()))?;

    Ok((document, range))
}

fn cmd_locate(args: &BlockArgs, unique: bool, json: bool) -> Result<()> {
    let (_, range) = locate_block(args, unique)?;

    if json {
        let report = LocateReport {
            file: &args.file,
            range,
            line_count: range.len(),
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "{}: {} ({} lines)",
            args.file.display(),
            range,
            range.len()
        );
    }
    Ok(())
}

fn cmd_extract(args: &BlockArgs) -> Result<()> {
    let (document, range) = locate_block(args, false)?;
    print!("{}", extract(&document, range)?);
    Ok(())
}
