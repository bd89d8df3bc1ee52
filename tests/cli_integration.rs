//! Integration tests for the command-line interface
//!
//! Drives the built binary against throwaway workspaces.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

const APP: &str = "classdef App\n    methods\n        function browseFile(app)\n            old();\n        end\n\n        function detectMarkersFromField(app)\n        end\n    end\nend\n";

/// Helper to create a test workspace with one patch file
fn setup_test_workspace() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("App.m"), APP).unwrap();

    let patches_dir = dir.path().join("patches");
    fs::create_dir(&patches_dir).unwrap();
    fs::write(
        patches_dir.join("browse.toml"),
        r#"[meta]
name = "browse"
description = "Replace the browse callback"
workspace_relative = true

[[patches]]
id = "browse-file"
file = "App.m"

[patches.source]
text = """
        function browseFile(app)
            new();
        end

"""

[patches.target]
start = { literal = "function browseFile(app)" }
stop = { literal = "function detectMarkersFromField(app)" }
"#,
    )
    .unwrap();

    dir
}

fn run(args: &[&str], cwd: &Path) -> Output {
    Command::new(env!("CARGO_BIN_EXE_block-splicer"))
        .args(args)
        .current_dir(cwd)
        .env("NO_COLOR", "1")
        .env_remove("BLOCK_SPLICER_WORKSPACE")
        .env_remove("RUST_LOG")
        .output()
        .unwrap()
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn test_apply_help() {
    let dir = TempDir::new().unwrap();
    let output = run(&["apply", "--help"], dir.path());

    assert!(output.status.success());
    let stdout = stdout(&output);
    assert!(stdout.contains("--dry-run"));
    assert!(stdout.contains("--diff"));
    assert!(stdout.contains("--workspace"));
}

#[test]
fn test_apply_writes_and_reports() {
    let dir = setup_test_workspace();
    let output = run(&["apply"], dir.path());

    assert!(output.status.success(), "{output:?}");
    let stdout = stdout(&output);
    assert!(stdout.contains("browse-file: Applied to"));
    assert!(stdout.contains("lines 3-6: -4 +4"));
    assert!(stdout.contains("1 applied"));

    let patched = fs::read_to_string(dir.path().join("App.m")).unwrap();
    assert!(patched.contains("new();"));
    assert!(!patched.contains("old();"));
}

#[test]
fn test_apply_twice_reports_already_applied() {
    let dir = setup_test_workspace();
    assert!(run(&["apply"], dir.path()).status.success());
    let output = run(&["apply"], dir.path());

    assert!(output.status.success());
    assert!(stdout(&output).contains("browse-file: Already applied"));
    assert!(stdout(&output).contains("1 already applied"));
}

#[test]
fn test_dry_run_leaves_files_alone() {
    let dir = setup_test_workspace();
    let output = run(&["apply", "--dry-run", "--diff"], dir.path());

    assert!(output.status.success());
    let stdout = stdout(&output);
    assert!(stdout.contains("DRY RUN"));
    assert!(stdout.contains("Would apply to"));
    assert!(stdout.contains("-            old();"));
    assert!(stdout.contains("+            new();"));
    assert_eq!(fs::read_to_string(dir.path().join("App.m")).unwrap(), APP);
}

#[test]
fn test_apply_with_explicit_workspace_and_patch_file() {
    let dir = setup_test_workspace();
    let elsewhere = TempDir::new().unwrap();
    let patch_file = dir.path().join("patches/browse.toml");
    let output = run(
        &[
            "apply",
            "--workspace",
            dir.path().to_str().unwrap(),
            "--patches",
            patch_file.to_str().unwrap(),
        ],
        elsewhere.path(),
    );

    assert!(output.status.success(), "{output:?}");
    assert!(fs::read_to_string(dir.path().join("App.m"))
        .unwrap()
        .contains("new();"));
}

#[test]
fn test_apply_failure_exits_nonzero() {
    let dir = setup_test_workspace();
    let drifted = APP.replace("browseFile", "browseFiles");
    fs::write(dir.path().join("App.m"), &drifted).unwrap();

    let output = run(&["apply"], dir.path());

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("browse-file: Error"));
    assert!(stderr.contains("target block not found"));
    assert!(stdout(&output).contains("1 failed"));
    assert_eq!(fs::read_to_string(dir.path().join("App.m")).unwrap(), drifted);
}

#[test]
fn test_check_groups_by_status() {
    let dir = setup_test_workspace();

    let before = run(&["check"], dir.path());
    assert!(before.status.success());
    assert!(stdout(&before).contains("NOT APPLIED (1 patches)"));

    assert!(run(&["apply"], dir.path()).status.success());

    let after = run(&["check"], dir.path());
    assert!(stdout(&after).contains("APPLIED (1 patches)"));
    assert!(!stdout(&after).contains("NOT APPLIED"));
}

#[test]
fn test_check_failure_exits_nonzero() {
    let dir = setup_test_workspace();
    let drifted = APP.replace("function detectMarkersFromField", "function findMarkers");
    fs::write(dir.path().join("App.m"), &drifted).unwrap();

    let output = run(&["check"], dir.path());

    assert!(!output.status.success());
    let stdout = stdout(&output);
    assert!(stdout.contains("FAILED (1 patches)"));
    assert!(stdout.contains("browse-file"));
    assert_eq!(fs::read_to_string(dir.path().join("App.m")).unwrap(), drifted);
}

#[test]
fn test_missing_patches_dir_is_an_error() {
    let dir = TempDir::new().unwrap();
    let output = run(&["apply"], dir.path());

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("no .toml patch files found"));
}

#[test]
fn test_locate_prints_range() {
    let dir = setup_test_workspace();
    let output = run(
        &[
            "locate",
            "App.m",
            "--start",
            "function browseFile",
            "--stop",
            "function detectMarkersFromField",
        ],
        dir.path(),
    );

    assert!(output.status.success());
    assert_eq!(stdout(&output).trim(), "App.m: [2, 6) (4 lines)");
}

#[test]
fn test_locate_json() {
    let dir = setup_test_workspace();
    let output = run(
        &[
            "locate",
            "App.m",
            "--start",
            r"^\s+function browse",
            "--pattern",
            "--json",
        ],
        dir.path(),
    );

    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(report["file"], "App.m");
    assert_eq!(report["range"]["start"], 2);
    assert_eq!(report["range"]["end"], 10);
    assert_eq!(report["line_count"], 8);
}

#[test]
fn test_locate_unique_rejects_repeated_marker() {
    let dir = setup_test_workspace();
    let output = run(&["locate", "App.m", "--start", "end", "--unique"], dir.path());

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("ambiguous"));
}

#[test]
fn test_extract_prints_block_verbatim() {
    let dir = setup_test_workspace();
    let output = run(
        &[
            "extract",
            "App.m",
            "-s",
            "function browseFile",
            "-e",
            "function detectMarkersFromField",
            "--body-only",
        ],
        dir.path(),
    );

    assert!(output.status.success());
    assert_eq!(stdout(&output), "            old();\n        end\n\n");
}

#[test]
fn test_extract_missing_marker_suggests() {
    let dir = setup_test_workspace();
    let output = run(
        &["extract", "App.m", "--start", "function browseFiles(app)"],
        dir.path(),
    );

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("matched no line"));
    assert!(stderr.contains("function browseFile(app)"));
}
