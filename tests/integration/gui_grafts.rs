//! Integration tests grafting GUI callbacks between two MATLAB app files.
//!
//! Mirrors the upload-workflow migration: the upload panel, browse callback
//! and event selection are moved from the donor app into the quality app,
//! with titles rewritten on the way.

use block_splicer::config::{apply_patches, check_patches, load_from_path, PatchStatus};
use block_splicer::FsStorage;
use std::fs;
use tempfile::TempDir;

const DONOR_APP: &str = r#"classdef JuanAnalyzer < matlab.apps.AppBase
    properties (Access = public)
        UIFigure                matlab.ui.Figure
    end

    methods (Access = private)

        function createUploadPanel(app)
            app.TitleLabel = uilabel(app.UploadPanel);
            app.TitleLabel.Text = 'Juan Analyzer';
            app.SubtitleLabel = uilabel(app.UploadPanel);
            app.SubtitleLabel.Text = 'Manual Event Selection | N400, N250, P600 Components';
        end

        function createProcessingPanel(app)
            app.ProcessingPanel = uipanel(app.UIFigure);
        end

        function browseFile(app)
            [file, path] = uigetfile({'*.mff;*.set', 'EEG Files'}, 'Select EEG File');
            if file == 0
                return;
            end
            app.EventSelectionButton.Enable = 'on';
        end

        function selectEventsManually(app)
            app.SelectedEvents = {'S1'};
        end

        function startAnalysis(app)
            startProcessing(app);
        end
    end
end
"#;

const QUALITY_APP: &str = r#"classdef EEGQualityAnalyzer < matlab.apps.AppBase
    properties (Access = public)
        UIFigure                matlab.ui.Figure
        % Upload Screen Components
        DropZonePanel           matlab.ui.container.Panel
        DropZoneLabel           matlab.ui.control.Label
        BrowseButton            matlab.ui.control.Button
        % Epoch Definition Builder Components
        EpochListBox            matlab.ui.control.ListBox
        StartButton             matlab.ui.control.Button
    end

    properties (Access = private)
        EventInfo               struct
    end

    methods (Access = private)

        function createUploadPanel(app)
            app.DropZonePanel = uipanel(app.UploadPanel);
            app.DropZoneLabel = uilabel(app.DropZonePanel);
            app.DropZoneLabel.Text = 'Drop EEG file here';
        end

        function createProcessingPanel(app)
            app.ProcessingPanel = uipanel(app.UIFigure);
        end

        function browseFile(app)
            loadFileInfo(app);
        end

        function loadFileInfo(app)
            app.FilenameLabel.Text = 'none';
        end

        function detectMarkersFromField(app)
        end

        function startProcessing(app)
            processEEG(app);
        end
    end
end
"#;

const PATCHES: &str = r#"
[meta]
name = "upload-workflow"
description = "Adopt the donor app's two-step upload workflow"
workspace_relative = true

[[patches]]
id = "upload-properties"
file = "EEGQualityAnalyzer/EEGQualityAnalyzer.m"

[patches.source]
text = """
        % Upload Screen Components
        TitleLabel              matlab.ui.control.Label
        SubtitleLabel           matlab.ui.control.Label
        BrowseButton            matlab.ui.control.Button
        EventSelectionButton    matlab.ui.control.Button
"""

[patches.target]
start = { literal = "% Upload Screen Components" }
stop = { pattern = '^\s*StartButton\s' }
unique = true

[[patches]]
id = "selected-events-property"
file = "EEGQualityAnalyzer/EEGQualityAnalyzer.m"

[patches.source]
text = """
        SelectedEvents          cell = {}
        SelectedFields          cell = {}
"""

[patches.target]
start = { pattern = 'EventInfo\s+struct' }
mode = "insert-after"

[[patches]]
id = "upload-panel"
file = "EEGQualityAnalyzer/EEGQualityAnalyzer.m"

[patches.source]
file = "JuanAnalyzerManual/JuanAnalyzer.m"
start = { literal = "function createUploadPanel(app)" }
stop = { literal = "function createProcessingPanel(app)" }

[[patches.rules]]
type = "literal"
find = "'Juan Analyzer'"
replace = "'EEG Quality Analyzer'"
required = true

[[patches.rules]]
type = "literal"
find = "'Manual Event Selection | N400, N250, P600 Components'"
replace = "'Automated Quality Assessment with Manual Event Selection'"
required = true

[patches.target]
start = { literal = "function createUploadPanel(app)" }
stop = { literal = "function createProcessingPanel(app)" }
unique = true

[[patches]]
id = "browse-file"
file = "EEGQualityAnalyzer/EEGQualityAnalyzer.m"

[patches.source]
file = "JuanAnalyzerManual/JuanAnalyzer.m"
start = { literal = "function browseFile(app)" }
stop = { literal = "function selectEventsManually(app)" }

[patches.target]
start = { literal = "function browseFile(app)" }
stop = { literal = "function detectMarkersFromField(app)" }

[[patches]]
id = "select-events"
file = "EEGQualityAnalyzer/EEGQualityAnalyzer.m"

[patches.source]
file = "JuanAnalyzerManual/JuanAnalyzer.m"
start = { literal = "function selectEventsManually(app)" }
stop = { pattern = '^    end$' }

[patches.target]
start = { literal = "function startProcessing(app)" }
mode = "insert-before"
"#;

fn setup_workspace() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("EEGQualityAnalyzer")).unwrap();
    fs::create_dir_all(dir.path().join("JuanAnalyzerManual")).unwrap();
    fs::create_dir_all(dir.path().join("patches")).unwrap();

    fs::write(
        dir.path().join("JuanAnalyzerManual/JuanAnalyzer.m"),
        DONOR_APP,
    )
    .unwrap();
    fs::write(
        dir.path().join("EEGQualityAnalyzer/EEGQualityAnalyzer.m"),
        QUALITY_APP,
    )
    .unwrap();
    fs::write(dir.path().join("patches/upload-workflow.toml"), PATCHES).unwrap();

    dir
}

fn read_target(dir: &TempDir) -> String {
    fs::read_to_string(dir.path().join("EEGQualityAnalyzer/EEGQualityAnalyzer.m")).unwrap()
}

#[test]
fn test_full_upload_workflow_migration() {
    let dir = setup_workspace();
    let config = load_from_path(dir.path().join("patches/upload-workflow.toml")).unwrap();

    let results = apply_patches(&config, dir.path(), &FsStorage);
    for (id, result) in &results {
        assert!(
            matches!(result, Ok(PatchStatus::Applied { .. })),
            "{id}: {result:?}"
        );
    }

    let patched = read_target(&dir);

    // Properties swapped, StartButton kept
    assert!(patched.contains("        EventSelectionButton    matlab.ui.control.Button\n        StartButton"));
    assert!(!patched.contains("DropZonePanel           matlab"));
    assert!(!patched.contains("EpochListBox"));

    // New data properties directly after EventInfo
    assert!(patched.contains(
        "        EventInfo               struct\n        SelectedEvents          cell = {}\n        SelectedFields          cell = {}\n    end\n"
    ));

    // Upload panel grafted with rewritten titles
    assert!(patched.contains("app.TitleLabel.Text = 'EEG Quality Analyzer';"));
    assert!(patched.contains("'Automated Quality Assessment with Manual Event Selection'"));
    assert!(!patched.contains("Juan Analyzer"));
    assert!(!patched.contains("Drop EEG file here"));

    // browseFile replaced; helper it called removed with it
    assert!(patched.contains("app.EventSelectionButton.Enable = 'on';"));
    assert!(!patched.contains("loadFileInfo"));

    // Event selection inserted ahead of startProcessing
    let select = patched.find("function selectEventsManually(app)").unwrap();
    let start = patched.find("function startProcessing(app)").unwrap();
    assert!(select < start);

    // Untouched regions stay byte-identical
    assert!(patched.starts_with(
        "classdef EEGQualityAnalyzer < matlab.apps.AppBase\n    properties (Access = public)\n        UIFigure                matlab.ui.Figure\n"
    ));
    assert!(patched.ends_with(
        "        function startProcessing(app)\n            processEEG(app);\n        end\n    end\nend\n"
    ));
    assert!(patched.contains(
        "        function createProcessingPanel(app)\n            app.ProcessingPanel = uipanel(app.UIFigure);\n        end\n"
    ));

    // Donor never modified
    let donor = fs::read_to_string(dir.path().join("JuanAnalyzerManual/JuanAnalyzer.m")).unwrap();
    assert_eq!(donor, DONOR_APP);
}

#[test]
fn test_migration_is_idempotent() {
    let dir = setup_workspace();
    let config = load_from_path(dir.path().join("patches/upload-workflow.toml")).unwrap();

    let _ = apply_patches(&config, dir.path(), &FsStorage);
    let once = read_target(&dir);

    let results = apply_patches(&config, dir.path(), &FsStorage);
    for (id, result) in &results {
        assert!(
            matches!(result, Ok(PatchStatus::AlreadyApplied { .. })),
            "{id}: {result:?}"
        );
    }
    assert_eq!(read_target(&dir), once);
}

#[test]
fn test_check_reports_pending_without_writing() {
    let dir = setup_workspace();
    let config = load_from_path(dir.path().join("patches/upload-workflow.toml")).unwrap();

    let results = check_patches(&config, dir.path(), &FsStorage);
    assert_eq!(results.len(), 5);
    assert!(results
        .iter()
        .all(|(_, r)| matches!(r, Ok(PatchStatus::Applied { .. }))));
    assert_eq!(read_target(&dir), QUALITY_APP);
}

#[test]
fn test_drifted_target_aborts_only_that_patch() {
    let dir = setup_workspace();
    let drifted = QUALITY_APP.replace("function browseFile(app)", "function pickFile(app)");
    fs::write(
        dir.path().join("EEGQualityAnalyzer/EEGQualityAnalyzer.m"),
        &drifted,
    )
    .unwrap();
    let config = load_from_path(dir.path().join("patches/upload-workflow.toml")).unwrap();

    let results = apply_patches(&config, dir.path(), &FsStorage);
    let browse = results.iter().find(|(id, _)| id == "browse-file").unwrap();
    let err = browse.1.as_ref().unwrap_err();
    assert!(err.to_string().contains("target block not found"));
    assert!(err.to_string().contains("function browseFile(app)"));

    // The other patches still landed; the drifted callback is untouched
    let patched = read_target(&dir);
    assert!(patched.contains("function pickFile(app)\n            loadFileInfo(app);"));
    assert!(patched.contains("'EEG Quality Analyzer'"));
}

#[test]
fn test_crlf_target_keeps_line_endings() {
    let dir = setup_workspace();
    let crlf = QUALITY_APP.replace('\n', "\r\n");
    fs::write(
        dir.path().join("EEGQualityAnalyzer/EEGQualityAnalyzer.m"),
        &crlf,
    )
    .unwrap();
    let toml = PATCHES.replace(
        "id = \"upload-panel\"\nfile = \"EEGQualityAnalyzer/EEGQualityAnalyzer.m\"\n",
        "id = \"upload-panel\"\nfile = \"EEGQualityAnalyzer/EEGQualityAnalyzer.m\"\nnormalize_line_endings = true\n",
    );
    let config = block_splicer::load_from_str(&toml).unwrap();
    let upload = config
        .patches
        .iter()
        .find(|p| p.id == "upload-panel")
        .unwrap();
    assert!(upload.normalize_line_endings);

    let single = block_splicer::PatchConfig {
        meta: config.meta.clone(),
        patches: vec![upload.clone()],
    };
    let results = apply_patches(&single, dir.path(), &FsStorage);
    assert!(results[0].1.is_ok(), "{:?}", results[0].1);

    let patched = read_target(&dir);
    assert!(!patched.replace("\r\n", "").contains('\n'));
    assert!(patched.contains("app.TitleLabel.Text = 'EEG Quality Analyzer';\r\n"));
}
