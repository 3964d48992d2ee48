//! Conversion run driver.
//!
//! Wires the library crates together for one invocation:
//! - Validates the configuration and the repository state
//! - Collects spec files and runs the engine (with the sandboxed spec run
//!   unless dynamic analysis is skipped)
//! - Writes back changed files, guarded by content hashes
//! - Optionally writes a commit message
//!
//! ## Error Handling
//!
//! Problems that stop the run before any file is touched are returned as
//! `ExpectifyError`. Per-file problems are reported in the returned
//! [`RunResponse`] and never abort the other files.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use expectify_core::config::Configuration;
use expectify_core::error::ExpectifyError;
use expectify_core::output::{ErrorInfo, FileOutcome, FileStatus, RunResponse};
use expectify_core::patch::ContentHash;
use expectify_core::report::{FileRecords, Report, SummaryEntry};
use expectify_ruby::dynamic::{DynamicAnalyzer, FactProvider};
use expectify_ruby::files::{collect_ruby_files, FileError};
use expectify_ruby::{run, FileConversion, FileFailure};

use crate::git;
use crate::summary;

/// Inputs of one conversion run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Project root; inputs are resolved against it.
    pub workspace_root: PathBuf,
    /// Files or directories to convert.
    pub paths: Vec<PathBuf>,
    /// Globs of workspace-relative paths to skip.
    pub excludes: Vec<String>,
    pub config: Configuration,
    /// The invocation as typed, quoted in the commit message.
    pub command_line: String,
}

fn file_error(err: FileError) -> ExpectifyError {
    match err {
        FileError::NotFound { path } => ExpectifyError::file_not_found(path),
        FileError::Pattern { .. } => ExpectifyError::invalid_args(err.to_string()),
        FileError::Io(e) => ExpectifyError::from(e),
    }
}

/// Refuse to run when the preconditions of the configuration are not met.
fn check_repository(options: &RunOptions) -> Result<(), ExpectifyError> {
    let root = &options.workspace_root;
    let in_repository = git::inside_repository(root);

    if options.config.generate_commit_message && !in_repository {
        return Err(ExpectifyError::invalid_args(
            "-m/--generate-commit-message option is specified but not in a Git repository",
        ));
    }
    if !options.config.force && in_repository {
        let clean = git::is_clean(root)
            .map_err(|e| ExpectifyError::internal(format!("failed to check git status: {e}")))?;
        if !clean {
            return Err(ExpectifyError::DirtyRepository);
        }
    }
    Ok(())
}

/// Write `output` over `path` if the file still has `original`'s content.
pub fn write_back(
    workspace_root: &Path,
    path: &str,
    original: &str,
    output: &str,
) -> Result<(), ExpectifyError> {
    let full = workspace_root.join(path);
    let apply_error = |message: String| ExpectifyError::ApplyError {
        message,
        file: Some(path.to_string()),
    };

    let current = fs::read(&full).map_err(|e| apply_error(format!("{path}: {e}")))?;
    if ContentHash::compute(&current) != ContentHash::compute(original.as_bytes()) {
        return Err(apply_error(format!(
            "{path} was modified during conversion; not overwriting"
        )));
    }
    fs::write(&full, output).map_err(|e| apply_error(format!("{path}: {e}")))
}

fn failure_to_error(path: &str, failure: FileFailure) -> ExpectifyError {
    match failure {
        FileFailure::Encoding(source) => ExpectifyError::Encoding {
            file: path.to_string(),
            source,
        },
        FileFailure::Parse(source) => ExpectifyError::Parse {
            file: path.to_string(),
            source,
        },
        FileFailure::Rewrite(source) => ExpectifyError::Rewrite {
            file: path.to_string(),
            source,
        },
    }
}

fn failed(path: String, err: &ExpectifyError) -> FileOutcome {
    FileOutcome {
        path,
        status: FileStatus::Failed,
        conversions: 0,
        error: Some(ErrorInfo::from_error(err)),
    }
}

/// Apply one file's result and describe what happened to it.
fn settle(workspace_root: &Path, file: FileConversion) -> FileOutcome {
    let converted = match file.result {
        Ok(converted) => converted,
        Err(failure) => {
            let err = failure_to_error(&file.path, failure);
            return failed(file.path, &err);
        }
    };

    if !converted.changed {
        return FileOutcome {
            path: file.path,
            status: FileStatus::Unchanged,
            conversions: 0,
            error: None,
        };
    }

    match write_back(workspace_root, &file.path, &file.original, &converted.output) {
        Ok(()) => FileOutcome {
            path: file.path,
            status: FileStatus::Converted,
            conversions: converted.records.len(),
            error: None,
        },
        Err(err) => {
            warn!(file = %file.path, error = %err, "failed to write converted file");
            failed(file.path, &err)
        }
    }
}

/// Settle every file and group the records of the files actually written.
fn settle_all(
    workspace_root: &Path,
    files: Vec<FileConversion>,
) -> (Vec<FileOutcome>, Vec<SummaryEntry>) {
    let mut written = Vec::new();
    let outcomes = files
        .into_iter()
        .map(|file| {
            let path = file.path.clone();
            let records = file
                .result
                .as_ref()
                .map(|converted| converted.records.clone())
                .unwrap_or_default();
            let outcome = settle(workspace_root, file);
            if outcome.status == FileStatus::Converted {
                written.push(FileRecords { path, records });
            }
            outcome
        })
        .collect();
    (outcomes, Report::merge(written).summary())
}

/// Run a conversion over the workspace.
pub fn convert_workspace(options: &RunOptions) -> Result<RunResponse, ExpectifyError> {
    options.config.validate()?;
    check_repository(options)?;

    let root = &options.workspace_root;
    let files = collect_ruby_files(root, &options.paths, &options.excludes).map_err(file_error)?;
    info!(files = files.len(), root = %root.display(), "collected spec files");

    let analyzer = DynamicAnalyzer::new(root.clone(), &options.config);
    let provider: Option<&dyn FactProvider> = if options.config.skip_dynamic_analysis {
        None
    } else {
        Some(&analyzer)
    };
    let outcome = run(files, &options.config, provider);

    let (files, grouped) = settle_all(root, outcome.files);

    let timestamp = chrono::Utc::now().to_rfc3339();
    let mut response = RunResponse::new(timestamp, outcome.analysis, grouped, files);

    if options.config.generate_commit_message && response.conversions > 0 {
        let git_dir = git::git_dir(root).map_err(|e| {
            ExpectifyError::internal(format!("failed to locate git directory: {e}"))
        })?;
        let path = git_dir.join("COMMIT_EDITMSG");
        fs::write(
            &path,
            summary::commit_message(&response.summary, &options.command_line),
        )?;
        info!(path = %path.display(), "wrote commit message");
        response.commit_message_path = Some(path.display().to_string());
    }

    Ok(response)
}

// ============================================================================
// Tests
// ============================================================================
