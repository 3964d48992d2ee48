//! Spec file collection.
//!
//! Inputs are files or directories relative to the workspace root. Files
//! are taken as given; directories are walked for `*.rb` files. Exclusion
//! globs match workspace-relative paths.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use thiserror::Error;
use walkdir::WalkDir;

use crate::engine::SourceFile;

/// Directories never descended into.
const SKIP_DIRS: &[&str] = &[".git", "vendor", "node_modules", "tmp"];

// ============================================================================
// Error Types
// ============================================================================

/// Error type for file operations.
#[derive(Debug, Error)]
pub enum FileError {
    /// Input path does not exist.
    #[error("file not found: {path}")]
    NotFound { path: String },

    /// Invalid exclusion glob.
    #[error("invalid exclude pattern `{pattern}`: {message}")]
    Pattern { pattern: String, message: String },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Result type for file operations.
pub type FileResult<T> = Result<T, FileError>;

// ============================================================================
// File Collection
// ============================================================================

fn build_excludes(patterns: &[String]) -> FileResult<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| FileError::Pattern {
            pattern: pattern.clone(),
            message: e.to_string(),
        })?;
        builder.add(glob);
    }
    builder.build().map_err(|e| FileError::Pattern {
        pattern: patterns.join(","),
        message: e.to_string(),
    })
}

fn relative_string(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Collect Ruby spec files under `inputs`.
///
/// Returns files sorted by workspace-relative path, without duplicates.
///
/// # Example
///
/// ```ignore
/// let files = collect_ruby_files(workspace_root, &[PathBuf::from("spec")], &[])?;
/// for file in &files {
///     println!("{} ({} bytes)", file.path, file.content.len());
/// }
/// ```
pub fn collect_ruby_files(
    workspace_root: &Path,
    inputs: &[PathBuf],
    excludes: &[String],
) -> FileResult<Vec<SourceFile>> {
    let excludes = build_excludes(excludes)?;
    let mut relative_paths: Vec<PathBuf> = Vec::new();

    for input in inputs {
        let absolute = workspace_root.join(input);
        if absolute.is_file() {
            relative_paths.push(input.clone());
            continue;
        }
        if !absolute.is_dir() {
            return Err(FileError::NotFound {
                path: input.display().to_string(),
            });
        }

        for entry in WalkDir::new(&absolute)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| {
                let name = e.file_name().to_string_lossy();
                e.depth() == 0 || !SKIP_DIRS.iter().any(|skip| name == *skip)
            })
        {
            let entry = entry.map_err(|e| FileError::Io(io::Error::other(e)))?;
            let path = entry.path();
            if !entry.file_type().is_file() || path.extension().is_none_or(|ext| ext != "rb") {
                continue;
            }
            // Only workspace-relative paths are matched and reported.
            match path.strip_prefix(workspace_root) {
                Ok(rel) => relative_paths.push(rel.to_path_buf()),
                Err(_) => continue,
            }
        }
    }

    let mut files = Vec::new();
    for rel in relative_paths {
        if excludes.is_match(&rel) {
            continue;
        }
        let bytes = fs::read(workspace_root.join(&rel))?;
        files.push(SourceFile::from_bytes(relative_string(&rel), bytes));
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));
    files.dedup_by(|a, b| a.path == b.path);
    Ok(files)
}

// ============================================================================
// Tests
// ============================================================================
