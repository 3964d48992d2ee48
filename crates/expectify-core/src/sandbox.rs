//! Sandbox copies for the dynamic analysis run.
//!
//! The instrumented spec run must never touch the user's project. A
//! [`SandboxHandle`] copies the project into a temp directory, lets the caller
//! overwrite files inside the copy, and runs a command there with a timeout.
//!
//! Layout:
//!
//! ```text
//! <temp>/
//!   project/          mirrored project files
//!   .expectify_meta/  original root, manifest, command output
//! ```

use std::collections::HashMap;
use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use tracing::{debug, warn};
use wait_timeout::ChildExt;
use walkdir::WalkDir;

use crate::config::DEFAULT_ANALYSIS_TIMEOUT;

// ============================================================================
// Sandbox Configuration
// ============================================================================

/// Configuration for sandbox creation and operation.
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// Custom directory for sandbox (default: system temp).
    pub sandbox_dir: Option<PathBuf>,
    /// Whether to preserve the sandbox on dispose.
    pub keep_sandbox: bool,
    /// Command timeout.
    pub timeout: Duration,
    /// Additional environment variables for commands run in the sandbox.
    pub extra_env: HashMap<String, String>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        SandboxConfig {
            sandbox_dir: None,
            keep_sandbox: false,
            timeout: DEFAULT_ANALYSIS_TIMEOUT,
            extra_env: HashMap::new(),
        }
    }
}

impl SandboxConfig {
    /// Set the command timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Add an environment variable for commands run in the sandbox.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_env.insert(key.into(), value.into());
        self
    }
}

// ============================================================================
// Default Exclusions
// ============================================================================

/// Directories never copied into a sandbox.
const EXCLUDE_DIRS: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    "node_modules",
    "tmp",
    "log",
    "coverage",
    ".sass-cache",
];

fn should_exclude(path: &Path) -> bool {
    path.components().any(|component| match component {
        Component::Normal(name) => {
            let name = name.to_string_lossy();
            EXCLUDE_DIRS.iter().any(|excluded| name == *excluded)
        }
        _ => false,
    })
}

// ============================================================================
// Symlink Handling
// ============================================================================

/// Result of checking a symlink.
#[derive(Debug)]
pub enum SymlinkCheck {
    /// Symlink points within the project, copy target content.
    WithinProject(PathBuf),
    /// Symlink points outside the project, skip with warning.
    OutsideProject(PathBuf),
    /// Not a symlink.
    NotSymlink,
    /// Error reading symlink (broken link, loop, permissions).
    Error(io::Error),
}

fn check_symlink(path: &Path, project_root: &Path) -> SymlinkCheck {
    if !path.is_symlink() {
        return SymlinkCheck::NotSymlink;
    }

    let target = match fs::read_link(path) {
        Ok(target) => target,
        Err(e) => return SymlinkCheck::Error(e),
    };
    let absolute_target = if target.is_absolute() {
        target
    } else {
        match path.parent() {
            Some(parent) => parent.join(target),
            None => target,
        }
    };

    let canonical_target = match absolute_target.canonicalize() {
        Ok(p) => p,
        Err(e) => return SymlinkCheck::Error(e),
    };
    let canonical_root = match project_root.canonicalize() {
        Ok(p) => p,
        Err(e) => return SymlinkCheck::Error(e),
    };

    if canonical_target.starts_with(&canonical_root) {
        SymlinkCheck::WithinProject(canonical_target)
    } else {
        SymlinkCheck::OutsideProject(canonical_target)
    }
}

// ============================================================================
// Sandbox Handle
// ============================================================================

/// Handle for a sandbox directory, managing its lifecycle.
///
/// The temp directory is removed when the handle is dropped unless
/// [`persist`](Self::persist) was called.
#[derive(Debug)]
pub struct SandboxHandle {
    temp_dir: Option<TempDir>,
    sandbox_root: PathBuf,
    project_dir: PathBuf,
    meta_dir: PathBuf,
    original_root: PathBuf,
    config: SandboxConfig,
    copied_files: Vec<String>,
    skipped_symlinks: Vec<(PathBuf, PathBuf)>,
}

impl SandboxHandle {
    /// Create a new sandbox by copying the project at `project_root`.
    pub fn create(project_root: &Path, config: SandboxConfig) -> io::Result<Self> {
        let project_root = project_root.canonicalize()?;

        let temp_dir = match &config.sandbox_dir {
            Some(base) => TempDir::with_prefix_in("expectify_sandbox_", base)?,
            None => TempDir::with_prefix("expectify_sandbox_")?,
        };

        let sandbox_root = temp_dir.path().to_path_buf();
        let project_dir = sandbox_root.join("project");
        let meta_dir = sandbox_root.join(".expectify_meta");
        fs::create_dir_all(&project_dir)?;
        fs::create_dir_all(&meta_dir)?;

        let mut handle = SandboxHandle {
            temp_dir: Some(temp_dir),
            sandbox_root,
            project_dir,
            meta_dir,
            original_root: project_root,
            config,
            copied_files: Vec::new(),
            skipped_symlinks: Vec::new(),
        };

        handle.copy_project_files()?;

        Ok(handle)
    }

    fn copy_project_files(&mut self) -> io::Result<()> {
        for entry in WalkDir::new(&self.original_root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !should_exclude(Path::new(e.file_name())))
        {
            let entry = entry?;
            let source_path = entry.path();
            if entry.depth() == 0 {
                continue;
            }

            let relative_path = source_path
                .strip_prefix(&self.original_root)
                .map_err(io::Error::other)?;
            let dest_path = self.project_dir.join(relative_path);

            if entry.file_type().is_dir() {
                fs::create_dir_all(&dest_path)?;
                continue;
            }

            if entry.path_is_symlink() {
                match check_symlink(source_path, &self.original_root) {
                    SymlinkCheck::WithinProject(target) => {
                        if target.is_file() {
                            copy_file(&target, &dest_path)?;
                            self.copied_files
                                .push(relative_path.to_string_lossy().into_owned());
                        }
                    }
                    SymlinkCheck::OutsideProject(target) => {
                        warn!(
                            "Skipping symlink outside project: {} -> {}",
                            source_path.display(),
                            target.display()
                        );
                        self.skipped_symlinks
                            .push((source_path.to_path_buf(), target));
                    }
                    SymlinkCheck::NotSymlink => {}
                    SymlinkCheck::Error(e) => {
                        warn!("Error reading symlink {}: {}", source_path.display(), e);
                    }
                }
                continue;
            }

            if !entry.file_type().is_file() {
                continue;
            }

            copy_file(source_path, &dest_path)?;
            self.copied_files
                .push(relative_path.to_string_lossy().into_owned());
        }

        debug!(files = self.copied_files.len(), "copied project into sandbox");
        Ok(())
    }

    /// Get the sandbox root directory.
    pub fn sandbox_root(&self) -> &Path {
        &self.sandbox_root
    }

    /// Get the mirrored project directory.
    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    /// Get the metadata directory (scratch space outside the project copy).
    pub fn meta_dir(&self) -> &Path {
        &self.meta_dir
    }

    /// Files that were copied, relative to the project root.
    pub fn copied_files(&self) -> &[String] {
        &self.copied_files
    }

    /// Symlinks that were skipped (outside the project).
    pub fn skipped_symlinks(&self) -> &[(PathBuf, PathBuf)] {
        &self.skipped_symlinks
    }

    /// Set an environment variable for subsequent commands.
    pub fn set_env(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.config.extra_env.insert(key.into(), value.into());
    }

    /// Overwrite (or create) a file inside the project copy.
    ///
    /// `relative` must stay inside the project directory.
    pub fn write_file(&self, relative: &Path, contents: &[u8]) -> io::Result<()> {
        let escapes = relative.components().any(|c| {
            matches!(
                c,
                Component::ParentDir | Component::RootDir | Component::Prefix(_)
            )
        });
        if escapes {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("path escapes sandbox: {}", relative.display()),
            ));
        }
        let dest = self.project_dir.join(relative);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(dest, contents)
    }

    /// Run a command with the project copy as working directory.
    ///
    /// Output goes to files in the metadata directory so a chatty suite
    /// cannot fill a pipe and stall. If the command exceeds the configured
    /// timeout it is killed and the result has `timed_out` set.
    pub fn run_command(&self, command: &[String]) -> io::Result<CommandResult> {
        let Some((program, args)) = command.split_first() else {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "Empty command"));
        };

        let stdout_path = self.meta_dir.join("stdout.log");
        let stderr_path = self.meta_dir.join("stderr.log");
        let start = Instant::now();
        let timeout = self.config.timeout;

        let mut cmd = Command::new(program);
        cmd.args(args)
            .current_dir(&self.project_dir)
            .stdin(Stdio::null())
            .stdout(File::create(&stdout_path)?)
            .stderr(File::create(&stderr_path)?);

        cmd.env("EXPECTIFY_SANDBOX", "1");
        for (key, value) in &self.config.extra_env {
            cmd.env(key, value);
        }

        debug!(command = ?command, cwd = %self.project_dir.display(), "running command in sandbox");
        let mut child = cmd.spawn()?;

        let (exit_code, success, timed_out) = match child.wait_timeout(timeout)? {
            Some(status) => (status.code(), status.success(), false),
            None => {
                let _ = child.kill();
                let _ = child.wait();
                warn!(
                    "Command timed out after {:?}: {:?}",
                    start.elapsed(),
                    command
                );
                (None, false, true)
            }
        };

        Ok(CommandResult {
            success,
            exit_code,
            timed_out,
            stdout: read_lossy(&stdout_path),
            stderr: read_lossy(&stderr_path),
            duration: start.elapsed(),
            command: command.to_vec(),
        })
    }

    /// Mark this sandbox to be preserved (not cleaned up on drop).
    pub fn persist(&mut self) {
        if let Some(temp_dir) = self.temp_dir.take() {
            let path = temp_dir.keep();
            self.project_dir = path.join("project");
            self.meta_dir = path.join(".expectify_meta");
            self.sandbox_root = path;
        }
    }

    /// Explicitly dispose the sandbox.
    ///
    /// Returns the preserved path when `keep_sandbox` is configured.
    pub fn dispose(mut self) -> Option<PathBuf> {
        if self.config.keep_sandbox {
            self.persist();
            Some(self.sandbox_root.clone())
        } else {
            None
        }
    }
}

fn copy_file(from: &Path, to: &Path) -> io::Result<()> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::copy(from, to)?;
    Ok(())
}

fn read_lossy(path: &Path) -> String {
    fs::read(path)
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}

// ============================================================================
// Command Result
// ============================================================================

/// Result of running a command in the sandbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResult {
    /// Whether the command succeeded (exit code 0).
    pub success: bool,
    /// Exit code if available.
    pub exit_code: Option<i32>,
    /// Whether the command was killed for exceeding the timeout.
    pub timed_out: bool,
    pub stdout: String,
    pub stderr: String,
    /// How long the command took.
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// The command that was run.
    pub command: Vec<String>,
}

/// Serde helper for serializing `Duration` as `f64` seconds.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Ok(Duration::from_secs_f64(secs))
    }
}

// ============================================================================
// Tests
// ============================================================================
