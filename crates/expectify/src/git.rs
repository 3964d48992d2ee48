//! Git repository queries.
//!
//! Only what a conversion run needs: whether the workspace is inside a
//! repository, whether the working tree is clean, and where the repository's
//! git directory lives (for `COMMIT_EDITMSG`).

use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;
use tracing::debug;

/// Errors from running git.
#[derive(Debug, Error)]
pub enum GitError {
    /// No `git` executable on PATH.
    #[error("git executable not found on PATH")]
    NotFound,

    /// git ran but reported failure.
    #[error("`git {args}` failed: {message}")]
    Command { args: String, message: String },

    #[error("failed to run git: {0}")]
    Io(#[from] std::io::Error),
}

fn git_binary() -> Result<PathBuf, GitError> {
    which::which("git").map_err(|_| GitError::NotFound)
}

/// Run git in `dir` and return trimmed stdout.
fn git(dir: &Path, args: &[&str]) -> Result<String, GitError> {
    let output = Command::new(git_binary()?)
        .args(args)
        .current_dir(dir)
        .output()?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(GitError::Command {
            args: args.join(" "),
            message: stderr.trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Whether `dir` is inside a git working tree.
///
/// A missing git executable counts as "not a repository".
pub fn inside_repository(dir: &Path) -> bool {
    match git(dir, &["rev-parse", "--is-inside-work-tree"]) {
        Ok(out) => out == "true",
        Err(e) => {
            debug!(error = %e, "not inside a git repository");
            false
        }
    }
}

/// Whether the working tree has no staged, unstaged or untracked changes.
pub fn is_clean(dir: &Path) -> Result<bool, GitError> {
    Ok(git(dir, &["status", "--porcelain"])?.is_empty())
}

/// Absolute path of the repository's git directory.
pub fn git_dir(dir: &Path) -> Result<PathBuf, GitError> {
    let out = git(dir, &["rev-parse", "--git-dir"])?;
    let path = PathBuf::from(out);
    Ok(if path.is_absolute() {
        path
    } else {
        dir.join(path)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn git_available() -> bool {
        git_binary().is_ok()
    }

    fn init_repo() -> TempDir {
        let dir = TempDir::new().unwrap();
        git(dir.path(), &["init", "-q"]).unwrap();
        dir
    }

    #[test]
    fn plain_directory_is_not_a_repository() {
        let dir = TempDir::new().unwrap();
        assert!(!inside_repository(dir.path()));
    }

    #[test]
    fn untracked_file_makes_tree_dirty() {
        if !git_available() {
            return;
        }
        let dir = init_repo();
        assert!(inside_repository(dir.path()));
        assert!(is_clean(dir.path()).unwrap());

        std::fs::write(dir.path().join("a_spec.rb"), "x").unwrap();
        assert!(!is_clean(dir.path()).unwrap());
    }

    #[test]
    fn git_dir_is_absolute() {
        if !git_available() {
            return;
        }
        let dir = init_repo();
        let git_dir = git_dir(dir.path()).unwrap();
        assert!(git_dir.is_absolute());
        assert!(git_dir.ends_with(".git"));
    }
}
