//! Git metadata for the `{{git}}` placeholder.

use crate::error::{EnvError, EnvResult};
use std::path::Path;
use std::process::Command;
use tracing::warn;

/// Run a git command in `dir` and return its trimmed stdout.
fn git(dir: &Path, args: &[&str]) -> EnvResult<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .map_err(|e| EnvError::resolver("git", format!("Failed to run git: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        warn!(dir = %dir.display(), "Git metadata unavailable: {}", stderr.trim());
        return Err(EnvError::resolver(
            "git",
            format!("git {} failed in {}: {}", args.join(" "), dir.display(), stderr.trim()),
        ));
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Where the repository containing `module_dir` currently is.
///
/// The branch name, or the short commit hash when HEAD is detached.
pub fn git_location(module_dir: &Path) -> EnvResult<String> {
    let branch = git(module_dir, &["rev-parse", "--abbrev-ref", "HEAD"])?;
    if branch != "HEAD" {
        return Ok(branch);
    }
    git(module_dir, &["rev-parse", "--short", "HEAD"])
}

/// Closest ancestor of `dir` (inclusive) that contains a `.git` entry.
pub fn find_repo_root(dir: &Path) -> Option<&Path> {
    dir.ancestors().find(|candidate| candidate.join(".git").exists())
}
