//! Path helpers: containment checks, safe parent creation, display formatting.

use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use normalize_path::NormalizePath;

/// Resolve `branch` to a worktree path under `root`, rejecting escapes.
///
/// Branch names may contain `/`, which maps to nested directories, but a
/// malicious or corrupt name (`../elsewhere`) must never resolve outside the
/// worktrees root. The check is lexical so it works before the path exists.
pub fn worktree_path_for_branch(root: &Path, branch: &str) -> anyhow::Result<PathBuf> {
    let normalized_root = root.normalize();
    let candidate = root.join(branch).normalize();

    if candidate == normalized_root || !candidate.starts_with(&normalized_root) {
        bail!(
            "branch '{}' resolves outside the worktree root {}",
            branch,
            root.display()
        );
    }

    Ok(candidate)
}

/// Create the parent directory of `path`, rejecting root-like targets.
///
/// A bare clone must never be materialized directly at `/`, `.`, a drive
/// root, or a path whose parent normalizes to the path itself. Catching these
/// here keeps a misconfigured `bare_repo_dir` from scattering git metadata
/// across the filesystem.
pub fn create_parent_dir(path: &Path) -> anyhow::Result<()> {
    let Some(parent) = path.parent() else {
        bail!("refusing to use root-like path {}", path.display());
    };

    if parent.as_os_str().is_empty() {
        // Relative single-component path; nothing to create.
        return Ok(());
    }

    let normalized = path.normalize();
    if parent.parent().is_none() || parent.normalize() == normalized || normalized == Path::new(".")
    {
        bail!("refusing to use root-like path {}", path.display());
    }

    std::fs::create_dir_all(parent)
        .with_context(|| format!("Failed to create {}", parent.display()))?;
    Ok(())
}

/// Format a filesystem path for user-facing output.
///
/// Replaces the home directory prefix with `~`. Paths outside home are
/// returned unchanged.
pub fn format_path_for_display(path: &Path) -> String {
    if let Some(home) = dirs::home_dir()
        && let Ok(stripped) = path.strip_prefix(&home)
    {
        if stripped.as_os_str().is_empty() {
            return "~".to_string();
        }

        let mut display_path = PathBuf::from("~");
        display_path.push(stripped);
        return display_path.display().to_string();
    }

    path.display().to_string()
}
