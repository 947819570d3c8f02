//! Quarantine: moving a diverged worktree aside instead of discarding it.
//!
//! A quarantined worktree lands at
//! `<root>/.diverged/<YYYY-MM-DD>-<sanitized-branch>-<random>` with a sibling
//! `<name>.diverged-info.json` manifest telling the user what happened and
//! how to inspect their changes.

use std::io;
use std::path::{Path, PathBuf};

use chrono::Local;
use rand::Rng;
use rand::distr::Alphanumeric;
use serde::{Deserialize, Serialize};

use crate::git::{Git, GitError};
use crate::path::format_path_for_display;

use super::orphans::DIVERGED_DIR;

const SUFFIX_LEN: usize = 6;

/// Manifest written next to each quarantined worktree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DivergedInfo {
    pub original_branch: String,
    pub original_path: String,
    pub reason: String,
    pub diverged_at: String,
    pub local_commit: String,
    pub remote_commit: String,
    pub instruction: String,
}

/// Move a diverged worktree into quarantine and re-create it at the remote
/// tip.
///
/// The move is atomic when `rename` works; a cross-device rename falls back
/// to copy-then-remove. A failed manifest write is logged and tolerated: a
/// quarantine without a manifest beats blocked reconciliation.
pub(crate) fn quarantine_and_recreate(
    git: &Git,
    worktree_root: &Path,
    worktree_path: &Path,
    branch: &str,
    local_commit: &str,
) -> Result<PathBuf, GitError> {
    let remote_commit = git.remote_commit(branch)?;

    let diverged_root = worktree_root.join(DIVERGED_DIR);
    std::fs::create_dir_all(&diverged_root)?;

    let (name, target) = unique_target(&diverged_root, branch);
    move_directory(worktree_path, &target)?;

    let info = DivergedInfo {
        original_branch: branch.to_string(),
        original_path: worktree_path.display().to_string(),
        reason: "diverged-history-with-changes".to_string(),
        diverged_at: Local::now().to_rfc3339(),
        local_commit: local_commit.to_string(),
        remote_commit: remote_commit.clone(),
        instruction: format!(
            "Your local changes are preserved in this directory. \
             Inspect them with `git diff origin/{branch}` from inside it, \
             or cherry-pick commits back onto the recreated worktree."
        ),
    };
    let info_path = diverged_root.join(format!("{name}.diverged-info.json"));
    if let Err(e) = write_info(&info_path, &info) {
        log::warn!(
            "Quarantined '{branch}' but failed to write {}: {e}",
            format_path_for_display(&info_path)
        );
    }

    log::warn!(
        "Branch '{branch}' diverged from origin with local changes; worktree moved to {}",
        format_path_for_display(&target)
    );

    // Clear git's bookkeeping for the moved-away path, then materialize a
    // fresh worktree at the remote tip. The directory is already gone, so
    // removal failures degrade to a prune.
    if let Err(e) = git.remove_worktree(worktree_path) {
        log::debug!("worktree remove after quarantine failed ({e}); pruning instead");
        git.prune_worktrees()?;
    }
    git.add_worktree(branch, worktree_path)?;
    git.reset_to_upstream(worktree_path, branch)?;

    Ok(target)
}

/// Pick a collision-free quarantine name: date, sanitized branch, random
/// suffix. Regenerates on the (unlikely) existing-path collision.
fn unique_target(diverged_root: &Path, branch: &str) -> (String, PathBuf) {
    let date = Local::now().format("%Y-%m-%d");
    let sanitized = sanitize_branch_name(branch);
    loop {
        let name = format!("{date}-{sanitized}-{}", random_suffix());
        let target = diverged_root.join(&name);
        if !target.exists() && !diverged_root.join(format!("{name}.diverged-info.json")).exists() {
            return (name, target);
        }
    }
}

/// Make a branch name filesystem-safe without losing the mapping back:
/// `/` becomes `-`, anything else unsafe becomes `_`.
pub(crate) fn sanitize_branch_name(branch: &str) -> String {
    sanitize_filename::sanitize_with_options(
        branch.replace('/', "-"),
        sanitize_filename::Options {
            windows: true,
            truncate: true,
            replacement: "_",
        },
    )
}

fn random_suffix() -> String {
    rand::rng()
        .sample_iter(Alphanumeric)
        .take(SUFFIX_LEN)
        .map(char::from)
        .collect::<String>()
        .to_lowercase()
}

fn write_info(path: &Path, info: &DivergedInfo) -> io::Result<()> {
    std::fs::write(path, serde_json::to_string_pretty(info)?)
}

/// `rename`, falling back to copy-then-remove across filesystems.
fn move_directory(from: &Path, to: &Path) -> io::Result<()> {
    match std::fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) if is_cross_device(&e) => {
            log::debug!(
                "rename {} -> {} crossed a device boundary; copying",
                from.display(),
                to.display()
            );
            copy_dir_recursive(from, to)?;
            std::fs::remove_dir_all(from)
        }
        Err(e) => Err(e),
    }
}

fn is_cross_device(e: &io::Error) -> bool {
    // EXDEV is 18 on Linux and macOS; the kind covers the rest.
    e.kind() == io::ErrorKind::CrossesDevices || e.raw_os_error() == Some(18)
}

fn copy_dir_recursive(from: &Path, to: &Path) -> io::Result<()> {
    std::fs::create_dir_all(to)?;
    for entry in std::fs::read_dir(from)? {
        let entry = entry?;
        let target = to.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_recursive(&entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn sanitizes_slashes_to_dashes_and_unsafe_chars_to_underscores() {
        insta::assert_snapshot!(sanitize_branch_name("feat/LCR-8879"), @"feat-LCR-8879");
        insta::assert_snapshot!(sanitize_branch_name("fix/a:b?c"), @"fix-a_b_c");
        assert_eq!(sanitize_branch_name("plain"), "plain");
    }

    #[test]
    fn sanitization_is_deterministic() {
        assert_eq!(
            sanitize_branch_name("feat/x"),
            sanitize_branch_name("feat/x")
        );
    }

    #[test]
    fn random_suffix_is_lowercase_alphanumeric() {
        for _ in 0..50 {
            let suffix = random_suffix();
            assert_eq!(suffix.len(), SUFFIX_LEN);
            assert!(
                suffix.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()),
                "bad suffix: {suffix}"
            );
        }
    }

    #[test]
    fn unique_target_avoids_existing_entries() {
        let tmp = TempDir::new().unwrap();
        let (_, first) = unique_target(tmp.path(), "feat/x");
        std::fs::create_dir_all(&first).unwrap();
        let (_, second) = unique_target(tmp.path(), "feat/x");
        assert_ne!(first, second);
    }

    #[test]
    fn quarantine_names_match_expected_shape() {
        let tmp = TempDir::new().unwrap();
        let (name, _) = unique_target(tmp.path(), "feature-with-local-changes");
        let re = regex::Regex::new(
            r"^\d{4}-\d{2}-\d{2}-feature-with-local-changes-[a-z0-9]+$",
        )
        .unwrap();
        assert!(re.is_match(&name), "unexpected name: {name}");
    }

    #[test]
    fn move_directory_preserves_contents() {
        let tmp = TempDir::new().unwrap();
        let from = tmp.path().join("from");
        std::fs::create_dir_all(from.join("sub")).unwrap();
        std::fs::write(from.join("sub/file.txt"), "data\n").unwrap();

        let to = tmp.path().join("to");
        move_directory(&from, &to).unwrap();

        assert!(!from.exists());
        assert_eq!(
            std::fs::read_to_string(to.join("sub/file.txt")).unwrap(),
            "data\n"
        );
    }

    #[test]
    fn copy_fallback_preserves_contents() {
        let tmp = TempDir::new().unwrap();
        let from = tmp.path().join("from");
        std::fs::create_dir_all(from.join("a/b")).unwrap();
        std::fs::write(from.join("a/b/deep.txt"), "deep\n").unwrap();

        let to = tmp.path().join("to");
        copy_dir_recursive(&from, &to).unwrap();
        std::fs::remove_dir_all(&from).unwrap();

        assert_eq!(
            std::fs::read_to_string(to.join("a/b/deep.txt")).unwrap(),
            "deep\n"
        );
    }

    #[test]
    fn manifest_round_trips_through_json() {
        let info = DivergedInfo {
            original_branch: "feat/x".into(),
            original_path: "/trees/feat/x".into(),
            reason: "diverged-history-with-changes".into(),
            diverged_at: "2026-08-01T10:00:00+00:00".into(),
            local_commit: "local456".into(),
            remote_commit: "remote789".into(),
            instruction: "Inspect with `git diff origin/feat/x`".into(),
        };
        let json = serde_json::to_string_pretty(&info).unwrap();
        assert!(json.contains("originalBranch"));
        assert!(json.contains("divergedAt"));
        let parsed: DivergedInfo = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, info);
    }
}
