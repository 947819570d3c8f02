//! Orphan sweep: removing top-level directories that belong to no worktree.

use std::path::{Path, PathBuf};

use normalize_path::NormalizePath;

use crate::git::Worktree;
use crate::path::format_path_for_display;

/// The reserved quarantine directory; never a sweep candidate.
pub(crate) const DIVERGED_DIR: &str = ".diverged";

/// Remove top-level directories under `root` that are neither a registered
/// worktree nor a parent of one. Returns the number of directories removed.
///
/// Errors on individual entries are logged and skipped; a failure to read the
/// root itself skips the whole sweep (the rest of the pass continues).
pub(crate) fn sweep(root: &Path, worktrees: &[Worktree]) -> usize {
    let worktree_rels = worktree_relative_paths(root, worktrees);

    let entries = match std::fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) => {
            log::warn!(
                "Cannot scan worktree root {}: {e}; skipping orphan sweep",
                format_path_for_display(root)
            );
            return 0;
        }
    };

    let mut removed = 0;
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                log::warn!(
                    "Skipping unreadable entry under {}: {e}",
                    format_path_for_display(root)
                );
                continue;
            }
        };

        let name = entry.file_name();
        if name == DIVERGED_DIR {
            continue;
        }

        let name = PathBuf::from(name);
        if worktree_rels.iter().any(|rel| rel.starts_with(&name)) {
            continue;
        }

        let path = entry.path();
        if !path.is_dir() {
            continue;
        }

        log::info!(
            "Removing orphaned directory {}",
            format_path_for_display(&path)
        );
        match std::fs::remove_dir_all(&path) {
            Ok(()) => removed += 1,
            Err(e) => log::warn!(
                "Failed to remove orphaned {}: {e}",
                format_path_for_display(&path)
            ),
        }
    }

    removed
}

/// Worktree paths relative to the root. Worktrees outside the root (or whose
/// paths cannot be related to it) are ignored: they can never mark a root
/// entry as in use.
fn worktree_relative_paths(root: &Path, worktrees: &[Worktree]) -> Vec<PathBuf> {
    let canonical_root = dunce::canonicalize(root).unwrap_or_else(|_| root.to_path_buf());

    worktrees
        .iter()
        .filter_map(|worktree| {
            let path = dunce::canonicalize(&worktree.path)
                .unwrap_or_else(|_| worktree.path.normalize());
            path.strip_prefix(&canonical_root)
                .or_else(|_| worktree.path.strip_prefix(root))
                .map(Path::to_path_buf)
                .ok()
        })
        .filter(|rel| !rel.as_os_str().is_empty())
        .collect()
}
