//! Git operations over the git CLI: the backend the reconciler drives.

use std::path::PathBuf;

mod backend;
mod error;
mod parse;
mod url;

pub use backend::Git;
pub use error::{GitError, GitErrorKind};
pub use url::GitRemoteUrl;

/// One entry from `git worktree list --porcelain`.
///
/// A worktree is identified externally by its branch and internally (by git,
/// and by the metadata store) by the basename of its path. The two differ for
/// nested branches like `feat/LCR-8879`.
#[derive(Debug, Clone, PartialEq)]
pub struct Worktree {
    pub path: PathBuf,
    /// Checked-out branch; `None` for detached HEAD.
    pub branch: Option<String>,
}

impl Worktree {
    /// Git's internal key for this worktree: the basename of its path.
    ///
    /// Every path and metadata operation must use this, never the branch
    /// name.
    pub fn dir_name(&self) -> Option<&str> {
        self.path.file_name().and_then(|n| n.to_str())
    }
}

/// A remote branch with its last-activity timestamp, for age filtering.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteBranch {
    pub name: String,
    pub last_commit: chrono::DateTime<chrono::Utc>,
}

/// Observed state of a worktree: six independent predicates.
///
/// Any combination can hold at once; the derived removal verdict lives in
/// [`crate::safety`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorktreeStatus {
    pub is_clean: bool,
    pub has_unpushed_commits: bool,
    pub has_stash: bool,
    pub has_operation_in_progress: bool,
    pub has_modified_submodules: bool,
    pub upstream_gone: bool,
}
