//! Removal safety: the pure predicate gating every destructive action.

use crate::git::WorktreeStatus;

/// Verdict on whether a worktree may be removed, with human-readable reasons
/// for the veto in a fixed order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovalVerdict {
    pub can_remove: bool,
    pub reasons: Vec<&'static str>,
}

impl RemovalVerdict {
    /// Reasons joined for log output, e.g.
    /// `"uncommitted changes, operation in progress"`.
    pub fn joined_reasons(&self) -> String {
        self.reasons.join(", ")
    }
}

/// Evaluate whether a worktree can be removed without destroying user work.
///
/// `upstream_gone` does not by itself forbid removal; the reconciler handles
/// the `upstream_gone && has_unpushed_commits` combination separately with a
/// manual-review warning.
pub fn evaluate(status: &WorktreeStatus) -> RemovalVerdict {
    let mut reasons = Vec::new();

    if !status.is_clean {
        reasons.push("uncommitted changes");
    }
    if status.has_unpushed_commits {
        reasons.push("unpushed commits");
    }
    if status.has_stash {
        reasons.push("stashed changes");
    }
    if status.has_operation_in_progress {
        reasons.push("operation in progress");
    }
    if status.has_modified_submodules {
        reasons.push("modified submodules");
    }

    RemovalVerdict {
        can_remove: reasons.is_empty(),
        reasons,
    }
}

/// Verdict when the status itself could not be determined: never remove.
pub fn verdict_on_error() -> RemovalVerdict {
    RemovalVerdict {
        can_remove: false,
        reasons: vec!["error checking worktree"],
    }
}
