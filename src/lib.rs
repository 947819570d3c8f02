//! Mirror a remote's branches into a local directory of Git worktrees.
//!
//! For every branch on the remote (optionally restricted by last-activity
//! age), a worktree exists under the configured root; worktrees whose branch
//! disappeared from the remote are removed, but only when no user work
//! would be destroyed. Worktrees that drifted from the remote are realigned,
//! quarantining local content under `.diverged/` rather than discarding it.
//!
//! The crate is a library plus a small CLI; the [`reconcile::Reconciler`] is
//! the per-repository engine, driven either once or on a cron schedule by
//! [`scheduler`].

pub mod config;
pub mod exec;
pub mod git;
pub mod metadata;
pub mod path;
pub mod reconcile;
pub mod retry;
pub mod safety;
pub mod scheduler;
pub mod shutdown;
