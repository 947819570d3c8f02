//! The reconciler: one repository's branch/worktree state machine.
//!
//! A sync pass runs nine ordered steps: fetch, enumerate remote branches
//! (optionally age-filtered), ensure the worktree root, enumerate worktrees,
//! sweep orphans, create missing worktrees, update existing ones, delete
//! stale ones (gated by the safety evaluator), prune. Every observation is a
//! snapshot (disk and remote can change between git invocations), so state
//! is re-queried after actions that invalidate it, and per-branch failures
//! are contained to their branch.

mod orphans;
mod quarantine;

pub use quarantine::DivergedInfo;

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use fs2::FileExt;
use indexmap::IndexSet;

use crate::config::{BranchMaxAge, RepoConfig};
use crate::git::{Git, GitError, GitErrorKind, Worktree};
use crate::metadata::{MetadataStore, SyncAction};
use crate::path::{format_path_for_display, worktree_path_for_branch};
use crate::retry::{self, RetryPolicy, SyncError};
use crate::safety;
use crate::shutdown::Shutdown;

/// What one sync pass did, for the completion signal and the summary line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    pub created: usize,
    pub updated: usize,
    pub reset: usize,
    pub quarantined: usize,
    pub removed: usize,
    pub orphans_removed: usize,
    pub skipped: usize,
    pub retained: usize,
    pub completed_at: Option<DateTime<Utc>>,
}

impl std::fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "created {}, updated {}, reset {}, quarantined {}, removed {}, orphans {}, skipped {}, retained {}",
            self.created,
            self.updated,
            self.reset,
            self.quarantined,
            self.removed,
            self.orphans_removed,
            self.skipped,
            self.retained
        )
    }
}

/// Reconciles one repository. Owns the bare clone, the worktree root, and the
/// metadata sidecars; nothing is shared between reconcilers.
pub struct Reconciler {
    name: String,
    git: Git,
    store: MetadataStore,
    worktree_dir: PathBuf,
    default_branch: String,
    update_existing: bool,
    branch_max_age: Option<BranchMaxAge>,
    skip_lfs: bool,
    retry: RetryPolicy,
    shutdown: Shutdown,
    /// Serializes passes on this handle: a re-entrant `sync()` blocks until
    /// the in-flight pass finishes.
    pass_guard: Mutex<()>,
}

impl Reconciler {
    /// Prepare a repository for syncing: open or create the bare clone,
    /// resolve the default branch, and make sure the main worktree exists.
    pub fn init(config: &RepoConfig, shutdown: Shutdown) -> anyhow::Result<Self> {
        let name = config.display_name();
        // Git commands run from the bare clone's directory, so both roots
        // must be absolute before any of them is spawned.
        let worktree_dir = std::path::absolute(config.resolved_worktree_dir())?;
        let bare_repo_dir = std::path::absolute(config.resolved_bare_repo_dir())?;

        let git = Git::init_bare(&config.repo_url, &bare_repo_dir, config.skip_lfs, &name)?;
        let default_branch = match &config.default_branch {
            Some(branch) => branch.clone(),
            None => git.default_branch()?,
        };

        std::fs::create_dir_all(&worktree_dir)?;
        git.ensure_main_worktree(&worktree_dir, &default_branch)?;

        let store = MetadataStore::new(git.git_dir());

        Ok(Self {
            name,
            store,
            worktree_dir,
            default_branch,
            update_existing: config.update_existing_worktrees,
            branch_max_age: config.branch_max_age,
            skip_lfs: config.skip_lfs,
            retry: config.retry.policy(),
            shutdown,
            pass_guard: Mutex::new(()),
            git,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn default_branch(&self) -> &str {
        &self.default_branch
    }

    /// Run one synchronization pass, retrying transient failures with
    /// backoff. Never runs concurrently with itself on the same handle.
    pub fn sync(&self) -> Result<SyncOutcome, SyncError> {
        let _pass = self.pass_guard.lock().unwrap_or_else(|e| e.into_inner());
        let _repo_lock = self.acquire_repo_lock();
        retry::with_retry(&self.retry, &self.shutdown, || self.sync_once())
    }

    /// Advisory cross-process lock on the bare clone. Blocks if another
    /// process is mid-pass; degraded (but logged) when the filesystem does
    /// not support locking.
    fn acquire_repo_lock(&self) -> Option<std::fs::File> {
        let path = self.git.git_dir().join("sync-worktrees.lock");
        let file = match std::fs::File::create(&path) {
            Ok(file) => file,
            Err(e) => {
                log::warn!(
                    "Cannot create {}: {e}; continuing unlocked",
                    format_path_for_display(&path)
                );
                return None;
            }
        };
        match file.lock_exclusive() {
            Ok(()) => Some(file),
            Err(e) => {
                log::warn!(
                    "Cannot lock {}: {e}; continuing unlocked",
                    format_path_for_display(&path)
                );
                None
            }
        }
    }

    fn ensure_not_cancelled(&self) -> Result<(), GitError> {
        if self.shutdown.is_cancelled() {
            Err(GitError::new(GitErrorKind::Other, "sync cancelled"))
        } else {
            Ok(())
        }
    }

    // =========================================================================
    // The pass
    // =========================================================================

    fn sync_once(&self) -> Result<SyncOutcome, GitError> {
        let mut outcome = SyncOutcome::default();

        // 1. Fetch, with the per-branch LFS fallback.
        self.fetch_with_lfs_fallback()?;
        self.ensure_not_cancelled()?;

        // 2. Enumerate remote branches.
        let branches = self.remote_branches()?;
        log::debug!("[{}] {} remote branch(es)", self.name, branches.len());

        // 3. Ensure the worktree root exists.
        std::fs::create_dir_all(&self.worktree_dir)?;

        // 4. Enumerate worktrees.
        let worktrees = self.git.list_worktrees()?;

        // 5. Orphan sweep.
        outcome.orphans_removed = orphans::sweep(&self.worktree_dir, &worktrees);
        self.ensure_not_cancelled()?;

        // 6. Create missing worktrees.
        for branch in &branches {
            self.ensure_not_cancelled()?;
            if branch == &self.default_branch {
                continue;
            }
            if worktrees
                .iter()
                .any(|w| w.branch.as_deref() == Some(branch.as_str()))
            {
                continue;
            }
            self.create_worktree(branch, &mut outcome);
        }

        // Steps 6 and 7/8 must not act on a stale snapshot of each other.
        let worktrees = self.git.list_worktrees()?;

        // 7. Update existing worktrees.
        if self.update_existing {
            for worktree in &worktrees {
                self.ensure_not_cancelled()?;
                let Some(branch) = worktree.branch.clone() else {
                    continue;
                };
                if !branches.contains(branch.as_str()) {
                    continue;
                }
                if let Err(e) = self.update_worktree(worktree, &branch, &mut outcome) {
                    log::error!("Error checking worktree '{branch}': {e}");
                }
            }
        }

        // 8. Delete stale worktrees.
        for worktree in &worktrees {
            self.ensure_not_cancelled()?;
            let Some(branch) = worktree.branch.clone() else {
                // Detached worktrees have no branch to be stale against.
                continue;
            };
            if branches.contains(branch.as_str()) || branch == self.default_branch {
                continue;
            }
            self.remove_stale_worktree(worktree, &branch, &mut outcome);
        }

        // 9. Prune. Non-critical: retries on its own, never fails the pass.
        retry::best_effort(&self.retry, &self.shutdown, "worktree prune", || {
            self.git.prune_worktrees()
        });

        outcome.completed_at = Some(Utc::now());
        log::info!("[{}] Sync complete: {outcome}", self.name);
        Ok(outcome)
    }

    /// Step 1: `fetch --all --prune`, falling back to per-branch fetches with
    /// `GIT_LFS_SKIP_SMUDGE=1` when an LFS smudge failure occurs and LFS is
    /// not already being skipped.
    fn fetch_with_lfs_fallback(&self) -> Result<(), GitError> {
        let error = match self.git.fetch() {
            Ok(()) => return Ok(()),
            Err(error) => error,
        };
        if error.kind != GitErrorKind::Lfs {
            return Err(error);
        }
        if self.skip_lfs {
            // Already skipping smudge and still failing; nothing left to try.
            return Err(GitError::new(
                GitErrorKind::Lfs,
                "LFS error retry limit exceeded",
            ));
        }

        log::warn!(
            "[{}] Fetch failed with an LFS smudge error; retrying per branch with GIT_LFS_SKIP_SMUDGE=1",
            self.name
        );
        let worktrees = self.git.list_worktrees().unwrap_or_default();
        for branch in self.git.list_remote_branches()? {
            self.ensure_not_cancelled()?;
            match self.git.fetch_branch(&branch, true) {
                Ok(()) => {
                    if let Some(worktree) = worktrees
                        .iter()
                        .find(|w| w.branch.as_deref() == Some(branch.as_str()))
                    {
                        self.record(&worktree.path, &branch, SyncAction::Fetched);
                    }
                }
                Err(e) => log::error!("Failed to fetch branch '{branch}': {e}"),
            }
        }
        Ok(())
    }

    /// Step 2: the remote branch set, age-filtered when configured.
    fn remote_branches(&self) -> Result<IndexSet<String>, GitError> {
        let Some(max_age) = self.branch_max_age else {
            return Ok(self.git.list_remote_branches()?.into_iter().collect());
        };

        let cutoff = Utc::now() - max_age.to_duration();
        let all = self.git.list_remote_branches_with_activity()?;
        let total = all.len();
        let retained: IndexSet<String> = all
            .into_iter()
            .filter(|branch| branch.last_commit >= cutoff)
            .map(|branch| branch.name)
            .collect();

        let excluded = total - retained.len();
        if excluded > 0 {
            log::info!(
                "[{}] Excluding {excluded} branch(es) with no activity in the last {max_age}",
                self.name
            );
        }
        Ok(retained)
    }

    /// Step 6, one branch: materialize a worktree at `<root>/<branch>`.
    fn create_worktree(&self, branch: &str, outcome: &mut SyncOutcome) {
        let path = match worktree_path_for_branch(&self.worktree_dir, branch) {
            Ok(path) => path,
            Err(e) => {
                log::error!("Refusing to create worktree for '{branch}': {e:#}");
                return;
            }
        };
        match self.git.add_worktree(branch, &path) {
            Ok(()) => {
                log::info!("Created worktree for branch '{branch}'");
                self.record(&path, branch, SyncAction::Created);
                outcome.created += 1;
            }
            Err(e) => log::error!("Failed to create worktree for branch '{branch}': {e}"),
        }
    }

    /// Step 7, one worktree: bring it back into alignment with the remote.
    fn update_worktree(
        &self,
        worktree: &Worktree,
        branch: &str,
        outcome: &mut SyncOutcome,
    ) -> Result<(), GitError> {
        let status = self.git.full_status(&worktree.path)?;

        // Anything in progress or not committed makes the worktree
        // untouchable this pass. Unpushed commits alone don't: they are
        // protected by the metadata gate before any reset.
        if !status.is_clean
            || status.has_stash
            || status.has_operation_in_progress
            || status.has_modified_submodules
        {
            let verdict = safety::evaluate(&status);
            log::info!(
                "Skipping update of '{branch}' due to: {}",
                verdict.joined_reasons()
            );
            outcome.skipped += 1;
            return Ok(());
        }

        if self.git.can_fast_forward(&worktree.path, branch)? {
            if self.git.is_behind(&worktree.path, branch)? {
                match self.git.update(&worktree.path, branch) {
                    Ok(()) => {
                        log::info!("Updated '{branch}' to the remote tip");
                        self.record(&worktree.path, branch, SyncAction::Updated);
                        outcome.updated += 1;
                    }
                    Err(e) if e.kind == GitErrorKind::NonFastForward => {
                        // The remote moved between the check and the merge;
                        // treat the worktree as diverged.
                        self.handle_diverged(worktree, branch, outcome)?;
                    }
                    Err(e) => {
                        log::error!("Failed to update '{branch}':");
                        log::error!("  {e}");
                    }
                }
            }
            return Ok(());
        }

        self.handle_diverged(worktree, branch, outcome)
    }

    /// A worktree whose history has diverged from the remote.
    fn handle_diverged(
        &self,
        worktree: &Worktree,
        branch: &str,
        outcome: &mut SyncOutcome,
    ) -> Result<(), GitError> {
        // Same tree content with different history is a clean upstream
        // rebase: resetting loses nothing.
        if self.git.tree_content_matches(&worktree.path, branch)? {
            self.git.reset_to_upstream(&worktree.path, branch)?;
            log::info!("Reset '{branch}' to upstream after a clean rebase");
            self.record(&worktree.path, branch, SyncAction::Updated);
            outcome.reset += 1;
            return Ok(());
        }

        // Metadata decides whether the user made local commits since the
        // last sync. Missing or stale metadata means unknown provenance:
        // quarantine rather than guess.
        let current = self.git.current_commit(&worktree.path)?;
        if let Some(metadata) = self.store.load(&worktree.path)
            && metadata.last_sync_commit == current
        {
            self.git.reset_to_upstream(&worktree.path, branch)?;
            log::info!("Reset '{branch}' to upstream (no local commits since last sync)");
            self.record(&worktree.path, branch, SyncAction::Updated);
            outcome.reset += 1;
            return Ok(());
        }

        quarantine::quarantine_and_recreate(
            &self.git,
            &self.worktree_dir,
            &worktree.path,
            branch,
            &current,
        )?;
        self.record(&worktree.path, branch, SyncAction::Created);
        outcome.quarantined += 1;
        Ok(())
    }

    /// Step 8, one worktree: remove it iff the safety evaluator allows.
    fn remove_stale_worktree(
        &self,
        worktree: &Worktree,
        branch: &str,
        outcome: &mut SyncOutcome,
    ) {
        let status = match self.git.full_status(&worktree.path) {
            Ok(status) => status,
            Err(e) => {
                // Unknown state is never deleted.
                log::error!("Error checking worktree '{branch}': {e}");
                let verdict = safety::verdict_on_error();
                log::warn!(
                    "  - ⚠️ Skipping removal of '{branch}' due to: {}.",
                    verdict.joined_reasons()
                );
                outcome.retained += 1;
                return;
            }
        };

        let verdict = safety::evaluate(&status);
        if verdict.can_remove {
            match self.git.remove_worktree(&worktree.path) {
                Ok(()) => {
                    log::info!("Removed worktree '{branch}' (branch deleted on remote)");
                    outcome.removed += 1;
                }
                Err(e) => {
                    log::error!("Failed to remove worktree '{branch}': {e}");
                    outcome.retained += 1;
                }
            }
            return;
        }

        log::warn!(
            "  - ⚠️ Skipping removal of '{branch}' due to: {}.",
            verdict.joined_reasons()
        );
        if status.upstream_gone && status.has_unpushed_commits {
            // The unpushed commits cannot be recovered from the remote.
            log::warn!(
                "⚠️  Cannot automatically remove '{branch}' - upstream branch was deleted but local commits exist."
            );
            log::warn!(
                "   Review it, then remove manually with: git worktree remove --force {}",
                format_path_for_display(&worktree.path)
            );
        }
        outcome.retained += 1;
    }

    /// Record a completed action in the worktree's metadata sidecar.
    /// Metadata failures are logged, never fatal: losing provenance degrades
    /// to the conservative quarantine path later.
    fn record(&self, path: &Path, branch: &str, action: SyncAction) {
        let commit = match self.git.current_commit(path) {
            Ok(commit) => commit,
            Err(e) => {
                log::warn!("Failed to read HEAD of '{branch}' for sync metadata: {e}");
                return;
            }
        };
        let upstream = format!("origin/{branch}");
        if let Err(e) =
            self.store
                .record_sync(path, &commit, &upstream, &self.default_branch, action)
        {
            log::warn!("Failed to record sync metadata for '{branch}': {e:#}");
        }
    }
}
