//! The git backend: every operation the reconciler needs, over the git CLI.
//!
//! One [`Git`] instance owns one bare clone. Worktree-scoped operations take
//! the worktree path explicitly; repository-scoped operations run inside the
//! bare clone's git directory.

use std::path::{Path, PathBuf};
use std::process::Output;

use crate::exec::Cmd;
use crate::path::{create_parent_dir, format_path_for_display};

use super::parse;
use super::{GitError, GitErrorKind, RemoteBranch, Worktree, WorktreeStatus};

/// The fetch refspec a bare mirror needs so `origin/*` tracking refs exist.
const FETCH_REFSPEC: &str = "+refs/heads/*:refs/remotes/origin/*";

/// Files inside a worktree's git directory that mark an operation in
/// progress. `rebase-apply`/`rebase-merge` directories are checked separately.
const OPERATION_MARKERS: [&str; 5] = [
    "MERGE_HEAD",
    "REBASE_HEAD",
    "CHERRY_PICK_HEAD",
    "REVERT_HEAD",
    "BISECT_LOG",
];

/// Handle to a bare clone and its worktrees.
#[derive(Debug)]
pub struct Git {
    git_dir: PathBuf,
    remote_url: String,
    skip_lfs: bool,
    context: String,
}

impl Git {
    /// Open (or create) the bare clone backing a repository.
    ///
    /// Idempotent: when `<bare_repo_dir>/.git/HEAD` already exists the clone
    /// is reused; otherwise the parent directory is created (root-like
    /// targets rejected) and a fresh `git clone --bare` runs. Either way the
    /// fetch refspec is ensured exactly once.
    pub fn init_bare(
        remote_url: &str,
        bare_repo_dir: &Path,
        skip_lfs: bool,
        context: &str,
    ) -> Result<Self, GitError> {
        let git = Self {
            git_dir: bare_repo_dir.join(".git"),
            remote_url: remote_url.to_string(),
            skip_lfs,
            context: context.to_string(),
        };

        if git.git_dir.join("HEAD").exists() {
            log::debug!("Reusing bare clone at {}", git.git_dir.display());
        } else {
            create_parent_dir(&git.git_dir)
                .map_err(|e| GitError::new(GitErrorKind::Other, format!("{e:#}")))?;
            log::info!(
                "Cloning {} into {}",
                git.remote_url,
                format_path_for_display(&git.git_dir)
            );
            let git_dir = git.git_dir.to_str().ok_or_else(|| {
                GitError::new(GitErrorKind::Other, "bare clone path contains invalid UTF-8")
            })?;
            let mut cmd = Cmd::new("git")
                .args(["clone", "--bare", &git.remote_url, git_dir])
                .context(&git.context);
            if skip_lfs {
                cmd = cmd.env("GIT_LFS_SKIP_SMUDGE", "1");
            }
            Self::expect_success(cmd.run()?)?;
        }

        git.ensure_fetch_refspec()?;
        Ok(git)
    }

    /// The bare clone's git directory (`<bare_repo_dir>/.git`).
    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    /// Append the mirror refspec to `remote.origin.fetch` unless an identical
    /// entry is already present.
    fn ensure_fetch_refspec(&self) -> Result<(), GitError> {
        let output = self.run_output(&["config", "--get-all", "remote.origin.fetch"])?;
        // Exit code 1 means the key is unset; that's fine, we add it below.
        if !output.status.success() && output.status.code() != Some(1) {
            return Err(Self::failure(&output));
        }

        let existing = String::from_utf8_lossy(&output.stdout);
        if existing.lines().any(|line| line.trim() == FETCH_REFSPEC) {
            return Ok(());
        }

        self.run(&["config", "--add", "remote.origin.fetch", FETCH_REFSPEC])?;
        Ok(())
    }

    // =========================================================================
    // Command plumbing
    // =========================================================================

    fn git_cmd(&self, dir: &Path) -> Cmd {
        let mut cmd = Cmd::new("git").current_dir(dir).context(&self.context);
        if self.skip_lfs {
            cmd = cmd.env("GIT_LFS_SKIP_SMUDGE", "1");
        }
        cmd
    }

    /// Run a git command in the bare clone and return stdout.
    fn run(&self, args: &[&str]) -> Result<String, GitError> {
        self.run_in(&self.git_dir, args)
    }

    /// Run a git command in an arbitrary directory and return stdout.
    fn run_in(&self, dir: &Path, args: &[&str]) -> Result<String, GitError> {
        let output = self.git_cmd(dir).args(args.iter().copied()).run()?;
        Self::expect_success(output)
    }

    /// Run in the bare clone and return the raw output, for commands whose
    /// exit code carries meaning.
    fn run_output(&self, args: &[&str]) -> Result<Output, GitError> {
        Ok(self
            .git_cmd(&self.git_dir)
            .args(args.iter().copied())
            .run()?)
    }

    fn run_output_in(&self, dir: &Path, args: &[&str]) -> Result<Output, GitError> {
        Ok(self.git_cmd(dir).args(args.iter().copied()).run()?)
    }

    fn expect_success(output: Output) -> Result<String, GitError> {
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            Err(Self::failure(&output))
        }
    }

    fn failure(output: &Output) -> GitError {
        // Git uses \r for progress updates; normalize for stable messages.
        let stderr = String::from_utf8_lossy(&output.stderr).replace('\r', "\n");
        // Some git commands print errors to stdout.
        let stdout = String::from_utf8_lossy(&output.stdout);
        let message = [stderr.trim(), stdout.trim()]
            .into_iter()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n");
        GitError::from_stderr(message)
    }

    fn utf8_path<'p>(path: &'p Path) -> Result<&'p str, GitError> {
        path.to_str().ok_or_else(|| {
            GitError::new(
                GitErrorKind::Other,
                format!("path contains invalid UTF-8: {}", path.display()),
            )
        })
    }

    // =========================================================================
    // Fetch and remote enumeration
    // =========================================================================

    /// Fetch all remotes, pruning deleted remote-tracking refs.
    pub fn fetch(&self) -> Result<(), GitError> {
        self.run(&["fetch", "--all", "--prune"])?;
        Ok(())
    }

    /// Fetch a single branch, optionally forcing `GIT_LFS_SKIP_SMUDGE=1` for
    /// this invocation regardless of configuration.
    pub fn fetch_branch(&self, branch: &str, skip_lfs: bool) -> Result<(), GitError> {
        let refspec = format!("+refs/heads/{branch}:refs/remotes/origin/{branch}");
        let mut cmd = self
            .git_cmd(&self.git_dir)
            .args(["fetch", "origin", refspec.as_str()]);
        if skip_lfs {
            cmd = cmd.env("GIT_LFS_SKIP_SMUDGE", "1");
        }
        Self::expect_success(cmd.run()?)?;
        Ok(())
    }

    /// List branch names under `origin/`, prefix stripped, in ref order.
    pub fn list_remote_branches(&self) -> Result<Vec<String>, GitError> {
        let output = self.run(&[
            "for-each-ref",
            "--format=%(refname:strip=3)",
            "refs/remotes/origin",
        ])?;
        Ok(parse::parse_remote_branches(&output))
    }

    /// Like [`list_remote_branches`](Self::list_remote_branches) but paired
    /// with each branch's last commit timestamp, for age filtering.
    pub fn list_remote_branches_with_activity(&self) -> Result<Vec<RemoteBranch>, GitError> {
        let output = self.run(&[
            "for-each-ref",
            "--format=%(refname:strip=3) %(committerdate:unix)",
            "refs/remotes/origin",
        ])?;
        Ok(parse::parse_remote_branches_with_activity(&output))
    }

    /// Determine the remote's default branch.
    ///
    /// A bare clone's HEAD normally points at it; if not, ask the remote via
    /// `ls-remote --symref`, then fall back to `main`/`master`.
    pub fn default_branch(&self) -> Result<String, GitError> {
        if let Ok(output) = self.run(&["symbolic-ref", "--short", "HEAD"]) {
            let branch = output.trim();
            if !branch.is_empty() {
                return Ok(branch.to_string());
            }
        }

        if let Ok(output) = self.run(&["ls-remote", "--symref", &self.remote_url, "HEAD"])
            && let Some(branch) = parse::parse_symref_head(&output)
        {
            return Ok(branch);
        }

        for candidate in ["main", "master"] {
            if self.has_remote_branch(candidate)? {
                return Ok(candidate.to_string());
            }
        }

        Err(GitError::new(
            GitErrorKind::NotFound,
            "could not determine the default branch",
        ))
    }

    pub fn has_remote_branch(&self, branch: &str) -> Result<bool, GitError> {
        let r = format!("refs/remotes/origin/{branch}");
        let output = self.run_output(&["rev-parse", "--verify", "--quiet", &r])?;
        Ok(output.status.success())
    }

    pub fn has_local_branch(&self, branch: &str) -> Result<bool, GitError> {
        let r = format!("refs/heads/{branch}");
        let output = self.run_output(&["rev-parse", "--verify", "--quiet", &r])?;
        Ok(output.status.success())
    }

    // =========================================================================
    // Worktree management
    // =========================================================================

    /// Create a worktree for `branch` at `path`.
    ///
    /// Uses the existing local branch when one exists (initial bare clones
    /// carry all remote branches as local refs), otherwise creates a tracking
    /// branch from `origin/<branch>`. Upstream tracking is ensured either way
    /// so upstream-gone is detectable after the remote branch disappears.
    pub fn add_worktree(&self, branch: &str, path: &Path) -> Result<(), GitError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let path_str = Self::utf8_path(path)?;
        let upstream = format!("origin/{branch}");
        if self.has_local_branch(branch)? {
            self.run(&["worktree", "add", path_str, branch])?;
        } else {
            self.run(&[
                "worktree", "add", "--track", "-b", branch, path_str, &upstream,
            ])?;
        }

        if let Err(e) = self.run_in(path, &["branch", "--set-upstream-to", &upstream, branch]) {
            log::debug!("Could not set upstream for '{branch}': {e}");
        }
        Ok(())
    }

    /// Forcibly remove a worktree and its git bookkeeping.
    pub fn remove_worktree(&self, path: &Path) -> Result<(), GitError> {
        let path_str = Self::utf8_path(path)?;
        self.run(&["worktree", "remove", "--force", path_str])?;
        Ok(())
    }

    /// Drop bookkeeping for worktrees whose directories no longer exist.
    pub fn prune_worktrees(&self) -> Result<(), GitError> {
        self.run(&["worktree", "prune"])?;
        Ok(())
    }

    /// List registered worktrees (bare entry excluded).
    pub fn list_worktrees(&self) -> Result<Vec<Worktree>, GitError> {
        let output = self.run(&["worktree", "list", "--porcelain"])?;
        parse::parse_worktree_list(&output)
    }

    /// Make sure a worktree for the default branch exists at
    /// `<worktree_dir>/main`.
    pub fn ensure_main_worktree(
        &self,
        worktree_dir: &Path,
        default_branch: &str,
    ) -> Result<(), GitError> {
        let registered = self
            .list_worktrees()?
            .iter()
            .any(|w| w.branch.as_deref() == Some(default_branch));
        if registered {
            return Ok(());
        }
        self.add_worktree(default_branch, &worktree_dir.join("main"))
    }

    // =========================================================================
    // Worktree state queries
    // =========================================================================

    /// Current branch of the worktree, `None` when HEAD is detached.
    pub fn current_branch(&self, path: &Path) -> Result<Option<String>, GitError> {
        let output = self.run_in(path, &["branch", "--show-current"])?;
        let branch = output.trim();
        Ok((!branch.is_empty()).then(|| branch.to_string()))
    }

    pub fn is_clean(&self, path: &Path) -> Result<bool, GitError> {
        let output = self.run_in(path, &["status", "--porcelain"])?;
        Ok(output.trim().is_empty())
    }

    /// Commits on `branch` that exist on no remote-tracking ref.
    pub fn has_unpushed_commits(&self, path: &Path, branch: &str) -> Result<bool, GitError> {
        let output = self.run_in(path, &["rev-list", "--count", branch, "--not", "--remotes"])?;
        let count: u64 = output.trim().parse().map_err(|_| {
            GitError::new(
                GitErrorKind::Other,
                format!("unparseable rev-list count: {}", output.trim()),
            )
        })?;
        Ok(count > 0)
    }

    pub fn has_stash(&self, path: &Path) -> Result<bool, GitError> {
        let output = self.run_in(path, &["stash", "list"])?;
        Ok(!output.trim().is_empty())
    }

    /// A merge, rebase, cherry-pick, revert, or bisect is underway.
    pub fn has_operation_in_progress(&self, path: &Path) -> Result<bool, GitError> {
        let git_dir = self.worktree_git_dir(path)?;
        let marker_present = OPERATION_MARKERS
            .iter()
            .any(|marker| git_dir.join(marker).exists());
        Ok(marker_present
            || git_dir.join("rebase-apply").exists()
            || git_dir.join("rebase-merge").exists())
    }

    /// Any submodule checked out at a different commit or with conflicts.
    pub fn has_modified_submodules(&self, path: &Path) -> Result<bool, GitError> {
        // No .gitmodules means no output; exit code is still 0.
        let output = self.run_in(path, &["submodule", "status"])?;
        Ok(output
            .lines()
            .any(|line| line.starts_with('+') || line.starts_with('U')))
    }

    /// The branch's configured upstream has been deleted on the remote.
    pub fn upstream_gone(&self, path: &Path, branch: &str) -> Result<bool, GitError> {
        let r = format!("refs/heads/{branch}");
        let output = self.run_in(path, &["for-each-ref", "--format=%(upstream:track)", &r])?;
        Ok(output.trim() == "[gone]")
    }

    /// Composite status record for the safety evaluator.
    ///
    /// Fails (rather than guessing) on detached HEAD or any predicate error;
    /// the reconciler treats a failure here as "do not delete".
    pub fn full_status(&self, path: &Path) -> Result<WorktreeStatus, GitError> {
        let branch = self.current_branch(path)?.ok_or_else(|| {
            GitError::new(
                GitErrorKind::Corrupt,
                format!("ref HEAD is not a symbolic ref in {}", path.display()),
            )
        })?;

        Ok(WorktreeStatus {
            is_clean: self.is_clean(path)?,
            has_unpushed_commits: self.has_unpushed_commits(path, &branch)?,
            has_stash: self.has_stash(path)?,
            has_operation_in_progress: self.has_operation_in_progress(path)?,
            has_modified_submodules: self.has_modified_submodules(path)?,
            upstream_gone: self.upstream_gone(path, &branch)?,
        })
    }

    // =========================================================================
    // Alignment with the remote
    // =========================================================================

    pub fn is_behind(&self, path: &Path, branch: &str) -> Result<bool, GitError> {
        let range = format!("HEAD..origin/{branch}");
        let output = self.run_in(path, &["rev-list", "--count", &range])?;
        Ok(output.trim() != "0")
    }

    /// Whether HEAD is an ancestor of `origin/<branch>` (a fast-forward merge
    /// would succeed). Not authoritative: the remote can move between this
    /// check and the merge, so callers must handle a
    /// [`GitErrorKind::NonFastForward`] failure from [`update`](Self::update).
    pub fn can_fast_forward(&self, path: &Path, branch: &str) -> Result<bool, GitError> {
        let upstream = format!("origin/{branch}");
        let output =
            self.run_output_in(path, &["merge-base", "--is-ancestor", "HEAD", &upstream])?;
        match output.status.code() {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            _ => Err(Self::failure(&output)),
        }
    }

    /// True iff the local tree hash equals the remote branch's tree hash:
    /// histories differ but content is identical (a clean rebase upstream).
    pub fn tree_content_matches(&self, path: &Path, branch: &str) -> Result<bool, GitError> {
        let local = self.run_in(path, &["rev-parse", "HEAD^{tree}"])?;
        let remote_ref = format!("origin/{branch}^{{tree}}");
        let remote = self.run_in(path, &["rev-parse", &remote_ref])?;
        Ok(local.trim() == remote.trim())
    }

    /// Fast-forward-only merge of `origin/<branch>` into the worktree.
    pub fn update(&self, path: &Path, branch: &str) -> Result<(), GitError> {
        let upstream = format!("origin/{branch}");
        self.run_in(path, &["merge", "--ff-only", &upstream])?;
        Ok(())
    }

    /// Hard-reset the worktree to `origin/<branch>`.
    pub fn reset_to_upstream(&self, path: &Path, branch: &str) -> Result<(), GitError> {
        let upstream = format!("origin/{branch}");
        self.run_in(path, &["reset", "--hard", &upstream])?;
        Ok(())
    }

    pub fn current_commit(&self, path: &Path) -> Result<String, GitError> {
        let output = self.run_in(path, &["rev-parse", "HEAD"])?;
        Ok(output.trim().to_string())
    }

    pub fn remote_commit(&self, branch: &str) -> Result<String, GitError> {
        let r = format!("refs/remotes/origin/{branch}");
        let output = self.run(&["rev-parse", &r])?;
        Ok(output.trim().to_string())
    }

    /// The git directory private to one worktree
    /// (`<bare>/.git/worktrees/<dirname>`).
    fn worktree_git_dir(&self, path: &Path) -> Result<PathBuf, GitError> {
        let output = self.run_in(path, &["rev-parse", "--git-dir"])?;
        let git_dir = PathBuf::from(output.trim());
        if git_dir.is_relative() {
            Ok(path.join(git_dir))
        } else {
            Ok(git_dir)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use tempfile::TempDir;

    use super::*;

    /// Run git in a directory, panicking (with stderr) on failure.
    fn git(dir: &Path, args: &[&str]) -> String {
        let output = Cmd::new("git")
            .args(
                ["-c", "user.name=test", "-c", "user.email=test@example.com"]
                    .into_iter()
                    .chain(args.iter().copied()),
            )
            .current_dir(dir)
            .run()
            .expect("failed to spawn git");
        assert!(
            output.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8_lossy(&output.stdout).into_owned()
    }

    /// A local "remote": a normal repository with a main branch and one commit.
    fn origin_repo(tmp: &TempDir) -> std::path::PathBuf {
        let origin = tmp.path().join("origin");
        std::fs::create_dir_all(&origin).unwrap();
        git(&origin, &["init", "-b", "main"]);
        std::fs::write(origin.join("README.md"), "hello\n").unwrap();
        git(&origin, &["add", "."]);
        git(&origin, &["commit", "-m", "initial"]);
        origin
    }

    fn open(tmp: &TempDir, origin: &Path) -> Git {
        Git::init_bare(
            origin.to_str().unwrap(),
            &tmp.path().join("bare"),
            false,
            "test",
        )
        .unwrap()
    }

    #[test]
    fn init_bare_is_idempotent_and_configures_refspec_once() {
        let tmp = TempDir::new().unwrap();
        let origin = origin_repo(&tmp);

        let git1 = open(&tmp, &origin);
        assert!(git1.git_dir().join("HEAD").exists());

        // Second init must reuse the clone and must not duplicate the refspec.
        let git2 = open(&tmp, &origin);
        let refspecs = git2
            .run(&["config", "--get-all", "remote.origin.fetch"])
            .unwrap();
        let matching = refspecs
            .lines()
            .filter(|l| l.trim() == FETCH_REFSPEC)
            .count();
        assert_eq!(matching, 1, "refspec configured more than once: {refspecs}");
    }

    #[test]
    fn lists_remote_branches_after_fetch() {
        let tmp = TempDir::new().unwrap();
        let origin = origin_repo(&tmp);
        git(&origin, &["branch", "feat/nested"]);
        git(&origin, &["branch", "other"]);

        let backend = open(&tmp, &origin);
        backend.fetch().unwrap();

        let branches = backend.list_remote_branches().unwrap();
        assert!(branches.contains(&"main".to_string()), "{branches:?}");
        assert!(branches.contains(&"feat/nested".to_string()), "{branches:?}");
        assert!(branches.contains(&"other".to_string()), "{branches:?}");

        let with_activity = backend.list_remote_branches_with_activity().unwrap();
        assert_eq!(with_activity.len(), branches.len());
    }

    #[test]
    fn default_branch_comes_from_bare_head() {
        let tmp = TempDir::new().unwrap();
        let origin = origin_repo(&tmp);
        let backend = open(&tmp, &origin);
        assert_eq!(backend.default_branch().unwrap(), "main");
    }

    #[test]
    fn add_list_remove_worktree_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let origin = origin_repo(&tmp);
        git(&origin, &["branch", "feat/nested"]);

        let backend = open(&tmp, &origin);
        backend.fetch().unwrap();

        let wt_path = tmp.path().join("trees/feat/nested");
        backend.add_worktree("feat/nested", &wt_path).unwrap();
        assert!(wt_path.join("README.md").exists());

        let worktrees = backend.list_worktrees().unwrap();
        let entry = worktrees
            .iter()
            .find(|w| w.branch.as_deref() == Some("feat/nested"))
            .expect("worktree registered");
        assert_eq!(entry.dir_name(), Some("nested"));

        backend.remove_worktree(&wt_path).unwrap();
        assert!(!wt_path.exists());
        let worktrees = backend.list_worktrees().unwrap();
        assert!(!worktrees.iter().any(|w| w.branch.as_deref() == Some("feat/nested")));
    }

    #[test]
    fn full_status_reports_clean_worktree() {
        let tmp = TempDir::new().unwrap();
        let origin = origin_repo(&tmp);
        let backend = open(&tmp, &origin);
        backend.fetch().unwrap();

        let wt_path = tmp.path().join("trees/main");
        backend.ensure_main_worktree(&tmp.path().join("trees"), "main").unwrap();

        let status = backend.full_status(&wt_path).unwrap();
        assert!(status.is_clean);
        assert!(!status.has_unpushed_commits);
        assert!(!status.has_stash);
        assert!(!status.has_operation_in_progress);
        assert!(!status.has_modified_submodules);
        assert!(!status.upstream_gone);
    }

    #[test]
    fn full_status_sees_dirt_and_unpushed_commits() {
        let tmp = TempDir::new().unwrap();
        let origin = origin_repo(&tmp);
        let backend = open(&tmp, &origin);
        backend.fetch().unwrap();

        let trees = tmp.path().join("trees");
        backend.ensure_main_worktree(&trees, "main").unwrap();
        let wt_path = trees.join("main");

        std::fs::write(wt_path.join("scratch.txt"), "wip\n").unwrap();
        let status = backend.full_status(&wt_path).unwrap();
        assert!(!status.is_clean);

        git(&wt_path, &["add", "."]);
        git(&wt_path, &["commit", "-m", "local only"]);
        let status = backend.full_status(&wt_path).unwrap();
        assert!(status.has_unpushed_commits);
    }

    #[test]
    fn full_status_fails_on_detached_head() {
        let tmp = TempDir::new().unwrap();
        let origin = origin_repo(&tmp);
        let backend = open(&tmp, &origin);
        backend.fetch().unwrap();

        let trees = tmp.path().join("trees");
        backend.ensure_main_worktree(&trees, "main").unwrap();
        let wt_path = trees.join("main");
        git(&wt_path, &["checkout", "--detach"]);

        let err = backend.full_status(&wt_path).unwrap_err();
        assert_eq!(err.kind, GitErrorKind::Corrupt);
        assert!(err.stderr.contains("not a symbolic ref"));
    }

    #[test]
    fn behind_and_fast_forward_detection() {
        let tmp = TempDir::new().unwrap();
        let origin = origin_repo(&tmp);
        let backend = open(&tmp, &origin);
        backend.fetch().unwrap();

        let trees = tmp.path().join("trees");
        backend.ensure_main_worktree(&trees, "main").unwrap();
        let wt_path = trees.join("main");

        assert!(!backend.is_behind(&wt_path, "main").unwrap());

        std::fs::write(origin.join("new.txt"), "more\n").unwrap();
        git(&origin, &["add", "."]);
        git(&origin, &["commit", "-m", "second"]);
        backend.fetch().unwrap();

        assert!(backend.is_behind(&wt_path, "main").unwrap());
        assert!(backend.can_fast_forward(&wt_path, "main").unwrap());

        backend.update(&wt_path, "main").unwrap();
        assert!(!backend.is_behind(&wt_path, "main").unwrap());
        assert_eq!(
            backend.current_commit(&wt_path).unwrap(),
            backend.remote_commit("main").unwrap()
        );
    }

    #[test]
    fn tree_content_matches_after_upstream_reword() {
        let tmp = TempDir::new().unwrap();
        let origin = origin_repo(&tmp);
        let backend = open(&tmp, &origin);
        backend.fetch().unwrap();

        let trees = tmp.path().join("trees");
        backend.ensure_main_worktree(&trees, "main").unwrap();
        let wt_path = trees.join("main");

        // Reword the tip commit upstream: history diverges, tree does not.
        git(&origin, &["commit", "--amend", "-m", "initial, reworded"]);
        backend.fetch().unwrap();

        assert!(!backend.can_fast_forward(&wt_path, "main").unwrap());
        assert!(backend.tree_content_matches(&wt_path, "main").unwrap());
    }

    #[test]
    fn upstream_gone_after_remote_branch_deletion() {
        let tmp = TempDir::new().unwrap();
        let origin = origin_repo(&tmp);
        git(&origin, &["branch", "doomed"]);

        let backend = open(&tmp, &origin);
        backend.fetch().unwrap();

        let wt_path = tmp.path().join("trees/doomed");
        backend.add_worktree("doomed", &wt_path).unwrap();
        assert!(!backend.upstream_gone(&wt_path, "doomed").unwrap());

        git(&origin, &["branch", "-D", "doomed"]);
        backend.fetch().unwrap();
        assert!(backend.upstream_gone(&wt_path, "doomed").unwrap());
    }

    #[test]
    fn operation_in_progress_detects_merge_marker() {
        let tmp = TempDir::new().unwrap();
        let origin = origin_repo(&tmp);
        let backend = open(&tmp, &origin);
        backend.fetch().unwrap();

        let trees = tmp.path().join("trees");
        backend.ensure_main_worktree(&trees, "main").unwrap();
        let wt_path = trees.join("main");
        assert!(!backend.has_operation_in_progress(&wt_path).unwrap());

        // Simulate an interrupted merge by dropping the marker file.
        let git_dir = backend.worktree_git_dir(&wt_path).unwrap();
        std::fs::write(git_dir.join("MERGE_HEAD"), "0000\n").unwrap();
        assert!(backend.has_operation_in_progress(&wt_path).unwrap());
    }
}
