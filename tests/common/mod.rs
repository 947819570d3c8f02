//! Test fixtures: real git repositories in temp directories.
//!
//! `TestSetup` builds an "origin" repository the engine treats as its remote
//! (git clones local paths happily, so everything stays offline) plus the
//! worktree root and bare-clone location the reconciler will use.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::TempDir;

use sync_worktrees::config::{RepoConfig, RetrySettings};
use sync_worktrees::reconcile::Reconciler;
use sync_worktrees::shutdown::Shutdown;

/// Run git in `dir`, panicking with stderr on failure.
pub fn git(dir: &Path, args: &[&str]) -> String {
    git_with_env(dir, args, &[])
}

/// Run git with extra environment variables (e.g. commit dates).
pub fn git_with_env(dir: &Path, args: &[&str], envs: &[(&str, &str)]) -> String {
    let mut cmd = Command::new("git");
    cmd.args(["-c", "user.name=test", "-c", "user.email=test@example.com"])
        .args(args)
        .current_dir(dir);
    for (key, value) in envs {
        cmd.env(key, value);
    }
    let output = cmd.output().expect("failed to spawn git");
    assert!(
        output.status.success(),
        "git {:?} in {} failed: {}",
        args,
        dir.display(),
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).into_owned()
}

/// A disposable Shutdown handle that never fires.
pub fn idle_shutdown() -> Shutdown {
    sync_worktrees::shutdown::channel().1
}

pub struct TestSetup {
    pub tmp: TempDir,
    pub origin: PathBuf,
}

impl TestSetup {
    /// An origin repository with a `main` branch and one commit.
    pub fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let origin = tmp.path().join("origin");
        std::fs::create_dir_all(&origin).unwrap();
        git(&origin, &["init", "-b", "main"]);
        std::fs::write(origin.join("README.md"), "hello\n").unwrap();
        git(&origin, &["add", "."]);
        git(&origin, &["commit", "-m", "initial"]);
        Self { tmp, origin }
    }

    pub fn worktree_dir(&self) -> PathBuf {
        self.tmp.path().join("trees")
    }

    pub fn bare_repo_dir(&self) -> PathBuf {
        self.tmp.path().join("bare")
    }

    pub fn repo_config(&self) -> RepoConfig {
        RepoConfig {
            name: Some("test-repo".to_string()),
            repo_url: self.origin.to_string_lossy().into_owned(),
            worktree_dir: self.worktree_dir().to_string_lossy().into_owned(),
            bare_repo_dir: Some(self.bare_repo_dir().to_string_lossy().into_owned()),
            default_branch: None,
            cron_schedule: None,
            run_once: true,
            update_existing_worktrees: true,
            branch_max_age: None,
            skip_lfs: false,
            retry: RetrySettings::default(),
        }
    }

    pub fn reconciler(&self) -> Reconciler {
        self.reconciler_with(self.repo_config())
    }

    pub fn reconciler_with(&self, config: RepoConfig) -> Reconciler {
        Reconciler::init(&config, idle_shutdown()).expect("reconciler init")
    }

    // ---- origin manipulation -------------------------------------------------

    pub fn origin_branch(&self, name: &str) {
        git(&self.origin, &["branch", name]);
    }

    pub fn origin_delete_branch(&self, name: &str) {
        git(&self.origin, &["branch", "-D", name]);
    }

    pub fn origin_switch(&self, branch: &str) {
        git(&self.origin, &["switch", branch]);
    }

    /// Commit a file on the currently checked-out origin branch.
    pub fn origin_commit(&self, file: &str, content: &str, message: &str) {
        std::fs::write(self.origin.join(file), content).unwrap();
        git(&self.origin, &["add", "."]);
        git(&self.origin, &["commit", "-m", message]);
    }

    /// Commit on `branch` with a forced (old) commit date, for age filtering.
    pub fn origin_commit_dated(&self, branch: &str, file: &str, date: &str) {
        self.origin_switch(branch);
        std::fs::write(self.origin.join(file), "dated\n").unwrap();
        git(&self.origin, &["add", "."]);
        git_with_env(
            &self.origin,
            &["commit", "-m", "dated"],
            &[("GIT_AUTHOR_DATE", date), ("GIT_COMMITTER_DATE", date)],
        );
        self.origin_switch("main");
    }

    pub fn origin_head(&self, branch: &str) -> String {
        git(&self.origin, &["rev-parse", branch]).trim().to_string()
    }

    // ---- worktree-side helpers ----------------------------------------------

    pub fn worktree(&self, branch: &str) -> PathBuf {
        self.worktree_dir().join(branch)
    }

    /// Commit a local-only change inside a worktree.
    pub fn local_commit(&self, worktree: &Path, file: &str, content: &str) -> String {
        std::fs::write(worktree.join(file), content).unwrap();
        git(worktree, &["add", "."]);
        git(worktree, &["commit", "-m", "local work"]);
        git(worktree, &["rev-parse", "HEAD"]).trim().to_string()
    }

    pub fn head_of(&self, worktree: &Path) -> String {
        git(worktree, &["rev-parse", "HEAD"]).trim().to_string()
    }
}
