//! Per-worktree sync metadata sidecars.
//!
//! One JSON file per worktree at
//! `<bare>/.git/worktrees/<dirname>/sync-metadata.json`, recording the last
//! synced commit and a bounded action history. The sidecar is what makes
//! "diverged with local changes" decidable: if a worktree's HEAD still equals
//! `lastSyncCommit`, the user made no local commits and a hard reset is safe.
//!
//! The file key is always the *basename* of the worktree path (git's internal
//! worktree name), never the branch: the two differ for branches containing
//! `/`. Field names are camelCase on disk for compatibility with sidecars
//! written by earlier releases.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::Context;
use chrono::{DateTime, SecondsFormat, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::path::format_path_for_display;

/// History entries beyond this are evicted oldest-first.
pub const MAX_HISTORY_ENTRIES: usize = 10;

static HEX_COMMIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("^[0-9a-f]+$").expect("valid regex"));

/// What a recorded sync did to the worktree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncAction {
    Created,
    Updated,
    Fetched,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub date: String,
    pub commit: String,
    pub action: SyncAction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedFrom {
    pub branch: String,
    pub commit: String,
}

/// The sidecar record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncMetadata {
    pub last_sync_commit: String,
    pub last_sync_date: String,
    pub upstream_branch: String,
    pub created_from: CreatedFrom,
    #[serde(default)]
    pub sync_history: Vec<HistoryEntry>,
}

impl SyncMetadata {
    /// A record is usable only when the commit is hex and the date parses.
    /// Anything else is treated as missing, which the reconciler handles
    /// conservatively (quarantine instead of reset).
    fn is_valid(&self) -> bool {
        HEX_COMMIT.is_match(&self.last_sync_commit)
            && DateTime::parse_from_rfc3339(&self.last_sync_date).is_ok()
    }
}

fn now_iso8601() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Store for sidecars under one bare clone's `worktrees/` directory.
#[derive(Debug)]
pub struct MetadataStore {
    worktrees_dir: PathBuf,
}

impl MetadataStore {
    pub fn new(git_dir: &Path) -> Self {
        Self {
            worktrees_dir: git_dir.join("worktrees"),
        }
    }

    /// Canonical sidecar path: keyed by the worktree path's basename.
    fn canonical_path(&self, worktree_path: &Path) -> Option<PathBuf> {
        let dir_name = worktree_path.file_name()?;
        Some(
            self.worktrees_dir
                .join(dir_name)
                .join("sync-metadata.json"),
        )
    }

    /// Legacy sidecar path from releases that keyed on
    /// `<parent-dirname>/<basename>`.
    fn legacy_path(&self, worktree_path: &Path) -> Option<PathBuf> {
        let dir_name = worktree_path.file_name()?;
        let parent_name = worktree_path.parent()?.file_name()?;
        Some(
            self.worktrees_dir
                .join(parent_name)
                .join(dir_name)
                .join("sync-metadata.json"),
        )
    }

    /// Load the sidecar for a worktree.
    ///
    /// Returns `None` when the file is absent or invalid; both mean "unknown
    /// provenance". A record found only at the legacy path is migrated to the
    /// canonical path on the way out.
    pub fn load(&self, worktree_path: &Path) -> Option<SyncMetadata> {
        let canonical = self.canonical_path(worktree_path)?;
        if let Some(metadata) = read_record(&canonical) {
            return Some(metadata);
        }
        if canonical.exists() {
            // Present but unreadable or invalid: unknown provenance.
            return None;
        }

        let legacy = self.legacy_path(worktree_path)?;
        if legacy == canonical {
            return None;
        }
        let metadata = read_record(&legacy)?;

        match self.save(worktree_path, &metadata) {
            Ok(()) => {
                if let Err(e) = std::fs::remove_file(&legacy) {
                    log::warn!(
                        "Failed to remove legacy metadata {}: {e}",
                        format_path_for_display(&legacy)
                    );
                } else if let Some(dir) = legacy.parent() {
                    // Only removed when empty; ignore failure otherwise.
                    let _ = std::fs::remove_dir(dir);
                }
                log::debug!(
                    "Migrated sync metadata for {} to {}",
                    worktree_path.display(),
                    canonical.display()
                );
            }
            Err(e) => log::warn!(
                "Failed to migrate legacy metadata for {}: {e:#}",
                format_path_for_display(worktree_path)
            ),
        }

        Some(metadata)
    }

    /// Write the sidecar atomically (temp file + rename in the same dir).
    pub fn save(&self, worktree_path: &Path, metadata: &SyncMetadata) -> anyhow::Result<()> {
        let target = self
            .canonical_path(worktree_path)
            .context("worktree path has no basename")?;
        let dir = target.parent().context("sidecar path has no parent")?;
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;

        let json = serde_json::to_string_pretty(metadata)?;
        let tmp = tempfile::NamedTempFile::new_in(dir)?;
        std::fs::write(tmp.path(), json.as_bytes())?;
        tmp.persist(&target)
            .with_context(|| format!("Failed to write {}", target.display()))?;
        Ok(())
    }

    /// Record a completed sync action for a worktree.
    ///
    /// When no (valid) sidecar exists yet, one is synthesized from the
    /// current commit, the upstream branch, and the provided default branch.
    /// Appends to the history and evicts the oldest entries beyond
    /// [`MAX_HISTORY_ENTRIES`].
    pub fn record_sync(
        &self,
        worktree_path: &Path,
        commit: &str,
        upstream_branch: &str,
        default_branch: &str,
        action: SyncAction,
    ) -> anyhow::Result<()> {
        let now = now_iso8601();
        let mut metadata = self.load(worktree_path).unwrap_or_else(|| SyncMetadata {
            last_sync_commit: commit.to_string(),
            last_sync_date: now.clone(),
            upstream_branch: upstream_branch.to_string(),
            created_from: CreatedFrom {
                branch: default_branch.to_string(),
                commit: commit.to_string(),
            },
            sync_history: Vec::new(),
        });

        metadata.last_sync_commit = commit.to_string();
        metadata.last_sync_date = now.clone();
        metadata.upstream_branch = upstream_branch.to_string();
        metadata.sync_history.push(HistoryEntry {
            date: now,
            commit: commit.to_string(),
            action,
        });
        while metadata.sync_history.len() > MAX_HISTORY_ENTRIES {
            metadata.sync_history.remove(0);
        }

        self.save(worktree_path, &metadata)
    }
}

fn read_record(path: &Path) -> Option<SyncMetadata> {
    let contents = std::fs::read_to_string(path).ok()?;
    let metadata: SyncMetadata = match serde_json::from_str(&contents) {
        Ok(m) => m,
        Err(e) => {
            log::warn!(
                "Ignoring unparseable sync metadata {}: {e}",
                format_path_for_display(path)
            );
            return None;
        }
    };
    if !metadata.is_valid() {
        log::warn!(
            "Ignoring invalid sync metadata {} (bad commit or date)",
            format_path_for_display(path)
        );
        return None;
    }
    Some(metadata)
}
