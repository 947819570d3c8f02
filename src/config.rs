//! Configuration: a TOML file listing repositories to reconcile.
//!
//! ```toml
//! [[repository]]
//! repo_url = "git@github.com:acme/widgets.git"
//! worktree_dir = "~/work/widgets"
//! cron_schedule = "0 * * * *"
//! update_existing_worktrees = true
//! branch_max_age = "2w"
//!
//! [repository.retry]
//! max_attempts = 5
//! initial_delay_ms = 2000
//! ```

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::LazyLock;
use std::time::Duration;

use anyhow::Context;
use regex::Regex;
use serde::Deserialize;

use crate::git::GitRemoteUrl;
use crate::retry::RetryPolicy;

static AGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)([hdwmy])$").expect("valid regex"));

/// Top-level configuration file.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default, rename = "repository")]
    pub repositories: Vec<RepoConfig>,
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        anyhow::ensure!(
            !config.repositories.is_empty(),
            "config file {} defines no [[repository]] entries",
            path.display()
        );
        Ok(config)
    }
}

/// Options for one repository.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RepoConfig {
    /// Display name; defaults to the repository name from the URL.
    pub name: Option<String>,
    pub repo_url: String,
    pub worktree_dir: String,
    /// Defaults to a per-user cache directory derived from the URL.
    pub bare_repo_dir: Option<String>,
    /// Override for remotes whose HEAD cannot be resolved.
    pub default_branch: Option<String>,
    /// Standard 5-field cron expression. Defaults to hourly.
    pub cron_schedule: Option<String>,
    #[serde(default)]
    pub run_once: bool,
    #[serde(default)]
    pub update_existing_worktrees: bool,
    /// Only mirror branches with activity within this window, e.g. `"90d"`.
    pub branch_max_age: Option<BranchMaxAge>,
    #[serde(default)]
    pub skip_lfs: bool,
    #[serde(default)]
    pub retry: RetrySettings,
}

impl RepoConfig {
    pub fn display_name(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        if let Some(url) = GitRemoteUrl::parse(&self.repo_url) {
            return url.repo().to_string();
        }
        // Local paths and exotic URLs: last path segment, `.git` stripped.
        let tail = self
            .repo_url
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or(&self.repo_url);
        tail.trim_end_matches(".git").to_string()
    }

    pub fn resolved_worktree_dir(&self) -> PathBuf {
        expand(&self.worktree_dir)
    }

    pub fn resolved_bare_repo_dir(&self) -> PathBuf {
        match &self.bare_repo_dir {
            Some(dir) => expand(dir),
            None => default_bare_repo_dir(&self.repo_url),
        }
    }
}

/// Expand `~` and return an owned path.
fn expand(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).into_owned())
}

/// Per-user cache location for a repository without an explicit
/// `bare_repo_dir`: `<cache>/sync-worktrees/<host>/<owner>/<repo>`.
fn default_bare_repo_dir(repo_url: &str) -> PathBuf {
    let base = dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("sync-worktrees");
    match GitRemoteUrl::parse(repo_url) {
        Some(url) => base.join(url.cache_relative_path()),
        None => base.join(sanitize_filename::sanitize_with_options(
            repo_url,
            sanitize_filename::Options {
                windows: true,
                truncate: true,
                replacement: "_",
            },
        )),
    }
}

/// Retry knobs as they appear in the config file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct RetrySettings {
    pub max_attempts: MaxAttempts,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: MaxAttempts::default(),
            initial_delay_ms: 1000,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetrySettings {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: match self.max_attempts {
                MaxAttempts::Limited(n) => Some(n),
                MaxAttempts::Unlimited => None,
            },
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            backoff_multiplier: self.backoff_multiplier,
        }
    }
}

/// A positive attempt count, or the string `"unlimited"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaxAttempts {
    Limited(u32),
    Unlimited,
}

impl Default for MaxAttempts {
    fn default() -> Self {
        Self::Limited(3)
    }
}

impl<'de> Deserialize<'de> for MaxAttempts {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::Error;

        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(i64),
            Word(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(n) if n >= 1 => Ok(MaxAttempts::Limited(
                u32::try_from(n).map_err(|_| Error::custom("max_attempts out of range"))?,
            )),
            Raw::Number(n) => Err(Error::custom(format!(
                "max_attempts must be positive or \"unlimited\", got {n}"
            ))),
            Raw::Word(word) if word == "unlimited" => Ok(MaxAttempts::Unlimited),
            Raw::Word(word) => Err(Error::custom(format!(
                "max_attempts must be positive or \"unlimited\", got \"{word}\""
            ))),
        }
    }
}

/// A branch-activity window: `<N>{h|d|w|m|y}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct BranchMaxAge {
    pub amount: u32,
    pub unit: AgeUnit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgeUnit {
    Hours,
    Days,
    Weeks,
    Months,
    Years,
}

impl BranchMaxAge {
    /// The window as a duration. Months and years use calendar-free
    /// approximations (30 and 365 days); precision beyond that is
    /// meaningless for pruning stale branches.
    pub fn to_duration(self) -> chrono::Duration {
        let amount = i64::from(self.amount);
        match self.unit {
            AgeUnit::Hours => chrono::Duration::hours(amount),
            AgeUnit::Days => chrono::Duration::days(amount),
            AgeUnit::Weeks => chrono::Duration::weeks(amount),
            AgeUnit::Months => chrono::Duration::days(amount * 30),
            AgeUnit::Years => chrono::Duration::days(amount * 365),
        }
    }
}

impl FromStr for BranchMaxAge {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let captures = AGE_RE
            .captures(s.trim())
            .ok_or_else(|| format!("invalid branch age '{s}' (expected e.g. \"24h\", \"30d\", \"2w\", \"6m\", \"1y\")"))?;
        let amount: u32 = captures[1]
            .parse()
            .map_err(|_| format!("branch age amount out of range in '{s}'"))?;
        let unit = match &captures[2] {
            "h" => AgeUnit::Hours,
            "d" => AgeUnit::Days,
            "w" => AgeUnit::Weeks,
            "m" => AgeUnit::Months,
            "y" => AgeUnit::Years,
            _ => unreachable!("regex restricts the unit"),
        };
        Ok(Self { amount, unit })
    }
}

impl TryFrom<String> for BranchMaxAge {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl std::fmt::Display for BranchMaxAge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let unit = match self.unit {
            AgeUnit::Hours => 'h',
            AgeUnit::Days => 'd',
            AgeUnit::Weeks => 'w',
            AgeUnit::Months => 'm',
            AgeUnit::Years => 'y',
        };
        write!(f, "{}{}", self.amount, unit)
    }
}
