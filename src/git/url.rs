//! Git remote URL parsing.
//!
//! Parses remote URLs into host/owner/repo components so a repository without
//! an explicit `bare_repo_dir` gets a stable per-user cache location.

use std::path::PathBuf;

/// Parsed git remote URL with host, owner, and repository components.
///
/// # Supported URL formats
///
/// - `https://<host>/<owner>/<repo>.git`
/// - `http://<host>/<owner>/<repo>.git`
/// - `git@<host>:<owner>/<repo>.git`
/// - `ssh://git@<host>/<owner>/<repo>.git`
/// - `ssh://<host>/<owner>/<repo>.git`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitRemoteUrl {
    host: String,
    owner: String,
    repo: String,
}

impl GitRemoteUrl {
    /// Parse a git remote URL into structured components.
    ///
    /// Returns `None` for malformed URLs or unsupported formats (including
    /// plain filesystem paths, which callers handle separately).
    pub fn parse(url: &str) -> Option<Self> {
        let url = url.trim();

        let (host, owner, repo_with_suffix) = if let Some(rest) = url
            .strip_prefix("https://")
            .or_else(|| url.strip_prefix("http://"))
        {
            let mut parts = rest.split('/');
            (parts.next()?, parts.next()?, parts.next()?)
        } else if let Some(rest) = url.strip_prefix("ssh://") {
            // URLs with ports (ssh://host:2222/...) don't fit the
            // host/owner/repo model; callers fall back to a sanitized name.
            let without_user = rest.split('@').next_back()?;
            let mut parts = without_user.split('/');
            let host = parts.next()?;
            if host.contains(':') {
                return None;
            }
            (host, parts.next()?, parts.next()?)
        } else if let Some(rest) = url.strip_prefix("git@") {
            let (host, path) = rest.split_once(':')?;
            let mut parts = path.split('/');
            (host, parts.next()?, parts.next()?)
        } else {
            return None;
        };

        let repo = repo_with_suffix
            .strip_suffix(".git")
            .unwrap_or(repo_with_suffix);

        if host.is_empty() || owner.is_empty() || repo.is_empty() {
            return None;
        }

        Some(Self {
            host: host.to_string(),
            owner: owner.to_string(),
            repo: repo.to_string(),
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// The repository name without the `.git` suffix.
    pub fn repo(&self) -> &str {
        &self.repo
    }

    /// Relative cache path `host/owner/repo` for the default bare-clone
    /// location.
    pub fn cache_relative_path(&self) -> PathBuf {
        PathBuf::from(&self.host).join(&self.owner).join(&self.repo)
    }
}
