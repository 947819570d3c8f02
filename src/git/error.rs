//! Git error taxonomy and stderr classification.

use std::io;

/// Broad category of a git failure, used to pick a recovery strategy.
///
/// The reconciler and retry envelope match on kinds, never on message
/// substrings, so classification happens in exactly one place
/// ([`classify_stderr`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum GitErrorKind {
    /// DNS, connection, or timeout failures talking to the remote.
    Network,
    /// Credentials rejected or unavailable.
    Auth,
    /// Another git process holds a lock (`index.lock`, ref locks).
    LockContention,
    /// Repository metadata is damaged or HEAD is not where it should be.
    Corrupt,
    /// A git-lfs smudge/filter failure.
    Lfs,
    /// A ref, revision, or repository that does not exist.
    NotFound,
    /// A fast-forward merge was requested but the histories have diverged.
    NonFastForward,
    Other,
}

/// Error from a git operation: a [`GitErrorKind`] plus the raw stderr (or an
/// equivalent message for failures that never reached git).
#[derive(Debug)]
pub struct GitError {
    pub kind: GitErrorKind,
    pub stderr: String,
}

impl GitError {
    pub fn new(kind: GitErrorKind, stderr: impl Into<String>) -> Self {
        Self {
            kind,
            stderr: stderr.into(),
        }
    }

    /// Build an error from a failed command's stderr, classifying the kind.
    pub fn from_stderr(stderr: impl Into<String>) -> Self {
        let stderr = stderr.into();
        Self {
            kind: classify_stderr(&stderr),
            stderr,
        }
    }

    /// Whether retrying the whole sync pass could plausibly succeed.
    ///
    /// Auth, corruption, and logic errors are terminal on the first attempt;
    /// only contention and connectivity problems are worth a retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            GitErrorKind::Network | GitErrorKind::LockContention
        )
    }
}

impl std::fmt::Display for GitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.stderr)
    }
}

impl std::error::Error for GitError {}

impl From<io::Error> for GitError {
    fn from(e: io::Error) -> Self {
        let kind = match e.kind() {
            io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::TimedOut => GitErrorKind::Network,
            io::ErrorKind::ResourceBusy | io::ErrorKind::WouldBlock => {
                GitErrorKind::LockContention
            }
            _ => GitErrorKind::Other,
        };
        Self::new(kind, e.to_string())
    }
}

/// Classify raw git stderr into a [`GitErrorKind`].
///
/// Ordering matters: the LFS and fast-forward checks come first because those
/// messages can also contain generic words the later checks match on.
pub fn classify_stderr(stderr: &str) -> GitErrorKind {
    let s = stderr.to_lowercase();

    if s.contains("smudge filter lfs") || s.contains("git-lfs") || s.contains("error: external filter") {
        GitErrorKind::Lfs
    } else if s.contains("not possible to fast-forward") {
        GitErrorKind::NonFastForward
    } else if s.contains("authentication failed")
        || s.contains("permission denied")
        || s.contains("could not read username")
        || s.contains("could not read password")
        || s.contains("invalid credentials")
    {
        GitErrorKind::Auth
    } else if s.contains("could not resolve host")
        || s.contains("unable to access")
        || s.contains("connection refused")
        || s.contains("connection reset")
        || s.contains("timed out")
        || s.contains("early eof")
        || s.contains("remote end hung up")
    {
        GitErrorKind::Network
    } else if s.contains("unable to lock")
        || s.contains("cannot lock ref")
        || s.contains("index.lock")
        || s.contains("another git process")
    {
        GitErrorKind::LockContention
    } else if s.contains("unknown revision")
        || s.contains("repository not found")
        || s.contains("does not exist")
        || s.contains("not found")
        || s.contains("no such ref")
    {
        GitErrorKind::NotFound
    } else if s.contains("corrupt")
        || s.contains("bad object")
        || s.contains("not a symbolic ref")
        || s.contains("object file") && s.contains("empty")
    {
        GitErrorKind::Corrupt
    } else {
        GitErrorKind::Other
    }
}
