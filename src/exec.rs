//! External command execution with timing and debug logging.
//!
//! This is the **only** way to run external commands in sync-worktrees. All
//! command execution must go through [`Cmd`] to ensure consistent logging and
//! tracing:
//!
//! ```text
//! $ git fetch --all --prune [my-repo]    # with context
//! [sw-trace] context=my-repo cmd="git fetch --all --prune" dur=812.4ms ok=true
//! ```
//!
//! The context is typically the repository or worktree name for git commands.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::Instant;

/// Builder for an external command invocation.
#[must_use]
pub struct Cmd {
    program: String,
    args: Vec<OsString>,
    current_dir: Option<PathBuf>,
    envs: Vec<(String, String)>,
    context: Option<String>,
}

impl Cmd {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
            envs: Vec::new(),
            context: None,
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.current_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Set an environment variable for this invocation only.
    ///
    /// The variable is visible to the spawned child process and nothing else;
    /// the parent's environment is never mutated.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Attach a short display name (repository or worktree) for log lines.
    pub fn context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Run the command to completion, capturing stdout and stderr.
    pub fn run(self) -> std::io::Result<Output> {
        let cmd_str = self.display_string();

        match &self.context {
            Some(ctx) => log::debug!("$ {} [{}]", cmd_str, ctx),
            None => log::debug!("$ {}", cmd_str),
        }

        let mut command = Command::new(&self.program);
        command.args(&self.args);
        if let Some(dir) = &self.current_dir {
            command.current_dir(dir);
        }
        for (key, value) in &self.envs {
            command.env(key, value);
        }

        let t0 = Instant::now();
        let result = command.output();
        let duration_ms = t0.elapsed().as_secs_f64() * 1000.0;

        match (&result, &self.context) {
            (Ok(output), Some(ctx)) => {
                log::debug!(
                    "[sw-trace] context={} cmd=\"{}\" dur={:.1}ms ok={}",
                    ctx,
                    cmd_str,
                    duration_ms,
                    output.status.success()
                );
            }
            (Ok(output), None) => {
                log::debug!(
                    "[sw-trace] cmd=\"{}\" dur={:.1}ms ok={}",
                    cmd_str,
                    duration_ms,
                    output.status.success()
                );
            }
            (Err(e), Some(ctx)) => {
                log::debug!(
                    "[sw-trace] context={} cmd=\"{}\" dur={:.1}ms err=\"{}\"",
                    ctx,
                    cmd_str,
                    duration_ms,
                    e
                );
            }
            (Err(e), None) => {
                log::debug!(
                    "[sw-trace] cmd=\"{}\" dur={:.1}ms err=\"{}\"",
                    cmd_str,
                    duration_ms,
                    e
                );
            }
        }

        result
    }

    fn display_string(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            let args: Vec<_> = self.args.iter().map(|a| a.to_string_lossy()).collect();
            format!("{} {}", self.program, args.join(" "))
        }
    }
}
