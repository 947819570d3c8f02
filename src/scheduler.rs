//! Scheduling: one thread per repository, cron-driven or run-once.
//!
//! Repositories are independent (disjoint bare clones, worktree roots, and
//! metadata), so they reconcile in parallel. Within a repository the
//! [`Reconciler`] serializes its own passes.

use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use chrono::Local;
use cron::Schedule;

use crate::config::RepoConfig;
use crate::reconcile::Reconciler;
use crate::shutdown::Shutdown;

/// Hourly, at the top of the hour.
pub const DEFAULT_CRON_SCHEDULE: &str = "0 * * * *";

/// Parse a standard 5-field cron expression.
///
/// The `cron` crate wants a seconds field, so a zero-seconds field is
/// prepended; the configuration surface stays plain 5-field cron.
pub fn parse_cron(expr: &str) -> anyhow::Result<Schedule> {
    let fields = expr.split_whitespace().count();
    anyhow::ensure!(
        fields == 5,
        "cron schedule must have 5 fields (minute hour day-of-month month day-of-week), got {fields} in '{expr}'"
    );
    let with_seconds = format!("0 {}", expr.trim());
    Schedule::from_str(&with_seconds).with_context(|| format!("invalid cron schedule '{expr}'"))
}

/// Run every repository until shutdown (or to completion with `once`).
///
/// Returns an error if any repository failed to initialize or, in run-once
/// mode, failed its pass.
pub fn run(repositories: &[RepoConfig], once: bool, shutdown: &Shutdown) -> anyhow::Result<()> {
    let failures: usize = std::thread::scope(|scope| {
        let handles: Vec<_> = repositories
            .iter()
            .map(|config| {
                let shutdown = shutdown.clone();
                scope.spawn(move || run_repository(config, once, &shutdown))
            })
            .collect();

        handles
            .into_iter()
            .map(|handle| match handle.join() {
                Ok(Ok(())) => false,
                Ok(Err(e)) => {
                    log::error!("{e:#}");
                    true
                }
                Err(_) => {
                    log::error!("A repository thread panicked");
                    true
                }
            })
            .filter(|failed| *failed)
            .count()
    });

    anyhow::ensure!(failures == 0, "{failures} repository sync(s) failed");
    Ok(())
}

fn run_repository(config: &RepoConfig, once: bool, shutdown: &Shutdown) -> anyhow::Result<()> {
    let name = config.display_name();
    let reconciler = Reconciler::init(config, shutdown.clone())
        .with_context(|| format!("Failed to initialize repository '{name}'"))?;

    // Always sync once at startup; cron only controls the cadence after.
    let first = run_pass(&reconciler);

    if once || config.run_once {
        return first;
    }

    let expr = config
        .cron_schedule
        .as_deref()
        .unwrap_or(DEFAULT_CRON_SCHEDULE);
    let schedule =
        parse_cron(expr).with_context(|| format!("repository '{name}': bad cron_schedule"))?;
    log::info!("[{name}] Scheduled with cron '{expr}'");

    while !shutdown.is_cancelled() {
        let Some(next) = schedule.upcoming(Local).next() else {
            log::warn!("[{name}] Cron schedule '{expr}' has no future occurrences; stopping");
            break;
        };
        log::info!("[{name}] Next sync at {}", next.format("%Y-%m-%d %H:%M:%S"));

        let wait = (next - Local::now()).to_std().unwrap_or(Duration::ZERO);
        if shutdown.sleep(wait) {
            break;
        }
        // Scheduled passes log their own failures and keep the loop alive.
        let _ = run_pass(&reconciler);
    }

    log::info!("[{name}] Stopped");
    Ok(())
}

fn run_pass(reconciler: &Reconciler) -> anyhow::Result<()> {
    match reconciler.sync() {
        Ok(_outcome) => Ok(()),
        Err(e) => {
            log::error!("[{}] {e}", reconciler.name());
            Err(e.into())
        }
    }
}
