use clap::Parser;

use sync_worktrees::config::Config;
use sync_worktrees::{scheduler, shutdown};

mod cli;

use cli::Cli;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logger(&cli);

    let config = Config::load(&cli.config)?;
    let repositories: Vec<_> = match &cli.repo {
        Some(filter) => config
            .repositories
            .into_iter()
            .filter(|repo| repo.display_name() == *filter)
            .collect(),
        None => config.repositories,
    };
    anyhow::ensure!(
        !repositories.is_empty(),
        "no configured repository matches {:?}",
        cli.repo.as_deref().unwrap_or("<any>")
    );

    let (trigger, shutdown) = shutdown::channel();
    install_signal_handlers(trigger);

    scheduler::run(&repositories, cli.once, &shutdown)
}

fn init_logger(cli: &Cli) {
    let default_level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp_secs()
        .init();
}

#[cfg(unix)]
fn install_signal_handlers(trigger: shutdown::ShutdownTrigger) {
    use signal_hook::consts::{SIGINT, SIGTERM};

    match signal_hook::iterator::Signals::new([SIGINT, SIGTERM]) {
        Ok(mut signals) => {
            std::thread::spawn(move || {
                if signals.forever().next().is_some() {
                    log::info!("Shutdown requested; finishing the current step");
                    trigger.trigger();
                }
            });
        }
        Err(e) => log::warn!("Could not install signal handlers: {e}"),
    }
}

#[cfg(not(unix))]
fn install_signal_handlers(_trigger: shutdown::ShutdownTrigger) {
    // Ctrl-C handling is Unix-only for now; Windows users can stop the
    // process between passes.
}
