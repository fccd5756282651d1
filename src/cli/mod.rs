pub mod daemon_path;
pub mod process;
pub mod status;

use std::{env, path::PathBuf, time::Duration};

use anyhow::{bail, Result};
use chrono::Utc;
use clap::{Args as ClapArgs, Parser, Subcommand};
use daemon_path::to_daemon_path;
use process::{running_daemons, spawn_daemon, stop_daemons};
use status::{describe, print_status, wait_for_start};
use tracing::{info, level_filters::LevelFilter};

use crate::{
    config::{Settings, SettingsFile, SettingsSource, MAX_COMMIT_INTERVAL_MS},
    daemon::{
        errors::TrackingError,
        start_daemon,
        status::{read_status, NotificationLevel, TrackingPhase},
        storage::state_store::StateStore,
    },
    utils::{
        dir::AppLayout,
        logging::{enable_logging, CLI_PREFIX},
        secret::Secret,
        time::format_remaining,
    },
};

/// Provisioning talks to the network, so the daemon gets a while to report back.
const START_REPORT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Parser, Debug)]
#[command(name = "codetally", version, long_about = None)]
#[command(about = "Measures coding time and commits it to a private GitHub repository", long_about = None)]
struct Args {
    #[command(subcommand)]
    commands: Commands,
    #[arg(long, help = "Enable logging")]
    log: bool,
    #[arg(
        long,
        global = true,
        help = "Application directory. By default $XDG_STATE_HOME/codetally or $HOME/.local/state/codetally"
    )]
    dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
#[command(version, about, long_about = None)]
enum Commands {
    #[command(about = "Start tracking in a background daemon")]
    Start {
        #[arg(long, help = "GitHub access token. Stored for later starts")]
        token: Option<String>,
    },
    #[command(about = "Stop tracking. The daemon commits a final update before exiting")]
    Stop {},
    #[command(
        about = "Run a daemon directly in current console. Used for debugging"
    )]
    Serve {},
    #[command(about = "Show whether tracking runs and when the next commit happens")]
    Status {},
    #[command(about = "Store a GitHub access token without starting")]
    Login {
        #[arg(long)]
        token: String,
    },
    #[command(about = "Show or change the configuration")]
    Config {
        #[command(flatten)]
        changes: ConfigChanges,
    },
}

#[derive(ClapArgs, Debug, Default)]
struct ConfigChanges {
    #[arg(long, help = "Name of the private repository to push to")]
    repository_name: Option<String>,
    #[arg(
        long,
        help = "Milliseconds between two commits, at most one year",
        value_parser = clap::value_parser!(u64).range(1..=MAX_COMMIT_INTERVAL_MS)
    )]
    commit_interval: Option<u64>,
    #[arg(
        long,
        help = "Milliseconds between two checks whether a commit is due",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    poll_interval: Option<u64>,
}

impl ConfigChanges {
    fn is_empty(&self) -> bool {
        self.repository_name.is_none() && self.commit_interval.is_none() && self.poll_interval.is_none()
    }

    fn apply(self, settings: &mut Settings) {
        if let Some(name) = self.repository_name {
            settings.repository_name = name;
        }
        if let Some(interval) = self.commit_interval {
            settings.commit_interval = interval;
        }
        if let Some(interval) = self.poll_interval {
            settings.poll_interval = interval;
        }
    }
}

pub async fn run_cli() -> Result<()> {
    let args = Args::parse();
    let layout = AppLayout::resolve(args.dir)?;

    let logging_level = if args.log {
        Some(LevelFilter::TRACE)
    } else {
        None
    };
    enable_logging(CLI_PREFIX, &layout.logs_dir(), logging_level, args.log)?;

    match args.commands {
        Commands::Start { token } => start_tracking(&layout, token.map(Secret::new)).await,
        Commands::Stop {} => stop_tracking(&layout),
        Commands::Serve {} => start_daemon(layout).await,
        Commands::Status {} => show_status(&layout),
        Commands::Login { token } => {
            store_credential(&StateStore::new(layout.state_file()), Some(Secret::new(token)))
                .await?;
            println!("Token stored.");
            Ok(())
        }
        Commands::Config { changes } => configure(&layout, changes),
    }
}

fn daemon_path() -> Result<PathBuf> {
    Ok(to_daemon_path(env::current_exe()?))
}

/// Stores a supplied token and makes sure some token is available before a daemon gets spawned.
async fn store_credential(store: &StateStore, supplied: Option<Secret>) -> Result<()> {
    let supplied = supplied.filter(|v| !v.is_blank());
    let state = match supplied {
        Some(token) => {
            store
                .update(|state| state.github_token = Some(token))
                .await?
        }
        None => store.load().await?,
    };
    if state.github_token.filter(|v| !v.is_blank()).is_none() {
        return Err(TrackingError::CredentialMissing.into());
    }
    Ok(())
}

async fn start_tracking(layout: &AppLayout, token: Option<Secret>) -> Result<()> {
    let daemon_path = daemon_path()?;
    if !running_daemons(&daemon_path).is_empty() {
        println!("Tracking already running.");
        return Ok(());
    }
    store_credential(&StateStore::new(layout.state_file()), token).await?;

    let requested_at = Utc::now();
    spawn_daemon(&daemon_path, layout)?;
    info!("Daemon spawned, waiting for its report");

    let Some(snapshot) =
        wait_for_start(&layout.status_file(), requested_at, START_REPORT_TIMEOUT).await?
    else {
        println!("Daemon started but did not report yet, check `codetally status`.");
        return Ok(());
    };
    if snapshot.phase == TrackingPhase::Idle {
        let reason = snapshot
            .last_message
            .map(|v| v.message)
            .unwrap_or_else(|| "unknown error".into());
        bail!("Tracking failed to start: {reason}");
    }

    println!("Started code tracking.");
    if let Some(remaining) = snapshot.time_remaining(Utc::now()) {
        println!("  Next commit in: {}", format_remaining(remaining));
    }
    if let Some(message) = snapshot
        .last_message
        .filter(|v| v.level == NotificationLevel::Warning)
    {
        println!("{}", message.message);
    }
    Ok(())
}

fn stop_tracking(layout: &AppLayout) -> Result<()> {
    if stop_daemons(&daemon_path()?) == 0 {
        println!("Tracking is not running.");
        return Ok(());
    }
    println!("Stopped code tracking.");
    // A failed final push is worth knowing about, the next session delivers it.
    if let Some(message) = read_status(&layout.status_file())?
        .and_then(|v| v.last_message)
        .filter(|v| v.level != NotificationLevel::Info)
    {
        println!("{}", message.message);
    }
    Ok(())
}

fn show_status(layout: &AppLayout) -> Result<()> {
    let snapshot = read_status(&layout.status_file())?;
    let running = snapshot.as_ref().is_some_and(|snapshot| {
        daemon_path().is_ok_and(|path| {
            running_daemons(&path)
                .iter()
                .any(|pid| pid.as_u32() == snapshot.pid)
        })
    });
    print_status(&describe(snapshot.as_ref(), running, Utc::now()));
    Ok(())
}

fn configure(layout: &AppLayout, changes: ConfigChanges) -> Result<()> {
    let path = layout.config_file();
    let mut settings = SettingsFile::load(path.clone())?.current();
    if !changes.is_empty() {
        changes.apply(&mut settings);
        SettingsFile::save(&path, &settings)?;
        info!("Settings saved to {path:?}");
    }
    print!("{}", toml::to_string_pretty(&settings)?);
    Ok(())
}
