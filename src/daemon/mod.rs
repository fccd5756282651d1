use std::sync::Arc;

use anyhow::Result;
use remote::{git::GitWorkTree, github::GithubClient, RemoteSync};
use status::StatusBoard;
use storage::{state_store::StateStore, tracking_log::JsonTrackingLog};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracking::{controller::TrackingController, run_tracking};

use crate::{
    config::{SettingsFile, SettingsSource},
    utils::{
        clock::{Clock, DefaultClock},
        dir::AppLayout,
    },
};

pub mod args;
pub mod errors;
pub mod remote;
pub mod shutdown;
pub mod status;
pub mod storage;
pub mod tracking;

/// Represents the starting point for the daemon. Runs until a shutdown signal arrives or the
/// session can't be started.
pub async fn start_daemon(layout: AppLayout) -> Result<()> {
    let controller = create_controller(&layout, DefaultClock)?;
    let shutdown_token = CancellationToken::new();

    info!("Daemon started in {:?}", layout.root());
    let (_, tracking_result) = tokio::join!(
        shutdown::detect_shutdown(shutdown_token.clone()),
        run_tracking(controller, None, shutdown_token.clone()),
    );

    if let Err(e) = &tracking_result {
        error!("Tracking stopped with an error {e:?}");
    }
    tracking_result
}

fn create_controller(
    layout: &AppLayout,
    clock: impl Clock,
) -> Result<TrackingController<JsonTrackingLog>> {
    let mut settings = SettingsFile::load(layout.config_file())?;
    let provider = GithubClient::new(&settings.current().api_url)?;
    let remote = RemoteSync::new(
        Box::new(provider),
        Box::new(GitWorkTree::new(layout.repo_dir())),
    );

    Ok(TrackingController::new(
        JsonTrackingLog::new(layout.data_file())?,
        remote,
        StateStore::new(layout.state_file()),
        Box::new(settings),
        Arc::new(clock),
        Box::new(StatusBoard::new(layout.status_file())),
    ))
}

#[cfg(test)]
mod daemon_tests {
    use anyhow::Result;
    use tempfile::tempdir;

    use crate::{
        config::{Settings, SettingsFile},
        daemon::{
            create_controller,
            status::{read_status, NotificationLevel, TrackingPhase},
            storage::tracking_log::{JsonTrackingLog, TrackingLog},
        },
        utils::{clock::DefaultClock, dir::AppLayout, logging::TEST_LOGGING},
    };

    #[tokio::test]
    async fn controller_is_wired_to_the_layout() -> Result<()> {
        *TEST_LOGGING;
        let dir = tempdir()?;
        let layout = AppLayout::new(dir.path().to_path_buf())?;
        SettingsFile::save(
            &layout.config_file(),
            &Settings {
                repository_name: "stats".into(),
                ..Settings::default()
            },
        )?;

        let controller = create_controller(&layout, DefaultClock)?;

        assert_eq!(controller.state().phase(), TrackingPhase::Idle);
        assert!(layout.repo_dir().exists());
        Ok(())
    }

    #[tokio::test]
    async fn start_without_credentials_ends_the_daemon() -> Result<()> {
        *TEST_LOGGING;
        let dir = tempdir()?;
        let layout = AppLayout::new(dir.path().to_path_buf())?;

        assert!(super::start_daemon(layout.clone()).await.is_err());

        let status = read_status(&layout.status_file())?.expect("failure is on the board");
        assert_eq!(status.phase, TrackingPhase::Idle);
        assert_eq!(
            status.last_message.map(|v| v.level),
            Some(NotificationLevel::Error)
        );
        let record = JsonTrackingLog::new(layout.data_file())?.load().await?;
        assert!(record.sessions.is_empty());
        Ok(())
    }
}
