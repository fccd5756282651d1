use std::{path::Path, time::Duration as StdDuration};

use ansi_term::{Colour, Style};
use anyhow::Result;
use chrono::{DateTime, Local, Utc};

use crate::{
    daemon::status::{read_status, NotificationLevel, StatusSnapshot, TrackingPhase},
    utils::time::{format_remaining, whole_hours},
};

/// What `codetally status` shows, before any colouring.
#[derive(Debug, PartialEq)]
pub struct StatusView {
    pub headline: String,
    pub details: Vec<String>,
    pub message: Option<(NotificationLevel, String)>,
}

/// Builds the view of the status line. `running` tells whether the daemon that wrote the
/// snapshot is still alive; a stale board is shown as not running.
pub fn describe(snapshot: Option<&StatusSnapshot>, running: bool, now: DateTime<Utc>) -> StatusView {
    let message = snapshot
        .and_then(|v| v.last_message.as_ref())
        .map(|v| (v.level, v.message.clone()));

    let Some(snapshot) = snapshot.filter(|v| running && v.phase != TrackingPhase::Idle) else {
        let mut details = vec![];
        if let Some(snapshot) = snapshot {
            details.push(format!("Total tracked: {}h", whole_hours(snapshot.total_time)));
        }
        return StatusView {
            headline: "Tracking is not running.".into(),
            details,
            message,
        };
    };

    let countdown = match snapshot.time_remaining(now) {
        Some(remaining) if remaining > chrono::Duration::zero() => {
            format!("Next commit in: {}", format_remaining(remaining))
        }
        _ => "Committing...".into(),
    };
    let mut details = vec![countdown];
    if let Some(start) = snapshot.session_start {
        details.push(format!(
            "Session started: {}",
            start.with_timezone(&Local).format("%x %H:%M:%S")
        ));
    }
    details.push(format!("Total tracked: {}h", whole_hours(snapshot.total_time)));

    StatusView {
        headline: "Tracking active.".into(),
        details,
        message,
    }
}

pub fn print_status(view: &StatusView) {
    println!("{}", Style::new().bold().paint(&view.headline));
    for line in &view.details {
        println!("  {line}");
    }
    if let Some((level, message)) = &view.message {
        let colour = match level {
            NotificationLevel::Info => Colour::Green,
            NotificationLevel::Warning => Colour::Yellow,
            NotificationLevel::Error => Colour::Red,
        };
        println!("{}", colour.paint(message));
    }
}

/// Polls the board until the daemon reports on a start requested at `requested_at`: an active
/// session or the error that prevented it. `None` when nothing arrives in time.
pub async fn wait_for_start(
    path: &Path,
    requested_at: DateTime<Utc>,
    timeout: StdDuration,
) -> Result<Option<StatusSnapshot>> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if let Some(snapshot) = read_status(path)? {
            let reported = snapshot.updated_at >= requested_at
                && (snapshot.phase != TrackingPhase::Idle
                    || snapshot
                        .last_message
                        .as_ref()
                        .is_some_and(|v| v.level == NotificationLevel::Error));
            if reported {
                return Ok(Some(snapshot));
            }
        }
        if tokio::time::Instant::now() >= deadline {
            return Ok(None);
        }
        tokio::time::sleep(StdDuration::from_millis(200)).await;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration as StdDuration;

    use anyhow::Result;
    use chrono::{Duration, TimeZone, Utc};
    use tempfile::tempdir;

    use super::{describe, wait_for_start};
    use crate::daemon::status::{
        Notification, NotificationLevel, StatusBoard, StatusSink, StatusSnapshot, TrackingPhase,
    };

    fn snapshot(phase: TrackingPhase) -> StatusSnapshot {
        let start = Utc.with_ymd_and_hms(2018, 7, 4, 12, 0, 0).unwrap();
        StatusSnapshot {
            pid: 7,
            phase,
            session_start: Some(start),
            last_sync_time: Some(start),
            next_sync_at: Some(start + Duration::minutes(30)),
            commit_interval: 30 * 60 * 1000,
            total_time: 2.5 * 3600.,
            last_message: None,
            updated_at: start,
        }
    }

    #[test]
    fn active_session_shows_countdown() {
        let now = Utc.with_ymd_and_hms(2018, 7, 4, 12, 17, 55).unwrap();
        let view = describe(Some(&snapshot(TrackingPhase::Active)), true, now);
        assert_eq!(view.headline, "Tracking active.");
        assert_eq!(view.details[0], "Next commit in: 12m 5s");
        assert!(view.details.contains(&"Total tracked: 2h".to_owned()));
    }

    #[test]
    fn due_or_syncing_shows_committing() {
        let now = Utc.with_ymd_and_hms(2018, 7, 4, 12, 45, 0).unwrap();
        let due = describe(Some(&snapshot(TrackingPhase::Active)), true, now);
        assert_eq!(due.details[0], "Committing...");
        let syncing = describe(Some(&snapshot(TrackingPhase::Syncing)), true, now);
        assert_eq!(syncing.details[0], "Committing...");
    }

    #[test]
    fn stale_board_is_not_running() {
        let now = Utc.with_ymd_and_hms(2018, 7, 4, 12, 5, 0).unwrap();
        let mut stale = snapshot(TrackingPhase::Active);
        stale.last_message = Some(Notification {
            level: NotificationLevel::Warning,
            message: "could not sync coding stats".into(),
            at: now,
        });
        let view = describe(Some(&stale), false, now);
        assert_eq!(view.headline, "Tracking is not running.");
        assert_eq!(
            view.message,
            Some((NotificationLevel::Warning, "could not sync coding stats".into()))
        );
        assert_eq!(describe(None, false, now).details, Vec::<String>::new());
    }

    #[tokio::test]
    async fn start_waits_for_the_daemon_report() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("status.json");
        let requested_at = Utc::now();

        let mut board = StatusBoard::new(path.clone());
        let mut old = snapshot(TrackingPhase::Active);
        old.updated_at = requested_at - Duration::hours(1);
        board.publish(old);
        assert_eq!(
            wait_for_start(&path, requested_at, StdDuration::from_millis(300)).await?,
            None
        );

        let mut fresh = snapshot(TrackingPhase::Active);
        fresh.updated_at = requested_at + Duration::seconds(1);
        board.publish(fresh);
        let reported = wait_for_start(&path, requested_at, StdDuration::from_secs(1)).await?;
        assert_eq!(reported.map(|v| v.phase), Some(TrackingPhase::Active));
        Ok(())
    }
}
