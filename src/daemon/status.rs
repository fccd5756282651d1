//! Read-only projection of the controller for the outside world. The daemon keeps `status.json`
//! current, the cli renders it.

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackingPhase {
    Idle,
    Active,
    /// A commit cycle is in flight. Ticks arriving now are ignored.
    Syncing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Info,
    Warning,
    Error,
}

/// A message meant for the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub pid: u32,
    pub phase: TrackingPhase,
    pub session_start: Option<DateTime<Utc>>,
    pub last_sync_time: Option<DateTime<Utc>>,
    pub next_sync_at: Option<DateTime<Utc>>,
    /// Milliseconds.
    pub commit_interval: u64,
    pub total_time: f64,
    pub last_message: Option<Notification>,
    pub updated_at: DateTime<Utc>,
}

impl StatusSnapshot {
    /// Time left until the next commit cycle. Zero means a cycle is due or running.
    pub fn time_remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        match self.phase {
            TrackingPhase::Idle => None,
            TrackingPhase::Syncing => Some(Duration::zero()),
            TrackingPhase::Active => self
                .next_sync_at
                .map(|next| (next - now).max(Duration::zero())),
        }
    }
}

/// Receiver of notifications and state changes of the controller.
pub trait StatusSink: Send {
    fn notify(&mut self, notification: Notification);

    fn publish(&mut self, snapshot: StatusSnapshot);
}

/// [StatusSink] that keeps `status.json` up to date. Writing the board is best effort, a failure
/// is logged and otherwise ignored.
pub struct StatusBoard {
    path: PathBuf,
    last_message: Option<Notification>,
    latest: Option<StatusSnapshot>,
}

impl StatusBoard {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            last_message: None,
            latest: None,
        }
    }

    fn write(&self, snapshot: &StatusSnapshot) -> Result<()> {
        let temporary = self.path.with_extension("json.tmp");
        std::fs::write(&temporary, serde_json::to_vec_pretty(snapshot)?)?;
        std::fs::rename(&temporary, &self.path)?;
        Ok(())
    }

    fn store(&mut self, mut snapshot: StatusSnapshot) {
        snapshot.last_message = self.last_message.clone();
        if let Err(e) = self.write(&snapshot) {
            warn!("Failed to update status board {:?}: {e:?}", self.path);
        }
        self.latest = Some(snapshot);
    }
}

impl StatusSink for StatusBoard {
    fn notify(&mut self, notification: Notification) {
        self.last_message = Some(notification);
        if let Some(latest) = self.latest.clone() {
            self.store(latest);
        }
    }

    fn publish(&mut self, snapshot: StatusSnapshot) {
        self.store(snapshot);
    }
}

/// Reads the board written by the daemon. A missing board means no daemon ever ran here.
pub fn read_status(path: &Path) -> Result<Option<StatusSnapshot>> {
    match std::fs::read_to_string(path) {
        Ok(contents) => Ok(Some(
            serde_json::from_str(&contents)
                .with_context(|| format!("Invalid status board {path:?}"))?,
        )),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use chrono::{Duration, TimeZone, Utc};
    use tempfile::tempdir;

    use super::{
        read_status, Notification, NotificationLevel, StatusBoard, StatusSink, StatusSnapshot,
        TrackingPhase,
    };

    fn snapshot(phase: TrackingPhase) -> StatusSnapshot {
        let now = Utc.with_ymd_and_hms(2018, 7, 4, 12, 0, 0).unwrap();
        StatusSnapshot {
            pid: 42,
            phase,
            session_start: Some(now),
            last_sync_time: Some(now),
            next_sync_at: Some(now + Duration::minutes(30)),
            commit_interval: 30 * 60 * 1000,
            total_time: 3600.,
            last_message: None,
            updated_at: now,
        }
    }

    #[test]
    fn board_round_trips_with_latest_message() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("status.json");
        let mut board = StatusBoard::new(path.clone());

        assert_eq!(read_status(&path)?, None);

        board.publish(snapshot(TrackingPhase::Active));
        board.notify(Notification {
            level: NotificationLevel::Warning,
            message: "push failed".into(),
            at: Utc::now(),
        });

        let stored = read_status(&path)?.expect("board was written");
        assert_eq!(stored.phase, TrackingPhase::Active);
        assert_eq!(
            stored.last_message.map(|v| v.message),
            Some("push failed".to_owned())
        );
        Ok(())
    }

    #[test]
    fn remaining_time_depends_on_phase() {
        let now = Utc.with_ymd_and_hms(2018, 7, 4, 12, 10, 0).unwrap();
        assert_eq!(
            snapshot(TrackingPhase::Active).time_remaining(now),
            Some(Duration::minutes(20))
        );
        assert_eq!(
            snapshot(TrackingPhase::Syncing).time_remaining(now),
            Some(Duration::zero())
        );
        assert_eq!(snapshot(TrackingPhase::Idle).time_remaining(now), None);
        assert_eq!(
            snapshot(TrackingPhase::Active).time_remaining(now + Duration::hours(1)),
            Some(Duration::zero())
        );
    }
}
