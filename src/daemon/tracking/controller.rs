use std::{error::Error, sync::Arc};

use anyhow::anyhow;
use chrono::{DateTime, Duration, Utc};
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::{
    config::{Settings, SettingsSource},
    daemon::{
        errors::TrackingError,
        remote::{git::CommitOutcome, RemoteSync, RemoteTarget},
        status::{Notification, NotificationLevel, StatusSink, StatusSnapshot, TrackingPhase},
        storage::{
            entities::{SessionDraft, SessionKind, TrackingRecord},
            state_store::StateStore,
            tracking_log::TrackingLog,
        },
    },
    utils::{
        clock::Clock,
        secret::Secret,
        time::{iso_timestamp, whole_hours},
    },
};

use super::session::{SessionClock, SessionOrigin};

pub const INITIAL_COMMIT_MESSAGE: &str = "Initial commit: setup tracking";

/// Everything the controller knows about the running session. Owned by exactly one
/// [TrackingController]; nothing about a session lives outside of it.
#[derive(Debug, Clone)]
pub struct ControllerState {
    phase: TrackingPhase,
    session: Option<SessionClock>,
    /// Deadline of the next tick. This is the only timer, so there is never more than one.
    next_tick: Option<Instant>,
    credential: Option<Secret>,
    total_time: f64,
}

impl ControllerState {
    pub fn idle() -> Self {
        Self {
            phase: TrackingPhase::Idle,
            session: None,
            next_tick: None,
            credential: None,
            total_time: 0.,
        }
    }

    pub fn phase(&self) -> TrackingPhase {
        self.phase
    }

    pub fn session(&self) -> Option<&SessionClock> {
        self.session.as_ref()
    }

    pub fn next_tick(&self) -> Option<Instant> {
        self.next_tick
    }

    pub fn has_credential(&self) -> bool {
        self.credential.is_some()
    }

    pub fn total_time(&self) -> f64 {
        self.total_time
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started(SessionOrigin),
    AlreadyRunning,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// No session is running.
    Inactive,
    /// A commit cycle is still in flight.
    Busy,
    NotDue { remaining: Duration },
    Synced { outcome: CommitOutcome, total_time: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum StopOutcome {
    NotRunning,
    Stopped { duration: f64, synced: bool },
}

/// The tracking state machine: `Idle -> Active <-> Syncing -> Idle`.
///
/// Local accounting is optimistic: a session entry is written before the push, and a failed push
/// leaves the session clock untouched so the next tick retries with the duration measured from
/// the original session start.
pub struct TrackingController<L: TrackingLog> {
    state: ControllerState,
    log: L,
    remote: RemoteSync,
    durable: StateStore,
    settings: Box<dyn SettingsSource>,
    clock: Arc<dyn Clock>,
    status: Box<dyn StatusSink>,
}

impl<L: TrackingLog> TrackingController<L> {
    pub fn new(
        log: L,
        remote: RemoteSync,
        durable: StateStore,
        settings: Box<dyn SettingsSource>,
        clock: Arc<dyn Clock>,
        status: Box<dyn StatusSink>,
    ) -> Self {
        Self {
            state: ControllerState::idle(),
            log,
            remote,
            durable,
            settings,
            clock,
            status,
        }
    }

    pub fn state(&self) -> &ControllerState {
        &self.state
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    pub fn next_tick(&self) -> Option<Instant> {
        self.state.next_tick
    }

    /// Time until the next commit cycle, `None` while idle.
    pub fn time_remaining(&self, commit_interval: Duration) -> Option<Duration> {
        let session = self.state.session.as_ref()?;
        match self.state.phase {
            TrackingPhase::Idle => None,
            TrackingPhase::Syncing => Some(Duration::zero()),
            TrackingPhase::Active => Some(session.time_remaining(self.clock.time(), commit_interval)),
        }
    }

    /// Starts a session. `supplied` takes precedence over the stored token and is stored once the
    /// provider accepted it. Starting a running controller does nothing.
    pub async fn start(&mut self, supplied: Option<Secret>) -> Result<StartOutcome, TrackingError> {
        let result = self.start_inner(supplied).await;
        if let Err(e) = &result {
            self.report_failure(e);
            let settings = self.settings.current();
            self.publish(&settings);
        }
        result
    }

    /// Evaluates whether a commit cycle is due and runs it if so.
    pub async fn on_tick(&mut self) -> Result<TickOutcome, TrackingError> {
        let result = self.tick_inner().await;
        if let Err(e) = &result {
            self.report_failure(e);
        }
        result
    }

    /// Ends the session with a final entry and one best-effort push.
    pub async fn stop(&mut self) -> Result<StopOutcome, TrackingError> {
        let result = self.stop_inner().await;
        if let Err(e) = &result {
            self.report_failure(e);
        }
        result
    }

    #[instrument(skip_all)]
    async fn start_inner(&mut self, supplied: Option<Secret>) -> Result<StartOutcome, TrackingError> {
        if self.state.phase != TrackingPhase::Idle {
            info!("Start requested while tracking is running");
            self.notify(NotificationLevel::Info, "Tracking already running.");
            return Ok(StartOutcome::AlreadyRunning);
        }

        let stored = self
            .durable
            .load()
            .await
            .map_err(TrackingError::LocalReadFailed)?;
        let supplied = supplied.filter(|v| !v.is_blank());
        let token = supplied
            .clone()
            .or_else(|| stored.github_token.clone().filter(|v| !v.is_blank()))
            .ok_or(TrackingError::CredentialMissing)?;

        let settings = self.settings.current();
        let record = match self.prepare_remote(&token, &settings).await {
            Ok(record) => record,
            Err(e) => {
                self.remote.detach();
                return Err(e);
            }
        };

        let now = self.clock.time();
        let (session, origin) =
            SessionClock::restore(now, stored.session_start, stored.last_sync_time);
        let mirrored = self
            .durable
            .update(|state| {
                if supplied.is_some() {
                    state.github_token = supplied;
                }
                state.session_start = Some(session.session_start());
                state.last_sync_time = Some(session.last_sync_time());
            })
            .await;
        if let Err(e) = mirrored {
            self.remote.detach();
            return Err(TrackingError::LocalWriteFailed(e));
        }

        self.state = ControllerState {
            phase: TrackingPhase::Active,
            session: Some(session),
            next_tick: Some(self.clock.instant() + settings.poll_interval()),
            credential: Some(token),
            total_time: record.total_time,
        };
        info!(
            ?origin,
            session_start = %session.session_start(),
            last_sync_time = %session.last_sync_time(),
            "Started code tracking"
        );
        self.notify(NotificationLevel::Info, "Started code tracking.");
        self.publish(&settings);
        Ok(StartOutcome::Started(origin))
    }

    /// Resolves the account, makes sure the repository exists and prepares the working tree.
    /// A working tree without history gets the initial commit.
    async fn prepare_remote(
        &mut self,
        token: &Secret,
        settings: &Settings,
    ) -> Result<TrackingRecord, TrackingError> {
        let identity = self.remote.resolve_identity(token).await?;
        self.remote
            .ensure_repository(token, &settings.repository_name)
            .await?;
        self.remote
            .attach(RemoteTarget {
                host: settings.git_host.clone(),
                owner: identity.login,
                repository: settings.repository_name.clone(),
                branch: settings.branch.clone(),
                token: token.clone(),
            })
            .await?;

        if self.remote.has_history().await? {
            return self.log.load().await.map_err(TrackingError::LocalReadFailed);
        }

        let record = self
            .log
            .initialize()
            .await
            .map_err(TrackingError::LocalWriteFailed)?;
        match self.sync(INITIAL_COMMIT_MESSAGE, settings).await {
            Ok(outcome) => info!("Initial commit done: {outcome:?}"),
            // The next tick pushes it again.
            Err(e) => self.report_failure(&e),
        }
        Ok(record)
    }

    async fn tick_inner(&mut self) -> Result<TickOutcome, TrackingError> {
        match self.state.phase {
            TrackingPhase::Idle => return Ok(TickOutcome::Inactive),
            TrackingPhase::Syncing => {
                debug!("Tick ignored, a commit cycle is in flight");
                return Ok(TickOutcome::Busy);
            }
            TrackingPhase::Active => {}
        }
        let Some(session) = self.state.session else {
            return Ok(TickOutcome::Inactive);
        };

        let settings = self.settings.current();
        self.state.next_tick = Some(self.clock.instant() + settings.poll_interval());

        let now = self.clock.time();
        let interval = settings.commit_interval();
        if !session.is_due(now, interval) {
            let remaining = session.time_remaining(now, interval);
            trace!("Next commit in {remaining}");
            self.publish(&settings);
            return Ok(TickOutcome::NotDue { remaining });
        }

        self.state.phase = TrackingPhase::Syncing;
        self.publish(&settings);
        let result = self.periodic_cycle(session, now, &settings).await;
        self.state.phase = TrackingPhase::Active;
        self.publish(&settings);
        result
    }

    #[instrument(skip(self, session, settings))]
    async fn periodic_cycle(
        &mut self,
        session: SessionClock,
        now: DateTime<Utc>,
        settings: &Settings,
    ) -> Result<TickOutcome, TrackingError> {
        let record = self
            .log
            .append(SessionDraft {
                date: now,
                duration: session.session_duration(now),
                kind: SessionKind::Periodic,
            })
            .await
            .map_err(TrackingError::LocalWriteFailed)?;
        self.state.total_time = record.total_time;

        let message = format!("Update coding stats: {}", iso_timestamp(now));
        let outcome = self.sync(&message, settings).await?;

        if let Some(session) = self.state.session.as_mut() {
            session.mark_synced(now);
        }
        self.mirror_session().await;
        info!("Committed coding stats, total {}s", record.total_time);
        self.notify(
            NotificationLevel::Info,
            format!(
                "Committed coding stats. Total: {}h",
                whole_hours(record.total_time)
            ),
        );
        Ok(TickOutcome::Synced {
            outcome,
            total_time: record.total_time,
        })
    }

    #[instrument(skip_all)]
    async fn stop_inner(&mut self) -> Result<StopOutcome, TrackingError> {
        let session = match (self.state.phase, self.state.session) {
            (TrackingPhase::Idle, _) | (_, None) => {
                debug!("Stop requested while idle");
                return Ok(StopOutcome::NotRunning);
            }
            (_, Some(session)) => session,
        };
        self.state.next_tick = None;

        let settings = self.settings.current();
        let now = self.clock.time();
        let duration = session.session_duration(now);
        let appended = self
            .log
            .append(SessionDraft {
                date: now,
                duration,
                kind: SessionKind::Final,
            })
            .await;

        let synced = match &appended {
            Ok(record) => {
                self.state.total_time = record.total_time;
                let message = format!("Final update: {}", iso_timestamp(now));
                match self.sync(&message, &settings).await {
                    Ok(_) => true,
                    Err(e) => {
                        self.report_failure(&e);
                        false
                    }
                }
            }
            Err(_) => false,
        };

        // Keep the session start when the final entry is missing, the next start resumes it.
        let written = appended.is_ok();
        if let Err(e) = self
            .durable
            .update(|state| {
                if written {
                    state.session_start = None;
                }
                if synced {
                    state.last_sync_time = Some(now);
                }
            })
            .await
        {
            warn!("Failed to clear the stored session: {e:?}");
        }

        self.remote.detach();
        self.state = ControllerState {
            total_time: self.state.total_time,
            ..ControllerState::idle()
        };
        info!(duration, synced, "Stopped code tracking");
        self.notify(NotificationLevel::Info, "Stopped code tracking.");
        self.publish(&settings);

        appended.map_err(TrackingError::LocalWriteFailed)?;
        Ok(StopOutcome::Stopped { duration, synced })
    }

    /// Commit and push bounded by the configured timeout. A timeout counts as a failed sync.
    async fn sync(&self, message: &str, settings: &Settings) -> Result<CommitOutcome, TrackingError> {
        let timeout = settings.sync_timeout();
        match tokio::time::timeout(timeout, self.remote.commit_and_push(message)).await {
            Ok(result) => result,
            Err(_) => Err(TrackingError::SyncFailed(anyhow!(
                "Sync did not finish within {}ms",
                timeout.as_millis()
            ))),
        }
    }

    /// Mirrors the session clock into the durable store so a restart can resume.
    async fn mirror_session(&mut self) {
        let Some(session) = self.state.session else {
            return;
        };
        let result = self
            .durable
            .update(|state| {
                state.session_start = Some(session.session_start());
                state.last_sync_time = Some(session.last_sync_time());
            })
            .await;
        if let Err(e) = result {
            warn!("Failed to store session timestamps: {e:?}");
        }
    }

    fn report_failure(&mut self, error: &TrackingError) {
        let mut message = error.to_string();
        let mut source = error.source();
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }

        let level = if error.is_retryable() {
            warn!("{message}");
            NotificationLevel::Warning
        } else {
            error!("{message}");
            NotificationLevel::Error
        };
        self.notify(level, message);
    }

    fn notify(&mut self, level: NotificationLevel, message: impl Into<String>) {
        let notification = Notification {
            level,
            message: message.into(),
            at: self.clock.time(),
        };
        self.status.notify(notification);
    }

    fn publish(&mut self, settings: &Settings) {
        let interval = settings.commit_interval();
        let session = self.state.session;
        self.status.publish(StatusSnapshot {
            pid: std::process::id(),
            phase: self.state.phase,
            session_start: session.map(|v| v.session_start()),
            last_sync_time: session.map(|v| v.last_sync_time()),
            next_sync_at: session.map(|v| v.next_sync_at(interval)),
            commit_interval: settings.commit_interval,
            total_time: self.state.total_time,
            last_message: None,
            updated_at: self.clock.time(),
        });
    }
}
