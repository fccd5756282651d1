use chrono::{DateTime, Duration, Utc};

use crate::utils::time::as_seconds;

/// How a session was set up on start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOrigin {
    /// Timestamps came from a run that ended without a clean stop.
    Resumed,
    Fresh,
}

/// Session start and last successful sync of a running session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionClock {
    session_start: DateTime<Utc>,
    last_sync_time: DateTime<Utc>,
}

impl SessionClock {
    /// Picks exactly one of resuming the stored timestamps or starting fresh. Resuming requires
    /// a stored session start; the stored sync time alone only seeds a fresh session.
    pub fn restore(
        now: DateTime<Utc>,
        stored_session_start: Option<DateTime<Utc>>,
        stored_last_sync: Option<DateTime<Utc>>,
    ) -> (Self, SessionOrigin) {
        match stored_session_start {
            Some(session_start) => (
                Self {
                    session_start,
                    last_sync_time: stored_last_sync.unwrap_or(session_start),
                },
                SessionOrigin::Resumed,
            ),
            None => (
                Self {
                    session_start: now,
                    last_sync_time: stored_last_sync.unwrap_or(now),
                },
                SessionOrigin::Fresh,
            ),
        }
    }

    pub fn session_start(&self) -> DateTime<Utc> {
        self.session_start
    }

    pub fn last_sync_time(&self) -> DateTime<Utc> {
        self.last_sync_time
    }

    pub fn elapsed_since_sync(&self, now: DateTime<Utc>) -> Duration {
        now - self.last_sync_time
    }

    pub fn is_due(&self, now: DateTime<Utc>, commit_interval: Duration) -> bool {
        self.elapsed_since_sync(now) >= commit_interval
    }

    /// Seconds accumulated since the session started, never negative.
    pub fn session_duration(&self, now: DateTime<Utc>) -> f64 {
        as_seconds(now - self.session_start).max(0.)
    }

    pub fn time_remaining(&self, now: DateTime<Utc>, commit_interval: Duration) -> Duration {
        commit_interval
            .checked_sub(&self.elapsed_since_sync(now))
            .unwrap_or_else(Duration::zero)
            .max(Duration::zero())
    }

    /// Saturates at the latest representable moment.
    pub fn next_sync_at(&self, commit_interval: Duration) -> DateTime<Utc> {
        self.last_sync_time
            .checked_add_signed(commit_interval)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// A successful sync flushes the session: durations restart from `now`.
    pub fn mark_synced(&mut self, now: DateTime<Utc>) {
        self.last_sync_time = now;
        self.session_start = now;
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};

    use super::{SessionClock, SessionOrigin};

    const TEST_START_DATE: NaiveDateTime =
        NaiveDateTime::new(NaiveDate::from_ymd_opt(2018, 7, 4).unwrap(), NaiveTime::MIN);

    #[test]
    fn fresh_session_keeps_stored_sync_time() {
        let now = Utc.from_utc_datetime(&TEST_START_DATE);
        let last = now - Duration::hours(3);

        let (clock, origin) = SessionClock::restore(now, None, Some(last));

        assert_eq!(origin, SessionOrigin::Fresh);
        assert_eq!(clock.session_start(), now);
        assert_eq!(clock.last_sync_time(), last);
        assert!(clock.is_due(now, Duration::minutes(30)));
        assert_eq!(clock.session_duration(now), 0.);
    }

    #[test]
    fn stored_session_start_is_resumed() {
        let now = Utc.from_utc_datetime(&TEST_START_DATE);
        let start = now - Duration::minutes(20);
        let last = now - Duration::minutes(10);

        let (clock, origin) = SessionClock::restore(now, Some(start), Some(last));

        assert_eq!(origin, SessionOrigin::Resumed);
        assert_eq!(clock.session_duration(now), 1200.);
        assert_eq!(
            clock.time_remaining(now, Duration::minutes(30)),
            Duration::minutes(20)
        );
    }

    #[test]
    fn nothing_stored_starts_now() {
        let now = Utc.from_utc_datetime(&TEST_START_DATE);
        let (clock, origin) = SessionClock::restore(now, None, None);
        assert_eq!(origin, SessionOrigin::Fresh);
        assert_eq!(clock.last_sync_time(), now);
        assert!(!clock.is_due(now, Duration::minutes(30)));
    }

    #[test]
    fn sync_resets_both_timestamps() {
        let now = Utc.from_utc_datetime(&TEST_START_DATE);
        let (mut clock, _) = SessionClock::restore(now, None, None);
        let later = now + Duration::minutes(31);

        clock.mark_synced(later);

        assert_eq!(clock.session_duration(later), 0.);
        assert_eq!(clock.next_sync_at(Duration::minutes(30)), later + Duration::minutes(30));
    }

    #[test]
    fn clock_going_backwards_does_not_produce_negative_time() {
        let now = Utc.from_utc_datetime(&TEST_START_DATE);
        let (clock, _) = SessionClock::restore(now, None, None);
        let earlier = now - Duration::seconds(5);
        assert_eq!(clock.session_duration(earlier), 0.);
        assert_eq!(
            clock.time_remaining(earlier, Duration::seconds(60)),
            Duration::seconds(65)
        );
    }

    #[test]
    fn huge_interval_saturates_instead_of_overflowing() {
        let now = Utc.from_utc_datetime(&TEST_START_DATE);
        let (clock, _) = SessionClock::restore(now, None, None);

        assert_eq!(clock.next_sync_at(Duration::MAX), DateTime::<Utc>::MAX_UTC);
        assert!(!clock.is_due(now, Duration::MAX));
        assert!(clock.time_remaining(now, Duration::MAX) > Duration::zero());
        assert_eq!(
            clock.time_remaining(now + Duration::days(1), Duration::MIN),
            Duration::zero()
        );
    }
}
