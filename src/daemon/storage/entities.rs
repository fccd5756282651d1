use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Persisted tracking record. `total_time` is only ever grown through [TrackingRecord::push], which
/// keeps it equal to the sum of all session durations.
#[derive(PartialEq, Debug, Serialize, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct TrackingRecord {
    pub total_time: f64,
    #[serde(default)]
    pub sessions: Vec<SessionEntry>,
}

impl TrackingRecord {
    /// Appends a session and returns the stored entry. Negative durations are clamped so the total
    /// never decreases.
    pub fn push(&mut self, draft: SessionDraft) -> SessionEntry {
        let duration = draft.duration.max(0.);
        self.total_time += duration;
        let entry = SessionEntry {
            date: draft.date,
            duration,
            total_time: self.total_time,
            kind: draft.kind,
        };
        self.sessions.push(entry.clone());
        entry
    }

    pub fn sessions_total(&self) -> f64 {
        self.sessions.iter().map(|v| v.duration).sum()
    }
}

/// Single flush of session time into the record.
#[derive(PartialEq, Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SessionEntry {
    pub date: DateTime<Utc>,
    /// Seconds since the previous successful sync or session start.
    pub duration: f64,
    /// Snapshot of the record's total right after this entry was added.
    pub total_time: f64,
    // Older record files used `type` for the same marker.
    #[serde(default, alias = "type")]
    pub kind: SessionKind,
}

#[derive(PartialEq, Eq, Debug, Serialize, Deserialize, Clone, Copy, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionKind {
    #[default]
    Periodic,
    Final,
}

/// Session data before it is placed into a record.
#[derive(PartialEq, Debug, Clone)]
pub struct SessionDraft {
    pub date: DateTime<Utc>,
    pub duration: f64,
    pub kind: SessionKind,
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::{SessionDraft, SessionKind, TrackingRecord};

    #[test]
    fn push_keeps_total_equal_to_sum() {
        let mut record = TrackingRecord::default();
        let date = Utc.with_ymd_and_hms(2018, 7, 4, 0, 0, 0).unwrap();
        for duration in [1800.5, 0., 42.25] {
            record.push(SessionDraft {
                date,
                duration,
                kind: SessionKind::Periodic,
            });
        }
        assert_eq!(record.sessions.len(), 3);
        assert!((record.total_time - record.sessions_total()).abs() < 1e-9);
        assert_eq!(record.sessions[2].total_time, record.total_time);
    }

    #[test]
    fn negative_duration_does_not_shrink_total() {
        let mut record = TrackingRecord::default();
        let entry = record.push(SessionDraft {
            date: Utc::now(),
            duration: -10.,
            kind: SessionKind::Final,
        });
        assert_eq!(entry.duration, 0.);
        assert_eq!(record.total_time, 0.);
    }

    #[test]
    fn missing_kind_reads_as_periodic() {
        let json = r#"{"totalTime": 60, "sessions": [
            {"date": "2024-03-01T10:00:00.000Z", "duration": 60, "totalTime": 60}
        ]}"#;
        let record: TrackingRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.sessions[0].kind, SessionKind::Periodic);
    }

    #[test]
    fn legacy_type_field_is_understood() {
        let json = r#"{"totalTime": 5, "sessions": [
            {"date": "2024-03-01T10:00:00.000Z", "duration": 5, "totalTime": 5, "type": "final"}
        ]}"#;
        let record: TrackingRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.sessions[0].kind, SessionKind::Final);
    }

    #[test]
    fn serializes_with_camel_case_keys() {
        let mut record = TrackingRecord::default();
        record.push(SessionDraft {
            date: Utc.with_ymd_and_hms(2018, 7, 4, 0, 0, 0).unwrap(),
            duration: 1.,
            kind: SessionKind::Final,
        });
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["totalTime"], 1.0);
        assert_eq!(value["sessions"][0]["kind"], "final");
        assert_eq!(value["sessions"][0]["date"], "2018-07-04T00:00:00Z");
    }
}
