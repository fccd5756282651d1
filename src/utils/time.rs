use chrono::{DateTime, Duration, SecondsFormat, Utc};

/// This is the standard way of writing a timestamp into commit messages and records.
pub fn iso_timestamp(moment: DateTime<Utc>) -> String {
    moment.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Formats a countdown the way the status line shows it, e.g. `12m 5s`.
pub fn format_remaining(remaining: Duration) -> String {
    let seconds = remaining.num_seconds().max(0);
    format!("{}m {}s", seconds / 60, seconds % 60)
}

/// Whole hours contained in a number of seconds.
pub fn whole_hours(seconds: f64) -> u64 {
    (seconds.max(0.) / 3600.).floor() as u64
}

/// Converts a chrono duration into fractional seconds.
pub fn as_seconds(duration: Duration) -> f64 {
    duration.num_milliseconds() as f64 / 1000.
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::{as_seconds, format_remaining, iso_timestamp, whole_hours};

    #[test]
    fn remaining_is_split_into_minutes_and_seconds() {
        assert_eq!(format_remaining(Duration::seconds(725)), "12m 5s");
        assert_eq!(format_remaining(Duration::seconds(-3)), "0m 0s");
    }

    #[test]
    fn hours_are_truncated() {
        assert_eq!(whole_hours(7199.), 1);
        assert_eq!(whole_hours(-5.), 0);
    }

    #[test]
    fn timestamps_use_utc_suffix() {
        let moment = Utc.with_ymd_and_hms(2018, 7, 4, 10, 0, 0).unwrap();
        assert_eq!(iso_timestamp(moment), "2018-07-04T10:00:00.000Z");
    }

    #[test]
    fn fractional_seconds_are_kept() {
        assert_eq!(as_seconds(Duration::milliseconds(1500)), 1.5);
    }
}
