use std::fmt;

use chrono::{DateTime, Utc};

use super::AuctionRecord;

pub const VACANT_THRONE: &str = "Трон пустует!";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeLeft {
    Vacant,
    Remaining { hours: i64, minutes: i64 },
}

impl fmt::Display for TimeLeft {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeLeft::Vacant => f.write_str(VACANT_THRONE),
            TimeLeft::Remaining { hours, minutes } => write!(f, "{}ч {}м", hours, minutes),
        }
    }
}

/// Whole hours and minutes left in the current term, rounded down.
pub fn time_left(record: &AuctionRecord, now: DateTime<Utc>) -> TimeLeft {
    if record.is_vacant(now) {
        return TimeLeft::Vacant;
    }
    let Some(until) = record.lord_until else {
        return TimeLeft::Vacant;
    };

    let seconds = (until - now).num_seconds().max(0);
    TimeLeft::Remaining {
        hours: seconds / 3600,
        minutes: (seconds % 3600) / 60,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn held_until(until: DateTime<Utc>) -> AuctionRecord {
        AuctionRecord {
            lord_id: Some(7),
            lord_username: Some("bob".to_string()),
            price: 100,
            lord_until: Some(until),
        }
    }

    #[test]
    fn vacant_record_renders_empty_throne() {
        let now = Utc::now();
        assert_eq!(time_left(&AuctionRecord::vacant(50), now), TimeLeft::Vacant);
        assert_eq!(time_left(&AuctionRecord::vacant(50), now).to_string(), "Трон пустует!");
    }

    #[test]
    fn one_minute_before_expiry() {
        let until = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 0).unwrap();
        let left = time_left(&held_until(until), until - Duration::minutes(1));
        assert_eq!(left, TimeLeft::Remaining { hours: 0, minutes: 1 });
        assert_eq!(left.to_string(), "0ч 1м");
    }

    #[test]
    fn partial_minutes_round_down() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let until = now + Duration::hours(24) - Duration::milliseconds(1500);
        assert_eq!(time_left(&held_until(until), now).to_string(), "23ч 59м");

        let until = now + Duration::seconds(59);
        assert_eq!(time_left(&held_until(until), now).to_string(), "0ч 0м");
    }

    #[test]
    fn expired_or_exact_boundary_is_vacant_never_negative() {
        let until = Utc.with_ymd_and_hms(2026, 1, 2, 0, 0, 0).unwrap();
        assert_eq!(time_left(&held_until(until), until), TimeLeft::Vacant);
        assert_eq!(
            time_left(&held_until(until), until + Duration::hours(5)),
            TimeLeft::Vacant
        );
    }
}
