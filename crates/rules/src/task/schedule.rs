use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::Tz;
use std::str::FromStr;
use std::time::Duration;

/// Evaluation slot for a task whose name hashes to `hash`. The offset within each
/// `frequency` period is fixed by the hash, so restarts keep the same cadence and
/// tasks with different names spread across the period.
pub fn eval_timestamp(hash: u64, frequency: Duration, start: DateTime<Utc>) -> DateTime<Utc> {
    let freq = frequency.as_nanos() as i64;
    if freq <= 0 {
        return start;
    }
    let Some(now) = start.timestamp_nanos_opt() else {
        return start;
    };
    let offset = (hash % freq as u64) as i64;
    let adjusted = now - offset;
    let base = adjusted - adjusted.rem_euclid(freq);
    Utc.timestamp_nanos(base + offset)
}

/// Next aligned slot after `last` as seen at `now`, and how many slots were skipped.
pub fn advance(last: DateTime<Utc>, now: DateTime<Utc>, frequency: Duration) -> (DateTime<Utc>, i64) {
    let freq = frequency.as_nanos() as i64;
    if freq <= 0 {
        return (now, 0);
    }
    let elapsed = (now - last).num_nanoseconds().unwrap_or(i64::MAX);
    let missed = (elapsed / freq - 1).max(0);
    (last + chrono::TimeDelta::nanoseconds(freq * (missed + 1)), missed)
}

/// Parses a five-field cron expression (minute precision). Six or seven fields are
/// passed through unchanged.
pub fn parse_cron(expr: &str) -> Result<cron::Schedule, String> {
    let fields = expr.split_whitespace().count();
    let full = match fields {
        5 => format!("0 {}", expr.trim()),
        6 | 7 => expr.trim().to_string(),
        n => return Err(format!("expected 5 fields, got {n}")),
    };
    cron::Schedule::from_str(&full).map_err(|e| e.to_string())
}

#[derive(Debug, Clone)]
pub struct CronSchedule {
    schedule: cron::Schedule,
    timezone: Tz,
    starts_at: Option<DateTime<Utc>>,
}

impl CronSchedule {
    pub fn new(expr: &str, timezone: Option<&str>) -> Result<Self, String> {
        let timezone = match timezone {
            Some(name) if !name.is_empty() => name
                .parse::<Tz>()
                .map_err(|_| format!("invalid timezone: {name}"))?,
            _ => Tz::UTC,
        };
        Ok(Self {
            schedule: parse_cron(expr)?,
            timezone,
            starts_at: None,
        })
    }

    pub fn with_starts_at(mut self, starts_at: DateTime<Utc>) -> Self {
        self.starts_at = Some(starts_at);
        self
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// First fire time strictly after `after`, never before `starts_at`.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let from = match self.starts_at {
            Some(start) if start > after => start - chrono::TimeDelta::seconds(1),
            _ => after,
        };
        self.schedule
            .after(&from.with_timezone(&self.timezone))
            .next()
            .map(|t| t.with_timezone(&Utc))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, h, m, s).unwrap()
    }

    #[test]
    fn slot_is_deterministic() {
        let freq = Duration::from_secs(60);
        let a = eval_timestamp(12345, freq, at(10, 0, 30));
        let b = eval_timestamp(12345, freq, at(10, 0, 30));
        assert_eq!(a, b);
    }

    #[test]
    fn slot_is_within_one_period() {
        let freq = Duration::from_secs(60);
        let start = at(10, 0, 30);
        for hash in [0u64, 1, 59_999_999_999, 123_456_789_012_345] {
            let slot = eval_timestamp(hash, freq, start);
            assert!(slot <= start);
            assert!(start - slot < chrono::TimeDelta::seconds(60));
        }
    }

    #[test]
    fn slot_offset_follows_hash() {
        let freq = Duration::from_secs(60);
        let offset_ns = 15_000_000_000u64;
        let slot = eval_timestamp(offset_ns, freq, at(10, 0, 30));
        assert_eq!(slot, at(10, 0, 15));
        let slot = eval_timestamp(offset_ns, freq, at(10, 0, 10));
        assert_eq!(slot, at(9, 59, 15));
    }

    #[test]
    fn same_slot_across_restarts() {
        let freq = Duration::from_secs(60);
        let first = eval_timestamp(42, freq, at(10, 0, 30));
        let later = eval_timestamp(42, freq, at(10, 7, 45));
        assert_eq!((later - first).num_nanoseconds().unwrap() % 60_000_000_000, 0);
    }

    #[test]
    fn advance_on_time() {
        let freq = Duration::from_secs(60);
        let (next, missed) = advance(at(10, 0, 0), at(10, 1, 0), freq);
        assert_eq!(next, at(10, 1, 0));
        assert_eq!(missed, 0);
    }

    #[test]
    fn advance_skips_missed_slots() {
        let freq = Duration::from_secs(60);
        let (next, missed) = advance(at(10, 0, 0), at(10, 3, 5), freq);
        assert_eq!(missed, 2);
        assert_eq!(next, at(10, 3, 0));
    }

    #[test]
    fn advance_never_goes_backwards() {
        let freq = Duration::from_secs(60);
        let (next, missed) = advance(at(10, 0, 0), at(10, 0, 59), freq);
        assert_eq!(missed, 0);
        assert_eq!(next, at(10, 1, 0));
    }

    #[test]
    fn cron_five_fields() {
        let s = CronSchedule::new("0,15,30,45 * * * *", None).unwrap();
        assert_eq!(s.next_after(at(10, 7, 0)), Some(at(10, 15, 0)));
        assert_eq!(s.next_after(at(10, 15, 0)), Some(at(10, 30, 0)));
    }

    #[test]
    fn cron_in_timezone() {
        let s = CronSchedule::new("0 9 * * *", Some("Europe/Berlin")).unwrap();
        let next = s.next_after(Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap());
        assert_eq!(next, Some(Utc.with_ymd_and_hms(2024, 1, 15, 8, 0, 0).unwrap()));
    }

    #[test]
    fn cron_starts_at() {
        let s = CronSchedule::new("0 * * * *", None)
            .unwrap()
            .with_starts_at(at(15, 0, 0));
        assert_eq!(s.next_after(at(10, 30, 0)), Some(at(15, 0, 0)));
        assert_eq!(s.next_after(at(15, 0, 0)), Some(at(16, 0, 0)));
    }

    #[test]
    fn cron_rejects_garbage() {
        assert!(parse_cron("every day").is_err());
        assert!(parse_cron("* * *").is_err());
        assert!(CronSchedule::new("* * * * *", Some("Mars/Olympus")).is_err());
    }
}
