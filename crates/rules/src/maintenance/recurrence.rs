use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, TimeDelta, TimeZone, Timelike};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::alert::to_delta;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepeatType {
    Daily,
    Weekly,
    Monthly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepeatOn {
    Sunday,
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
}

impl RepeatOn {
    fn days_from_sunday(&self) -> i64 {
        match self {
            Self::Sunday => 0,
            Self::Monday => 1,
            Self::Tuesday => 2,
            Self::Wednesday => 3,
            Self::Thursday => 4,
            Self::Friday => 5,
            Self::Saturday => 6,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recurrence {
    /// Anchor: its wall-clock time of day (and day of month) define each occurrence.
    pub start_time: DateTime<FixedOffset>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<FixedOffset>>,
    #[serde(with = "crate::duration::serde_go")]
    pub duration: Duration,
    #[serde(default)]
    pub repeat_type: Option<RepeatType>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub repeat_on: Vec<RepeatOn>,
}

impl Recurrence {
    pub fn has_started(&self, now: &DateTime<Tz>) -> bool {
        now.naive_utc() >= self.start_time.naive_utc()
    }

    pub fn has_expired(&self, now: &DateTime<Tz>) -> bool {
        self.end_time
            .is_some_and(|end| now.naive_utc() > end.naive_utc())
    }

    /// Bounds of the occurrence containing `now`, if any.
    pub fn current_window(&self, now: &DateTime<Tz>) -> Option<(DateTime<Tz>, DateTime<Tz>)> {
        if !self.has_started(now) || self.has_expired(now) {
            return None;
        }
        match self.repeat_type? {
            RepeatType::Daily => self.daily_window(now),
            RepeatType::Weekly => self.weekly_window(now),
            RepeatType::Monthly => self.monthly_window(now),
        }
    }

    fn contains(&self, candidate: DateTime<Tz>, now: &DateTime<Tz>) -> Option<(DateTime<Tz>, DateTime<Tz>)> {
        let end = candidate + to_delta(self.duration);
        (*now >= candidate && *now <= end).then_some((candidate, end))
    }

    fn daily_window(&self, now: &DateTime<Tz>) -> Option<(DateTime<Tz>, DateTime<Tz>)> {
        let tz = now.timezone();
        let (h, m) = (self.start_time.hour(), self.start_time.minute());
        let today = now.date_naive();
        let mut candidate = local(&tz, today, h, m, 0, 0)?;
        if candidate > *now {
            candidate = local(&tz, today - TimeDelta::days(1), h, m, 0, 0)?;
        }
        self.contains(candidate, now)
    }

    fn weekly_window(&self, now: &DateTime<Tz>) -> Option<(DateTime<Tz>, DateTime<Tz>)> {
        if self.repeat_on.is_empty() {
            return self.daily_window(now);
        }
        let tz = now.timezone();
        let (h, m) = (self.start_time.hour(), self.start_time.minute());
        let today = now.date_naive();
        let weekday = i64::from(now.weekday().num_days_from_sunday());

        self.repeat_on.iter().find_map(|day| {
            let date = today + TimeDelta::days(day.days_from_sunday() - weekday);
            let mut candidate = local(&tz, date, h, m, 0, 0)?;
            if candidate > *now {
                candidate = local(&tz, date - TimeDelta::days(7), h, m, 0, 0)?;
            }
            self.contains(candidate, now)
        })
    }

    fn monthly_window(&self, now: &DateTime<Tz>) -> Option<(DateTime<Tz>, DateTime<Tz>)> {
        let tz = now.timezone();
        let anchor = &self.start_time;
        let ref_day = anchor.day();
        let at = |year: i32, month: u32| {
            let day = ref_day.min(days_in_month(year, month)?);
            let date = NaiveDate::from_ymd_opt(year, month, day)?;
            local(&tz, date, anchor.hour(), anchor.minute(), anchor.second(), anchor.nanosecond())
        };

        let mut candidate = at(now.year(), now.month())?;
        if candidate > *now {
            let (year, month) = if now.month() == 1 {
                (now.year() - 1, 12)
            } else {
                (now.year(), now.month() - 1)
            };
            candidate = at(year, month)?;
        }
        self.contains(candidate, now)
    }
}

fn days_in_month(year: i32, month: u32) -> Option<u32> {
    let (ny, nm) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(ny, nm, 1)?.pred_opt().map(|d| d.day())
}

/// Wall-clock time in `tz`. Times that fall into a DST gap move forward by an hour.
fn local(tz: &Tz, date: NaiveDate, h: u32, m: u32, s: u32, ns: u32) -> Option<DateTime<Tz>> {
    let naive = date.and_hms_nano_opt(h, m, s, ns)?;
    tz.from_local_datetime(&naive)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(naive + TimeDelta::hours(1))).earliest())
}
