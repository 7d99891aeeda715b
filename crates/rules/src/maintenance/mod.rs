mod recurrence;

pub use recurrence::{Recurrence, RepeatOn, RepeatType};

use chrono::{DateTime, FixedOffset, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

#[derive(Debug)]
pub struct MaintenanceError(pub String);

impl std::fmt::Display for MaintenanceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid planned maintenance: {}", self.0)
    }
}

impl std::error::Error for MaintenanceError {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    pub timezone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<FixedOffset>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<FixedOffset>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurrence: Option<Recurrence>,
}

impl Schedule {
    fn fixed_range(&self) -> Option<(DateTime<FixedOffset>, DateTime<FixedOffset>)> {
        self.start_time.zip(self.end_time)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaintenanceStatus {
    Active,
    Upcoming,
    Expired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaintenanceKind {
    Fixed,
    Recurring,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedMaintenance {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub schedule: Option<Schedule>,
    /// Rules this window suppresses; empty means every rule.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rule_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl PlannedMaintenance {
    fn location(&self) -> Option<(&Schedule, Tz)> {
        let schedule = self.schedule.as_ref()?;
        let tz = schedule.timezone.parse::<Tz>().ok()?;
        Some((schedule, tz))
    }

    pub fn applies_to(&self, rule_id: &str) -> bool {
        self.rule_ids.is_empty() || self.rule_ids.iter().any(|id| id == rule_id)
    }

    pub fn should_skip(&self, rule_id: &str, now: DateTime<Utc>) -> bool {
        self.applies_to(rule_id) && self.is_active(now)
    }

    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.current_window_end(now).is_some()
    }

    /// End of the window that contains `now`, if one does.
    pub fn current_window_end(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let (schedule, tz) = self.location()?;

        if let Some((start, end)) = schedule.fixed_range() {
            if now >= start.with_timezone(&Utc) && now <= end.with_timezone(&Utc) {
                return Some(end.with_timezone(&Utc));
            }
        }

        let recurrence = schedule.recurrence.as_ref()?;
        recurrence
            .current_window(&now.with_timezone(&tz))
            .map(|(_, end)| end.with_timezone(&Utc))
    }

    pub fn is_upcoming(&self, now: DateTime<Utc>) -> bool {
        let Some((schedule, _)) = self.location() else {
            return false;
        };
        if let Some((start, _)) = schedule.fixed_range() {
            return now < start.with_timezone(&Utc);
        }
        schedule
            .recurrence
            .as_ref()
            .is_some_and(|r| now < r.start_time.with_timezone(&Utc))
    }

    pub fn is_recurring(&self) -> bool {
        self.schedule.as_ref().is_some_and(|s| s.recurrence.is_some())
    }

    pub fn status(&self, now: DateTime<Utc>) -> MaintenanceStatus {
        if self.is_active(now) {
            MaintenanceStatus::Active
        } else if self.is_upcoming(now) {
            MaintenanceStatus::Upcoming
        } else {
            MaintenanceStatus::Expired
        }
    }

    pub fn kind(&self) -> MaintenanceKind {
        match self.schedule.as_ref().and_then(Schedule::fixed_range) {
            Some((start, end)) if end > start => MaintenanceKind::Fixed,
            _ => MaintenanceKind::Recurring,
        }
    }

    pub fn validate(&self) -> Result<(), MaintenanceError> {
        if self.name.is_empty() {
            return Err(MaintenanceError("missing name".into()));
        }
        let Some(schedule) = &self.schedule else {
            return Err(MaintenanceError("missing schedule".into()));
        };
        if schedule.timezone.is_empty() {
            return Err(MaintenanceError("missing timezone".into()));
        }
        if schedule.timezone.parse::<Tz>().is_err() {
            return Err(MaintenanceError(format!("invalid timezone {:?}", schedule.timezone)));
        }
        if let Some((start, end)) = schedule.fixed_range() {
            if start > end {
                return Err(MaintenanceError("start time cannot be after end time".into()));
            }
        }
        if let Some(rec) = &schedule.recurrence {
            if rec.repeat_type.is_none() {
                return Err(MaintenanceError("missing repeat type".into()));
            }
            if rec.duration.is_zero() {
                return Err(MaintenanceError("missing duration".into()));
            }
            if rec.end_time.is_some_and(|end| end < rec.start_time) {
                return Err(MaintenanceError("end time cannot be before start time".into()));
            }
        }
        Ok(())
    }
}
