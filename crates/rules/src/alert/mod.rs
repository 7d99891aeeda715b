mod state;

pub use state::{AlertState, Health};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::labels::Labels;

/// Resolved alerts stay in the active map this long so the resolution can be delivered.
pub const RESOLVED_RETENTION: Duration = Duration::from_secs(15 * 60);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub state: AlertState,
    pub labels: Labels,
    pub annotations: Labels,
    pub query_result_labels: Labels,
    pub generator_url: String,
    pub receivers: Vec<String>,
    pub value: f64,
    pub active_at: DateTime<Utc>,
    pub fired_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub last_sent_at: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    pub missing: bool,
    pub is_recovering: bool,
}

impl Alert {
    pub fn needs_sending(&self, ts: DateTime<Utc>, resend_delay: Duration) -> bool {
        if self.state == AlertState::Pending {
            return false;
        }
        let Some(last_sent) = self.last_sent_at else {
            return true;
        };
        if self.resolved_at.is_some_and(|resolved| resolved > last_sent) {
            return true;
        }
        last_sent + to_delta(resend_delay) < ts
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved_at.is_some()
    }
}

pub(crate) fn to_delta(d: Duration) -> chrono::TimeDelta {
    chrono::TimeDelta::from_std(d).unwrap_or_else(|_| chrono::TimeDelta::days(365 * 100))
}
