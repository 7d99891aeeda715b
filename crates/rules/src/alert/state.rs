use serde::{Deserialize, Serialize};

/// Lifecycle state of one alert. Ordered by severity so a rule's overall state is the max.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertState {
    Inactive,
    Pending,
    Recovering,
    Firing,
}

impl AlertState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inactive => "inactive",
            Self::Pending => "pending",
            Self::Recovering => "recovering",
            Self::Firing => "firing",
        }
    }

    pub fn is_firing(&self) -> bool {
        matches!(self, Self::Firing)
    }

    /// Applies the hysteresis sub-cycle between Firing and Recovering.
    pub fn recovery_transition(self, is_recovering: bool, missing: bool) -> Self {
        match self {
            Self::Firing if is_recovering => Self::Recovering,
            Self::Recovering if !is_recovering && !missing => Self::Firing,
            other => other,
        }
    }
}

impl std::fmt::Display for AlertState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Health {
    #[default]
    Unknown,
    Ok,
    Err,
}

impl std::fmt::Display for Health {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Unknown => "unknown",
            Self::Ok => "ok",
            Self::Err => "err",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn firing_is_most_severe() {
        let states = [AlertState::Pending, AlertState::Firing, AlertState::Inactive];
        assert_eq!(states.iter().max(), Some(&AlertState::Firing));
        assert!(AlertState::Recovering > AlertState::Pending);
    }

    #[test]
    fn firing_to_recovering() {
        let s = AlertState::Firing.recovery_transition(true, false);
        assert_eq!(s, AlertState::Recovering);
    }

    #[test]
    fn recovering_back_to_firing() {
        let s = AlertState::Recovering.recovery_transition(false, false);
        assert!(s.is_firing());
    }

    #[test]
    fn recovering_stays_while_missing() {
        let s = AlertState::Recovering.recovery_transition(false, true);
        assert_eq!(s, AlertState::Recovering);
    }

    #[test]
    fn pending_ignores_recovery() {
        let s = AlertState::Pending.recovery_transition(true, false);
        assert_eq!(s, AlertState::Pending);
    }
}
