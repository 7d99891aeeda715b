use serde::{Deserialize, Serialize};

use super::compare::{CompareOp, MatchType};
use crate::labels::{self, Labels};
use crate::series::{Point, Sample, Series};
use crate::units;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BasicThreshold {
    pub name: String,
    pub target: f64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub target_unit: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub rule_unit: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recovery_target: Option<f64>,
    pub match_type: MatchType,
    #[serde(rename = "op")]
    pub compare_op: CompareOp,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub selected_query: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub channels: Vec<String>,
}

impl BasicThreshold {
    pub fn new(name: impl Into<String>, target: f64, compare_op: CompareOp, match_type: MatchType) -> Self {
        Self {
            name: name.into(),
            target,
            target_unit: String::new(),
            rule_unit: String::new(),
            recovery_target: None,
            match_type,
            compare_op,
            selected_query: String::new(),
            channels: Vec::new(),
        }
    }

    fn effective_unit<'a>(&'a self, rule_unit: &'a str) -> &'a str {
        if self.rule_unit.is_empty() {
            rule_unit
        } else {
            &self.rule_unit
        }
    }

    /// Target expressed in the unit of the queried series.
    pub fn target_in(&self, rule_unit: &str) -> f64 {
        units::convert(self.target, &self.target_unit, self.effective_unit(rule_unit))
    }

    pub fn recovery_target_in(&self, rule_unit: &str) -> Option<f64> {
        self.recovery_target
            .map(|t| units::convert(t, &self.target_unit, self.effective_unit(rule_unit)))
    }

    /// Decides whether `series` breaches this threshold. A series that misses the target but
    /// still satisfies the recovery target yields a sample flagged `is_recovering`.
    pub fn should_alert(&self, series: &Series, rule_unit: &str) -> Option<Sample> {
        let points = series.usable_points();
        if points.is_empty() {
            return None;
        }

        let target = self.target_in(rule_unit);
        if let Some(value) = evaluate(self.match_type, self.compare_op, &points, target) {
            return Some(self.sample(series, value, target, false));
        }

        let recovery = self.recovery_target_in(rule_unit)?;
        evaluate(self.match_type, self.compare_op, &points, recovery)
            .map(|value| self.sample(series, value, target, true))
    }

    fn sample(&self, series: &Series, value: f64, target: f64, is_recovering: bool) -> Sample {
        let mut labels: Labels = series.labels.clone();
        labels.set(labels::THRESHOLD, self.name.clone());
        Sample {
            labels,
            value,
            target,
            target_unit: self.target_unit.clone(),
            receivers: self.channels.clone(),
            is_missing: false,
            is_recovering,
        }
    }
}

/// Applies `match_type` over already-cleaned points and returns the reported value on a match.
pub fn evaluate(match_type: MatchType, op: CompareOp, points: &[Point], target: f64) -> Option<f64> {
    let last = points.last()?;
    match match_type {
        MatchType::AtleastOnce => points
            .iter()
            .find(|p| op.compare(p.value, target))
            .map(|p| p.value),

        MatchType::AllTheTimes => {
            if !points.iter().all(|p| op.compare(p.value, target)) {
                return None;
            }
            let values = points.iter().map(|p| p.value);
            let reported = match op {
                CompareOp::Above | CompareOp::AboveOrEq => values.fold(f64::INFINITY, f64::min),
                CompareOp::Below | CompareOp::BelowOrEq => values.fold(f64::NEG_INFINITY, f64::max),
                CompareOp::Eq => target,
                CompareOp::NotEq | CompareOp::OutsideBounds => last.value,
            };
            Some(reported)
        }

        MatchType::OnAverage => {
            let avg = points.iter().map(|p| p.value).sum::<f64>() / points.len() as f64;
            op.compare(avg, target).then_some(avg)
        }

        MatchType::InTotal => {
            let sum = points.iter().map(|p| p.value).sum::<f64>();
            op.compare(sum, target).then_some(sum)
        }

        MatchType::Last => op.compare(last.value, target).then_some(last.value),
    }
}
