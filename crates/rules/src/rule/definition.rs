use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;

use crate::error::RuleError;
use crate::labels::{self, is_valid_label_name};
use crate::querier::{CompositeQuery, QueryType};
use crate::template::{SimpleExpander, TemplateExpander};
use crate::threshold::{BasicThreshold, CompareOp, MatchType, Thresholds};

pub const DEFAULT_SCHEMA_VERSION: &str = "v1";
pub const CRITICAL_THRESHOLD_NAME: &str = "critical";

const DEFAULT_EVAL_WINDOW: Duration = Duration::from_secs(5 * 60);
const DEFAULT_FREQUENCY: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RuleType {
    #[default]
    #[serde(rename = "threshold_rule")]
    Threshold,
    #[serde(rename = "promql_rule")]
    PromQl,
}

impl std::fmt::Display for RuleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Threshold => f.write_str("threshold_rule"),
            Self::PromQl => f.write_str("promql_rule"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleCondition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub composite_query: Option<CompositeQuery>,
    #[serde(
        default,
        rename = "op",
        deserialize_with = "blank_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub compare_op: Option<CompareOp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<f64>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub alert_on_absent: bool,
    /// Minutes without data before a no-data alert is raised.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub absent_for: u64,
    #[serde(
        default,
        deserialize_with = "blank_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub match_type: Option<MatchType>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub target_unit: String,
    #[serde(default, rename = "selectedQueryName", skip_serializing_if = "String::is_empty")]
    pub selected_query: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub require_min_points: bool,
    #[serde(default, skip_serializing_if = "is_zero_usize")]
    pub required_num_points: usize,
    #[serde(default, skip_serializing_if = "Thresholds::is_empty")]
    pub thresholds: Thresholds,
}

impl RuleCondition {
    pub fn query_type(&self) -> Option<QueryType> {
        self.composite_query.as_ref().map(|q| q.query_type)
    }

    /// The query whose result the thresholds are applied to.
    pub fn selected_query_name(&self) -> String {
        if !self.selected_query.is_empty() {
            return self.selected_query.clone();
        }
        let Some(query) = &self.composite_query else {
            return String::new();
        };
        if query.queries.contains_key("F1") {
            return "F1".to_string();
        }
        query.queries.keys().max().cloned().unwrap_or_default()
    }
}

/// Stored rule document, exchanged as JSON.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostableRule {
    #[serde(default)]
    pub alert: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub alert_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default)]
    pub rule_type: RuleType,
    #[serde(default, with = "crate::duration::serde_go")]
    pub eval_window: Duration,
    #[serde(default, with = "crate::duration::serde_go")]
    pub frequency: Duration,
    #[serde(default, with = "crate::duration::serde_go")]
    pub hold_duration: Duration,
    /// Five-field cron expression. Overrides `frequency` when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<RuleCondition>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub source: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub preferred_channels: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
    #[serde(default)]
    pub schema_version: String,
}

impl PostableRule {
    /// Fills blank fields. A PromQL composite query always makes a PromQL rule.
    pub fn apply_defaults(&mut self) {
        if self.schema_version.is_empty() {
            self.schema_version = DEFAULT_SCHEMA_VERSION.to_string();
        }
        if self.eval_window.is_zero() {
            self.eval_window = DEFAULT_EVAL_WINDOW;
        }
        if self.frequency.is_zero() {
            self.frequency = DEFAULT_FREQUENCY;
        }
        if self.condition.as_ref().and_then(RuleCondition::query_type) == Some(QueryType::Promql) {
            self.rule_type = RuleType::PromQl;
        }
    }

    pub fn validate(&self) -> Result<(), RuleError> {
        self.validate_with(&SimpleExpander)
    }

    pub fn validate_with(&self, expander: &dyn TemplateExpander) -> Result<(), RuleError> {
        let condition = self
            .condition
            .as_ref()
            .ok_or_else(|| RuleError::Validation("rule condition is required".into()))?;

        let mut errs = Vec::new();
        match &condition.composite_query {
            None => errs.push("composite query is required".to_string()),
            Some(q) if q.queries.is_empty() => {
                errs.push("composite query has no queries".to_string())
            }
            Some(q) if q.enabled().next().is_none() => {
                errs.push("all queries are disabled in rule condition".to_string())
            }
            Some(_) => {}
        }

        if self.rule_type == RuleType::Threshold && condition.thresholds.is_empty() {
            if condition.compare_op.is_none() {
                errs.push("compare op is required for threshold rules".to_string());
            }
            if condition.match_type.is_none() {
                errs.push("match type is required for threshold rules".to_string());
            }
        }

        if let Some(schedule) = &self.schedule {
            if let Err(e) = crate::task::parse_cron(schedule) {
                errs.push(format!("invalid schedule {schedule:?}: {e}"));
            }
        }
        if let Some(tz) = &self.timezone {
            if tz.parse::<chrono_tz::Tz>().is_err() {
                errs.push(format!("invalid timezone: {tz}"));
            }
        }

        for (name, value) in &self.labels {
            if !is_valid_label_name(name) {
                errs.push(format!("invalid label name: {name}"));
            }
            if let Err(e) = expander.check(value) {
                errs.push(format!("template parsing error: {e}"));
            }
        }
        for (name, value) in &self.annotations {
            if !is_valid_label_name(name) {
                errs.push(format!("invalid annotation name: {name}"));
            }
            if let Err(e) = expander.check(value) {
                errs.push(format!("template parsing error: {e}"));
            }
        }

        if errs.is_empty() && self.thresholds().is_empty() {
            errs.push("rule has no thresholds".to_string());
        }

        if errs.is_empty() {
            Ok(())
        } else {
            Err(RuleError::Validation(errs.join("; ")))
        }
    }

    /// Thresholds in effect. A v1 document without explicit thresholds gets one built from
    /// the condition's `target`, `op` and `matchType`, named after the `severity` label.
    pub fn thresholds(&self) -> Thresholds {
        let Some(condition) = &self.condition else {
            return Thresholds::default();
        };
        if !condition.thresholds.is_empty() || self.schema_version != DEFAULT_SCHEMA_VERSION {
            return condition.thresholds.clone();
        }
        let (Some(op), Some(match_type)) = (condition.compare_op, condition.match_type) else {
            return Thresholds::default();
        };

        let name = self
            .labels
            .get(labels::SEVERITY)
            .cloned()
            .unwrap_or_else(|| CRITICAL_THRESHOLD_NAME.to_string());
        let mut threshold = BasicThreshold::new(name, condition.target.unwrap_or_default(), op, match_type);
        threshold.target_unit = condition.target_unit.clone();
        threshold.channels = self.preferred_channels.clone();
        Thresholds::new(vec![threshold])
    }

    pub fn selected_query_name(&self) -> String {
        self.condition
            .as_ref()
            .map(RuleCondition::selected_query_name)
            .unwrap_or_default()
    }

    /// Unit of the series returned by the rule's query.
    pub fn unit(&self) -> &str {
        self.condition
            .as_ref()
            .and_then(|c| c.composite_query.as_ref())
            .map(|q| q.unit.as_str())
            .unwrap_or_default()
    }

    /// Merges the top-level keys of `partial` over this document and re-validates.
    pub fn patch(&self, partial: &str) -> Result<PostableRule, RuleError> {
        let patch: serde_json::Value = serde_json::from_str(partial)?;
        let serde_json::Value::Object(fields) = patch else {
            return Err(RuleError::Validation("patch must be a JSON object".into()));
        };

        let mut doc = serde_json::to_value(self)?;
        if let serde_json::Value::Object(map) = &mut doc {
            for (key, value) in fields {
                map.insert(key, value);
            }
        }

        let mut rule: PostableRule = serde_json::from_value(doc)?;
        rule.apply_defaults();
        rule.validate()?;
        Ok(rule)
    }
}

/// Decodes a stored rule document, applies defaults and validates it.
pub fn parse_postable_rule(json: &str) -> Result<PostableRule, RuleError> {
    parse_postable_rule_with(json, &SimpleExpander)
}

pub fn parse_postable_rule_with(
    json: &str,
    expander: &dyn TemplateExpander,
) -> Result<PostableRule, RuleError> {
    let mut rule: PostableRule = serde_json::from_str(json)?;
    rule.apply_defaults();
    rule.validate_with(expander)?;
    Ok(rule)
}

/// Link back to the rule editor in the UI the rule was created from.
pub fn generator_url(rule_id: &str, source: &str) -> String {
    if source.contains("new") {
        return format!("{}edit?ruleId={rule_id}", source.replacen("new", "", 1));
    }
    let Ok(parsed) = url::Url::parse(source) else {
        return String::new();
    };
    let Some(host) = parsed.host_str() else {
        return String::new();
    };
    match parsed.port() {
        Some(port) => format!("{}://{host}:{port}/alerts/edit?ruleId={rule_id}", parsed.scheme()),
        None => format!("{}://{host}/alerts/edit?ruleId={rule_id}", parsed.scheme()),
    }
}

fn blank_as_none<'de, D, T>(d: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr<Err = String>,
{
    match Option::<String>::deserialize(d)? {
        None => Ok(None),
        Some(s) if s.is_empty() || s == "0" => Ok(None),
        Some(s) => s.parse().map(Some).map_err(serde::de::Error::custom),
    }
}

fn is_zero(n: &u64) -> bool {
    *n == 0
}

fn is_zero_usize(n: &usize) -> bool {
    *n == 0
}
