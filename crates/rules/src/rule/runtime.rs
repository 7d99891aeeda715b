use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::definition::{generator_url, PostableRule, RuleType};
use crate::alert::{to_delta, Alert, AlertState, Health, RESOLVED_RETENTION};
use crate::error::RuleError;
use crate::labels::{self, Labels};
use crate::notify::Notifier;
use crate::querier::{CompositeQuery, Querier, QueryRangeRequest, QueryType};
use crate::series::{Sample, Series};
use crate::template::{TemplateData, TemplateExpander};
use crate::threshold::Thresholds;

const METRIC_NAME_LABEL: &str = "__name__";
const TEMPORALITY_LABEL: &str = "__temporality__";
const MAX_POINTS_PER_SERIES: i64 = 300;

/// How a rule obtains its series. Both kinds share the same state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    Threshold,
    PromQl,
}

impl From<RuleType> for RuleKind {
    fn from(t: RuleType) -> Self {
        match t {
            RuleType::Threshold => Self::Threshold,
            RuleType::PromQl => Self::PromQl,
        }
    }
}

/// Collaborators and engine-wide settings shared by every rule.
#[derive(Clone)]
pub struct RuleContext {
    pub org_id: String,
    pub eval_delay: Duration,
    pub default_source: String,
    pub querier: Arc<dyn Querier>,
    pub expander: Arc<dyn TemplateExpander>,
}

#[derive(Default)]
struct RuleState {
    active: HashMap<u64, Alert>,
    health: Health,
    last_error: Option<String>,
    evaluation_duration: Duration,
    evaluation_timestamp: Option<DateTime<Utc>>,
    last_timestamp_with_datapoints: Option<DateTime<Utc>>,
}

pub struct Rule {
    id: String,
    name: String,
    kind: RuleKind,
    definition: PostableRule,
    thresholds: Thresholds,
    selected_query: String,
    labels: Labels,
    annotations: Labels,
    generator_url: String,
    ctx: RuleContext,
    state: Mutex<RuleState>,
}

impl Rule {
    pub fn new(id: impl Into<String>, definition: PostableRule, ctx: RuleContext) -> Result<Self, RuleError> {
        let id = id.into();
        let condition = definition
            .condition
            .as_ref()
            .ok_or_else(|| RuleError::Validation("rule condition is required".into()))?;
        if condition.composite_query.is_none() {
            return Err(RuleError::Validation("composite query is required".into()));
        }

        let thresholds = definition.thresholds();
        if thresholds.is_empty() {
            return Err(RuleError::Validation("rule has no thresholds".into()));
        }

        let source = if definition.source.is_empty() {
            ctx.default_source.as_str()
        } else {
            definition.source.as_str()
        };

        Ok(Self {
            name: definition.alert.clone(),
            kind: definition.rule_type.into(),
            selected_query: definition.selected_query_name(),
            labels: definition.labels.clone().into(),
            annotations: definition.annotations.clone().into(),
            generator_url: generator_url(&id, source),
            thresholds,
            id,
            definition,
            ctx,
            state: Mutex::new(RuleState::default()),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> RuleKind {
        self.kind
    }

    pub fn definition(&self) -> &PostableRule {
        &self.definition
    }

    pub fn labels(&self) -> &Labels {
        &self.labels
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    pub fn generator_url(&self) -> &str {
        &self.generator_url
    }

    pub fn hold_duration(&self) -> Duration {
        self.definition.hold_duration
    }

    pub fn eval_window(&self) -> Duration {
        self.definition.eval_window
    }

    pub fn frequency(&self) -> Duration {
        self.definition.frequency
    }

    pub fn health(&self) -> Health {
        self.state.lock().health
    }

    pub fn last_error(&self) -> Option<String> {
        self.state.lock().last_error.clone()
    }

    pub fn evaluation_duration(&self) -> Duration {
        self.state.lock().evaluation_duration
    }

    pub fn evaluation_timestamp(&self) -> Option<DateTime<Utc>> {
        self.state.lock().evaluation_timestamp
    }

    /// Alerts that have not resolved.
    pub fn active_alerts(&self) -> Vec<Alert> {
        self.state
            .lock()
            .active
            .values()
            .filter(|a| a.resolved_at.is_none())
            .cloned()
            .collect()
    }

    /// Everything in the active map, including resolved alerts awaiting delivery.
    pub fn current_alerts(&self) -> Vec<Alert> {
        self.state.lock().active.values().cloned().collect()
    }

    /// Most severe state across active alerts.
    pub fn state(&self) -> AlertState {
        self.state
            .lock()
            .active
            .values()
            .map(|a| a.state)
            .max()
            .unwrap_or(AlertState::Inactive)
    }

    /// Query window ending at `ts`, shifted back by the eval delay.
    pub fn timestamps(&self, ts: DateTime<Utc>) -> (i64, i64) {
        let delay = to_delta(self.ctx.eval_delay);
        let start = (ts - to_delta(self.definition.eval_window) - delay).timestamp_millis();
        let end = (ts - delay).timestamp_millis();
        match self.kind {
            RuleKind::Threshold => (start - start.rem_euclid(60_000), end - end.rem_euclid(60_000)),
            RuleKind::PromQl => (start, end),
        }
    }

    pub fn query_request(&self, ts: DateTime<Utc>) -> QueryRangeRequest {
        let (start_ms, end_ms) = self.timestamps(ts);
        let step_secs = step_for(end_ms - start_ms);
        let full = self
            .definition
            .condition
            .as_ref()
            .and_then(|c| c.composite_query.clone())
            .unwrap_or_default();

        let composite_query = match self.kind {
            RuleKind::Threshold => full,
            RuleKind::PromQl => CompositeQuery {
                query_type: QueryType::Promql,
                queries: full
                    .queries
                    .get(&self.selected_query)
                    .map(|q| [(self.selected_query.clone(), q.clone())].into_iter().collect())
                    .unwrap_or_default(),
                ..full
            },
        };

        QueryRangeRequest {
            start_ms,
            end_ms,
            step_secs,
            composite_query,
        }
    }

    /// Expression text of the selected query, passed along with notifications.
    pub fn expr(&self) -> String {
        self.definition
            .condition
            .as_ref()
            .and_then(|c| c.composite_query.as_ref())
            .and_then(|q| q.queries.get(&self.selected_query))
            .map(|q| q.query.clone())
            .unwrap_or_default()
    }

    /// Runs one evaluation cycle at `ts` and returns the number of alerts held afterwards.
    /// On error the active alerts are left exactly as they were.
    pub async fn eval(&self, ts: DateTime<Utc>) -> Result<usize, RuleError> {
        let started = Instant::now();
        let result = self.eval_cycle(ts).await;

        let mut state = self.state.lock();
        state.evaluation_duration = started.elapsed();
        state.evaluation_timestamp = Some(ts);
        match &result {
            Ok(_) => {
                state.health = Health::Ok;
                state.last_error = None;
            }
            Err(e) => {
                state.health = Health::Err;
                state.last_error = Some(e.to_string());
            }
        }
        result
    }

    async fn eval_cycle(&self, ts: DateTime<Utc>) -> Result<usize, RuleError> {
        let request = self.query_request(ts);
        let results = self.ctx.querier.query_range(&self.ctx.org_id, &request).await?;

        let series: Vec<Series> = results
            .iter()
            .find(|r| r.query_name == self.selected_query)
            .or_else(|| match self.kind {
                RuleKind::PromQl => results.first(),
                RuleKind::Threshold => None,
            })
            .map(|r| r.series.clone())
            .unwrap_or_default();

        let mut state = self.state.lock();
        let samples = self.collect_samples(&series, ts, state.last_timestamp_with_datapoints);
        let alerts = self.build_alerts(samples, ts, &state.active)?;
        if !series.is_empty() {
            state.last_timestamp_with_datapoints = Some(ts);
        }

        tracing::debug!(rule_id = %self.id, alerts = alerts.len(), "alerts found");
        merge(&mut state.active, alerts, ts, self.definition.hold_duration);
        Ok(state.active.len())
    }

    /// `last_seen` is the last evaluation that returned any series.
    fn collect_samples(&self, series: &[Series], ts: DateTime<Utc>, last_seen: Option<DateTime<Utc>>) -> Vec<Sample> {
        let Some(condition) = self.definition.condition.as_ref() else {
            return Vec::new();
        };

        let mut samples = Vec::new();
        if series.is_empty() && condition.alert_on_absent {
            let absent_for = TimeDelta::minutes(condition.absent_for as i64);
            let absent = last_seen.map_or(true, |last| ts > last + absent_for);
            if absent {
                let mut labels = Labels::new();
                if let Some(last) = last_seen {
                    labels.set(labels::LAST_SEEN, last.to_rfc3339());
                }
                samples.push(Sample::missing(labels));
            }
            return samples;
        }

        let unit = self.definition.unit();
        for s in series {
            if condition.require_min_points && s.points.len() < condition.required_num_points {
                tracing::debug!(
                    rule_id = %self.id,
                    points = s.points.len(),
                    required = condition.required_num_points,
                    "series skipped, not enough points"
                );
                continue;
            }
            samples.extend(self.thresholds.eval(s, unit));
        }
        samples
    }

    fn build_alerts(
        &self,
        samples: Vec<Sample>,
        ts: DateTime<Utc>,
        active: &HashMap<u64, Alert>,
    ) -> Result<HashMap<u64, Alert>, RuleError> {
        let mut alerts = HashMap::with_capacity(samples.len());

        for sample in samples {
            let mut result_labels = sample.labels.clone();
            result_labels.remove(METRIC_NAME_LABEL);
            result_labels.remove(TEMPORALITY_LABEL);

            let data = TemplateData {
                labels: result_labels.clone(),
                value: format_value(sample.value),
                threshold: format_value(sample.target),
            };
            let expand = |text: &str| match self.ctx.expander.expand(text, &data) {
                Ok(out) => out,
                Err(e) => {
                    tracing::warn!(rule_id = %self.id, error = %e, "expanding alert template failed");
                    format!("<error expanding template: {e}>")
                }
            };

            let mut alert_labels = result_labels.clone();
            for (name, value) in self.labels.iter() {
                alert_labels.set(name.clone(), expand(value.as_str()));
            }
            alert_labels.set(labels::ALERT_NAME, self.name.clone());
            alert_labels.set(labels::RULE_ID, self.id.clone());
            alert_labels.set(labels::RULE_SOURCE, self.generator_url.clone());
            if sample.is_missing {
                alert_labels.set(labels::ALERT_NAME, format!("[No data] {}", self.name));
                alert_labels.set(labels::NO_DATA, "true");
            }

            let annotations: Labels = self
                .annotations
                .iter()
                .map(|(name, value)| (name.clone(), expand(value.as_str())))
                .collect();

            let fp = alert_labels.fingerprint();
            if sample.is_recovering {
                let keep = active
                    .get(&fp)
                    .is_some_and(|a| matches!(a.state, AlertState::Firing | AlertState::Recovering));
                if !keep {
                    continue;
                }
            }
            if alerts.contains_key(&fp) {
                return Err(RuleError::DuplicateLabels(alert_labels.to_string()));
            }

            let receivers = if sample.receivers.is_empty() {
                self.definition.preferred_channels.clone()
            } else {
                sample.receivers
            };

            alerts.insert(
                fp,
                Alert {
                    state: AlertState::Pending,
                    labels: alert_labels,
                    annotations,
                    query_result_labels: result_labels,
                    generator_url: self.generator_url.clone(),
                    receivers,
                    value: sample.value,
                    active_at: ts,
                    fired_at: None,
                    resolved_at: None,
                    last_sent_at: None,
                    valid_until: None,
                    missing: sample.is_missing,
                    is_recovering: sample.is_recovering,
                },
            );
        }
        Ok(alerts)
    }

    /// Marks alerts due for (re)delivery as sent and hands copies of them to `notifier`.
    pub async fn send_alerts(
        &self,
        ts: DateTime<Utc>,
        resend_delay: Duration,
        interval: Duration,
        notifier: &dyn Notifier,
    ) {
        let valid_for = to_delta(resend_delay.max(interval) * 4);
        let batch: Vec<Alert> = {
            let mut state = self.state.lock();
            state
                .active
                .values_mut()
                .filter(|a| a.needs_sending(ts, resend_delay))
                .map(|a| {
                    a.last_sent_at = Some(ts);
                    a.valid_until = Some(ts + valid_for);
                    a.clone()
                })
                .collect()
        };
        if batch.is_empty() {
            return;
        }

        let count = batch.len();
        if let Err(e) = notifier.notify(&self.ctx.org_id, &self.expr(), batch).await {
            tracing::warn!(rule_id = %self.id, notifier = notifier.name(), error = %e, "notification failed");
        } else {
            tracing::debug!(rule_id = %self.id, count, "alerts sent");
        }
    }

    /// Carries alert state over from the rule this one replaces.
    pub fn copy_state(&self, from: &Rule) {
        let (active, health, last_error, duration, timestamp, last_data) = {
            let old = from.state.lock();
            (
                old.active.clone(),
                old.health,
                old.last_error.clone(),
                old.evaluation_duration,
                old.evaluation_timestamp,
                old.last_timestamp_with_datapoints,
            )
        };
        let mut state = self.state.lock();
        for (fp, alert) in active {
            state.active.entry(fp).or_insert(alert);
        }
        state.health = health;
        state.last_error = last_error;
        state.evaluation_duration = duration;
        state.evaluation_timestamp = timestamp;
        state.last_timestamp_with_datapoints = last_data;
    }
}

/// Folds this cycle's alerts into the active map and applies state transitions.
fn merge(active: &mut HashMap<u64, Alert>, alerts: HashMap<u64, Alert>, ts: DateTime<Utc>, hold: Duration) {
    let present: Vec<u64> = alerts.keys().copied().collect();

    for (fp, alert) in alerts {
        match active.get_mut(&fp) {
            Some(existing) if existing.state != AlertState::Inactive => {
                existing.value = alert.value;
                existing.annotations = alert.annotations;
                existing.is_recovering = alert.is_recovering;
                existing.missing = alert.missing;
                existing.receivers = alert.receivers;
            }
            _ => {
                active.insert(fp, alert);
            }
        }
    }

    let retention = to_delta(RESOLVED_RETENTION);
    let hold = to_delta(hold);
    active.retain(|fp, alert| {
        if !present.contains(fp) {
            let expired = alert.resolved_at.is_some_and(|r| ts - r > retention);
            if alert.state == AlertState::Pending || expired {
                return false;
            }
            if alert.state != AlertState::Inactive {
                alert.state = AlertState::Inactive;
                alert.resolved_at = Some(ts);
            }
            return true;
        }

        if alert.state == AlertState::Pending && ts - alert.active_at >= hold {
            alert.state = AlertState::Firing;
            alert.fired_at = Some(ts);
        }
        alert.state = alert.state.recovery_transition(alert.is_recovering, alert.missing);
        true
    });
}

/// Query step in seconds: a whole number of minutes, at least one, keeping a window
/// under `MAX_POINTS_PER_SERIES` points.
fn step_for(window_ms: i64) -> i64 {
    let step = (window_ms / 1000 / MAX_POINTS_PER_SERIES).max(60);
    step - step % 60
}

fn format_value(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        format!("{v}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::querier::{QueryError, QueryResult};
    use crate::rule::parse_postable_rule;
    use crate::series::Point;
    use crate::template::SimpleExpander;
    use chrono::TimeZone;

    struct FixedQuerier(Vec<Series>);

    #[async_trait::async_trait]
    impl Querier for FixedQuerier {
        async fn query_range(&self, _: &str, _: &QueryRangeRequest) -> Result<Vec<QueryResult>, QueryError> {
            Ok(vec![QueryResult {
                query_name: "A".into(),
                series: self.0.clone(),
            }])
        }
    }

    fn series(host: &str, values: &[f64]) -> Series {
        let points = values
            .iter()
            .enumerate()
            .map(|(i, v)| Point {
                timestamp: i as i64 * 60_000,
                value: *v,
            })
            .collect();
        Series::new([("host", host)].into_iter().collect(), points)
    }

    fn rule(json: &str, data: Vec<Series>) -> Rule {
        let def = parse_postable_rule(json).unwrap();
        Rule::new(
            "r1",
            def,
            RuleContext {
                org_id: "default".into(),
                eval_delay: Duration::ZERO,
                default_source: String::new(),
                querier: Arc::new(FixedQuerier(data)),
                expander: Arc::new(SimpleExpander),
            },
        )
        .unwrap()
    }

    const CPU_RULE: &str = r#"{
        "alert": "High CPU",
        "condition": {
            "compositeQuery": {"queries": {"A": {"query": "cpu"}}},
            "op": "1", "target": 80, "matchType": "5"
        },
        "labels": {"severity": "critical"},
        "annotations": {"summary": "{{$labels.host}} at {{$value}}"}
    }"#;

    fn ts(min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, min, 0).unwrap()
    }

    #[test]
    fn window_rounds_to_minute() {
        let r = rule(CPU_RULE, vec![]);
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 10, 42).unwrap();
        let (start, end) = r.timestamps(at);
        assert_eq!(end, ts(10).timestamp_millis());
        assert_eq!(start, ts(5).timestamp_millis());
    }

    #[test]
    fn step_is_whole_minutes() {
        assert_eq!(step_for(5 * 60 * 1000), 60);
        assert_eq!(step_for(24 * 3600 * 1000), 240);
        assert_eq!(step_for(30 * 3600 * 1000), 360);
    }

    #[tokio::test]
    async fn alert_fires_at_once_without_hold() {
        let r = rule(CPU_RULE, vec![series("web-1", &[90.0])]);
        assert_eq!(r.eval(ts(0)).await.unwrap(), 1);

        let alerts = r.active_alerts();
        assert_eq!(alerts.len(), 1);
        let a = &alerts[0];
        assert_eq!(a.state, AlertState::Firing);
        assert_eq!(a.labels.get("alertname"), Some("High CPU"));
        assert_eq!(a.labels.get("ruleId"), Some("r1"));
        assert_eq!(a.labels.get("threshold"), Some("critical"));
        assert_eq!(a.annotations.get("summary"), Some("web-1 at 90"));
        assert_eq!(r.health(), Health::Ok);
    }

    #[tokio::test]
    async fn hold_duration_delays_firing() {
        let json = CPU_RULE.replace(r#""alert": "High CPU","#, r#""alert": "High CPU", "holdDuration": "2m","#);
        let r = rule(&json, vec![series("web-1", &[90.0])]);

        r.eval(ts(0)).await.unwrap();
        assert_eq!(r.state(), AlertState::Pending);
        r.eval(ts(1)).await.unwrap();
        assert_eq!(r.state(), AlertState::Pending);
        r.eval(ts(2)).await.unwrap();
        assert_eq!(r.state(), AlertState::Firing);
        assert_eq!(r.active_alerts()[0].fired_at, Some(ts(2)));
    }

    #[tokio::test]
    async fn eval_is_idempotent() {
        let json = CPU_RULE.replace(r#""alert": "High CPU","#, r#""alert": "High CPU", "holdDuration": "5m","#);
        let r = rule(&json, vec![series("a", &[90.0]), series("b", &[95.0])]);
        r.eval(ts(0)).await.unwrap();
        let before = {
            let mut v = r.current_alerts();
            v.sort_by(|a, b| a.labels.to_string().cmp(&b.labels.to_string()));
            v
        };
        r.eval(ts(0)).await.unwrap();
        let mut after = r.current_alerts();
        after.sort_by(|a, b| a.labels.to_string().cmp(&b.labels.to_string()));
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn template_failure_is_inlined() {
        struct Failing;
        impl TemplateExpander for Failing {
            fn expand(&self, _: &str, _: &TemplateData) -> Result<String, crate::template::TemplateError> {
                Err(crate::template::TemplateError("boom".into()))
            }
        }

        let def = parse_postable_rule(CPU_RULE).unwrap();
        let r = Rule::new(
            "r1",
            def,
            RuleContext {
                org_id: "default".into(),
                eval_delay: Duration::ZERO,
                default_source: String::new(),
                querier: Arc::new(FixedQuerier(vec![series("a", &[90.0])])),
                expander: Arc::new(Failing),
            },
        )
        .unwrap();
        r.eval(ts(0)).await.unwrap();
        let summary = r.active_alerts()[0].annotations.get("summary").unwrap().to_string();
        assert!(summary.starts_with("<error expanding template:"));
    }

    /// Serves whatever was last set; `Err` makes the query fail.
    struct SwitchQuerier(Mutex<Result<Vec<Series>, String>>);

    impl SwitchQuerier {
        fn set(&self, next: Result<Vec<Series>, String>) {
            *self.0.lock() = next;
        }
    }

    #[async_trait::async_trait]
    impl Querier for SwitchQuerier {
        async fn query_range(&self, _: &str, _: &QueryRangeRequest) -> Result<Vec<QueryResult>, QueryError> {
            let series = self.0.lock().clone().map_err(QueryError)?;
            Ok(vec![QueryResult {
                query_name: "A".into(),
                series,
            }])
        }
    }

    fn switched_rule(json: &str, data: Vec<Series>) -> (Rule, Arc<SwitchQuerier>) {
        let querier = Arc::new(SwitchQuerier(Mutex::new(Ok(data))));
        let r = Rule::new(
            "r1",
            parse_postable_rule(json).unwrap(),
            RuleContext {
                org_id: "default".into(),
                eval_delay: Duration::ZERO,
                default_source: String::new(),
                querier: querier.clone(),
                expander: Arc::new(SimpleExpander),
            },
        )
        .unwrap();
        (r, querier)
    }

    fn named(name: &str, host: &str, value: f64) -> Series {
        Series::new(
            [("__name__", name), ("host", host)].into_iter().collect(),
            vec![Point { timestamp: 0, value }],
        )
    }

    const ABSENT_RULE: &str = r#"{
        "alert": "High CPU",
        "condition": {
            "compositeQuery": {"queries": {"A": {"query": "cpu"}}},
            "op": "1", "target": 80, "matchType": "5",
            "alertOnAbsent": true, "absentFor": 5
        }
    }"#;

    #[tokio::test]
    async fn query_failure_keeps_previous_alerts() {
        let (r, querier) = switched_rule(CPU_RULE, vec![series("web-1", &[90.0])]);
        r.eval(ts(0)).await.unwrap();
        let before = r.current_alerts();
        assert_eq!(before.len(), 1);

        querier.set(Err("backend unavailable".into()));
        let err = r.eval(ts(1)).await.unwrap_err();
        assert!(matches!(err, RuleError::Query(_)));
        assert_eq!(r.health(), Health::Err);
        assert!(r.last_error().unwrap().contains("backend unavailable"));
        assert_eq!(r.current_alerts(), before);
        assert_eq!(r.evaluation_timestamp(), Some(ts(1)));

        querier.set(Ok(vec![series("web-1", &[90.0])]));
        r.eval(ts(2)).await.unwrap();
        assert_eq!(r.health(), Health::Ok);
        assert!(r.last_error().is_none());
    }

    #[tokio::test]
    async fn duplicate_labelsets_abort_cycle() {
        let (r, _) = switched_rule(CPU_RULE, vec![named("cpu_user", "a", 90.0), named("cpu_system", "a", 95.0)]);
        let err = r.eval(ts(0)).await.unwrap_err();
        assert!(matches!(err, RuleError::DuplicateLabels(_)));
        assert!(err.to_string().contains("same labelset"));
        assert_eq!(r.health(), Health::Err);
        assert!(r.current_alerts().is_empty());
    }

    #[tokio::test]
    async fn aborted_cycle_does_not_count_as_data() {
        let (r, querier) = switched_rule(ABSENT_RULE, vec![named("cpu_user", "a", 90.0), named("cpu_system", "a", 95.0)]);
        assert!(r.eval(ts(0)).await.is_err());

        querier.set(Ok(Vec::new()));
        r.eval(ts(1)).await.unwrap();
        let alerts = r.active_alerts();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].labels.get(labels::NO_DATA), Some("true"));
        assert_eq!(alerts[0].labels.get(labels::LAST_SEEN), None);
    }

    #[tokio::test]
    async fn no_data_alert_after_absent_for() {
        let (r, querier) = switched_rule(ABSENT_RULE, vec![series("web-1", &[10.0])]);
        r.eval(ts(0)).await.unwrap();
        assert!(r.active_alerts().is_empty());

        querier.set(Ok(Vec::new()));
        r.eval(ts(3)).await.unwrap();
        assert!(r.active_alerts().is_empty());

        r.eval(ts(6)).await.unwrap();
        let alerts = r.active_alerts();
        assert_eq!(alerts.len(), 1);
        let a = &alerts[0];
        assert!(a.missing);
        assert_eq!(a.state, AlertState::Firing);
        assert_eq!(a.labels.get(labels::ALERT_NAME), Some("[No data] High CPU"));
        assert_eq!(a.labels.get(labels::NO_DATA), Some("true"));
        let last_seen = ts(0).to_rfc3339();
        assert_eq!(a.labels.get(labels::LAST_SEEN), Some(last_seen.as_str()));
    }

    #[tokio::test]
    async fn absent_data_ignored_unless_enabled() {
        let (r, _) = switched_rule(CPU_RULE, Vec::new());
        assert_eq!(r.eval(ts(0)).await.unwrap(), 0);
        assert!(r.current_alerts().is_empty());
    }

    #[tokio::test]
    async fn short_series_skipped_when_min_points_required() {
        let json = CPU_RULE.replace(
            r#""matchType": "5""#,
            r#""matchType": "5", "requireMinPoints": true, "requiredNumPoints": 3"#,
        );
        let r = rule(&json, vec![series("short", &[90.0, 95.0]), series("long", &[90.0, 91.0, 92.0])]);
        r.eval(ts(0)).await.unwrap();

        let alerts = r.active_alerts();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].labels.get("host"), Some("long"));
    }

    #[test]
    fn merge_resolves_and_retains_firing() {
        let mut active = HashMap::new();
        let mut firing = alert_at(ts(0));
        firing.state = AlertState::Firing;
        active.insert(1, firing);
        active.insert(2, alert_at(ts(0)));

        merge(&mut active, HashMap::new(), ts(5), Duration::ZERO);
        assert_eq!(active.len(), 1);
        assert_eq!(active[&1].state, AlertState::Inactive);
        assert_eq!(active[&1].resolved_at, Some(ts(5)));

        merge(&mut active, HashMap::new(), ts(20), Duration::ZERO);
        assert_eq!(active.len(), 1);
        merge(&mut active, HashMap::new(), ts(21), Duration::ZERO);
        assert!(active.is_empty());
    }

    #[test]
    fn merge_recovery_transitions() {
        let mut active = HashMap::new();
        let mut firing = alert_at(ts(0));
        firing.state = AlertState::Firing;
        active.insert(1, firing);

        let mut recovering = alert_at(ts(1));
        recovering.is_recovering = true;
        merge(&mut active, [(1, recovering)].into_iter().collect(), ts(1), Duration::ZERO);
        assert_eq!(active[&1].state, AlertState::Recovering);

        merge(&mut active, [(1, alert_at(ts(2)))].into_iter().collect(), ts(2), Duration::ZERO);
        assert_eq!(active[&1].state, AlertState::Firing);
        assert_eq!(active[&1].active_at, ts(0));
    }

    fn alert_at(at: DateTime<Utc>) -> Alert {
        Alert {
            state: AlertState::Pending,
            labels: Labels::new(),
            annotations: Labels::new(),
            query_result_labels: Labels::new(),
            generator_url: String::new(),
            receivers: Vec::new(),
            value: 1.0,
            active_at: at,
            fired_at: None,
            resolved_at: None,
            last_sent_at: None,
            valid_until: None,
            missing: false,
            is_recovering: false,
        }
    }

    #[test]
    fn format_values() {
        assert_eq!(format_value(90.0), "90");
        assert_eq!(format_value(92.5), "92.5");
    }
}
