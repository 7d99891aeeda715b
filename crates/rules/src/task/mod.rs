mod schedule;

pub use schedule::{advance, eval_timestamp, parse_cron, CronSchedule};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::alert::to_delta;
use crate::labels::{name_hash, Labels};
use crate::notify::Notifier;
use crate::rule::Rule;
use crate::store::MaintenanceStore;

#[derive(Clone)]
pub struct TaskOptions {
    pub org_id: String,
    pub resend_delay: Duration,
    pub notifier: Arc<dyn Notifier>,
    pub maintenance_store: Arc<dyn MaintenanceStore>,
}

#[derive(Debug, Clone, Copy, Default)]
struct TaskStats {
    last_duration: Duration,
    last_evaluation: Option<DateTime<Utc>>,
}

/// Evaluates a group of rules sequentially on a fixed cadence or a cron schedule.
pub struct RuleTask {
    name: String,
    file: String,
    frequency: Duration,
    cron: Option<CronSchedule>,
    rules: Vec<Arc<Rule>>,
    opts: TaskOptions,
    paused: AtomicBool,
    stats: Mutex<TaskStats>,
    done: watch::Sender<bool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl RuleTask {
    pub fn new(name: impl Into<String>, frequency: Duration, rules: Vec<Arc<Rule>>, opts: TaskOptions) -> Self {
        let (done, _) = watch::channel(false);
        Self {
            name: name.into(),
            file: String::new(),
            frequency,
            cron: None,
            rules,
            opts,
            paused: AtomicBool::new(false),
            stats: Mutex::new(TaskStats::default()),
            done,
            handle: Mutex::new(None),
        }
    }

    pub fn with_cron(mut self, cron: CronSchedule) -> Self {
        self.cron = Some(cron);
        self
    }

    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        self.file = file.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn file(&self) -> &str {
        &self.file
    }

    pub fn key(&self) -> String {
        format!("{};{}", self.name, self.file)
    }

    pub fn frequency(&self) -> Duration {
        self.frequency
    }

    pub fn is_cron(&self) -> bool {
        self.cron.is_some()
    }

    pub fn rules(&self) -> &[Arc<Rule>] {
        &self.rules
    }

    pub fn pause(&self, paused: bool) {
        self.paused.store(paused, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn last_duration(&self) -> Duration {
        self.stats.lock().last_duration
    }

    pub fn last_evaluation(&self) -> Option<DateTime<Utc>> {
        self.stats.lock().last_evaluation
    }

    /// Slot of the most recent evaluation instant at or before `start`.
    pub fn eval_timestamp(&self, start: DateTime<Utc>) -> DateTime<Utc> {
        eval_timestamp(name_hash(&self.name), self.frequency, start)
    }

    /// Spawns the evaluation loop. The first tick waits until `gate` opens.
    pub fn run(self: &Arc<Self>, gate: watch::Receiver<bool>) {
        let task = Arc::clone(self);
        let handle = tokio::spawn(async move { task.run_loop(gate).await });
        *self.handle.lock() = Some(handle);
    }

    /// Signals the loop and waits for it to exit. An evaluation in progress finishes first.
    pub async fn stop(&self) {
        self.done.send_replace(true);
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::warn!(task = %self.name, error = %e, "task loop ended abnormally");
            }
        }
    }

    async fn run_loop(self: Arc<Self>, mut gate: watch::Receiver<bool>) {
        let mut done = self.done.subscribe();
        let opened = tokio::select! {
            _ = stopped(&mut done) => false,
            opened = async { gate.wait_for(|open| *open).await.is_ok() } => opened,
        };
        if !opened {
            return;
        }

        tracing::info!(task = %self.name, frequency_s = self.frequency.as_secs(), cron = self.is_cron(), "task started");
        match &self.cron {
            Some(cron) => self.run_cron(cron, &mut done).await,
            None => self.run_fixed(&mut done).await,
        }
        tracing::info!(task = %self.name, "task stopped");
    }

    async fn run_fixed(&self, done: &mut watch::Receiver<bool>) {
        let freq = self.frequency;
        let mut ts = self.eval_timestamp(Utc::now()) + to_delta(freq);

        tokio::select! {
            _ = stopped(done) => return,
            _ = tokio::time::sleep(until(ts)) => {}
        }
        self.tick(ts).await;

        let start = tokio::time::Instant::now() + until(ts + to_delta(freq));
        let mut ticker = tokio::time::interval_at(start, freq);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = stopped(done) => return,
                _ = ticker.tick() => {}
            }
            let (next, missed) = advance(ts, Utc::now(), freq);
            if missed > 0 {
                tracing::warn!(task = %self.name, missed, "evaluation ticks missed");
            }
            ts = next;
            self.tick(ts).await;
        }
    }

    async fn run_cron(&self, cron: &CronSchedule, done: &mut watch::Receiver<bool>) {
        let mut last: Option<DateTime<Utc>> = None;
        loop {
            let now = Utc::now();
            let from = last.map_or(now, |l| l.max(now));
            let Some(next) = cron.next_after(from) else {
                tracing::warn!(task = %self.name, "cron schedule has no upcoming ticks");
                stopped(done).await;
                return;
            };

            tokio::select! {
                _ = stopped(done) => return,
                _ = tokio::time::sleep(until(next)) => {}
            }
            self.tick(next).await;
            last = Some(next);
        }
    }

    async fn tick(&self, ts: DateTime<Utc>) {
        if self.is_paused() {
            tracing::debug!(task = %self.name, "task paused, tick skipped");
            return;
        }
        let started = Instant::now();
        self.eval(ts).await;
        let mut stats = self.stats.lock();
        stats.last_duration = started.elapsed();
        stats.last_evaluation = Some(ts);
    }

    /// Evaluates every rule at `ts`, skipping rules covered by an active maintenance window.
    pub async fn eval(&self, ts: DateTime<Utc>) {
        let windows = match self
            .opts
            .maintenance_store
            .get_all_planned_maintenance(&self.opts.org_id)
            .await
        {
            Ok(windows) => windows,
            Err(e) => {
                tracing::warn!(task = %self.name, error = %e, "maintenance lookup failed, evaluating anyway");
                Vec::new()
            }
        };

        for rule in &self.rules {
            if let Some(window) = windows.iter().find(|w| w.should_skip(rule.id(), ts)) {
                tracing::info!(
                    task = %self.name,
                    rule_id = %rule.id(),
                    maintenance = %window.name,
                    "rule skipped, maintenance window active"
                );
                continue;
            }

            match rule.eval(ts).await {
                Ok(count) => {
                    tracing::debug!(rule_id = %rule.id(), alerts = count, "rule evaluated");
                }
                Err(e) => {
                    tracing::warn!(task = %self.name, rule_id = %rule.id(), error = %e, "rule evaluation failed");
                    continue;
                }
            }

            rule.send_alerts(ts, self.opts.resend_delay, self.frequency, self.opts.notifier.as_ref())
                .await;
        }
    }

    /// Moves alert state from the task this one replaces. Rules are paired by name and
    /// static labels, in order.
    pub fn copy_state(&self, from: &RuleTask) {
        let mut old: HashMap<(&str, &Labels), VecDeque<&Arc<Rule>>> = HashMap::new();
        for rule in &from.rules {
            old.entry((rule.name(), rule.labels()))
                .or_default()
                .push_back(rule);
        }

        for rule in &self.rules {
            let matched = old
                .get_mut(&(rule.name(), rule.labels()))
                .and_then(VecDeque::pop_front);
            if let Some(previous) = matched {
                rule.copy_state(previous);
            }
        }

        let stats = *from.stats.lock();
        *self.stats.lock() = stats;
    }
}

async fn stopped(done: &mut watch::Receiver<bool>) {
    let _ = done.wait_for(|stop| *stop).await;
}

fn until(ts: DateTime<Utc>) -> Duration {
    (ts - Utc::now()).to_std().unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::NotifyError;
    use crate::querier::{Querier, QueryError, QueryRangeRequest, QueryResult};
    use crate::rule::{parse_postable_rule, RuleContext};
    use crate::series::{Point, Series};
    use crate::store::{MemoryMaintenanceStore, StoreError};
    use crate::template::SimpleExpander;
    use crate::alert::{Alert, AlertState};
    use crate::maintenance::PlannedMaintenance;
    use chrono::TimeZone;

    struct FixedQuerier(f64);

    #[async_trait::async_trait]
    impl Querier for FixedQuerier {
        async fn query_range(&self, _: &str, _: &QueryRangeRequest) -> Result<Vec<QueryResult>, QueryError> {
            Ok(vec![QueryResult {
                query_name: "A".into(),
                series: vec![Series::new(
                    [("host", "a")].into_iter().collect(),
                    vec![Point { timestamp: 0, value: self.0 }],
                )],
            }])
        }
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<Alert>>);

    #[async_trait::async_trait]
    impl Notifier for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        async fn notify(&self, _: &str, _: &str, alerts: Vec<Alert>) -> Result<(), NotifyError> {
            self.0.lock().extend(alerts);
            Ok(())
        }
    }

    struct BrokenStore;

    #[async_trait::async_trait]
    impl MaintenanceStore for BrokenStore {
        async fn get_all_planned_maintenance(&self, _: &str) -> Result<Vec<PlannedMaintenance>, StoreError> {
            Err(StoreError::Backend("db down".into()))
        }
    }

    const RULE: &str = r#"{
        "alert": "High CPU",
        "condition": {
            "compositeQuery": {"queries": {"A": {"query": "cpu"}}},
            "op": "1", "target": 80, "matchType": "5"
        }
    }"#;

    fn rule(id: &str, value: f64) -> Arc<Rule> {
        let ctx = RuleContext {
            org_id: "default".into(),
            eval_delay: Duration::ZERO,
            default_source: String::new(),
            querier: Arc::new(FixedQuerier(value)),
            expander: Arc::new(SimpleExpander),
        };
        Arc::new(Rule::new(id, parse_postable_rule(RULE).unwrap(), ctx).unwrap())
    }

    fn task(rules: Vec<Arc<Rule>>, store: Arc<dyn MaintenanceStore>, notifier: Arc<Recorder>) -> RuleTask {
        RuleTask::new(
            "r1-groupname",
            Duration::from_secs(60),
            rules,
            TaskOptions {
                org_id: "default".into(),
                resend_delay: Duration::from_secs(60),
                notifier,
                maintenance_store: store,
            },
        )
    }

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn eval_sends_firing_alerts() {
        let recorder = Arc::new(Recorder::default());
        let t = task(vec![rule("r1", 95.0)], Arc::new(MemoryMaintenanceStore::new()), recorder.clone());
        t.eval(ts()).await;
        let sent = recorder.0.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].state, AlertState::Firing);
    }

    #[tokio::test]
    async fn maintenance_skips_rule() {
        let store = MemoryMaintenanceStore::new();
        let window: PlannedMaintenance = serde_json::from_value(serde_json::json!({
            "id": "m1",
            "name": "upgrade",
            "schedule": {
                "timezone": "UTC",
                "startTime": "2024-05-01T11:00:00Z",
                "endTime": "2024-05-01T13:00:00Z"
            },
            "ruleIds": ["r1"]
        }))
        .unwrap();
        store.insert("default", window);

        let recorder = Arc::new(Recorder::default());
        let skipped = rule("r1", 95.0);
        let other = rule("r2", 95.0);
        let t = task(vec![skipped.clone(), other.clone()], Arc::new(store), recorder.clone());
        t.eval(ts()).await;

        assert!(skipped.current_alerts().is_empty());
        assert_eq!(other.current_alerts().len(), 1);
        assert_eq!(recorder.0.lock().len(), 1);
    }

    #[tokio::test]
    async fn maintenance_failure_fails_open() {
        let recorder = Arc::new(Recorder::default());
        let t = task(vec![rule("r1", 95.0)], Arc::new(BrokenStore), recorder.clone());
        t.eval(ts()).await;
        assert_eq!(recorder.0.lock().len(), 1);
    }

    #[tokio::test]
    async fn copy_state_keeps_alerts() {
        let recorder = Arc::new(Recorder::default());
        let old = task(vec![rule("r1", 95.0)], Arc::new(MemoryMaintenanceStore::new()), recorder.clone());
        old.eval(ts()).await;

        let replacement = task(vec![rule("r1", 95.0)], Arc::new(MemoryMaintenanceStore::new()), recorder);
        replacement.copy_state(&old);
        let alerts = replacement.rules()[0].current_alerts();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].state, AlertState::Firing);
        assert_eq!(alerts[0].active_at, ts());
    }

    #[tokio::test]
    async fn stop_before_gate_opens() {
        let recorder = Arc::new(Recorder::default());
        let t = Arc::new(task(vec![rule("r1", 95.0)], Arc::new(MemoryMaintenanceStore::new()), recorder.clone()));
        let (_gate_tx, gate_rx) = watch::channel(false);
        t.run(gate_rx);

        tokio::time::timeout(Duration::from_secs(2), t.stop())
            .await
            .expect("stop timed out");
        assert!(recorder.0.lock().is_empty());
        assert!(t.last_evaluation().is_none());
    }

    #[tokio::test]
    async fn stop_while_waiting_for_slot() {
        let recorder = Arc::new(Recorder::default());
        let t = Arc::new(task(vec![rule("r1", 95.0)], Arc::new(MemoryMaintenanceStore::new()), recorder));
        let (gate_tx, gate_rx) = watch::channel(false);
        t.run(gate_rx);
        gate_tx.send_replace(true);

        tokio::time::timeout(Duration::from_secs(2), t.stop())
            .await
            .expect("stop timed out");
    }

    #[tokio::test]
    async fn paused_task_skips_tick() {
        let recorder = Arc::new(Recorder::default());
        let t = task(vec![rule("r1", 95.0)], Arc::new(MemoryMaintenanceStore::new()), recorder.clone());
        t.pause(true);
        t.tick(ts()).await;
        assert!(recorder.0.lock().is_empty());
        assert!(t.last_evaluation().is_none());

        t.pause(false);
        t.tick(ts()).await;
        assert_eq!(t.last_evaluation(), Some(ts()));
    }

    #[test]
    fn key_joins_name_and_file() {
        let recorder = Arc::new(Recorder::default());
        let t = task(vec![], Arc::new(MemoryMaintenanceStore::new()), recorder).with_file("rules.json");
        assert_eq!(t.key(), "r1-groupname;rules.json");
    }
}
