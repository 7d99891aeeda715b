use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};

use crate::alert::{Alert, AlertState};
use crate::error::RuleError;
use crate::notify::Notifier;
use crate::querier::Querier;
use crate::rule::{parse_postable_rule_with, PostableRule, Rule, RuleContext};
use crate::store::{MaintenanceStore, RuleStore, StoreError, StoredRule};
use crate::task::{CronSchedule, RuleTask, TaskOptions};
use crate::template::{SimpleExpander, TemplateExpander};

const TASK_SUFFIX: &str = "-groupname";
const DEFAULT_RESEND_DELAY: Duration = Duration::from_secs(60);

pub fn task_name(rule_id: &str) -> String {
    format!("{rule_id}{TASK_SUFFIX}")
}

pub fn rule_id_from_task_name(name: &str) -> Option<&str> {
    name.strip_suffix(TASK_SUFFIX)
}

#[derive(Clone)]
pub struct ManagerOptions {
    pub org_id: String,
    pub resend_delay: Duration,
    pub eval_delay: Duration,
    pub default_source: String,
    pub querier: Arc<dyn Querier>,
    pub rule_store: Arc<dyn RuleStore>,
    pub maintenance_store: Arc<dyn MaintenanceStore>,
    pub notifier: Arc<dyn Notifier>,
    pub expander: Arc<dyn TemplateExpander>,
}

impl ManagerOptions {
    pub fn new(
        org_id: impl Into<String>,
        querier: Arc<dyn Querier>,
        rule_store: Arc<dyn RuleStore>,
        maintenance_store: Arc<dyn MaintenanceStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            org_id: org_id.into(),
            resend_delay: DEFAULT_RESEND_DELAY,
            eval_delay: Duration::ZERO,
            default_source: String::new(),
            querier,
            rule_store,
            maintenance_store,
            notifier,
            expander: Arc::new(SimpleExpander),
        }
    }

    pub fn with_resend_delay(mut self, delay: Duration) -> Self {
        self.resend_delay = delay;
        self
    }

    pub fn with_eval_delay(mut self, delay: Duration) -> Self {
        self.eval_delay = delay;
        self
    }

    pub fn with_default_source(mut self, source: impl Into<String>) -> Self {
        self.default_source = source.into();
        self
    }

    pub fn with_expander(mut self, expander: Arc<dyn TemplateExpander>) -> Self {
        self.expander = expander;
        self
    }
}

/// A stored rule together with its live state.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GettableRule {
    pub id: String,
    pub state: AlertState,
    #[serde(flatten)]
    pub rule: PostableRule,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NamedAlert {
    pub name: String,
    pub alert: Alert,
}

/// Owns the running tasks, one per enabled rule.
pub struct Manager {
    opts: ManagerOptions,
    tasks: RwLock<HashMap<String, Arc<RuleTask>>>,
    ready: watch::Sender<bool>,
}

impl Manager {
    pub fn new(opts: ManagerOptions) -> Self {
        let (ready, _) = watch::channel(false);
        Self {
            opts,
            tasks: RwLock::new(HashMap::new()),
            ready,
        }
    }

    pub fn options(&self) -> &ManagerOptions {
        &self.opts
    }

    /// Loads every stored rule, starts a task for each enabled one and opens the start gate.
    /// Rules that fail to parse are logged and left out.
    pub async fn start(&self) -> Result<(), RuleError> {
        let stored = self.opts.rule_store.get_stored_rules(&self.opts.org_id).await?;

        let mut tasks = self.tasks.write().await;
        for s in stored {
            let rule = match self.parse(&s.data) {
                Ok(rule) => rule,
                Err(e) => {
                    tracing::warn!(rule_id = %s.id, error = %e, "invalid stored rule, skipped");
                    continue;
                }
            };
            if rule.disabled {
                tracing::info!(rule_id = %s.id, "rule disabled, not scheduled");
                continue;
            }
            let added = self
                .build_task(&s.id, rule)
                .and_then(|task| self.add_task(&mut tasks, task));
            if let Err(e) = added {
                tracing::warn!(rule_id = %s.id, error = %e, "failed to schedule rule");
            }
        }
        let count = tasks.len();
        drop(tasks);

        self.ready.send_replace(true);
        tracing::info!(org_id = %self.opts.org_id, tasks = count, "rule manager started");
        Ok(())
    }

    pub async fn stop(&self) {
        let mut tasks = self.tasks.write().await;
        for (_, task) in tasks.drain() {
            task.stop().await;
        }
        tracing::info!("rule manager stopped");
    }

    pub async fn pause(&self, paused: bool) {
        for task in self.tasks.read().await.values() {
            task.pause(paused);
        }
    }

    /// Stores a new rule and schedules it. The stored document is removed again if its task
    /// cannot be built.
    pub async fn create_rule(&self, json: &str) -> Result<GettableRule, RuleError> {
        let rule = self.parse(json)?;
        let stored = self
            .opts
            .rule_store
            .create_rule(&self.opts.org_id, json.to_string())
            .await?;

        if !rule.disabled {
            let task = match self.build_task(&stored.id, rule.clone()) {
                Ok(task) => task,
                Err(e) => {
                    self.rollback_create(&stored.id).await;
                    return Err(e);
                }
            };
            let mut tasks = self.tasks.write().await;
            if let Err(e) = self.add_task(&mut tasks, task) {
                drop(tasks);
                self.rollback_create(&stored.id).await;
                return Err(e);
            }
        }
        tracing::info!(rule_id = %stored.id, name = %rule.alert, "rule created");
        Ok(self.gettable(&stored, rule, AlertState::Inactive))
    }

    /// Replaces a stored rule. The new task is built before the store is touched, so a
    /// rejected edit leaves both the stored document and the running task as they were.
    pub async fn edit_rule(&self, id: &str, json: &str) -> Result<GettableRule, RuleError> {
        let rule = self.parse(json)?;
        let task = self.prepare_task(id, &rule)?;
        let stored = self
            .opts
            .rule_store
            .edit_rule(&self.opts.org_id, id, json.to_string())
            .await
            .map_err(|e| not_found(e, id))?;

        self.sync_task(id, task).await?;
        tracing::info!(rule_id = %id, name = %rule.alert, "rule edited");
        let state = self.rule_state(id).await;
        Ok(self.gettable(&stored, rule, state))
    }

    /// Applies a partial JSON document over the stored rule.
    pub async fn patch_rule(&self, id: &str, partial: &str) -> Result<GettableRule, RuleError> {
        let stored = self
            .opts
            .rule_store
            .get_stored_rule(&self.opts.org_id, id)
            .await
            .map_err(|e| not_found(e, id))?;
        let current = self.parse(&stored.data)?;
        let patched = current.patch(partial)?;
        patched.validate_with(self.opts.expander.as_ref())?;
        let task = self.prepare_task(id, &patched)?;

        let data = serde_json::to_string(&patched)?;
        let stored = self
            .opts
            .rule_store
            .edit_rule(&self.opts.org_id, id, data)
            .await
            .map_err(|e| not_found(e, id))?;

        self.sync_task(id, task).await?;
        tracing::info!(rule_id = %id, "rule patched");
        let state = self.rule_state(id).await;
        Ok(self.gettable(&stored, patched, state))
    }

    pub async fn delete_rule(&self, id: &str) -> Result<(), RuleError> {
        self.opts
            .rule_store
            .delete_rule(&self.opts.org_id, id)
            .await
            .map_err(|e| not_found(e, id))?;

        let mut tasks = self.tasks.write().await;
        match tasks.remove(&task_name(id)) {
            Some(task) => task.stop().await,
            None => tracing::debug!(rule_id = %id, "deleted rule had no running task"),
        }
        tracing::info!(rule_id = %id, "rule deleted");
        Ok(())
    }

    pub async fn get_rule(&self, id: &str) -> Result<GettableRule, RuleError> {
        let stored = self
            .opts
            .rule_store
            .get_stored_rule(&self.opts.org_id, id)
            .await
            .map_err(|e| not_found(e, id))?;
        let rule = self.parse(&stored.data)?;
        let state = self.rule_state(id).await;
        Ok(self.gettable(&stored, rule, state))
    }

    /// Every stored rule with its current state. Rules without a running task are
    /// reported as disabled.
    pub async fn list_rule_states(&self) -> Result<Vec<GettableRule>, RuleError> {
        let stored = self.opts.rule_store.get_stored_rules(&self.opts.org_id).await?;
        let tasks = self.tasks.read().await;

        let mut out = Vec::with_capacity(stored.len());
        for s in stored {
            let mut rule = match serde_json::from_str::<PostableRule>(&s.data) {
                Ok(rule) => rule,
                Err(e) => {
                    tracing::warn!(rule_id = %s.id, error = %e, "failed to decode stored rule");
                    continue;
                }
            };
            rule.apply_defaults();
            let state = match running_rule(&tasks, &s.id) {
                Some(r) => r.state(),
                None => {
                    rule.disabled = true;
                    AlertState::Inactive
                }
            };
            out.push(self.gettable(&s, rule, state));
        }
        Ok(out)
    }

    pub async fn triggered_alerts(&self) -> Vec<NamedAlert> {
        self.rules()
            .await
            .iter()
            .flat_map(|r| {
                r.active_alerts().into_iter().map(move |alert| NamedAlert {
                    name: r.name().to_string(),
                    alert,
                })
            })
            .collect()
    }

    pub async fn rules(&self) -> Vec<Arc<Rule>> {
        self.rule_tasks()
            .await
            .iter()
            .flat_map(|t| t.rules().iter().cloned())
            .collect()
    }

    /// Running tasks ordered by name.
    pub async fn rule_tasks(&self) -> Vec<Arc<RuleTask>> {
        let mut tasks: Vec<_> = self.tasks.read().await.values().cloned().collect();
        tasks.sort_by(|a, b| a.name().cmp(b.name()));
        tasks
    }

    fn parse(&self, json: &str) -> Result<PostableRule, RuleError> {
        parse_postable_rule_with(json, self.opts.expander.as_ref())
    }

    async fn rule_state(&self, id: &str) -> AlertState {
        let tasks = self.tasks.read().await;
        running_rule(&tasks, id)
            .map(|r| r.state())
            .unwrap_or(AlertState::Inactive)
    }

    /// Task for an enabled rule, `None` for a disabled one.
    fn prepare_task(&self, id: &str, rule: &PostableRule) -> Result<Option<RuleTask>, RuleError> {
        if rule.disabled {
            return Ok(None);
        }
        self.build_task(id, rule.clone()).map(Some)
    }

    /// Brings the task set in line with an edited rule: disabled rules lose their task,
    /// rules without a task get one, everything else is replaced in place.
    async fn sync_task(&self, id: &str, task: Option<RuleTask>) -> Result<(), RuleError> {
        let mut tasks = self.tasks.write().await;
        let Some(task) = task else {
            if let Some(old) = tasks.remove(&task_name(id)) {
                old.stop().await;
                tracing::info!(rule_id = %id, "rule disabled, task stopped");
            }
            return Ok(());
        };
        if !tasks.contains_key(task.name()) {
            return self.add_task(&mut tasks, task);
        }
        self.edit_task(&mut tasks, task).await
    }

    async fn rollback_create(&self, id: &str) {
        if let Err(e) = self.opts.rule_store.delete_rule(&self.opts.org_id, id).await {
            tracing::warn!(rule_id = %id, error = %e, "failed to remove rejected rule");
        }
    }

    fn build_task(&self, id: &str, rule: PostableRule) -> Result<RuleTask, RuleError> {
        let ctx = RuleContext {
            org_id: self.opts.org_id.clone(),
            eval_delay: self.opts.eval_delay,
            default_source: self.opts.default_source.clone(),
            querier: Arc::clone(&self.opts.querier),
            expander: Arc::clone(&self.opts.expander),
        };
        let cron = match &rule.schedule {
            Some(expr) => Some(
                CronSchedule::new(expr, rule.timezone.as_deref()).map_err(RuleError::Validation)?,
            ),
            None => None,
        };
        let frequency = rule.frequency;
        let runtime = Rule::new(id, rule, ctx)?;

        let opts = TaskOptions {
            org_id: self.opts.org_id.clone(),
            resend_delay: self.opts.resend_delay,
            notifier: Arc::clone(&self.opts.notifier),
            maintenance_store: Arc::clone(&self.opts.maintenance_store),
        };
        let task = RuleTask::new(task_name(id), frequency, vec![Arc::new(runtime)], opts);
        Ok(match cron {
            Some(cron) => task.with_cron(cron),
            None => task,
        })
    }

    fn add_task(
        &self,
        tasks: &mut HashMap<String, Arc<RuleTask>>,
        task: RuleTask,
    ) -> Result<(), RuleError> {
        let name = task.name().to_string();
        if tasks.contains_key(&name) {
            return Err(RuleError::TaskExists(name));
        }
        let task = Arc::new(task);
        task.run(self.ready.subscribe());
        tasks.insert(name.clone(), task);
        tracing::info!(task = %name, "task added");
        Ok(())
    }

    /// Replaces a running task. The old task is fully stopped before its alert state is
    /// copied.
    async fn edit_task(
        &self,
        tasks: &mut HashMap<String, Arc<RuleTask>>,
        task: RuleTask,
    ) -> Result<(), RuleError> {
        let name = task.name().to_string();
        let old = tasks
            .get(&name)
            .cloned()
            .ok_or_else(|| RuleError::TaskNotFound(name.clone()))?;
        let task = Arc::new(task);

        old.stop().await;
        task.copy_state(&old);
        task.run(self.ready.subscribe());
        tasks.insert(name.clone(), task);
        tracing::info!(task = %name, "task replaced");
        Ok(())
    }

    fn gettable(&self, stored: &StoredRule, rule: PostableRule, state: AlertState) -> GettableRule {
        GettableRule {
            id: stored.id.clone(),
            state,
            rule,
            created_at: stored.created_at,
            updated_at: stored.updated_at,
        }
    }
}

fn running_rule(tasks: &HashMap<String, Arc<RuleTask>>, id: &str) -> Option<Arc<Rule>> {
    tasks
        .get(&task_name(id))
        .and_then(|t| t.rules().iter().find(|r| r.id() == id).cloned())
}

fn not_found(e: StoreError, id: &str) -> RuleError {
    match e {
        StoreError::NotFound(_) => RuleError::RuleNotFound(id.to_string()),
        other => RuleError::Store(other),
    }
}
