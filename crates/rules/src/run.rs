use std::path::Path;
use std::sync::Arc;

use crate::config::RulesConfig;
use crate::manager::{Manager, ManagerOptions};
use crate::notify::{LogNotifier, Notifier, WebhookNotifier};
use crate::querier::PrometheusQuerier;
use crate::store::{load_maintenance_file, load_rules_dir, MemoryMaintenanceStore, MemoryRuleStore};

/// Builds a manager from the config, seeding the in-memory stores from disk.
pub fn build_manager(config: &RulesConfig) -> Result<Manager, Box<dyn std::error::Error>> {
    let rule_store = MemoryRuleStore::new();
    load_rules_dir(&rule_store, &config.org_id, Path::new(&config.rules_dir))?;

    let maintenance_store = MemoryMaintenanceStore::new();
    if let Some(file) = &config.maintenance_file {
        load_maintenance_file(&maintenance_store, &config.org_id, Path::new(file))?;
    }

    let querier = PrometheusQuerier::new(config.querier.url.clone(), config.querier.timeout())?;

    let notifier: Arc<dyn Notifier> = match &config.notifier.webhook_url {
        Some(url) => Arc::new(WebhookNotifier::new(url.clone())),
        None => Arc::new(LogNotifier),
    };

    let opts = ManagerOptions::new(
        config.org_id.clone(),
        Arc::new(querier),
        Arc::new(rule_store),
        Arc::new(maintenance_store),
        notifier,
    )
    .with_resend_delay(config.manager.resend_delay())
    .with_eval_delay(config.manager.eval_delay())
    .with_default_source(config.manager.source_url.clone());

    Ok(Manager::new(opts))
}

pub async fn run(config: RulesConfig) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(
        org_id = %config.org_id,
        rules_dir = %config.rules_dir,
        querier = %config.querier.url,
        notifier = config.notifier.webhook_url.as_deref().unwrap_or("log"),
        "rule engine configured"
    );

    let manager = build_manager(&config)?;
    manager.start().await?;

    tracing::info!(tasks = manager.rule_tasks().await.len(), "rule engine running");
    crate::shutdown::wait_for_shutdown().await;

    tracing::info!("shutting down");
    manager.stop().await;
    Ok(())
}
