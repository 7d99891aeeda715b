mod loader;
mod maintenance_store;
mod rule_store;

pub use loader::{load_maintenance_file, load_rules_dir};
pub use maintenance_store::MemoryMaintenanceStore;
pub use rule_store::MemoryRuleStore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::maintenance::PlannedMaintenance;

#[derive(Debug)]
pub enum StoreError {
    NotFound(String),
    Backend(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(id) => write!(f, "store: {id} not found"),
            Self::Backend(msg) => write!(f, "store: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// A rule as persisted: the raw JSON document plus bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredRule {
    pub id: String,
    pub org_id: String,
    pub data: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[async_trait::async_trait]
pub trait RuleStore: Send + Sync {
    async fn get_stored_rules(&self, org_id: &str) -> Result<Vec<StoredRule>, StoreError>;
    async fn get_stored_rule(&self, org_id: &str, id: &str) -> Result<StoredRule, StoreError>;
    async fn create_rule(&self, org_id: &str, data: String) -> Result<StoredRule, StoreError>;
    async fn edit_rule(&self, org_id: &str, id: &str, data: String) -> Result<StoredRule, StoreError>;
    async fn delete_rule(&self, org_id: &str, id: &str) -> Result<(), StoreError>;
}

#[async_trait::async_trait]
pub trait MaintenanceStore: Send + Sync {
    async fn get_all_planned_maintenance(
        &self,
        org_id: &str,
    ) -> Result<Vec<PlannedMaintenance>, StoreError>;
}
