use dashmap::DashMap;
use std::sync::Arc;

use super::{MaintenanceStore, StoreError};
use crate::maintenance::PlannedMaintenance;

#[derive(Clone, Default)]
pub struct MemoryMaintenanceStore {
    windows: Arc<DashMap<(String, String), PlannedMaintenance>>,
}

impl MemoryMaintenanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, org_id: &str, window: PlannedMaintenance) {
        self.windows
            .insert((org_id.to_string(), window.id.clone()), window);
    }

    pub fn delete(&self, org_id: &str, id: &str) -> bool {
        self.windows
            .remove(&(org_id.to_string(), id.to_string()))
            .is_some()
    }

    pub fn count(&self) -> usize {
        self.windows.len()
    }
}

#[async_trait::async_trait]
impl MaintenanceStore for MemoryMaintenanceStore {
    async fn get_all_planned_maintenance(
        &self,
        org_id: &str,
    ) -> Result<Vec<PlannedMaintenance>, StoreError> {
        Ok(self
            .windows
            .iter()
            .filter(|w| w.key().0 == org_id)
            .map(|w| w.value().clone())
            .collect())
    }
}
