use chrono::Utc;
use std::path::Path;

use super::{MemoryMaintenanceStore, MemoryRuleStore, StoreError, StoredRule};
use crate::maintenance::PlannedMaintenance;

/// Seeds `store` with every `*.json` file in `dir`. The file stem becomes the rule id.
/// Documents are stored as-is; they are validated when the manager loads them.
pub fn load_rules_dir(store: &MemoryRuleStore, org_id: &str, dir: &Path) -> Result<usize, StoreError> {
    let entries = std::fs::read_dir(dir)
        .map_err(|e| StoreError::Backend(format!("{}: {e}", dir.display())))?;

    let mut loaded = 0;
    for entry in entries {
        let path = entry
            .map_err(|e| StoreError::Backend(format!("{}: {e}", dir.display())))?
            .path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };

        let data = std::fs::read_to_string(&path)
            .map_err(|e| StoreError::Backend(format!("{}: {e}", path.display())))?;
        let modified = std::fs::metadata(&path)
            .and_then(|m| m.modified())
            .map(chrono::DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());

        store.insert(StoredRule {
            id: id.to_string(),
            org_id: org_id.to_string(),
            data,
            created_at: modified,
            updated_at: modified,
        });
        loaded += 1;
    }

    tracing::info!(dir = %dir.display(), rules = loaded, "rules loaded");
    Ok(loaded)
}

/// Loads a JSON array of maintenance windows. Every window must validate.
pub fn load_maintenance_file(
    store: &MemoryMaintenanceStore,
    org_id: &str,
    path: &Path,
) -> Result<usize, StoreError> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| StoreError::Backend(format!("{}: {e}", path.display())))?;
    let windows: Vec<PlannedMaintenance> = serde_json::from_str(&contents)
        .map_err(|e| StoreError::Backend(format!("{}: {e}", path.display())))?;

    let count = windows.len();
    for (i, mut window) in windows.into_iter().enumerate() {
        window
            .validate()
            .map_err(|e| StoreError::Backend(format!("{}: {e}", path.display())))?;
        if window.id.is_empty() {
            window.id = format!("maintenance-{i}");
        }
        store.insert(org_id, window);
    }

    tracing::info!(path = %path.display(), windows = count, "maintenance windows loaded");
    Ok(count)
}
