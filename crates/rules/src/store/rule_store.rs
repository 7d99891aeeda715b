use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;

use super::{RuleStore, StoreError, StoredRule};

#[derive(Clone, Default)]
pub struct MemoryRuleStore {
    rules: Arc<DashMap<String, StoredRule>>,
}

impl MemoryRuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, rule: StoredRule) {
        self.rules.insert(rule.id.clone(), rule);
    }

    pub fn count(&self) -> usize {
        self.rules.len()
    }

    fn find(&self, org_id: &str, id: &str) -> Result<StoredRule, StoreError> {
        self.rules
            .get(id)
            .filter(|r| r.org_id == org_id)
            .map(|r| r.clone())
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }
}

#[async_trait::async_trait]
impl RuleStore for MemoryRuleStore {
    async fn get_stored_rules(&self, org_id: &str) -> Result<Vec<StoredRule>, StoreError> {
        let mut rules: Vec<StoredRule> = self
            .rules
            .iter()
            .filter(|r| r.value().org_id == org_id)
            .map(|r| r.value().clone())
            .collect();
        rules.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(rules)
    }

    async fn get_stored_rule(&self, org_id: &str, id: &str) -> Result<StoredRule, StoreError> {
        self.find(org_id, id)
    }

    async fn create_rule(&self, org_id: &str, data: String) -> Result<StoredRule, StoreError> {
        let now = Utc::now();
        let rule = StoredRule {
            id: uuid::Uuid::new_v4().to_string(),
            org_id: org_id.to_string(),
            data,
            created_at: now,
            updated_at: now,
        };
        self.insert(rule.clone());
        Ok(rule)
    }

    async fn edit_rule(&self, org_id: &str, id: &str, data: String) -> Result<StoredRule, StoreError> {
        let mut rule = self.find(org_id, id)?;
        rule.data = data;
        rule.updated_at = Utc::now();
        self.insert(rule.clone());
        Ok(rule)
    }

    async fn delete_rule(&self, org_id: &str, id: &str) -> Result<(), StoreError> {
        self.find(org_id, id)?;
        self.rules.remove(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_and_get() {
        let store = MemoryRuleStore::new();
        let created = store.create_rule("org", "{}".into()).await.unwrap();
        let got = store.get_stored_rule("org", &created.id).await.unwrap();
        assert_eq!(got, created);
    }

    #[tokio::test]
    async fn scoped_by_org() {
        let store = MemoryRuleStore::new();
        let created = store.create_rule("org-a", "{}".into()).await.unwrap();
        assert!(store.get_stored_rule("org-b", &created.id).await.is_err());
        assert!(store.get_stored_rules("org-b").await.unwrap().is_empty());
        assert_eq!(store.get_stored_rules("org-a").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn edit_existing() {
        let store = MemoryRuleStore::new();
        let created = store.create_rule("org", "{}".into()).await.unwrap();
        let edited = store
            .edit_rule("org", &created.id, r#"{"alert":"x"}"#.into())
            .await
            .unwrap();
        assert_eq!(edited.data, r#"{"alert":"x"}"#);
        assert_eq!(edited.created_at, created.created_at);
    }

    #[tokio::test]
    async fn edit_missing_fails() {
        let store = MemoryRuleStore::new();
        let err = store.edit_rule("org", "nope", "{}".into()).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn delete_existing() {
        let store = MemoryRuleStore::new();
        let created = store.create_rule("org", "{}".into()).await.unwrap();
        store.delete_rule("org", &created.id).await.unwrap();
        assert_eq!(store.count(), 0);
        assert!(store.delete_rule("org", &created.id).await.is_err());
    }
}
