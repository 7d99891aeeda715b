mod prometheus;

pub use prometheus::PrometheusQuerier;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::series::Series;

#[derive(Debug)]
pub struct QueryError(pub String);

impl std::fmt::Display for QueryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "query: {}", self.0)
    }
}

impl std::error::Error for QueryError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    #[default]
    Builder,
    ClickhouseSql,
    Promql,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuerySpec {
    pub query: String,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub legend: String,
}

/// Named queries a rule condition runs against the telemetry backend.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositeQuery {
    #[serde(default)]
    pub query_type: QueryType,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub panel_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub unit: String,
    #[serde(default)]
    pub queries: BTreeMap<String, QuerySpec>,
}

impl CompositeQuery {
    pub fn enabled(&self) -> impl Iterator<Item = (&String, &QuerySpec)> {
        self.queries.iter().filter(|(_, q)| !q.disabled)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryRangeRequest {
    pub start_ms: i64,
    pub end_ms: i64,
    pub step_secs: i64,
    pub composite_query: CompositeQuery,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryResult {
    pub query_name: String,
    pub series: Vec<Series>,
}

#[async_trait::async_trait]
pub trait Querier: Send + Sync {
    async fn query_range(
        &self,
        org_id: &str,
        request: &QueryRangeRequest,
    ) -> Result<Vec<QueryResult>, QueryError>;
}
