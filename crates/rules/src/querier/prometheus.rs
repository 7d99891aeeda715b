use reqwest::Client;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

use super::{Querier, QueryError, QueryRangeRequest, QueryResult};
use crate::series::{Point, Series};

/// Runs each enabled query as PromQL against a Prometheus-compatible `query_range` API.
pub struct PrometheusQuerier {
    base_url: String,
    client: Client,
}

impl PrometheusQuerier {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, QueryError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| QueryError(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    async fn run(&self, expr: &str, request: &QueryRangeRequest) -> Result<Vec<Series>, QueryError> {
        let url = format!("{}/api/v1/query_range", self.base_url);
        let params = [
            ("query", expr.to_string()),
            ("start", (request.start_ms / 1000).to_string()),
            ("end", (request.end_ms / 1000).to_string()),
            ("step", request.step_secs.to_string()),
        ];

        let body: ApiResponse = self
            .client
            .get(&url)
            .query(&params)
            .send()
            .await
            .map_err(|e| QueryError(e.to_string()))?
            .error_for_status()
            .map_err(|e| QueryError(e.to_string()))?
            .json()
            .await
            .map_err(|e| QueryError(e.to_string()))?;

        if body.status != "success" {
            return Err(QueryError(body.error.unwrap_or_else(|| body.status.clone())));
        }
        Ok(body.data.map(|d| d.into_series()).unwrap_or_default())
    }
}

#[async_trait::async_trait]
impl Querier for PrometheusQuerier {
    async fn query_range(
        &self,
        _org_id: &str,
        request: &QueryRangeRequest,
    ) -> Result<Vec<QueryResult>, QueryError> {
        let mut results = Vec::new();
        for (name, spec) in request.composite_query.enabled() {
            let series = self.run(&spec.query, request).await?;
            results.push(QueryResult {
                query_name: name.clone(),
                series,
            });
        }
        Ok(results)
    }
}

#[derive(Deserialize)]
struct ApiResponse {
    status: String,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    data: Option<MatrixData>,
}

#[derive(Deserialize)]
struct MatrixData {
    #[serde(default)]
    result: Vec<MatrixSeries>,
}

#[derive(Deserialize)]
struct MatrixSeries {
    #[serde(default)]
    metric: BTreeMap<String, String>,
    #[serde(default)]
    values: Vec<(f64, String)>,
}

impl MatrixData {
    fn into_series(self) -> Vec<Series> {
        self.result
            .into_iter()
            .map(|s| {
                let points = s
                    .values
                    .into_iter()
                    .filter_map(|(ts, v)| {
                        let value = v.parse::<f64>().ok()?;
                        Some(Point {
                            timestamp: (ts * 1000.0) as i64,
                            value,
                        })
                    })
                    .collect();
                Series::new(s.metric.into(), points)
            })
            .collect()
    }
}
