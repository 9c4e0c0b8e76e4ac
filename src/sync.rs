//! Record-level helpers built on the coalescer and the executor.
//!
//! "Fetch many records by id" and "run many queries" fan single calls out through the
//! executor, so each returns one `Option` per input with failures already logged.
//! Bulk writes go through the coalescer.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::batch::BatchCoalescer;
use crate::chunk::chunk_ranges;
use crate::config::SyncConfig;
use crate::domain::operation::OperationDescriptor;
use crate::domain::outcome::SubResponse;
use crate::domain::provider::ProviderIdentity;
use crate::error::{Result, SyncError};
use crate::fanout::{FanOutExecutor, FanOutOptions, ProgressReporter};
use crate::http::{HttpClient, HttpRequest, HttpResponse};

/// A work-tracking record as returned by the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkRecord {
    pub id: u64,
    #[serde(default)]
    pub rev: Option<u64>,
    #[serde(default)]
    pub fields: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub url: Option<String>,
}

impl WorkRecord {
    pub fn field(&self, name: &str) -> Option<&serde_json::Value> {
        self.fields.get(name)
    }

    pub fn title(&self) -> Option<&str> {
        self.field("System.Title").and_then(|v| v.as_str())
    }

    pub fn state(&self) -> Option<&str> {
        self.field("System.State").and_then(|v| v.as_str())
    }
}

/// Reference to a record returned by a query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordRef {
    pub id: u64,
    #[serde(default)]
    pub url: Option<String>,
}

/// Result of one structured query.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    #[serde(default)]
    pub work_items: Vec<RecordRef>,
}

impl QueryResult {
    pub fn ids(&self) -> Vec<u64> {
        self.work_items.iter().map(|r| r.id).collect()
    }
}

/// Client for one provider project.
pub struct WorkItemClient<H: HttpClient> {
    http_client: Arc<H>,
    provider: ProviderIdentity,
    config: SyncConfig,
    coalescer: BatchCoalescer<Arc<H>>,
    executor: FanOutExecutor,
}

impl<H: HttpClient> WorkItemClient<H> {
    /// # Errors
    /// Returns `SyncError::Validation` if `config` is invalid.
    pub fn new(http_client: Arc<H>, provider: ProviderIdentity, config: SyncConfig) -> Result<Self> {
        let coalescer = BatchCoalescer::new(http_client.clone(), provider.clone(), &config)?;
        let executor = FanOutExecutor::new(FanOutOptions::from(&config))?;
        Ok(Self {
            http_client,
            provider,
            config,
            coalescer,
            executor,
        })
    }

    /// Replace the default log-based progress reporter used by fan-out helpers.
    pub fn with_progress_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.executor = self.executor.with_reporter(reporter);
        self
    }

    pub fn coalescer(&self) -> &BatchCoalescer<Arc<H>> {
        &self.coalescer
    }

    pub fn executor(&self) -> &FanOutExecutor {
        &self.executor
    }

    fn authorized(&self, request: HttpRequest) -> HttpRequest {
        request
            .header(
                "Authorization",
                self.provider.credential.authorization_header(),
            )
            .header("Accept", "application/json")
    }

    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let response = self
            .http_client
            .execute(&request, self.config.request_timeout_ms)
            .await?;
        if !response.is_success() {
            return Err(SyncError::RequestFailed {
                status: response.status,
                body: response.body,
            });
        }
        Ok(response)
    }

    /// Fetch a single record.
    pub async fn fetch_record(&self, id: u64) -> Result<WorkRecord> {
        let url = self.provider.work_item_url(id, &self.config.api_version);
        let response = self.send(self.authorized(HttpRequest::new("GET", url))).await?;
        Ok(serde_json::from_str(&response.body)?)
    }

    /// Run a single structured query.
    pub async fn run_query(&self, query: &str) -> Result<QueryResult> {
        let body = serde_json::json!({ "query": query }).to_string();
        let request = HttpRequest::new("POST", self.provider.query_url(&self.config.api_version))
            .json_body(body);
        let response = self.send(self.authorized(request)).await?;
        Ok(serde_json::from_str(&response.body)?)
    }

    /// Fetch many records concurrently; `None` marks a record that failed or timed out.
    pub async fn fetch_records(&self, ids: Vec<u64>) -> Vec<Option<WorkRecord>> {
        self.executor
            .run(ids, |id, _ctx| self.fetch_record(id))
            .await
    }

    /// Run many queries concurrently; `None` marks a query that failed or timed out.
    pub async fn run_queries(&self, queries: Vec<String>) -> Vec<Option<QueryResult>> {
        self.executor
            .run(queries, |query, _ctx| async move {
                self.run_query(&query).await
            })
            .await
    }

    /// Fetch many records through batch envelopes instead of one call per record.
    ///
    /// A sub-response that is unsuccessful or does not decode into a record yields `None`.
    ///
    /// # Errors
    /// Envelope-level failures propagate, as with [`apply_operations`](Self::apply_operations).
    pub async fn fetch_records_batched(&self, ids: &[u64]) -> Result<Vec<Option<WorkRecord>>> {
        let operations: Vec<_> = ids
            .iter()
            .map(|id| {
                OperationDescriptor::get(
                    self.provider.work_item_path(*id, &self.config.api_version),
                )
            })
            .collect();

        let responses = self.coalescer.execute(&operations).await?;
        Ok(ids
            .iter()
            .zip(responses)
            .map(|(id, response)| {
                let record = response
                    .is_success()
                    .then(|| response.body.parse::<WorkRecord>())
                    .flatten();
                if record.is_none() {
                    tracing::warn!(id, status = ?response.status, "Record missing from batch response");
                }
                record
            })
            .collect())
    }

    /// Apply descriptors through the coalescer, one envelope at a time.
    pub async fn apply_operations(
        &self,
        operations: &[OperationDescriptor],
    ) -> Result<Vec<SubResponse>> {
        self.coalescer.execute(operations).await
    }

    /// Apply descriptors with envelopes sent concurrently through the executor.
    ///
    /// A failed envelope marks each of its descriptors `None`; other envelopes are unaffected.
    pub async fn apply_operations_concurrently(
        &self,
        operations: Vec<OperationDescriptor>,
    ) -> Vec<Option<SubResponse>> {
        let ranges: Vec<_> =
            chunk_ranges(operations.len(), self.coalescer.max_batch_size()).collect();
        let envelopes: Vec<_> = ranges.iter().cloned().enumerate().collect();

        let results = self
            .executor
            .run(envelopes, |(index, range), _ctx| {
                let group = &operations[range];
                async move { self.coalescer.execute_envelope(index, group).await }
            })
            .await;

        ranges
            .into_iter()
            .zip(results)
            .flat_map(|(range, result)| match result {
                Some(responses) => responses.into_iter().map(Some).collect::<Vec<_>>(),
                None => vec![None; range.len()],
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::provider::Credential;
    use crate::http::MockHttpClient;
    use serde_json::json;

    const ORG: &str = "https://dev.azure.com/acme";

    fn client(mock: &Arc<MockHttpClient>, config: SyncConfig) -> WorkItemClient<MockHttpClient> {
        let provider = ProviderIdentity::new("acme", "Widgets", Credential::Bearer("t".into()));
        WorkItemClient::new(mock.clone(), provider, config).unwrap()
    }

    fn record_key(id: u64) -> String {
        format!("GET {ORG}/Widgets/_apis/wit/workitems/{id}?api-version=7.1")
    }

    fn record_body(id: u64) -> String {
        json!({"id": id, "rev": 1, "fields": {"System.Title": format!("Item {id}")}}).to_string()
    }

    #[test_log::test(tokio::test)]
    async fn test_fetch_records_isolates_failures() {
        let mock = Arc::new(MockHttpClient::new());
        for id in [1u64, 3] {
            mock.add_response(
                &record_key(id),
                Ok(HttpResponse {
                    status: 200,
                    body: record_body(id),
                }),
            );
        }
        mock.add_response(
            &record_key(2),
            Ok(HttpResponse {
                status: 404,
                body: "not found".into(),
            }),
        );

        let records = client(&mock, SyncConfig::default())
            .fetch_records(vec![1, 2, 3])
            .await;

        assert_eq!(records.len(), 3);
        assert_eq!(records[0].as_ref().unwrap().title(), Some("Item 1"));
        assert!(records[1].is_none());
        assert_eq!(records[2].as_ref().unwrap().id, 3);
        assert_eq!(
            mock.get_calls()[0].header("Authorization"),
            Some("Bearer t")
        );
    }

    #[tokio::test]
    async fn test_run_queries() {
        let mock = Arc::new(MockHttpClient::new());
        let key = format!("POST {ORG}/Widgets/_apis/wit/wiql?api-version=7.1");
        mock.add_response(
            &key,
            Ok(HttpResponse {
                status: 200,
                body: json!({"workItems": [{"id": 5}, {"id": 8, "url": "u"}]}).to_string(),
            }),
        );
        mock.add_response(
            &key,
            Ok(HttpResponse {
                status: 200,
                body: "{oops".into(),
            }),
        );

        let config = SyncConfig {
            max_workers: 1,
            ..Default::default()
        };
        let results = client(&mock, config)
            .run_queries(vec!["SELECT 1".into(), "SELECT 2".into()])
            .await;

        assert_eq!(results[0].as_ref().unwrap().ids(), vec![5, 8]);
        assert!(results[1].is_none());
        assert_eq!(mock.get_calls()[0].json_body()["query"], "SELECT 1");
    }

    #[tokio::test]
    async fn test_fetch_records_batched_handles_raw_bodies() {
        let mock = Arc::new(MockHttpClient::new());
        mock.add_response(
            &format!("POST {ORG}/_apis/wit/$batch?api-version=7.1"),
            Ok(HttpResponse {
                status: 200,
                body: json!({"responses": [
                    {"code": 200, "body": record_body(10)},
                    {"code": 500, "body": "internal"},
                    {"code": 200, "body": "<not json>"}
                ]})
                .to_string(),
            }),
        );

        let records = client(&mock, SyncConfig::default())
            .fetch_records_batched(&[10, 11, 12])
            .await
            .unwrap();

        assert_eq!(records.len(), 3);
        assert_eq!(records[0].as_ref().unwrap().id, 10);
        assert!(records[1].is_none());
        assert!(records[2].is_none());

        let sent = mock.get_calls()[0].json_body();
        assert_eq!(
            sent["requests"][1]["url"],
            "/Widgets/_apis/wit/workitems/11?api-version=7.1"
        );
    }

    #[tokio::test]
    async fn test_concurrent_envelopes_isolate_failed_envelope() {
        let mock = Arc::new(MockHttpClient::new());
        let batch_key = format!("POST {ORG}/_apis/wit/$batch?api-version=7.1");
        let ok = |n: usize| {
            let responses: Vec<_> = (0..n).map(|_| json!({"code": 200, "body": "{}"})).collect();
            Ok(HttpResponse {
                status: 200,
                body: json!({ "responses": responses }).to_string(),
            })
        };
        // Envelopes run in order of dispatch with one worker: 2, 2 (rejected), 1.
        mock.add_response(&batch_key, ok(2));
        mock.add_response(
            &batch_key,
            Ok(HttpResponse {
                status: 429,
                body: "slow down".into(),
            }),
        );
        mock.add_response(&batch_key, ok(1));

        let config = SyncConfig {
            max_batch_size: 2,
            max_workers: 1,
            ..Default::default()
        };
        let operations = (0..5)
            .map(|i| OperationDescriptor::delete(format!("/_apis/wit/workitems/{i}")))
            .collect();

        let results = client(&mock, config)
            .apply_operations_concurrently(operations)
            .await;

        let present: Vec<_> = results.iter().map(Option::is_some).collect();
        assert_eq!(present, vec![true, true, false, false, true]);
        assert_eq!(mock.call_count(), 3);
    }
}
