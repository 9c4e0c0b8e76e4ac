//! Batch coalescer: many operation descriptors, few round trips.
//!
//! Descriptors are split into consecutive envelopes of at most `max_batch_size` entries.
//! Envelopes are sent one after another, never concurrently; callers that want
//! cross-envelope parallelism wrap [`BatchCoalescer::execute_envelope`] in a fan-out
//! (see [`crate::sync::WorkItemClient::apply_operations_concurrently`]).
//!
//! A transport failure or a non-success status on the batch call fails the whole envelope.
//! Inside a returned envelope each sub-response is decoded independently, so a malformed
//! body degrades to [`ResponseBody::Raw`](crate::domain::outcome::ResponseBody::Raw)
//! instead of an error.

pub mod envelope;

pub use envelope::BatchEnvelope;

use crate::chunk::chunk_ranges;
use crate::config::SyncConfig;
use crate::domain::operation::{OperationDescriptor, RunId};
use crate::domain::outcome::SubResponse;
use crate::domain::provider::ProviderIdentity;
use crate::error::{Result, SyncError};
use crate::http::{HttpClient, HttpRequest};
use crate::metrics;

/// Groups descriptors into bounded batch envelopes and demultiplexes the responses.
pub struct BatchCoalescer<H: HttpClient> {
    http_client: H,
    provider: ProviderIdentity,
    max_batch_size: usize,
    request_timeout_ms: u64,
    api_version: String,
}

impl<H: HttpClient> BatchCoalescer<H> {
    /// Create a coalescer for `provider`.
    ///
    /// # Errors
    /// Returns `SyncError::Validation` if the config has a zero batch size or timeout.
    pub fn new(http_client: H, provider: ProviderIdentity, config: &SyncConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            http_client,
            provider,
            max_batch_size: config.max_batch_size,
            request_timeout_ms: config.request_timeout_ms,
            api_version: config.api_version.clone(),
        })
    }

    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    pub fn provider(&self) -> &ProviderIdentity {
        &self.provider
    }

    /// Execute `operations`, returning one sub-response per descriptor in input order.
    ///
    /// An empty input returns immediately without touching the network.
    ///
    /// # Errors
    /// The first envelope that fails (transport error, rejected batch call, malformed or
    /// misaligned response) aborts the run; later envelopes are not sent.
    #[tracing::instrument(skip(self, operations), fields(run_id = %RunId::new(), operations = operations.len()))]
    pub async fn execute(&self, operations: &[OperationDescriptor]) -> Result<Vec<SubResponse>> {
        if operations.is_empty() {
            return Ok(Vec::new());
        }

        let mut results = Vec::with_capacity(operations.len());
        for (index, range) in chunk_ranges(operations.len(), self.max_batch_size).enumerate() {
            let envelope = BatchEnvelope::new(index, &operations[range]);
            let decoded = self.send_envelope(&envelope).await?;
            results.extend(decoded);
        }

        tracing::debug!(results = results.len(), "Batch run completed");
        Ok(results)
    }

    /// Send a single envelope's worth of descriptors as one round trip.
    ///
    /// # Errors
    /// Returns `SyncError::Validation` if `operations` exceeds the batch ceiling, plus
    /// the envelope-level errors of [`execute`](Self::execute).
    pub async fn execute_envelope(
        &self,
        index: usize,
        operations: &[OperationDescriptor],
    ) -> Result<Vec<SubResponse>> {
        if operations.len() > self.max_batch_size {
            return Err(SyncError::Validation(format!(
                "envelope of {} operations exceeds max_batch_size {}",
                operations.len(),
                self.max_batch_size
            )));
        }
        if operations.is_empty() {
            return Ok(Vec::new());
        }
        self.send_envelope(&BatchEnvelope::new(index, operations))
            .await
    }

    async fn send_envelope(&self, envelope: &BatchEnvelope<'_>) -> Result<Vec<SubResponse>> {
        match self.round_trip(envelope).await {
            Ok(decoded) => {
                metrics::record_envelope("ok");
                decoded.iter().for_each(|r| metrics::record_subresponse(&r.body));
                Ok(decoded)
            }
            Err(e) => {
                metrics::record_envelope(e.kind());
                tracing::error!(
                    envelope = envelope.index,
                    operations = envelope.len(),
                    error = %e,
                    "Batch envelope failed"
                );
                Err(e)
            }
        }
    }

    async fn round_trip(&self, envelope: &BatchEnvelope<'_>) -> Result<Vec<SubResponse>> {
        let request = HttpRequest::new("POST", self.provider.batch_url(&self.api_version))
            .header(
                "Authorization",
                self.provider.credential.authorization_header(),
            )
            .header("Accept", "application/json")
            .json_body(envelope.to_request_body()?);

        tracing::debug!(
            envelope = envelope.index,
            operations = envelope.len(),
            "Sending batch envelope"
        );

        let response = self
            .http_client
            .execute(&request, self.request_timeout_ms)
            .await?;

        if !response.is_success() {
            return Err(SyncError::BatchRejected {
                status: response.status,
                body: response.body,
            });
        }

        envelope.demultiplex(&response.body)
    }
}
