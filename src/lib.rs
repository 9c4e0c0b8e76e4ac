//! Bulk synchronization of work-tracking records against an HTTP API.
//!
//! Two engines do the work:
//! - [`BatchCoalescer`] packs many [`OperationDescriptor`]s into provider batch envelopes
//!   bounded by `max_batch_size`, sends them one after another, and splits each combined
//!   response back into per-descriptor [`SubResponse`]s.
//! - [`FanOutExecutor`] runs an async function over many items with a concurrency limit, a
//!   per-item timeout and per-item failure isolation, returning results in input order.
//!
//! [`WorkItemClient`] composes both into record-level helpers.

pub mod batch;
pub mod chunk;
pub mod config;
pub mod domain;
pub mod error;
pub mod fanout;
pub mod http;
pub mod metrics;
pub mod sync;

// Re-export commonly used types
pub use batch::{BatchCoalescer, BatchEnvelope};
pub use config::{ConcurrencyMode, SyncConfig};
pub use domain::operation::{OperationDescriptor, RunId};
pub use domain::outcome::{ItemOutcome, OutcomeSummary, ResponseBody, SubResponse};
pub use domain::provider::{Credential, ProviderIdentity};
pub use error::{Result, SyncError};
pub use fanout::{FanOutExecutor, FanOutOptions, ItemContext, LogProgressReporter, ProgressReporter};
pub use http::{HttpClient, HttpRequest, HttpResponse, MockHttpClient, ReqwestHttpClient};
pub use sync::{QueryResult, RecordRef, WorkItemClient, WorkRecord};
