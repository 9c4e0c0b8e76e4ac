//! Fan-out executor: run an async function over many items with overlapping wait time.
//!
//! Items are partitioned into `ceil(n / max_workers)`-sized contiguous chunks. All chunks,
//! and all items inside each chunk, are driven concurrently from the caller's task; nothing
//! is spawned, so processors may borrow from the caller. In [`ConcurrencyMode::Bounded`]
//! a semaphore additionally caps in-flight items at `max_workers`; in
//! [`ConcurrencyMode::Advisory`] every item starts at once.
//!
//! Each item is raced against the item timeout. Errors, timeouts and panics are contained
//! per item: the run always yields one outcome per input, in input order.
//!
//! ```text
//! pending ──> succeeded
//!         ├─> failed
//!         └─> timed-out
//! ```

pub mod progress;

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::FutureExt;
use futures::future::join_all;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

pub use progress::{LogProgressReporter, ProgressReporter};

use crate::chunk::{chunk_size, with_timeout};
use crate::config::{ConcurrencyMode, SyncConfig};
use crate::domain::operation::RunId;
use crate::domain::outcome::{ItemOutcome, OutcomeSummary};
use crate::error::{Result, SyncError};
use crate::metrics;

/// Options for one executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FanOutOptions {
    /// Concurrency limit; also determines the chunk size
    pub max_workers: usize,
    /// Deadline per item, counted from when the item is dispatched
    pub timeout: Duration,
    pub show_progress: bool,
    /// Throttle for the default log reporter
    pub progress_interval: Duration,
    pub mode: ConcurrencyMode,
}

impl Default for FanOutOptions {
    fn default() -> Self {
        (&SyncConfig::default()).into()
    }
}

impl From<&SyncConfig> for FanOutOptions {
    fn from(config: &SyncConfig) -> Self {
        Self {
            max_workers: config.max_workers,
            timeout: config.item_timeout(),
            show_progress: config.show_progress,
            progress_interval: config.progress_interval(),
            mode: config.concurrency_mode,
        }
    }
}

/// Handed to the processor alongside each item.
#[derive(Debug, Clone)]
pub struct ItemContext {
    /// Position of the item in the input list
    pub index: usize,
    pub timeout: Duration,
    /// Cancelled when the item times out, so work the processor detached can stop too
    pub cancel: CancellationToken,
}

/// Runs per-item async work with chunking, a concurrency cap, timeouts and failure isolation.
pub struct FanOutExecutor {
    options: FanOutOptions,
    reporter: Arc<dyn ProgressReporter>,
}

impl FanOutExecutor {
    /// Create an executor. With `show_progress` set, progress goes to a
    /// [`LogProgressReporter`] unless another reporter is supplied.
    ///
    /// # Errors
    /// Returns `SyncError::Validation` for a zero worker count or a zero timeout.
    pub fn new(options: FanOutOptions) -> Result<Self> {
        if options.max_workers == 0 {
            return Err(SyncError::Validation(
                "max_workers must be at least 1".to_string(),
            ));
        }
        if options.timeout.is_zero() {
            return Err(SyncError::Validation(
                "item timeout must be greater than zero".to_string(),
            ));
        }
        let reporter = Arc::new(LogProgressReporter::new("fan-out", options.progress_interval));
        Ok(Self { options, reporter })
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn options(&self) -> &FanOutOptions {
        &self.options
    }

    /// Run `process` over `items`; `output[i]` is the result for `items[i]`, or `None` if
    /// that item failed or timed out.
    pub async fn run<T, R, F, Fut>(&self, items: Vec<T>, process: F) -> Vec<Option<R>>
    where
        F: Fn(T, ItemContext) -> Fut,
        Fut: Future<Output = Result<R>>,
    {
        self.run_detailed(items, process)
            .await
            .into_iter()
            .map(ItemOutcome::into_option)
            .collect()
    }

    /// Like [`run`](Self::run) but keeps why each item did not succeed.
    #[tracing::instrument(skip_all, fields(run_id = %RunId::new(), items = items.len(), max_workers = self.options.max_workers, mode = ?self.options.mode))]
    pub async fn run_detailed<T, R, F, Fut>(
        &self,
        items: Vec<T>,
        process: F,
    ) -> Vec<ItemOutcome<R>>
    where
        F: Fn(T, ItemContext) -> Fut,
        Fut: Future<Output = Result<R>>,
    {
        let total = items.len();
        if total == 0 {
            return Vec::new();
        }

        let size = chunk_size(total, self.options.max_workers);
        let mut chunks: Vec<Vec<(usize, T)>> = Vec::with_capacity(total.div_ceil(size));
        let mut remaining = items.into_iter().enumerate();
        loop {
            let chunk: Vec<_> = remaining.by_ref().take(size).collect();
            if chunk.is_empty() {
                break;
            }
            chunks.push(chunk);
        }

        tracing::debug!(chunks = chunks.len(), chunk_size = size, "Dispatching fan-out");

        let gate = match self.options.mode {
            ConcurrencyMode::Bounded => Some(Semaphore::new(self.options.max_workers)),
            ConcurrencyMode::Advisory => None,
        };
        let completed = AtomicUsize::new(0);
        let run = &RunState {
            process: &process,
            gate: gate.as_ref(),
            completed: &completed,
            total,
        };

        let per_chunk = join_all(chunks.into_iter().map(move |chunk| {
            join_all(
                chunk
                    .into_iter()
                    .map(move |(index, item)| self.run_item(run, index, item)),
            )
        }))
        .await;

        // Chunks are contiguous slices of the input, so concatenating restores input order.
        let outcomes: Vec<ItemOutcome<R>> = per_chunk.into_iter().flatten().collect();

        let summary = OutcomeSummary::from_outcomes(&outcomes);
        tracing::info!(
            succeeded = summary.succeeded,
            failed = summary.failed,
            timed_out = summary.timed_out,
            "Fan-out completed"
        );

        outcomes
    }

    async fn run_item<T, R, F, Fut>(
        &self,
        run: &RunState<'_, F>,
        index: usize,
        item: T,
    ) -> ItemOutcome<R>
    where
        F: Fn(T, ItemContext) -> Fut,
        Fut: Future<Output = Result<R>>,
    {
        // Held until the outcome is known; the semaphore is never closed.
        let _permit = match run.gate {
            Some(gate) => gate.acquire().await.ok(),
            None => None,
        };

        let timeout = self.options.timeout;
        let cancel = CancellationToken::new();
        let context = ItemContext {
            index,
            timeout,
            cancel: cancel.clone(),
        };

        // The processor is called inside the caught future so a panic while building its
        // future is contained like one raised while polling it.
        let attempt =
            AssertUnwindSafe(async move { (run.process)(item, context).await }).catch_unwind();
        let outcome = match with_timeout(timeout, attempt).await {
            Ok(Ok(Ok(value))) => ItemOutcome::Succeeded(value),
            Ok(Ok(Err(e))) => {
                tracing::warn!(index, error = %e, kind = e.kind(), "Fan-out item failed");
                ItemOutcome::Failed(e.to_string())
            }
            Ok(Err(panic)) => {
                let message = panic_message(panic.as_ref());
                tracing::error!(index, panic = %message, "Fan-out item panicked");
                ItemOutcome::Failed(format!("processor panicked: {message}"))
            }
            Err(_) => {
                cancel.cancel();
                tracing::warn!(index, timeout_ms = timeout.as_millis() as u64, "Fan-out item timed out");
                ItemOutcome::TimedOut(timeout)
            }
        };

        metrics::record_item(outcome.label());

        let done = run.completed.fetch_add(1, Ordering::SeqCst) + 1;
        if self.options.show_progress {
            self.reporter.report(done, run.total);
        }

        outcome
    }
}

/// Borrowed state shared by every item of one run.
struct RunState<'a, F> {
    process: &'a F,
    gate: Option<&'a Semaphore>,
    completed: &'a AtomicUsize,
    total: usize,
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
