//! Progress reporting for fan-out runs.
//!
//! The executor calls [`ProgressReporter::report`] once per finished item with
//! `(completed, total)`. How often anything is actually rendered is up to the reporter.

use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Receives completion counts from the executor.
///
/// Any `Fn(usize, usize)` closure is a reporter.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, completed: usize, total: usize);
}

impl<F> ProgressReporter for F
where
    F: Fn(usize, usize) + Send + Sync,
{
    fn report(&self, completed: usize, total: usize) {
        self(completed, total)
    }
}

/// Renders progress as `tracing` events, at most once per `interval`.
///
/// The final update (`completed == total`) is always emitted.
pub struct LogProgressReporter {
    label: String,
    interval: Duration,
    last_emit: Mutex<Option<Instant>>,
}

impl LogProgressReporter {
    pub fn new(label: impl Into<String>, interval: Duration) -> Self {
        Self {
            label: label.into(),
            interval,
            last_emit: Mutex::new(None),
        }
    }

    /// Whether an update at `now` passes the throttle; records it if so.
    fn should_emit(&self, completed: usize, total: usize, now: Instant) -> bool {
        let mut last = self.last_emit.lock();
        let due = completed >= total
            || last.is_none_or(|at| now.saturating_duration_since(at) >= self.interval);
        if due {
            *last = Some(now);
        }
        due
    }
}

impl ProgressReporter for LogProgressReporter {
    fn report(&self, completed: usize, total: usize) {
        if !self.should_emit(completed, total, Instant::now()) {
            return;
        }
        let percent = if total == 0 {
            100
        } else {
            completed * 100 / total
        };
        tracing::info!(
            label = %self.label,
            completed,
            total,
            percent,
            "Progress"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_throttle_window() {
        let reporter = LogProgressReporter::new("fetch", Duration::from_millis(100));
        let start = Instant::now();

        assert!(reporter.should_emit(1, 10, start));
        assert!(!reporter.should_emit(2, 10, start + Duration::from_millis(50)));
        assert!(reporter.should_emit(3, 10, start + Duration::from_millis(150)));
        assert!(!reporter.should_emit(4, 10, start + Duration::from_millis(160)));
        // completion always renders
        assert!(reporter.should_emit(10, 10, start + Duration::from_millis(170)));
    }

    #[test]
    fn test_closure_is_reporter() {
        let seen = Mutex::new(Vec::new());
        let reporter = |done: usize, total: usize| seen.lock().push((done, total));
        reporter.report(1, 2);
        ProgressReporter::report(&reporter, 2, 2);
        assert_eq!(*seen.lock(), vec![(1, 2), (2, 2)]);
    }
}
