//! Chunking and timeout helpers shared by the coalescer and the executor.

use std::future::Future;
use std::time::Duration;

use crate::error::{Result, SyncError};

/// Size of each chunk when `total` items are split across `limit` slots: `ceil(total / limit)`.
///
/// Returns at least 1 so that slicing never divides by zero; `limit` of 0 is treated as 1.
pub fn chunk_size(total: usize, limit: usize) -> usize {
    total.div_ceil(limit.max(1)).max(1)
}

/// Contiguous, non-overlapping index ranges of at most `size` elements covering `0..total`.
pub fn chunk_ranges(total: usize, size: usize) -> impl Iterator<Item = std::ops::Range<usize>> {
    let size = size.max(1);
    (0..total)
        .step_by(size)
        .map(move |start| start..(start + size).min(total))
}

/// Race `future` against `limit`. On expiry the future is dropped, which stops it at its
/// current suspension point, and `SyncError::Timeout` is returned.
///
/// The outer `Result` only ever carries the timeout, so a fallible future yields a nested
/// `Result` and its own errors stay distinguishable from the deadline.
pub async fn with_timeout<F: Future>(limit: Duration, future: F) -> Result<F::Output> {
    tokio::time::timeout(limit, future)
        .await
        .map_err(|_| SyncError::Timeout(limit))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_size() {
        assert_eq!(chunk_size(5, 2), 3);
        assert_eq!(chunk_size(450, 200), 3);
        assert_eq!(chunk_size(10, 10), 1);
        assert_eq!(chunk_size(3, 10), 1);
        assert_eq!(chunk_size(0, 4), 1);
        assert_eq!(chunk_size(7, 0), 7);
    }

    #[test]
    fn test_chunk_ranges_cover_input() {
        let ranges: Vec<_> = chunk_ranges(450, 200).collect();
        assert_eq!(ranges, vec![0..200, 200..400, 400..450]);
        assert_eq!(chunk_ranges(0, 200).count(), 0);
        assert_eq!(chunk_ranges(200, 200).collect::<Vec<_>>(), vec![0..200]);
    }

    #[tokio::test]
    async fn test_with_timeout() {
        let fast = with_timeout(Duration::from_millis(200), async { 7 }).await;
        assert_eq!(fast.unwrap(), 7);

        let inner_err = with_timeout(Duration::from_millis(200), async {
            Err::<(), _>(SyncError::Timeout(Duration::from_secs(1)))
        })
        .await;
        assert!(matches!(inner_err, Ok(Err(SyncError::Timeout(_)))));

        let slow = with_timeout(Duration::from_millis(20), std::future::pending::<()>()).await;
        assert!(matches!(slow, Err(SyncError::Timeout(d)) if d == Duration::from_millis(20)));
    }
}
