//! Range-read engine
//!
//! Turns a batch of requested byte ranges into as few backend fetches as
//! possible. Ranges separated by at most `coalesce_threshold` bytes are
//! merged into one fetch; the fetched buffers are then cut back into the
//! requested pieces with zero-copy slicing. Fetches run with bounded
//! concurrency and results come back in request order.

use crate::backend::{BackendAdapter, FetchRequest};
use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::path::ObjectPath;
use crate::types::{Buffer, ByteRange};
use futures::stream::{self, StreamExt, TryStreamExt};
use std::ops::Range;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::debug;

/// Merge sorted-by-start ranges whose gap is at most `threshold`
///
/// The input need not be sorted. Overlapping and adjacent ranges always
/// merge. The output is sorted and non-overlapping.
pub fn coalesce_ranges(ranges: &[Range<u64>], threshold: u64) -> Vec<Range<u64>> {
    let mut sorted: Vec<Range<u64>> = ranges.to_vec();
    sorted.sort_unstable_by_key(|r| r.start);

    let mut merged: Vec<Range<u64>> = Vec::with_capacity(sorted.len());
    for range in sorted {
        match merged.last_mut() {
            Some(current) if range.start <= current.end.saturating_add(threshold) => {
                current.end = current.end.max(range.end);
            }
            _ => merged.push(range),
        }
    }
    merged
}

/// Fetches byte ranges through a backend adapter
#[derive(Debug, Clone)]
pub struct RangeReader {
    adapter: Arc<dyn BackendAdapter>,
    coalesce_threshold: u64,
    max_concurrency: usize,
    permits: Arc<Semaphore>,
}

impl RangeReader {
    /// Create a reader using the store's coalescing and concurrency settings
    pub fn new(adapter: Arc<dyn BackendAdapter>, config: &StoreConfig) -> Self {
        let max_concurrency = config.max_range_concurrency.max(1);
        Self {
            adapter,
            coalesce_threshold: config.coalesce_threshold,
            max_concurrency,
            permits: Arc::new(Semaphore::new(max_concurrency)),
        }
    }

    /// Fetch a single range
    ///
    /// An end past the object is clamped, so the buffer may be shorter than
    /// requested. A start at or after the end of the object fails.
    pub async fn get_range(&self, path: &ObjectPath, range: Range<u64>) -> StoreResult<Buffer> {
        validate(path, &range)?;
        let (_, buffer) = self.fetch(path, range).await?;
        Ok(buffer)
    }

    /// Fetch many ranges, coalescing nearby ones
    ///
    /// Returns exactly one buffer per requested range, in request order.
    pub async fn get_ranges(
        &self,
        path: &ObjectPath,
        ranges: &[Range<u64>],
    ) -> StoreResult<Vec<Buffer>> {
        if ranges.is_empty() {
            return Ok(Vec::new());
        }
        for range in ranges {
            validate(path, range)?;
        }

        let merged = coalesce_ranges(ranges, self.coalesce_threshold);
        debug!(
            path = %path,
            requested = ranges.len(),
            fetches = merged.len(),
            "coalesced range requests"
        );

        let fetched: Vec<(Range<u64>, Buffer)> = stream::iter(merged.iter().cloned())
            .map(|range| self.fetch(path, range))
            .buffered(self.max_concurrency)
            .try_collect()
            .await?;

        ranges
            .iter()
            .map(|requested| {
                // Last merged range starting at or before the request contains it
                let idx = merged.partition_point(|m| m.start <= requested.start) - 1;
                let (served, buffer) = &fetched[idx];
                slice(path, requested, served, buffer)
            })
            .collect()
    }

    /// One backend fetch, holding a concurrency slot for its duration
    async fn fetch(&self, path: &ObjectPath, range: Range<u64>) -> StoreResult<(Range<u64>, Buffer)> {
        let _permit = self.permits.acquire().await.map_err(|e| {
            StoreError::backend(self.adapter.name(), "SemaphoreClosed", e.to_string())
        })?;

        let response = self
            .adapter
            .fetch(path, FetchRequest::range(ByteRange::Bounded(range)))
            .await?;
        let served = response.range.clone();
        let buffer = response.collect().await?;

        // A body shorter than advertised shrinks the served range
        let served = served.start..served.start + buffer.len() as u64;
        Ok((served, buffer))
    }
}

fn validate(path: &ObjectPath, range: &Range<u64>) -> StoreResult<()> {
    if range.end <= range.start {
        return Err(StoreError::InvalidRange {
            path: path.to_string(),
            reason: format!("range {}..{} is empty or reversed", range.start, range.end),
        });
    }
    Ok(())
}

fn slice(
    path: &ObjectPath,
    requested: &Range<u64>,
    served: &Range<u64>,
    buffer: &Buffer,
) -> StoreResult<Buffer> {
    if requested.start >= served.end {
        return Err(StoreError::InvalidRange {
            path: path.to_string(),
            reason: format!(
                "range start {} is not before object end {}",
                requested.start, served.end
            ),
        });
    }

    let start = (requested.start - served.start) as usize;
    let end = (requested.end.min(served.end) - served.start) as usize;
    Ok(buffer.slice(start..end))
}
