//! Store handle and capability traits
//!
//! Each capability (head, get, ranged get, put, list, copy, rename, delete)
//! is its own trait so callers can depend on exactly what they use.
//! [`Store`] implements all of them on top of one [`BackendAdapter`];
//! [`ObjectStoreApi`] names the full set.

use crate::backend::{BackendAdapter, FetchRequest, LocalAdapter, MemoryAdapter};
use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::get::GetResult;
use crate::list::ListPager;
use crate::path::{parse_prefix, ObjectPath};
use crate::put::{self, destination_state, PutOptions, PutPayload};
use crate::range::RangeReader;
use crate::types::{Buffer, GetOptions, ObjectMeta, PutResult};
use async_trait::async_trait;
use std::ops::Range;
use std::path::PathBuf;
use std::sync::Arc;
use storekit_core_precondition::{evaluate_transfer, TransferPlan};
use tracing::debug;

/// Metadata lookup
#[async_trait]
pub trait Head {
    /// Metadata for `path` without transferring the body
    async fn head(&self, path: &ObjectPath) -> StoreResult<ObjectMeta>;
}

/// Whole-object reads
#[async_trait]
pub trait Get {
    /// Fetch the whole object unconditionally
    async fn get(&self, path: &ObjectPath) -> StoreResult<GetResult> {
        self.get_opts(path, GetOptions::default()).await
    }

    /// Fetch with conditions, a range, a version, or head-only
    async fn get_opts(&self, path: &ObjectPath, options: GetOptions) -> StoreResult<GetResult>;
}

/// End of a single requested range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeEnd {
    /// Exclusive end offset
    End(u64),

    /// Number of bytes from the start
    Length(u64),
}

impl RangeEnd {
    fn to_range(self, start: u64) -> Range<u64> {
        match self {
            RangeEnd::End(end) => start..end,
            RangeEnd::Length(len) => start..start.saturating_add(len),
        }
    }
}

/// Ends of several requested ranges, parallel to their starts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeEnds<'a> {
    /// Exclusive end offsets
    Ends(&'a [u64]),

    /// Byte counts from each start
    Lengths(&'a [u64]),
}

impl RangeEnds<'_> {
    fn len(&self) -> usize {
        match self {
            RangeEnds::Ends(v) | RangeEnds::Lengths(v) => v.len(),
        }
    }

    fn to_ranges(self, starts: &[u64]) -> StoreResult<Vec<Range<u64>>> {
        if starts.len() != self.len() {
            return Err(StoreError::InvalidConfig(format!(
                "{} range starts but {} ends/lengths",
                starts.len(),
                self.len()
            )));
        }

        Ok(match self {
            RangeEnds::Ends(ends) => starts.iter().zip(ends).map(|(&s, &e)| s..e).collect(),
            RangeEnds::Lengths(lengths) => starts
                .iter()
                .zip(lengths)
                .map(|(&s, &n)| s..s.saturating_add(n))
                .collect(),
        })
    }
}

/// Single-range reads
#[async_trait]
pub trait GetRange {
    /// Bytes `start..end` of the object; an end past the object is clamped
    async fn get_range(&self, path: &ObjectPath, start: u64, end: RangeEnd) -> StoreResult<Buffer>;
}

/// Multi-range reads
#[async_trait]
pub trait GetRanges {
    /// One buffer per requested range, in request order
    async fn get_ranges(
        &self,
        path: &ObjectPath,
        starts: &[u64],
        ends: RangeEnds<'_>,
    ) -> StoreResult<Vec<Buffer>>;
}

/// Writes
#[async_trait]
pub trait Put {
    /// Persist `payload` at `path` atomically
    async fn put(
        &self,
        path: &ObjectPath,
        payload: PutPayload,
        options: PutOptions,
    ) -> StoreResult<PutResult>;
}

/// Listings
pub trait List {
    /// Pager over everything under `prefix`, in store default chunks
    fn list(&self, prefix: Option<&str>) -> StoreResult<ListPager> {
        self.list_with_offset(prefix, None, None)
    }

    /// Pager resuming strictly after `offset`, with an optional chunk size
    fn list_with_offset(
        &self,
        prefix: Option<&str>,
        offset: Option<&str>,
        chunk_size: Option<usize>,
    ) -> StoreResult<ListPager>;
}

/// Server-side copies
#[async_trait]
pub trait CopyObject {
    /// Copy `from` to `to`; with `overwrite == false` an existing destination fails
    async fn copy(&self, from: &ObjectPath, to: &ObjectPath, overwrite: bool) -> StoreResult<()>;
}

/// Renames
#[async_trait]
pub trait Rename {
    /// Move `from` to `to`; with `overwrite == false` an existing destination fails
    async fn rename(&self, from: &ObjectPath, to: &ObjectPath, overwrite: bool) -> StoreResult<()>;
}

/// Deletes
#[async_trait]
pub trait Delete {
    /// Remove the object at `path`
    async fn delete(&self, path: &ObjectPath) -> StoreResult<()>;
}

/// Every capability together
pub trait ObjectStoreApi:
    Head + Get + GetRange + GetRanges + Put + List + CopyObject + Rename + Delete + Send + Sync
{
}

impl<T> ObjectStoreApi for T where
    T: Head + Get + GetRange + GetRanges + Put + List + CopyObject + Rename + Delete + Send + Sync
{
}

/// Handle routing operations to the engines over one backend adapter
///
/// Cloning is cheap; clones share the adapter and the range-fetch
/// concurrency budget.
#[derive(Debug, Clone)]
pub struct Store {
    adapter: Arc<dyn BackendAdapter>,
    config: Arc<StoreConfig>,
    ranges: RangeReader,
}

impl Store {
    /// Create a store with the default configuration
    pub fn new(adapter: Arc<dyn BackendAdapter>) -> Self {
        let config = StoreConfig::default();
        Self {
            ranges: RangeReader::new(Arc::clone(&adapter), &config),
            adapter,
            config: Arc::new(config),
        }
    }

    /// Create a store with a validated configuration
    pub fn with_config(adapter: Arc<dyn BackendAdapter>, config: StoreConfig) -> StoreResult<Self> {
        config.validate()?;
        Ok(Self {
            ranges: RangeReader::new(Arc::clone(&adapter), &config),
            adapter,
            config: Arc::new(config),
        })
    }

    /// In-memory store
    pub fn memory() -> Self {
        Self::new(Arc::new(MemoryAdapter::new()))
    }

    /// Store over a local directory
    pub fn local(root: impl Into<PathBuf>) -> StoreResult<Self> {
        Ok(Self::new(Arc::new(LocalAdapter::new(root)?)))
    }

    /// Backend adapter
    pub fn adapter(&self) -> &Arc<dyn BackendAdapter> {
        &self.adapter
    }

    /// Active configuration
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Plan a no-clobber transfer onto `to`
    async fn transfer_plan(&self, to: &ObjectPath, overwrite: bool) -> StoreResult<TransferPlan> {
        if overwrite {
            return Ok(TransferPlan::Replace);
        }
        let destination = destination_state(self.adapter.as_ref(), to).await?;
        evaluate_transfer(
            false,
            &destination,
            self.adapter.capabilities().atomic_copy_if_not_exists,
        )
        .map_err(|e| StoreError::from_precondition(e, to.as_str(), self.adapter.name()))
    }
}

#[async_trait]
impl Head for Store {
    #[tracing::instrument(skip(self), fields(backend = %self.adapter.name(), path = %path))]
    async fn head(&self, path: &ObjectPath) -> StoreResult<ObjectMeta> {
        self.adapter.head(path).await
    }
}

#[async_trait]
impl Get for Store {
    #[tracing::instrument(skip(self, options), fields(backend = %self.adapter.name(), path = %path))]
    async fn get_opts(&self, path: &ObjectPath, options: GetOptions) -> StoreResult<GetResult> {
        if let Some(range) = &options.range {
            range.validate(path)?;
        }

        let request = FetchRequest {
            range: options.range,
            conditions: options.conditions,
            version: options.version,
            head: options.head,
        };
        let response = self.adapter.fetch(path, request).await?;
        Ok(GetResult::new(response, self.config.stream_min_chunk_size))
    }
}

#[async_trait]
impl GetRange for Store {
    #[tracing::instrument(skip(self), fields(backend = %self.adapter.name(), path = %path))]
    async fn get_range(&self, path: &ObjectPath, start: u64, end: RangeEnd) -> StoreResult<Buffer> {
        self.ranges.get_range(path, end.to_range(start)).await
    }
}

#[async_trait]
impl GetRanges for Store {
    #[tracing::instrument(skip(self, starts, ends), fields(backend = %self.adapter.name(), path = %path, count = starts.len()))]
    async fn get_ranges(
        &self,
        path: &ObjectPath,
        starts: &[u64],
        ends: RangeEnds<'_>,
    ) -> StoreResult<Vec<Buffer>> {
        let ranges = ends.to_ranges(starts)?;
        self.ranges.get_ranges(path, &ranges).await
    }
}

#[async_trait]
impl Put for Store {
    #[tracing::instrument(skip(self, payload, options), fields(backend = %self.adapter.name(), path = %path))]
    async fn put(
        &self,
        path: &ObjectPath,
        payload: PutPayload,
        options: PutOptions,
    ) -> StoreResult<PutResult> {
        put::put_payload(&self.adapter, &self.config, path, payload, options).await
    }
}

impl List for Store {
    fn list_with_offset(
        &self,
        prefix: Option<&str>,
        offset: Option<&str>,
        chunk_size: Option<usize>,
    ) -> StoreResult<ListPager> {
        let prefix = match prefix {
            Some(raw) => Some(parse_prefix(raw)?).filter(|p| !p.is_empty()),
            None => None,
        };
        let chunk_size = chunk_size.unwrap_or(self.config.list_chunk_size);
        if chunk_size == 0 {
            return Err(StoreError::InvalidConfig(
                "list chunk_size must be greater than zero".to_string(),
            ));
        }

        Ok(ListPager::new(
            Arc::clone(&self.adapter),
            prefix,
            offset.map(str::to_string),
            chunk_size,
        ))
    }
}

#[async_trait]
impl CopyObject for Store {
    #[tracing::instrument(skip(self), fields(backend = %self.adapter.name(), from = %from, to = %to))]
    async fn copy(&self, from: &ObjectPath, to: &ObjectPath, overwrite: bool) -> StoreResult<()> {
        let plan = self.transfer_plan(to, overwrite).await?;
        self.adapter
            .copy(from, to, plan == TransferPlan::Replace)
            .await
    }
}

#[async_trait]
impl Rename for Store {
    #[tracing::instrument(skip(self), fields(backend = %self.adapter.name(), from = %from, to = %to))]
    async fn rename(&self, from: &ObjectPath, to: &ObjectPath, overwrite: bool) -> StoreResult<()> {
        let plan = self.transfer_plan(to, overwrite).await?;
        let replace = plan == TransferPlan::Replace;

        if self.adapter.capabilities().native_rename {
            return self.adapter.rename(from, to, replace).await;
        }

        // The source is not re-checked between copy and delete
        debug!("no native rename, copying then deleting source");
        self.adapter.copy(from, to, replace).await?;
        self.adapter.delete(from).await
    }
}

#[async_trait]
impl Delete for Store {
    #[tracing::instrument(skip(self), fields(backend = %self.adapter.name(), path = %path))]
    async fn delete(&self, path: &ObjectPath) -> StoreResult<()> {
        self.adapter.delete(path).await
    }
}
