//! Blocking facade over the async capabilities
//!
//! [`Blocking`] owns a multi-thread tokio runtime and drives the same async
//! engines to completion on the calling thread, so synchronous callers get
//! identical semantics and concurrency caps. Part uploads still run on the
//! runtime's worker threads.
//!
//! Calling into the facade from inside an async context panics, as with any
//! `Runtime::block_on`.

use crate::error::StoreResult;
use crate::get::{BufferStream, GetResult};
use crate::list::ListPager;
use crate::path::ObjectPath;
use crate::put::{PutOptions, PutPayload};
use crate::store::{
    CopyObject, Delete, Get, GetRange, GetRanges, Head, List, Put, RangeEnd, RangeEnds, Rename,
};
use crate::types::{Attributes, Buffer, GetOptions, ObjectMeta, PutResult};
use futures::StreamExt;
use std::future::Future;
use std::ops::Range;
use std::sync::Arc;
use tokio::runtime::Runtime;

/// Synchronous wrapper around a store
#[derive(Debug, Clone)]
pub struct Blocking<S> {
    inner: S,
    runtime: Arc<Runtime>,
}

impl<S> Blocking<S> {
    /// Wrap `inner` with a dedicated multi-thread runtime
    pub fn new(inner: S) -> StoreResult<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("storekit-blocking")
            .build()?;
        Ok(Self::with_runtime(inner, Arc::new(runtime)))
    }

    /// Wrap `inner` with an existing runtime
    pub fn with_runtime(inner: S, runtime: Arc<Runtime>) -> Self {
        Self { inner, runtime }
    }

    /// Wrapped async store
    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }
}

impl<S: Head> Blocking<S> {
    /// Metadata for `path`
    pub fn head(&self, path: &ObjectPath) -> StoreResult<ObjectMeta> {
        self.block_on(self.inner.head(path))
    }
}

impl<S: Get> Blocking<S> {
    /// Fetch the whole object
    pub fn get(&self, path: &ObjectPath) -> StoreResult<BlockingGetResult> {
        self.get_opts(path, GetOptions::default())
    }

    /// Fetch with options
    pub fn get_opts(&self, path: &ObjectPath, options: GetOptions) -> StoreResult<BlockingGetResult> {
        let inner = self.block_on(self.inner.get_opts(path, options))?;
        Ok(BlockingGetResult {
            inner,
            runtime: Arc::clone(&self.runtime),
        })
    }
}

impl<S: GetRange> Blocking<S> {
    /// Bytes `start..end` of the object
    pub fn get_range(&self, path: &ObjectPath, start: u64, end: RangeEnd) -> StoreResult<Buffer> {
        self.block_on(self.inner.get_range(path, start, end))
    }
}

impl<S: GetRanges> Blocking<S> {
    /// One buffer per requested range, in request order
    pub fn get_ranges(
        &self,
        path: &ObjectPath,
        starts: &[u64],
        ends: RangeEnds<'_>,
    ) -> StoreResult<Vec<Buffer>> {
        self.block_on(self.inner.get_ranges(path, starts, ends))
    }
}

impl<S: Put> Blocking<S> {
    /// Persist `payload` at `path`
    pub fn put(
        &self,
        path: &ObjectPath,
        payload: PutPayload,
        options: PutOptions,
    ) -> StoreResult<PutResult> {
        self.block_on(self.inner.put(path, payload, options))
    }

    /// Persist the buffers yielded by a sync iterator
    pub fn put_iter<I>(&self, path: &ObjectPath, iter: I, options: PutOptions) -> StoreResult<PutResult>
    where
        I: IntoIterator<Item = Buffer>,
        I::IntoIter: Send + 'static,
    {
        self.put(path, PutPayload::from_iter(iter), options)
    }

    /// Persist the contents of an open file
    pub fn put_file(
        &self,
        path: &ObjectPath,
        file: std::fs::File,
        options: PutOptions,
    ) -> StoreResult<PutResult> {
        // tokio::fs::File::from_std needs a runtime context
        let payload = {
            let _guard = self.runtime.enter();
            PutPayload::from_std_file(file)?
        };
        self.put(path, payload, options)
    }
}

impl<S: List> Blocking<S> {
    /// Pager over everything under `prefix`
    pub fn list(&self, prefix: Option<&str>) -> StoreResult<BlockingListPager> {
        self.list_with_offset(prefix, None, None)
    }

    /// Pager resuming strictly after `offset`
    pub fn list_with_offset(
        &self,
        prefix: Option<&str>,
        offset: Option<&str>,
        chunk_size: Option<usize>,
    ) -> StoreResult<BlockingListPager> {
        let pager = self.inner.list_with_offset(prefix, offset, chunk_size)?;
        Ok(BlockingListPager {
            pager,
            runtime: Arc::clone(&self.runtime),
        })
    }
}

impl<S: CopyObject> Blocking<S> {
    /// Copy `from` to `to`
    pub fn copy(&self, from: &ObjectPath, to: &ObjectPath, overwrite: bool) -> StoreResult<()> {
        self.block_on(self.inner.copy(from, to, overwrite))
    }
}

impl<S: Rename> Blocking<S> {
    /// Move `from` to `to`
    pub fn rename(&self, from: &ObjectPath, to: &ObjectPath, overwrite: bool) -> StoreResult<()> {
        self.block_on(self.inner.rename(from, to, overwrite))
    }
}

impl<S: Delete> Blocking<S> {
    /// Remove `path`
    pub fn delete(&self, path: &ObjectPath) -> StoreResult<()> {
        self.block_on(self.inner.delete(path))
    }
}

/// Synchronous view of a [`GetResult`]
#[derive(Debug)]
pub struct BlockingGetResult {
    inner: GetResult,
    runtime: Arc<Runtime>,
}

impl BlockingGetResult {
    /// Object metadata; fails once consumption started
    pub fn meta(&self) -> StoreResult<&ObjectMeta> {
        self.inner.meta()
    }

    /// Served range; fails once consumption started
    pub fn range(&self) -> StoreResult<Range<u64>> {
        self.inner.range()
    }

    /// Attributes; fails once consumption started
    pub fn attributes(&self) -> StoreResult<&Attributes> {
        self.inner.attributes()
    }

    /// Read the whole body
    pub fn bytes(&mut self) -> StoreResult<Buffer> {
        self.runtime.block_on(self.inner.bytes())
    }

    /// Iterate the body in default-sized chunks
    pub fn chunks(&mut self) -> StoreResult<BlockingChunks> {
        let stream = self.inner.stream()?;
        Ok(BlockingChunks {
            stream,
            runtime: Arc::clone(&self.runtime),
        })
    }

    /// Iterate the body in chunks of at least `min_chunk_size` bytes
    pub fn chunks_with(&mut self, min_chunk_size: usize) -> StoreResult<BlockingChunks> {
        let stream = self.inner.stream_chunked(min_chunk_size)?;
        Ok(BlockingChunks {
            stream,
            runtime: Arc::clone(&self.runtime),
        })
    }
}

/// Iterator over body chunks
#[derive(Debug)]
pub struct BlockingChunks {
    stream: BufferStream,
    runtime: Arc<Runtime>,
}

impl Iterator for BlockingChunks {
    type Item = StoreResult<Buffer>;

    fn next(&mut self) -> Option<Self::Item> {
        self.runtime.block_on(self.stream.next())
    }
}

/// Iterator over listing chunks
#[derive(Debug)]
pub struct BlockingListPager {
    pager: ListPager,
    runtime: Arc<Runtime>,
}

impl BlockingListPager {
    /// Drain the remaining listing into one vector
    pub fn collect_all(self) -> StoreResult<Vec<ObjectMeta>> {
        self.runtime.block_on(self.pager.collect())
    }

    /// True once the first page was requested
    pub fn has_started(&self) -> bool {
        self.pager.has_started()
    }
}

impl Iterator for BlockingListPager {
    type Item = StoreResult<Vec<ObjectMeta>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.runtime.block_on(self.pager.next_chunk()).transpose()
    }
}
