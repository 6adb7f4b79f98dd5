//! Shared test helpers: an instrumented adapter over the in-memory backend
//!
//! Counts every adapter call, tracks high-water marks of concurrent range
//! fetches and part uploads, and can inject delays and failures.

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use storekit::backend::{
    AdapterCapabilities, BackendAdapter, FetchRequest, FetchResponse, ListRequest, MemoryAdapter,
};
use storekit::{
    Attributes, Buffer, ListPage, ObjectPath, PartToken, PutMode, PutResult, StoreError,
    StoreResult, TagSet,
};

/// Call counters and concurrency high-water marks
#[derive(Debug, Default)]
pub struct Counters {
    pub fetch: AtomicUsize,
    pub upload_full: AtomicUsize,
    pub upload_full_bytes: AtomicUsize,
    pub create_multipart: AtomicUsize,
    pub upload_part: AtomicUsize,
    pub complete_multipart: AtomicUsize,
    pub abort_multipart: AtomicUsize,
    pub list_page: AtomicUsize,
    pub copy: AtomicUsize,
    pub rename: AtomicUsize,
    pub delete: AtomicUsize,

    in_flight_fetch: AtomicUsize,
    pub max_in_flight_fetch: AtomicUsize,
    in_flight_parts: AtomicUsize,
    pub max_in_flight_parts: AtomicUsize,
}

impl Counters {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

/// Decrements an in-flight gauge when dropped
struct InFlight<'a> {
    gauge: &'a AtomicUsize,
}

impl<'a> InFlight<'a> {
    fn enter(gauge: &'a AtomicUsize, high_water: &AtomicUsize) -> Self {
        let now = gauge.fetch_add(1, Ordering::SeqCst) + 1;
        high_water.fetch_max(now, Ordering::SeqCst);
        Self { gauge }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.gauge.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Memory adapter wrapper with counters and fault injection
#[derive(Debug, Clone)]
pub struct InstrumentedAdapter {
    pub inner: MemoryAdapter,
    pub counters: Arc<Counters>,
    parts: Arc<Mutex<Vec<(u32, usize)>>>,
    fail_part: Option<u32>,
    fail_abort: bool,
    fail_list_page: Option<usize>,
    fetch_delay: Duration,
    part_delay: Duration,
}

impl InstrumentedAdapter {
    pub fn new() -> Self {
        Self::wrap(MemoryAdapter::new())
    }

    pub fn wrap(inner: MemoryAdapter) -> Self {
        storekit::logging::init_test_logging();
        Self {
            inner,
            counters: Arc::new(Counters::default()),
            parts: Arc::new(Mutex::new(Vec::new())),
            fail_part: None,
            fail_abort: false,
            fail_list_page: None,
            fetch_delay: Duration::ZERO,
            part_delay: Duration::ZERO,
        }
    }

    /// Reject the upload of this part index
    pub fn failing_part(mut self, index: u32) -> Self {
        self.fail_part = Some(index);
        self
    }

    /// Make abort_multipart fail
    pub fn failing_abort(mut self) -> Self {
        self.fail_abort = true;
        self
    }

    /// Fail the n-th (zero-based) list_page call
    pub fn failing_list_page(mut self, call: usize) -> Self {
        self.fail_list_page = Some(call);
        self
    }

    pub fn with_fetch_delay(mut self, delay: Duration) -> Self {
        self.fetch_delay = delay;
        self
    }

    pub fn with_part_delay(mut self, delay: Duration) -> Self {
        self.part_delay = delay;
        self
    }

    /// Part indices in the order upload_part was called
    pub fn part_indices(&self) -> Vec<u32> {
        self.parts.lock().unwrap().iter().map(|(index, _)| *index).collect()
    }

    /// Sizes of the uploaded parts, ordered by part index
    pub fn part_sizes(&self) -> Vec<usize> {
        let mut parts = self.parts.lock().unwrap().clone();
        parts.sort_unstable();
        parts.into_iter().map(|(_, size)| size).collect()
    }

    pub fn count(&self, pick: impl Fn(&Counters) -> &AtomicUsize) -> usize {
        Counters::get(pick(&self.counters))
    }

    /// Seed an object without touching the counters
    pub async fn seed(&self, path: &str, data: impl Into<Buffer>) {
        self.inner
            .upload_full(
                &ObjectPath::parse(path).unwrap(),
                data.into(),
                &PutMode::Overwrite,
                &Attributes::new(),
                &TagSet::new(),
            )
            .await
            .unwrap();
    }
}

#[async_trait]
impl BackendAdapter for InstrumentedAdapter {
    fn name(&self) -> &str {
        "instrumented"
    }

    fn capabilities(&self) -> AdapterCapabilities {
        self.inner.capabilities()
    }

    async fn fetch(&self, path: &ObjectPath, request: FetchRequest) -> StoreResult<FetchResponse> {
        // Head requests are bookkeeping, not range traffic
        if request.head {
            return self.inner.fetch(path, request).await;
        }

        self.counters.fetch.fetch_add(1, Ordering::SeqCst);
        let _guard = InFlight::enter(
            &self.counters.in_flight_fetch,
            &self.counters.max_in_flight_fetch,
        );
        if !self.fetch_delay.is_zero() {
            tokio::time::sleep(self.fetch_delay).await;
        }
        self.inner.fetch(path, request).await
    }

    async fn upload_full(
        &self,
        path: &ObjectPath,
        bytes: Buffer,
        mode: &PutMode,
        attributes: &Attributes,
        tags: &TagSet,
    ) -> StoreResult<PutResult> {
        self.counters.upload_full.fetch_add(1, Ordering::SeqCst);
        self.counters
            .upload_full_bytes
            .fetch_add(bytes.len(), Ordering::SeqCst);
        self.inner
            .upload_full(path, bytes, mode, attributes, tags)
            .await
    }

    async fn create_multipart(
        &self,
        path: &ObjectPath,
        attributes: &Attributes,
        tags: &TagSet,
    ) -> StoreResult<String> {
        self.counters.create_multipart.fetch_add(1, Ordering::SeqCst);
        self.inner.create_multipart(path, attributes, tags).await
    }

    async fn upload_part(
        &self,
        path: &ObjectPath,
        upload_id: &str,
        index: u32,
        bytes: Buffer,
    ) -> StoreResult<PartToken> {
        self.counters.upload_part.fetch_add(1, Ordering::SeqCst);
        self.parts.lock().unwrap().push((index, bytes.len()));
        let _guard = InFlight::enter(
            &self.counters.in_flight_parts,
            &self.counters.max_in_flight_parts,
        );
        if !self.part_delay.is_zero() {
            tokio::time::sleep(self.part_delay).await;
        }
        if self.fail_part == Some(index) {
            return Err(StoreError::backend(
                "instrumented",
                "PartRejected",
                format!("part {} rejected", index),
            ));
        }
        self.inner.upload_part(path, upload_id, index, bytes).await
    }

    async fn complete_multipart(
        &self,
        path: &ObjectPath,
        upload_id: &str,
        parts: Vec<PartToken>,
    ) -> StoreResult<PutResult> {
        self.counters
            .complete_multipart
            .fetch_add(1, Ordering::SeqCst);
        self.inner.complete_multipart(path, upload_id, parts).await
    }

    async fn abort_multipart(&self, path: &ObjectPath, upload_id: &str) -> StoreResult<()> {
        self.counters.abort_multipart.fetch_add(1, Ordering::SeqCst);
        if self.fail_abort {
            return Err(StoreError::backend(
                "instrumented",
                "AbortFailed",
                "abort rejected",
            ));
        }
        self.inner.abort_multipart(path, upload_id).await
    }

    async fn list_page(&self, request: ListRequest) -> StoreResult<ListPage> {
        let call = self.counters.list_page.fetch_add(1, Ordering::SeqCst);
        if self.fail_list_page == Some(call) {
            return Err(StoreError::backend(
                "instrumented",
                "ListFailed",
                "listing interrupted",
            ));
        }
        self.inner.list_page(request).await
    }

    async fn copy(&self, from: &ObjectPath, to: &ObjectPath, overwrite: bool) -> StoreResult<()> {
        self.counters.copy.fetch_add(1, Ordering::SeqCst);
        self.inner.copy(from, to, overwrite).await
    }

    async fn rename(&self, from: &ObjectPath, to: &ObjectPath, overwrite: bool) -> StoreResult<()> {
        self.counters.rename.fetch_add(1, Ordering::SeqCst);
        self.inner.rename(from, to, overwrite).await
    }

    async fn delete(&self, path: &ObjectPath) -> StoreResult<()> {
        self.counters.delete.fetch_add(1, Ordering::SeqCst);
        self.inner.delete(path).await
    }
}

/// Deterministic non-repeating test content
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

pub fn p(path: &str) -> ObjectPath {
    ObjectPath::parse(path).unwrap()
}

/// Poll `check` until it holds or a second passes
pub async fn eventually(check: impl Fn() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
