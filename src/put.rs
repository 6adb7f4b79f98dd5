//! Put engine: single-shot writes and concurrent multipart uploads
//!
//! A payload is written either with one atomic `upload_full` call or as a
//! multipart session. Multipart parts are exactly `chunk_size` bytes (the
//! last may be shorter), numbered from zero, and uploaded by spawned tasks
//! with at most `max_concurrency` in flight. The object becomes visible only
//! when `complete_multipart` succeeds; any failure aborts the session.

use crate::backend::BackendAdapter;
use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::path::ObjectPath;
use crate::types::{Attributes, Buffer, PartToken, PutResult, TagSet, UploadPart};
use bytes::BytesMut;
use futures::stream::{BoxStream, FuturesUnordered, Stream, StreamExt};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use storekit_core_precondition::{evaluate_put, Destination, PutMode};
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, info, warn};

/// Source of bytes for a put
pub enum PutPayload {
    /// In-memory buffer
    Bytes(Buffer),

    /// Seekable file with a known size
    File { file: tokio::fs::File, size: u64 },

    /// Async pull-based sequence of buffers
    Stream(BoxStream<'static, StoreResult<Buffer>>),

    /// Sync pull-based sequence of buffers
    Iter(Box<dyn Iterator<Item = Buffer> + Send>),

    /// Push-based sequence fed through [`PutPayload::channel`]
    Channel(mpsc::Receiver<Buffer>),
}

impl PutPayload {
    /// Open a file as a payload
    pub async fn from_path(path: impl AsRef<Path>) -> StoreResult<Self> {
        let file = tokio::fs::File::open(path.as_ref()).await?;
        let size = file.metadata().await?.len();
        Ok(PutPayload::File { file, size })
    }

    /// Wrap an already opened std file
    pub fn from_std_file(file: std::fs::File) -> StoreResult<Self> {
        let size = file.metadata()?.len();
        Ok(PutPayload::File {
            file: tokio::fs::File::from_std(file),
            size,
        })
    }

    /// Wrap an async stream of buffers
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: Stream<Item = StoreResult<Buffer>> + Send + 'static,
    {
        PutPayload::Stream(stream.boxed())
    }

    /// Wrap a sync iterator of buffers
    pub fn from_iter<I>(iter: I) -> Self
    where
        I: IntoIterator<Item = Buffer>,
        I::IntoIter: Send + 'static,
    {
        PutPayload::Iter(Box::new(iter.into_iter()))
    }

    /// Push-based payload; the put finishes once every sender is dropped
    pub fn channel(capacity: usize) -> (mpsc::Sender<Buffer>, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (tx, PutPayload::Channel(rx))
    }

    /// Size known before reading, if any
    pub fn known_size(&self) -> Option<u64> {
        match self {
            PutPayload::Bytes(b) => Some(b.len() as u64),
            PutPayload::File { size, .. } => Some(*size),
            _ => None,
        }
    }
}

impl From<Buffer> for PutPayload {
    fn from(buffer: Buffer) -> Self {
        PutPayload::Bytes(buffer)
    }
}

impl From<Vec<u8>> for PutPayload {
    fn from(data: Vec<u8>) -> Self {
        PutPayload::Bytes(Buffer::from(data))
    }
}

impl From<&'static [u8]> for PutPayload {
    fn from(data: &'static [u8]) -> Self {
        PutPayload::Bytes(Buffer::from_static(data))
    }
}

impl From<String> for PutPayload {
    fn from(data: String) -> Self {
        PutPayload::Bytes(Buffer::from(data))
    }
}

impl From<&'static str> for PutPayload {
    fn from(data: &'static str) -> Self {
        PutPayload::Bytes(Buffer::from_static(data.as_bytes()))
    }
}

impl fmt::Debug for PutPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PutPayload::Bytes(b) => write!(f, "PutPayload::Bytes({} bytes)", b.len()),
            PutPayload::File { size, .. } => write!(f, "PutPayload::File({} bytes)", size),
            PutPayload::Stream(_) => f.write_str("PutPayload::Stream"),
            PutPayload::Iter(_) => f.write_str("PutPayload::Iter"),
            PutPayload::Channel(_) => f.write_str("PutPayload::Channel"),
        }
    }
}

/// Options for a put
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PutOptions {
    /// Precondition on the destination
    pub mode: PutMode,

    /// Object attributes
    pub attributes: Attributes,

    /// Object tags
    pub tags: TagSet,

    /// Force (`Some(true)`) or forbid (`Some(false)`) multipart; inferred when unset
    pub use_multipart: Option<bool>,

    /// Part size; store default when unset
    pub chunk_size: Option<usize>,

    /// Part upload concurrency; store default when unset
    pub max_concurrency: Option<usize>,
}

impl PutOptions {
    /// Create with defaults (overwrite, inferred multipart)
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the put mode
    pub fn with_mode(mut self, mode: PutMode) -> Self {
        self.mode = mode;
        self
    }

    /// Fail if the destination exists
    pub fn create(self) -> Self {
        self.with_mode(PutMode::Create)
    }

    /// Add an attribute
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Add a tag
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Force or forbid multipart
    pub fn with_multipart(mut self, use_multipart: bool) -> Self {
        self.use_multipart = Some(use_multipart);
        self
    }

    /// Set the part size
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = Some(chunk_size);
        self
    }

    /// Set the part upload concurrency
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = Some(max_concurrency);
        self
    }
}

/// Decide between single-shot and multipart
///
/// Non-overwrite modes are always single-shot so the precondition is
/// evaluated atomically with the write.
pub fn should_use_multipart(options: &PutOptions, known_size: Option<u64>, chunk_size: usize) -> bool {
    if !options.mode.is_overwrite() {
        return false;
    }
    match options.use_multipart {
        Some(flag) => flag,
        None => match known_size {
            Some(size) => size > chunk_size as u64,
            None => true,
        },
    }
}

/// Current state of `path`, for precondition evaluation
pub(crate) async fn destination_state(
    adapter: &dyn BackendAdapter,
    path: &ObjectPath,
) -> StoreResult<Destination> {
    match adapter.head(path).await {
        Ok(meta) => Ok(Destination::Present(meta.current_version())),
        Err(e) if e.is_not_found() => Ok(Destination::Absent),
        Err(e) => Err(e),
    }
}

/// Write `payload` to `path`
pub(crate) async fn put_payload(
    adapter: &Arc<dyn BackendAdapter>,
    config: &StoreConfig,
    path: &ObjectPath,
    payload: PutPayload,
    options: PutOptions,
) -> StoreResult<PutResult> {
    options
        .mode
        .validate()
        .map_err(|e| StoreError::from_precondition(e, path.as_str(), adapter.name()))?;

    let chunk_size = options.chunk_size.unwrap_or(config.multipart_chunk_size);
    let max_concurrency = options
        .max_concurrency
        .unwrap_or(config.multipart_max_concurrency);
    if chunk_size == 0 || max_concurrency == 0 {
        return Err(StoreError::InvalidConfig(
            "chunk_size and max_concurrency must be greater than zero".to_string(),
        ));
    }

    if should_use_multipart(&options, payload.known_size(), chunk_size) {
        let parts = PartChunker::new(PayloadReader::new(payload, chunk_size), chunk_size);
        put_multipart(adapter, path, parts, &options, max_concurrency).await
    } else {
        if options.use_multipart == Some(true) {
            debug!(path = %path, mode = ?options.mode, "conditional put forced to single-shot");
        }
        put_single(adapter.as_ref(), path, payload, &options, chunk_size).await
    }
}

async fn put_single(
    adapter: &dyn BackendAdapter,
    path: &ObjectPath,
    payload: PutPayload,
    options: &PutOptions,
    read_size: usize,
) -> StoreResult<PutResult> {
    // Fail before reading or sending any bytes when the outcome is already known
    if !options.mode.is_overwrite() {
        if matches!(options.mode, PutMode::Update(_)) && !adapter.capabilities().conditional_update {
            return Err(StoreError::NotSupported {
                backend: adapter.name().to_string(),
                operation: "conditional update".to_string(),
            });
        }
        let destination = destination_state(adapter, path).await?;
        evaluate_put(&options.mode, &destination)
            .map_err(|e| StoreError::from_precondition(e, path.as_str(), adapter.name()))?;
    }

    let bytes = PayloadReader::new(payload, read_size).read_all().await?;
    debug!(path = %path, size = bytes.len(), "single-shot put");
    adapter
        .upload_full(path, bytes, &options.mode, &options.attributes, &options.tags)
        .await
}

async fn put_multipart(
    adapter: &Arc<dyn BackendAdapter>,
    path: &ObjectPath,
    mut parts: PartChunker,
    options: &PutOptions,
    max_concurrency: usize,
) -> StoreResult<PutResult> {
    // The session is opened only once there is at least one part
    let first = match parts.next_part().await? {
        Some(first) => first,
        None => {
            debug!(path = %path, "empty multipart source, writing empty object");
            return adapter
                .upload_full(
                    path,
                    Buffer::new(),
                    &options.mode,
                    &options.attributes,
                    &options.tags,
                )
                .await;
        }
    };

    let upload_id = adapter
        .create_multipart(path, &options.attributes, &options.tags)
        .await?;
    let mut guard = AbortOnDrop::new(Arc::clone(adapter), path.clone(), upload_id.clone());
    debug!(path = %path, upload_id = %upload_id, max_concurrency, "multipart session created");

    let outcome = match upload_parts(adapter, path, &upload_id, first, &mut parts, max_concurrency).await {
        Ok(tokens) => {
            let count = tokens.len();
            let result = adapter.complete_multipart(path, &upload_id, tokens).await;
            if result.is_ok() {
                info!(path = %path, upload_id = %upload_id, parts = count, "multipart upload complete");
            }
            result
        }
        Err(e) => Err(e),
    };

    guard.disarm();
    match outcome {
        Ok(result) => Ok(result),
        Err(primary) => Err(abort_after_failure(adapter.as_ref(), path, &upload_id, primary).await),
    }
}

/// Upload every part, keeping at most `max_concurrency` in flight
///
/// Returns the acknowledged tokens in index order.
async fn upload_parts(
    adapter: &Arc<dyn BackendAdapter>,
    path: &ObjectPath,
    upload_id: &str,
    first: Buffer,
    parts: &mut PartChunker,
    max_concurrency: usize,
) -> StoreResult<Vec<PartToken>> {
    let mut in_flight = PartTasks::default();
    let mut completed: Vec<PartToken> = Vec::new();
    let mut next_index: u32 = 0;
    let mut pending = Some(first);
    let mut source_done = false;

    loop {
        if source_done || in_flight.0.len() >= max_concurrency {
            match in_flight.0.next().await {
                Some(joined) => completed.push(joined_part(joined, path, upload_id)?),
                None => break,
            }
            continue;
        }

        let next = match pending.take() {
            Some(buffer) => Some(buffer),
            None if in_flight.0.is_empty() => parts.next_part().await?,
            // An idle source must not hide a part that already failed
            None => tokio::select! {
                Some(joined) = in_flight.0.next() => {
                    completed.push(joined_part(joined, path, upload_id)?);
                    continue;
                }
                next = parts.next_part() => next?,
            },
        };

        match next {
            Some(buffer) => {
                in_flight.0.push(spawn_part(
                    Arc::clone(adapter),
                    path.clone(),
                    upload_id.to_string(),
                    UploadPart {
                        index: next_index,
                        buffer,
                    },
                ));
                next_index += 1;
            }
            None => source_done = true,
        }
    }

    completed.sort_by_key(|p| p.index);
    Ok(completed)
}

/// Part upload tasks still running; dropping the set cancels them
#[derive(Default)]
struct PartTasks(FuturesUnordered<JoinHandle<StoreResult<PartToken>>>);

impl Drop for PartTasks {
    fn drop(&mut self) {
        for task in self.0.iter() {
            task.abort();
        }
    }
}

/// The task owns the part until the backend acknowledges it
fn spawn_part(
    adapter: Arc<dyn BackendAdapter>,
    path: ObjectPath,
    upload_id: String,
    part: UploadPart,
) -> JoinHandle<StoreResult<PartToken>> {
    tokio::spawn(async move {
        debug!(upload_id = %upload_id, index = part.index, size = part.buffer.len(), "uploading part");
        adapter
            .upload_part(&path, &upload_id, part.index, part.buffer)
            .await
    })
}

fn joined_part(
    joined: Result<StoreResult<PartToken>, JoinError>,
    path: &ObjectPath,
    upload_id: &str,
) -> StoreResult<PartToken> {
    match joined {
        Ok(result) => result,
        Err(e) if e.is_cancelled() => Err(StoreError::Aborted {
            path: path.to_string(),
            upload_id: upload_id.to_string(),
            reason: "part upload task cancelled".to_string(),
        }),
        Err(e) => Err(StoreError::backend("runtime", "TaskFailed", e.to_string())),
    }
}

/// Best-effort abort that keeps `primary` as the reported failure
async fn abort_after_failure(
    adapter: &dyn BackendAdapter,
    path: &ObjectPath,
    upload_id: &str,
    primary: StoreError,
) -> StoreError {
    warn!(path = %path, upload_id, error = %primary, "multipart upload failed, aborting session");
    match adapter.abort_multipart(path, upload_id).await {
        Ok(()) => primary,
        Err(cleanup) => {
            warn!(path = %path, upload_id, error = %cleanup, "multipart abort failed");
            primary.with_cleanup_failure(cleanup)
        }
    }
}

/// Aborts the session if the put future is dropped before finishing
struct AbortOnDrop {
    adapter: Arc<dyn BackendAdapter>,
    path: ObjectPath,
    upload_id: String,
    armed: bool,
}

impl AbortOnDrop {
    fn new(adapter: Arc<dyn BackendAdapter>, path: ObjectPath, upload_id: String) -> Self {
        Self {
            adapter,
            path,
            upload_id,
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        let upload_id = std::mem::take(&mut self.upload_id);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let adapter = Arc::clone(&self.adapter);
                let path = self.path.clone();
                warn!(path = %path, upload_id = %upload_id, "multipart put abandoned, aborting session");
                handle.spawn(async move {
                    if let Err(e) = adapter.abort_multipart(&path, &upload_id).await {
                        warn!(path = %path, upload_id = %upload_id, error = %e, "multipart abort failed");
                    }
                });
            }
            Err(_) => {
                warn!(
                    path = %self.path,
                    upload_id = %upload_id,
                    "multipart put abandoned outside a runtime, session left to backend expiry"
                );
            }
        }
    }
}

/// Uniform pull interface over every payload kind
struct PayloadReader {
    payload: Option<PutPayload>,
    read_size: usize,
    file_buf: BytesMut,
}

impl PayloadReader {
    fn new(payload: PutPayload, read_size: usize) -> Self {
        Self {
            payload: Some(payload),
            read_size: read_size.max(1),
            file_buf: BytesMut::new(),
        }
    }

    async fn next_buffer(&mut self) -> StoreResult<Option<Buffer>> {
        let next = match self.payload.as_mut() {
            None => return Ok(None),
            Some(PutPayload::Bytes(buffer)) => Some(std::mem::take(buffer)),
            Some(PutPayload::File { file, .. }) => {
                // Partial reads stay in `file_buf` if this future is dropped
                while self.file_buf.len() < self.read_size {
                    self.file_buf.reserve(self.read_size - self.file_buf.len());
                    if file.read_buf(&mut self.file_buf).await? == 0 {
                        break;
                    }
                }
                Some(self.file_buf.split().freeze()).filter(|b| !b.is_empty())
            }
            Some(PutPayload::Stream(stream)) => stream.next().await.transpose()?,
            Some(PutPayload::Iter(iter)) => iter.next(),
            Some(PutPayload::Channel(rx)) => rx.recv().await,
        };

        // One-shot and exhausted sources are not polled again
        if next.is_none() || matches!(self.payload, Some(PutPayload::Bytes(_))) {
            self.payload = None;
        }
        Ok(next)
    }

    /// Read everything into one buffer; a single piece is returned uncopied
    async fn read_all(mut self) -> StoreResult<Buffer> {
        let first = match self.next_buffer().await? {
            Some(first) => first,
            None => return Ok(Buffer::new()),
        };
        let mut combined = match self.next_buffer().await? {
            Some(second) => {
                let mut combined = BytesMut::with_capacity(first.len() + second.len());
                combined.extend_from_slice(&first);
                combined.extend_from_slice(&second);
                combined
            }
            None => return Ok(first),
        };
        while let Some(next) = self.next_buffer().await? {
            combined.extend_from_slice(&next);
        }
        Ok(combined.freeze())
    }
}

/// Regroups source buffers into parts of exactly `chunk_size` bytes
///
/// Source buffers at least as large as the remaining part size are sliced
/// without copying; smaller ones are accumulated.
///
/// `next_part` is cancel safe: progress is kept in the chunker, so dropping
/// it mid-read loses no bytes.
struct PartChunker {
    source: PayloadReader,
    chunk_size: usize,
    carry: Buffer,
    pending: BytesMut,
}

impl PartChunker {
    fn new(source: PayloadReader, chunk_size: usize) -> Self {
        Self {
            source,
            chunk_size,
            carry: Buffer::new(),
            pending: BytesMut::new(),
        }
    }

    async fn next_part(&mut self) -> StoreResult<Option<Buffer>> {
        loop {
            if !self.carry.is_empty() {
                let need = self.chunk_size - self.pending.len();
                if self.pending.is_empty() && self.carry.len() >= need {
                    return Ok(Some(self.carry.split_to(need)));
                }
                let take = need.min(self.carry.len());
                self.pending.extend_from_slice(&self.carry.split_to(take));
                if self.pending.len() == self.chunk_size {
                    return Ok(Some(self.pending.split().freeze()));
                }
            }

            match self.source.next_buffer().await? {
                Some(buffer) => self.carry = buffer,
                None if self.pending.is_empty() => return Ok(None),
                None => return Ok(Some(self.pending.split().freeze())),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    async fn part_sizes(payload: PutPayload, chunk_size: usize) -> Vec<usize> {
        let mut chunker = PartChunker::new(PayloadReader::new(payload, chunk_size), chunk_size);
        let mut sizes = Vec::new();
        while let Some(part) = chunker.next_part().await.unwrap() {
            sizes.push(part.len());
        }
        sizes
    }

    #[test]
    fn test_multipart_decision() {
        let opts = PutOptions::new();
        assert!(!should_use_multipart(&opts, Some(5), 10));
        assert!(should_use_multipart(&opts, Some(11), 10));
        assert!(should_use_multipart(&opts, None, 10));
        assert!(!should_use_multipart(&opts.clone().with_multipart(false), None, 10));
        assert!(should_use_multipart(&opts.clone().with_multipart(true), Some(1), 10));
        // Conditional modes never go multipart
        assert!(!should_use_multipart(&opts.create().with_multipart(true), None, 10));
    }

    #[tokio::test]
    async fn test_chunker_exact_parts() {
        let payload = PutPayload::from(vec![0u8; 25]);
        assert_eq!(part_sizes(payload, 10).await, vec![10, 10, 5]);
    }

    #[tokio::test]
    async fn test_chunker_accumulates_small_buffers() {
        let pieces: Vec<Buffer> = (0..7).map(|_| Buffer::from(vec![1u8; 3])).collect();
        let payload = PutPayload::from_iter(pieces);
        assert_eq!(part_sizes(payload, 4).await, vec![4, 4, 4, 4, 4, 1]);
    }

    #[tokio::test]
    async fn test_chunker_slices_without_copy() {
        let data = Buffer::from(vec![9u8; 20]);
        let base = data.as_ptr();
        let mut chunker = PartChunker::new(PayloadReader::new(data.into(), 8), 8);
        let first = chunker.next_part().await.unwrap().unwrap();
        let second = chunker.next_part().await.unwrap().unwrap();
        assert_eq!(first.as_ptr(), base);
        assert_eq!(second.as_ptr(), base.wrapping_add(8));
    }

    #[tokio::test]
    async fn test_chunker_empty_source() {
        let payload = PutPayload::from_stream(stream::empty());
        assert!(part_sizes(payload, 4).await.is_empty());
    }

    #[tokio::test]
    async fn test_channel_payload() {
        let (tx, payload) = PutPayload::channel(2);
        tokio::spawn(async move {
            for _ in 0..3 {
                tx.send(Buffer::from_static(b"abc")).await.unwrap();
            }
        });
        let all = PayloadReader::new(payload, 4).read_all().await.unwrap();
        assert_eq!(&all[..], b"abcabcabc");
    }

    #[tokio::test]
    async fn test_file_payload_reads_in_chunks() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, &[5u8; 23]).unwrap();

        let payload = PutPayload::from_path(file.path()).await.unwrap();
        assert_eq!(payload.known_size(), Some(23));
        assert_eq!(part_sizes(payload, 10).await, vec![10, 10, 3]);
    }
}
