//! Get results with a single consumption mode
//!
//! A [`GetResult`] can be materialized into one buffer or streamed in chunks,
//! never both. The first consuming call decides; any later consuming call or
//! metadata accessor fails with [`StoreError::Usage`].

use crate::backend::{ByteStream, FetchResponse};
use crate::backend::types::collect_stream;
use crate::error::{StoreError, StoreResult};
use crate::types::{Attributes, Buffer, ObjectMeta};
use bytes::BytesMut;
use futures::stream::{Stream, StreamExt};
use std::fmt;
use std::ops::Range;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Consumption state of a get result
enum ConsumeState {
    /// Nothing read yet; metadata still accessible
    Unconsumed(ByteStream),

    /// Materialization in progress
    Materializing,

    /// Body handed to a [`BufferStream`]
    Streaming,

    /// Fully consumed or failed
    Done,
}

impl ConsumeState {
    fn label(&self) -> &'static str {
        match self {
            ConsumeState::Unconsumed(_) => "unconsumed",
            ConsumeState::Materializing => "materializing",
            ConsumeState::Streaming => "streaming",
            ConsumeState::Done => "done",
        }
    }
}

/// Handle to a fetched object body plus its metadata
pub struct GetResult {
    meta: ObjectMeta,
    range: Range<u64>,
    attributes: Attributes,
    state: ConsumeState,
    default_chunk_size: usize,
}

impl GetResult {
    pub(crate) fn new(response: FetchResponse, default_chunk_size: usize) -> Self {
        Self {
            meta: response.meta,
            range: response.range,
            attributes: response.attributes,
            state: ConsumeState::Unconsumed(response.body),
            default_chunk_size: default_chunk_size.max(1),
        }
    }

    fn ensure_unconsumed(&self, accessor: &str) -> StoreResult<()> {
        match self.state {
            ConsumeState::Unconsumed(_) => Ok(()),
            ref other => Err(StoreError::Usage(format!(
                "{} read after consumption started (state: {})",
                accessor,
                other.label()
            ))),
        }
    }

    /// Take the body, moving to `next`; fails if already taken
    fn take_body(&mut self, next: ConsumeState) -> StoreResult<ByteStream> {
        match std::mem::replace(&mut self.state, next) {
            ConsumeState::Unconsumed(body) => Ok(body),
            previous => {
                let label = previous.label();
                self.state = previous;
                Err(StoreError::Usage(format!(
                    "get result already consumed (state: {})",
                    label
                )))
            }
        }
    }

    /// Object metadata
    pub fn meta(&self) -> StoreResult<&ObjectMeta> {
        self.ensure_unconsumed("meta")?;
        Ok(&self.meta)
    }

    /// Byte range actually served
    pub fn range(&self) -> StoreResult<Range<u64>> {
        self.ensure_unconsumed("range")?;
        Ok(self.range.clone())
    }

    /// Object attributes
    pub fn attributes(&self) -> StoreResult<&Attributes> {
        self.ensure_unconsumed("attributes")?;
        Ok(&self.attributes)
    }

    /// True until the first consuming call
    pub fn is_unconsumed(&self) -> bool {
        matches!(self.state, ConsumeState::Unconsumed(_))
    }

    /// Read the whole body into one buffer
    pub async fn bytes(&mut self) -> StoreResult<Buffer> {
        let body = self.take_body(ConsumeState::Materializing)?;
        let result = collect_stream(body).await;
        self.state = ConsumeState::Done;
        result
    }

    /// Stream the body in chunks of at least the configured default size
    pub fn stream(&mut self) -> StoreResult<BufferStream> {
        let min_chunk_size = self.default_chunk_size;
        self.stream_chunked(min_chunk_size)
    }

    /// Stream the body in chunks of at least `min_chunk_size` bytes
    ///
    /// Only the final chunk may be smaller.
    pub fn stream_chunked(&mut self, min_chunk_size: usize) -> StoreResult<BufferStream> {
        let body = self.take_body(ConsumeState::Streaming)?;
        Ok(BufferStream::new(body, min_chunk_size))
    }

    /// Consume the handle and read the whole body
    pub async fn into_bytes(mut self) -> StoreResult<Buffer> {
        self.bytes().await
    }

    /// Consume the handle and stream the body
    pub fn into_stream(mut self, min_chunk_size: usize) -> StoreResult<BufferStream> {
        self.stream_chunked(min_chunk_size)
    }
}

impl fmt::Debug for GetResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GetResult")
            .field("meta", &self.meta)
            .field("range", &self.range)
            .field("state", &self.state.label())
            .finish()
    }
}

/// Rechunks a byte stream so every chunk but the last is at least
/// `min_chunk_size` bytes
///
/// Backend chunks that are already large enough pass through without a copy.
pub struct BufferStream {
    inner: Option<ByteStream>,
    pending: BytesMut,
    min_chunk_size: usize,
}

impl BufferStream {
    pub(crate) fn new(inner: ByteStream, min_chunk_size: usize) -> Self {
        Self {
            inner: Some(inner),
            pending: BytesMut::new(),
            min_chunk_size: min_chunk_size.max(1),
        }
    }

    /// Minimum chunk size this stream yields
    pub fn min_chunk_size(&self) -> usize {
        self.min_chunk_size
    }
}

impl Stream for BufferStream {
    type Item = StoreResult<Buffer>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            let inner = match this.inner.as_mut() {
                Some(inner) => inner,
                None => return Poll::Ready(None),
            };

            match inner.poll_next_unpin(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Some(Ok(chunk))) => {
                    if this.pending.is_empty() && chunk.len() >= this.min_chunk_size {
                        return Poll::Ready(Some(Ok(chunk)));
                    }
                    this.pending.extend_from_slice(&chunk);
                    if this.pending.len() >= this.min_chunk_size {
                        return Poll::Ready(Some(Ok(this.pending.split().freeze())));
                    }
                }
                Poll::Ready(Some(Err(e))) => {
                    this.inner = None;
                    this.pending.clear();
                    return Poll::Ready(Some(Err(e)));
                }
                Poll::Ready(None) => {
                    this.inner = None;
                    if !this.pending.is_empty() {
                        return Poll::Ready(Some(Ok(this.pending.split().freeze())));
                    }
                    return Poll::Ready(None);
                }
            }
        }
    }
}

impl fmt::Debug for BufferStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferStream")
            .field("pending", &self.pending.len())
            .field("min_chunk_size", &self.min_chunk_size)
            .field("finished", &self.inner.is_none())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::ObjectPath;
    use chrono::Utc;
    use futures::stream::{self, TryStreamExt};

    fn result_from(chunks: Vec<StoreResult<Buffer>>) -> GetResult {
        let size: u64 = chunks
            .iter()
            .map(|c| c.as_ref().map(|b| b.len() as u64).unwrap_or(0))
            .sum();
        let meta = ObjectMeta {
            path: ObjectPath::parse("obj").unwrap(),
            last_modified: Utc::now(),
            size,
            e_tag: Some("\"1\"".to_string()),
            version: None,
        };
        let response = FetchResponse {
            meta,
            range: 0..size,
            attributes: Attributes::new(),
            body: stream::iter(chunks).boxed(),
        };
        GetResult::new(response, 4)
    }

    fn chunks(sizes: &[usize]) -> Vec<StoreResult<Buffer>> {
        sizes
            .iter()
            .map(|n| Ok(Buffer::from(vec![b'x'; *n])))
            .collect()
    }

    #[tokio::test]
    async fn test_metadata_before_consumption() {
        let mut result = result_from(chunks(&[3, 3]));
        assert_eq!(result.meta().unwrap().size, 6);
        assert_eq!(result.range().unwrap(), 0..6);
        assert!(result.attributes().unwrap().is_empty());

        assert_eq!(result.bytes().await.unwrap().len(), 6);
        assert!(matches!(result.meta(), Err(StoreError::Usage(_))));
        assert!(matches!(result.range(), Err(StoreError::Usage(_))));
    }

    #[tokio::test]
    async fn test_second_consumption_fails() {
        let mut result = result_from(chunks(&[3]));
        let _stream = result.stream().unwrap();
        assert!(matches!(result.bytes().await, Err(StoreError::Usage(_))));
        assert!(matches!(result.stream(), Err(StoreError::Usage(_))));

        let mut result = result_from(chunks(&[3]));
        result.bytes().await.unwrap();
        assert!(matches!(result.bytes().await, Err(StoreError::Usage(_))));
    }

    #[tokio::test]
    async fn test_chunks_meet_minimum_except_last() {
        let mut result = result_from(chunks(&[1, 2, 1, 5, 1, 1]));
        let sizes: Vec<usize> = result
            .stream()
            .unwrap()
            .map_ok(|b| b.len())
            .try_collect()
            .await
            .unwrap();
        assert_eq!(sizes, vec![4, 5, 2]);
    }

    #[tokio::test]
    async fn test_large_chunks_pass_through() {
        let big = Buffer::from(vec![7u8; 32]);
        let ptr = big.as_ptr();
        let mut result = result_from(vec![Ok(big)]);
        let mut stream = result.stream_chunked(16).unwrap();
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.as_ptr(), ptr);
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_stream_error_ends_stream() {
        let body = vec![
            Ok(Buffer::from_static(b"ab")),
            Err(StoreError::backend("memory", "Broken", "connection reset")),
            Ok(Buffer::from_static(b"cd")),
        ];
        let mut stream = result_from(body).into_stream(1).unwrap();
        assert!(stream.next().await.unwrap().is_ok());
        assert!(stream.next().await.unwrap().is_err());
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_materialize_empty_body() {
        let result = result_from(Vec::new());
        assert!(result.into_bytes().await.unwrap().is_empty());
    }
}
