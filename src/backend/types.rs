//! Request and response types exchanged with backend adapters

use crate::error::StoreResult;
use crate::types::{Attributes, Buffer, ByteRange, ObjectMeta};
use bytes::BytesMut;
use futures::stream::{self, BoxStream, StreamExt};
use std::ops::Range;
use storekit_core_precondition::GetConditions;

/// Body of a fetch, yielded in backend-sized pieces
pub type ByteStream = BoxStream<'static, StoreResult<Buffer>>;

/// What a backend can do atomically
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdapterCapabilities {
    /// Copy/rename onto a path only if nothing is there, in one step
    pub atomic_copy_if_not_exists: bool,

    /// Rename without copying
    pub native_rename: bool,

    /// `PutMode::Update` evaluated atomically with the write
    pub conditional_update: bool,
}

impl Default for AdapterCapabilities {
    fn default() -> Self {
        Self {
            atomic_copy_if_not_exists: false,
            native_rename: false,
            conditional_update: false,
        }
    }
}

/// A single fetch against one object
#[derive(Debug, Clone, Default)]
pub struct FetchRequest {
    /// Byte range, `None` for the whole object
    pub range: Option<ByteRange>,

    /// Conditional headers
    pub conditions: GetConditions,

    /// Specific object version
    pub version: Option<String>,

    /// Metadata only
    pub head: bool,
}

impl FetchRequest {
    /// Fetch a range with no conditions
    pub fn range(range: ByteRange) -> Self {
        Self {
            range: Some(range),
            ..Default::default()
        }
    }

    /// Metadata only
    pub fn head() -> Self {
        Self {
            head: true,
            ..Default::default()
        }
    }
}

/// Result of a fetch
pub struct FetchResponse {
    /// Object metadata
    pub meta: ObjectMeta,

    /// Range actually served (clamped to the object)
    pub range: Range<u64>,

    /// Object attributes
    pub attributes: Attributes,

    /// Body; empty for head requests
    pub body: ByteStream,
}

impl FetchResponse {
    /// Response whose body is already in memory
    pub fn from_buffer(
        meta: ObjectMeta,
        range: Range<u64>,
        attributes: Attributes,
        buffer: Buffer,
    ) -> Self {
        Self {
            meta,
            range,
            attributes,
            body: stream::once(async move { Ok(buffer) }).boxed(),
        }
    }

    /// Response without a body
    pub fn head(meta: ObjectMeta, attributes: Attributes) -> Self {
        Self {
            range: 0..meta.size,
            meta,
            attributes,
            body: stream::empty().boxed(),
        }
    }

    /// Drain the body into one buffer
    ///
    /// A body that arrives as a single piece is returned without copying.
    pub async fn collect(self) -> StoreResult<Buffer> {
        collect_stream(self.body).await
    }
}

impl std::fmt::Debug for FetchResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchResponse")
            .field("meta", &self.meta)
            .field("range", &self.range)
            .field("attributes", &self.attributes)
            .finish_non_exhaustive()
    }
}

/// Concatenate a byte stream, skipping the copy for single-piece bodies
pub(crate) async fn collect_stream(mut body: ByteStream) -> StoreResult<Buffer> {
    let first = match body.next().await {
        Some(chunk) => chunk?,
        None => return Ok(Buffer::new()),
    };

    let second = match body.next().await {
        Some(chunk) => chunk?,
        None => return Ok(first),
    };

    let mut combined = BytesMut::with_capacity(first.len() + second.len());
    combined.extend_from_slice(&first);
    combined.extend_from_slice(&second);
    while let Some(chunk) = body.next().await {
        combined.extend_from_slice(&chunk?);
    }
    Ok(combined.freeze())
}

/// One listing page request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListRequest {
    /// Only keys starting with this string
    pub prefix: Option<String>,

    /// Only keys strictly greater than this
    pub offset: Option<String>,

    /// Continuation token from the previous page
    pub token: Option<String>,

    /// Page size hint
    pub max_results: usize,
}
