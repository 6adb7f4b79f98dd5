//! Backend adapter abstraction
//!
//! A backend adapter performs exactly one storage call per method (fetch a
//! range, upload a part, list a page, ...) and returns raw bytes, metadata or
//! a typed failure. Everything above this layer (range coalescing, multipart
//! orchestration, paging, precondition policy) is backend independent and
//! lives in the engines.
//!
//! # Features
//!
//! - **Async-first design**: every call is a suspension point
//! - **Narrow contract**: no retries, no coalescing, no orchestration here
//! - **Capability discovery**: adapters declare which atomic primitives exist
//! - **Two in-tree adapters**: [`MemoryAdapter`] and [`LocalAdapter`]
//!
//! # Examples
//!
//! ```no_run
//! use storekit::backend::{BackendAdapter, FetchRequest, LocalAdapter};
//! use storekit::ObjectPath;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let adapter = LocalAdapter::new("/var/data")?;
//!     let path = ObjectPath::parse("reports/q1.csv")?;
//!     let response = adapter.fetch(&path, FetchRequest::head()).await?;
//!     println!("Size: {} bytes", response.meta.size);
//!     Ok(())
//! }
//! ```

pub mod types;

mod local;
mod memory;

pub use local::LocalAdapter;
pub use memory::MemoryAdapter;
pub use types::{AdapterCapabilities, ByteStream, FetchRequest, FetchResponse, ListRequest};

use crate::error::{StoreError, StoreResult};
use crate::path::ObjectPath;
use crate::types::{Attributes, Buffer, ListPage, ObjectMeta, PartToken, PutResult, TagSet};
use async_trait::async_trait;
use storekit_core_precondition::PutMode;

/// Unified adapter trait consumed by all engines
///
/// Implementors must be `Send + Sync`; engines share one adapter across
/// concurrently scheduled tasks through an `Arc`.
#[async_trait]
pub trait BackendAdapter: Send + Sync + std::fmt::Debug {
    /// Short backend identifier (e.g., "memory", "local", "s3")
    fn name(&self) -> &str;

    /// Atomic primitives this backend offers
    fn capabilities(&self) -> AdapterCapabilities;

    /// Fetch an object, a byte range of it, or only its metadata
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the object doesn't exist.
    /// Returns `StoreError::InvalidRange` if the range starts at or after the
    /// end of the object. An end past the object is clamped, not an error.
    /// Returns `StoreError::PreconditionFailed` / `StoreError::NotModified`
    /// when a condition in the request fails.
    async fn fetch(&self, path: &ObjectPath, request: FetchRequest) -> StoreResult<FetchResponse>;

    /// Write a whole object in one atomic call, honouring `mode`
    ///
    /// # Errors
    ///
    /// Returns `StoreError::AlreadyExists` for `Create` against an existing
    /// object and `StoreError::PreconditionFailed` for a failed `Update`.
    async fn upload_full(
        &self,
        path: &ObjectPath,
        bytes: Buffer,
        mode: &PutMode,
        attributes: &Attributes,
        tags: &TagSet,
    ) -> StoreResult<PutResult>;

    /// Start a multipart session and return its upload id
    async fn create_multipart(
        &self,
        path: &ObjectPath,
        attributes: &Attributes,
        tags: &TagSet,
    ) -> StoreResult<String>;

    /// Upload one part of a multipart session
    async fn upload_part(
        &self,
        path: &ObjectPath,
        upload_id: &str,
        index: u32,
        bytes: Buffer,
    ) -> StoreResult<PartToken>;

    /// Assemble the parts (ordered by index) into the final object
    ///
    /// The object becomes visible only when this call succeeds.
    async fn complete_multipart(
        &self,
        path: &ObjectPath,
        upload_id: &str,
        parts: Vec<PartToken>,
    ) -> StoreResult<PutResult>;

    /// Discard a multipart session; callers treat failures as non-fatal
    async fn abort_multipart(&self, path: &ObjectPath, upload_id: &str) -> StoreResult<()>;

    /// Fetch one listing page
    async fn list_page(&self, request: ListRequest) -> StoreResult<ListPage>;

    /// Copy an object within this backend
    ///
    /// With `overwrite == false` the copy must fail with
    /// `StoreError::AlreadyExists` if the destination exists, atomically.
    async fn copy(&self, from: &ObjectPath, to: &ObjectPath, overwrite: bool) -> StoreResult<()>;

    /// Rename natively
    ///
    /// Backends without a native rename keep the default, and the store falls
    /// back to copy-then-delete.
    async fn rename(&self, from: &ObjectPath, to: &ObjectPath, overwrite: bool) -> StoreResult<()> {
        let _ = (from, to, overwrite);
        Err(StoreError::NotSupported {
            backend: self.name().to_string(),
            operation: "rename".to_string(),
        })
    }

    /// Delete an object
    async fn delete(&self, path: &ObjectPath) -> StoreResult<()>;

    /// Metadata for an object
    async fn head(&self, path: &ObjectPath) -> StoreResult<ObjectMeta> {
        Ok(self.fetch(path, FetchRequest::head()).await?.meta)
    }
}
