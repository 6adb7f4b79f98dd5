/*!
 * storekit - uniform client-side access to object storage
 *
 * One contract over any backend adapter, usable async or blocking:
 * - Coalesced, bounded-concurrency range reads returning zero-copy buffers
 * - Concurrent multipart uploads with all-or-nothing visibility
 * - Lazy, chunked listings
 * - Shared precondition policy for put, copy and rename
 *
 * Author: Shane Wall <shaneawall@gmail.com>
 */

pub mod backend;
pub mod blocking;
pub mod config;
pub mod error;
pub mod get;
pub mod list;
pub mod logging;
pub mod path;
pub mod put;
pub mod range;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use backend::{BackendAdapter, LocalAdapter, MemoryAdapter};
pub use blocking::{Blocking, BlockingGetResult, BlockingListPager};
pub use config::{LogConfig, LogLevel, StoreConfig};
pub use error::{StoreError, StoreResult};
pub use get::{BufferStream, GetResult};
pub use list::ListPager;
pub use path::ObjectPath;
pub use put::{PutOptions, PutPayload};
pub use store::{
    CopyObject, Delete, Get, GetRange, GetRanges, Head, List, ObjectStoreApi, Put, RangeEnd,
    RangeEnds, Rename, Store,
};
pub use types::{
    Attributes, Buffer, ByteRange, GetOptions, ListPage, ObjectMeta, PartToken, PutResult, TagSet,
    UploadPart,
};
pub use storekit_core_precondition::{GetConditions, PutMode, UpdateVersion};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
