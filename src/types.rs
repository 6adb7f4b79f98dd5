//! Value types shared by the engines and backend adapters

use crate::error::{StoreError, StoreResult};
use crate::path::ObjectPath;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::ops::Range;
use storekit_core_precondition::{CurrentVersion, GetConditions};

/// Immutable, reference-counted byte span with zero-copy slicing
pub type Buffer = Bytes;

/// Object attributes (content type, cache control, user metadata, ...)
pub type Attributes = HashMap<String, String>;

/// Object tags
pub type TagSet = HashMap<String, String>;

/// Metadata describing a stored object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    /// Path relative to the store root
    pub path: ObjectPath,

    /// Last modification time
    pub last_modified: DateTime<Utc>,

    /// Size in bytes
    pub size: u64,

    /// ETag, if the backend issues one
    pub e_tag: Option<String>,

    /// Version id, if the backend is versioned
    pub version: Option<String>,
}

impl ObjectMeta {
    /// Version state used by precondition evaluation
    pub fn current_version(&self) -> CurrentVersion {
        CurrentVersion::new(self.e_tag.clone(), self.version.clone())
            .with_last_modified(self.last_modified)
    }
}

/// A requested byte range
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ByteRange {
    /// `start..end`, end exclusive
    Bounded(Range<u64>),

    /// Everything from `offset` to the end of the object
    Offset(u64),

    /// The last `n` bytes
    Suffix(u64),
}

impl ByteRange {
    /// Reject ranges that are malformed regardless of object size
    pub fn validate(&self, path: &ObjectPath) -> StoreResult<()> {
        match self {
            ByteRange::Bounded(r) if r.end <= r.start => Err(StoreError::InvalidRange {
                path: path.to_string(),
                reason: format!("range {}..{} is empty or reversed", r.start, r.end),
            }),
            _ => Ok(()),
        }
    }

    /// Resolve against an object of `size` bytes
    ///
    /// A range starting at or after the end of the object is an error; an end
    /// past the object is clamped; a suffix longer than the object yields the
    /// whole object.
    pub fn resolve(&self, size: u64) -> Result<Range<u64>, String> {
        match self {
            ByteRange::Bounded(r) => {
                if r.end <= r.start {
                    return Err(format!("range {}..{} is empty or reversed", r.start, r.end));
                }
                if r.start >= size {
                    return Err(format!(
                        "range start {} is not before object end {}",
                        r.start, size
                    ));
                }
                Ok(r.start..r.end.min(size))
            }
            ByteRange::Offset(offset) => {
                if *offset >= size {
                    return Err(format!(
                        "offset {} is not before object end {}",
                        offset, size
                    ));
                }
                Ok(*offset..size)
            }
            ByteRange::Suffix(n) => Ok(size.saturating_sub(*n)..size),
        }
    }
}

impl From<Range<u64>> for ByteRange {
    fn from(range: Range<u64>) -> Self {
        ByteRange::Bounded(range)
    }
}

impl fmt::Display for ByteRange {
    /// HTTP `Range` header form
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ByteRange::Bounded(r) => write!(f, "bytes={}-{}", r.start, r.end.saturating_sub(1)),
            ByteRange::Offset(o) => write!(f, "bytes={}-", o),
            ByteRange::Suffix(n) => write!(f, "bytes=-{}", n),
        }
    }
}

/// Options for a get request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GetOptions {
    /// Conditional request headers
    pub conditions: GetConditions,

    /// Transfer only this range
    pub range: Option<ByteRange>,

    /// Request a particular object version
    pub version: Option<String>,

    /// Metadata only, no body bytes
    pub head: bool,
}

impl GetOptions {
    /// Create with defaults (whole object, unconditional)
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the byte range
    pub fn with_range(mut self, range: impl Into<ByteRange>) -> Self {
        self.range = Some(range.into());
        self
    }

    /// Set the object version
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Set `If-Match`
    pub fn if_match(mut self, e_tag: impl Into<String>) -> Self {
        self.conditions.if_match = Some(e_tag.into());
        self
    }

    /// Set `If-None-Match`
    pub fn if_none_match(mut self, e_tag: impl Into<String>) -> Self {
        self.conditions.if_none_match = Some(e_tag.into());
        self
    }

    /// Set `If-Modified-Since`
    pub fn if_modified_since(mut self, since: DateTime<Utc>) -> Self {
        self.conditions.if_modified_since = Some(since);
        self
    }

    /// Set `If-Unmodified-Since`
    pub fn if_unmodified_since(mut self, since: DateTime<Utc>) -> Self {
        self.conditions.if_unmodified_since = Some(since);
        self
    }

    /// Metadata only
    pub fn head_only(mut self) -> Self {
        self.head = true;
        self
    }
}

/// Identifies the object version a put just wrote
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PutResult {
    /// ETag of the new object
    pub e_tag: Option<String>,

    /// Version id of the new object
    pub version: Option<String>,
}

/// One page of a listing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    /// Entries in backend order
    pub objects: Vec<ObjectMeta>,

    /// Cursor for the next page, `None` when this is the last one
    pub next_token: Option<String>,
}

/// A part handed to the backend during a multipart upload
#[derive(Debug, Clone)]
pub struct UploadPart {
    /// Zero-based part index
    pub index: u32,

    /// Part contents
    pub buffer: Buffer,
}

/// Backend acknowledgement of an uploaded part
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartToken {
    /// Zero-based part index
    pub index: u32,

    /// Backend-specific content id (S3 part ETag, Azure block id, ...)
    pub content_id: String,

    /// Part size in bytes
    pub size: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounded_resolution() {
        assert_eq!(ByteRange::Bounded(10..20).resolve(100), Ok(10..20));
        // End past the object is clamped
        assert_eq!(ByteRange::Bounded(90..200).resolve(100), Ok(90..100));
        // Start at the end is rejected
        assert!(ByteRange::Bounded(100..101).resolve(100).is_err());
        // Zero-length is rejected
        assert!(ByteRange::Bounded(5..5).resolve(100).is_err());
    }

    #[test]
    fn test_offset_and_suffix() {
        assert_eq!(ByteRange::Offset(40).resolve(100), Ok(40..100));
        assert!(ByteRange::Offset(100).resolve(100).is_err());
        assert_eq!(ByteRange::Suffix(10).resolve(100), Ok(90..100));
        // Suffix larger than the object returns all of it
        assert_eq!(ByteRange::Suffix(1000).resolve(100), Ok(0..100));
        assert_eq!(ByteRange::Suffix(0).resolve(100), Ok(100..100));
    }

    #[test]
    fn test_validate() {
        let path = ObjectPath::parse("x").unwrap();
        assert!(ByteRange::Bounded(3..2).validate(&path).is_err());
        assert!(ByteRange::Bounded(2..3).validate(&path).is_ok());
        assert!(ByteRange::Suffix(0).validate(&path).is_ok());
    }

    #[test]
    fn test_header_form() {
        assert_eq!(ByteRange::Bounded(0..100).to_string(), "bytes=0-99");
        assert_eq!(ByteRange::Offset(7).to_string(), "bytes=7-");
        assert_eq!(ByteRange::Suffix(5).to_string(), "bytes=-5");
    }

    #[test]
    fn test_get_options_builder() {
        let opts = GetOptions::new()
            .with_range(0..10)
            .if_match("\"a\"")
            .with_version("3");
        assert_eq!(opts.range, Some(ByteRange::Bounded(0..10)));
        assert_eq!(opts.conditions.if_match.as_deref(), Some("\"a\""));
        assert_eq!(opts.version.as_deref(), Some("3"));
        assert!(!opts.head);
    }
}
