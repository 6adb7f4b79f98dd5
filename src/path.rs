/*!
 * Store-relative object paths
 */

use crate::error::{StoreError, StoreResult};
use serde::{Deserialize, Serialize};
use std::fmt;

const DELIMITER: char = '/';

/// A path identifying an object relative to a store root
///
/// Paths never carry a scheme or bucket (`a/b.txt`, not `s3://bucket/a/b.txt`),
/// never start with `/`, and never contain empty, `.` or `..` segments. The
/// empty path is the store root and is only meaningful as a listing prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectPath(String);

impl ObjectPath {
    /// Parse and validate a path
    ///
    /// A single leading or trailing `/` is tolerated and stripped.
    pub fn parse(raw: &str) -> StoreResult<Self> {
        if let Some((scheme, _)) = raw.split_once("://") {
            return Err(StoreError::InvalidConfig(format!(
                "path {} embeds a {} scheme; paths are relative to the store root",
                raw, scheme
            )));
        }

        let trimmed = raw.trim_start_matches(DELIMITER).trim_end_matches(DELIMITER);
        if trimmed.is_empty() {
            return Ok(Self::root());
        }

        for segment in trimmed.split(DELIMITER) {
            match segment {
                "" => {
                    return Err(StoreError::InvalidConfig(format!(
                        "path {} contains an empty segment",
                        raw
                    )))
                }
                "." | ".." => {
                    return Err(StoreError::InvalidConfig(format!(
                        "path {} contains a relative segment '{}'",
                        raw, segment
                    )))
                }
                _ => {}
            }
        }

        Ok(Self(trimmed.to_string()))
    }

    /// The store root
    pub fn root() -> Self {
        Self(String::new())
    }

    /// Borrow as `&str`
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for the store root
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over `/`-separated segments
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split(DELIMITER).filter(|s| !s.is_empty())
    }

    /// Final segment
    pub fn filename(&self) -> Option<&str> {
        self.segments().last()
    }

    /// Append a child segment
    pub fn child(&self, segment: &str) -> StoreResult<Self> {
        if self.is_root() {
            Self::parse(segment)
        } else {
            Self::parse(&format!("{}{}{}", self.0, DELIMITER, segment))
        }
    }

    /// String-prefix match, as object stores evaluate listing prefixes
    pub fn starts_with(&self, prefix: &ObjectPath) -> bool {
        self.0.starts_with(prefix.as_str())
    }
}

/// Validate a listing prefix, keeping a meaningful trailing `/`
///
/// `logs/` only matches inside the `logs` directory-like prefix, while `logs`
/// also matches `logs-archive/...`.
pub fn parse_prefix(raw: &str) -> StoreResult<String> {
    let path = ObjectPath::parse(raw)?;
    if raw.ends_with(DELIMITER) && !path.is_root() {
        Ok(format!("{}{}", path.0, DELIMITER))
    } else {
        Ok(path.0)
    }
}

impl fmt::Display for ObjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ObjectPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ObjectPath {
    type Error = StoreError;

    fn try_from(value: String) -> StoreResult<Self> {
        Self::parse(&value)
    }
}

impl TryFrom<&str> for ObjectPath {
    type Error = StoreError;

    fn try_from(value: &str) -> StoreResult<Self> {
        Self::parse(value)
    }
}

impl From<ObjectPath> for String {
    fn from(path: ObjectPath) -> Self {
        path.0
    }
}
