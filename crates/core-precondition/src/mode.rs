//! Write modes and the put/copy/rename decision procedures

use super::error::PreconditionError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifies the version of an object an `Update` put expects to replace
///
/// Stores use differing combinations of `e_tag` and `version` for conditional
/// updates, so callers should keep both when they have them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateVersion {
    /// Expected ETag of the current object
    pub e_tag: Option<String>,

    /// Expected version id of the current object
    pub version: Option<String>,
}

impl UpdateVersion {
    /// Expect a specific ETag
    pub fn with_e_tag(e_tag: impl Into<String>) -> Self {
        Self {
            e_tag: Some(e_tag.into()),
            version: None,
        }
    }

    /// Expect a specific version id
    pub fn with_version(version: impl Into<String>) -> Self {
        Self {
            e_tag: None,
            version: Some(version.into()),
        }
    }

    /// Reject an update that names neither an ETag nor a version
    pub fn validate(&self) -> Result<(), PreconditionError> {
        if self.e_tag.is_none() && self.version.is_none() {
            return Err(PreconditionError::EmptyUpdateVersion);
        }
        Ok(())
    }

    /// Every field that is set must equal the current one
    pub fn matches(&self, current: &CurrentVersion) -> bool {
        let e_tag_ok = match &self.e_tag {
            Some(expected) => current.e_tag.as_deref() == Some(expected.as_str()),
            None => true,
        };
        let version_ok = match &self.version {
            Some(expected) => current.version.as_deref() == Some(expected.as_str()),
            None => true,
        };
        e_tag_ok && version_ok
    }
}

/// Preconditions attached to a put
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PutMode {
    /// Replace whatever is at the destination
    #[default]
    Overwrite,

    /// Fail if anything is at the destination
    Create,

    /// Replace only if the current object matches the given version
    Update(UpdateVersion),
}

impl PutMode {
    /// True for `Overwrite`
    pub fn is_overwrite(&self) -> bool {
        matches!(self, PutMode::Overwrite)
    }

    /// Check the mode itself is well formed
    pub fn validate(&self) -> Result<(), PreconditionError> {
        match self {
            PutMode::Update(v) => v.validate(),
            _ => Ok(()),
        }
    }
}

/// Version state of an existing object as reported by a backend
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CurrentVersion {
    /// Current ETag
    pub e_tag: Option<String>,

    /// Current version id
    pub version: Option<String>,

    /// Last modification time, used by freshness conditions
    pub last_modified: Option<DateTime<Utc>>,
}

impl CurrentVersion {
    /// Create a version state without a modification time
    pub fn new(e_tag: Option<String>, version: Option<String>) -> Self {
        Self {
            e_tag,
            version,
            last_modified: None,
        }
    }

    /// Builder pattern: set the modification time
    pub fn with_last_modified(mut self, last_modified: DateTime<Utc>) -> Self {
        self.last_modified = Some(last_modified);
        self
    }
}

/// What currently occupies a destination path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// Nothing at the path
    Absent,

    /// An object exists with the given version state
    Present(CurrentVersion),
}

impl Destination {
    /// True when an object exists
    pub fn is_present(&self) -> bool {
        matches!(self, Destination::Present(_))
    }
}

/// Decide whether a put with `mode` may proceed against `destination`
pub fn evaluate_put(mode: &PutMode, destination: &Destination) -> Result<(), PreconditionError> {
    match (mode, destination) {
        (PutMode::Overwrite, _) => Ok(()),
        (PutMode::Create, Destination::Absent) => Ok(()),
        (PutMode::Create, Destination::Present(_)) => Err(PreconditionError::AlreadyExists),
        (PutMode::Update(expected), state) => {
            expected.validate()?;
            match state {
                Destination::Present(current) if expected.matches(current) => Ok(()),
                Destination::Present(current) => {
                    Err(PreconditionError::PreconditionFailed(format!(
                        "expected e_tag={:?} version={:?}, found e_tag={:?} version={:?}",
                        expected.e_tag, expected.version, current.e_tag, current.version
                    )))
                }
                Destination::Absent => Err(PreconditionError::PreconditionFailed(
                    "object to update does not exist".to_string(),
                )),
            }
        }
    }
}

/// How a copy or rename should be carried out once allowed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferPlan {
    /// Replace the destination unconditionally
    Replace,

    /// Use the backend's atomic create-if-absent primitive
    CreateAtomically,
}

/// Decide whether a copy or rename may proceed
///
/// `atomic_create_supported` reports whether the backend can write the
/// destination only-if-absent in a single step.
pub fn evaluate_transfer(
    overwrite: bool,
    destination: &Destination,
    atomic_create_supported: bool,
) -> Result<TransferPlan, PreconditionError> {
    if overwrite {
        return Ok(TransferPlan::Replace);
    }

    match destination {
        Destination::Present(_) => Err(PreconditionError::AlreadyExists),
        Destination::Absent if atomic_create_supported => Ok(TransferPlan::CreateAtomically),
        Destination::Absent => Err(PreconditionError::NotSupported(
            "atomic copy-if-not-exists".to_string(),
        )),
    }
}
