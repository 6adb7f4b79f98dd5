//! Conditional read evaluation (RFC 9110 section 13)
//!
//! Match-type conditions (`if_match`, `if_unmodified_since`) fail with
//! `PreconditionFailed`; freshness-type conditions (`if_none_match`,
//! `if_modified_since`) fail with `NotModified`. The two kinds are never
//! merged.

use super::error::PreconditionError;
use super::mode::CurrentVersion;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Conditional headers attached to a get request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetConditions {
    /// Succeed only if the ETag matches one of a comma separated list (or `*`)
    pub if_match: Option<String>,

    /// Succeed only if the ETag matches none of a comma separated list
    pub if_none_match: Option<String>,

    /// Succeed only if modified after this instant
    pub if_modified_since: Option<DateTime<Utc>>,

    /// Succeed only if not modified after this instant
    pub if_unmodified_since: Option<DateTime<Utc>>,
}

impl GetConditions {
    /// True when no condition is set
    pub fn is_empty(&self) -> bool {
        self.if_match.is_none()
            && self.if_none_match.is_none()
            && self.if_modified_since.is_none()
            && self.if_unmodified_since.is_none()
    }

    /// Evaluate every condition against the object's current state
    ///
    /// Evaluation order follows RFC 9110: `If-Match`, `If-Unmodified-Since`,
    /// `If-None-Match`, `If-Modified-Since`.
    pub fn check(&self, current: &CurrentVersion) -> Result<(), PreconditionError> {
        let e_tag = current.e_tag.as_deref().unwrap_or_default();

        if let Some(candidates) = &self.if_match {
            if !etag_list_matches(candidates, e_tag) {
                return Err(PreconditionError::PreconditionFailed(format!(
                    "{} does not match {}",
                    e_tag, candidates
                )));
            }
        }

        if let (Some(since), Some(modified)) = (self.if_unmodified_since, current.last_modified) {
            if modified > since {
                return Err(PreconditionError::PreconditionFailed(format!(
                    "modified at {} after {}",
                    modified, since
                )));
            }
        }

        if let Some(candidates) = &self.if_none_match {
            if etag_list_matches(candidates, e_tag) {
                return Err(PreconditionError::NotModified(format!(
                    "{} matches {}",
                    e_tag, candidates
                )));
            }
        }

        if let (Some(since), Some(modified)) = (self.if_modified_since, current.last_modified) {
            if modified <= since {
                return Err(PreconditionError::NotModified(format!(
                    "last modified at {}, not after {}",
                    modified, since
                )));
            }
        }

        Ok(())
    }
}

/// `*` matches anything; otherwise any comma separated entry equal to `e_tag`
fn etag_list_matches(candidates: &str, e_tag: &str) -> bool {
    candidates
        .split(',')
        .map(str::trim)
        .any(|candidate| candidate == "*" || candidate == e_tag)
}
