//! Storekit Core Precondition: pure-logic conditional-operation policy
//!
//! # Overview
//!
//! Put, copy and rename all share one question: given what the caller asked
//! for and what currently sits at the destination, may the operation go
//! ahead? This crate answers it without performing any I/O. The store layer
//! asks its backend adapter for the destination state, hands it to one of the
//! evaluators here, and only issues the write when the verdict is to proceed.
//!
//! - **[`PutMode`]**: `Overwrite`, `Create` or `Update(UpdateVersion)`
//! - **[`evaluate_put`]**: the put decision table
//! - **[`evaluate_transfer`]**: copy/rename with an `overwrite` flag
//! - **[`GetConditions`]**: `If-Match` / `If-None-Match` / freshness checks
//!   evaluated against an object's current version
//!
//! # Key Principles
//!
//! This crate is **pure logic** with zero knowledge of:
//! - Backend adapters or wire protocols
//! - Async runtimes
//! - Paths and buffers
//!
//! # Decision Table
//!
//! ```text
//! Requested             Destination            Outcome
//! ─────────────────────────────────────────────────────────────────────
//! Overwrite             any                    proceed
//! Create                absent                 proceed
//! Create                present                AlreadyExists
//! Update(v)             matches v              proceed
//! Update(v)             differs / absent       PreconditionFailed
//! transfer, !overwrite  present                AlreadyExists
//! transfer, !overwrite  absent, atomic         proceed (create-only)
//! transfer, !overwrite  absent, not atomic     NotSupported
//! ```
//!
//! # Usage Example
//!
//! ```
//! use storekit_core_precondition::{evaluate_put, CurrentVersion, Destination, PutMode};
//!
//! let current = Destination::Present(CurrentVersion::new(Some("\"v1\"".into()), None));
//! assert!(evaluate_put(&PutMode::Overwrite, &current).is_ok());
//! assert!(evaluate_put(&PutMode::Create, &current).is_err());
//! ```

pub mod conditions;
pub mod error;
pub mod mode;

// Re-export main types for convenience
pub use conditions::GetConditions;
pub use error::PreconditionError;
pub use mode::{
    evaluate_put, evaluate_transfer, CurrentVersion, Destination, PutMode, TransferPlan,
    UpdateVersion,
};
