//! Core domain types and shared logic for the code-intelligence upload lifecycle.
//!
//! This crate defines the data model used across all other crates:
//! - Upload states and the lifecycle state machine
//! - Package coordinates provided and referenced by uploads
//! - The reference-count engine deciding canonical providers
//! - Background scan kinds
//! - Configuration

pub mod config;
pub mod error;
pub mod package;
pub mod refcount;
pub mod scan;
pub mod upload;

pub use error::{Error, Result};
pub use package::PackageCoordinate;
pub use refcount::{
    CountChange, ProviderRow, ReferenceCountMode, ReferenceCountUpdate, ReferenceEdge,
    ReferenceGraph, plan_reference_counts,
};
pub use scan::ScanKind;
pub use upload::{StateFilter, UNKNOWN_COMMIT_DATE, UploadState};
