//! Error types for region mutation, persistence, and identity resolution.

use region_spatial::ShapeError;
use thiserror::Error;

/// Errors raised when creating or mutating regions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegionError {
    /// Region IDs may only contain `A-Z a-z 0-9 _ , ' - + /`.
    #[error("invalid region id: {0:?}")]
    InvalidId(String),

    /// Setting the parent would make the region its own ancestor.
    #[error("setting the parent of '{region}' to '{parent}' would create circular inheritance")]
    CircularInheritance { region: String, parent: String },

    /// Removal refused because other regions still name this one as parent.
    #[error("region '{region}' has child regions: {}", .children.join(", "))]
    HasChildren { region: String, children: Vec<String> },

    /// The geometry could not be turned into a shape.
    #[error("invalid shape: {0}")]
    InvalidShape(#[from] ShapeError),
}

/// Errors surfaced by region stores.
#[derive(Debug, Error)]
pub enum StorageError {
    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Error from the underlying database.
    #[error("backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// A record could not be encoded or decoded.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// Stored data is unusable as a whole.
    #[error("malformed region data: {0}")]
    Malformed(String),

    /// The store cannot write a partial difference; callers fall back to a
    /// full save.
    #[error("store does not support partial saves")]
    PartialSaveUnsupported,
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors from turning user input into domain entries.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// Some names have no known unique ID.
    #[error("unable to resolve the names {}", .0.join(", "))]
    UnresolvedNames(Vec<String>),

    /// The profile service failed.
    #[error("profile lookup failed: {0}")]
    LookupFailed(String),

    /// The input uses a `<prefix>:` form nobody understands.
    #[error("invalid domain input: {0}")]
    InvalidDomainFormat(String),
}
