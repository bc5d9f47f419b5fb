//! Shape construction errors.

use thiserror::Error;

/// Error raised when a shape cannot be built from the given geometry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShapeError {
    /// A polygon needs at least one vertex.
    #[error("polygon has no points")]
    EmptyPolygon,
}
