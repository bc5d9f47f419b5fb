//! Region geometry and spatial partitioning.
//!
//! Everything a protected region needs to know about space lives here:
//!
//! - **Positions**: [`BlockPos`] (x, y, z) and [`ColumnPos`] (x, z) in block units
//! - **Shapes**: the closed [`Shape`] sum type (cuboid, polygon, global) with
//!   containment, bounding boxes, volume, and overlap tests
//! - **Grid**: [`SpatialGrid`], a uniform column grid that narrows point and
//!   box queries down to a handful of candidate keys
//!
//! Shapes never change after construction, so they can be shared freely
//! between threads without locking.

mod error;
pub mod grid;
mod pos;
pub mod shape;

pub use error::ShapeError;
pub use grid::{CellKey, SpatialGrid};
pub use pos::{BlockPos, ColumnPos};
pub use shape::{Shape, ShapeKind};
