//! Coordinate types.
//!
//! All positions handled by the scheduler are in a single world coordinate system, measured
//! in meters, as reported by the scanning service.

use euclid::{Point3D, Rotation3D, Size3D};

/// Unit-of-measure type for world coordinates (meters in the scanning service's frame).
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[expect(clippy::exhaustive_enums)]
pub enum World {}

/// Coordinate type for world positions.
pub type FreeCoordinate = f64;

/// A position in world space.
pub type FreePoint = Point3D<FreeCoordinate, World>;

/// Dimensions of a box in world space.
pub type FreeSize = Size3D<FreeCoordinate, World>;

/// An orientation in world space.
pub type Rotation = Rotation3D<FreeCoordinate, World, World>;
