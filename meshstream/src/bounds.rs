use core::fmt;

use manyfmt::Refmt as _;

use meshstream_base::math::{FreePoint, FreeSize, Rotation};
use meshstream_base::util::ConciseDebug;

/// Position and orientation of the viewer, supplied by the caller on every tick.
///
/// The discovery volume is recomputed whenever this changes.
#[derive(Clone, Copy, Debug, PartialEq)]
#[expect(clippy::exhaustive_structs)]
pub struct ViewerTransform {
    /// Position of the viewer in world coordinates.
    pub position: FreePoint,
    /// Orientation of the viewer.
    pub rotation: Rotation,
}

impl ViewerTransform {
    /// A viewer at `position` with the identity orientation.
    pub fn at(position: FreePoint) -> Self {
        Self {
            position,
            rotation: Rotation::identity(),
        }
    }
}

impl Default for ViewerTransform {
    fn default() -> Self {
        Self::at(FreePoint::origin())
    }
}

/// An oriented box in world space, within which blocks are discovered.
#[derive(Clone, Copy, PartialEq)]
#[expect(clippy::exhaustive_structs)]
pub struct BoundingVolume {
    /// Center of the box.
    pub center: FreePoint,
    /// Orientation of the box's axes.
    pub rotation: Rotation,
    /// Full size of the box along each of its own axes.
    pub extents: FreeSize,
}

impl BoundingVolume {
    /// Computes the discovery volume for a viewer: a box of the given size centered on the
    /// viewer and turned with it.
    pub fn around(viewer: &ViewerTransform, extents: FreeSize) -> Self {
        Self {
            center: viewer.position,
            rotation: viewer.rotation,
            extents,
        }
    }

    /// Returns whether `point` is inside or on the surface of this box.
    pub fn contains(&self, point: FreePoint) -> bool {
        let local = self
            .rotation
            .inverse()
            .transform_vector3d(point - self.center);
        let half = self.extents * 0.5;
        local.x.abs() <= half.width && local.y.abs() <= half.height && local.z.abs() <= half.depth
    }
}

impl fmt::Debug for BoundingVolume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Self {
            center,
            rotation,
            extents,
        } = self;
        f.debug_struct("BoundingVolume")
            .field("center", &center.refmt(&ConciseDebug))
            .field("rotation", rotation)
            .field("extents", &extents.refmt(&ConciseDebug))
            .finish()
    }
}
