use core::time::Duration;

use meshstream_base::math::FreeSize;

/// Coarseness of generated meshes. Applied uniformly to every generation request.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[expect(clippy::exhaustive_enums)]
pub enum LevelOfDetail {
    /// Fewest triangles.
    Minimum,
    /// Balanced detail and cost.
    #[default]
    Medium,
    /// Most triangles.
    Maximum,
}

bitflags::bitflags! {
    /// Options for what the mesh generator produces.
    #[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct MeshingFlags: u32 {
        /// Produce a point cloud instead of triangles.
        const POINT_CLOUD = 1 << 0;
        /// Compute vertex normals.
        const COMPUTE_NORMALS = 1 << 1;
        /// Compute per-vertex confidence values.
        const COMPUTE_CONFIDENCE = 1 << 2;
        /// Flatten nearly planar regions.
        const PLANARIZE = 1 << 3;
        /// Remove the overlapping skirt geometry at block boundaries.
        const REMOVE_MESH_SKIRT = 1 << 4;
        /// Emit triangle indices in clockwise order instead of counterclockwise.
        const INDEX_ORDER_CLOCKWISE = 1 << 5;
    }
}

/// Parameters that affect the content of generated meshes.
///
/// Changing any of these invalidates every mesh generated so far; the scheduler discards
/// all of its state and regenerates everything at the next tick. Comparing two
/// [`MeshSettings`] values is therefore the test for whether such a reset is needed.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[non_exhaustive]
pub struct MeshSettings {
    /// Level of detail requested for every block.
    pub level_of_detail: LevelOfDetail,

    /// What kind of geometry to produce and what to compute along with it.
    pub flags: MeshingFlags,

    /// Holes in the scanned surface whose perimeter is shorter than this (in meters) are
    /// filled in.
    pub fill_hole_length: f32,

    /// Connected pieces of mesh whose area is smaller than this (in square meters) are
    /// discarded.
    pub disconnected_component_area: f32,
}

impl MeshSettings {
    /// Constrain fields to valid/practical values.
    #[must_use]
    pub fn repair(mut self) -> Self {
        self.fill_hole_length = non_negative(self.fill_hole_length);
        self.disconnected_component_area = non_negative(self.disconnected_component_area);
        self
    }
}

impl Default for MeshSettings {
    fn default() -> Self {
        Self {
            level_of_detail: LevelOfDetail::Medium,
            flags: MeshingFlags::COMPUTE_NORMALS | MeshingFlags::REMOVE_MESH_SKIRT,
            fill_hole_length: 1.0,
            disconnected_component_area: 0.25,
        }
    }
}

fn non_negative(value: f32) -> f32 {
    if value.is_finite() { value.max(0.0) } else { 0.0 }
}

/// Scheduling parameters for [`BlockMeshStream`](crate::BlockMeshStream).
///
/// Unlike [`MeshSettings`], changing these never invalidates generated meshes.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[non_exhaustive]
pub struct StreamConfig {
    /// Minimum time between discovery polls of the block source.
    pub poll_interval: Duration,

    /// Maximum number of generation requests outstanding at once.
    pub max_concurrent_batches: usize,

    /// Maximum number of blocks in a single generation request.
    pub max_blocks_per_batch: usize,

    /// Size of the discovery volume, which is centered on the viewer.
    pub bounds_extents: FreeSize,
}

impl StreamConfig {
    /// Constrain fields to valid/practical values.
    #[must_use]
    pub fn repair(mut self) -> Self {
        self.max_concurrent_batches = self.max_concurrent_batches.max(1);
        self.max_blocks_per_batch = self.max_blocks_per_batch.max(1);
        let fix = |x: f64| if x.is_finite() && x > 0.0 { x } else { 1.0 };
        self.bounds_extents = FreeSize::new(
            fix(self.bounds_extents.width),
            fix(self.bounds_extents.height),
            fix(self.bounds_extents.depth),
        );
        self
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(250),
            max_concurrent_batches: 2,
            max_blocks_per_batch: 16,
            bounds_extents: FreeSize::new(10.0, 10.0, 10.0),
        }
    }
}
