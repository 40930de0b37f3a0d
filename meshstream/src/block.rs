use core::fmt;

use ordered_float::OrderedFloat;

use meshstream_base::math::FreePoint;

use crate::BoundingVolume;

/// Identifies one block of scan data.
///
/// Block identifiers are opaque 128-bit values assigned by the scanning service (typically a
/// coordinate frame identifier). They are stable across discovery polls for as long as the
/// block exists.
#[derive(Clone, Copy, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct BlockId([u64; 2]);

impl BlockId {
    /// Constructs a [`BlockId`] from the two halves of the service's identifier.
    #[inline]
    pub const fn new(high: u64, low: u64) -> Self {
        Self([high, low])
    }

    /// Returns the two halves of the identifier, as passed to [`BlockId::new()`].
    #[inline]
    pub const fn to_parts(self) -> [u64; 2] {
        self.0
    }
}

impl From<u128> for BlockId {
    fn from(value: u128) -> Self {
        Self::new((value >> 64) as u64, value as u64)
    }
}

impl From<BlockId> for u128 {
    fn from(value: BlockId) -> Self {
        (u128::from(value.0[0]) << 64) | u128::from(value.0[1])
    }
}

impl fmt::Display for BlockId {
    /// Produces a short string which is suitable for use as a unique identifier.
    /// Leading zero halves are omitted.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            [0, low] => write!(f, "blk-{low:x}"),
            [high, low] => write!(f, "blk-{high:x}-{low:016x}"),
        }
    }
}

impl fmt::Debug for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// What the scanning service reports about a block relative to its previous report.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[expect(clippy::exhaustive_enums)]
pub enum BlockState {
    /// The block has not been reported before.
    New,
    /// The block's scan data has changed.
    Updated,
    /// The block's scan data has not changed.
    Unchanged,
    /// The block no longer exists.
    Deleted,
}

/// One entry in a discovery snapshot from a [`BlockSource`](crate::BlockSource).
///
/// Descriptors are transient; the scheduler keeps only the id and state.
#[derive(Clone, Copy, Debug, PartialEq)]
#[non_exhaustive]
pub struct BlockDescriptor {
    /// Which block this is.
    pub id: BlockId,
    /// Change since the previous report.
    pub state: BlockState,
    /// Center of the block, if known. Used to prioritize blocks near the viewer.
    pub center: Option<FreePoint>,
}

impl BlockDescriptor {
    /// Constructs a [`BlockDescriptor`] with no position information.
    pub const fn new(id: BlockId, state: BlockState) -> Self {
        Self {
            id,
            state,
            center: None,
        }
    }

    /// Returns a copy of this descriptor with the given block center.
    #[must_use]
    pub const fn with_center(mut self, center: FreePoint) -> Self {
        self.center = Some(center);
        self
    }
}

/// The order in which queued blocks are submitted for mesh generation; lesser values are
/// submitted first.
///
/// Blocks are ordered first by state, so that blocks the scene has never shown are meshed
/// before changes to blocks it already has, and changes are meshed before regenerating
/// unchanged blocks. Within a state, blocks nearer the center of the discovery volume come
/// first. Blocks without a known center come last within their state.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct BlockPriority {
    state_rank: u8,
    distance_squared: OrderedFloat<f64>,
}

impl BlockPriority {
    /// Computes the priority of a discovered block relative to the current discovery volume.
    ///
    /// Returns [`None`] for [`BlockState::Deleted`], since deleted blocks are never queued.
    pub fn new(descriptor: &BlockDescriptor, bounds: Option<&BoundingVolume>) -> Option<Self> {
        let state_rank = match descriptor.state {
            BlockState::New => 0,
            BlockState::Updated => 1,
            BlockState::Unchanged => 2,
            BlockState::Deleted => return None,
        };
        let distance_squared = match (descriptor.center, bounds) {
            (Some(center), Some(bounds)) => (center - bounds.center).square_length(),
            _ => f64::INFINITY,
        };
        Some(Self {
            state_rank,
            distance_squared: OrderedFloat(if distance_squared.is_nan() {
                f64::INFINITY
            } else {
                distance_squared
            }),
        })
    }

    /// Returns the squared distance used for ordering within a state.
    pub fn distance_squared(&self) -> f64 {
        self.distance_squared.into_inner()
    }
}

/// Entry in the scheduler's priority queue.
///
/// The state is not stored here because the latest reported state lives in the pending set;
/// an entry whose id is no longer pending is stale and is skipped when dequeued.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub(crate) struct QueuedBlock {
    pub(crate) priority: BlockPriority,
    pub(crate) id: BlockId,
}
