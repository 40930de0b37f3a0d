use crate::{BlockDescriptor, BoundingVolume, BoxError};

/// A scanning service which reports which blocks exist near the viewer.
///
/// [`BlockMeshStream`](crate::BlockMeshStream) calls [`BlockSource::query_blocks()`] at the
/// configured [poll interval](crate::StreamConfig::poll_interval).
pub trait BlockSource {
    /// Returns a snapshot of the blocks intersecting `bounds`, each with its state relative
    /// to the previous snapshot.
    ///
    /// An error return is fatal to the scheduler.
    fn query_blocks(&mut self, bounds: &BoundingVolume) -> Result<Vec<BlockDescriptor>, BoxError>;
}

impl<S: BlockSource + ?Sized> BlockSource for &mut S {
    fn query_blocks(&mut self, bounds: &BoundingVolume) -> Result<Vec<BlockDescriptor>, BoxError> {
        (**self).query_blocks(bounds)
    }
}

impl<S: BlockSource + ?Sized> BlockSource for Box<S> {
    fn query_blocks(&mut self, bounds: &BoundingVolume) -> Result<Vec<BlockDescriptor>, BoxError> {
        (**self).query_blocks(bounds)
    }
}
