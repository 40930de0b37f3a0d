use core::fmt;
use std::sync::Arc;

use crate::{BlockId, BoxError, LevelOfDetail, MeshSettings, MeshingFlags};

/// Identifies one mesh generation request.
///
/// Handles are assigned by the [`MeshGenerator`] when a request is submitted, and must be
/// distinct among all requests whose results have not yet been delivered.
#[derive(Clone, Copy, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct RequestHandle(u64);

impl RequestHandle {
    /// Constructs a handle from the generator's own request identifier.
    #[inline]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Debug for RequestHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A batch of blocks to generate meshes for, as passed to [`MeshGenerator::request()`].
#[derive(Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub struct GenerationRequest {
    /// Blocks to mesh, in priority order. Never empty, and never longer than
    /// [`StreamConfig::max_blocks_per_batch`](crate::StreamConfig::max_blocks_per_batch).
    pub ids: Vec<BlockId>,
    /// Level of detail from the active [`MeshSettings`].
    pub level_of_detail: LevelOfDetail,
}

impl GenerationRequest {
    /// Constructs a [`GenerationRequest`] from its parts.
    pub fn new(ids: Vec<BlockId>, level_of_detail: LevelOfDetail) -> Self {
        Self {
            ids,
            level_of_detail,
        }
    }
}

/// A service which produces meshes for blocks, asynchronously.
///
/// Implementations typically forward requests to a device API or a worker pool.
pub trait MeshGenerator {
    /// Opaque handle to generated geometry, passed through to the
    /// [`SceneSink`](crate::SceneSink) unexamined.
    type Geometry;

    /// Submits a request and returns its handle.
    ///
    /// The result must eventually be delivered exactly once through `reply` (or not at all,
    /// if the scheduler has been dropped). It may be delivered from any thread, and may even
    /// be delivered before this function returns.
    ///
    /// An error return is fatal to the scheduler.
    fn request(
        &mut self,
        request: GenerationRequest,
        reply: ResultSender<Self::Geometry>,
    ) -> Result<RequestHandle, BoxError>;

    /// Called when new [`MeshSettings`] become active, before any request using them is made.
    ///
    /// An error return is fatal to the scheduler. The default implementation does nothing.
    fn apply_settings(&mut self, settings: &MeshSettings) -> Result<(), BoxError> {
        _ = settings;
        Ok(())
    }
}

/// Per-block outcome reported by the generator.
///
/// This is informational only: it is stored in the [`SceneMeshEntry`](crate::SceneMeshEntry)
/// and never interpreted by the scheduler.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum BlockResult {
    /// The mesh was generated.
    Success,
    /// The mesh could not be generated.
    Failed,
    /// The block's data was not ready.
    Pending,
    /// Part of the mesh was updated.
    PartialUpdate,
}

/// Generated data for one block within a [`GenerationResult`].
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub struct ResolvedBlock<G> {
    /// The block this data is for.
    pub id: BlockId,
    /// Outcome for this block.
    pub result: BlockResult,
    /// Level of detail the mesh was generated at.
    pub level_of_detail: LevelOfDetail,
    /// Options the mesh was generated with.
    pub flags: MeshingFlags,
    /// Per-vertex confidence values, if they were computed.
    pub confidence: Option<Arc<[f32]>>,
    /// The generated mesh.
    pub geometry: G,
}

impl<G> ResolvedBlock<G> {
    /// Constructs a [`ResolvedBlock`] for a successfully generated mesh without confidence
    /// data.
    pub fn new(
        id: BlockId,
        level_of_detail: LevelOfDetail,
        flags: MeshingFlags,
        geometry: G,
    ) -> Self {
        Self {
            id,
            result: BlockResult::Success,
            level_of_detail,
            flags,
            confidence: None,
            geometry,
        }
    }

    /// Returns a copy of this with the given per-block result.
    #[must_use]
    pub fn with_result(mut self, result: BlockResult) -> Self {
        self.result = result;
        self
    }

    /// Returns a copy of this with the given confidence values.
    #[must_use]
    pub fn with_confidence(mut self, confidence: impl Into<Arc<[f32]>>) -> Self {
        self.confidence = Some(confidence.into());
        self
    }
}

/// The completion of one request, delivered through a [`ResultSender`].
#[derive(Debug)]
#[non_exhaustive]
pub struct GenerationResult<G> {
    /// The handle returned by [`MeshGenerator::request()`].
    pub handle: RequestHandle,
    /// Generated blocks, or the reason the whole request failed.
    /// A request-level failure is fatal to the scheduler.
    pub outcome: Result<Vec<ResolvedBlock<G>>, BoxError>,
}

impl<G> GenerationResult<G> {
    /// A successful completion.
    pub fn success(handle: RequestHandle, blocks: Vec<ResolvedBlock<G>>) -> Self {
        Self {
            handle,
            outcome: Ok(blocks),
        }
    }

    /// A failed completion.
    pub fn failure(handle: RequestHandle, error: impl Into<BoxError>) -> Self {
        Self {
            handle,
            outcome: Err(error.into()),
        }
    }
}

/// Delivers [`GenerationResult`]s to the [`BlockMeshStream`](crate::BlockMeshStream) that
/// made the request.
///
/// Results are buffered and applied during the stream's next tick, which is how results
/// produced on other threads are brought back to the thread that owns the scheduler.
/// Cloning this produces another sender to the same stream.
pub struct ResultSender<G> {
    sender: flume::Sender<GenerationResult<G>>,
}

impl<G> ResultSender<G> {
    pub(crate) fn new(sender: flume::Sender<GenerationResult<G>>) -> Self {
        Self { sender }
    }

    /// Delivers a result.
    ///
    /// If the stream no longer exists, the result is silently discarded.
    pub fn send(&self, result: GenerationResult<G>) {
        if let Err(flume::SendError(result)) = self.sender.send(result) {
            log::trace!(
                "discarding result for {handle:?} because the stream was dropped",
                handle = result.handle
            );
        }
    }
}

impl<G> Clone for ResultSender<G> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl<G> fmt::Debug for ResultSender<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultSender")
            .field("queued", &self.sender.len())
            .finish_non_exhaustive()
    }
}
