//! Incremental streaming of spatial mesh blocks from a scanning service into a live scene.
//!
//! A scanning service divides the space around the viewer into *blocks*, each of which can
//! be independently discovered, meshed, updated, and deleted. [`BlockMeshStream`] is the
//! scheduler that keeps a scene up to date with those blocks:
//!
//! * it periodically asks a [`BlockSource`] which blocks exist within a [`BoundingVolume`]
//!   around the viewer,
//! * queues blocks that need (re)generation in priority order,
//! * submits them to a [`MeshGenerator`] in batches, bounded in both size and concurrency,
//! * and, as results arrive, maintains a table of [`SceneMeshEntry`] values, notifying a
//!   [`SceneSink`] of every addition, update, and removal.
//!
//! # Getting started
//!
//! Implement [`BlockSource`] and [`MeshGenerator`] for the service you are using, construct a
//! [`BlockMeshStream`], call [`BlockMeshStream::start()`], and then call
//! [`BlockMeshStream::tick()`] once per frame (or at whatever rate suits the application),
//! passing a [`SceneSink`] that creates, replaces, and destroys renderable objects.
//!
//! All scheduler state is mutated only inside [`BlockMeshStream::tick()`]. Mesh generation
//! results may be delivered from any thread through the [`ResultSender`] given to the
//! generator; they are buffered until the next tick.

// Crate-specific lint settings. (General settings can be found in the workspace manifest.)
#![forbid(unsafe_code)]

mod block;
pub use block::{BlockDescriptor, BlockId, BlockPriority, BlockState};

mod bounds;
pub use bounds::{BoundingVolume, ViewerTransform};

mod error;
pub use error::{BoxError, StreamError};

mod generator;
pub use generator::{
    BlockResult, GenerationRequest, GenerationResult, MeshGenerator, RequestHandle, ResolvedBlock,
    ResultSender,
};

mod scene;
pub use scene::{SceneChange, SceneMeshEntry, SceneSink, SceneTable};

mod settings;
pub use settings::{LevelOfDetail, MeshSettings, MeshingFlags, StreamConfig};

mod source;
pub use source::BlockSource;

mod stream;
pub use stream::{BlockMeshStream, StreamStatus, StreamUpdateInfo};

#[doc(hidden)]
pub mod testing;

#[doc(no_inline)]
pub use meshstream_base::math;
#[doc(no_inline)]
pub use meshstream_base::time;
