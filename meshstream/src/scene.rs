use core::fmt;
use std::sync::Arc;

use hashbrown::HashMap;

use crate::{BlockId, BlockResult, LevelOfDetail, MeshingFlags, ResolvedBlock};

/// The scene's record of one resolved block.
///
/// Entries are created when a block's mesh first arrives, overwritten in place when it is
/// regenerated, and dropped when the block is deleted or all meshes are invalidated.
#[derive(Clone, PartialEq)]
#[non_exhaustive]
pub struct SceneMeshEntry<G> {
    /// The block this entry displays.
    pub id: BlockId,
    /// Outcome reported for the most recent generation.
    pub result: BlockResult,
    /// Level of detail of the current mesh.
    pub level_of_detail: LevelOfDetail,
    /// Options the current mesh was generated with.
    pub flags: MeshingFlags,
    /// Per-vertex confidence values of the current mesh, if computed.
    pub confidence: Option<Arc<[f32]>>,
    /// The current mesh.
    pub geometry: G,
    /// Number of times this block has been resolved since the entry was created.
    pub resolution_count: u32,
}

impl<G> SceneMeshEntry<G> {
    fn new(block: ResolvedBlock<G>) -> Self {
        let ResolvedBlock {
            id,
            result,
            level_of_detail,
            flags,
            confidence,
            geometry,
        } = block;
        Self {
            id,
            result,
            level_of_detail,
            flags,
            confidence,
            geometry,
            resolution_count: 1,
        }
    }

    fn overwrite(&mut self, block: ResolvedBlock<G>) {
        let ResolvedBlock {
            id: _,
            result,
            level_of_detail,
            flags,
            confidence,
            geometry,
        } = block;
        self.result = result;
        self.level_of_detail = level_of_detail;
        self.flags = flags;
        self.confidence = confidence;
        self.geometry = geometry;
        self.resolution_count = self.resolution_count.saturating_add(1);
    }
}

impl<G: fmt::Debug> fmt::Debug for SceneMeshEntry<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Self {
            id,
            result,
            level_of_detail,
            flags,
            confidence,
            geometry,
            resolution_count,
        } = self;
        f.debug_struct("SceneMeshEntry")
            .field("id", id)
            .field("result", result)
            .field("level_of_detail", level_of_detail)
            .field("flags", flags)
            .field("confidence_len", &confidence.as_ref().map(|c| c.len()))
            .field("geometry", geometry)
            .field("resolution_count", resolution_count)
            .finish()
    }
}

/// A change to the scene, delivered to a [`SceneSink`].
#[derive(Debug)]
#[non_exhaustive]
pub enum SceneChange<'a, G> {
    /// A block was resolved for the first time; create a renderable object for it.
    Added(&'a SceneMeshEntry<G>),
    /// A block already in the scene was resolved again; replace its renderable object's
    /// mesh.
    Updated(&'a SceneMeshEntry<G>),
    /// A block was deleted; destroy its renderable object.
    Removed(BlockId),
    /// All meshes were invalidated; destroy every renderable object.
    ///
    /// No [`SceneChange::Removed`] is sent for the individual entries.
    Cleared,
}

impl<G> Clone for SceneChange<'_, G> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<G> Copy for SceneChange<'_, G> {}

/// Receives [`SceneChange`]s from a [`BlockMeshStream`](crate::BlockMeshStream).
///
/// Changes are delivered synchronously from within
/// [`BlockMeshStream::tick()`](crate::BlockMeshStream::tick). Any `FnMut(SceneChange<'_, G>)`
/// closure is a sink.
pub trait SceneSink<G> {
    /// Applies one change.
    fn receive(&mut self, change: SceneChange<'_, G>);
}

impl<G, F> SceneSink<G> for F
where
    F: FnMut(SceneChange<'_, G>),
{
    fn receive(&mut self, change: SceneChange<'_, G>) {
        self(change)
    }
}

/// The set of blocks currently resolved, keyed by [`BlockId`].
///
/// This is the scheduler's copy of what the [`SceneSink`] has been told; it can be read at
/// any time through [`BlockMeshStream::scene()`](crate::BlockMeshStream::scene).
pub struct SceneTable<G> {
    entries: HashMap<BlockId, SceneMeshEntry<G>>,
}

impl<G> SceneTable<G> {
    pub(crate) fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Returns the entry for `id`, if it is resolved.
    pub fn get(&self, id: BlockId) -> Option<&SceneMeshEntry<G>> {
        self.entries.get(&id)
    }

    /// Returns whether `id` is resolved.
    pub fn contains(&self, id: BlockId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Returns the number of resolved blocks.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns whether no blocks are resolved.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over all entries in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = &SceneMeshEntry<G>> {
        self.entries.values()
    }

    /// Stores the resolved block and notifies the sink with [`SceneChange::Added`] or
    /// [`SceneChange::Updated`]. Returns whether the entry is new.
    pub(crate) fn resolve(
        &mut self,
        block: ResolvedBlock<G>,
        sink: &mut impl SceneSink<G>,
    ) -> bool {
        use hashbrown::hash_map::Entry;
        match self.entries.entry(block.id) {
            Entry::Occupied(mut oe) => {
                let entry = oe.get_mut();
                entry.overwrite(block);
                sink.receive(SceneChange::Updated(entry));
                false
            }
            Entry::Vacant(ve) => {
                let entry = ve.insert(SceneMeshEntry::new(block));
                sink.receive(SceneChange::Added(entry));
                true
            }
        }
    }

    /// Drops the entry for `id`, notifying the sink only if there was one.
    /// Returns whether there was one.
    pub(crate) fn remove(&mut self, id: BlockId, sink: &mut impl SceneSink<G>) -> bool {
        let removed = self.entries.remove(&id).is_some();
        if removed {
            sink.receive(SceneChange::Removed(id));
        }
        removed
    }

    /// Drops every entry and notifies the sink with a single [`SceneChange::Cleared`].
    pub(crate) fn clear(&mut self, sink: &mut impl SceneSink<G>) {
        self.entries.clear();
        sink.receive(SceneChange::Cleared);
    }
}

impl<G: fmt::Debug> fmt::Debug for SceneTable<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.entries.iter())
            .finish()
    }
}

impl<G> Default for SceneTable<G> {
    fn default() -> Self {
        Self::new()
    }
}
