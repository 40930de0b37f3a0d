//! Scripted collaborators for meshstream tests and for testing code that uses
//! [`BlockMeshStream`](crate::BlockMeshStream).
//!
//! This module is public but doc(hidden).

#![allow(clippy::missing_panics_doc)]

use std::collections::{BTreeMap, VecDeque};
use std::fmt;

use crate::{
    BlockDescriptor, BlockId, BlockSource, BlockState, BoundingVolume, BoxError,
    GenerationRequest, GenerationResult, MeshGenerator, MeshSettings, MeshingFlags,
    RequestHandle, ResolvedBlock, ResultSender, SceneChange, SceneSink,
};

/// Shorthand for a [`BlockId`] with a small number.
pub fn id(n: u64) -> BlockId {
    BlockId::new(0, n)
}

/// Shorthand for a snapshot in which every block has the same state.
pub fn snapshot(state: BlockState, ids: impl IntoIterator<Item = u64>) -> Vec<BlockDescriptor> {
    ids.into_iter()
        .map(|n| BlockDescriptor::new(id(n), state))
        .collect()
}

/// [`BlockSource`] which returns queued-up snapshots in order, and an empty snapshot once
/// they run out.
#[derive(Debug, Default)]
pub struct ScriptedSource {
    script: VecDeque<Result<Vec<BlockDescriptor>, String>>,
    queries: Vec<BoundingVolume>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a snapshot to return from a future query.
    pub fn push(&mut self, snapshot: Vec<BlockDescriptor>) -> &mut Self {
        self.script.push_back(Ok(snapshot));
        self
    }

    /// Queues a failure to return from a future query.
    pub fn push_failure(&mut self, message: &str) -> &mut Self {
        self.script.push_back(Err(message.to_owned()));
        self
    }

    /// The bounds passed to every query so far.
    pub fn queries(&self) -> &[BoundingVolume] {
        &self.queries
    }
}

impl BlockSource for ScriptedSource {
    fn query_blocks(&mut self, bounds: &BoundingVolume) -> Result<Vec<BlockDescriptor>, BoxError> {
        self.queries.push(*bounds);
        match self.script.pop_front() {
            Some(Ok(snapshot)) => Ok(snapshot),
            Some(Err(message)) => Err(message.into()),
            None => Ok(Vec::new()),
        }
    }
}

/// [`MeshGenerator`] whose requests stay outstanding until the test completes them.
pub struct ManualGenerator<G> {
    next_handle: u64,
    outstanding: BTreeMap<RequestHandle, (GenerationRequest, ResultSender<G>)>,
    requests: Vec<(RequestHandle, GenerationRequest)>,
    applied_settings: Vec<MeshSettings>,
    fail_next_request: Option<String>,
    fail_next_apply: Option<String>,
    reuse_next_handle: Option<RequestHandle>,
}

impl<G> ManualGenerator<G> {
    pub fn new() -> Self {
        Self {
            next_handle: 1,
            outstanding: BTreeMap::new(),
            requests: Vec::new(),
            applied_settings: Vec::new(),
            fail_next_request: None,
            fail_next_apply: None,
            reuse_next_handle: None,
        }
    }

    /// Every request made so far, in order.
    pub fn requests(&self) -> &[(RequestHandle, GenerationRequest)] {
        &self.requests
    }

    /// Sizes of every request made so far, in order.
    pub fn request_sizes(&self) -> Vec<usize> {
        self.requests.iter().map(|(_, r)| r.ids.len()).collect()
    }

    /// Handles of requests not yet completed or failed, in increasing order.
    pub fn outstanding(&self) -> Vec<RequestHandle> {
        self.outstanding.keys().copied().collect()
    }

    /// Every settings value applied so far, in order.
    pub fn applied_settings(&self) -> &[MeshSettings] {
        &self.applied_settings
    }

    /// Makes the next call to [`MeshGenerator::request()`] fail.
    pub fn fail_next_request(&mut self, message: &str) {
        self.fail_next_request = Some(message.to_owned());
    }

    /// Makes the next call to [`MeshGenerator::apply_settings()`] fail.
    pub fn fail_next_apply(&mut self, message: &str) {
        self.fail_next_apply = Some(message.to_owned());
    }

    /// Makes the next request be given `handle` instead of a fresh one.
    pub fn reuse_handle_next(&mut self, handle: RequestHandle) {
        self.reuse_next_handle = Some(handle);
    }

    /// Delivers a successful result for every block in the request, with geometry computed
    /// by `geometry`.
    pub fn complete(&mut self, handle: RequestHandle, mut geometry: impl FnMut(BlockId) -> G) {
        let flags = self
            .applied_settings
            .last()
            .map_or(MeshingFlags::empty(), |s| s.flags);
        let (request, reply) = self.take(handle);
        let blocks = request
            .ids
            .iter()
            .map(|&id| ResolvedBlock::new(id, request.level_of_detail, flags, geometry(id)))
            .collect();
        reply.send(GenerationResult::success(handle, blocks));
    }

    /// Delivers a successful result with exactly the given blocks.
    pub fn complete_with(&mut self, handle: RequestHandle, blocks: Vec<ResolvedBlock<G>>) {
        let (_, reply) = self.take(handle);
        reply.send(GenerationResult::success(handle, blocks));
    }

    /// Delivers a failure result.
    pub fn fail(&mut self, handle: RequestHandle, message: &str) {
        let (_, reply) = self.take(handle);
        reply.send(GenerationResult::failure(handle, message));
    }

    /// Completes every outstanding request, oldest first.
    pub fn complete_all(&mut self, mut geometry: impl FnMut(BlockId) -> G) {
        for handle in self.outstanding() {
            self.complete(handle, &mut geometry);
        }
    }

    fn take(&mut self, handle: RequestHandle) -> (GenerationRequest, ResultSender<G>) {
        self.outstanding
            .remove(&handle)
            .unwrap_or_else(|| panic!("{handle:?} is not outstanding"))
    }
}

impl<G> Default for ManualGenerator<G> {
    fn default() -> Self {
        Self::new()
    }
}

impl<G> fmt::Debug for ManualGenerator<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualGenerator")
            .field("next_handle", &self.next_handle)
            .field("outstanding", &self.outstanding.keys())
            .field("requests", &self.requests)
            .field("applied_settings", &self.applied_settings)
            .field("fail_next_request", &self.fail_next_request)
            .field("fail_next_apply", &self.fail_next_apply)
            .field("reuse_next_handle", &self.reuse_next_handle)
            .finish()
    }
}

impl<G> MeshGenerator for ManualGenerator<G> {
    type Geometry = G;

    fn request(
        &mut self,
        request: GenerationRequest,
        reply: ResultSender<G>,
    ) -> Result<RequestHandle, BoxError> {
        if let Some(message) = self.fail_next_request.take() {
            return Err(message.into());
        }
        let handle = self.reuse_next_handle.take().unwrap_or_else(|| {
            let handle = RequestHandle::new(self.next_handle);
            self.next_handle += 1;
            handle
        });
        self.requests.push((handle, request.clone()));
        self.outstanding.insert(handle, (request, reply));
        Ok(handle)
    }

    fn apply_settings(&mut self, settings: &MeshSettings) -> Result<(), BoxError> {
        if let Some(message) = self.fail_next_apply.take() {
            return Err(message.into());
        }
        self.applied_settings.push(settings.clone());
        Ok(())
    }
}

/// A [`SceneChange`] with the entry reduced to its id, for comparison.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[allow(clippy::exhaustive_enums)]
pub enum Event {
    Added(BlockId),
    Updated(BlockId),
    Removed(BlockId),
    Cleared,
}

/// [`SceneSink`] which records the changes it receives.
#[derive(Clone, Debug, Default)]
pub struct EventLog {
    events: Vec<Event>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns and forgets all events received so far.
    pub fn take(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }
}

impl<G> SceneSink<G> for EventLog {
    fn receive(&mut self, change: SceneChange<'_, G>) {
        self.events.push(match change {
            SceneChange::Added(entry) => Event::Added(entry.id),
            SceneChange::Updated(entry) => Event::Updated(entry.id),
            SceneChange::Removed(id) => Event::Removed(id),
            SceneChange::Cleared => Event::Cleared,
        });
    }
}
