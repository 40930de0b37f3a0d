use core::fmt;

use hashbrown::{HashMap, HashSet};
use indoc::indoc;
use manyfmt::{Fmt, Refmt as _};

use meshstream_base::heap::MinHeap;
use meshstream_base::time::{Cadence, Duration, Instant, TimeStats};
use meshstream_base::util::StatusText;

use crate::block::QueuedBlock;
use crate::{
    BlockDescriptor, BlockId, BlockPriority, BlockSource, BlockState, BoundingVolume,
    GenerationRequest, GenerationResult, LevelOfDetail, MeshGenerator, MeshSettings,
    MeshingFlags, ResultSender, SceneSink, SceneTable, StreamConfig, StreamError,
    ViewerTransform,
};

mod in_flight;
use in_flight::{Batch, CompletedBatch, InFlight};

#[cfg(test)]
mod tests;

/// Whether a [`BlockMeshStream`] is doing anything when ticked.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum StreamStatus {
    /// Ticks do nothing. This is the initial status; see [`BlockMeshStream::start()`].
    Stopped,
    /// Ticks poll, request, and reconcile.
    Running,
    /// A fatal error occurred; ticks return [`StreamError::Halted`] until
    /// [`BlockMeshStream::restart()`] is called.
    Halted,
}

/// A block which has been discovered and queued but not yet requested.
#[derive(Clone, Copy, Debug)]
struct PendingBlock {
    state: BlockState,
    /// The priority it was queued with. Queue entries with a different priority are
    /// left over from earlier queueings of the same block and are skipped.
    priority: BlockPriority,
}

/// Keeps a scene populated with meshes of the blocks a [`BlockSource`] reports near the
/// viewer, generating them with a [`MeshGenerator`].
///
/// Call [`Self::tick()`] regularly; every other method only records a request that the next
/// tick acts on, or reads state.
pub struct BlockMeshStream<S, M: MeshGenerator> {
    source: S,
    generator: M,

    config: StreamConfig,
    /// Settings most recently given to the generator, or [`None`] if it has not been given
    /// any yet.
    active_settings: Option<MeshSettings>,
    /// Settings to activate at the next tick if they differ from `active_settings`.
    requested_settings: MeshSettings,
    /// Whether to invalidate at the next tick even if the settings are unchanged.
    invalidate_requested: bool,

    status: StreamStatus,
    poll_cadence: Cadence,
    /// The discovery volume computed from the most recent viewer transform.
    bounds: Option<BoundingVolume>,

    /// Blocks waiting to be requested, with their latest reported state.
    /// Invariant: disjoint from the members of live batches in `in_flight`.
    pending: HashMap<BlockId, PendingBlock>,
    /// Invariant: every key of `pending` has an entry here with the same priority.
    /// Entries whose block is not pending, or is pending with a different priority, are
    /// obsolete and skipped.
    queue: MinHeap<QueuedBlock>,
    in_flight: InFlight,

    scene: SceneTable<M::Geometry>,

    result_sender: flume::Sender<GenerationResult<M::Geometry>>,
    result_receiver: flume::Receiver<GenerationResult<M::Geometry>>,
}

impl<S: BlockSource, M: MeshGenerator> BlockMeshStream<S, M> {
    /// Constructs a stream with an empty scene, in the [`StreamStatus::Stopped`] status.
    ///
    /// `settings` are given to the generator, through [`MeshGenerator::apply_settings()`],
    /// on the first tick after starting.
    pub fn new(source: S, generator: M, config: StreamConfig, settings: MeshSettings) -> Self {
        let config = config.repair();
        let (result_sender, result_receiver) = flume::unbounded();
        Self {
            source,
            generator,
            poll_cadence: Cadence::new(config.poll_interval),
            config,
            active_settings: None,
            requested_settings: settings.repair(),
            invalidate_requested: false,
            status: StreamStatus::Stopped,
            bounds: None,
            pending: HashMap::new(),
            queue: MinHeap::new(),
            in_flight: InFlight::default(),
            scene: SceneTable::new(),
            result_sender,
            result_receiver,
        }
    }

    // --- Lifecycle ---

    /// Returns whether the stream is doing anything when ticked.
    pub fn status(&self) -> StreamStatus {
        self.status
    }

    /// Begins discovering and meshing blocks at the next tick.
    ///
    /// Has no effect on a halted stream; use [`Self::restart()`] for that.
    pub fn start(&mut self) {
        if self.status == StreamStatus::Stopped {
            self.status = StreamStatus::Running;
        }
    }

    /// Makes ticks do nothing until [`Self::start()`] is called.
    ///
    /// The scene, queue, and outstanding requests are kept. Results that arrive while stopped
    /// are reconciled after starting again.
    pub fn stop(&mut self) {
        if self.status == StreamStatus::Running {
            self.status = StreamStatus::Stopped;
        }
    }

    /// Recovers from a fatal error, or starts a stopped stream, discarding all meshes.
    ///
    /// The next tick performs a full invalidation, as if the settings had changed.
    pub fn restart(&mut self) {
        self.status = StreamStatus::Running;
        self.invalidate_requested = true;
    }

    /// Requests that every mesh be discarded and regenerated, as if the settings had
    /// changed, at the next tick.
    pub fn refresh(&mut self) {
        self.invalidate_requested = true;
    }

    // --- Settings and configuration ---

    /// Returns the mesh settings most recently set. These may not yet be active.
    pub fn settings(&self) -> &MeshSettings {
        &self.requested_settings
    }

    /// Returns the mesh settings the current meshes are being generated with, or [`None`]
    /// if the stream has not yet been ticked while running.
    pub fn active_settings(&self) -> Option<&MeshSettings> {
        self.active_settings.as_ref()
    }

    /// Changes the mesh settings.
    ///
    /// If they differ from the active settings, the next tick discards all meshes and
    /// regenerates them with the new settings.
    pub fn set_settings(&mut self, settings: MeshSettings) {
        self.requested_settings = settings.repair();
    }

    /// Changes [`MeshSettings::level_of_detail`]. See [`Self::set_settings()`].
    pub fn set_level_of_detail(&mut self, level_of_detail: LevelOfDetail) {
        self.requested_settings.level_of_detail = level_of_detail;
    }

    /// Changes [`MeshSettings::flags`]. See [`Self::set_settings()`].
    pub fn set_flags(&mut self, flags: MeshingFlags) {
        self.requested_settings.flags = flags;
    }

    /// Changes [`MeshSettings::fill_hole_length`]. See [`Self::set_settings()`].
    pub fn set_fill_hole_length(&mut self, length: f32) {
        self.set_settings(MeshSettings {
            fill_hole_length: length,
            ..self.requested_settings.clone()
        });
    }

    /// Changes [`MeshSettings::disconnected_component_area`]. See [`Self::set_settings()`].
    pub fn set_disconnected_component_area(&mut self, area: f32) {
        self.set_settings(MeshSettings {
            disconnected_component_area: area,
            ..self.requested_settings.clone()
        });
    }

    /// Returns the scheduling configuration.
    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Changes the scheduling configuration.
    ///
    /// This does not discard any meshes. New limits apply to requests made from the next
    /// tick on; requests already outstanding are unaffected.
    pub fn set_config(&mut self, config: StreamConfig) {
        let config = config.repair();
        self.poll_cadence.set_interval(config.poll_interval);
        self.config = config;
    }

    // --- Reading state ---

    /// Returns the blocks currently resolved.
    pub fn scene(&self) -> &SceneTable<M::Geometry> {
        &self.scene
    }

    /// Returns the discovery volume computed at the most recent tick.
    pub fn bounds(&self) -> Option<&BoundingVolume> {
        self.bounds.as_ref()
    }

    /// Returns the number of blocks waiting to be requested.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Returns the number of entries in the priority queue, including obsolete entries
    /// that will be skipped.
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Returns the number of outstanding requests made under the active settings.
    pub fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }

    /// Returns the number of outstanding requests made under settings that have since been
    /// replaced.
    pub fn stale_len(&self) -> usize {
        self.in_flight.stale_len()
    }

    /// Returns a sender for delivering results to this stream.
    ///
    /// The generator is given one of these with every request; this method is for
    /// delivering results through some other route.
    pub fn result_sender(&self) -> ResultSender<M::Geometry> {
        ResultSender::new(self.result_sender.clone())
    }

    /// Returns the block source.
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Returns the block source, mutably.
    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    /// Returns the mesh generator.
    pub fn generator(&self) -> &M {
        &self.generator
    }

    /// Returns the mesh generator, mutably.
    pub fn generator_mut(&mut self) -> &mut M {
        &mut self.generator
    }

    // --- Updating ---

    /// Brings the scene up to date.
    ///
    /// In order, this:
    ///
    /// 1. discards all meshes if the settings changed or a refresh was requested,
    /// 2. applies every generation result received since the previous tick,
    /// 3. recomputes the discovery volume from `viewer`,
    /// 4. queries the block source, if the poll interval has elapsed since the previous
    ///    query, and queues blocks needing meshes,
    /// 5. and requests meshes for queued blocks, as far as the configured limits allow.
    ///
    /// `now` is used for polling cadence and latency measurement only; it should normally
    /// be [`Instant::now()`].
    ///
    /// All [`SceneChange`](crate::SceneChange)s are delivered to `sink` before this returns.
    ///
    /// If the stream is stopped, this does nothing. If an error is returned, the stream is
    /// halted; see [`StreamError`].
    pub fn tick(
        &mut self,
        viewer: &ViewerTransform,
        now: Instant,
        sink: &mut impl SceneSink<M::Geometry>,
    ) -> Result<StreamUpdateInfo, StreamError> {
        match self.status {
            StreamStatus::Stopped => return Ok(self.snapshot_info(StreamUpdateInfo::default())),
            StreamStatus::Halted => return Err(StreamError::Halted),
            StreamStatus::Running => {}
        }

        let start_time = Instant::now();
        let mut info = StreamUpdateInfo::default();
        match self.tick_running(viewer, now, sink, &mut info) {
            Ok(()) => {
                info.total_time = Instant::now().saturating_duration_since(start_time);
                Ok(self.snapshot_info(info))
            }
            Err(error) => {
                log::error!(
                    "block mesh stream halted: {error}",
                    error = ErrorChain(&error)
                );
                self.status = StreamStatus::Halted;
                Err(error)
            }
        }
    }

    fn tick_running(
        &mut self,
        viewer: &ViewerTransform,
        now: Instant,
        sink: &mut impl SceneSink<M::Geometry>,
        info: &mut StreamUpdateInfo,
    ) -> Result<(), StreamError> {
        if self.invalidate_requested || self.active_settings.as_ref() != Some(&self.requested_settings)
        {
            self.invalidate(sink, info)?;
        }

        self.reconcile_received(now, sink, info)?;

        let bounds = BoundingVolume::around(viewer, self.config.bounds_extents);
        if self.bounds != Some(bounds) {
            log::debug!("discovery volume changed to {bounds:?}");
            self.bounds = Some(bounds);
        }

        if self.poll_cadence.poll_due(now) {
            self.poll(&bounds, sink, info)?;
        }

        self.issue_batches(now, info)
    }

    /// Discards all meshes and all bookkeeping, and activates the requested settings.
    fn invalidate(
        &mut self,
        sink: &mut impl SceneSink<M::Geometry>,
        info: &mut StreamUpdateInfo,
    ) -> Result<(), StreamError> {
        let initial = self.active_settings.is_none();
        if !initial {
            log::debug!(
                "invalidating all meshes ({pending} pending, {in_flight} in flight, {resolved} resolved)",
                pending = self.pending.len(),
                in_flight = self.in_flight.len(),
                resolved = self.scene.len(),
            );
            self.scene.clear(sink);
            info.invalidated = true;
        }
        self.queue.clear();
        self.pending.clear();
        self.in_flight.invalidate();
        self.poll_cadence.reset();
        self.invalidate_requested = false;

        self.generator
            .apply_settings(&self.requested_settings)
            .map_err(StreamError::ApplySettings)?;
        self.active_settings = Some(self.requested_settings.clone());
        Ok(())
    }

    // --- Discovery ---

    fn poll(
        &mut self,
        bounds: &BoundingVolume,
        sink: &mut impl SceneSink<M::Geometry>,
        info: &mut StreamUpdateInfo,
    ) -> Result<(), StreamError> {
        let descriptors = self
            .source
            .query_blocks(bounds)
            .map_err(StreamError::Query)?;
        log::trace!("block source reported {} blocks", descriptors.len());
        info.polled = true;
        info.descriptors_seen += descriptors.len();

        let mut seen: HashSet<BlockId> = HashSet::with_capacity(descriptors.len());
        for descriptor in descriptors {
            if !seen.insert(descriptor.id) {
                log::warn!(
                    "block source reported {id} more than once in one snapshot",
                    id = descriptor.id
                );
            }
            self.discovered(descriptor, sink, info);
        }
        Ok(())
    }

    /// Applies one descriptor from a discovery snapshot.
    fn discovered(
        &mut self,
        descriptor: BlockDescriptor,
        sink: &mut impl SceneSink<M::Geometry>,
        info: &mut StreamUpdateInfo,
    ) {
        let id = descriptor.id;
        match descriptor.state {
            BlockState::Deleted => {
                // The queue entry, if any, becomes obsolete.
                self.pending.remove(&id);
                self.in_flight.forget_block(id);
                if self.scene.remove(id, sink) {
                    info.removed += 1;
                }
            }
            BlockState::New | BlockState::Updated | BlockState::Unchanged => {
                if self.in_flight.contains_block(id) {
                    if descriptor.state != BlockState::Unchanged {
                        self.in_flight.supersede(descriptor);
                    }
                } else if self.enqueue(descriptor) {
                    info.enqueued += 1;
                }
            }
        }
    }

    /// Queues the block unless it is already queued or already has an up-to-date mesh.
    /// Returns whether it was queued.
    ///
    /// The caller must ensure the block is not in a live request.
    fn enqueue(&mut self, descriptor: BlockDescriptor) -> bool {
        let BlockDescriptor { id, state, .. } = descriptor;
        if self.pending.contains_key(&id)
            || (state == BlockState::Unchanged && self.scene.contains(id))
        {
            return false;
        }
        let Some(priority) = BlockPriority::new(&descriptor, self.bounds.as_ref()) else {
            return false;
        };
        self.pending.insert(id, PendingBlock { state, priority });
        self.queue.push(QueuedBlock { priority, id });
        true
    }

    // --- Requesting ---

    fn issue_batches(&mut self, now: Instant, info: &mut StreamUpdateInfo) -> Result<(), StreamError> {
        while self.in_flight.len() < self.config.max_concurrent_batches && !self.pending.is_empty()
        {
            let members = self.dequeue_batch();
            if members.is_empty() {
                return Err(StreamError::EmptyBatch {
                    pending: self.pending.len(),
                });
            }

            let ids: Vec<BlockId> = members.iter().map(|&(id, _)| id).collect();
            let count = ids.len();
            let level_of_detail = self
                .active_settings
                .as_ref()
                .unwrap_or(&self.requested_settings)
                .level_of_detail;
            let reply = self.result_sender();
            let handle = self
                .generator
                .request(
                    GenerationRequest {
                        ids,
                        level_of_detail,
                    },
                    reply,
                )
                .map_err(|source| StreamError::Request { count, source })?;
            if self.in_flight.is_outstanding(handle) {
                return Err(StreamError::DuplicateHandle(handle));
            }
            log::trace!("requested {count} blocks as {handle:?}");

            self.in_flight.insert(
                handle,
                Batch {
                    members: members.into_iter().collect(),
                    issued: now,
                },
            );
            info.batches_issued += 1;
            info.blocks_requested += count;
        }

        if self.pending.is_empty() {
            // Only obsolete entries remain.
            self.queue.clear();
        }
        Ok(())
    }

    /// Takes up to [`StreamConfig::max_blocks_per_batch`] blocks from the queue, in priority
    /// order, removing them from `pending`.
    fn dequeue_batch(&mut self) -> Vec<(BlockId, BlockState)> {
        let limit = self.config.max_blocks_per_batch;
        let mut members = Vec::with_capacity(limit.min(self.pending.len()));
        while members.len() < limit && !self.pending.is_empty() {
            let Some(QueuedBlock { priority, id }) = self.queue.pop() else {
                break;
            };
            match self.pending.get(&id) {
                Some(pending) if pending.priority == priority => {
                    members.push((id, pending.state));
                    self.pending.remove(&id);
                }
                _ => {}
            }
        }
        members
    }

    // --- Reconciling ---

    fn reconcile_received(
        &mut self,
        now: Instant,
        sink: &mut impl SceneSink<M::Geometry>,
        info: &mut StreamUpdateInfo,
    ) -> Result<(), StreamError> {
        // Results are taken one at a time, so that if one is erroneous, the rest remain
        // available after a restart.
        while let Ok(result) = self.result_receiver.try_recv() {
            self.reconcile(result, now, sink, info)?;
        }
        Ok(())
    }

    fn reconcile(
        &mut self,
        result: GenerationResult<M::Geometry>,
        now: Instant,
        sink: &mut impl SceneSink<M::Geometry>,
        info: &mut StreamUpdateInfo,
    ) -> Result<(), StreamError> {
        let GenerationResult { handle, outcome } = result;
        let Some(CompletedBatch {
            batch,
            stale,
            superseded,
        }) = self.in_flight.take(handle)
        else {
            return Err(StreamError::UnknownHandle(handle));
        };
        let blocks =
            outcome.map_err(|source| StreamError::GenerationFailed { handle, source })?;

        info.batches_reconciled += 1;
        info.batch_latency += TimeStats::one(now.saturating_duration_since(batch.issued));
        if stale {
            log::debug!("applying {handle:?}, which was requested under earlier settings");
        }

        for block in blocks {
            let id = block.id;
            if !batch.members.contains_key(&id) {
                log::debug!("ignoring {id} in result of {handle:?}; not requested or since deleted");
                continue;
            }
            if self.scene.resolve(block, sink) {
                info.added += 1;
            } else {
                info.updated += 1;
            }
        }

        for descriptor in superseded {
            if self.enqueue(descriptor) {
                info.enqueued += 1;
            }
        }
        Ok(())
    }

    // --- Diagnostics ---

    fn snapshot_info(&self, mut info: StreamUpdateInfo) -> StreamUpdateInfo {
        info.queue_len = self.queue.len();
        info.pending = self.pending.len();
        info.in_flight = self.in_flight.len();
        info.stale = self.in_flight.stale_len();
        info
    }

    /// Panics if the internal bookkeeping is inconsistent.
    #[doc(hidden)]
    pub fn assert_consistent(&self) {
        assert!(self.queue.is_consistent(), "heap order violated");
        assert!(
            self.queue.len() >= self.pending.len(),
            "fewer queue entries ({}) than pending blocks ({})",
            self.queue.len(),
            self.pending.len()
        );
        let queued: HashMap<BlockId, BlockPriority> = self
            .queue
            .iter()
            .filter(|q| self.pending.get(&q.id).is_some_and(|p| p.priority == q.priority))
            .map(|q| (q.id, q.priority))
            .collect();
        assert_eq!(queued.len(), self.pending.len(), "pending block missing from queue");
        for id in self.in_flight.blocks() {
            assert!(!self.pending.contains_key(&id), "{id} both pending and in flight");
        }
        assert!(
            self.in_flight.len() <= self.config.max_concurrent_batches,
            "{} requests in flight, limit {}",
            self.in_flight.len(),
            self.config.max_concurrent_batches
        );
        self.in_flight.assert_consistent();
    }
}

impl<S: fmt::Debug, M: MeshGenerator + fmt::Debug> fmt::Debug for BlockMeshStream<S, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Self {
            source,
            generator,
            config,
            active_settings,
            requested_settings,
            invalidate_requested,
            status,
            poll_cadence,
            bounds,
            pending,
            queue,
            in_flight,
            scene,
            result_sender: _,
            result_receiver,
        } = self;
        f.debug_struct("BlockMeshStream")
            .field("source", source)
            .field("generator", generator)
            .field("config", config)
            .field("active_settings", active_settings)
            .field("requested_settings", requested_settings)
            .field("invalidate_requested", invalidate_requested)
            .field("status", status)
            .field("poll_cadence", poll_cadence)
            .field("bounds", bounds)
            .field("pending", &pending.len())
            .field("queue", &queue.len())
            .field("in_flight", &in_flight.len())
            .field("stale", &in_flight.stale_len())
            .field("scene", &scene.len())
            .field("received", &result_receiver.len())
            .finish_non_exhaustive()
    }
}

/// Formats an error and all of its sources on one line.
struct ErrorChain<'a>(&'a (dyn core::error::Error + 'static));

impl fmt::Display for ErrorChain<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)?;
        let mut source = self.0.source();
        while let Some(error) = source {
            write!(f, ": {error}")?;
            source = error.source();
        }
        Ok(())
    }
}

/// What happened during one [`BlockMeshStream::tick()`].
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[non_exhaustive]
pub struct StreamUpdateInfo {
    /// Whether the block source was queried.
    pub polled: bool,
    /// Whether all meshes were discarded because of a settings change or refresh.
    pub invalidated: bool,
    /// Number of descriptors the block source reported.
    pub descriptors_seen: usize,
    /// Number of blocks added to the queue.
    pub enqueued: usize,
    /// Number of blocks removed from the scene because they were deleted.
    pub removed: usize,
    /// Number of generation requests made.
    pub batches_issued: usize,
    /// Total number of blocks in the generation requests made.
    pub blocks_requested: usize,
    /// Number of generation results applied.
    pub batches_reconciled: usize,
    /// Number of blocks added to the scene.
    pub added: usize,
    /// Number of blocks in the scene whose meshes were replaced.
    pub updated: usize,

    /// Number of entries in the priority queue after the tick.
    pub queue_len: usize,
    /// Number of blocks waiting to be requested after the tick.
    pub pending: usize,
    /// Number of outstanding requests after the tick.
    pub in_flight: usize,
    /// Number of outstanding requests made under replaced settings after the tick.
    pub stale: usize,

    /// Time from request to result, for the results applied during this tick.
    pub batch_latency: TimeStats,
    /// Time spent in the tick.
    pub total_time: Duration,
}

impl Fmt<StatusText> for StreamUpdateInfo {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>, _: &StatusText) -> fmt::Result {
        let Self {
            polled,
            invalidated,
            descriptors_seen,
            enqueued,
            removed,
            batches_issued,
            blocks_requested,
            batches_reconciled,
            added,
            updated,
            queue_len,
            pending,
            in_flight,
            stale,
            batch_latency,
            total_time,
        } = self;
        write!(
            fmt,
            indoc! {"
                Tick {total_time}  {poll}{invalidated}
                Discovery {descriptors_seen:4} seen  {enqueued:4} queued  {removed:4} removed
                Requests  {batches_issued:4} made ({blocks_requested:4} blocks)  {batches_reconciled:4} done
                Scene     {added:4} added  {updated:4} updated
                Queue     {pending:4} pending ({queue_len} entries)  {in_flight} in flight  {stale} stale
                Latency   {batch_latency}\
            "},
            total_time = total_time.refmt(&StatusText),
            poll = if *polled { "polled" } else { "      " },
            invalidated = if *invalidated { " INVALIDATED" } else { "" },
            descriptors_seen = descriptors_seen,
            enqueued = enqueued,
            removed = removed,
            batches_issued = batches_issued,
            blocks_requested = blocks_requested,
            batches_reconciled = batches_reconciled,
            added = added,
            updated = updated,
            pending = pending,
            queue_len = queue_len,
            in_flight = in_flight,
            stale = stale,
            batch_latency = batch_latency,
        )
    }
}
