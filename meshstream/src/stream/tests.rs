use manyfmt::Refmt as _;
use hashbrown::HashMap;
use pretty_assertions::assert_eq;
use rand::{Rng as _, SeedableRng as _};
use rstest::rstest;

use meshstream_base::math::{FreePoint, FreeSize};
use meshstream_base::time::{Duration, Instant};
use meshstream_base::util::StatusText;

use crate::testing::{Event, EventLog, ManualGenerator, ScriptedSource, id, snapshot};
use crate::{
    BlockDescriptor, BlockMeshStream, BlockState, GenerationResult, LevelOfDetail, MeshSettings,
    RequestHandle, ResolvedBlock, StreamConfig, StreamError, StreamStatus, StreamUpdateInfo,
    ViewerTransform,
};

type Geometry = String;

fn mesh(id: crate::BlockId) -> Geometry {
    format!("mesh of {id}")
}

/// A stream plus everything needed to tick it.
struct Harness {
    stream: BlockMeshStream<ScriptedSource, ManualGenerator<Geometry>>,
    sink: EventLog,
    viewer: ViewerTransform,
    now: Instant,
}

impl Harness {
    /// A started stream which polls on every tick.
    fn new(max_concurrent_batches: usize, max_blocks_per_batch: usize) -> Self {
        Self::with_config(StreamConfig {
            poll_interval: Duration::ZERO,
            max_concurrent_batches,
            max_blocks_per_batch,
            ..StreamConfig::default()
        })
    }

    fn with_config(config: StreamConfig) -> Self {
        let mut stream = BlockMeshStream::new(
            ScriptedSource::new(),
            ManualGenerator::new(),
            config,
            MeshSettings::default(),
        );
        stream.start();
        Self {
            stream,
            sink: EventLog::new(),
            viewer: ViewerTransform::default(),
            now: Instant::now(),
        }
    }

    fn source(&mut self) -> &mut ScriptedSource {
        self.stream.source_mut()
    }

    fn generator(&mut self) -> &mut ManualGenerator<Geometry> {
        self.stream.generator_mut()
    }

    fn try_tick(&mut self) -> Result<StreamUpdateInfo, StreamError> {
        self.now += Duration::from_millis(1);
        let result = self.stream.tick(&self.viewer, self.now, &mut self.sink);
        self.stream.assert_consistent();
        result
    }

    #[track_caller]
    fn tick(&mut self) -> StreamUpdateInfo {
        self.try_tick().unwrap()
    }

    /// Completes the oldest outstanding request.
    fn complete_oldest(&mut self) -> RequestHandle {
        let handle = self.generator().outstanding()[0];
        self.generator().complete(handle, mesh);
        handle
    }

    fn requested_ids(&self, index: usize) -> Vec<u64> {
        self.stream.generator().requests()[index]
            .1
            .ids
            .iter()
            .map(|id| id.to_parts()[1])
            .collect()
    }
}

#[test]
fn stopped_stream_does_nothing() {
    let mut stream = BlockMeshStream::new(
        ScriptedSource::new(),
        ManualGenerator::<Geometry>::new(),
        StreamConfig::default(),
        MeshSettings::default(),
    );
    stream.source_mut().push(snapshot(BlockState::New, 1..=3));
    let mut sink = EventLog::new();
    let now = Instant::now();

    let info = stream
        .tick(&ViewerTransform::default(), now, &mut sink)
        .unwrap();
    assert_eq!(info, StreamUpdateInfo::default());
    assert_eq!(stream.status(), StreamStatus::Stopped);
    assert!(stream.source().queries().is_empty());
    assert!(stream.generator().applied_settings().is_empty());
    assert_eq!(stream.bounds(), None);

    stream.start();
    let info = stream
        .tick(&ViewerTransform::default(), now, &mut sink)
        .unwrap();
    assert!(info.polled);
    assert_eq!(info.enqueued, 3);
    assert_eq!(stream.generator().applied_settings(), &[MeshSettings::default()]);
    assert_eq!(sink.take(), vec![], "first activation should not clear the scene");
}

/// Ten new blocks with limits of 2 batches of 4.
#[test]
fn end_to_end_batching() {
    let mut h = Harness::new(2, 4);
    h.source().push(snapshot(BlockState::New, 1..=10));

    let info = h.tick();
    assert_eq!(h.stream.generator().request_sizes(), vec![4, 4]);
    assert_eq!(h.requested_ids(0), vec![1, 2, 3, 4]);
    assert_eq!(h.requested_ids(1), vec![5, 6, 7, 8]);
    assert_eq!(
        (info.batches_issued, info.blocks_requested, info.pending, info.in_flight),
        (2, 8, 2, 2)
    );
    assert_eq!(h.stream.pending_len(), 2);

    // Nothing more can happen until a batch completes.
    let info = h.tick();
    assert_eq!(info.batches_issued, 0);

    h.complete_oldest();
    let info = h.tick();
    assert_eq!(h.stream.generator().request_sizes(), vec![4, 4, 2]);
    assert_eq!(h.requested_ids(2), vec![9, 10]);
    assert_eq!((info.batches_reconciled, info.added), (1, 4));
    assert_eq!(
        h.sink.take(),
        (1..=4).map(|n| Event::Added(id(n))).collect::<Vec<_>>()
    );
    assert_eq!(h.stream.pending_len(), 0);
    assert_eq!(h.stream.queue_len(), 0);

    h.generator().complete_all(mesh);
    h.tick();
    assert_eq!(h.stream.scene().len(), 10);
    assert_eq!(h.stream.in_flight_len(), 0);
    assert_eq!(
        h.stream.scene().get(id(7)).unwrap().geometry,
        "mesh of blk-7"
    );
}

/// Each request is reconciled when its own result arrives, whatever order they finish in.
#[test]
fn later_batch_completing_first() {
    let mut h = Harness::new(2, 2);
    h.source().push(snapshot(BlockState::New, 1..=4));
    h.tick();
    let [first, second] = h.generator().outstanding()[..] else {
        panic!("expected two requests");
    };
    assert_eq!(h.requested_ids(1), vec![3, 4]);

    h.generator().complete(second, mesh);
    let info = h.tick();
    assert_eq!((info.batches_reconciled, info.added, info.in_flight), (1, 2, 1));
    assert_eq!(h.sink.take(), vec![Event::Added(id(3)), Event::Added(id(4))]);
    assert!(!h.stream.scene().contains(id(1)));

    h.generator().complete(first, mesh);
    let info = h.tick();
    assert_eq!((info.batches_reconciled, info.added, info.in_flight), (1, 2, 0));
    assert_eq!(h.sink.take(), vec![Event::Added(id(1)), Event::Added(id(2))]);
    assert_eq!(h.stream.scene().len(), 4);
}

#[test]
fn requests_use_active_level_of_detail() {
    let mut h = Harness::new(1, 8);
    h.stream.set_level_of_detail(LevelOfDetail::Maximum);
    h.source().push(snapshot(BlockState::New, [1]));
    h.tick();
    assert_eq!(
        h.stream.generator().requests()[0].1.level_of_detail,
        LevelOfDetail::Maximum
    );
}

#[test]
fn nearer_and_newer_blocks_first() {
    let mut h = Harness::new(1, 2);
    h.viewer = ViewerTransform::at(FreePoint::new(0.0, 0.0, 0.0));
    let at = |n: u64, state: BlockState, x: f64| {
        BlockDescriptor::new(id(n), state).with_center(FreePoint::new(x, 0.0, 0.0))
    };
    h.source().push(vec![
        at(1, BlockState::New, 4.0),
        at(2, BlockState::Unchanged, 0.5),
        at(3, BlockState::New, 1.0),
        at(4, BlockState::Updated, 0.0),
        BlockDescriptor::new(id(5), BlockState::New),
    ]);

    h.tick();
    assert_eq!(h.requested_ids(0), vec![3, 1]);
    h.complete_oldest();
    h.tick();
    assert_eq!(h.requested_ids(1), vec![5, 4]);
    h.complete_oldest();
    h.tick();
    assert_eq!(h.requested_ids(2), vec![2]);
}

#[test]
fn unchanged_resolved_block_is_not_regenerated() {
    let mut h = Harness::new(1, 4);
    h.source().push(snapshot(BlockState::New, [1]));
    h.tick();
    h.complete_oldest();
    h.tick();
    assert!(h.stream.scene().contains(id(1)));

    h.source().push(snapshot(BlockState::Unchanged, [1, 2]));
    let info = h.tick();
    assert_eq!(info.enqueued, 1, "only the unresolved block should be queued");
    assert_eq!(h.requested_ids(1), vec![2]);
}

#[test]
fn pending_block_is_not_queued_twice() {
    let mut h = Harness::new(1, 1);
    h.source().push(snapshot(BlockState::New, [1, 2, 3]));
    h.tick();
    assert_eq!(h.stream.pending_len(), 2);

    h.source().push(snapshot(BlockState::Updated, [2, 3]));
    let info = h.tick();
    assert_eq!(info.enqueued, 0);
    assert_eq!(h.stream.pending_len(), 2);
    assert_eq!(h.stream.queue_len(), 2);
}

#[test]
fn resolving_same_block_twice_updates() {
    let mut h = Harness::new(1, 4);
    h.source().push(snapshot(BlockState::New, [1]));
    h.tick();
    h.complete_oldest();
    h.tick();

    h.source().push(snapshot(BlockState::Updated, [1]));
    h.tick();
    h.complete_oldest();
    let info = h.tick();
    assert_eq!((info.added, info.updated), (0, 1));
    assert_eq!(
        h.sink.take(),
        vec![Event::Added(id(1)), Event::Updated(id(1))]
    );
    assert_eq!(h.stream.scene().len(), 1);
    assert_eq!(h.stream.scene().get(id(1)).unwrap().resolution_count, 2);
}

#[test]
fn duplicate_block_within_one_result() {
    let mut h = Harness::new(1, 4);
    h.source().push(snapshot(BlockState::New, [1]));
    h.tick();
    let handle = h.generator().outstanding()[0];
    let settings = MeshSettings::default();
    let block = |g: &str| {
        ResolvedBlock::new(id(1), settings.level_of_detail, settings.flags, g.to_owned())
    };
    h.generator()
        .complete_with(handle, vec![block("first"), block("second")]);
    h.tick();
    assert_eq!(
        h.sink.take(),
        vec![Event::Added(id(1)), Event::Updated(id(1))]
    );
    assert_eq!(h.stream.scene().get(id(1)).unwrap().geometry, "second");
}

#[test]
fn blocks_not_requested_are_ignored() {
    let mut h = Harness::new(1, 4);
    h.source().push(snapshot(BlockState::New, [1]));
    h.tick();
    let handle = h.generator().outstanding()[0];
    let settings = MeshSettings::default();
    h.generator().complete_with(
        handle,
        vec![
            ResolvedBlock::new(id(1), settings.level_of_detail, settings.flags, "a".into()),
            ResolvedBlock::new(id(9), settings.level_of_detail, settings.flags, "b".into()),
        ],
    );
    let info = h.tick();
    assert_eq!(info.added, 1);
    assert_eq!(h.sink.take(), vec![Event::Added(id(1))]);
}

#[test]
fn delete_removes_everywhere() {
    let mut h = Harness::new(1, 1);
    h.source().push(snapshot(BlockState::New, [1, 2, 3, 4]));
    h.tick();
    h.complete_oldest();
    h.tick();
    // Block 1 is resolved, block 2 is in flight, blocks 3 and 4 are pending.
    assert_eq!(h.sink.take(), vec![Event::Added(id(1))]);
    assert_eq!(h.stream.pending_len(), 2);

    h.source()
        .push(snapshot(BlockState::Deleted, [1, 2, 3, 77]));
    let info = h.tick();
    assert_eq!(info.removed, 1);
    assert_eq!(h.sink.take(), vec![Event::Removed(id(1))]);
    assert!(!h.stream.scene().contains(id(1)));
    assert_eq!(h.stream.pending_len(), 1);

    // The in-flight result for block 2 is discarded; block 4 is requested next.
    h.complete_oldest();
    let info = h.tick();
    assert_eq!((info.batches_reconciled, info.added), (1, 0));
    assert_eq!(h.sink.take(), vec![]);
    assert_eq!(h.requested_ids(2), vec![4]);
    assert_eq!(h.stream.pending_len(), 0);
    assert_eq!(h.stream.queue_len(), 0);
}

#[test]
fn deleted_then_rediscovered_is_queued_again() {
    let mut h = Harness::new(1, 1);
    h.source().push(snapshot(BlockState::New, [1, 2]));
    h.tick();
    h.source().push(snapshot(BlockState::Deleted, [2]));
    h.tick();
    h.source().push(snapshot(BlockState::New, [2]));
    let info = h.tick();
    assert_eq!(info.enqueued, 1);

    h.complete_oldest();
    h.tick();
    assert_eq!(h.requested_ids(1), vec![2]);
}

#[test]
fn update_while_in_flight_is_requested_again() {
    let mut h = Harness::new(1, 4);
    h.source().push(snapshot(BlockState::New, [1]));
    h.tick();

    h.source().push(snapshot(BlockState::Updated, [1]));
    let info = h.tick();
    assert_eq!(info.enqueued, 0);
    assert_eq!(h.stream.pending_len(), 0);

    h.complete_oldest();
    let info = h.tick();
    assert_eq!((info.added, info.enqueued, info.batches_issued), (1, 1, 1));
    assert_eq!(h.requested_ids(1), vec![1]);
}

#[test]
fn unchanged_while_in_flight_is_not_requested_again() {
    let mut h = Harness::new(1, 4);
    h.source().push(snapshot(BlockState::New, [1]));
    h.tick();
    h.source().push(snapshot(BlockState::Unchanged, [1]));
    h.tick();
    h.complete_oldest();
    let info = h.tick();
    assert_eq!((info.added, info.batches_issued), (1, 0));
}

#[test]
fn settings_change_invalidates_everything() {
    let mut h = Harness::new(1, 2);
    h.source().push(snapshot(BlockState::New, [1, 2, 3, 4, 5]));
    h.tick();
    h.complete_oldest();
    h.tick();
    // Blocks 1 and 2 are resolved, 3 and 4 are in flight, 5 is pending.
    let stale_handle = h.generator().outstanding()[0];
    h.sink.take();

    // Setting a field to its current value is not a change.
    h.stream.set_fill_hole_length(MeshSettings::default().fill_hole_length);
    assert!(!h.tick().invalidated);

    h.stream.set_level_of_detail(LevelOfDetail::Minimum);
    let info = h.tick();
    assert!(info.invalidated);
    assert_eq!(h.sink.take(), vec![Event::Cleared]);
    assert!(h.stream.scene().is_empty());
    assert_eq!(h.stream.pending_len(), 0);
    assert_eq!(h.stream.queue_len(), 0);
    assert_eq!((h.stream.in_flight_len(), h.stream.stale_len()), (0, 1));
    assert_eq!(
        h.stream.active_settings().map(|s| s.level_of_detail),
        Some(LevelOfDetail::Minimum)
    );
    assert_eq!(h.stream.generator().applied_settings().len(), 2);

    // The stale request does not occupy the only slot.
    h.source().push(snapshot(BlockState::Unchanged, [1, 2]));
    let info = h.tick();
    assert_eq!((info.enqueued, info.batches_issued), (2, 1));
    assert_eq!(h.requested_ids(2), vec![1, 2]);
    assert_eq!(
        h.stream.generator().requests()[2].1.level_of_detail,
        LevelOfDetail::Minimum
    );

    // The stale request still resolves into the scene.
    h.generator().complete(stale_handle, mesh);
    let info = h.tick();
    assert_eq!((info.batches_reconciled, info.added), (1, 2));
    assert_eq!(
        h.sink.take(),
        vec![Event::Added(id(3)), Event::Added(id(4))]
    );
    assert_eq!(h.stream.stale_len(), 0);
}

#[test]
fn refresh_invalidates_without_settings_change() {
    let mut h = Harness::new(1, 4);
    h.source().push(snapshot(BlockState::New, [1]));
    h.tick();
    h.complete_oldest();
    h.tick();
    h.sink.take();

    h.stream.refresh();
    h.source().push(snapshot(BlockState::Unchanged, [1]));
    let info = h.tick();
    assert!(info.invalidated);
    assert_eq!(info.enqueued, 1);
    assert_eq!(h.sink.take(), vec![Event::Cleared]);
}

#[rstest]
fn limits_are_respected(
    #[values(1, 3)] max_concurrent_batches: usize,
    #[values(1, 4, 30)] max_blocks_per_batch: usize,
) {
    let mut h = Harness::new(max_concurrent_batches, max_blocks_per_batch);
    h.source().push(snapshot(BlockState::New, 1..=25));
    for _ in 0..100 {
        h.tick();
        assert!(h.stream.in_flight_len() <= max_concurrent_batches);
        if let Some(&handle) = h.generator().outstanding().first() {
            h.generator().complete(handle, mesh);
        }
    }
    assert_eq!(h.stream.scene().len(), 25);
    for size in h.stream.generator().request_sizes() {
        assert!((1..=max_blocks_per_batch).contains(&size), "{size}");
    }
}

#[test]
fn set_config_changes_limits_without_invalidating() {
    let mut h = Harness::new(1, 2);
    h.source().push(snapshot(BlockState::New, 1..=6));
    h.tick();
    assert_eq!(h.stream.in_flight_len(), 1);

    h.stream.set_config(StreamConfig {
        max_concurrent_batches: 3,
        ..h.stream.config().clone()
    });
    let info = h.tick();
    assert!(!info.invalidated);
    assert_eq!(info.batches_issued, 2);
    assert_eq!(h.stream.generator().request_sizes(), vec![2, 2, 2]);
}

#[test]
fn polls_on_cadence() {
    let mut h = Harness::with_config(StreamConfig {
        poll_interval: Duration::from_millis(250),
        ..StreamConfig::default()
    });
    let t0 = h.now;
    let poll_at = |h: &mut Harness, ms: u64| {
        h.stream
            .tick(&h.viewer, t0 + Duration::from_millis(ms), &mut h.sink)
            .unwrap()
            .polled
    };
    assert!(poll_at(&mut h, 0));
    assert!(!poll_at(&mut h, 100));
    assert!(poll_at(&mut h, 250));
    assert!(!poll_at(&mut h, 400));
    h.stream.refresh();
    assert!(poll_at(&mut h, 401), "invalidation should poll immediately");
    assert_eq!(h.stream.source().queries().len(), 3);
}

#[test]
fn bounds_follow_viewer() {
    let mut h = Harness::with_config(StreamConfig {
        poll_interval: Duration::ZERO,
        bounds_extents: FreeSize::new(2.0, 4.0, 6.0),
        ..StreamConfig::default()
    });
    h.tick();
    h.viewer = ViewerTransform::at(FreePoint::new(5.0, 0.0, -1.0));
    h.tick();

    let queries = h.stream.source().queries();
    assert_eq!(queries[0].center, FreePoint::origin());
    assert_eq!(queries[1].center, FreePoint::new(5.0, 0.0, -1.0));
    assert_eq!(queries[1].extents, FreeSize::new(2.0, 4.0, 6.0));
    assert_eq!(h.stream.bounds(), Some(&queries[1]));
}

// --- Errors ---

#[test]
fn query_failure_halts_and_restart_recovers() {
    let mut h = Harness::new(1, 4);
    h.source().push(snapshot(BlockState::New, [1]));
    h.tick();
    h.complete_oldest();
    h.tick();
    h.sink.take();

    h.source().push_failure("scanner unavailable");
    let error = h.try_tick().unwrap_err();
    assert!(matches!(error, StreamError::Query(_)), "{error:?}");
    assert_eq!(h.stream.status(), StreamStatus::Halted);

    // Halted: nothing happens, and the scene is kept.
    h.source().push(snapshot(BlockState::New, [2]));
    assert!(matches!(h.try_tick(), Err(StreamError::Halted)));
    assert!(h.stream.scene().contains(id(1)));
    assert_eq!(h.stream.source().queries().len(), 3);

    // start() does not recover.
    h.stream.start();
    assert_eq!(h.stream.status(), StreamStatus::Halted);

    h.stream.restart();
    let info = h.tick();
    assert!(info.invalidated);
    assert_eq!(info.enqueued, 1);
    assert_eq!(h.sink.take(), vec![Event::Cleared]);
    assert_eq!(h.stream.status(), StreamStatus::Running);
}

#[test]
fn unknown_handle_halts() {
    let mut h = Harness::new(1, 4);
    h.stream
        .result_sender()
        .send(GenerationResult::success(RequestHandle::new(99), vec![]));
    let error = h.try_tick().unwrap_err();
    assert!(
        matches!(error, StreamError::UnknownHandle(handle) if handle == RequestHandle::new(99)),
        "{error:?}"
    );
    assert!(error.is_protocol_violation());
    assert_eq!(h.stream.status(), StreamStatus::Halted);
}

#[test]
fn batch_failure_halts() {
    let mut h = Harness::new(1, 4);
    h.source().push(snapshot(BlockState::New, [1, 2]));
    h.tick();
    let handle = h.generator().outstanding()[0];
    h.generator().fail(handle, "out of memory");
    let error = h.try_tick().unwrap_err();
    assert!(
        matches!(error, StreamError::GenerationFailed { handle: h2, .. } if h2 == handle),
        "{error:?}"
    );
    assert!(h.stream.scene().is_empty());
}

#[test]
fn request_failure_halts() {
    let mut h = Harness::new(2, 4);
    h.generator().fail_next_request("queue full");
    h.source().push(snapshot(BlockState::New, [1, 2, 3]));
    let error = h.try_tick().unwrap_err();
    assert!(
        matches!(error, StreamError::Request { count: 3, .. }),
        "{error:?}"
    );
}

#[test]
fn apply_settings_failure_halts() {
    let mut h = Harness::new(1, 4);
    h.tick();
    h.generator().fail_next_apply("unsupported");
    h.stream.set_level_of_detail(LevelOfDetail::Maximum);
    let error = h.try_tick().unwrap_err();
    assert!(matches!(error, StreamError::ApplySettings(_)), "{error:?}");
    assert_eq!(
        h.stream.active_settings().map(|s| s.level_of_detail),
        Some(LevelOfDetail::Medium)
    );

    // Retried on restart.
    h.stream.restart();
    h.tick();
    assert_eq!(
        h.stream.active_settings().map(|s| s.level_of_detail),
        Some(LevelOfDetail::Maximum)
    );
}

#[test]
fn duplicate_handle_halts() {
    let mut h = Harness::new(2, 1);
    h.source().push(snapshot(BlockState::New, [1, 2]));
    // The first request takes the reused handle, so the second is also given handle 1.
    h.generator().reuse_handle_next(RequestHandle::new(1));
    let error = h.try_tick().unwrap_err();
    assert!(
        matches!(error, StreamError::DuplicateHandle(handle) if handle == RequestHandle::new(1)),
        "{error:?}"
    );
}

#[test]
fn stop_keeps_state() {
    let mut h = Harness::new(1, 4);
    h.source().push(snapshot(BlockState::New, [1]));
    h.tick();
    h.stream.stop();
    h.complete_oldest();
    let info = h.tick();
    assert_eq!(info.batches_reconciled, 0);
    assert_eq!(info.in_flight, 1);
    assert!(h.stream.scene().is_empty());

    h.stream.start();
    let info = h.tick();
    assert_eq!(info.added, 1);
}

#[test]
fn update_info_status_text() {
    let mut h = Harness::new(2, 4);
    h.source().push(snapshot(BlockState::New, 1..=10));
    let info = h.tick();
    let text = info.refmt(&StatusText).to_string();
    assert!(text.contains("   2 made (   8 blocks)"), "{text}");
    assert!(text.contains("   2 pending (2 entries)  2 in flight  0 stale"), "{text}");
    assert_eq!(text.lines().count(), 6, "{text}");
}

/// Random discovery snapshots, completions in random order, and occasional settings changes.
/// The harness checks the scheduler's bookkeeping after every tick.
#[rstest]
fn random_churn_stays_consistent(#[values(1, 2, 3, 4, 5, 6, 7, 8)] seed: u64) {
    let mut rng = rand_xoshiro::Xoshiro256PlusPlus::seed_from_u64(seed);
    let mut h = Harness::new(3, 4);
    // Last state reported for each block.
    let mut reported: HashMap<u64, BlockState> = HashMap::new();

    for _ in 0..400 {
        let mut descriptors = Vec::new();
        for n in 0..30 {
            if !rng.random_bool(0.3) {
                continue;
            }
            let state = match rng.random_range(0..4) {
                0 => BlockState::New,
                1 => BlockState::Updated,
                2 => BlockState::Unchanged,
                _ => BlockState::Deleted,
            };
            reported.insert(n, state);
            descriptors.push(BlockDescriptor::new(id(n), state));
        }
        h.source().push(descriptors);

        let outstanding = h.generator().outstanding();
        if !outstanding.is_empty() && rng.random_bool(0.5) {
            let handle = outstanding[rng.random_range(0..outstanding.len())];
            h.generator().complete(handle, mesh);
        }
        if rng.random_bool(0.02) {
            let lod = match h.stream.settings().level_of_detail {
                LevelOfDetail::Minimum => LevelOfDetail::Medium,
                LevelOfDetail::Medium => LevelOfDetail::Maximum,
                LevelOfDetail::Maximum => LevelOfDetail::Minimum,
            };
            h.stream.set_level_of_detail(lod);
        }
        h.tick();
    }

    // Drain without further discovery.
    for _ in 0..100 {
        if h.stream.pending_len() == 0
            && h.stream.in_flight_len() == 0
            && h.stream.stale_len() == 0
        {
            break;
        }
        h.generator().complete_all(mesh);
        h.tick();
    }
    assert_eq!(
        (h.stream.pending_len(), h.stream.in_flight_len(), h.stream.stale_len()),
        (0, 0, 0)
    );
    for entry in h.stream.scene().iter() {
        let n = entry.id.to_parts()[1];
        assert_ne!(reported.get(&n), Some(&BlockState::Deleted), "{} was deleted", entry.id);
    }
}
