use hashbrown::HashMap;

use meshstream_base::time::Instant;

use crate::{BlockDescriptor, BlockId, BlockState, RequestHandle};

/// A generation request which has been submitted and whose result has not yet been
/// reconciled.
#[derive(Debug)]
pub(super) struct Batch {
    /// Blocks requested, with the state each was discovered in.
    /// Blocks deleted while the request is outstanding are removed from this.
    pub members: HashMap<BlockId, BlockState>,
    /// When the request was submitted.
    pub issued: Instant,
}

/// A [`Batch`] removed from the [`InFlight`] tracker for reconciliation.
#[derive(Debug)]
pub(super) struct CompletedBatch {
    pub batch: Batch,
    /// Whether the batch was requested under settings that have since been invalidated.
    pub stale: bool,
    /// Newer descriptors for members of the batch that were discovered while it was
    /// outstanding, and which should be queued again now.
    pub superseded: Vec<BlockDescriptor>,
}

/// Tracks outstanding generation requests.
///
/// Requests made before the most recent invalidation are *stale*: they are kept only so
/// that their results are recognized, and they do not count toward the concurrency limit.
#[derive(Debug, Default)]
pub(super) struct InFlight {
    /// Requests made under the active settings.
    live: HashMap<RequestHandle, Batch>,
    /// Requests made under earlier settings.
    stale: HashMap<RequestHandle, Batch>,
    /// Invariant: contains exactly the members of the batches in `live`, mapped to the
    /// handle of the batch containing them.
    by_block: HashMap<BlockId, RequestHandle>,
    /// Invariant: every key is also a key of `by_block`.
    superseded: HashMap<BlockId, BlockDescriptor>,
}

impl InFlight {
    /// Number of live (non-stale) requests.
    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn stale_len(&self) -> usize {
        self.stale.len()
    }

    pub fn is_outstanding(&self, handle: RequestHandle) -> bool {
        self.live.contains_key(&handle) || self.stale.contains_key(&handle)
    }

    /// Returns whether `id` is a member of a live request.
    pub fn contains_block(&self, id: BlockId) -> bool {
        self.by_block.contains_key(&id)
    }

    /// Records a newly submitted request.
    ///
    /// The caller must ensure that `handle` is not outstanding and that no member is already
    /// in a live request.
    pub fn insert(&mut self, handle: RequestHandle, batch: Batch) {
        for &id in batch.members.keys() {
            let previous = self.by_block.insert(id, handle);
            debug_assert!(previous.is_none(), "{id} requested twice");
        }
        self.live.insert(handle, batch);
    }

    /// Remembers that `descriptor` was discovered while its block is in a live request.
    /// Later descriptors replace earlier ones.
    pub fn supersede(&mut self, descriptor: BlockDescriptor) {
        debug_assert!(self.contains_block(descriptor.id));
        self.superseded.insert(descriptor.id, descriptor);
    }

    /// Removes `id` from every outstanding request, so that its result will be ignored.
    pub fn forget_block(&mut self, id: BlockId) {
        self.superseded.remove(&id);
        if let Some(handle) = self.by_block.remove(&id) {
            if let Some(batch) = self.live.get_mut(&handle) {
                batch.members.remove(&id);
            }
        }
        for batch in self.stale.values_mut() {
            batch.members.remove(&id);
        }
    }

    /// Removes and returns the request with the given handle, if it is outstanding.
    pub fn take(&mut self, handle: RequestHandle) -> Option<CompletedBatch> {
        if let Some(batch) = self.live.remove(&handle) {
            let mut superseded = Vec::new();
            for id in batch.members.keys() {
                self.by_block.remove(id);
                if let Some(descriptor) = self.superseded.remove(id) {
                    superseded.push(descriptor);
                }
            }
            Some(CompletedBatch {
                batch,
                stale: false,
                superseded,
            })
        } else {
            self.stale.remove(&handle).map(|batch| CompletedBatch {
                batch,
                stale: true,
                superseded: Vec::new(),
            })
        }
    }

    /// Marks every live request as stale.
    pub fn invalidate(&mut self) {
        self.stale.extend(self.live.drain());
        self.by_block.clear();
        self.superseded.clear();
    }

    pub fn blocks(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.by_block.keys().copied()
    }

    /// Panics if the internal invariants do not hold.
    pub fn assert_consistent(&self) {
        let member_count: usize = self.live.values().map(|b| b.members.len()).sum();
        assert_eq!(member_count, self.by_block.len(), "by_block out of sync");
        for (id, handle) in &self.by_block {
            assert!(
                self.live
                    .get(handle)
                    .is_some_and(|b| b.members.contains_key(id)),
                "{id} indexed under {handle:?} but not a member"
            );
        }
        for id in self.superseded.keys() {
            assert!(self.by_block.contains_key(id), "superseded {id} not in flight");
        }
        for handle in self.live.keys() {
            assert!(!self.stale.contains_key(handle), "{handle:?} both live and stale");
        }
    }
}
