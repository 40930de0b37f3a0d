//! Simulated scanning service.

use hashbrown::HashSet;
use rand::{Rng as _, SeedableRng as _};
use rand_xoshiro::Xoshiro256PlusPlus;

use meshstream::math::{FreeCoordinate, FreePoint};
use meshstream::{BlockDescriptor, BlockId, BlockSource, BlockState, BoundingVolume, BoxError};

/// How often, per poll, a previously reported block changes.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Churn {
    /// Probability that a block is reported as [`BlockState::Updated`].
    pub update: f64,
    /// Probability that a block is reported as [`BlockState::Deleted`].
    pub delete: f64,
}

/// [`BlockSource`] which divides space into a grid of cubical blocks, all of which exist,
/// and reports every block whose center lies in the queried volume.
///
/// Blocks are reported as new the first time they are seen, and afterward randomly change
/// or disappear according to the [`Churn`].
#[derive(Debug)]
pub(crate) struct Scanner {
    block_size: FreeCoordinate,
    churn: Churn,
    rng: Xoshiro256PlusPlus,
    /// Blocks reported and not since deleted.
    known: HashSet<BlockId>,
    queries: usize,
}

impl Scanner {
    pub fn new(seed: u64, block_size: FreeCoordinate, churn: Churn) -> Self {
        Self {
            block_size,
            churn,
            rng: Xoshiro256PlusPlus::seed_from_u64(seed),
            known: HashSet::new(),
            queries: 0,
        }
    }

    /// Number of queries answered so far.
    pub fn queries(&self) -> usize {
        self.queries
    }

    fn cell_center(&self, cell: [i32; 3]) -> FreePoint {
        FreePoint::from(cell.map(|c| (FreeCoordinate::from(c) + 0.5) * self.block_size))
    }
}

/// Packs grid coordinates into a block identifier.
fn cell_id([x, y, z]: [i32; 3]) -> BlockId {
    BlockId::new(
        u64::from(x.cast_unsigned()),
        (u64::from(y.cast_unsigned()) << 32) | u64::from(z.cast_unsigned()),
    )
}

impl BlockSource for Scanner {
    fn query_blocks(&mut self, bounds: &BoundingVolume) -> Result<Vec<BlockDescriptor>, BoxError> {
        self.queries += 1;

        // Every cell whose center could be inside the volume, whatever its rotation.
        let radius = bounds.extents.to_vector().length() / 2.0;
        let low = ((bounds.center.to_vector() - euclid::vec3(radius, radius, radius))
            / self.block_size)
            .floor();
        let high = ((bounds.center.to_vector() + euclid::vec3(radius, radius, radius))
            / self.block_size)
            .ceil();

        let mut descriptors = Vec::new();
        for x in (low.x as i32)..=(high.x as i32) {
            for y in (low.y as i32)..=(high.y as i32) {
                for z in (low.z as i32)..=(high.z as i32) {
                    let cell = [x, y, z];
                    let center = self.cell_center(cell);
                    if !bounds.contains(center) {
                        continue;
                    }
                    let id = cell_id(cell);
                    let state = if self.known.insert(id) {
                        BlockState::New
                    } else if self.rng.random_bool(self.churn.delete) {
                        self.known.remove(&id);
                        BlockState::Deleted
                    } else if self.rng.random_bool(self.churn.update) {
                        BlockState::Updated
                    } else {
                        BlockState::Unchanged
                    };
                    descriptors.push(BlockDescriptor::new(id, state).with_center(center));
                }
            }
        }
        Ok(descriptors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshstream::ViewerTransform;
    use meshstream::math::FreeSize;
    use pretty_assertions::assert_eq;

    fn count(descriptors: &[BlockDescriptor], state: BlockState) -> usize {
        descriptors.iter().filter(|d| d.state == state).count()
    }

    #[test]
    fn reports_new_then_unchanged() {
        let mut scanner = Scanner::new(
            0,
            1.0,
            Churn {
                update: 0.0,
                delete: 0.0,
            },
        );
        let bounds = BoundingVolume::around(&ViewerTransform::default(), FreeSize::new(4.0, 2.0, 2.0));

        let first = scanner.query_blocks(&bounds).unwrap();
        assert_eq!(first.len(), 4 * 2 * 2);
        assert_eq!(count(&first, BlockState::New), first.len());
        assert!(first.iter().all(|d| bounds.contains(d.center.unwrap())));

        let second = scanner.query_blocks(&bounds).unwrap();
        assert_eq!(count(&second, BlockState::Unchanged), first.len());
        assert_eq!(scanner.queries(), 2);
    }

    #[test]
    fn deleted_blocks_come_back_as_new() {
        let mut scanner = Scanner::new(
            0,
            1.0,
            Churn {
                update: 0.0,
                delete: 1.0,
            },
        );
        let bounds = BoundingVolume::around(&ViewerTransform::default(), FreeSize::new(2.0, 2.0, 2.0));
        let states = |scanner: &mut Scanner| {
            let d = scanner.query_blocks(&bounds).unwrap();
            (count(&d, BlockState::New), count(&d, BlockState::Deleted))
        };
        assert_eq!(states(&mut scanner), (8, 0));
        assert_eq!(states(&mut scanner), (0, 8));
        assert_eq!(states(&mut scanner), (8, 0));
    }

    #[test]
    fn distinct_ids() {
        let ids: HashSet<BlockId> = [[0, 0, 0], [-1, 0, 0], [0, -1, 0], [0, 0, -1], [1, 1, 1]]
            .into_iter()
            .map(cell_id)
            .collect();
        assert_eq!(ids.len(), 5);
    }
}
