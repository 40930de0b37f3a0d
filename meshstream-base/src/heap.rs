//! Array-backed binary min-heap.

use core::fmt;
use core::slice;

/// A priority queue which always yields its least element first.
///
/// The ordering is the [`Ord`] implementation of `T`, which must be a total order; callers
/// that want a different order should wrap their items in a key type (for example with
/// [`core::cmp::Reverse`]) rather than expecting a comparator parameter.
///
/// Unlike [`std::collections::BinaryHeap`], this is a *min*-heap, and its sift-down step has
/// a precisely specified tie-break: when both children compare equal, the left child is
/// chosen. This makes the order in which equal items are produced deterministic for a given
/// sequence of operations.
#[derive(Clone)]
pub struct MinHeap<T> {
    /// Invariant: for every index `i > 0`, `items[(i - 1) / 2] <= items[i]`.
    items: Vec<T>,
}

impl<T> MinHeap<T> {
    /// Constructs an empty heap.
    pub const fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Constructs an empty heap with space for at least `capacity` items.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
        }
    }

    /// Returns the number of items in the heap.
    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns whether the heap contains no items.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Removes all items.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Returns the least item without removing it, or [`None`] if the heap is empty.
    #[inline]
    pub fn peek(&self) -> Option<&T> {
        self.items.first()
    }

    /// Iterates over all items in arbitrary order.
    pub fn iter(&self) -> slice::Iter<'_, T> {
        self.items.iter()
    }
}

impl<T: Ord> MinHeap<T> {
    /// Adds an item to the heap.
    ///
    /// Takes *O*(log *n*) time.
    pub fn push(&mut self, item: T) {
        self.items.push(item);
        self.sift_up(self.items.len() - 1);
    }

    /// Removes and returns the least item, or [`None`] if the heap is empty.
    ///
    /// Takes *O*(log *n*) time.
    pub fn pop(&mut self) -> Option<T> {
        let last = self.items.pop()?;
        if self.items.is_empty() {
            return Some(last);
        }
        let root = core::mem::replace(&mut self.items[0], last);
        self.sift_down(0);
        Some(root)
    }

    /// Checks the heap ordering invariant.
    ///
    /// This takes *O*(*n*) time and is intended for tests and debug assertions only.
    pub fn is_consistent(&self) -> bool {
        (1..self.items.len()).all(|child| self.items[(child - 1) / 2] <= self.items[child])
    }

    fn sift_up(&mut self, mut index: usize) {
        while index > 0 {
            let parent = (index - 1) / 2;
            if self.items[index] < self.items[parent] {
                self.items.swap(index, parent);
                index = parent;
            } else {
                break;
            }
        }
    }

    fn sift_down(&mut self, mut index: usize) {
        let len = self.items.len();
        loop {
            let left = 2 * index + 1;
            if left >= len {
                break;
            }
            let right = left + 1;
            // Only prefer the right child if it is strictly smaller.
            let child = if right < len && self.items[right] < self.items[left] {
                right
            } else {
                left
            };
            if self.items[child] < self.items[index] {
                self.items.swap(child, index);
                index = child;
            } else {
                break;
            }
        }
    }
}

impl<T> Default for MinHeap<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: fmt::Debug> fmt::Debug for MinHeap<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Print the root specially since it is the only element whose position is meaningful.
        f.debug_struct("MinHeap")
            .field("len", &self.items.len())
            .field("least", &self.items.first())
            .finish_non_exhaustive()
    }
}

impl<T: Ord> Extend<T> for MinHeap<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        let iter = iter.into_iter();
        self.items.reserve(iter.size_hint().0);
        for item in iter {
            self.push(item);
        }
    }
}

impl<T: Ord> FromIterator<T> for MinHeap<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut heap = Self::new();
        heap.extend(iter);
        heap
    }
}

impl<'a, T> IntoIterator for &'a MinHeap<T> {
    type Item = &'a T;
    type IntoIter = slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
