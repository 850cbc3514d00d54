//! # Thread-safe LRU index over fixed slot ids
//!
//! `LruIndex` tracks recency over the slot ids `[0, capacity)` of a
//! fixed-size store. It answers "which slot is least recently used?" and
//! "this slot was just used" in O(1); it never owns values.
//!
//! ## Architecture
//!
//! ```text
//!   ┌──────────────────────────────────────────────────────────────┐
//!   │                         LruIndex                             │
//!   │                                                              │
//!   │   ┌──────────────────────────────────────────────────────┐   │
//!   │   │              Mutex<IndexList>                        │   │
//!   │   │                                                      │   │
//!   │   │  nodes[0..capacity]  (prev/next by slot id)          │   │
//!   │   │                                                      │   │
//!   │   │  tail ──► [s0] ◄──► [s3] ◄──► [s1] ◄── head          │   │
//!   │   │   (LRU)                               (MRU)          │   │
//!   │   └──────────────────────────────────────────────────────┘   │
//!   └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Operations
//!
//! | Method                          | Complexity | Lock  |
//! |---------------------------------|------------|-------|
//! | `new(capacity)`                 | O(n)       | None  |
//! | `new_prepopulated(capacity)`    | O(n)       | None  |
//! | `least_recently_used()`         | O(1)       | Mutex |
//! | `mark_most_recently_used(slot)` | O(1)       | Mutex |
//! | `snapshot()`                    | O(n)       | Mutex |
//! | `restore(snapshot)`             | O(n)       | None  |
//!
//! ## Prepopulation
//!
//! A prepopulated index already tracks every slot, ascending from least to
//! most recently used. A store that always evicts `least_recently_used()`
//! then fills its free slots first, in id order, and needs no separate
//! "not yet full" branch: untouched slots stay at the LRU end.
//!
//! ## Thread Safety
//!
//! Every operation runs under one internal `parking_lot::Mutex`, held only for
//! the list mutation itself. Callers must not hold it across I/O or while
//! waiting on other components.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::ds::IndexList;
use crate::error::{EmptyIndexError, SnapshotError};

/// Recency order over the slot ids `[0, capacity)`.
///
/// # Example
///
/// ```
/// use imagecache::policy::lru_index::LruIndex;
///
/// let index = LruIndex::new_prepopulated(3);
/// assert_eq!(index.least_recently_used(), Ok(0));
///
/// index.mark_most_recently_used(0);
/// assert_eq!(index.least_recently_used(), Ok(1));
/// assert_eq!(index.order(), vec![1, 2, 0]);
/// ```
#[derive(Debug)]
pub struct LruIndex {
    list: Mutex<IndexList>,
}

impl LruIndex {
    /// Creates an index over `capacity` slot ids, none of them tracked yet.
    pub fn new(capacity: usize) -> Self {
        Self {
            list: Mutex::new(IndexList::new(capacity)),
        }
    }

    /// Creates an index tracking every slot id, `0` least recently used.
    pub fn new_prepopulated(capacity: usize) -> Self {
        Self {
            list: Mutex::new(IndexList::with_all_linked(capacity)),
        }
    }

    /// Number of slot ids this index covers.
    pub fn capacity(&self) -> usize {
        self.list.lock().capacity()
    }

    /// Number of slot ids currently tracked.
    pub fn len(&self) -> usize {
        self.list.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.lock().is_empty()
    }

    /// Returns `true` if `slot` is tracked.
    pub fn contains(&self, slot: usize) -> bool {
        self.list.lock().contains(slot)
    }

    /// Returns the least recently used slot without changing the order.
    ///
    /// Fails with [`EmptyIndexError`] when no slot is tracked.
    pub fn least_recently_used(&self) -> Result<usize, EmptyIndexError> {
        self.list.lock().back().ok_or(EmptyIndexError)
    }

    /// Returns the most recently used slot, if any.
    pub fn most_recently_used(&self) -> Option<usize> {
        self.list.lock().front()
    }

    /// Moves `slot` to the most recently used end, tracking it first if it was
    /// not tracked.
    ///
    /// Returns `false` if `slot` is outside `[0, capacity)`.
    pub fn mark_most_recently_used(&self, slot: usize) -> bool {
        let moved = self.list.lock().move_to_front(slot);
        if moved {
            tracing::trace!(slot, "lru: marked most recently used");
        }
        moved
    }

    /// Tracked slot ids from least to most recently used.
    pub fn order(&self) -> Vec<usize> {
        self.list.lock().iter_back_to_front().collect()
    }

    /// Captures the full recency order for persistence.
    pub fn snapshot(&self) -> LruSnapshot {
        let list = self.list.lock();
        LruSnapshot {
            capacity: list.capacity(),
            order: list.iter_back_to_front().collect(),
        }
    }

    /// Rebuilds an index whose order is identical to `snapshot`.
    pub fn restore(snapshot: &LruSnapshot) -> Result<Self, SnapshotError> {
        snapshot.validate()?;
        let mut list = IndexList::new(snapshot.capacity);
        for &slot in &snapshot.order {
            list.move_to_front(slot);
        }
        Ok(Self {
            list: Mutex::new(list),
        })
    }

    #[cfg(any(test, debug_assertions))]
    pub fn debug_validate_invariants(&self) {
        self.list.lock().debug_validate_invariants();
    }
}

/// Persisted form of an [`LruIndex`]: slot ids ordered least to most
/// recently used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LruSnapshot {
    pub capacity: usize,
    pub order: Vec<usize>,
}

impl LruSnapshot {
    /// Checks that `order` is a duplicate-free list of in-range slot ids.
    ///
    /// Ids absent from `order` are valid: they were never tracked, as in an
    /// index built with [`LruIndex::new`].
    pub fn validate(&self) -> Result<(), SnapshotError> {
        if self.order.len() > self.capacity {
            return Err(SnapshotError::LengthMismatch {
                expected: self.capacity,
                actual: self.order.len(),
            });
        }
        let mut seen = vec![false; self.capacity];
        for &id in &self.order {
            let Some(flag) = seen.get_mut(id) else {
                return Err(SnapshotError::OutOfRange {
                    id,
                    capacity: self.capacity,
                });
            };
            if *flag {
                return Err(SnapshotError::Duplicate(id));
            }
            *flag = true;
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<String, SnapshotError> {
        serde_json::to_string(self).map_err(|e| SnapshotError::Malformed(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self, SnapshotError> {
        let snapshot: Self =
            serde_json::from_str(json).map_err(|e| SnapshotError::Malformed(e.to_string()))?;
        snapshot.validate()?;
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Barrier};
    use std::thread;

    use super::*;

    // ==============================================
    // CORRECTNESS
    // ==============================================

    #[test]
    fn empty_index_reports_error() {
        let index = LruIndex::new(0);
        assert_eq!(index.least_recently_used(), Err(EmptyIndexError));
        assert!(!index.mark_most_recently_used(0));

        let prepopulated = LruIndex::new_prepopulated(0);
        assert_eq!(prepopulated.least_recently_used(), Err(EmptyIndexError));
    }

    #[test]
    fn untracked_index_has_no_lru_until_first_mark() {
        let index = LruIndex::new(4);
        assert_eq!(index.least_recently_used(), Err(EmptyIndexError));

        index.mark_most_recently_used(2);
        assert_eq!(index.least_recently_used(), Ok(2));
        index.mark_most_recently_used(3);
        assert_eq!(index.least_recently_used(), Ok(2));
        assert_eq!(index.order(), vec![2, 3]);
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn prepopulated_order_is_ascending() {
        let index = LruIndex::new_prepopulated(4);
        assert_eq!(index.order(), vec![0, 1, 2, 3]);
        assert_eq!(index.least_recently_used(), Ok(0));
        assert_eq!(index.most_recently_used(), Some(3));
        assert_eq!(index.len(), 4);
    }

    #[test]
    fn lru_query_does_not_reorder() {
        let index = LruIndex::new_prepopulated(3);
        for _ in 0..5 {
            assert_eq!(index.least_recently_used(), Ok(0));
        }
        assert_eq!(index.order(), vec![0, 1, 2]);
    }

    #[test]
    fn marking_walks_the_lru_through_every_slot() {
        let index = LruIndex::new_prepopulated(3);
        for expected in [0, 1, 2, 0, 1] {
            let lru = index.least_recently_used().unwrap();
            assert_eq!(lru, expected);
            index.mark_most_recently_used(lru);
        }
        index.debug_validate_invariants();
    }

    #[test]
    fn out_of_range_mark_is_rejected() {
        let index = LruIndex::new_prepopulated(2);
        assert!(!index.mark_most_recently_used(2));
        assert_eq!(index.order(), vec![0, 1]);
    }

    // ==============================================
    // PERSISTENCE
    // ==============================================

    #[test]
    fn snapshot_restore_reproduces_order() {
        let index = LruIndex::new_prepopulated(5);
        index.mark_most_recently_used(2);
        index.mark_most_recently_used(0);
        index.mark_most_recently_used(4);

        let snapshot = index.snapshot();
        assert_eq!(snapshot.order, vec![1, 3, 2, 0, 4]);

        let restored = LruIndex::restore(&snapshot).unwrap();
        assert_eq!(restored.order(), index.order());
        assert_eq!(restored.capacity(), 5);

        // identical eviction behavior after restore
        for _ in 0..7 {
            let a = index.least_recently_used().unwrap();
            let b = restored.least_recently_used().unwrap();
            assert_eq!(a, b);
            index.mark_most_recently_used(a);
            restored.mark_most_recently_used(b);
        }
    }

    #[test]
    fn snapshot_json_round_trip() {
        let index = LruIndex::new(4);
        index.mark_most_recently_used(3);
        index.mark_most_recently_used(1);

        let json = index.snapshot().to_json().unwrap();
        let snapshot = LruSnapshot::from_json(&json).unwrap();
        let restored = LruIndex::restore(&snapshot).unwrap();
        assert_eq!(restored.order(), vec![3, 1]);
        assert!(!restored.contains(0));
    }

    #[test]
    fn partial_order_restores_with_untracked_ids() {
        let snapshot = LruSnapshot {
            capacity: 4,
            order: vec![2],
        };
        assert_eq!(snapshot.validate(), Ok(()));

        let restored = LruIndex::restore(&snapshot).unwrap();
        assert_eq!(restored.len(), 1);
        assert_eq!(restored.least_recently_used(), Ok(2));
        assert!(!restored.contains(0));

        // untracked ids join at the MRU end when first marked
        assert!(restored.mark_most_recently_used(0));
        assert_eq!(restored.order(), vec![2, 0]);
    }

    #[test]
    fn restore_rejects_malformed_orders() {
        let dup = LruSnapshot {
            capacity: 3,
            order: vec![0, 1, 0],
        };
        assert_eq!(LruIndex::restore(&dup).unwrap_err(), SnapshotError::Duplicate(0));

        let out_of_range = LruSnapshot {
            capacity: 2,
            order: vec![0, 5],
        };
        assert_eq!(
            LruIndex::restore(&out_of_range).unwrap_err(),
            SnapshotError::OutOfRange { id: 5, capacity: 2 }
        );

        let too_long = LruSnapshot {
            capacity: 1,
            order: vec![0, 1],
        };
        assert!(matches!(
            LruIndex::restore(&too_long),
            Err(SnapshotError::LengthMismatch { .. })
        ));

        assert!(matches!(
            LruSnapshot::from_json("{\"capacity\": 2}"),
            Err(SnapshotError::Malformed(_))
        ));
    }

    // ==============================================
    // CONCURRENCY
    // ==============================================

    #[test]
    fn concurrent_marks_keep_a_permutation() {
        let capacity = 16;
        let index = Arc::new(LruIndex::new_prepopulated(capacity));
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|tid| {
                let index = Arc::clone(&index);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    for i in 0..1_000 {
                        index.mark_most_recently_used((tid * 7 + i) % capacity);
                        let _ = index.least_recently_used();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let mut order = index.order();
        order.sort_unstable();
        assert_eq!(order, (0..capacity).collect::<Vec<_>>());
        index.debug_validate_invariants();
    }

    // ==============================================
    // PROPERTIES
    // ==============================================

    mod property_tests {
        use proptest::prelude::*;

        use super::*;

        proptest! {
            /// The LRU slot is always the one whose last mark is oldest.
            #[test]
            fn lru_matches_reference_model(
                capacity in 1usize..24,
                marks in prop::collection::vec(0usize..24, 0..200)
            ) {
                let index = LruIndex::new_prepopulated(capacity);
                // last-touch tick per slot; prepopulation counts as ticks 0..capacity
                let mut last_touch: Vec<usize> = (0..capacity).collect();
                let mut tick = capacity;

                for slot in marks {
                    let slot = slot % capacity;
                    index.mark_most_recently_used(slot);
                    last_touch[slot] = tick;
                    tick += 1;

                    let expected = (0..capacity).min_by_key(|&s| last_touch[s]).unwrap();
                    prop_assert_eq!(index.least_recently_used(), Ok(expected));
                }

                let mut expected_order: Vec<usize> = (0..capacity).collect();
                expected_order.sort_by_key(|&s| last_touch[s]);
                prop_assert_eq!(index.order(), expected_order);
                index.debug_validate_invariants();
            }

            #[test]
            fn snapshot_round_trip_preserves_order(
                capacity in 0usize..32,
                marks in prop::collection::vec(0usize..32, 0..64)
            ) {
                let index = LruIndex::new(capacity);
                for slot in marks {
                    index.mark_most_recently_used(slot);
                }
                let restored = LruIndex::restore(&index.snapshot()).unwrap();
                prop_assert_eq!(restored.order(), index.order());
            }
        }
    }
}
