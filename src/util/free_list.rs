use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use thiserror::Error;

/// A contiguous run of indices handed out by [`FreeListAllocator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexRange {
    pub handle: u64,
    pub first: u32,
    pub count: u32,
}

#[derive(Debug, Clone, Copy)]
struct FreeRun {
    first: u32,
    count: u32,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FreeListError {
    #[error("no free run of {requested} indices left (capacity {capacity})")]
    Exhausted { requested: u32, capacity: u32 },
    #[error("unknown allocation handle {0}")]
    UnknownHandle(u64),
    #[error("cannot allocate an empty range")]
    EmptyRequest,
}

/// First-fit allocator over the index space `0..capacity`.
///
/// Used for shader-visible descriptor slots and for object-constant indices. Freed runs are
/// coalesced with their neighbours, and the lowest fitting index is always handed out first so
/// a free followed by an allocation of the same size returns the same index.
#[derive(Clone)]
pub struct FreeListAllocator {
    capacity: u32,
    allocated: HashMap<u64, IndexRange>,
    free_runs: Vec<FreeRun>,
    next_handle: u64,
}

impl Debug for FreeListAllocator {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "FreeListAllocator {{ capacity: {}, allocated: {}, free_runs: {} }}",
            self.capacity,
            self.allocated.len(),
            self.free_runs.len()
        )
    }
}

impl FreeListAllocator {
    pub fn new(capacity: u32) -> Self {
        let free_runs = if capacity > 0 {
            vec![FreeRun {
                first: 0,
                count: capacity,
            }]
        } else {
            Vec::new()
        };
        Self {
            capacity,
            allocated: HashMap::new(),
            free_runs,
            next_handle: 1,
        }
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn allocated_count(&self) -> u32 {
        self.allocated.values().map(|r| r.count).sum()
    }

    pub fn allocate(&mut self, count: u32) -> Result<IndexRange, FreeListError> {
        if count == 0 {
            return Err(FreeListError::EmptyRequest);
        }
        let idx = self
            .free_runs
            .iter()
            .position(|run| run.count >= count)
            .ok_or(FreeListError::Exhausted {
                requested: count,
                capacity: self.capacity,
            })?;

        let first = self.free_runs[idx].first;
        if self.free_runs[idx].count == count {
            self.free_runs.remove(idx);
        } else {
            self.free_runs[idx].first += count;
            self.free_runs[idx].count -= count;
        }

        let handle = self.next_handle;
        self.next_handle += 1;
        let range = IndexRange {
            handle,
            first,
            count,
        };
        self.allocated.insert(handle, range);
        Ok(range)
    }

    pub fn lookup(&self, handle: u64) -> Option<IndexRange> {
        self.allocated.get(&handle).copied()
    }

    pub fn free(&mut self, handle: u64) -> Result<(), FreeListError> {
        let range = self
            .allocated
            .remove(&handle)
            .ok_or(FreeListError::UnknownHandle(handle))?;
        self.free_runs.push(FreeRun {
            first: range.first,
            count: range.count,
        });
        self.coalesce();
        Ok(())
    }

    pub fn reset(&mut self) {
        self.allocated.clear();
        self.free_runs.clear();
        if self.capacity > 0 {
            self.free_runs.push(FreeRun {
                first: 0,
                count: self.capacity,
            });
        }
        self.next_handle = 1;
    }

    fn coalesce(&mut self) {
        self.free_runs.sort_by_key(|run| run.first);
        let mut merged: Vec<FreeRun> = Vec::with_capacity(self.free_runs.len());
        for run in self.free_runs.drain(..) {
            if let Some(last) = merged.last_mut() {
                if last.first + last.count == run.first {
                    last.count += run.count;
                    continue;
                }
            }
            merged.push(run);
        }
        self.free_runs = merged;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::seq::SliceRandom;
    use rand::{Rng, SeedableRng};

    #[test]
    fn first_fit_reuses_freed_run() {
        let mut allocator = FreeListAllocator::new(64);
        let a = allocator.allocate(4).unwrap();
        let b = allocator.allocate(8).unwrap();
        let c = allocator.allocate(2).unwrap();
        assert_eq!((a.first, b.first, c.first), (0, 4, 12));

        allocator.free(b.handle).unwrap();
        let d = allocator.allocate(6).unwrap();
        assert_eq!(d.first, 4);

        // the remaining two indices of the old run come next
        let e = allocator.allocate(2).unwrap();
        assert_eq!(e.first, 10);
    }

    #[test]
    fn single_slot_free_then_allocate_returns_same_index() {
        let mut allocator = FreeListAllocator::new(8);
        let slots: Vec<_> = (0..5).map(|_| allocator.allocate(1).unwrap()).collect();
        allocator.free(slots[2].handle).unwrap();
        assert_eq!(allocator.allocate(1).unwrap().first, 2);
    }

    #[test]
    fn exhaustion_and_unknown_handle() {
        let mut allocator = FreeListAllocator::new(3);
        allocator.allocate(3).unwrap();
        assert_eq!(
            allocator.allocate(1),
            Err(FreeListError::Exhausted {
                requested: 1,
                capacity: 3
            })
        );
        assert_eq!(allocator.free(42), Err(FreeListError::UnknownHandle(42)));
        assert_eq!(allocator.allocate(0), Err(FreeListError::EmptyRequest));
    }

    #[test]
    fn reset_clears_everything() {
        let mut allocator = FreeListAllocator::new(16);
        let a = allocator.allocate(10).unwrap();
        allocator.reset();
        assert!(allocator.lookup(a.handle).is_none());
        assert_eq!(allocator.allocate(16).unwrap().first, 0);
    }

    #[test]
    fn random_churn_coalesces_back_to_one_run() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        let mut allocator = FreeListAllocator::new(4096);
        let mut live = Vec::new();

        for _ in 0..2000 {
            if rng.random_bool(0.6) {
                if let Ok(range) = allocator.allocate(rng.random_range(1..=16)) {
                    live.push(range);
                }
            } else if !live.is_empty() {
                let idx = rng.random_range(0..live.len());
                let range: IndexRange = live.swap_remove(idx);
                allocator.free(range.handle).unwrap();
            }
        }

        live.shuffle(&mut rng);
        for range in live {
            allocator.free(range.handle).unwrap();
        }
        assert_eq!(allocator.allocated_count(), 0);
        assert_eq!(allocator.allocate(4096).unwrap().first, 0);
    }
}
