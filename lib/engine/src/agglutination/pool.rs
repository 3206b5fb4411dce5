use crate::MatchResult;
use parking_lot::Mutex;
use rdf_federation_common::default_parallelism;
use roaring::RoaringBitmap;
use std::sync::LazyLock;

/// The per-decomposition scratch buffers of the [MergingAgglutinator](super::MergingAgglutinator).
///
/// All bitmaps are expressed in positions of the triple universe of the decomposed query.
#[derive(Debug, Default)]
pub(super) struct WorkingState {
    /// The non-exclusive claims of every source.
    claims: Vec<RoaringBitmap>,
    /// The triples that are part of an exclusive group of any source.
    in_group: RoaringBitmap,
    /// The triples that are claimed non-exclusively by more than one source.
    shared: RoaringBitmap,
}

impl WorkingState {
    /// Resets the buffers and loads the claims of `results`. Buffers are grown in place.
    pub(super) fn prepare(&mut self, results: &[Option<MatchResult>]) {
        self.claims.truncate(results.len());
        for claims in &mut self.claims {
            claims.clear();
        }
        self.claims.resize_with(results.len(), RoaringBitmap::new);
        self.in_group.clear();
        self.shared.clear();

        let mut seen = RoaringBitmap::new();
        for (claims, result) in self.claims.iter_mut().zip(results) {
            let Some(result) = result else {
                continue;
            };
            *claims |= result.non_exclusive_triples().bits();
            for group in result.exclusive_groups() {
                self.in_group |= group.triples().bits();
            }
            self.shared |= &seen & &*claims;
            seen |= &*claims;
        }
    }

    /// Returns the non-exclusive claims of the source at `source_index`.
    pub(super) fn claims(&self, source_index: usize) -> Option<&RoaringBitmap> {
        self.claims.get(source_index)
    }

    /// Returns the claims of the source at `source_index` that no other source claims and that
    /// are not part of any exclusive group.
    pub(super) fn truly_exclusive(&self, source_index: usize) -> RoaringBitmap {
        let Some(claims) = self.claims.get(source_index) else {
            return RoaringBitmap::new();
        };
        let mut exclusive = claims - &self.shared;
        exclusive -= &self.in_group;
        exclusive
    }
}

/// A bounded pool of [WorkingState]s that are recycled across decompositions.
///
/// Releasing a state never blocks. If the pool is full or currently locked by another thread, the
/// state is dropped.
#[derive(Debug)]
pub(super) struct StatePool {
    states: Mutex<Vec<WorkingState>>,
    capacity: usize,
}

static GLOBAL_POOL: LazyLock<StatePool> =
    LazyLock::new(|| StatePool::new(2 * default_parallelism()));

impl StatePool {
    pub(super) fn new(capacity: usize) -> Self {
        Self {
            states: Mutex::new(Vec::with_capacity(capacity)),
            capacity,
        }
    }

    /// Returns the process-wide pool.
    pub(super) fn global() -> &'static StatePool {
        &GLOBAL_POOL
    }

    /// Takes a state from the pool or creates a new one.
    pub(super) fn acquire(&self) -> WorkingState {
        self.states.lock().pop().unwrap_or_default()
    }

    /// Returns `state` to the pool.
    pub(super) fn release(&self, state: WorkingState) {
        if let Some(mut states) = self.states.try_lock() {
            if states.len() < self.capacity {
                states.push(state);
            }
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.states.lock().len()
    }
}
