//! Pipeline Registry
//!
//! Maps identities to pipelines. The identity counter and the map sit behind
//! one lock, so allocation, insertion and listing never interleave. The lock
//! only covers in-memory work: callers look a pipeline up, release the lock,
//! and only then talk to the pipeline's process.

use conduit_core::domain::pipeline::PipelineId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use crate::pipeline::Pipeline;

struct RegistryInner {
    next_id: u64,
    entries: HashMap<PipelineId, Arc<Pipeline>>,
}

impl RegistryInner {
    fn allocate(&mut self) -> Option<PipelineId> {
        let id = self.next_id;
        self.next_id = id.checked_add(1)?;
        Some(PipelineId(id))
    }

    fn insert(&mut self, id: PipelineId, pipeline: Arc<Pipeline>) {
        assert_eq!(
            id,
            pipeline.id(),
            "pipeline registered under a foreign identity"
        );
        match self.entries.entry(id) {
            Entry::Occupied(_) => panic!("pipeline identity {} registered twice", id),
            Entry::Vacant(slot) => {
                slot.insert(pipeline);
            }
        }
    }
}

/// In-memory pipeline registry
pub struct Registry {
    inner: Mutex<RegistryInner>,
}

impl Registry {
    /// Creates an empty registry. The first identity issued is 1.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                next_id: 1,
                entries: HashMap::new(),
            }),
        }
    }

    /// Issues a fresh identity, strictly greater than every earlier one
    ///
    /// Returns `None` once the identity space is exhausted.
    #[cfg(test)]
    pub fn allocate_identity(&self) -> Option<PipelineId> {
        self.inner.lock().allocate()
    }

    /// Adds a fully constructed pipeline
    ///
    /// # Panics
    /// If `id` is already registered or differs from the pipeline's own id.
    /// Identities come from [`Registry::allocate_identity`], so either case
    /// is a bug in the caller.
    #[cfg(test)]
    pub fn insert(&self, id: PipelineId, pipeline: Arc<Pipeline>) {
        self.inner.lock().insert(id, pipeline);
    }

    /// Allocates an identity and registers the pipeline built for it
    ///
    /// Both steps happen under one lock acquisition, so listings never show
    /// a gap left by an allocated but not yet inserted identity. `build`
    /// runs under the registry lock and must not block.
    pub fn register<F>(&self, build: F) -> Option<Arc<Pipeline>>
    where
        F: FnOnce(PipelineId) -> Pipeline,
    {
        let mut inner = self.inner.lock();
        let id = inner.allocate()?;
        let pipeline = Arc::new(build(id));
        inner.insert(id, Arc::clone(&pipeline));
        Some(pipeline)
    }

    pub fn lookup(&self, id: PipelineId) -> Option<Arc<Pipeline>> {
        self.inner.lock().entries.get(&id).cloned()
    }

    /// Identities of the pipelines accepted by `predicate`, ascending
    ///
    /// The predicate runs while the registry lock is held, so the result is
    /// one consistent snapshot. It must not block; `Pipeline::status` reads
    /// an atomic and never waits for the pipeline lock.
    pub fn list_identities<F>(&self, predicate: F) -> Vec<PipelineId>
    where
        F: Fn(&Pipeline) -> bool,
    {
        let mut ids: Vec<PipelineId> = {
            let inner = self.inner.lock();
            inner
                .entries
                .values()
                .filter(|pipeline| predicate(pipeline))
                .map(|pipeline| pipeline.id())
                .collect()
        };
        ids.sort_unstable();
        ids
    }

    /// All pipelines, ascending by identity
    pub fn snapshot(&self) -> Vec<Arc<Pipeline>> {
        let mut pipelines: Vec<Arc<Pipeline>> =
            self.inner.lock().entries.values().cloned().collect();
        pipelines.sort_unstable_by_key(|pipeline| pipeline.id());
        pipelines
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
