//! In-degree cache, ready-set cache, effective-priority cache.
//!
//! Each cache is an *entries* map plus a *valid* set; a name (here, a
//! [`NodeIdx`]) is authoritative only while present in *valid*. The
//! scheduler façade is responsible for recomputing a value on a cache
//! miss and feeding it back in; this module only tracks what is known
//! good and propagates invalidation to dependents.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use crate::graph_store::NodeIdx;
use crate::priority::Priority;

#[derive(Debug)]
pub struct CacheLayer {
    indeg: Vec<usize>,
    indeg_valid: HashSet<NodeIdx>,

    eff_priority: Vec<Priority>,
    eff_priority_valid: HashSet<NodeIdx>,

    ready: HashSet<NodeIdx>,
    ready_valid: bool,
    ready_computed_at: Option<Instant>,
    ready_ttl: Duration,
}

impl CacheLayer {
    pub fn new(ready_ttl: Duration) -> Self {
        CacheLayer {
            indeg: Vec::new(),
            indeg_valid: HashSet::new(),
            eff_priority: Vec::new(),
            eff_priority_valid: HashSet::new(),
            ready: HashSet::new(),
            ready_valid: false,
            ready_computed_at: None,
            ready_ttl,
        }
    }

    /// Called whenever `GraphStore::register` grows the node vectors, so
    /// our parallel cache vectors stay index-aligned.
    pub fn grow_to(&mut self, node_count: usize) {
        self.indeg.resize(node_count, 0);
        self.eff_priority.resize(node_count, Priority::Backlog);
    }

    // ---- in-degree cache ----

    pub fn indegree(&self, idx: NodeIdx) -> Option<usize> {
        self.indeg_valid.contains(&idx).then(|| self.indeg[idx])
    }

    pub fn set_indegree(&mut self, idx: NodeIdx, value: usize) {
        self.indeg[idx] = value;
        self.indeg_valid.insert(idx);
    }

    pub fn invalidate_indegree(&mut self, idx: NodeIdx) {
        self.indeg_valid.remove(&idx);
    }

    pub fn invalidate_indegree_many(&mut self, idxs: impl IntoIterator<Item = NodeIdx>) {
        for idx in idxs {
            self.indeg_valid.remove(&idx);
        }
    }

    pub fn indegree_cache_size(&self) -> usize {
        self.indeg_valid.len()
    }

    // ---- effective-priority cache ----

    pub fn priority(&self, idx: NodeIdx) -> Option<Priority> {
        self.eff_priority_valid
            .contains(&idx)
            .then(|| self.eff_priority[idx])
    }

    pub fn set_priority(&mut self, idx: NodeIdx, value: Priority) {
        self.eff_priority[idx] = value;
        self.eff_priority_valid.insert(idx);
    }

    pub fn invalidate_priority(&mut self, idx: NodeIdx) {
        self.eff_priority_valid.remove(&idx);
    }

    pub fn invalidate_priority_many(&mut self, idxs: impl IntoIterator<Item = NodeIdx>) {
        for idx in idxs {
            self.eff_priority_valid.remove(&idx);
        }
    }

    pub fn priority_cache_size(&self) -> usize {
        self.eff_priority_valid.len()
    }

    // ---- ready-set cache ----

    pub fn ready_contains(&self, idx: NodeIdx) -> bool {
        self.ready.contains(&idx)
    }

    pub fn ready_insert(&mut self, idx: NodeIdx) {
        self.ready.insert(idx);
    }

    pub fn ready_remove(&mut self, idx: NodeIdx) {
        self.ready.remove(&idx);
    }

    pub fn ready_iter(&self) -> impl Iterator<Item = NodeIdx> + '_ {
        self.ready.iter().copied()
    }

    pub fn ready_len(&self) -> usize {
        self.ready.len()
    }

    /// Clear and mark invalid; the caller repopulates via `ready_insert`
    /// and then calls [`CacheLayer::mark_ready_valid`].
    pub fn ready_clear(&mut self) {
        self.ready.clear();
    }

    pub fn invalidate_ready(&mut self) {
        self.ready_valid = false;
    }

    pub fn mark_ready_valid(&mut self, now: Instant) {
        self.ready_valid = true;
        self.ready_computed_at = Some(now);
    }

    /// True when the cache is both flagged valid and, if a TTL is
    /// configured, not yet expired relative to `now`.
    pub fn ready_is_fresh(&self, now: Instant) -> bool {
        if !self.ready_valid {
            return false;
        }
        if self.ready_ttl.is_zero() {
            return true;
        }
        match self.ready_computed_at {
            Some(at) => now.duration_since(at) <= self.ready_ttl,
            None => false,
        }
    }

    pub fn ready_cache_valid(&self) -> bool {
        self.ready_valid
    }

    pub fn ready_cache_age_seconds(&self, now: Instant) -> Option<f64> {
        self.ready_computed_at
            .map(|at| now.duration_since(at).as_secs_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indegree_cache_tracks_validity() {
        let mut c = CacheLayer::new(Duration::ZERO);
        c.grow_to(2);
        assert_eq!(c.indegree(0), None);
        c.set_indegree(0, 3);
        assert_eq!(c.indegree(0), Some(3));
        c.invalidate_indegree(0);
        assert_eq!(c.indegree(0), None);
    }

    #[test]
    fn ready_ttl_zero_never_expires() {
        let mut c = CacheLayer::new(Duration::ZERO);
        c.mark_ready_valid(Instant::now());
        assert!(c.ready_is_fresh(Instant::now()));
    }

    #[test]
    fn ready_ttl_expires() {
        let mut c = CacheLayer::new(Duration::from_millis(1));
        c.mark_ready_valid(Instant::now());
        std::thread::sleep(Duration::from_millis(20));
        assert!(!c.ready_is_fresh(Instant::now()));
    }

    #[test]
    fn invalid_cache_is_never_fresh() {
        let c = CacheLayer::new(Duration::ZERO);
        assert!(!c.ready_is_fresh(Instant::now()));
    }
}
