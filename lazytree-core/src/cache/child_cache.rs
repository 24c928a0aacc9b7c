//! `src/cache/child_cache.rs`
//! ============================================================================
//! # Per-container child cache
//!
//! An insertion-ordered map from case-folded child name to node:
//! - Keys compare case-insensitively by construction (`ChildKey`)
//! - Enumeration follows data-source return order
//! - One writer at a time; readers never see a half-applied mutation
//! - Hit/miss/eviction counters for diagnostics

use std::{
    fmt,
    sync::{
        PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard,
        atomic::{AtomicU64, Ordering},
    },
};

use ahash::RandomState;
use compact_str::CompactString;
use indexmap::IndexMap;
use tracing::debug;

use crate::{model::node::NodeRef, util::path::fold_case};

/// Case-insensitive child name. Two names that differ only by case produce
/// equal keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChildKey(CompactString);

impl ChildKey {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self(fold_case(name))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChildKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Cache statistics for monitoring and debugging
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    refills: AtomicU64,
}

impl CacheStats {
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_refill(&self) {
        self.refills.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            refills: self.refills.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub refills: u64,
}

impl CacheStatsSnapshot {
    #[expect(clippy::cast_precision_loss, reason = "Expected precision loss")]
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

type ChildMap = IndexMap<ChildKey, NodeRef, RandomState>;

/// Children of one container, keyed case-insensitively.
pub struct ChildCache {
    inner: RwLock<ChildMap>,
    stats: CacheStats,
}

impl Default for ChildCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ChildCache {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(IndexMap::with_hasher(RandomState::new())),
            stats: CacheStats::default(),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, ChildMap> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, ChildMap> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Looks up a child by name, ignoring case.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<NodeRef> {
        let found: Option<NodeRef> = self.read().get(&ChildKey::new(name)).cloned();

        if found.is_some() {
            self.stats.record_hit();
        } else {
            self.stats.record_miss();
        }

        found
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.read().contains_key(&ChildKey::new(name))
    }

    /// Adds `node` unless a child with the same name exists. Returns `false`
    /// when the name was taken.
    pub fn insert_if_absent(&self, node: NodeRef) -> bool {
        let key = ChildKey::new(node.name());
        let mut map = self.write();

        if map.contains_key(&key) {
            return false;
        }

        map.insert(key, node);
        true
    }

    /// Replaces any child with the same name. The replacement moves to the
    /// end of the enumeration order.
    pub fn replace(&self, node: NodeRef) -> Option<NodeRef> {
        let key = ChildKey::new(node.name());
        let mut map = self.write();
        let previous: Option<NodeRef> = map.shift_remove(&key);

        map.insert(key, node);
        previous
    }

    /// Evicts one child.
    pub fn remove(&self, name: &str) -> Option<NodeRef> {
        let removed: Option<NodeRef> = self.write().shift_remove(&ChildKey::new(name));

        if removed.is_some() {
            self.stats.record_eviction();
            debug!(
                marker = "CHILD_CACHE",
                operation_type = "cache_evict",
                child = name,
                "Evicted child from cache"
            );
        }

        removed
    }

    /// Drops every cached child, ready for a refill.
    pub fn clear(&self) {
        let mut map = self.write();

        if !map.is_empty() {
            debug!(
                marker = "CHILD_CACHE",
                operation_type = "cache_clear",
                dropped = map.len(),
                "Clearing child cache before refill"
            );
        }

        map.clear();
        self.stats.record_refill();
    }

    /// Children in enumeration order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<NodeRef> {
        self.read().values().cloned().collect()
    }

    /// Child names in enumeration order.
    #[must_use]
    pub fn names(&self) -> Vec<CompactString> {
        self.read()
            .values()
            .map(|node| CompactString::new(node.name()))
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    #[must_use]
    pub fn stats(&self) -> CacheStatsSnapshot {
        self.stats.snapshot()
    }
}

impl fmt::Debug for ChildCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChildCache")
            .field("names", &self.names())
            .field("stats", &self.stats.snapshot())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        config::NodeTypeTable,
        model::node::{Node, TypedNode},
        source::contract::testing::StaticSource,
    };

    fn leaf(parent: &NodeRef, name: &str) -> NodeRef {
        Node::typed_child(
            TypedNode::new(name, StaticSource::leaf("Leaf").arc()),
            parent,
            &NodeTypeTable::default(),
        )
    }

    fn root() -> NodeRef {
        Node::root(
            TypedNode::new("root", StaticSource::container("Root", vec![]).arc()),
            &NodeTypeTable::default(),
        )
    }

    #[test]
    fn test_keys_are_case_insensitive() {
        assert_eq!(ChildKey::new("Erin"), ChildKey::new("ERIN"));
        assert_ne!(ChildKey::new("Erin"), ChildKey::new("Erik"));
    }

    #[test]
    fn test_insert_if_absent_keeps_first() {
        let root = root();
        let cache = ChildCache::new();

        assert!(cache.insert_if_absent(leaf(&root, "a")));
        assert!(!cache.insert_if_absent(leaf(&root, "A")));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("a").unwrap().name(), "a");
    }

    #[test]
    fn test_enumeration_preserves_return_order() {
        let root = root();
        let cache = ChildCache::new();

        for name in ["zeta", "alpha", "mid"] {
            cache.insert_if_absent(leaf(&root, name));
        }

        assert_eq!(cache.names(), vec!["zeta", "alpha", "mid"]);

        cache.remove("ALPHA");
        assert_eq!(cache.names(), vec!["zeta", "mid"]);
    }

    #[test]
    fn test_replace_and_stats() {
        let root = root();
        let cache = ChildCache::new();
        let first = leaf(&root, "file");
        cache.insert_if_absent(first.clone());

        let second = leaf(&root, "FILE");
        let previous = cache.replace(second.clone()).unwrap();
        assert!(Arc::ptr_eq(&previous, &first));
        assert!(Arc::ptr_eq(&cache.get("file").unwrap(), &second));
        assert!(cache.get("missing").is_none());

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate() - 0.5).abs() < f64::EPSILON);

        cache.clear();
        assert!(cache.is_empty());
    }
}
