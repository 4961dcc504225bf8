//! Per-repository caches.
//!
//! A [`CachePool`] holds one [`CacheFacet`] for compiled views and one for raw
//! content, both keyed by object id. Facets are trait objects so a
//! repository can run with caching disabled.
//!
//! Every facet keeps a generation counter bumped on invalidation. A value
//! computed from a read that started before an invalidation is dropped on
//! `put`, so a completed mutation is never followed by a stale hit.

use dashmap::DashMap;
use log::debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::config::{CacheConfig, FacetConfig};
use crate::error::RepositoryResult;
use crate::model::Content;
use crate::view::CompiledView;

pub trait CacheFacet<V: Clone + Send + Sync>: Send + Sync {
    fn name(&self) -> &str;

    fn get(&self, key: &str) -> Option<V>;

    /// Generation to pass to [`put`](Self::put); take it before reading
    /// the data being cached.
    fn stamp(&self) -> u64;

    /// Store `value` unless the facet was invalidated after `stamp`.
    fn put(&self, key: &str, value: V, stamp: u64);

    fn invalidate(&self, key: &str);

    fn clear(&self);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get_or_compute(
        &self,
        key: &str,
        compute: &mut dyn FnMut() -> RepositoryResult<V>,
    ) -> RepositoryResult<V> {
        if let Some(value) = self.get(key) {
            return Ok(value);
        }
        let stamp = self.stamp();
        let value = compute()?;
        self.put(key, value.clone(), stamp);
        Ok(value)
    }
}

/// Bounded in-memory facet.
pub struct MemoryCache<V> {
    name: String,
    entries: DashMap<String, V>,
    capacity: usize,
    generation: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<V: Clone + Send + Sync> MemoryCache<V> {
    pub fn new(name: &str, capacity: usize) -> Self {
        Self {
            name: name.to_string(),
            entries: DashMap::new(),
            capacity: capacity.max(1),
            generation: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::SeqCst)
    }

    fn evict_one(&self) {
        let victim = self.entries.iter().next().map(|e| e.key().clone());
        if let Some(key) = victim {
            debug!("{}: evicting {}", self.name, key);
            self.entries.remove(&key);
        }
    }
}

impl<V: Clone + Send + Sync> CacheFacet<V> for MemoryCache<V> {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, key: &str) -> Option<V> {
        let value = self.entries.get(key).map(|v| v.value().clone());
        match value {
            Some(_) => self.hits.fetch_add(1, Ordering::SeqCst),
            None => self.misses.fetch_add(1, Ordering::SeqCst),
        };
        value
    }

    fn stamp(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    fn put(&self, key: &str, value: V, stamp: u64) {
        if self.stamp() != stamp {
            return;
        }
        if self.entries.len() >= self.capacity && !self.entries.contains_key(key) {
            self.evict_one();
        }
        self.entries.insert(key.to_string(), value);
        // An invalidation that raced past the first check bumped the
        // generation before removing; undo our insert so it cannot survive.
        if self.stamp() != stamp {
            self.entries.remove(key);
        }
    }

    fn invalidate(&self, key: &str) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if self.entries.remove(key).is_some() {
            debug!("{}: invalidated {}", self.name, key);
        }
    }

    fn clear(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.entries.clear();
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Facet that never stores anything.
pub struct DisabledCache {
    name: String,
}

impl DisabledCache {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

impl<V: Clone + Send + Sync> CacheFacet<V> for DisabledCache {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, _key: &str) -> Option<V> {
        None
    }

    fn stamp(&self) -> u64 {
        0
    }

    fn put(&self, _key: &str, _value: V, _stamp: u64) {}

    fn invalidate(&self, _key: &str) {}

    fn clear(&self) {}

    fn len(&self) -> usize {
        0
    }
}

fn facet<V: Clone + Send + Sync + 'static>(
    name: &str,
    config: &FacetConfig,
) -> Arc<dyn CacheFacet<V>> {
    if config.enabled {
        Arc::new(MemoryCache::new(name, config.capacity))
    } else {
        Arc::new(DisabledCache::new(name))
    }
}

/// The caches of one repository.
pub struct CachePool {
    view: Arc<dyn CacheFacet<CompiledView>>,
    content: Arc<dyn CacheFacet<Content>>,
}

impl CachePool {
    pub fn new(
        view: Arc<dyn CacheFacet<CompiledView>>,
        content: Arc<dyn CacheFacet<Content>>,
    ) -> Self {
        Self { view, content }
    }

    pub fn from_config(repository_id: &str, config: &CacheConfig) -> Self {
        Self::new(
            facet(&format!("{}:view", repository_id), &config.view),
            facet(&format!("{}:content", repository_id), &config.content),
        )
    }

    pub fn view(&self) -> &dyn CacheFacet<CompiledView> {
        self.view.as_ref()
    }

    pub fn content(&self) -> &dyn CacheFacet<Content> {
        self.content.as_ref()
    }

    /// Drop every cached entry for `id`.
    pub fn invalidate(&self, id: &str) {
        self.view.invalidate(id);
        self.content.invalidate(id);
    }

    pub fn invalidate_all<'a, I>(&self, ids: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        for id in ids {
            self.invalidate(id);
        }
    }

    pub fn clear(&self) {
        self.view.clear();
        self.content.clear();
    }
}
