// Bounded response cache for metadata queries.
//
// Entries are keyed by the query arguments, expire after a fixed TTL and the
// oldest insertion is evicted once capacity is reached. Failed loads are never
// stored.

use crate::catalog::{Domain, Farm, MetadataSource, Season};
use crate::error::CatalogError;
use crate::pipeline::types::FieldRecord;
use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
pub struct CachePolicy {
    pub capacity: usize,
    pub ttl: Duration,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            capacity: 256,
            ttl: Duration::from_secs(600),
        }
    }
}

struct CacheState<K, V> {
    entries: HashMap<K, (Instant, V)>,
    order: VecDeque<K>,
}

pub struct ResponseCache<K, V> {
    policy: CachePolicy,
    state: Mutex<CacheState<K, V>>,
}

impl<K, V> ResponseCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(policy: CachePolicy) -> Self {
        Self {
            policy,
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                order: VecDeque::new(),
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CacheState<K, V>> {
        // A panicking loader never runs under the lock, so the state stays consistent
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let mut state = self.lock();
        let expired = match state.entries.get(key) {
            Some((stored, value)) if stored.elapsed() < self.policy.ttl => return Some(value.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            state.entries.remove(key);
            state.order.retain(|k| k != key);
        }
        None
    }

    pub fn insert(&self, key: K, value: V) {
        if self.policy.capacity == 0 {
            return;
        }
        let mut state = self.lock();
        if state.entries.remove(&key).is_some() {
            state.order.retain(|k| k != &key);
        }
        while state.entries.len() >= self.policy.capacity {
            match state.order.pop_front() {
                Some(oldest) => {
                    state.entries.remove(&oldest);
                }
                None => break,
            }
        }
        state.order.push_back(key.clone());
        state.entries.insert(key, (Instant::now(), value));
    }

    /// Return the cached value or run `load` and cache its success.
    ///
    /// The loader runs outside the lock; concurrent misses on the same key may
    /// both load, and the later insert wins.
    pub fn get_or_try_insert_with<E>(
        &self,
        key: K,
        load: impl FnOnce() -> Result<V, E>,
    ) -> Result<V, E> {
        if let Some(value) = self.get(&key) {
            return Ok(value);
        }
        let value = load()?;
        self.insert(key, value.clone());
        Ok(value)
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A [`MetadataSource`] that memoizes another one under a [`CachePolicy`].
pub struct CachedCatalog<S> {
    inner: S,
    domains: ResponseCache<String, Vec<Domain>>,
    seasons: ResponseCache<u64, Vec<Season>>,
    farms: ResponseCache<(u64, u64), Vec<Farm>>,
    fields: ResponseCache<(u64, u64), Vec<FieldRecord>>,
}

impl<S: MetadataSource> CachedCatalog<S> {
    pub fn new(inner: S, policy: CachePolicy) -> Self {
        Self {
            inner,
            domains: ResponseCache::new(policy),
            seasons: ResponseCache::new(policy),
            farms: ResponseCache::new(policy),
            fields: ResponseCache::new(policy),
        }
    }
}

impl<S: MetadataSource> MetadataSource for CachedCatalog<S> {
    fn domains_for_user(&self, email: &str) -> Result<Vec<Domain>, CatalogError> {
        self.domains
            .get_or_try_insert_with(email.to_lowercase(), || self.inner.domains_for_user(email))
    }

    fn seasons(&self, workspace_id: u64) -> Result<Vec<Season>, CatalogError> {
        self.seasons
            .get_or_try_insert_with(workspace_id, || self.inner.seasons(workspace_id))
    }

    fn farms(&self, workspace_id: u64, season_id: u64) -> Result<Vec<Farm>, CatalogError> {
        self.farms.get_or_try_insert_with((workspace_id, season_id), || {
            self.inner.farms(workspace_id, season_id)
        })
    }

    fn fields(&self, season_id: u64, farm_id: u64) -> Result<Vec<FieldRecord>, CatalogError> {
        self.fields
            .get_or_try_insert_with((season_id, farm_id), || self.inner.fields(season_id, farm_id))
    }
}
