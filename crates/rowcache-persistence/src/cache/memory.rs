//! In-process cache store.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use rowcache_domain::{CacheKey, FieldMap};
use tokio::sync::RwLock;

use super::traits::CacheStore;
use crate::error::{PersistenceError, Result};

/// Hash store kept in a `HashMap`, with counters and fault injection.
///
/// Cloning shares the underlying map.
#[derive(Debug, Clone, Default)]
pub struct MemoryCacheStore {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    entries: RwLock<HashMap<String, FieldMap>>,
    reads: AtomicUsize,
    writes: AtomicUsize,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryCacheStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `hash_get` and `ping` fail with `BackendUnavailable`
    pub fn set_fail_reads(&self, fail: bool) {
        self.inner.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make every `hash_set` and `delete` fail with `BackendUnavailable`
    pub fn set_fail_writes(&self, fail: bool) {
        self.inner.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of `hash_get` calls served
    pub fn reads(&self) -> usize {
        self.inner.reads.load(Ordering::SeqCst)
    }

    /// Number of successful `hash_set` calls
    pub fn writes(&self) -> usize {
        self.inner.writes.load(Ordering::SeqCst)
    }

    /// Raw stored hash, bypassing the absence contract
    pub async fn raw_entry(&self, key: &str) -> Option<FieldMap> {
        self.inner.entries.read().await.get(key).cloned()
    }

    /// Store a hash directly, without counting it as a write
    pub async fn put_raw(&self, key: &str, fields: FieldMap) {
        self.inner.entries.write().await.insert(key.to_string(), fields);
    }

    pub async fn len(&self) -> usize {
        self.inner.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.entries.read().await.is_empty()
    }

    fn check(&self, flag: &AtomicBool) -> Result<()> {
        if flag.load(Ordering::SeqCst) {
            Err(PersistenceError::cache_unavailable("in-memory cache marked unavailable"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn hash_get(&self, key: &CacheKey) -> Result<Option<FieldMap>> {
        self.check(&self.inner.fail_reads)?;
        self.inner.reads.fetch_add(1, Ordering::SeqCst);

        let entries = self.inner.entries.read().await;
        Ok(entries
            .get(&key.to_string())
            .filter(|entry| !entry.is_empty())
            .cloned())
    }

    async fn hash_set(&self, key: &CacheKey, fields: &FieldMap) -> Result<()> {
        self.check(&self.inner.fail_writes)?;

        self.inner
            .entries
            .write()
            .await
            .insert(key.to_string(), fields.clone());
        self.inner.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete(&self, key: &CacheKey) -> Result<bool> {
        self.check(&self.inner.fail_writes)?;
        Ok(self
            .inner
            .entries
            .write()
            .await
            .remove(&key.to_string())
            .is_some())
    }

    async fn ping(&self) -> Result<String> {
        self.check(&self.inner.fail_reads)?;
        Ok("PONG".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(id: i64) -> CacheKey {
        CacheKey::new("emp", id).unwrap()
    }

    #[tokio::test]
    async fn test_empty_hash_reads_as_absent() {
        let store = MemoryCacheStore::new();
        store.put_raw("emp:1", FieldMap::new()).await;

        assert_eq!(store.hash_get(&key(1)).await.unwrap(), None);
        assert_eq!(store.hash_get(&key(2)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_replaces_whole_hash() {
        let store = MemoryCacheStore::new();
        let old: FieldMap = [("a".to_string(), "1".to_string()), ("b".into(), "2".into())].into();
        let new: FieldMap = [("a".to_string(), "9".to_string())].into();

        store.hash_set(&key(1), &old).await.unwrap();
        store.hash_set(&key(1), &new).await.unwrap();

        assert_eq!(store.hash_get(&key(1)).await.unwrap(), Some(new));
        assert_eq!(store.writes(), 2);
    }

    #[tokio::test]
    async fn test_fault_injection() {
        let store = MemoryCacheStore::new();
        store.set_fail_writes(true);

        let err = store.hash_set(&key(1), &FieldMap::new()).await.unwrap_err();
        assert!(err.is_backend_unavailable());
        assert_eq!(store.writes(), 0);

        store.set_fail_reads(true);
        assert!(store.ping().await.is_err());
        assert!(store.hash_get(&key(1)).await.is_err());
    }

    #[tokio::test]
    async fn test_delete() {
        let store = MemoryCacheStore::new();
        let fields: FieldMap = [("a".to_string(), "1".to_string())].into();
        store.hash_set(&key(5), &fields).await.unwrap();

        assert!(store.delete(&key(5)).await.unwrap());
        assert!(!store.delete(&key(5)).await.unwrap());
        assert!(store.is_empty().await);
    }
}
