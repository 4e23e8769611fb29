//! # Cache-Aside Resolver
//!
//! Read path over a [`CacheStore`] and a [`RecordSource`]: look up the
//! record's hash in the cache, fall back to the source on a miss, write the
//! encoded row into the cache and hand the fields back.
//!
//! The resolver keeps no state between calls. Concurrent misses on the same
//! id are not coalesced: each one queries the source and writes the full
//! entry, and the last write wins.

use std::sync::Arc;
use std::time::Instant;

use rowcache_domain::{CacheKey, FieldMap, Record, RecordSchema, RowCodec};

use crate::cache::CacheStore;
use crate::error::Result;
use crate::health::HealthProbe;
use crate::repository::RecordSource;
use crate::strategy::read_strategy::elapsed_ms;
use crate::strategy::{ReadStrategy, Resolution};

/// Cache-aside orchestrator
pub struct CacheAside<C: ?Sized, S: ?Sized> {
    cache: Arc<C>,
    source: Arc<S>,
    strategy: ReadStrategy,
}

impl<C: ?Sized, S: ?Sized> Clone for CacheAside<C, S> {
    fn clone(&self) -> Self {
        Self {
            cache: Arc::clone(&self.cache),
            source: Arc::clone(&self.source),
            strategy: self.strategy,
        }
    }
}

impl<C, S> CacheAside<C, S>
where
    C: CacheStore + ?Sized,
    S: RecordSource + ?Sized,
{
    /// Create a resolver with the default `CacheAside` strategy.
    pub fn new(cache: Arc<C>, source: Arc<S>) -> Self {
        Self::with_strategy(cache, source, ReadStrategy::default())
    }

    /// Create with a custom strategy.
    pub fn with_strategy(cache: Arc<C>, source: Arc<S>, strategy: ReadStrategy) -> Self {
        Self {
            cache,
            source,
            strategy,
        }
    }

    /// Set read strategy.
    pub fn set_strategy(&mut self, strategy: ReadStrategy) {
        self.strategy = strategy;
    }

    pub const fn strategy(&self) -> ReadStrategy {
        self.strategy
    }

    pub fn cache(&self) -> &Arc<C> {
        &self.cache
    }

    pub fn source(&self) -> &Arc<S> {
        &self.source
    }

    /// Readiness probe over the same two stores
    pub fn health_probe(&self) -> HealthProbe<C, S> {
        HealthProbe::new(Arc::clone(&self.cache), Arc::clone(&self.source))
    }

    /// Resolve the cached field map of record `id`.
    ///
    /// # Errors
    ///
    /// - `InvalidId` for a negative id, before any I/O
    /// - `BackendUnavailable` if the cache lookup or the source query fails;
    ///   nothing is written to the cache in that case
    /// - `MissingField` if the source row lacks a declared field
    ///
    /// A failed cache write after a successful source read is logged and the
    /// fields are returned anyway. The outcome is logged with the total
    /// latency of the call as `elapsed_ms`.
    pub async fn resolve(&self, schema: &RecordSchema, id: i64) -> Result<Resolution<FieldMap>> {
        let key = schema.cache_key(id)?;
        let key = &key;
        let started = Instant::now();

        let resolution = self
            .strategy
            .read(
                || self.cached(key),
                || self.load(schema, id),
                |fields: FieldMap| async move { self.cache.hash_set(key, &fields).await },
            )
            .await?;

        let elapsed_ms = elapsed_ms(started);
        match &resolution {
            Resolution::Cached(_) => tracing::debug!(%key, elapsed_ms, "Served from cache"),
            Resolution::Loaded(fields) => tracing::debug!(
                %key,
                fields = fields.len(),
                strategy = self.strategy.as_str(),
                elapsed_ms,
                "Loaded from source"
            ),
            Resolution::NotFound => {
                tracing::debug!(%key, elapsed_ms, "No such record at source");
                if self.strategy == ReadStrategy::Refresh {
                    self.evict_quietly(key).await;
                }
            }
        }

        Ok(resolution)
    }

    /// Resolve and decode back into a typed record.
    ///
    /// # Errors
    ///
    /// As [`Self::resolve`], plus `CorruptEntry` when a cached hash does not
    /// match the schema.
    pub async fn resolve_record(
        &self,
        schema: &RecordSchema,
        id: i64,
    ) -> Result<Resolution<Record>> {
        let key = schema.cache_key(id)?;

        match self.resolve(schema, id).await? {
            Resolution::Cached(fields) => {
                Ok(Resolution::Cached(RowCodec::decode(schema, &key, &fields)?))
            }
            Resolution::Loaded(fields) => {
                Ok(Resolution::Loaded(RowCodec::decode(schema, &key, &fields)?))
            }
            Resolution::NotFound => Ok(Resolution::NotFound),
        }
    }

    /// Drop the cached entry of record `id`, returning whether one existed.
    pub async fn evict(&self, schema: &RecordSchema, id: i64) -> Result<bool> {
        let key = schema.cache_key(id)?;
        let removed = self.cache.delete(&key).await?;
        tracing::debug!(%key, removed, "Evicted cache entry");
        Ok(removed)
    }

    // Empty hashes count as absent even if a store forgets to normalize them.
    async fn cached(&self, key: &CacheKey) -> Result<Option<FieldMap>> {
        Ok(self
            .cache
            .hash_get(key)
            .await?
            .filter(|entry| !entry.is_empty()))
    }

    async fn load(&self, schema: &RecordSchema, id: i64) -> Result<Option<FieldMap>> {
        match self.source.query_row(schema, id).await? {
            Some(row) => Ok(Some(RowCodec::encode(schema, &row)?)),
            None => Ok(None),
        }
    }

    async fn evict_quietly(&self, key: &CacheKey) {
        if let Err(e) = self.cache.delete(key).await {
            tracing::warn!(%key, error = %e, "Failed to evict stale cache entry");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCacheStore;
    use crate::error::PersistenceError;
    use crate::repository::MemoryRecordSource;
    use chrono::NaiveDate;
    use std::time::Duration;

    fn employee(id: i64, fname: &str) -> Record {
        Record::new()
            .with("empno", id)
            .with("fname", fname)
            .with("lname", "Tripathi")
            .with("job", "PFE")
            .with("mgr", 19i64)
            .with("hiredate", NaiveDate::from_ymd_opt(2018, 8, 5).unwrap())
            .with("sal", 90101.34)
            .with("comm", 1235.13)
            .with("dept", 96i64)
    }

    async fn setup(
        source: MemoryRecordSource,
    ) -> (
        CacheAside<MemoryCacheStore, MemoryRecordSource>,
        MemoryCacheStore,
        MemoryRecordSource,
    ) {
        source.insert("emp", 1, employee(1, "Virag")).await;
        source.insert("emp", 2, employee(2, "Asha")).await;

        let cache = MemoryCacheStore::new();
        let resolver = CacheAside::new(Arc::new(cache.clone()), Arc::new(source.clone()));
        (resolver, cache, source)
    }

    fn expected_fields() -> FieldMap {
        [
            ("empno", "1"),
            ("fname", "Virag"),
            ("lname", "Tripathi"),
            ("job", "PFE"),
            ("mgr", "19"),
            ("hiredate", "2018-08-05"),
            ("sal", "90101.34"),
            ("comm", "1235.13"),
            ("dept", "96"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    #[tokio::test]
    async fn test_miss_then_hit() {
        let (resolver, cache, source) = setup(MemoryRecordSource::new()).await;
        let schema = RecordSchema::employee();

        let first = resolver.resolve(&schema, 1).await.unwrap();
        assert_eq!(first, Resolution::Loaded(expected_fields()));
        assert_eq!(source.queries(), 1);
        assert_eq!(cache.writes(), 1);
        assert_eq!(cache.raw_entry("emp:1").await, Some(expected_fields()));

        let second = resolver.resolve(&schema, 1).await.unwrap();
        assert_eq!(second, Resolution::Cached(expected_fields()));
        assert_eq!(source.queries(), 1); // no source query on a hit
        assert_eq!(cache.writes(), 1);
    }

    #[tokio::test]
    async fn test_repeated_resolve_is_idempotent() {
        let (resolver, _cache, source) = setup(MemoryRecordSource::new()).await;
        let schema = RecordSchema::employee();

        let a = resolver.resolve(&schema, 2).await.unwrap().into_value();
        let b = resolver.resolve(&schema, 2).await.unwrap();
        assert!(b.is_hit());
        assert_eq!(a, b.into_value());
        assert_eq!(source.queries(), 1);
    }

    #[tokio::test]
    async fn test_not_found_writes_nothing() {
        let (resolver, cache, source) = setup(MemoryRecordSource::new()).await;
        let schema = RecordSchema::employee();

        let result = resolver.resolve(&schema, 999).await.unwrap();
        assert_eq!(result, Resolution::NotFound);
        assert_eq!(source.queries(), 1);
        assert_eq!(cache.writes(), 0);
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_record_inserted_later_becomes_visible() {
        let (resolver, _cache, source) = setup(MemoryRecordSource::new()).await;
        let schema = RecordSchema::employee();

        assert!(!resolver.resolve(&schema, 3).await.unwrap().is_found());
        source.insert("emp", 3, employee(3, "Kiran")).await;

        let fields = resolver.resolve(&schema, 3).await.unwrap().into_value().unwrap();
        assert_eq!(fields["fname"], "Kiran");
    }

    #[tokio::test]
    async fn test_invalid_id_rejected_before_io() {
        let (resolver, cache, source) = setup(MemoryRecordSource::new()).await;

        let err = resolver
            .resolve(&RecordSchema::employee(), -1)
            .await
            .unwrap_err();
        assert!(matches!(err, PersistenceError::InvalidId(_)));
        assert_eq!(cache.reads(), 0);
        assert_eq!(source.queries(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_misses_leave_complete_entry() {
        let (resolver, cache, source) =
            setup(MemoryRecordSource::with_latency(Duration::from_millis(20))).await;
        let schema = RecordSchema::employee();

        let (a, b) = tokio::join!(resolver.resolve(&schema, 2), resolver.resolve(&schema, 2));
        let a = a.unwrap().into_value().unwrap();
        let b = b.unwrap().into_value().unwrap();
        assert_eq!(a, b);

        let queries = source.queries();
        assert!((1..=2).contains(&queries), "queries = {queries}");

        let entry = cache.raw_entry("emp:2").await.unwrap();
        assert_eq!(entry.len(), 9);
        assert_eq!(entry, a);
    }

    #[tokio::test]
    async fn test_concurrent_misses_across_tasks() {
        let (resolver, cache, _source) =
            setup(MemoryRecordSource::with_latency(Duration::from_millis(5))).await;
        let schema = Arc::new(RecordSchema::employee());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let resolver = resolver.clone();
                let schema = Arc::clone(&schema);
                tokio::spawn(async move { resolver.resolve(&schema, 1).await })
            })
            .collect();

        for handle in handles {
            let fields = handle.await.unwrap().unwrap().into_value().unwrap();
            assert_eq!(fields, expected_fields());
        }
        assert_eq!(cache.raw_entry("emp:1").await, Some(expected_fields()));
    }

    #[tokio::test]
    async fn test_cache_write_failure_still_returns_fields() {
        let (resolver, cache, source) = setup(MemoryRecordSource::new()).await;
        cache.set_fail_writes(true);

        let result = resolver.resolve(&RecordSchema::employee(), 1).await.unwrap();
        assert_eq!(result, Resolution::Loaded(expected_fields()));
        assert_eq!(cache.writes(), 0);
        assert_eq!(source.queries(), 1);
    }

    #[tokio::test]
    async fn test_cache_read_failure_aborts() {
        let (resolver, cache, source) = setup(MemoryRecordSource::new()).await;
        cache.set_fail_reads(true);

        let err = resolver
            .resolve(&RecordSchema::employee(), 1)
            .await
            .unwrap_err();
        assert!(err.is_backend_unavailable());
        assert_eq!(source.queries(), 0);
    }

    #[tokio::test]
    async fn test_source_failure_aborts_without_write() {
        let (resolver, cache, source) = setup(MemoryRecordSource::new()).await;
        source.set_unavailable(true);

        let err = resolver
            .resolve(&RecordSchema::employee(), 1)
            .await
            .unwrap_err();
        assert!(err.is_backend_unavailable());
        assert_eq!(cache.writes(), 0);
    }

    #[tokio::test]
    async fn test_incomplete_row_is_not_cached() {
        let (resolver, cache, source) = setup(MemoryRecordSource::new()).await;
        source
            .insert("emp", 4, Record::new().with("empno", 4i64).with("fname", "Ravi"))
            .await;

        let err = resolver
            .resolve(&RecordSchema::employee(), 4)
            .await
            .unwrap_err();
        assert!(matches!(err, PersistenceError::MissingField { .. }));
        assert_eq!(cache.writes(), 0);
    }

    #[tokio::test]
    async fn test_empty_hash_counts_as_miss() {
        let (resolver, cache, source) = setup(MemoryRecordSource::new()).await;
        cache.put_raw("emp:1", FieldMap::new()).await;

        let result = resolver.resolve(&RecordSchema::employee(), 1).await.unwrap();
        assert!(!result.is_hit());
        assert_eq!(source.queries(), 1);
    }

    #[tokio::test]
    async fn test_stale_entry_until_evicted() {
        let (resolver, _cache, source) = setup(MemoryRecordSource::new()).await;
        let schema = RecordSchema::employee();

        resolver.resolve(&schema, 1).await.unwrap();
        source.insert("emp", 1, employee(1, "Vee")).await;

        let stale = resolver.resolve(&schema, 1).await.unwrap().into_value().unwrap();
        assert_eq!(stale["fname"], "Virag");

        assert!(resolver.evict(&schema, 1).await.unwrap());
        let fresh = resolver.resolve(&schema, 1).await.unwrap();
        assert!(!fresh.is_hit());
        assert_eq!(fresh.into_value().unwrap()["fname"], "Vee");
    }

    #[tokio::test]
    async fn test_refresh_strategy_overwrites_and_evicts() {
        let (mut resolver, cache, source) = setup(MemoryRecordSource::new()).await;
        let schema = RecordSchema::employee();

        resolver.resolve(&schema, 1).await.unwrap();
        source.insert("emp", 1, employee(1, "Vee")).await;

        resolver.set_strategy(ReadStrategy::Refresh);
        let refreshed = resolver.resolve(&schema, 1).await.unwrap();
        assert!(!refreshed.is_hit());
        assert_eq!(cache.raw_entry("emp:1").await.unwrap()["fname"], "Vee");

        source.remove("emp", 1).await;
        assert_eq!(resolver.resolve(&schema, 1).await.unwrap(), Resolution::NotFound);
        assert_eq!(cache.raw_entry("emp:1").await, None);
    }

    #[tokio::test]
    async fn test_source_only_strategy_skips_cache() {
        let (resolver, cache, source) = setup(MemoryRecordSource::new()).await;
        let resolver = CacheAside::with_strategy(
            Arc::clone(resolver.cache()),
            Arc::clone(resolver.source()),
            ReadStrategy::SourceOnly,
        );

        resolver.resolve(&RecordSchema::employee(), 1).await.unwrap();
        resolver.resolve(&RecordSchema::employee(), 1).await.unwrap();
        assert_eq!(source.queries(), 2);
        assert_eq!(cache.reads(), 0);
        assert_eq!(cache.writes(), 0);
    }

    #[tokio::test]
    async fn test_resolve_record_decodes() {
        let (resolver, cache, _source) = setup(MemoryRecordSource::new()).await;
        let schema = RecordSchema::employee();

        let record = resolver.resolve_record(&schema, 1).await.unwrap();
        assert_eq!(record, Resolution::Loaded(employee(1, "Virag")));

        let mut corrupt = expected_fields();
        corrupt.remove("sal");
        cache.put_raw("emp:1", corrupt).await;
        let err = resolver.resolve_record(&schema, 1).await.unwrap_err();
        assert!(matches!(err, PersistenceError::CorruptEntry { ref field, .. } if field == "sal"));
    }

    #[derive(Clone, Default)]
    struct LogBuffer(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl LogBuffer {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    fn elapsed_on(logs: &str, message: &str) -> f64 {
        let line = logs
            .lines()
            .find(|line| line.contains(message))
            .unwrap_or_else(|| panic!("no '{message}' event in:\n{logs}"));
        line.split_whitespace()
            .find_map(|token| token.strip_prefix("elapsed_ms="))
            .unwrap_or_else(|| panic!("no elapsed_ms on: {line}"))
            .parse()
            .unwrap()
    }

    #[tokio::test]
    async fn test_latency_of_each_step_is_logged() {
        let logs = LogBuffer::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let (resolver, _cache, _source) =
            setup(MemoryRecordSource::with_latency(Duration::from_millis(30))).await;
        let schema = RecordSchema::employee();

        resolver.resolve(&schema, 1).await.unwrap();
        resolver.resolve(&schema, 1).await.unwrap();

        let logs = logs.contents();
        assert!(elapsed_on(&logs, "Source read") >= 30.0);
        assert!(elapsed_on(&logs, "Loaded from source") >= 30.0);
        assert!(elapsed_on(&logs, "Cache populated") >= 0.0);
        assert!(elapsed_on(&logs, "Cache miss") >= 0.0);
        assert!(elapsed_on(&logs, "Cache hit") < 30.0);
        assert!(elapsed_on(&logs, "Served from cache") < 30.0);
    }

    #[tokio::test]
    async fn test_trait_objects() {
        let source = MemoryRecordSource::new();
        source.insert("emp", 1, employee(1, "Virag")).await;

        let cache: Arc<dyn CacheStore> = Arc::new(MemoryCacheStore::new());
        let source: Arc<dyn RecordSource> = Arc::new(source);
        let resolver = CacheAside::new(cache, source);

        let fields = resolver
            .resolve(&RecordSchema::employee(), 1)
            .await
            .unwrap()
            .into_result("emp", "emp:1")
            .unwrap();
        assert_eq!(fields, expected_fields());
    }
}
