//! In-process record source.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rowcache_domain::{Record, RecordSchema};
use tokio::sync::RwLock;

use super::traits::RecordSource;
use crate::error::{PersistenceError, Result};

type Table = BTreeMap<i64, Record>;

/// Tables held in memory, keyed by namespace then primary key.
///
/// Counts every `query_row` call so callers can assert how often the source
/// was consulted. Cloning shares the tables and counters.
#[derive(Debug, Clone, Default)]
pub struct MemoryRecordSource {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    tables: RwLock<HashMap<String, Table>>,
    queries: AtomicUsize,
    unavailable: AtomicBool,
    latency: Option<Duration>,
}

impl MemoryRecordSource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every query by `latency`, widening race windows in tests
    #[must_use]
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                latency: Some(latency),
                ..Inner::default()
            }),
        }
    }

    /// Insert or replace a row
    pub async fn insert(&self, namespace: &str, id: i64, record: Record) {
        self.inner
            .tables
            .write()
            .await
            .entry(namespace.to_string())
            .or_default()
            .insert(id, record);
    }

    pub async fn remove(&self, namespace: &str, id: i64) -> Option<Record> {
        self.inner
            .tables
            .write()
            .await
            .get_mut(namespace)
            .and_then(|table| table.remove(&id))
    }

    /// Number of `query_row` calls made so far
    pub fn queries(&self) -> usize {
        self.inner.queries.load(Ordering::SeqCst)
    }

    /// Simulate connectivity loss
    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.inner.unavailable.load(Ordering::SeqCst) {
            Err(PersistenceError::source_unavailable("in-memory source marked unavailable"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RecordSource for MemoryRecordSource {
    async fn query_row(&self, schema: &RecordSchema, id: i64) -> Result<Option<Record>> {
        self.inner.queries.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.inner.latency {
            tokio::time::sleep(latency).await;
        }
        self.check()?;

        let tables = self.inner.tables.read().await;
        Ok(tables
            .get(schema.namespace())
            .and_then(|table| table.get(&id))
            .cloned())
    }

    async fn ping(&self) -> Result<()> {
        self.check()
    }
}
