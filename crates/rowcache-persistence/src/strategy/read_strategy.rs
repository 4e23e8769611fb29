//! Read strategy implementations using enum dispatch.

use std::fmt::Debug;
use std::future::Future;
use std::time::Instant;

use crate::error::{PersistenceError, Result};

/// Read strategy enum - determines cache/source access pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadStrategy {
    /// Check cache first, fall back to the source on miss and populate
    #[default]
    CacheAside,
    /// Only read from the source, never touch the cache
    SourceOnly,
    /// Always read from the source and overwrite the cache
    Refresh,
}

/// Outcome of a strategy read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution<T> {
    /// Served from the cache; the source was not consulted
    Cached(T),
    /// Read from the source (and written to the cache unless `SourceOnly`)
    Loaded(T),
    /// The source has no such record
    NotFound,
}

impl<T> Resolution<T> {
    #[must_use]
    pub const fn is_hit(&self) -> bool {
        matches!(self, Self::Cached(_))
    }

    #[must_use]
    pub const fn is_found(&self) -> bool {
        !matches!(self, Self::NotFound)
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            Self::Cached(v) | Self::Loaded(v) => Some(v),
            Self::NotFound => None,
        }
    }

    /// Turn `NotFound` into [`PersistenceError::NotFound`]
    pub fn into_result(self, entity_type: &str, key: &str) -> Result<T> {
        self.into_value().ok_or_else(|| PersistenceError::NotFound {
            entity_type: entity_type.to_string(),
            key: key.to_string(),
        })
    }
}

impl ReadStrategy {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::CacheAside => "cache-aside",
            Self::SourceOnly => "source-only",
            Self::Refresh => "refresh",
        }
    }

    /// Execute a read operation according to the strategy.
    ///
    /// - `cache_fn`: Async function to read from cache
    /// - `source_fn`: Async function to read from the system of record
    /// - `populate_fn`: Async function to write a source value into the cache
    ///
    /// Cache and source faults abort the read. A failed populate is logged
    /// and the source value is still returned. Each step logs its latency as
    /// `elapsed_ms`.
    pub async fn read<T, CacheFut, SourceFut, PopulateFut>(
        &self,
        cache_fn: impl FnOnce() -> CacheFut,
        source_fn: impl FnOnce() -> SourceFut,
        populate_fn: impl FnOnce(T) -> PopulateFut,
    ) -> Result<Resolution<T>>
    where
        T: Clone + Debug,
        CacheFut: Future<Output = Result<Option<T>>>,
        SourceFut: Future<Output = Result<Option<T>>>,
        PopulateFut: Future<Output = Result<()>>,
    {
        match self {
            Self::CacheAside => {
                let started = Instant::now();
                let cached = cache_fn().await?;
                let elapsed_ms = elapsed_ms(started);

                if let Some(value) = cached {
                    tracing::debug!(elapsed_ms, "Cache hit");
                    return Ok(Resolution::Cached(value));
                }
                tracing::debug!(elapsed_ms, "Cache miss, falling back to source");

                Self::load_and_populate(source_fn, populate_fn).await
            }

            Self::SourceOnly => Ok(Self::load(source_fn)
                .await?
                .map_or(Resolution::NotFound, Resolution::Loaded)),

            Self::Refresh => Self::load_and_populate(source_fn, populate_fn).await,
        }
    }

    async fn load_and_populate<T, SourceFut, PopulateFut>(
        source_fn: impl FnOnce() -> SourceFut,
        populate_fn: impl FnOnce(T) -> PopulateFut,
    ) -> Result<Resolution<T>>
    where
        T: Clone + Debug,
        SourceFut: Future<Output = Result<Option<T>>>,
        PopulateFut: Future<Output = Result<()>>,
    {
        let Some(value) = Self::load(source_fn).await? else {
            return Ok(Resolution::NotFound);
        };

        let started = Instant::now();
        match populate_fn(value.clone()).await {
            Ok(()) => tracing::debug!(elapsed_ms = elapsed_ms(started), "Cache populated"),
            Err(e) => tracing::warn!(
                error = %e,
                elapsed_ms = elapsed_ms(started),
                "Failed to populate cache"
            ),
        }

        Ok(Resolution::Loaded(value))
    }

    async fn load<T, SourceFut>(source_fn: impl FnOnce() -> SourceFut) -> Result<Option<T>>
    where
        SourceFut: Future<Output = Result<Option<T>>>,
    {
        let started = Instant::now();
        let loaded = source_fn().await?;
        tracing::debug!(
            elapsed_ms = elapsed_ms(started),
            found = loaded.is_some(),
            "Source read"
        );
        Ok(loaded)
    }
}

/// Milliseconds since `started`, with sub-millisecond precision.
pub(crate) fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}
