//! # Row Cache Persistence Library
//!
//! Cache-aside read path over a Redis hash cache and a ScyllaDB system of
//! record.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Caller                               │
//! └─────────────────────────────────────────────────────────────┘
//!                              │  resolve(schema, id)
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  CacheAside resolver                         │
//! │      (key mapping, row codec, read strategy)                 │
//! └─────────────────────────────────────────────────────────────┘
//!                    │                   │
//!                    ▼                   ▼
//! ┌─────────────────────────┐   ┌──────────────────────────────┐
//! │   CacheStore            │   │   RecordSource               │
//! │   (Redis hash per row)  │   │   (ScyllaDB, source of truth)│
//! └─────────────────────────┘   └──────────────────────────────┘
//! ```
//!
//! ## Features
//!
//! - `scylla`: Enable ScyllaDB backend (default)
//! - `redis`: Enable Redis cache layer (default)
//!
//! In-memory stores are always compiled in.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use rowcache_domain::RecordSchema;
//! use rowcache_persistence::{
//!     CacheAside, CacheConfig, RedisCacheStore, ScyllaClient, ScyllaConfig,
//!     ScyllaRecordSource,
//! };
//!
//! let scylla = Arc::new(ScyllaClient::new(ScyllaConfig::default()).await?);
//! let cache = RedisCacheStore::new(CacheConfig::default()).await?;
//!
//! let resolver = CacheAside::new(Arc::new(cache), Arc::new(ScyllaRecordSource::new(scylla)));
//! resolver.health_probe().check_ready().await.ensure()?;
//!
//! let fields = resolver.resolve(&RecordSchema::employee(), 1).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod cache;
pub mod error;
pub mod health;
pub mod repository;
pub mod resolver;
pub mod strategy;

// Re-export commonly used types
pub use cache::{CacheStore, MemoryCacheStore};
#[cfg(feature = "redis")]
pub use cache::{CacheConfig, RedisCacheStore};
pub use error::{Backend, PersistenceError, Result};
pub use health::{HealthProbe, Readiness};
pub use repository::{MemoryRecordSource, RecordSource};
#[cfg(feature = "scylla")]
pub use repository::{ScyllaClient, ScyllaConfig, ScyllaRecordSource};
pub use resolver::CacheAside;
pub use strategy::{ReadStrategy, Resolution};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Connect both backends with default configuration
///
/// # Errors
///
/// Returns an error if either ScyllaDB or Redis connection fails.
#[cfg(all(feature = "scylla", feature = "redis"))]
pub async fn init_default() -> Result<CacheAside<RedisCacheStore, ScyllaRecordSource>> {
    let scylla = ScyllaClient::new(ScyllaConfig::default()).await?;
    let cache = RedisCacheStore::new(CacheConfig::default()).await?;
    Ok(CacheAside::new(
        std::sync::Arc::new(cache),
        std::sync::Arc::new(ScyllaRecordSource::new(std::sync::Arc::new(scylla))),
    ))
}
