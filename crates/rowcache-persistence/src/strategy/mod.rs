//! # Strategy Module
//!
//! Enum-based cache/source access strategies using dispatch pattern.
//!
//! ## Read Strategies
//! - `CacheAside` - Check cache, fall back to the source on miss, populate (default)
//! - `SourceOnly` - Skip cache entirely
//! - `Refresh` - Always read the source, overwrite the cache
//!
//! ## Example
//!
//! ```rust,ignore
//! use rowcache_persistence::strategy::ReadStrategy;
//!
//! let resolution = ReadStrategy::CacheAside
//!     .read(
//!         || cache.hash_get(&key),
//!         || load(&schema, id),
//!         |fields| async move { cache.hash_set(&key, &fields).await },
//!     )
//!     .await?;
//! ```

pub mod read_strategy;

pub use read_strategy::{ReadStrategy, Resolution};
