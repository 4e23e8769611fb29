//! # Cache Module
//!
//! Hash-per-record cache stores. Redis is the production backend; the
//! in-memory store backs tests and local demos.

pub mod memory;
#[cfg(feature = "redis")]
pub mod redis_client;
pub mod traits;

pub use memory::MemoryCacheStore;
#[cfg(feature = "redis")]
pub use redis_client::{CacheConfig, RedisCacheStore};
pub use traits::CacheStore;
