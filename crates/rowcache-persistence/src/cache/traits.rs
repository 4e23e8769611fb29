//! # Cache Store Trait
//!
//! Key-value capability consumed by the cache-aside resolver.

use async_trait::async_trait;
use rowcache_domain::{CacheKey, FieldMap};

use crate::error::Result;

/// A store holding one flat hash per record.
///
/// ## Absence contract
///
/// Some backends (Redis `HGETALL` among them) answer a missing key with an
/// empty hash instead of a null. Implementations MUST normalize that: an
/// empty hash is reported as `Ok(None)`, never as `Ok(Some(empty))`. Callers
/// may rely on every `Some` entry being non-empty.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Read the whole hash stored at `key`
    async fn hash_get(&self, key: &CacheKey) -> Result<Option<FieldMap>>;

    /// Replace the hash at `key` with `fields` in a single step.
    ///
    /// Readers must never observe a mix of old and new fields.
    async fn hash_set(&self, key: &CacheKey, fields: &FieldMap) -> Result<()>;

    /// Remove the hash at `key`, returning whether it existed
    async fn delete(&self, key: &CacheKey) -> Result<bool>;

    /// Liveness check; healthy stores answer `"PONG"`
    async fn ping(&self) -> Result<String>;
}
