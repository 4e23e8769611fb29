//! # Repository Traits
//!
//! Abstract record-source interface. Implementations can be swapped for
//! different backends (ScyllaDB, in-memory, etc.)

use async_trait::async_trait;
use rowcache_domain::{Record, RecordSchema};

use crate::error::Result;

// =============================================================================
// RECORD SOURCE
// =============================================================================

/// System of record, queried by primary key
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Fetch the row of `schema`'s table whose primary key equals `id`.
    ///
    /// Only the declared fields need to be populated. A missing row is
    /// `Ok(None)`; connectivity loss is `BackendUnavailable`.
    async fn query_row(&self, schema: &RecordSchema, id: i64) -> Result<Option<Record>>;

    /// Cheap round trip proving the source answers queries
    async fn ping(&self) -> Result<()>;
}
