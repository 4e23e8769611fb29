//! Startup readiness probe for the cache and the source.

use std::sync::Arc;

use serde::Serialize;

use crate::cache::CacheStore;
use crate::error::{PersistenceError, Result};
use crate::repository::RecordSource;

/// Reachability of both stores
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Readiness {
    pub cache_ready: bool,
    pub source_ready: bool,
}

impl Readiness {
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        self.cache_ready && self.source_ready
    }

    /// Fail fast unless both stores answered.
    ///
    /// # Errors
    ///
    /// `BackendUnavailable` naming the store(s) that did not answer.
    pub fn ensure(self) -> Result<Self> {
        match (self.cache_ready, self.source_ready) {
            (true, true) => Ok(self),
            (false, true) => Err(PersistenceError::cache_unavailable("cache did not answer PING")),
            (true, false) => Err(PersistenceError::source_unavailable(
                "source did not answer health query",
            )),
            (false, false) => Err(PersistenceError::cache_unavailable(
                "neither cache nor source is reachable",
            )),
        }
    }
}

/// Pings the cache and the source; meant for startup, not the request path.
pub struct HealthProbe<C: ?Sized, S: ?Sized> {
    cache: Arc<C>,
    source: Arc<S>,
}

impl<C, S> HealthProbe<C, S>
where
    C: CacheStore + ?Sized,
    S: RecordSource + ?Sized,
{
    pub fn new(cache: Arc<C>, source: Arc<S>) -> Self {
        Self { cache, source }
    }

    /// Ping both stores concurrently.
    pub async fn check_ready(&self) -> Readiness {
        let (cache, source) = tokio::join!(self.cache.ping(), self.source.ping());

        let cache_ready = match cache {
            Ok(pong) if pong.eq_ignore_ascii_case("PONG") => true,
            Ok(other) => {
                tracing::warn!(reply = %other, "Unexpected cache PING reply");
                false
            }
            Err(e) => {
                tracing::warn!(error = %e, "Cache unreachable");
                false
            }
        };

        let source_ready = match source {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "Source unreachable");
                false
            }
        };

        let readiness = Readiness {
            cache_ready,
            source_ready,
        };
        tracing::info!(cache_ready, source_ready, "Health probe complete");
        readiness
    }
}
