//! Resolution cache abstraction.
//!
//! The server backs this with a database table; tests use the in-memory
//! implementation. `upsert` must be atomic per domain (insert-or-update, not
//! read-modify-write) so concurrent resolutions of the same domain cannot
//! lose updates.

use socialbox_common::models::ResolvedServer;
use socialbox_common::ProtocolResult;

pub trait RecordCache: Send + Sync {
    fn get(
        &self,
        domain: &str,
    ) -> impl std::future::Future<Output = ProtocolResult<Option<ResolvedServer>>> + Send;

    fn upsert(
        &self,
        domain: &str,
        record: &ResolvedServer,
    ) -> impl std::future::Future<Output = ProtocolResult<()>> + Send;
}

/// Process-local cache, for tests and cache-less deployments.
#[derive(Default)]
pub struct MemoryCache {
    entries: std::sync::Mutex<std::collections::HashMap<String, ResolvedServer>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordCache for MemoryCache {
    async fn get(&self, domain: &str) -> ProtocolResult<Option<ResolvedServer>> {
        Ok(self.entries.lock().unwrap().get(domain).cloned())
    }

    async fn upsert(&self, domain: &str, record: &ResolvedServer) -> ProtocolResult<()> {
        self.entries
            .lock()
            .unwrap()
            .insert(domain.to_string(), record.clone());
        Ok(())
    }
}
