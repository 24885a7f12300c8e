//! Domain resolution over DNS TXT lookups.

use chrono::{Duration, Utc};
use hickory_resolver::TokioAsyncResolver;
use socialbox_common::models::ResolvedServer;
use tracing::debug;

use crate::cache::RecordCache;
use crate::error::ResolutionError;
use crate::record::{DiscoveryRecord, RECORD_TAG};

/// Raw TXT lookup, abstracted so the resolver logic is testable without a
/// live DNS server.
pub trait TxtLookup: Send + Sync {
    fn lookup_txt(
        &self,
        domain: &str,
    ) -> impl std::future::Future<Output = Result<Vec<String>, ResolutionError>> + Send;
}

/// Production lookup backed by the system's configured DNS.
pub struct DnsTxtLookup {
    resolver: TokioAsyncResolver,
}

impl DnsTxtLookup {
    pub fn from_system_conf() -> Result<Self, ResolutionError> {
        let resolver = TokioAsyncResolver::tokio_from_system_conf().map_err(|e| {
            ResolutionError::Dns {
                domain: String::new(),
                message: format!("failed to load system resolver configuration: {e}"),
            }
        })?;
        Ok(Self { resolver })
    }
}

impl TxtLookup for DnsTxtLookup {
    async fn lookup_txt(&self, domain: &str) -> Result<Vec<String>, ResolutionError> {
        let lookup = self
            .resolver
            .txt_lookup(domain)
            .await
            .map_err(|e| ResolutionError::Dns {
                domain: domain.to_string(),
                message: e.to_string(),
            })?;

        Ok(lookup
            .iter()
            .map(|txt| {
                // A TXT record may be split into multiple character strings;
                // the published value is their concatenation.
                txt.txt_data()
                    .iter()
                    .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
                    .collect::<String>()
            })
            .collect())
    }
}

/// Resolves federated server endpoints, consulting the cache first.
pub struct PeerResolver<L, C> {
    lookup: L,
    cache: C,
    /// Cache lifetime applied when a record publishes `sb-exp=0`.
    default_ttl: Duration,
}

impl<L: TxtLookup, C: RecordCache> PeerResolver<L, C> {
    pub fn new(lookup: L, cache: C, default_ttl_secs: i64) -> Self {
        Self {
            lookup,
            cache,
            default_ttl: Duration::seconds(default_ttl_secs),
        }
    }

    /// Resolve a domain to its RPC endpoint and trusted signing key.
    ///
    /// Failures are never retried here; the caller owns retry policy. A
    /// malformed record is a permanent failure for this lookup.
    pub async fn resolve(&self, domain: &str) -> Result<ResolvedServer, ResolutionError> {
        let now = Utc::now();
        if let Some(cached) = self.cache.get(domain).await.map_err(|e| {
            ResolutionError::Dns { domain: domain.to_string(), message: e.to_string() }
        })? {
            if !cached.is_expired(now) {
                return Ok(cached);
            }
            debug!(domain, "cached server record expired, re-resolving");
        }

        let values = self.lookup.lookup_txt(domain).await?;
        let tagged = values
            .iter()
            .find(|value| value.trim().starts_with(RECORD_TAG))
            .ok_or_else(|| ResolutionError::NotFound(domain.to_string()))?;

        let record = DiscoveryRecord::parse(tagged, domain)?;
        let resolved = ResolvedServer {
            rpc_endpoint: record.rpc_endpoint,
            public_signing_key: record.public_signing_key,
            expires_at: record.expires_at.unwrap_or(now + self.default_ttl),
        };

        self.cache.upsert(domain, &resolved).await.map_err(|e| {
            ResolutionError::Dns { domain: domain.to_string(), message: e.to_string() }
        })?;
        debug!(domain, endpoint = %resolved.rpc_endpoint, "resolved federated server");
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;
    use crate::cache::MemoryCache;

    struct FakeLookup {
        values: Mutex<Vec<String>>,
        calls: AtomicUsize,
    }

    impl FakeLookup {
        fn returning(values: &[&str]) -> Self {
            Self {
                values: Mutex::new(values.iter().map(|s| s.to_string()).collect()),
                calls: AtomicUsize::new(0),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl TxtLookup for &FakeLookup {
        async fn lookup_txt(&self, _domain: &str) -> Result<Vec<String>, ResolutionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.values.lock().unwrap().clone())
        }
    }

    const GOOD: &str = "v=socialbox;sb-rpc=https://rpc.example.org/;sb-key=sig:AAAA;sb-exp=0";

    #[tokio::test]
    async fn resolves_and_caches() {
        let lookup = FakeLookup::returning(&["v=spf1 -all", GOOD]);
        let resolver = PeerResolver::new(&lookup, MemoryCache::new(), 3600);

        let first = resolver.resolve("example.org").await.unwrap();
        assert_eq!(first.rpc_endpoint.as_str(), "https://rpc.example.org/");
        assert_eq!(first.public_signing_key, "sig:AAAA");

        // Second resolution is served from cache.
        let second = resolver.resolve("example.org").await.unwrap();
        assert_eq!(second, first);
        assert_eq!(lookup.call_count(), 1);
    }

    #[tokio::test]
    async fn expired_cache_entry_triggers_lookup() {
        let lookup = FakeLookup::returning(&[GOOD]);
        let cache = MemoryCache::new();
        let stale = ResolvedServer {
            rpc_endpoint: "https://old.example.org/".parse().unwrap(),
            public_signing_key: "sig:OLD".to_string(),
            expires_at: Utc::now() - Duration::seconds(1),
        };
        cache.upsert("example.org", &stale).await.unwrap();

        let resolver = PeerResolver::new(&lookup, cache, 3600);
        let resolved = resolver.resolve("example.org").await.unwrap();
        assert_eq!(resolved.public_signing_key, "sig:AAAA");
        assert_eq!(lookup.call_count(), 1);
    }

    #[tokio::test]
    async fn no_tagged_record_is_not_found() {
        let lookup = FakeLookup::returning(&["v=spf1 -all"]);
        let resolver = PeerResolver::new(&lookup, MemoryCache::new(), 3600);
        let err = resolver.resolve("example.org").await.unwrap_err();
        assert!(matches!(err, ResolutionError::NotFound(_)));
    }

    #[tokio::test]
    async fn malformed_tagged_record_is_permanent_failure() {
        let lookup = FakeLookup::returning(&["v=socialbox;sb-key=sig:AAAA"]);
        let resolver = PeerResolver::new(&lookup, MemoryCache::new(), 3600);
        let err = resolver.resolve("example.org").await.unwrap_err();
        assert!(matches!(err, ResolutionError::MalformedRecord { .. }));
        // Nothing was cached for the failed lookup.
        assert_eq!(lookup.call_count(), 1);
    }
}
