//! # socialbox-resolver
//!
//! The Identity Resolver: discovers remote Socialbox servers through DNS TXT
//! records of the form `v=socialbox;sb-rpc=<url>;sb-key=<b64>;sb-exp=<int>`
//! and caches the result keyed by domain. Lookups are never retried inline;
//! callers own retry policy.

pub mod cache;
pub mod error;
pub mod record;
pub mod resolver;

pub use cache::RecordCache;
pub use error::ResolutionError;
pub use record::DiscoveryRecord;
pub use resolver::{DnsTxtLookup, PeerResolver, TxtLookup};
