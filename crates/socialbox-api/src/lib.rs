//! # socialbox-api
//!
//! The HTTP front door: session bootstrap, the RPC endpoint all eleven
//! `Encryption*` methods are dispatched through, and a health check.
//! Requests are authenticated before any channel operation executes —
//! internal callers through a signed session, external servers through an
//! `Identify-As` assertion verified against their published signing key.

pub mod auth;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use socialbox_db::repository::{ChannelStore, ResolvedServerStore, SessionStore, SigningKeyStore};
use socialbox_federation::RpcClient;
use socialbox_protocol::ChannelProtocol;
use socialbox_resolver::{DnsTxtLookup, PeerResolver};

/// Concrete protocol wiring used by the server binary.
pub type Protocol = ChannelProtocol<ChannelStore, RpcClient<DnsTxtLookup, ResolvedServerStore>>;
pub type Resolver = PeerResolver<DnsTxtLookup, ResolvedServerStore>;

/// Shared application state available to all route handlers.
pub struct AppState {
    pub protocol: Protocol,
    pub sessions: SessionStore,
    pub signing_keys: SigningKeyStore,
    /// Used to verify inbound external callers against their home server's
    /// published signing key.
    pub resolver: Resolver,
    pub db: socialbox_db::Database,
    /// Domain this server is authoritative for.
    pub local_domain: String,
    /// Temporal-signature windows accepted on inbound requests.
    pub signature_window_count: u32,
    /// Signing keys a single peer may register.
    pub max_signing_keys: u32,
}

/// Build the complete router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(routes::rpc::router())
        .merge(routes::session::router())
        .merge(routes::signing_keys::router())
        .merge(routes::health::router())
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}
