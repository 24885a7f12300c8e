//! # Socialbox Server
//!
//! Main binary: loads configuration, connects to PostgreSQL, prepares the
//! server's federation signing key, wires the resolver, federation client
//! and channel protocol together, and serves the HTTP front door.

use std::net::SocketAddr;

use chrono::{Duration, Utc};
use socialbox_api::{build_router, AppState};
use socialbox_common::config;
use socialbox_db::repository::{ChannelStore, ResolvedServerStore, SessionStore, SigningKeyStore};
use socialbox_db::Database;
use socialbox_federation::RpcClient;
use socialbox_protocol::{ChannelProtocol, ProtocolConfig};
use socialbox_resolver::{DiscoveryRecord, DnsTxtLookup, PeerResolver};
use url::Url;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = config::load()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "socialbox=debug,tower_http=debug".into()),
        )
        .with_target(true)
        .init();

    tracing::info!("Starting Socialbox v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Serving peers under domain '{}'", config.server.name);

    let db = Database::connect(&config).await?;
    db.migrate().await?;

    // Federation signing key: load from the database, or generate and
    // persist one on first run.
    let server_key =
        socialbox_db::server_keys::load_or_generate(&db.pg, socialbox_db::server_keys::FEDERATION_KEY)
            .await?;
    tracing::info!("Federation signing key ready: {}", server_key.public_key());

    // The TXT record other servers need to discover this one.
    let rpc_endpoint = Url::parse(&config.server.rpc_endpoint)?;
    let record_expiry = Utc::now() + Duration::seconds(config.resolver.record_ttl_secs as i64);
    tracing::info!(
        "Publish this DNS TXT record on {}: {}",
        config.server.name,
        DiscoveryRecord::generate(&rpc_endpoint, &server_key.public_key(), record_expiry.timestamp())
    );

    // Two resolver instances over the same persisted cache: one consumed by
    // the outbound client, one verifying inbound external callers.
    let record_ttl = config.resolver.record_ttl_secs as i64;
    let outbound_resolver = PeerResolver::new(
        DnsTxtLookup::from_system_conf()?,
        ResolvedServerStore::new(db.pg.clone()),
        record_ttl,
    );
    let inbound_resolver = PeerResolver::new(
        DnsTxtLookup::from_system_conf()?,
        ResolvedServerStore::new(db.pg.clone()),
        record_ttl,
    );

    let federation_client = RpcClient::new(
        outbound_resolver,
        server_key,
        format!("socialbox-server/{}", env!("CARGO_PKG_VERSION")),
        config.server.name.clone(),
        config.federation.request_timeout_secs,
    )?;

    let protocol = ChannelProtocol::new(
        ChannelStore::new(db.pg.clone()),
        federation_client,
        ProtocolConfig {
            local_domain: config.server.name.clone(),
            max_messages: u64::from(config.policies.channel_max_messages),
            channels_page_limit: config.policies.channels_page_limit,
            channel_requests_page_limit: config.policies.channel_requests_page_limit,
        },
    );

    let state = AppState {
        protocol,
        sessions: SessionStore::new(db.pg.clone()),
        signing_keys: SigningKeyStore::new(db.pg.clone()),
        resolver: inbound_resolver,
        db: db.clone(),
        local_domain: config.server.name.clone(),
        signature_window_count: config.federation.signature_window_count,
        max_signing_keys: config.policies.max_signing_keys,
    };

    let router = build_router(state);
    let addr = SocketAddr::new(config.server.host.parse()?, config.server.port);
    tracing::info!("RPC endpoint listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;
    Ok(())
}
