//! Application configuration loaded from environment variables and config
//! files.
//!
//! Precedence: env vars > .env file > config.toml > defaults. The loaded
//! `AppConfig` is passed explicitly to each component at construction; there
//! is no process-wide mutable singleton.

use serde::Deserialize;

/// Load configuration from the environment.
///
/// Called once at startup; the result is shared by value or `Arc`.
pub fn load() -> Result<AppConfig, config::ConfigError> {
    // Load .env file if present (development).
    let _ = dotenvy::dotenv();

    let cfg = config::Config::builder()
        // Defaults
        .set_default("server.name", "localhost")?
        .set_default("server.host", "0.0.0.0")?
        .set_default("server.port", 8085)?
        .set_default("server.rpc_endpoint", "https://localhost:8085/rpc")?
        .set_default("database.max_connections", 20)?
        .set_default("database.min_connections", 5)?
        .set_default("federation.request_timeout_secs", 30)?
        .set_default("federation.signature_window_count", 1)?
        .set_default("resolver.record_ttl_secs", 3600)?
        .set_default("policies.max_signing_keys", 20)?
        .set_default("policies.channel_max_messages", 100)?
        .set_default("policies.channels_page_limit", 100)?
        .set_default("policies.channel_requests_page_limit", 100)?
        // Optional config file
        .add_source(config::File::with_name("config").required(false))
        // Environment variables (SOCIALBOX_SERVER__NAME, SOCIALBOX_DATABASE__URL, …)
        .add_source(
            config::Environment::with_prefix("SOCIALBOX")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    cfg.try_deserialize()
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub federation: FederationConfig,
    pub resolver: ResolverConfig,
    pub policies: PoliciesConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Public domain peers on this server are addressed under
    /// (e.g. "socialbox.example.com").
    pub name: String,
    pub host: String,
    pub port: u16,
    /// Public HTTPS RPC endpoint published in this server's DNS record.
    pub rpc_endpoint: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL.
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FederationConfig {
    /// Per-call timeout for outbound federation requests. Must be finite; a
    /// timeout is a federation failure, never retried automatically.
    pub request_timeout_secs: u64,
    /// Accepted temporal-signature windows when verifying inbound requests.
    /// Larger values trade replay resistance for clock-skew tolerance.
    pub signature_window_count: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ResolverConfig {
    /// Expiry advertised in this server's own discovery TXT record.
    pub record_ttl_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PoliciesConfig {
    /// Maximum signing keys a peer may register.
    pub max_signing_keys: u32,
    /// Per-channel message retention cap; oldest unacknowledged messages
    /// are pruned when exceeded.
    pub channel_max_messages: u32,
    pub channels_page_limit: u32,
    pub channel_requests_page_limit: u32,
}
