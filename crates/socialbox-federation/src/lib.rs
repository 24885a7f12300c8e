//! # socialbox-federation
//!
//! Outbound RPC to other Socialbox servers. The client resolves the remote
//! server through DNS discovery, attaches the standard headers (client
//! name/version, a temporal signature over the request body hash, and the
//! `Identify-As` attribution header), and performs exactly one attempt per
//! call — retry policy belongs to the channel protocol.

pub mod client;
pub mod error;

pub use client::RpcClient;
pub use error::RpcError;
