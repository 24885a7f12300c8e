//! # socialbox-common
//!
//! Shared foundation for the Socialbox federated server: peer addressing,
//! domain models, configuration, the error taxonomy, and the RPC wire
//! envelope used by both the inbound front door and the outbound
//! federation client.

pub mod address;
pub mod config;
pub mod error;
pub mod models;
pub mod rpc;
pub mod validation;

pub use address::PeerAddress;
pub use error::{ProtocolError, ProtocolResult};
