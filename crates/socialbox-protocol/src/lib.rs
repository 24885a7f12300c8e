//! # socialbox-protocol
//!
//! The Federated Encryption Channel Protocol: the state machine that lets
//! two peers on mutually distrusting servers negotiate a shared encryption
//! context, and the append-only relay that carries their acknowledged,
//! checksummed ciphertext.
//!
//! Storage and outbound federation are consumed through the traits in
//! [`repository`] and [`federation`]; the protocol itself holds no long-lived
//! in-process channel state. Each operation is a short transaction against
//! the persisted aggregate, so unrelated channels are safely parallel.

pub mod channel;
pub mod federation;
pub mod relay;
pub mod repository;

#[cfg(test)]
pub(crate) mod testing;

pub use channel::{ChannelProtocol, CreateChannelRequest, ProtocolConfig};
pub use federation::FederationGateway;
pub use repository::{ChannelRepository, SessionRepository, SigningKeyRepository};
