//! Store types organized by domain, each implementing the corresponding
//! protocol trait.

pub mod channels;
pub mod resolved;
pub mod sessions;
pub mod signing_keys;

pub use channels::ChannelStore;
pub use resolved::ResolvedServerStore;
pub use sessions::SessionStore;
pub use signing_keys::SigningKeyStore;
