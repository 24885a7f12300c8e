//! Domain models — persisted aggregates and their value types.

pub mod channel;
pub mod resolved;
pub mod session;
pub mod signing_key;

pub use channel::{ChannelMessage, ChannelState, EncryptionChannel, MessageRecipient, ReceiverKeys};
pub use resolved::ResolvedServer;
pub use session::{Session, SessionState};
pub use signing_key::{SigningKeyRecord, SigningKeyState};
