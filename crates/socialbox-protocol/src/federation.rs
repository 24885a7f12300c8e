//! Outbound federation seam.
//!
//! Every method replays a local channel operation against the counterpart
//! server so both sides' records stay consistent. Implementations resolve
//! the remote server, sign the call, and perform exactly one attempt —
//! retry policy belongs to the protocol, which never retries and instead
//! applies a forward compensating transition on failure.

use std::future::Future;

use socialbox_common::models::{ChannelMessage, EncryptionChannel, ReceiverKeys};
use socialbox_common::ProtocolResult;
use uuid::Uuid;

pub trait FederationGateway: Send + Sync {
    /// Mirror a channel create to the receiving peer's server.
    ///
    /// Returns the channel uuid the remote server committed to. The caller
    /// must treat a uuid different from `channel.uuid` as a void channel.
    fn mirror_create(
        &self,
        channel: &EncryptionChannel,
    ) -> impl Future<Output = ProtocolResult<Uuid>> + Send;

    /// Mirror an acceptance to the original caller's server.
    fn mirror_accept(
        &self,
        channel: &EncryptionChannel,
        keys: &ReceiverKeys,
    ) -> impl Future<Output = ProtocolResult<()>> + Send;

    /// Mirror a decline to the external participant's server.
    fn mirror_decline(
        &self,
        channel: &EncryptionChannel,
    ) -> impl Future<Output = ProtocolResult<()>> + Send;

    /// Notify the external participant that the channel is closed.
    fn mirror_close(
        &self,
        channel: &EncryptionChannel,
    ) -> impl Future<Output = ProtocolResult<()>> + Send;

    /// Relay a queued message to the recipient's server, reusing the same
    /// message uuid and timestamp so both logs are identically addressable.
    fn mirror_message(
        &self,
        channel: &EncryptionChannel,
        message: &ChannelMessage,
    ) -> impl Future<Output = ProtocolResult<()>> + Send;
}
