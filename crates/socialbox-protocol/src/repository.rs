//! Persistence traits consumed by the protocol.
//!
//! Implementations must wrap storage-layer failures into
//! `ProtocolError::Internal` before returning; raw driver errors never cross
//! this boundary. State-transition methods return whether the transition was
//! applied: the check of the prior state and the write must be one atomic
//! statement, so two concurrent `accept` calls on the same channel yield
//! exactly one `true`.

use std::future::Future;

use chrono::{DateTime, Utc};
use socialbox_common::models::{
    ChannelMessage, EncryptionChannel, MessageRecipient, ReceiverKeys, Session, SigningKeyRecord,
};
use socialbox_common::{PeerAddress, ProtocolResult};
use uuid::Uuid;

pub trait ChannelRepository: Send + Sync {
    fn insert_channel(
        &self,
        channel: &EncryptionChannel,
    ) -> impl Future<Output = ProtocolResult<()>> + Send;

    fn get_channel(
        &self,
        uuid: Uuid,
    ) -> impl Future<Output = ProtocolResult<Option<EncryptionChannel>>> + Send;

    fn channel_exists(&self, uuid: Uuid) -> impl Future<Output = ProtocolResult<bool>> + Send;

    /// `AWAITING_RECEIVER → OPENED`, setting all receiver fields in the same
    /// statement. Returns `false` when the channel was not awaiting.
    fn accept_channel(
        &self,
        uuid: Uuid,
        keys: &ReceiverKeys,
    ) -> impl Future<Output = ProtocolResult<bool>> + Send;

    /// `AWAITING_RECEIVER → DECLINED`. Returns `false` when the channel was
    /// not awaiting.
    fn mark_declined(&self, uuid: Uuid) -> impl Future<Output = ProtocolResult<bool>> + Send;

    /// Any non-`CLOSED` state `→ CLOSED`, cascading deletion of all queued
    /// messages. Returns `false` when already closed.
    fn mark_closed(&self, uuid: Uuid) -> impl Future<Output = ProtocolResult<bool>> + Send;

    /// All channels the peer participates in, newest first, paginated.
    fn list_channels(
        &self,
        peer: &PeerAddress,
        page: u32,
        limit: u32,
    ) -> impl Future<Output = ProtocolResult<Vec<EncryptionChannel>>> + Send;

    /// Incoming `AWAITING_RECEIVER` channels addressed to the peer.
    fn list_channel_requests(
        &self,
        peer: &PeerAddress,
        page: u32,
        limit: u32,
    ) -> impl Future<Output = ProtocolResult<Vec<EncryptionChannel>>> + Send;

    fn append_message(
        &self,
        message: &ChannelMessage,
    ) -> impl Future<Output = ProtocolResult<()>> + Send;

    fn message_exists(
        &self,
        channel_uuid: Uuid,
        message_uuid: Uuid,
    ) -> impl Future<Output = ProtocolResult<bool>> + Send;

    fn message_count(&self, channel_uuid: Uuid)
        -> impl Future<Output = ProtocolResult<u64>> + Send;

    /// Delete the `excess` oldest messages on a channel, by timestamp.
    fn prune_oldest_messages(
        &self,
        channel_uuid: Uuid,
        excess: u64,
    ) -> impl Future<Output = ProtocolResult<()>> + Send;

    /// Unacknowledged messages for one side, timestamp ascending (FIFO).
    fn unacknowledged_messages(
        &self,
        channel_uuid: Uuid,
        recipient: MessageRecipient,
    ) -> impl Future<Output = ProtocolResult<Vec<ChannelMessage>>> + Send;

    /// Idempotent; a uuid not belonging to the channel is a no-op.
    fn acknowledge_messages(
        &self,
        channel_uuid: Uuid,
        message_uuids: &[Uuid],
    ) -> impl Future<Output = ProtocolResult<()>> + Send;
}

pub trait SessionRepository: Send + Sync {
    fn insert_session(
        &self,
        session: &Session,
    ) -> impl Future<Output = ProtocolResult<()>> + Send;

    fn get_session(
        &self,
        uuid: Uuid,
    ) -> impl Future<Output = ProtocolResult<Option<Session>>> + Send;

    /// Bind the session to a peer identity, marking it authenticated.
    fn authenticate_session(
        &self,
        uuid: Uuid,
        peer: &PeerAddress,
    ) -> impl Future<Output = ProtocolResult<()>> + Send;

    fn close_session(&self, uuid: Uuid) -> impl Future<Output = ProtocolResult<()>> + Send;
}

pub trait SigningKeyRepository: Send + Sync {
    fn insert_key(
        &self,
        record: &SigningKeyRecord,
    ) -> impl Future<Output = ProtocolResult<()>> + Send;

    fn get_key(
        &self,
        uuid: Uuid,
    ) -> impl Future<Output = ProtocolResult<Option<SigningKeyRecord>>> + Send;

    fn list_keys(
        &self,
        peer: &PeerAddress,
    ) -> impl Future<Output = ProtocolResult<Vec<SigningKeyRecord>>> + Send;

    fn count_keys(&self, peer: &PeerAddress) -> impl Future<Output = ProtocolResult<u64>> + Send;

    /// `ACTIVE → REVOKED`, scoped to the owning peer. Returns `false` when
    /// the key was not active or not theirs.
    fn revoke_key(
        &self,
        uuid: Uuid,
        peer: &PeerAddress,
    ) -> impl Future<Output = ProtocolResult<bool>> + Send;

    /// Mark keys whose `expires_at` has passed as `EXPIRED`.
    fn expire_keys(
        &self,
        now: DateTime<Utc>,
    ) -> impl Future<Output = ProtocolResult<u64>> + Send;
}
