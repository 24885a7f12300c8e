//! In-memory test doubles for the repository and federation seams.

use std::collections::HashMap;
use std::sync::Mutex;

use socialbox_common::models::{
    ChannelMessage, ChannelState, EncryptionChannel, MessageRecipient, ReceiverKeys,
};
use socialbox_common::{PeerAddress, ProtocolError, ProtocolResult};
use socialbox_crypto::{EncryptionKeyPair, SigningKeyPair};
use uuid::Uuid;

use crate::federation::FederationGateway;
use crate::repository::ChannelRepository;

/// Fresh `sig:`/`enc:` public keys for request fixtures.
pub fn keys_fixture() -> (String, String) {
    (
        SigningKeyPair::generate().public_key(),
        EncryptionKeyPair::generate().public_key(),
    )
}

#[derive(Default)]
pub struct MemoryRepository {
    channels: Mutex<HashMap<Uuid, EncryptionChannel>>,
    messages: Mutex<Vec<ChannelMessage>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all_channels(&self) -> Vec<EncryptionChannel> {
        self.channels.lock().unwrap().values().cloned().collect()
    }
}

impl ChannelRepository for MemoryRepository {
    async fn insert_channel(&self, channel: &EncryptionChannel) -> ProtocolResult<()> {
        self.channels.lock().unwrap().insert(channel.uuid, channel.clone());
        Ok(())
    }

    async fn get_channel(&self, uuid: Uuid) -> ProtocolResult<Option<EncryptionChannel>> {
        Ok(self.channels.lock().unwrap().get(&uuid).cloned())
    }

    async fn channel_exists(&self, uuid: Uuid) -> ProtocolResult<bool> {
        Ok(self.channels.lock().unwrap().contains_key(&uuid))
    }

    async fn accept_channel(&self, uuid: Uuid, keys: &ReceiverKeys) -> ProtocolResult<bool> {
        let mut channels = self.channels.lock().unwrap();
        match channels.get_mut(&uuid) {
            Some(ch) if ch.state == ChannelState::AwaitingReceiver => {
                ch.receiver = Some(keys.clone());
                ch.state = ChannelState::Opened;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_declined(&self, uuid: Uuid) -> ProtocolResult<bool> {
        let mut channels = self.channels.lock().unwrap();
        match channels.get_mut(&uuid) {
            Some(ch) if ch.state == ChannelState::AwaitingReceiver => {
                ch.state = ChannelState::Declined;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_closed(&self, uuid: Uuid) -> ProtocolResult<bool> {
        let mut channels = self.channels.lock().unwrap();
        match channels.get_mut(&uuid) {
            Some(ch) if ch.state != ChannelState::Closed => {
                ch.state = ChannelState::Closed;
                self.messages.lock().unwrap().retain(|m| m.channel_uuid != uuid);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_channels(
        &self,
        peer: &PeerAddress,
        page: u32,
        limit: u32,
    ) -> ProtocolResult<Vec<EncryptionChannel>> {
        let mut rows: Vec<_> = self
            .channels
            .lock()
            .unwrap()
            .values()
            .filter(|ch| ch.is_participant(peer))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(paginate(rows, page, limit))
    }

    async fn list_channel_requests(
        &self,
        peer: &PeerAddress,
        page: u32,
        limit: u32,
    ) -> ProtocolResult<Vec<EncryptionChannel>> {
        let mut rows: Vec<_> = self
            .channels
            .lock()
            .unwrap()
            .values()
            .filter(|ch| &ch.receiving_peer == peer && ch.state == ChannelState::AwaitingReceiver)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(paginate(rows, page, limit))
    }

    async fn append_message(&self, message: &ChannelMessage) -> ProtocolResult<()> {
        self.messages.lock().unwrap().push(message.clone());
        Ok(())
    }

    async fn message_exists(&self, channel_uuid: Uuid, message_uuid: Uuid) -> ProtocolResult<bool> {
        Ok(self
            .messages
            .lock()
            .unwrap()
            .iter()
            .any(|m| m.channel_uuid == channel_uuid && m.uuid == message_uuid))
    }

    async fn message_count(&self, channel_uuid: Uuid) -> ProtocolResult<u64> {
        Ok(self
            .messages
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.channel_uuid == channel_uuid)
            .count() as u64)
    }

    async fn prune_oldest_messages(&self, channel_uuid: Uuid, excess: u64) -> ProtocolResult<()> {
        let mut messages = self.messages.lock().unwrap();
        let mut victims: Vec<_> = messages
            .iter()
            .filter(|m| m.channel_uuid == channel_uuid)
            .map(|m| (m.timestamp, m.uuid))
            .collect();
        victims.sort();
        let doomed: Vec<Uuid> = victims.into_iter().take(excess as usize).map(|(_, u)| u).collect();
        messages.retain(|m| !doomed.contains(&m.uuid));
        Ok(())
    }

    async fn unacknowledged_messages(
        &self,
        channel_uuid: Uuid,
        recipient: MessageRecipient,
    ) -> ProtocolResult<Vec<ChannelMessage>> {
        let mut rows: Vec<_> = self
            .messages
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.channel_uuid == channel_uuid && m.recipient == recipient && !m.acknowledged)
            .cloned()
            .collect();
        rows.sort_by_key(|m| m.timestamp);
        Ok(rows)
    }

    async fn acknowledge_messages(
        &self,
        channel_uuid: Uuid,
        message_uuids: &[Uuid],
    ) -> ProtocolResult<()> {
        for m in self.messages.lock().unwrap().iter_mut() {
            if m.channel_uuid == channel_uuid && message_uuids.contains(&m.uuid) {
                m.acknowledged = true;
            }
        }
        Ok(())
    }
}

fn paginate(rows: Vec<EncryptionChannel>, page: u32, limit: u32) -> Vec<EncryptionChannel> {
    rows.into_iter()
        .skip(((page - 1) * limit) as usize)
        .take(limit as usize)
        .collect()
}

/// Gateway double that records every mirrored call.
pub struct RecordingGateway {
    calls: Mutex<Vec<String>>,
    /// Uuid the fake remote echoes back on create; defaults to agreement.
    echo: Option<Uuid>,
}

impl RecordingGateway {
    pub fn new() -> Self {
        Self { calls: Mutex::new(Vec::new()), echo: None }
    }

    /// A remote that commits a different channel id than requested.
    pub fn echoing(uuid: Uuid) -> Self {
        Self { calls: Mutex::new(Vec::new()), echo: Some(uuid) }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

impl FederationGateway for RecordingGateway {
    async fn mirror_create(&self, channel: &EncryptionChannel) -> ProtocolResult<Uuid> {
        self.record(format!("create:{}", channel.uuid));
        Ok(self.echo.unwrap_or(channel.uuid))
    }

    async fn mirror_accept(
        &self,
        channel: &EncryptionChannel,
        _keys: &ReceiverKeys,
    ) -> ProtocolResult<()> {
        self.record(format!("accept:{}", channel.uuid));
        Ok(())
    }

    async fn mirror_decline(&self, channel: &EncryptionChannel) -> ProtocolResult<()> {
        self.record(format!("decline:{}", channel.uuid));
        Ok(())
    }

    async fn mirror_close(&self, channel: &EncryptionChannel) -> ProtocolResult<()> {
        self.record(format!("close:{}", channel.uuid));
        Ok(())
    }

    async fn mirror_message(
        &self,
        channel: &EncryptionChannel,
        message: &ChannelMessage,
    ) -> ProtocolResult<()> {
        self.record(format!("message:{}:{}", channel.uuid, message.uuid));
        Ok(())
    }
}

/// Gateway double standing in for an unreachable remote server.
pub struct FailingGateway;

impl FederationGateway for FailingGateway {
    async fn mirror_create(&self, _channel: &EncryptionChannel) -> ProtocolResult<Uuid> {
        Err(unreachable_remote())
    }

    async fn mirror_accept(
        &self,
        _channel: &EncryptionChannel,
        _keys: &ReceiverKeys,
    ) -> ProtocolResult<()> {
        Err(unreachable_remote())
    }

    async fn mirror_decline(&self, _channel: &EncryptionChannel) -> ProtocolResult<()> {
        Err(unreachable_remote())
    }

    async fn mirror_close(&self, _channel: &EncryptionChannel) -> ProtocolResult<()> {
        Err(unreachable_remote())
    }

    async fn mirror_message(
        &self,
        _channel: &EncryptionChannel,
        _message: &ChannelMessage,
    ) -> ProtocolResult<()> {
        Err(unreachable_remote())
    }
}

fn unreachable_remote() -> ProtocolError {
    ProtocolError::Federation { message: "remote server unreachable".into() }
}
