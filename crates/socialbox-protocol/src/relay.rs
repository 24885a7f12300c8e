//! Message relay.
//!
//! Append-only, per-side queues of opaque ciphertext. The server never
//! inspects, decrypts or re-encrypts `data`; the checksum is caller-supplied
//! and caller-verified, this server's only integrity duty is exact byte
//! storage and transmission. Acknowledgement is the single permitted
//! mutation and is idempotent.

use chrono::{DateTime, Utc};
use socialbox_common::models::{ChannelMessage, ChannelState};
use socialbox_common::validation::{is_sha512_hex, is_timestamp_in_range};
use socialbox_common::{PeerAddress, ProtocolError, ProtocolResult};
use tracing::debug;
use uuid::Uuid;

use crate::channel::ChannelProtocol;
use crate::federation::FederationGateway;
use crate::repository::ChannelRepository;

/// Supplied timestamps may deviate from local time by at most this much.
const MESSAGE_TIMESTAMP_TOLERANCE_SECS: i64 = 3600;

impl<R: ChannelRepository, G: FederationGateway> ChannelProtocol<R, G> {
    /// Queue a message on an opened channel, addressed to the side opposite
    /// the sender.
    ///
    /// A local sender gets a fresh uuid and timestamp; an external (mirrored)
    /// send must pin both so the two servers' logs stay identically
    /// addressable. When the recipient peer is external, the message is
    /// relayed outward with the same uuid and timestamp.
    pub async fn send_message(
        &self,
        caller: &PeerAddress,
        channel_uuid: Uuid,
        checksum: String,
        data: String,
        message_uuid: Option<Uuid>,
        timestamp: Option<DateTime<Utc>>,
    ) -> ProtocolResult<Uuid> {
        let channel = self.require_channel(channel_uuid).await?;
        let Some(recipient) = channel.determine_recipient(caller) else {
            return Err(ProtocolError::Forbidden);
        };
        if channel.state != ChannelState::Opened {
            return Err(ProtocolError::StateConflict {
                message: format!("cannot send on a channel in state {}", channel.state),
            });
        }
        if !is_sha512_hex(&checksum) {
            return Err(ProtocolError::Validation {
                message: "checksum must be a SHA-512 hex digest".into(),
            });
        }
        if data.is_empty() {
            return Err(ProtocolError::Validation { message: "data cannot be empty".into() });
        }
        // A mirrored send must pin both ids so the two servers' logs stay
        // identically addressable, just like a mirrored create pins the
        // channel uuid.
        if caller.is_external(&self.config.local_domain) {
            if message_uuid.is_none() {
                return Err(ProtocolError::MissingParameter { name: "message_uuid".into() });
            }
            if timestamp.is_none() {
                return Err(ProtocolError::MissingParameter { name: "timestamp".into() });
            }
        }
        let timestamp = match timestamp {
            Some(ts) if !is_timestamp_in_range(ts, MESSAGE_TIMESTAMP_TOLERANCE_SECS) => {
                return Err(ProtocolError::Validation {
                    message: "message timestamp is too far from server time".into(),
                });
            }
            Some(ts) => ts,
            None => Utc::now(),
        };
        let message_uuid = message_uuid.unwrap_or_else(Uuid::new_v4);
        if self.repo.message_exists(channel_uuid, message_uuid).await? {
            return Err(ProtocolError::UuidConflict);
        }

        // Retention cap: drop the oldest rows to make room.
        let count = self.repo.message_count(channel_uuid).await?;
        if count >= self.config.max_messages {
            let excess = count - self.config.max_messages + 1;
            self.repo.prune_oldest_messages(channel_uuid, excess).await?;
            debug!(channel = %channel_uuid, excess, "pruned oldest channel messages");
        }

        let message = ChannelMessage {
            uuid: message_uuid,
            channel_uuid,
            recipient,
            checksum,
            data,
            acknowledged: false,
            timestamp,
        };
        self.repo.append_message(&message).await?;

        let recipient_peer = match recipient {
            socialbox_common::models::MessageRecipient::Sender => &channel.calling_peer,
            socialbox_common::models::MessageRecipient::Receiver => &channel.receiving_peer,
        };
        if recipient_peer.is_external(&self.config.local_domain)
            && !caller.is_external(&self.config.local_domain)
        {
            if let Err(e) = self.gateway.mirror_message(&channel, &message).await {
                return Err(ProtocolError::Federation {
                    message: format!("message queued locally but relay failed: {e}"),
                });
            }
        }
        Ok(message_uuid)
    }

    /// All unacknowledged messages queued for the caller's side, oldest
    /// first. With `acknowledge` the returned messages are acknowledged in
    /// the same call — fewer round trips, but no redelivery if the client
    /// crashes before processing them.
    pub async fn receive_messages(
        &self,
        caller: &PeerAddress,
        channel_uuid: Uuid,
        acknowledge: bool,
    ) -> ProtocolResult<Vec<ChannelMessage>> {
        let channel = self.require_channel(channel_uuid).await?;
        let Some(side) = channel.side_of(caller) else {
            return Err(ProtocolError::Forbidden);
        };
        if channel.state != ChannelState::Opened {
            return Err(ProtocolError::StateConflict {
                message: format!("cannot receive on a channel in state {}", channel.state),
            });
        }

        let messages = self.repo.unacknowledged_messages(channel_uuid, side).await?;
        if acknowledge && !messages.is_empty() {
            let uuids: Vec<Uuid> = messages.iter().map(|m| m.uuid).collect();
            self.repo.acknowledge_messages(channel_uuid, &uuids).await?;
        }
        Ok(messages)
    }

    /// Acknowledge a single message. Idempotent; a uuid from another channel
    /// is a no-op, not a probe for cross-channel existence.
    pub async fn acknowledge_message(
        &self,
        caller: &PeerAddress,
        channel_uuid: Uuid,
        message_uuid: Uuid,
    ) -> ProtocolResult<()> {
        self.acknowledge_messages(caller, channel_uuid, &[message_uuid]).await
    }

    /// Batch form of [`Self::acknowledge_message`].
    pub async fn acknowledge_messages(
        &self,
        caller: &PeerAddress,
        channel_uuid: Uuid,
        message_uuids: &[Uuid],
    ) -> ProtocolResult<()> {
        let channel = self.require_channel(channel_uuid).await?;
        if !channel.is_participant(caller) {
            return Err(ProtocolError::Forbidden);
        }
        if message_uuids.is_empty() {
            return Err(ProtocolError::MissingParameter { name: "message_uuids".into() });
        }
        self.repo.acknowledge_messages(channel_uuid, message_uuids).await
    }
}

#[cfg(test)]
mod tests {
    use socialbox_common::models::ReceiverKeys;

    use super::*;
    use crate::channel::{CreateChannelRequest, ProtocolConfig};
    use crate::testing::{keys_fixture, MemoryRepository, RecordingGateway};

    const CHECKSUM: &str = "0cf9180a764aba863a67b6d72f0918bc131c6772642cb2dce5a34f0a702f9470ddc2bf125c12198b1995c233c34b4afd346c54a2334c350a948a51b6e8b4e6b6";

    fn config() -> ProtocolConfig {
        ProtocolConfig {
            local_domain: "a.example".into(),
            max_messages: 100,
            channels_page_limit: 100,
            channel_requests_page_limit: 100,
        }
    }

    async fn opened_channel(
        p: &ChannelProtocol<MemoryRepository, RecordingGateway>,
        caller: &PeerAddress,
        receiver: &PeerAddress,
    ) -> Uuid {
        let (signing, encryption) = keys_fixture();
        let uuid = p
            .create_channel(
                caller,
                CreateChannelRequest {
                    receiving_peer: receiver.clone(),
                    signature_uuid: Uuid::new_v4(),
                    public_signing_key: signing,
                    public_encryption_key: encryption,
                    transport_algorithm: "xchacha20".into(),
                    channel_uuid: caller
                        .is_external("a.example")
                        .then(Uuid::new_v4),
                },
            )
            .await
            .unwrap();
        let (signing, encryption) = keys_fixture();
        p.accept_channel(
            receiver,
            uuid,
            ReceiverKeys {
                signature_uuid: Uuid::new_v4(),
                public_signing_key: signing,
                public_encryption_key: encryption,
                transport_encryption_key: "c2VhbGVkLWtleQ".into(),
            },
        )
        .await
        .unwrap();
        uuid
    }

    #[tokio::test]
    async fn fifo_delivery_per_side() {
        let p = ChannelProtocol::new(MemoryRepository::new(), RecordingGateway::new(), config());
        let alice: PeerAddress = "alice@a.example".parse().unwrap();
        let carol: PeerAddress = "carol@a.example".parse().unwrap();
        let channel = opened_channel(&p, &alice, &carol).await;

        let base = Utc::now();
        let mut sent = Vec::new();
        for i in 0..3 {
            let uuid = p
                .send_message(
                    &alice,
                    channel,
                    CHECKSUM.into(),
                    format!("blob-{i}"),
                    Some(Uuid::new_v4()),
                    Some(base + chrono::Duration::milliseconds(i)),
                )
                .await
                .unwrap();
            sent.push(uuid);
        }

        let received = p.receive_messages(&carol, channel, false).await.unwrap();
        assert_eq!(received.iter().map(|m| m.uuid).collect::<Vec<_>>(), sent);
        assert!(received.iter().all(|m| !m.acknowledged));

        // The sender's own queue is empty.
        assert!(p.receive_messages(&alice, channel, false).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn each_message_appears_once_until_acknowledged() {
        let p = ChannelProtocol::new(MemoryRepository::new(), RecordingGateway::new(), config());
        let alice: PeerAddress = "alice@a.example".parse().unwrap();
        let carol: PeerAddress = "carol@a.example".parse().unwrap();
        let channel = opened_channel(&p, &alice, &carol).await;

        let uuid = p
            .send_message(&alice, channel, CHECKSUM.into(), "blob".into(), None, None)
            .await
            .unwrap();

        assert_eq!(p.receive_messages(&carol, channel, false).await.unwrap().len(), 1);
        // Still queued: nothing was acknowledged.
        assert_eq!(p.receive_messages(&carol, channel, false).await.unwrap().len(), 1);

        p.acknowledge_message(&carol, channel, uuid).await.unwrap();
        assert!(p.receive_messages(&carol, channel, false).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn combined_fetch_and_ack() {
        let p = ChannelProtocol::new(MemoryRepository::new(), RecordingGateway::new(), config());
        let alice: PeerAddress = "alice@a.example".parse().unwrap();
        let carol: PeerAddress = "carol@a.example".parse().unwrap();
        let channel = opened_channel(&p, &alice, &carol).await;

        p.send_message(&alice, channel, CHECKSUM.into(), "blob".into(), None, None)
            .await
            .unwrap();

        assert_eq!(p.receive_messages(&carol, channel, true).await.unwrap().len(), 1);
        assert!(p.receive_messages(&carol, channel, true).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn acknowledgement_is_idempotent_and_channel_scoped() {
        let p = ChannelProtocol::new(MemoryRepository::new(), RecordingGateway::new(), config());
        let alice: PeerAddress = "alice@a.example".parse().unwrap();
        let carol: PeerAddress = "carol@a.example".parse().unwrap();
        let channel = opened_channel(&p, &alice, &carol).await;
        let other = opened_channel(&p, &alice, &carol).await;

        let uuid = p
            .send_message(&alice, channel, CHECKSUM.into(), "blob".into(), None, None)
            .await
            .unwrap();

        p.acknowledge_message(&carol, channel, uuid).await.unwrap();
        p.acknowledge_message(&carol, channel, uuid).await.unwrap();

        // Acknowledging through the wrong channel is a no-op, not an error
        // and not a mutation.
        let uuid2 = p
            .send_message(&alice, channel, CHECKSUM.into(), "blob2".into(), None, None)
            .await
            .unwrap();
        p.acknowledge_message(&alice, other, uuid2).await.unwrap();
        let pending = p.receive_messages(&carol, channel, false).await.unwrap();
        assert_eq!(pending.iter().map(|m| m.uuid).collect::<Vec<_>>(), vec![uuid2]);
    }

    #[tokio::test]
    async fn send_requires_opened_state_and_participant() {
        let p = ChannelProtocol::new(MemoryRepository::new(), RecordingGateway::new(), config());
        let alice: PeerAddress = "alice@a.example".parse().unwrap();
        let carol: PeerAddress = "carol@a.example".parse().unwrap();
        let eve: PeerAddress = "eve@a.example".parse().unwrap();

        let (signing, encryption) = keys_fixture();
        let awaiting = p
            .create_channel(
                &alice,
                CreateChannelRequest {
                    receiving_peer: carol.clone(),
                    signature_uuid: Uuid::new_v4(),
                    public_signing_key: signing,
                    public_encryption_key: encryption,
                    transport_algorithm: "xchacha20".into(),
                    channel_uuid: None,
                },
            )
            .await
            .unwrap();

        assert!(matches!(
            p.send_message(&alice, awaiting, CHECKSUM.into(), "blob".into(), None, None)
                .await
                .unwrap_err(),
            ProtocolError::StateConflict { .. }
        ));

        let opened = opened_channel(&p, &alice, &carol).await;
        assert!(matches!(
            p.send_message(&eve, opened, CHECKSUM.into(), "blob".into(), None, None)
                .await
                .unwrap_err(),
            ProtocolError::Forbidden
        ));
    }

    #[tokio::test]
    async fn send_validates_checksum_data_and_timestamp() {
        let p = ChannelProtocol::new(MemoryRepository::new(), RecordingGateway::new(), config());
        let alice: PeerAddress = "alice@a.example".parse().unwrap();
        let carol: PeerAddress = "carol@a.example".parse().unwrap();
        let channel = opened_channel(&p, &alice, &carol).await;

        assert!(matches!(
            p.send_message(&alice, channel, "abc".into(), "blob".into(), None, None)
                .await
                .unwrap_err(),
            ProtocolError::Validation { .. }
        ));
        assert!(matches!(
            p.send_message(&alice, channel, CHECKSUM.into(), String::new(), None, None)
                .await
                .unwrap_err(),
            ProtocolError::Validation { .. }
        ));
        let stale = Utc::now() - chrono::Duration::seconds(7200);
        assert!(matches!(
            p.send_message(&alice, channel, CHECKSUM.into(), "blob".into(), None, Some(stale))
                .await
                .unwrap_err(),
            ProtocolError::Validation { .. }
        ));
    }

    #[tokio::test]
    async fn duplicate_message_uuid_conflicts() {
        let p = ChannelProtocol::new(MemoryRepository::new(), RecordingGateway::new(), config());
        let alice: PeerAddress = "alice@a.example".parse().unwrap();
        let carol: PeerAddress = "carol@a.example".parse().unwrap();
        let channel = opened_channel(&p, &alice, &carol).await;

        let uuid = Uuid::new_v4();
        p.send_message(&alice, channel, CHECKSUM.into(), "blob".into(), Some(uuid), None)
            .await
            .unwrap();
        assert!(matches!(
            p.send_message(&alice, channel, CHECKSUM.into(), "blob".into(), Some(uuid), None)
                .await
                .unwrap_err(),
            ProtocolError::UuidConflict
        ));
    }

    #[tokio::test]
    async fn retention_cap_prunes_oldest() {
        let mut cfg = config();
        cfg.max_messages = 3;
        let p = ChannelProtocol::new(MemoryRepository::new(), RecordingGateway::new(), cfg);
        let alice: PeerAddress = "alice@a.example".parse().unwrap();
        let carol: PeerAddress = "carol@a.example".parse().unwrap();
        let channel = opened_channel(&p, &alice, &carol).await;

        let base = Utc::now();
        for i in 0..5i64 {
            p.send_message(
                &alice,
                channel,
                CHECKSUM.into(),
                format!("blob-{i}"),
                None,
                Some(base + chrono::Duration::milliseconds(i)),
            )
            .await
            .unwrap();
        }

        let pending = p.receive_messages(&carol, channel, false).await.unwrap();
        assert_eq!(pending.len(), 3);
        // The oldest two rows were pruned to make room.
        assert_eq!(
            pending.iter().map(|m| m.data.as_str()).collect::<Vec<_>>(),
            vec!["blob-2", "blob-3", "blob-4"]
        );
    }

    #[tokio::test]
    async fn external_recipient_is_relayed_with_same_ids() {
        let p = ChannelProtocol::new(MemoryRepository::new(), RecordingGateway::new(), config());
        let alice: PeerAddress = "alice@a.example".parse().unwrap();
        let bob: PeerAddress = "bob@b.example".parse().unwrap();

        // Channel initiated by external bob, accepted locally by alice.
        let channel = opened_channel(&p, &bob, &alice).await;
        p.gateway.clear();

        let uuid = p
            .send_message(&alice, channel, CHECKSUM.into(), "blob".into(), None, None)
            .await
            .unwrap();
        assert_eq!(p.gateway.calls(), vec![format!("message:{channel}:{uuid}")]);

        // Inbound mirrored sends are not relayed back out.
        p.gateway.clear();
        p.send_message(
            &bob,
            channel,
            CHECKSUM.into(),
            "blob".into(),
            Some(Uuid::new_v4()),
            Some(Utc::now()),
        )
        .await
        .unwrap();
        assert!(p.gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn mirrored_send_must_pin_uuid_and_timestamp() {
        let p = ChannelProtocol::new(MemoryRepository::new(), RecordingGateway::new(), config());
        let alice: PeerAddress = "alice@a.example".parse().unwrap();
        let bob: PeerAddress = "bob@b.example".parse().unwrap();
        let channel = opened_channel(&p, &bob, &alice).await;

        assert!(matches!(
            p.send_message(&bob, channel, CHECKSUM.into(), "blob".into(), None, Some(Utc::now()))
                .await
                .unwrap_err(),
            ProtocolError::MissingParameter { ref name } if name == "message_uuid"
        ));
        assert!(matches!(
            p.send_message(&bob, channel, CHECKSUM.into(), "blob".into(), Some(Uuid::new_v4()), None)
                .await
                .unwrap_err(),
            ProtocolError::MissingParameter { ref name } if name == "timestamp"
        ));

        // A local sender still gets both generated.
        p.send_message(&alice, channel, CHECKSUM.into(), "blob".into(), None, None)
            .await
            .unwrap();
    }
}
