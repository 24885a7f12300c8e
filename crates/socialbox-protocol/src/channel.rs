//! Channel lifecycle state machine.
//!
//! States and transitions:
//!
//! ```text
//! (none) --create--> AWAITING_RECEIVER
//! AWAITING_RECEIVER --accept--> OPENED
//! AWAITING_RECEIVER --decline--> DECLINED            [terminal]
//! AWAITING_RECEIVER --federation failure--> DECLINED [forced]
//! OPENED --delete--> CLOSED                          [terminal]
//! ```
//!
//! There is no distributed transaction between the two servers of a
//! federated channel. Consistency is a saga: commit locally, mirror the
//! operation to the counterpart, and on mirror failure apply a forward
//! compensating transition (force-decline) — never a rollback. A channel is
//! never left `AWAITING_RECEIVER` locally while the remote side conclusively
//! has no matching record.

use chrono::Utc;
use socialbox_common::models::{ChannelState, EncryptionChannel, ReceiverKeys};
use socialbox_common::validation::validate_page;
use socialbox_common::{PeerAddress, ProtocolError, ProtocolResult};
use socialbox_crypto::keys::{validate_public_encryption_key, validate_public_signing_key};
use socialbox_crypto::TransportAlgorithm;
use tracing::{info, warn};
use uuid::Uuid;

use crate::federation::FederationGateway;
use crate::repository::ChannelRepository;

/// Tunables for the protocol, lifted from server configuration.
#[derive(Debug, Clone)]
pub struct ProtocolConfig {
    /// The domain this server is authoritative for.
    pub local_domain: String,
    /// Per-channel message retention cap; oldest rows beyond it are pruned.
    pub max_messages: u64,
    /// Page-size cap for `get_channels`.
    pub channels_page_limit: u32,
    /// Page-size cap for `get_channel_requests`.
    pub channel_requests_page_limit: u32,
}

/// Parameters for channel creation.
#[derive(Debug, Clone)]
pub struct CreateChannelRequest {
    pub receiving_peer: PeerAddress,
    pub signature_uuid: Uuid,
    pub public_signing_key: String,
    pub public_encryption_key: String,
    pub transport_algorithm: String,
    /// Required when the caller is external: federation demands identical
    /// channel ids on both servers. Generated when absent.
    pub channel_uuid: Option<Uuid>,
}

/// The channel state machine and, via [`crate::relay`], the message relay.
pub struct ChannelProtocol<R, G> {
    pub(crate) repo: R,
    pub(crate) gateway: G,
    pub(crate) config: ProtocolConfig,
}

impl<R: ChannelRepository, G: FederationGateway> ChannelProtocol<R, G> {
    pub fn new(repo: R, gateway: G, config: ProtocolConfig) -> Self {
        Self { repo, gateway, config }
    }

    /// Create a channel from `caller` to the request's receiving peer.
    ///
    /// When the receiving peer is external and the caller is local, the
    /// create is mirrored outward after local persistence; any mirror
    /// failure, including a uuid disagreement, force-declines the local
    /// channel.
    pub async fn create_channel(
        &self,
        caller: &PeerAddress,
        request: CreateChannelRequest,
    ) -> ProtocolResult<Uuid> {
        if caller == &request.receiving_peer {
            return Err(ProtocolError::Validation {
                message: "cannot open an encryption channel with yourself".into(),
            });
        }
        if !validate_public_signing_key(&request.public_signing_key) {
            return Err(ProtocolError::Validation {
                message: "invalid public signing key".into(),
            });
        }
        if !validate_public_encryption_key(&request.public_encryption_key) {
            return Err(ProtocolError::Validation {
                message: "invalid public encryption key".into(),
            });
        }
        let algorithm: TransportAlgorithm =
            request.transport_algorithm.parse().map_err(ProtocolError::from)?;

        let caller_is_external = caller.is_external(&self.config.local_domain);
        let receiver_is_external = request.receiving_peer.is_external(&self.config.local_domain);
        if caller_is_external && receiver_is_external {
            // This server only hosts channels it participates in; a channel
            // between two foreign domains belongs on one of their servers.
            return Err(ProtocolError::Validation {
                message: "neither participant is hosted on this server".into(),
            });
        }
        let uuid = match request.channel_uuid {
            Some(uuid) => uuid,
            None if caller_is_external => {
                // An external initiator must pin the id so both servers agree.
                return Err(ProtocolError::MissingParameter { name: "channel_uuid".into() });
            }
            None => Uuid::new_v4(),
        };
        if self.repo.channel_exists(uuid).await? {
            return Err(ProtocolError::UuidConflict);
        }

        let channel = EncryptionChannel {
            uuid,
            calling_peer: caller.clone(),
            receiving_peer: request.receiving_peer.clone(),
            calling_signature_uuid: request.signature_uuid,
            calling_public_signing_key: request.public_signing_key,
            calling_public_encryption_key: request.public_encryption_key,
            transport_algorithm: algorithm.to_string(),
            receiver: None,
            state: ChannelState::AwaitingReceiver,
            created_at: Utc::now(),
        };
        self.repo.insert_channel(&channel).await?;

        if receiver_is_external && !caller_is_external {
            match self.gateway.mirror_create(&channel).await {
                Ok(remote_uuid) if remote_uuid == uuid => {}
                Ok(remote_uuid) => {
                    self.force_decline(uuid).await;
                    warn!(channel = %uuid, %remote_uuid, "remote committed a different channel id");
                    return Err(ProtocolError::UuidMismatch);
                }
                Err(e) => {
                    self.force_decline(uuid).await;
                    return Err(ProtocolError::Federation {
                        message: format!("failed to mirror channel create: {e}"),
                    });
                }
            }
        }

        info!(channel = %uuid, caller = %caller, receiver = %channel.receiving_peer, "channel created");
        Ok(uuid)
    }

    /// Accept a channel as its receiving peer, supplying key material and
    /// the transport key (encrypted to the caller's encryption key).
    ///
    /// When the original initiator is external the acceptance is mirrored
    /// outward first; on mirror failure the channel is force-declined rather
    /// than left half-accepted.
    pub async fn accept_channel(
        &self,
        caller: &PeerAddress,
        channel_uuid: Uuid,
        keys: ReceiverKeys,
    ) -> ProtocolResult<()> {
        let channel = self.require_channel(channel_uuid).await?;
        if caller != &channel.receiving_peer {
            return Err(ProtocolError::Forbidden);
        }
        if channel.state != ChannelState::AwaitingReceiver {
            return Err(ProtocolError::StateConflict {
                message: format!("cannot accept a channel in state {}", channel.state),
            });
        }
        if !validate_public_signing_key(&keys.public_signing_key) {
            return Err(ProtocolError::Validation {
                message: "invalid public signing key".into(),
            });
        }
        if !validate_public_encryption_key(&keys.public_encryption_key) {
            return Err(ProtocolError::Validation {
                message: "invalid public encryption key".into(),
            });
        }
        if keys.transport_encryption_key.is_empty() {
            return Err(ProtocolError::Validation {
                message: "transport encryption key cannot be empty".into(),
            });
        }

        if channel.calling_peer.is_external(&self.config.local_domain)
            && !caller.is_external(&self.config.local_domain)
        {
            if let Err(e) = self.gateway.mirror_accept(&channel, &keys).await {
                self.force_decline(channel_uuid).await;
                return Err(ProtocolError::Federation {
                    message: format!("failed to mirror channel accept: {e}"),
                });
            }
        }

        if !self.repo.accept_channel(channel_uuid, &keys).await? {
            // Lost a race against a concurrent transition.
            return Err(ProtocolError::StateConflict {
                message: "channel is no longer awaiting its receiver".into(),
            });
        }
        info!(channel = %channel_uuid, receiver = %caller, "channel opened");
        Ok(())
    }

    /// Decline a channel.
    ///
    /// `as_server` marks a unilateral decline issued by this server (after a
    /// federation failure) and bypasses the participant check, since no
    /// valid receiver exists yet. Declining an already-declined channel is a
    /// no-op success.
    pub async fn decline_channel(
        &self,
        caller: &PeerAddress,
        channel_uuid: Uuid,
        as_server: bool,
    ) -> ProtocolResult<()> {
        let channel = self.require_channel(channel_uuid).await?;
        if !as_server && !channel.is_participant(caller) {
            return Err(ProtocolError::Forbidden);
        }
        match channel.state {
            ChannelState::Declined => return Ok(()),
            ChannelState::AwaitingReceiver => {}
            other => {
                return Err(ProtocolError::StateConflict {
                    message: format!("cannot decline a channel in state {other}"),
                });
            }
        }

        self.repo.mark_declined(channel_uuid).await?;
        info!(channel = %channel_uuid, as_server, "channel declined");

        if !as_server && !caller.is_external(&self.config.local_domain) {
            if let Some(_external) = channel.external_counterpart(&self.config.local_domain) {
                if let Err(e) = self.gateway.mirror_decline(&channel).await {
                    // Local state is already terminal; surface the divergence.
                    return Err(ProtocolError::Federation {
                        message: format!("declined locally but failed to notify remote: {e}"),
                    });
                }
            }
        }
        Ok(())
    }

    /// Delete (close) a channel, cascading deletion of its queued messages.
    /// Deleting an already-closed channel is a no-op success.
    pub async fn delete_channel(
        &self,
        caller: &PeerAddress,
        channel_uuid: Uuid,
    ) -> ProtocolResult<()> {
        let channel = self.require_channel(channel_uuid).await?;
        if !channel.is_participant(caller) {
            return Err(ProtocolError::Forbidden);
        }
        if channel.state == ChannelState::Closed {
            return Ok(());
        }

        self.repo.mark_closed(channel_uuid).await?;
        info!(channel = %channel_uuid, caller = %caller, "channel closed");

        if !caller.is_external(&self.config.local_domain) {
            if let Some(_external) = channel.external_counterpart(&self.config.local_domain) {
                if let Err(e) = self.gateway.mirror_close(&channel).await {
                    return Err(ProtocolError::Federation {
                        message: format!("closed locally but failed to notify remote: {e}"),
                    });
                }
            }
        }
        Ok(())
    }

    /// Fetch a channel. Distinguishes "doesn't exist" (not found) from "not
    /// yours" (forbidden).
    pub async fn get_channel(
        &self,
        caller: &PeerAddress,
        channel_uuid: Uuid,
    ) -> ProtocolResult<EncryptionChannel> {
        let channel = self.require_channel(channel_uuid).await?;
        if !channel.is_participant(caller) {
            return Err(ProtocolError::Forbidden);
        }
        Ok(channel)
    }

    /// Pure existence check.
    pub async fn channel_exists(&self, channel_uuid: Uuid) -> ProtocolResult<bool> {
        self.repo.channel_exists(channel_uuid).await
    }

    /// Channels the caller participates in, paginated.
    pub async fn get_channels(
        &self,
        caller: &PeerAddress,
        page: u32,
        limit: u32,
    ) -> ProtocolResult<Vec<EncryptionChannel>> {
        validate_page(page, limit, self.config.channels_page_limit)?;
        self.repo.list_channels(caller, page, limit).await
    }

    /// Incoming channel requests awaiting the caller's decision, paginated.
    pub async fn get_channel_requests(
        &self,
        caller: &PeerAddress,
        page: u32,
        limit: u32,
    ) -> ProtocolResult<Vec<EncryptionChannel>> {
        validate_page(page, limit, self.config.channel_requests_page_limit)?;
        self.repo.list_channel_requests(caller, page, limit).await
    }

    pub(crate) async fn require_channel(
        &self,
        channel_uuid: Uuid,
    ) -> ProtocolResult<EncryptionChannel> {
        self.repo
            .get_channel(channel_uuid)
            .await?
            .ok_or_else(|| ProtocolError::NotFound {
                resource: format!("encryption channel {channel_uuid}"),
            })
    }

    /// Forward compensating transition after a federation failure. Failure
    /// to record the decline is logged, not surfaced — the original error is
    /// the one the caller needs to see.
    async fn force_decline(&self, channel_uuid: Uuid) {
        if let Err(e) = self.repo.mark_declined(channel_uuid).await {
            warn!(channel = %channel_uuid, error = %e, "failed to force-decline channel");
        }
    }
}
