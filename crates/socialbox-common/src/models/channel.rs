//! Encryption channel model — the central aggregate.
//!
//! A channel is a negotiated end-to-end encryption context between exactly
//! two peers, possibly homed on different servers. A federated channel is
//! persisted independently on each participating server; there is no
//! distributed transaction, consistency is maintained by the protocol's
//! mirror-then-commit discipline.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::address::PeerAddress;
use crate::error::ProtocolError;

/// Lifecycle state of an encryption channel.
///
/// Transitions are monotonic:
/// `AWAITING_RECEIVER → {OPENED → CLOSED | DECLINED | ERROR}`.
/// Unknown persisted values fail closed — they decode to an error, never to
/// a mid-lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChannelState {
    /// Created by the caller; waiting for the receiver to accept or decline.
    AwaitingReceiver,
    /// Accepted by the receiver; messages may flow.
    Opened,
    /// Declined by the receiver, or force-declined by a server after a
    /// federation failure. Terminal.
    Declined,
    /// Deleted/closed by a participant. Terminal.
    Closed,
    /// Unrecoverable protocol error. Terminal.
    Error,
}

impl ChannelState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Declined | Self::Closed | Self::Error)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::AwaitingReceiver => "AWAITING_RECEIVER",
            Self::Opened => "OPENED",
            Self::Declined => "DECLINED",
            Self::Closed => "CLOSED",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChannelState {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AWAITING_RECEIVER" => Ok(Self::AwaitingReceiver),
            "OPENED" => Ok(Self::Opened),
            "DECLINED" => Ok(Self::Declined),
            "CLOSED" => Ok(Self::Closed),
            "ERROR" => Ok(Self::Error),
            other => Err(ProtocolError::Internal(anyhow::anyhow!(
                "unknown persisted channel state '{other}'"
            ))),
        }
    }
}

/// Which side of the channel a queued message is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageRecipient {
    /// The channel's calling peer should read this.
    Sender,
    /// The channel's receiving peer should read this.
    Receiver,
}

impl MessageRecipient {
    /// The opposite side.
    pub fn reverse(self) -> Self {
        match self {
            Self::Sender => Self::Receiver,
            Self::Receiver => Self::Sender,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sender => "SENDER",
            Self::Receiver => "RECEIVER",
        }
    }
}

impl fmt::Display for MessageRecipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageRecipient {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SENDER" => Ok(Self::Sender),
            "RECEIVER" => Ok(Self::Receiver),
            other => Err(ProtocolError::Validation {
                message: format!("'{other}' is not a valid message recipient"),
            }),
        }
    }
}

/// Key material and signature reference supplied by the accepting side.
///
/// The `receiving_*` channel columns are all-null or all-set together; this
/// struct makes the "all-set" shape unrepresentable halfway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiverKeys {
    pub signature_uuid: Uuid,
    pub public_signing_key: String,
    pub public_encryption_key: String,
    /// Transport key set by the accepting side, encrypted to the caller.
    pub transport_encryption_key: String,
}

/// A negotiated end-to-end encryption context between two peers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptionChannel {
    pub uuid: Uuid,
    pub calling_peer: PeerAddress,
    pub receiving_peer: PeerAddress,
    pub calling_signature_uuid: Uuid,
    pub calling_public_signing_key: String,
    pub calling_public_encryption_key: String,
    /// Negotiated symmetric algorithm for the transported payloads.
    pub transport_algorithm: String,
    /// Set exactly once, on accept.
    pub receiver: Option<ReceiverKeys>,
    pub state: ChannelState,
    pub created_at: DateTime<Utc>,
}

impl EncryptionChannel {
    /// A caller is a participant iff their address equals one of the two
    /// channel peers exactly. No transitive trust.
    pub fn is_participant(&self, peer: &PeerAddress) -> bool {
        &self.calling_peer == peer || &self.receiving_peer == peer
    }

    /// The single place that decides message direction: a message sent by
    /// `sender` is addressed to the *other* side of the channel.
    ///
    /// Returns `None` when `sender` is not a participant.
    pub fn determine_recipient(&self, sender: &PeerAddress) -> Option<MessageRecipient> {
        if sender == &self.calling_peer {
            Some(MessageRecipient::Receiver)
        } else if sender == &self.receiving_peer {
            Some(MessageRecipient::Sender)
        } else {
            None
        }
    }

    /// The side of the channel a given participant reads from.
    pub fn side_of(&self, peer: &PeerAddress) -> Option<MessageRecipient> {
        self.determine_recipient(peer).map(MessageRecipient::reverse)
    }

    /// The participant homed on a different server than `local_domain`,
    /// if any. A federated channel has exactly one.
    pub fn external_counterpart(&self, local_domain: &str) -> Option<&PeerAddress> {
        if self.calling_peer.is_external(local_domain) {
            Some(&self.calling_peer)
        } else if self.receiving_peer.is_external(local_domain) {
            Some(&self.receiving_peer)
        } else {
            None
        }
    }
}

/// An opaque ciphertext blob queued on a channel.
///
/// Append-only: acknowledgement is the only mutation, a message is never
/// rewritten. The server never inspects or decrypts `data`; `checksum` is
/// caller-supplied and caller-verified.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelMessage {
    pub uuid: Uuid,
    pub channel_uuid: Uuid,
    /// Which side of the channel should read this message.
    pub recipient: MessageRecipient,
    /// SHA-512 hex checksum of the plaintext, computed by the sender.
    pub checksum: String,
    /// The encrypted payload, stored byte-exact.
    pub data: String,
    pub acknowledged: bool,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(caller: &str, receiver: &str) -> EncryptionChannel {
        EncryptionChannel {
            uuid: Uuid::new_v4(),
            calling_peer: caller.parse().unwrap(),
            receiving_peer: receiver.parse().unwrap(),
            calling_signature_uuid: Uuid::new_v4(),
            calling_public_signing_key: "sig:AAAA".into(),
            calling_public_encryption_key: "enc:BBBB".into(),
            transport_algorithm: "xchacha20".into(),
            receiver: None,
            state: ChannelState::AwaitingReceiver,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn recipient_is_always_the_other_side() {
        let ch = channel("alice@a.example", "bob@b.example");
        let alice = ch.calling_peer.clone();
        let bob = ch.receiving_peer.clone();

        assert_eq!(ch.determine_recipient(&alice), Some(MessageRecipient::Receiver));
        assert_eq!(ch.determine_recipient(&bob), Some(MessageRecipient::Sender));
        assert_eq!(ch.determine_recipient(&"eve@c.example".parse().unwrap()), None);

        // A participant reads the opposite of what they address.
        assert_eq!(ch.side_of(&alice), Some(MessageRecipient::Sender));
        assert_eq!(ch.side_of(&bob), Some(MessageRecipient::Receiver));
    }

    #[test]
    fn exactly_one_external_counterpart() {
        let ch = channel("alice@a.example", "bob@b.example");
        assert_eq!(
            ch.external_counterpart("a.example").map(ToString::to_string),
            Some("bob@b.example".to_owned())
        );
        assert_eq!(
            ch.external_counterpart("b.example").map(ToString::to_string),
            Some("alice@a.example".to_owned())
        );

        let local = channel("alice@a.example", "carol@a.example");
        assert!(local.external_counterpart("a.example").is_none());
    }

    #[test]
    fn unknown_state_fails_closed() {
        assert!("AWAITING_RECEIVER".parse::<ChannelState>().is_ok());
        assert!("SERVER_REJECTED".parse::<ChannelState>().is_err());
        assert!("".parse::<ChannelState>().is_err());
    }

    #[test]
    fn terminal_states() {
        assert!(!ChannelState::AwaitingReceiver.is_terminal());
        assert!(!ChannelState::Opened.is_terminal());
        assert!(ChannelState::Declined.is_terminal());
        assert!(ChannelState::Closed.is_terminal());
        assert!(ChannelState::Error.is_terminal());
    }
}
