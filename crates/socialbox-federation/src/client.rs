//! The outbound federation RPC client.

use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use socialbox_common::models::{ChannelMessage, EncryptionChannel, MessageRecipient, ReceiverKeys};
use socialbox_common::rpc::{headers, methods, params, RpcCall, RpcResponse, PROTOCOL_VERSION};
use socialbox_common::{PeerAddress, ProtocolError, ProtocolResult};
use socialbox_crypto::hash::sha512_hex;
use socialbox_crypto::temporal::temporal_sign;
use socialbox_crypto::SigningKeyPair;
use socialbox_protocol::FederationGateway;
use socialbox_resolver::{PeerResolver, RecordCache, TxtLookup};
use tracing::debug;
use url::Url;
use uuid::Uuid;

use crate::error::RpcError;

/// Outbound RPC caller for channel operations on remote servers.
///
/// Performs exactly one attempt per call with a finite timeout; a timeout is
/// a federation failure surfaced to the protocol, never retried here.
pub struct RpcClient<L, C> {
    http: reqwest::Client,
    resolver: PeerResolver<L, C>,
    signing: SigningKeyPair,
    client_name: String,
    local_domain: String,
}

impl<L: TxtLookup, C: RecordCache> RpcClient<L, C> {
    pub fn new(
        resolver: PeerResolver<L, C>,
        signing: SigningKeyPair,
        client_name: String,
        local_domain: String,
        request_timeout_secs: u64,
    ) -> Result<Self, RpcError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(request_timeout_secs))
            .build()
            .map_err(|e| RpcError::Transport {
                endpoint: String::new(),
                message: format!("failed to build http client: {e}"),
            })?;
        Ok(Self { http, resolver, signing, client_name, local_domain })
    }

    /// POST one call to an endpoint. Maps HTTP 204 to `None`, any other 2xx
    /// to the parsed response, and everything else to an error carrying the
    /// raw body when present.
    pub async fn send_request(
        &self,
        endpoint: &Url,
        call: &RpcCall,
        identify_as: Option<&PeerAddress>,
    ) -> Result<Option<RpcResponse>, RpcError> {
        let body = serde_json::to_vec(call).map_err(|e| RpcError::Decode(e.to_string()))?;
        let response = self.post(endpoint, body, identify_as).await?;

        if response.status() == reqwest::StatusCode::NO_CONTENT {
            return Ok(None);
        }
        if response.status().is_success() {
            let parsed: RpcResponse = response
                .json()
                .await
                .map_err(|e| RpcError::Decode(e.to_string()))?;
            return Ok(Some(parsed));
        }

        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(RpcError::Status { status, body })
    }

    /// Batch form: POST a JSON array of calls, expect an array of responses.
    pub async fn send_requests(
        &self,
        endpoint: &Url,
        calls: &[RpcCall],
        identify_as: Option<&PeerAddress>,
    ) -> Result<Vec<RpcResponse>, RpcError> {
        let body = serde_json::to_vec(calls).map_err(|e| RpcError::Decode(e.to_string()))?;
        let response = self.post(endpoint, body, identify_as).await?;

        if response.status() == reqwest::StatusCode::NO_CONTENT {
            return Ok(Vec::new());
        }
        if response.status().is_success() {
            return response
                .json()
                .await
                .map_err(|e| RpcError::Decode(e.to_string()));
        }

        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(RpcError::Status { status, body })
    }

    async fn post(
        &self,
        endpoint: &Url,
        body: Vec<u8>,
        identify_as: Option<&PeerAddress>,
    ) -> Result<reqwest::Response, RpcError> {
        // The signature covers the body's SHA-512 hash, bound to the current
        // time window.
        let signature = temporal_sign(&self.signing, sha512_hex(&body).as_bytes());

        let mut request = self
            .http
            .post(endpoint.clone())
            .header(CONTENT_TYPE, "application/json")
            .header(headers::CLIENT_NAME, &self.client_name)
            .header(headers::CLIENT_VERSION, PROTOCOL_VERSION)
            .header(headers::SIGNATURE, signature)
            .body(body);
        if let Some(peer) = identify_as {
            request = request.header(headers::IDENTIFY_AS, peer.to_string());
        }

        request.send().await.map_err(|e| RpcError::Transport {
            endpoint: endpoint.to_string(),
            message: e.to_string(),
        })
    }

    /// Resolve a domain, perform one call, and unwrap the RPC envelope.
    async fn call_domain(
        &self,
        domain: &str,
        call: RpcCall,
        identify_as: &PeerAddress,
    ) -> ProtocolResult<serde_json::Value> {
        let server = self.resolver.resolve(domain).await.map_err(ProtocolError::from)?;
        debug!(domain, method = %call.method, "mirroring channel operation");

        let response = self
            .send_request(&server.rpc_endpoint, &call, Some(identify_as))
            .await
            .map_err(ProtocolError::from)?
            .ok_or_else(|| ProtocolError::from(RpcError::MissingResult))?;

        if let Some(error) = response.error {
            return Err(RpcError::Remote { code: error.code, message: error.message }.into());
        }
        Ok(response.result.unwrap_or(serde_json::Value::Null))
    }

    /// The channel participant homed on this server.
    fn local_participant<'a>(
        &self,
        channel: &'a EncryptionChannel,
    ) -> ProtocolResult<&'a PeerAddress> {
        if !channel.calling_peer.is_external(&self.local_domain) {
            Ok(&channel.calling_peer)
        } else if !channel.receiving_peer.is_external(&self.local_domain) {
            Ok(&channel.receiving_peer)
        } else {
            Err(ProtocolError::Federation {
                message: "channel has no participant on this server".into(),
            })
        }
    }

    fn remote_domain<'a>(&self, channel: &'a EncryptionChannel) -> ProtocolResult<&'a str> {
        channel
            .external_counterpart(&self.local_domain)
            .map(|peer| peer.domain())
            .ok_or_else(|| ProtocolError::Federation {
                message: "channel has no external participant to mirror to".into(),
            })
    }
}

impl<L: TxtLookup, C: RecordCache> FederationGateway for RpcClient<L, C> {
    async fn mirror_create(&self, channel: &EncryptionChannel) -> ProtocolResult<Uuid> {
        let call = RpcCall::new(
            methods::ENCRYPTION_CREATE_CHANNEL,
            serde_json::to_value(params::CreateChannelParams {
                receiving_peer: channel.receiving_peer.to_string(),
                signature_uuid: channel.calling_signature_uuid,
                public_signing_key: channel.calling_public_signing_key.clone(),
                public_encryption_key: channel.calling_public_encryption_key.clone(),
                transport_algorithm: channel.transport_algorithm.clone(),
                channel_uuid: Some(channel.uuid),
            })
            .map_err(|e| ProtocolError::Internal(e.into()))?,
        );

        let result = self
            .call_domain(self.remote_domain(channel)?, call, &channel.calling_peer)
            .await?;
        let remote_uuid = result
            .get("channel_uuid")
            .and_then(|v| v.as_str())
            .and_then(|s| Uuid::parse_str(s).ok())
            .ok_or_else(|| ProtocolError::Federation {
                message: "remote create response carried no channel uuid".into(),
            })?;
        Ok(remote_uuid)
    }

    async fn mirror_accept(
        &self,
        channel: &EncryptionChannel,
        keys: &ReceiverKeys,
    ) -> ProtocolResult<()> {
        let call = RpcCall::new(
            methods::ENCRYPTION_ACCEPT_CHANNEL,
            serde_json::to_value(params::AcceptChannelParams {
                channel_uuid: channel.uuid,
                signature_uuid: keys.signature_uuid,
                public_signing_key: keys.public_signing_key.clone(),
                public_encryption_key: keys.public_encryption_key.clone(),
                transport_encryption_key: keys.transport_encryption_key.clone(),
            })
            .map_err(|e| ProtocolError::Internal(e.into()))?,
        );

        self.call_domain(self.remote_domain(channel)?, call, &channel.receiving_peer)
            .await?;
        Ok(())
    }

    async fn mirror_decline(&self, channel: &EncryptionChannel) -> ProtocolResult<()> {
        let call = RpcCall::new(
            methods::ENCRYPTION_DECLINE_CHANNEL,
            serde_json::to_value(params::ChannelUuidParams { channel_uuid: channel.uuid })
                .map_err(|e| ProtocolError::Internal(e.into()))?,
        );

        self.call_domain(self.remote_domain(channel)?, call, self.local_participant(channel)?)
            .await?;
        Ok(())
    }

    async fn mirror_close(&self, channel: &EncryptionChannel) -> ProtocolResult<()> {
        let call = RpcCall::new(
            methods::ENCRYPTION_DELETE_CHANNEL,
            serde_json::to_value(params::ChannelUuidParams { channel_uuid: channel.uuid })
                .map_err(|e| ProtocolError::Internal(e.into()))?,
        );

        self.call_domain(self.remote_domain(channel)?, call, self.local_participant(channel)?)
            .await?;
        Ok(())
    }

    async fn mirror_message(
        &self,
        channel: &EncryptionChannel,
        message: &ChannelMessage,
    ) -> ProtocolResult<()> {
        // The sender is the participant opposite the addressed side.
        let sender = match message.recipient {
            MessageRecipient::Sender => &channel.receiving_peer,
            MessageRecipient::Receiver => &channel.calling_peer,
        };
        let call = RpcCall::new(
            methods::ENCRYPTION_CHANNEL_SEND,
            serde_json::to_value(params::ChannelSendParams {
                channel_uuid: channel.uuid,
                checksum: message.checksum.clone(),
                data: message.data.clone(),
                message_uuid: Some(message.uuid),
                timestamp: Some(message.timestamp),
            })
            .map_err(|e| ProtocolError::Internal(e.into()))?,
        );

        self.call_domain(self.remote_domain(channel)?, call, sender).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use socialbox_crypto::temporal::verify_temporal;

    use super::*;

    #[test]
    fn body_signature_verifies_against_published_key() {
        let signing = SigningKeyPair::generate();
        let call = RpcCall::new(
            methods::ENCRYPTION_DECLINE_CHANNEL,
            serde_json::json!({"channel_uuid": Uuid::new_v4()}),
        );
        let body = serde_json::to_vec(&call).unwrap();

        let signature = temporal_sign(&signing, sha512_hex(&body).as_bytes());
        assert!(verify_temporal(
            sha512_hex(&body).as_bytes(),
            &signature,
            &signing.public_key(),
            1
        )
        .unwrap());
    }

    #[test]
    fn create_params_pin_the_channel_uuid() {
        let uuid = Uuid::new_v4();
        let value = serde_json::to_value(params::CreateChannelParams {
            receiving_peer: "bob@b.example".into(),
            signature_uuid: Uuid::new_v4(),
            public_signing_key: "sig:AAAA".into(),
            public_encryption_key: "enc:BBBB".into(),
            transport_algorithm: "xchacha20".into(),
            channel_uuid: Some(uuid),
        })
        .unwrap();
        assert_eq!(value["channel_uuid"], serde_json::json!(uuid));

        let decoded: params::CreateChannelParams = serde_json::from_value(value).unwrap();
        assert_eq!(decoded.channel_uuid, Some(uuid));
    }
}
