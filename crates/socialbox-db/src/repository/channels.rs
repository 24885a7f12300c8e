//! Encryption channel and message queue storage.
//!
//! State transitions are single `UPDATE … WHERE state = …` statements so the
//! check of the prior state and the write are atomic: two concurrent accepts
//! on the same channel yield exactly one affected row.

use socialbox_common::models::{
    ChannelMessage, EncryptionChannel, MessageRecipient, ReceiverKeys,
};
use socialbox_common::{PeerAddress, ProtocolError};
use socialbox_protocol::ChannelRepository;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::{storage_error, DbResult};

#[derive(Clone)]
pub struct ChannelStore {
    pool: PgPool,
}

impl ChannelStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn map_channel(row: &PgRow) -> DbResult<EncryptionChannel> {
    let calling_peer: String = row.try_get("calling_peer").map_err(storage_error)?;
    let receiving_peer: String = row.try_get("receiving_peer").map_err(storage_error)?;
    let state: String = row.try_get("state").map_err(storage_error)?;

    let receiving_signature_uuid: Option<Uuid> =
        row.try_get("receiving_signature_uuid").map_err(storage_error)?;
    let receiver = match receiving_signature_uuid {
        Some(signature_uuid) => Some(ReceiverKeys {
            signature_uuid,
            public_signing_key: row
                .try_get("receiving_public_signing_key")
                .map_err(storage_error)?,
            public_encryption_key: row
                .try_get("receiving_public_encryption_key")
                .map_err(storage_error)?,
            transport_encryption_key: row
                .try_get("transport_encryption_key")
                .map_err(storage_error)?,
        }),
        None => None,
    };

    Ok(EncryptionChannel {
        uuid: row.try_get("uuid").map_err(storage_error)?,
        calling_peer: calling_peer.parse::<PeerAddress>()?,
        receiving_peer: receiving_peer.parse::<PeerAddress>()?,
        calling_signature_uuid: row.try_get("calling_signature_uuid").map_err(storage_error)?,
        calling_public_signing_key: row
            .try_get("calling_public_signing_key")
            .map_err(storage_error)?,
        calling_public_encryption_key: row
            .try_get("calling_public_encryption_key")
            .map_err(storage_error)?,
        transport_algorithm: row.try_get("transport_algorithm").map_err(storage_error)?,
        receiver,
        state: state.parse()?,
        created_at: row.try_get("created_at").map_err(storage_error)?,
    })
}

fn map_message(row: &PgRow) -> DbResult<ChannelMessage> {
    let recipient: String = row.try_get("recipient").map_err(storage_error)?;
    Ok(ChannelMessage {
        uuid: row.try_get("uuid").map_err(storage_error)?,
        channel_uuid: row.try_get("channel_uuid").map_err(storage_error)?,
        recipient: recipient.parse()?,
        checksum: row.try_get("checksum").map_err(storage_error)?,
        data: row.try_get("data").map_err(storage_error)?,
        acknowledged: row.try_get("acknowledged").map_err(storage_error)?,
        timestamp: row.try_get("timestamp").map_err(storage_error)?,
    })
}

impl ChannelRepository for ChannelStore {
    async fn insert_channel(&self, channel: &EncryptionChannel) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO encryption_channels (
                uuid, calling_peer, receiving_peer, calling_signature_uuid,
                calling_public_signing_key, calling_public_encryption_key,
                transport_algorithm, state, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(channel.uuid)
        .bind(channel.calling_peer.to_string())
        .bind(channel.receiving_peer.to_string())
        .bind(channel.calling_signature_uuid)
        .bind(&channel.calling_public_signing_key)
        .bind(&channel.calling_public_encryption_key)
        .bind(&channel.transport_algorithm)
        .bind(channel.state.as_str())
        .bind(channel.created_at)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;
        Ok(())
    }

    async fn get_channel(&self, uuid: Uuid) -> DbResult<Option<EncryptionChannel>> {
        let row = sqlx::query("SELECT * FROM encryption_channels WHERE uuid = $1")
            .bind(uuid)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?;
        row.as_ref().map(map_channel).transpose()
    }

    async fn channel_exists(&self, uuid: Uuid) -> DbResult<bool> {
        let row = sqlx::query("SELECT EXISTS (SELECT 1 FROM encryption_channels WHERE uuid = $1)")
            .bind(uuid)
            .fetch_one(&self.pool)
            .await
            .map_err(storage_error)?;
        row.try_get(0).map_err(storage_error)
    }

    async fn accept_channel(&self, uuid: Uuid, keys: &ReceiverKeys) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE encryption_channels SET
                receiving_signature_uuid = $2,
                receiving_public_signing_key = $3,
                receiving_public_encryption_key = $4,
                transport_encryption_key = $5,
                state = 'OPENED'
            WHERE uuid = $1 AND state = 'AWAITING_RECEIVER'
            "#,
        )
        .bind(uuid)
        .bind(keys.signature_uuid)
        .bind(&keys.public_signing_key)
        .bind(&keys.public_encryption_key)
        .bind(&keys.transport_encryption_key)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;
        Ok(result.rows_affected() == 1)
    }

    async fn mark_declined(&self, uuid: Uuid) -> DbResult<bool> {
        let result = sqlx::query(
            "UPDATE encryption_channels SET state = 'DECLINED'
             WHERE uuid = $1 AND state = 'AWAITING_RECEIVER'",
        )
        .bind(uuid)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;
        Ok(result.rows_affected() == 1)
    }

    async fn mark_closed(&self, uuid: Uuid) -> DbResult<bool> {
        let mut tx = self.pool.begin().await.map_err(storage_error)?;
        let result = sqlx::query(
            "UPDATE encryption_channels SET state = 'CLOSED'
             WHERE uuid = $1 AND state <> 'CLOSED'",
        )
        .bind(uuid)
        .execute(&mut *tx)
        .await
        .map_err(storage_error)?;
        if result.rows_affected() == 1 {
            sqlx::query("DELETE FROM encryption_channel_messages WHERE channel_uuid = $1")
                .bind(uuid)
                .execute(&mut *tx)
                .await
                .map_err(storage_error)?;
        }
        tx.commit().await.map_err(storage_error)?;
        Ok(result.rows_affected() == 1)
    }

    async fn list_channels(
        &self,
        peer: &PeerAddress,
        page: u32,
        limit: u32,
    ) -> DbResult<Vec<EncryptionChannel>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM encryption_channels
            WHERE calling_peer = $1 OR receiving_peer = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(peer.to_string())
        .bind(i64::from(limit))
        .bind(i64::from((page - 1) * limit))
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;
        rows.iter().map(map_channel).collect()
    }

    async fn list_channel_requests(
        &self,
        peer: &PeerAddress,
        page: u32,
        limit: u32,
    ) -> DbResult<Vec<EncryptionChannel>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM encryption_channels
            WHERE receiving_peer = $1 AND state = 'AWAITING_RECEIVER'
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(peer.to_string())
        .bind(i64::from(limit))
        .bind(i64::from((page - 1) * limit))
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;
        rows.iter().map(map_channel).collect()
    }

    async fn append_message(&self, message: &ChannelMessage) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO encryption_channel_messages (
                uuid, channel_uuid, recipient, checksum, data, acknowledged, timestamp
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(message.uuid)
        .bind(message.channel_uuid)
        .bind(message.recipient.as_str())
        .bind(&message.checksum)
        .bind(&message.data)
        .bind(message.acknowledged)
        .bind(message.timestamp)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;
        Ok(())
    }

    async fn message_exists(&self, channel_uuid: Uuid, message_uuid: Uuid) -> DbResult<bool> {
        let row = sqlx::query(
            "SELECT EXISTS (
                SELECT 1 FROM encryption_channel_messages
                WHERE channel_uuid = $1 AND uuid = $2
            )",
        )
        .bind(channel_uuid)
        .bind(message_uuid)
        .fetch_one(&self.pool)
        .await
        .map_err(storage_error)?;
        row.try_get(0).map_err(storage_error)
    }

    async fn message_count(&self, channel_uuid: Uuid) -> DbResult<u64> {
        let row = sqlx::query(
            "SELECT COUNT(*) FROM encryption_channel_messages WHERE channel_uuid = $1",
        )
        .bind(channel_uuid)
        .fetch_one(&self.pool)
        .await
        .map_err(storage_error)?;
        let count: i64 = row.try_get(0).map_err(storage_error)?;
        Ok(count as u64)
    }

    async fn prune_oldest_messages(&self, channel_uuid: Uuid, excess: u64) -> DbResult<()> {
        sqlx::query(
            r#"
            DELETE FROM encryption_channel_messages
            WHERE channel_uuid = $1 AND uuid IN (
                SELECT uuid FROM encryption_channel_messages
                WHERE channel_uuid = $1
                ORDER BY timestamp ASC
                LIMIT $2
            )
            "#,
        )
        .bind(channel_uuid)
        .bind(i64::try_from(excess).map_err(|e| ProtocolError::Internal(e.into()))?)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;
        Ok(())
    }

    async fn unacknowledged_messages(
        &self,
        channel_uuid: Uuid,
        recipient: MessageRecipient,
    ) -> DbResult<Vec<ChannelMessage>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM encryption_channel_messages
            WHERE channel_uuid = $1 AND recipient = $2 AND NOT acknowledged
            ORDER BY timestamp ASC
            "#,
        )
        .bind(channel_uuid)
        .bind(recipient.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;
        rows.iter().map(map_message).collect()
    }

    async fn acknowledge_messages(
        &self,
        channel_uuid: Uuid,
        message_uuids: &[Uuid],
    ) -> DbResult<()> {
        sqlx::query(
            "UPDATE encryption_channel_messages SET acknowledged = TRUE
             WHERE channel_uuid = $1 AND uuid = ANY($2)",
        )
        .bind(channel_uuid)
        .bind(message_uuids)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;
        Ok(())
    }
}
