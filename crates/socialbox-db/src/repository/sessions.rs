//! Client session storage.

use socialbox_common::models::Session;
use socialbox_common::PeerAddress;
use socialbox_protocol::SessionRepository;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::{storage_error, DbResult};

#[derive(Clone)]
pub struct SessionStore {
    pool: PgPool,
}

impl SessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn map_session(row: &PgRow) -> DbResult<Session> {
    let peer: Option<String> = row.try_get("peer").map_err(storage_error)?;
    let state: String = row.try_get("state").map_err(storage_error)?;
    Ok(Session {
        uuid: row.try_get("uuid").map_err(storage_error)?,
        bound_public_key: row.try_get("bound_public_key").map_err(storage_error)?,
        peer: peer.map(|p| p.parse::<PeerAddress>()).transpose()?,
        authenticated: row.try_get("authenticated").map_err(storage_error)?,
        state: state.parse()?,
        created_at: row.try_get("created_at").map_err(storage_error)?,
    })
}

impl SessionRepository for SessionStore {
    async fn insert_session(&self, session: &Session) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO sessions (uuid, bound_public_key, peer, authenticated, state, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(session.uuid)
        .bind(&session.bound_public_key)
        .bind(session.peer.as_ref().map(ToString::to_string))
        .bind(session.authenticated)
        .bind(session.state.as_str())
        .bind(session.created_at)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;
        Ok(())
    }

    async fn get_session(&self, uuid: Uuid) -> DbResult<Option<Session>> {
        let row = sqlx::query("SELECT * FROM sessions WHERE uuid = $1")
            .bind(uuid)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?;
        row.as_ref().map(map_session).transpose()
    }

    async fn authenticate_session(&self, uuid: Uuid, peer: &PeerAddress) -> DbResult<()> {
        sqlx::query(
            "UPDATE sessions SET peer = $2, authenticated = TRUE
             WHERE uuid = $1 AND state = 'ACTIVE'",
        )
        .bind(uuid)
        .bind(peer.to_string())
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;
        Ok(())
    }

    async fn close_session(&self, uuid: Uuid) -> DbResult<()> {
        sqlx::query("UPDATE sessions SET state = 'CLOSED' WHERE uuid = $1")
            .bind(uuid)
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;
        Ok(())
    }
}
