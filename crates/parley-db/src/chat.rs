use crate::{DbError, DbPool};
use chrono::{DateTime, Utc};

/// Opaque chat history row (§6 persisted schema). The server never inspects
/// `ciphertext`/`iv` beyond storing and relaying them verbatim.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ChatMessageRow {
    pub id: i64,
    pub server_id: i64,
    pub channel_id: i64,
    pub user_id: i64,
    pub ciphertext: String,
    pub iv: String,
    pub key_epoch: i64,
    pub encoding: String,
    pub created_at: DateTime<Utc>,
}

#[allow(clippy::too_many_arguments)]
pub async fn insert_message(
    pool: &DbPool,
    id: i64,
    server_id: i64,
    channel_id: i64,
    user_id: i64,
    ciphertext: &str,
    iv: &str,
    key_epoch: i64,
    encoding: &str,
) -> Result<ChatMessageRow, DbError> {
    let row = sqlx::query_as::<_, ChatMessageRow>(
        "INSERT INTO chat_messages (id, server_id, channel_id, user_id, ciphertext, iv, key_epoch, encoding) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8) \
         RETURNING id, server_id, channel_id, user_id, ciphertext, iv, key_epoch, encoding, created_at",
    )
    .bind(id)
    .bind(server_id)
    .bind(channel_id)
    .bind(user_id)
    .bind(ciphertext)
    .bind(iv)
    .bind(key_epoch)
    .bind(encoding)
    .fetch_one(pool)
    .await?;
    Ok(row)
}
