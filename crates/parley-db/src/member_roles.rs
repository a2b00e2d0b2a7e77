use crate::{DbError, DbPool};

pub async fn assign_role(
    pool: &DbPool,
    user_id: i64,
    server_id: i64,
    role_id: i64,
) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO member_roles (user_id, server_id, role_id) VALUES (?1, ?2, ?3) \
         ON CONFLICT (user_id, server_id, role_id) DO NOTHING",
    )
    .bind(user_id)
    .bind(server_id)
    .bind(role_id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn unassign_role(
    pool: &DbPool,
    user_id: i64,
    server_id: i64,
    role_id: i64,
) -> Result<(), DbError> {
    sqlx::query(
        "DELETE FROM member_roles WHERE user_id = ?1 AND server_id = ?2 AND role_id = ?3",
    )
    .bind(user_id)
    .bind(server_id)
    .bind(role_id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn has_any_role(pool: &DbPool, user_id: i64, server_id: i64) -> Result<bool, DbError> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM member_roles WHERE user_id = ?1 AND server_id = ?2",
    )
    .bind(user_id)
    .bind(server_id)
    .fetch_one(pool)
    .await?;
    Ok(count > 0)
}
