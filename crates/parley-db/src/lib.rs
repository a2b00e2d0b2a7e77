pub mod bans;
pub mod channel_overrides;
pub mod channels;
pub mod chat;
pub mod invites;
pub mod member_roles;
pub mod members;
pub mod roles;
pub mod servers;
pub mod users;

use thiserror::Error;

pub type DbPool = sqlx::AnyPool;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("not found")]
    NotFound,
    #[error("value could not be decoded: {0}")]
    Decode(String),
}

/// Opens the (sqlite-backed) pool and runs embedded migrations. `db_path`
/// is a filesystem path (`§6` config key `dbPath`); `:memory:` is accepted
/// for tests.
///
/// A plain `sqlite::memory:` URL gives every pooled connection its own,
/// separate, unmigrated database, since SQLite's in-memory mode is scoped
/// to the physical connection rather than shared by URL. Rather than carry
/// a `file::memory:?cache=shared` URI (whose lifetime rules are their own
/// footgun — the shared database disappears the instant its last connection
/// closes), the `:memory:` path is pinned to exactly one pooled connection
/// so the whole pool is guaranteed to observe one database.
pub async fn create_pool(db_path: &str) -> Result<DbPool, sqlx::Error> {
    sqlx::any::install_default_drivers();
    let (url, max_connections) = if db_path == ":memory:" {
        ("sqlite::memory:".to_string(), 1)
    } else {
        (format!("sqlite://{db_path}?mode=rwc"), 8)
    };
    let pool = sqlx::any::AnyPoolOptions::new()
        .max_connections(max_connections)
        .connect(&url)
        .await?;
    Ok(pool)
}

pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
