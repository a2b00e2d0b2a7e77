use thiserror::Error;

/// Closed error taxonomy consumed by `parley-ws` and `parley-api` (§7).
/// Both crates map these onto the stable `ErrorCode` wire strings — this
/// type never leaks its `Display` text to a client directly.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("not found")]
    NotFound,
    #[error("forbidden")]
    Forbidden,
    #[error("missing permission")]
    MissingPermission,
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("database error: {0}")]
    Database(#[from] parley_db::DbError),
    #[error("internal error: {0}")]
    Internal(String),
}
