use thiserror::Error;
use uuid::Uuid;

/// Engine error taxonomy. `AlreadyBlocked` and `NotBlocked` are expected
/// state conflicts — callers match on them and normalize; only `Database`
/// represents an actual failure.
#[derive(Debug, Error)]
pub enum SecurityError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("user {user_id} already has an active block")]
    AlreadyBlocked { user_id: Uuid },

    #[error("user {user_id} has no active block")]
    NotBlocked { user_id: Uuid },
}
