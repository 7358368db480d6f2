use aula_core::blocks::{BlockStatus, BlockType, UserBlock};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::SecurityError;

/// Authoritative block/unblock state per account. The write path enforces
/// the one-active-block-per-user invariant; rows are deactivated and kept
/// forever for audit.
#[derive(Clone)]
pub struct BlockLedger {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct UserBlockRow {
    id: i64,
    user_id: Uuid,
    blocked_by: Option<Uuid>,
    reason: String,
    block_type: String,
    ip_address: Option<String>,
    blocked_at: DateTime<Utc>,
    blocked_until: Option<DateTime<Utc>>,
    is_active: bool,
    unblocked_at: Option<DateTime<Utc>>,
    unblocked_by: Option<Uuid>,
    metadata: Option<Value>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<UserBlockRow> for UserBlock {
    fn from(row: UserBlockRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            blocked_by: row.blocked_by,
            reason: row.reason,
            block_type: BlockType::from_db_value(&row.block_type),
            ip_address: row.ip_address,
            blocked_at: row.blocked_at,
            blocked_until: row.blocked_until,
            is_active: row.is_active,
            unblocked_at: row.unblocked_at,
            unblocked_by: row.unblocked_by,
            metadata: row.metadata,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

impl BlockLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Current block state for an account. Expiry is reconciled lazily
    /// here: an active row whose `blocked_until` has lapsed is deactivated
    /// as a side effect of the read before the answer is computed, so
    /// every status check can write at most once per expiry.
    pub async fn is_blocked(&self, user_id: Uuid) -> Result<BlockStatus, SecurityError> {
        let Some(block) = self.active_block(user_id).await? else {
            return Ok(BlockStatus::clear());
        };

        let now = Utc::now();
        if block.is_currently_blocked_at(now) {
            return Ok(BlockStatus::from_block(&block, now));
        }

        self.expire(block.id).await?;
        Ok(BlockStatus::clear())
    }

    /// Issue a block. Rejects (does not merge) when an active, non-expired
    /// block already exists — callers that want to extend must unblock
    /// first. `duration_minutes = None` means permanent.
    #[allow(clippy::too_many_arguments)]
    pub async fn block(
        &self,
        user_id: Uuid,
        reason: &str,
        block_type: BlockType,
        duration_minutes: Option<i64>,
        blocked_by: Option<Uuid>,
        ip_address: Option<&str>,
        metadata: Option<Value>,
    ) -> Result<UserBlock, SecurityError> {
        if let Some(existing) = self.active_block(user_id).await? {
            if existing.is_currently_blocked() {
                return Err(SecurityError::AlreadyBlocked { user_id });
            }
            // Lapsed-but-active row found on the way in: reconcile it now
            // so the one-active-row invariant holds for the insert below.
            self.expire(existing.id).await?;
        }

        let blocked_at = Utc::now();
        let blocked_until =
            duration_minutes.map(|minutes| blocked_at + ChronoDuration::minutes(minutes));

        let row = sqlx::query_as::<_, UserBlockRow>(
            r#"
            INSERT INTO user_blocks
                (user_id, blocked_by, reason, block_type, ip_address,
                 blocked_at, blocked_until, is_active, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7, TRUE, $8)
            RETURNING id, user_id, blocked_by, reason, block_type, ip_address,
                      blocked_at, blocked_until, is_active, unblocked_at,
                      unblocked_by, metadata, created_at, updated_at
            "#,
        )
        .bind(user_id)
        .bind(blocked_by)
        .bind(reason)
        .bind(block_type.as_str())
        .bind(ip_address)
        .bind(blocked_at)
        .bind(blocked_until)
        .bind(metadata)
        .fetch_one(&self.pool)
        .await
        .map_err(|err| {
            // Unique violation on the active-block index: a concurrent
            // caller issued the block between our check and this insert.
            if let sqlx::Error::Database(ref db_err) = err
                && db_err.code().as_deref() == Some("23505")
            {
                return SecurityError::AlreadyBlocked { user_id };
            }
            SecurityError::Database(err)
        })?;

        Ok(UserBlock::from(row))
    }

    /// Lift the active block. The single conditional UPDATE makes
    /// concurrent unblocks race safely: exactly one caller wins, the rest
    /// get `NotBlocked`.
    pub async fn unblock(
        &self,
        user_id: Uuid,
        unblocked_by: Option<Uuid>,
    ) -> Result<UserBlock, SecurityError> {
        let row = sqlx::query_as::<_, UserBlockRow>(
            r#"
            UPDATE user_blocks
            SET is_active = FALSE,
                unblocked_at = NOW(),
                unblocked_by = $2,
                updated_at = NOW()
            WHERE user_id = $1 AND is_active = TRUE
            RETURNING id, user_id, blocked_by, reason, block_type, ip_address,
                      blocked_at, blocked_until, is_active, unblocked_at,
                      unblocked_by, metadata, created_at, updated_at
            "#,
        )
        .bind(user_id)
        .bind(unblocked_by)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(UserBlock::from(row)),
            None => Err(SecurityError::NotBlocked { user_id }),
        }
    }

    /// The active row for an account, if any, without expiry side effects.
    pub async fn active_block(&self, user_id: Uuid) -> Result<Option<UserBlock>, SecurityError> {
        let row = sqlx::query_as::<_, UserBlockRow>(
            r#"
            SELECT id, user_id, blocked_by, reason, block_type, ip_address,
                   blocked_at, blocked_until, is_active, unblocked_at,
                   unblocked_by, metadata, created_at, updated_at
            FROM user_blocks
            WHERE user_id = $1 AND is_active = TRUE
            ORDER BY blocked_at DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(UserBlock::from))
    }

    /// Full block history for an account, newest first. Rows are never
    /// deleted, so this is the audit trail.
    pub async fn history_for_user(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<UserBlock>, SecurityError> {
        let limit = limit.clamp(1, 200);
        let rows = sqlx::query_as::<_, UserBlockRow>(
            r#"
            SELECT id, user_id, blocked_by, reason, block_type, ip_address,
                   blocked_at, blocked_until, is_active, unblocked_at,
                   unblocked_by, metadata, created_at, updated_at
            FROM user_blocks
            WHERE user_id = $1
            ORDER BY blocked_at DESC, id DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(UserBlock::from).collect())
    }

    /// Deactivate a lapsed row. Guarded on `is_active` so concurrent
    /// readers reconciling the same expiry produce exactly one unblock
    /// write; losing the race is not an error.
    async fn expire(&self, block_id: i64) -> Result<(), SecurityError> {
        let result = sqlx::query(
            r#"
            UPDATE user_blocks
            SET is_active = FALSE,
                unblocked_at = NOW(),
                unblocked_by = NULL,
                updated_at = NOW()
            WHERE id = $1 AND is_active = TRUE
            "#,
        )
        .bind(block_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            tracing::debug!(block_id, "block already expired by a concurrent reader");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::UserBlockRow;
    use aula_core::blocks::{BlockType, UserBlock};
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    #[test]
    fn row_maps_expected_values() {
        let now = Utc::now();
        let user_id = Uuid::now_v7();
        let admin = Uuid::now_v7();
        let row = UserBlockRow {
            id: 42,
            user_id,
            blocked_by: Some(admin),
            reason: "policy violation".to_string(),
            block_type: "manual".to_string(),
            ip_address: Some("198.51.100.4".to_string()),
            blocked_at: now,
            blocked_until: Some(now + Duration::minutes(30)),
            is_active: true,
            unblocked_at: None,
            unblocked_by: None,
            metadata: None,
            created_at: now,
            updated_at: now,
        };
        let block = UserBlock::from(row);
        assert_eq!(block.block_type, BlockType::Manual);
        assert_eq!(block.blocked_by, Some(admin));
        assert!(block.is_currently_blocked_at(now));
        assert!(!block.is_currently_blocked_at(now + Duration::minutes(31)));
    }
}
