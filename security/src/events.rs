use aula_core::events::{NewSecurityEvent, SecurityEvent, SecurityEventSeverity, SecurityEventType};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::SecurityError;

/// Append-only log of security-relevant occurrences. This component owns
/// the `security_events` table exclusively; everything else reads it
/// through the query methods here and never mutates rows.
#[derive(Clone)]
pub struct EventLog {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct SecurityEventRow {
    id: Uuid,
    user_id: Option<Uuid>,
    event_type: String,
    severity: String,
    ip_address: Option<String>,
    user_agent: Option<String>,
    metadata: Option<Value>,
    created_at: DateTime<Utc>,
}

impl From<SecurityEventRow> for SecurityEvent {
    fn from(row: SecurityEventRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            event_type: SecurityEventType::from_db_value(&row.event_type),
            severity: SecurityEventSeverity::from_db_value(&row.severity),
            ip_address: row.ip_address,
            user_agent: row.user_agent,
            metadata: row.metadata,
            created_at: row.created_at,
        }
    }
}

/// Window bounds for trailing wall-clock queries: inclusive of the lower
/// boundary, exclusive of future-dated rows.
fn window_bounds(now: DateTime<Utc>, window_minutes: i64) -> (DateTime<Utc>, DateTime<Utc>) {
    (now - ChronoDuration::minutes(window_minutes.max(0)), now)
}

impl EventLog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn append(&self, event: NewSecurityEvent) -> Result<SecurityEvent, SecurityError> {
        let row = sqlx::query_as::<_, SecurityEventRow>(
            r#"
            INSERT INTO security_events (id, user_id, event_type, severity, ip_address, user_agent, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, user_id, event_type, severity, ip_address, user_agent, metadata, created_at
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(event.user_id)
        .bind(event.event_type.as_str())
        .bind(event.severity.as_str())
        .bind(&event.ip_address)
        .bind(&event.user_agent)
        .bind(&event.metadata)
        .fetch_one(&self.pool)
        .await?;

        Ok(SecurityEvent::from(row))
    }

    /// Events of one type for one user inside the trailing window.
    pub async fn count_by_type_in_window(
        &self,
        user_id: Uuid,
        event_type: SecurityEventType,
        window_minutes: i64,
    ) -> Result<i64, SecurityError> {
        let (from, to) = window_bounds(Utc::now(), window_minutes);
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM security_events
            WHERE user_id = $1
              AND event_type = $2
              AND created_at >= $3
              AND created_at <= $4
            "#,
        )
        .bind(user_id)
        .bind(event_type.as_str())
        .bind(from)
        .bind(to)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    /// Same window count keyed by source address — unauthenticated attempts
    /// carry no user id, so the IP is the only stable handle.
    pub async fn count_by_ip_in_window(
        &self,
        ip_address: &str,
        event_type: SecurityEventType,
        window_minutes: i64,
    ) -> Result<i64, SecurityError> {
        let (from, to) = window_bounds(Utc::now(), window_minutes);
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM security_events
            WHERE ip_address = $1
              AND event_type = $2
              AND created_at >= $3
              AND created_at <= $4
            "#,
        )
        .bind(ip_address)
        .bind(event_type.as_str())
        .bind(from)
        .bind(to)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    /// Distinct source addresses attributable to one account inside the
    /// trailing window.
    pub async fn distinct_ip_count_in_window(
        &self,
        user_id: Uuid,
        window_minutes: i64,
    ) -> Result<i64, SecurityError> {
        let (from, to) = window_bounds(Utc::now(), window_minutes);
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(DISTINCT ip_address)
            FROM security_events
            WHERE user_id = $1
              AND ip_address IS NOT NULL
              AND created_at >= $2
              AND created_at <= $3
            "#,
        )
        .bind(user_id)
        .bind(from)
        .bind(to)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    /// Recent events for one user, newest first — audit view support.
    pub async fn recent_for_user(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<SecurityEvent>, SecurityError> {
        let limit = limit.clamp(1, 500);
        let rows = sqlx::query_as::<_, SecurityEventRow>(
            r#"
            SELECT id, user_id, event_type, severity, ip_address, user_agent, metadata, created_at
            FROM security_events
            WHERE user_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(SecurityEvent::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::{SecurityEventRow, window_bounds};
    use aula_core::events::{SecurityEvent, SecurityEventSeverity, SecurityEventType};
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    #[test]
    fn window_bounds_span_the_trailing_minutes() {
        let now = Utc::now();
        let (from, to) = window_bounds(now, 10);
        assert_eq!(to, now);
        assert_eq!(now - from, Duration::minutes(10));
    }

    #[test]
    fn negative_window_collapses_to_now() {
        let now = Utc::now();
        let (from, to) = window_bounds(now, -5);
        assert_eq!(from, to);
    }

    #[test]
    fn row_maps_enums_from_db_text() {
        let now = Utc::now();
        let user_id = Uuid::now_v7();
        let row = SecurityEventRow {
            id: Uuid::now_v7(),
            user_id: Some(user_id),
            event_type: "failed_login".to_string(),
            severity: "warning".to_string(),
            ip_address: Some("203.0.113.7".to_string()),
            user_agent: None,
            metadata: None,
            created_at: now,
        };
        let event = SecurityEvent::from(row);
        assert_eq!(event.event_type, SecurityEventType::FailedLogin);
        assert_eq!(event.severity, SecurityEventSeverity::Warning);
        assert_eq!(event.user_id, Some(user_id));
    }
}
