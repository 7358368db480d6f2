use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockType {
    Automatic,
    Manual,
}

impl BlockType {
    pub fn as_str(self) -> &'static str {
        match self {
            BlockType::Automatic => "automatic",
            BlockType::Manual => "manual",
        }
    }

    pub fn from_db_value(value: &str) -> Self {
        match value {
            "manual" => BlockType::Manual,
            _ => BlockType::Automatic,
        }
    }

    /// Display label for administrative views.
    pub fn label(self) -> &'static str {
        match self {
            BlockType::Automatic => "Automático",
            BlockType::Manual => "Manual",
        }
    }
}

/// One block/unblock lifecycle for an account. Rows are deactivated, never
/// deleted — the table doubles as the audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserBlock {
    pub id: i64,
    pub user_id: Uuid,
    /// None means the block was issued by the system, not an administrator.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocked_by: Option<Uuid>,
    pub reason: String,
    pub block_type: BlockType,
    /// IP observed on the attempt that triggered the block, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    pub blocked_at: DateTime<Utc>,
    /// None = permanent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocked_until: Option<DateTime<Utc>>,
    pub is_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unblocked_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unblocked_by: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserBlock {
    /// Whether the block is in force at `now`. An active row whose
    /// `blocked_until` has lapsed is logically expired even before the
    /// ledger reconciles it on the next read.
    pub fn is_currently_blocked_at(&self, now: DateTime<Utc>) -> bool {
        if !self.is_active {
            return false;
        }
        match self.blocked_until {
            None => true,
            Some(until) => now < until,
        }
    }

    pub fn is_currently_blocked(&self) -> bool {
        self.is_currently_blocked_at(Utc::now())
    }

    /// Human-readable remaining time in descending units, `"Permanente"`
    /// for permanent blocks, `None` when the block is not in force.
    pub fn remaining_time_at(&self, now: DateTime<Utc>) -> Option<String> {
        if !self.is_currently_blocked_at(now) {
            return None;
        }
        match self.blocked_until {
            None => Some("Permanente".to_string()),
            Some(until) => Some(format_remaining(until - now)),
        }
    }

    pub fn remaining_time(&self) -> Option<String> {
        self.remaining_time_at(Utc::now())
    }

    pub fn block_type_label(&self) -> &'static str {
        self.block_type.label()
    }
}

/// Answer to "is this account blocked right now?" — everything the login
/// flow may show the user, nothing more.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockStatus {
    pub blocked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocked_until: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_type: Option<BlockType>,
}

impl BlockStatus {
    pub fn clear() -> Self {
        Self {
            blocked: false,
            reason: None,
            remaining: None,
            blocked_until: None,
            block_type: None,
        }
    }

    pub fn from_block(block: &UserBlock, now: DateTime<Utc>) -> Self {
        if !block.is_currently_blocked_at(now) {
            return Self::clear();
        }
        Self {
            blocked: true,
            reason: Some(block.reason.clone()),
            remaining: block.remaining_time_at(now),
            blocked_until: block.blocked_until,
            block_type: Some(block.block_type),
        }
    }
}

fn format_remaining(remaining: Duration) -> String {
    let total_minutes = remaining.num_minutes().max(0);
    let days = total_minutes / (24 * 60);
    let hours = (total_minutes % (24 * 60)) / 60;
    let minutes = total_minutes % 60;

    if days > 0 {
        format!("{} {}", count_unit(days, "día"), count_unit(hours, "hora"))
    } else if hours > 0 {
        format!(
            "{} {}",
            count_unit(hours, "hora"),
            count_unit(minutes, "minuto")
        )
    } else {
        count_unit(minutes, "minuto")
    }
}

fn count_unit(count: i64, unit: &str) -> String {
    if count == 1 {
        format!("{count} {unit}")
    } else {
        format!("{count} {unit}s")
    }
}

#[cfg(test)]
mod tests {
    use super::{BlockStatus, BlockType, UserBlock, format_remaining};
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    fn block(
        is_active: bool,
        blocked_until: Option<chrono::DateTime<chrono::Utc>>,
    ) -> UserBlock {
        let now = Utc::now();
        UserBlock {
            id: 1,
            user_id: Uuid::now_v7(),
            blocked_by: None,
            reason: "exceeded failed login threshold".to_string(),
            block_type: BlockType::Automatic,
            ip_address: None,
            blocked_at: now - Duration::minutes(1),
            blocked_until,
            is_active,
            unblocked_at: None,
            unblocked_by: None,
            metadata: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn inactive_block_is_never_in_force() {
        let now = Utc::now();
        let block = block(false, Some(now + Duration::hours(1)));
        assert!(!block.is_currently_blocked_at(now));
        assert_eq!(block.remaining_time_at(now), None);
    }

    #[test]
    fn permanent_block_stays_in_force() {
        let now = Utc::now();
        let block = block(true, None);
        assert!(block.is_currently_blocked_at(now + Duration::days(3650)));
        assert_eq!(
            block.remaining_time_at(now).as_deref(),
            Some("Permanente")
        );
    }

    #[test]
    fn lapsed_block_is_logically_expired_before_reconciliation() {
        let now = Utc::now();
        let block = block(true, Some(now - Duration::seconds(1)));
        assert!(block.is_active);
        assert!(!block.is_currently_blocked_at(now));
    }

    #[test]
    fn thirty_minute_block_reports_twenty_nine_minutes_after_first_elapse() {
        let now = Utc::now();
        let block = block(true, Some(now + Duration::seconds(29 * 60 + 30)));
        assert_eq!(
            block.remaining_time_at(now).as_deref(),
            Some("29 minutos")
        );
    }

    #[test]
    fn remaining_formats_descending_units() {
        assert_eq!(
            format_remaining(Duration::days(2) + Duration::hours(5)),
            "2 días 5 horas"
        );
        assert_eq!(
            format_remaining(Duration::days(1) + Duration::hours(1)),
            "1 día 1 hora"
        );
        assert_eq!(
            format_remaining(Duration::hours(3) + Duration::minutes(12)),
            "3 horas 12 minutos"
        );
        assert_eq!(format_remaining(Duration::minutes(1)), "1 minuto");
        assert_eq!(format_remaining(Duration::seconds(30)), "0 minutos");
    }

    #[test]
    fn block_type_labels_are_stable() {
        assert_eq!(BlockType::Automatic.label(), "Automático");
        assert_eq!(BlockType::Manual.label(), "Manual");
        assert_eq!(BlockType::from_db_value("manual"), BlockType::Manual);
        assert_eq!(BlockType::from_db_value("garbage"), BlockType::Automatic);
    }

    #[test]
    fn status_from_expired_block_is_clear() {
        let now = Utc::now();
        let status =
            BlockStatus::from_block(&block(true, Some(now - Duration::minutes(5))), now);
        assert!(!status.blocked);
        assert!(status.reason.is_none());
    }

    #[test]
    fn status_from_live_block_carries_reason_and_remaining() {
        let now = Utc::now();
        let status =
            BlockStatus::from_block(&block(true, Some(now + Duration::minutes(10))), now);
        assert!(status.blocked);
        assert_eq!(
            status.reason.as_deref(),
            Some("exceeded failed login threshold")
        );
        assert!(status.remaining.is_some());
        assert_eq!(status.block_type, Some(BlockType::Automatic));
    }
}
