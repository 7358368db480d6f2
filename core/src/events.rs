use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Classification of a security-relevant occurrence. Stored as text so the
/// log stays greppable in plain SQL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityEventType {
    FailedLogin,
    SuccessfulLogin,
    MultipleIpDetected,
    BlockIssued,
    BlockLifted,
    SuspiciousActivity,
}

impl SecurityEventType {
    pub fn as_str(self) -> &'static str {
        match self {
            SecurityEventType::FailedLogin => "failed_login",
            SecurityEventType::SuccessfulLogin => "successful_login",
            SecurityEventType::MultipleIpDetected => "multiple_ip_detected",
            SecurityEventType::BlockIssued => "block_issued",
            SecurityEventType::BlockLifted => "block_lifted",
            SecurityEventType::SuspiciousActivity => "suspicious_activity",
        }
    }

    /// Unknown values fold into `SuspiciousActivity` rather than failing an
    /// audit read — the log is append-only and may outlive this enum.
    pub fn from_db_value(value: &str) -> Self {
        match value {
            "failed_login" => SecurityEventType::FailedLogin,
            "successful_login" => SecurityEventType::SuccessfulLogin,
            "multiple_ip_detected" => SecurityEventType::MultipleIpDetected,
            "block_issued" => SecurityEventType::BlockIssued,
            "block_lifted" => SecurityEventType::BlockLifted,
            _ => SecurityEventType::SuspiciousActivity,
        }
    }
}

/// Ordinal severity: `Info < Warning < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityEventSeverity {
    Info,
    Warning,
    Critical,
}

impl SecurityEventSeverity {
    pub fn as_str(self) -> &'static str {
        match self {
            SecurityEventSeverity::Info => "info",
            SecurityEventSeverity::Warning => "warning",
            SecurityEventSeverity::Critical => "critical",
        }
    }

    pub fn from_db_value(value: &str) -> Self {
        match value {
            "warning" => SecurityEventSeverity::Warning,
            "critical" => SecurityEventSeverity::Critical,
            _ => SecurityEventSeverity::Info,
        }
    }
}

/// A row in the security event log. Immutable once written — corrections
/// are new events, never updates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityEvent {
    /// UUIDv7 — time-sortable.
    pub id: Uuid,
    /// Absent for unauthenticated attempts (e.g. failed login on an
    /// unknown identifier).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Uuid>,
    pub event_type: SecurityEventType,
    pub severity: SecurityEventSeverity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    pub created_at: DateTime<Utc>,
}

/// Payload for appending to the event log. The log assigns the id and
/// `created_at` at insert time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSecurityEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Uuid>,
    pub event_type: SecurityEventType,
    pub severity: SecurityEventSeverity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl NewSecurityEvent {
    pub fn new(event_type: SecurityEventType, severity: SecurityEventSeverity) -> Self {
        Self {
            user_id: None,
            event_type,
            severity,
            ip_address: None,
            user_agent: None,
            metadata: None,
        }
    }

    pub fn for_user(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn from_ip(mut self, ip_address: Option<&str>) -> Self {
        self.ip_address = ip_address.map(str::to_string);
        self
    }

    pub fn with_user_agent(mut self, user_agent: Option<&str>) -> Self {
        self.user_agent = user_agent.map(str::to_string);
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}
