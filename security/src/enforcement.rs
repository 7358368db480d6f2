use aula_core::blocks::{BlockStatus, BlockType, UserBlock};
use aula_core::events::{NewSecurityEvent, SecurityEventSeverity, SecurityEventType};
use serde_json::{Value, json};
use sqlx::PgPool;
use uuid::Uuid;

use crate::blocks::BlockLedger;
use crate::detector::{AnomalyDetector, DetectionOutcome};
use crate::error::SecurityError;
use crate::events::EventLog;
use crate::settings::SettingsStore;

/// Single entry point for the login path and administrative tooling.
///
/// The login flow calls [`is_blocked`](Self::is_blocked) before credential
/// checks and [`record_failed_login`](Self::record_failed_login) /
/// [`record_successful_login`](Self::record_successful_login) per attempt.
/// Administrators call the `manual_*` operations; who may call them is the
/// permission subsystem's concern, not ours.
#[derive(Clone)]
pub struct SecurityEnforcer {
    settings: SettingsStore,
    events: EventLog,
    blocks: BlockLedger,
    detector: AnomalyDetector,
}

impl SecurityEnforcer {
    pub fn new(pool: PgPool) -> Self {
        let settings = SettingsStore::new(pool.clone());
        let events = EventLog::new(pool.clone());
        let blocks = BlockLedger::new(pool);
        let detector = AnomalyDetector::new(settings.clone(), events.clone(), blocks.clone());
        Self {
            settings,
            events,
            blocks,
            detector,
        }
    }

    /// Record a failed attempt, evaluate escalation synchronously, and
    /// report the resulting block state — the caller learns about a block
    /// issued by this very attempt in the same call, with no race between
    /// "login rejected" and "block exists" views.
    ///
    /// The event append fails open: on a logging outage the attempt
    /// proceeds unrecorded rather than locking the user out.
    pub async fn record_failed_login(
        &self,
        user_id: Uuid,
        ip_address: Option<&str>,
        user_agent: Option<&str>,
    ) -> Result<BlockStatus, SecurityError> {
        let event = NewSecurityEvent::new(
            SecurityEventType::FailedLogin,
            SecurityEventSeverity::Warning,
        )
        .for_user(user_id)
        .from_ip(ip_address)
        .with_user_agent(user_agent);
        if let Err(err) = self.events.append(event).await {
            tracing::warn!(
                error = %err,
                user_id = %user_id,
                "failed_login event not recorded; proceeding without it"
            );
        }

        if let DetectionOutcome::Blocked(block) = self
            .detector
            .run_after_failed_login(user_id, ip_address, user_agent)
            .await
        {
            return Ok(BlockStatus::from_block(&block, chrono::Utc::now()));
        }

        self.blocks.is_blocked(user_id).await
    }

    /// Record a successful attempt. Deliberately does not reset the
    /// failed-attempt window: the policy is "too many failures within X
    /// minutes" regardless of interleaved successes.
    pub async fn record_successful_login(
        &self,
        user_id: Uuid,
        ip_address: Option<&str>,
        user_agent: Option<&str>,
    ) {
        let event = NewSecurityEvent::new(
            SecurityEventType::SuccessfulLogin,
            SecurityEventSeverity::Info,
        )
        .for_user(user_id)
        .from_ip(ip_address)
        .with_user_agent(user_agent);
        if let Err(err) = self.events.append(event).await {
            tracing::warn!(error = %err, user_id = %user_id, "successful_login event not recorded");
        }

        self.detector.check_multiple_ips(user_id, user_agent).await;
    }

    /// Current block state; expiry is reconciled lazily by the ledger, so
    /// this read can write at most once per lapsed block.
    pub async fn is_blocked(&self, user_id: Uuid) -> Result<BlockStatus, SecurityError> {
        self.blocks.is_blocked(user_id).await
    }

    /// Administrator-issued block with mandatory attribution.
    /// `duration_minutes = None` means permanent. Fails with
    /// [`SecurityError::AlreadyBlocked`] when an active block exists.
    pub async fn manual_block(
        &self,
        user_id: Uuid,
        reason: &str,
        duration_minutes: Option<i64>,
        blocked_by: Uuid,
        metadata: Option<Value>,
    ) -> Result<UserBlock, SecurityError> {
        let block = self
            .blocks
            .block(
                user_id,
                reason,
                BlockType::Manual,
                duration_minutes,
                Some(blocked_by),
                None,
                metadata,
            )
            .await?;

        let audit = NewSecurityEvent::new(
            SecurityEventType::BlockIssued,
            SecurityEventSeverity::Critical,
        )
        .for_user(user_id)
        .with_metadata(json!({
            "block_id": block.id,
            "block_type": BlockType::Manual.as_str(),
            "blocked_by": blocked_by,
        }));
        if let Err(err) = self.events.append(audit).await {
            tracing::warn!(error = %err, user_id = %user_id, "block_issued event not recorded");
        }

        Ok(block)
    }

    /// Lift a block with attribution. Fails with
    /// [`SecurityError::NotBlocked`] when no active block exists — callers
    /// racing another administrator should treat that as a benign no-op.
    pub async fn manual_unblock(
        &self,
        user_id: Uuid,
        unblocked_by: Uuid,
    ) -> Result<UserBlock, SecurityError> {
        let block = self.blocks.unblock(user_id, Some(unblocked_by)).await?;

        let audit = NewSecurityEvent::new(
            SecurityEventType::BlockLifted,
            SecurityEventSeverity::Info,
        )
        .for_user(user_id)
        .with_metadata(json!({
            "block_id": block.id,
            "unblocked_by": unblocked_by,
        }));
        if let Err(err) = self.events.append(audit).await {
            tracing::warn!(error = %err, user_id = %user_id, "block_lifted event not recorded");
        }

        Ok(block)
    }

    /// Settings access for administrative tooling.
    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    /// Event-log access for audit views.
    pub fn events(&self) -> &EventLog {
        &self.events
    }

    /// Ledger access for block-history views.
    pub fn blocks(&self) -> &BlockLedger {
        &self.blocks
    }
}
