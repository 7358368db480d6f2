use aula_core::blocks::{BlockType, UserBlock};
use aula_core::events::{NewSecurityEvent, SecurityEventSeverity, SecurityEventType};
use serde_json::json;
use uuid::Uuid;

use crate::blocks::BlockLedger;
use crate::error::SecurityError;
use crate::events::EventLog;
use crate::settings::{SettingsStore, defaults, keys};

/// Reason recorded on automatic blocks.
pub const FAILED_LOGIN_BLOCK_REASON: &str = "exceeded failed login threshold";

/// Distinct-IP fan-out that marks an account as shared across addresses.
/// Fixed, not a setting — operators tune the window, not the fan-out.
const MULTIPLE_IP_FANOUT_THRESHOLD: i64 = 2;

/// Thresholds the detector evaluates against, loaded from the settings
/// store per evaluation so operator changes apply without a restart.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorThresholds {
    pub max_failed_attempts: i64,
    pub failed_login_window_minutes: i64,
    pub block_duration_minutes: i64,
    pub detect_multiple_ips: bool,
    pub multiple_ip_window_minutes: i64,
}

impl Default for DetectorThresholds {
    fn default() -> Self {
        Self {
            max_failed_attempts: defaults::MAX_FAILED_LOGIN_ATTEMPTS,
            failed_login_window_minutes: defaults::FAILED_LOGIN_WINDOW_MINUTES,
            block_duration_minutes: defaults::BLOCK_DURATION_MINUTES,
            detect_multiple_ips: defaults::DETECT_MULTIPLE_IPS,
            multiple_ip_window_minutes: defaults::MULTIPLE_IP_WINDOW_MINUTES,
        }
    }
}

impl DetectorThresholds {
    /// Never fails: each key falls back to its default on absence, parse
    /// error, or storage failure — enforcement keeps working on an empty
    /// or unreachable settings table.
    pub async fn load(settings: &SettingsStore) -> Self {
        Self {
            max_failed_attempts: settings
                .get_int(
                    keys::MAX_FAILED_LOGIN_ATTEMPTS,
                    defaults::MAX_FAILED_LOGIN_ATTEMPTS,
                )
                .await,
            failed_login_window_minutes: settings
                .get_int(
                    keys::FAILED_LOGIN_WINDOW_MINUTES,
                    defaults::FAILED_LOGIN_WINDOW_MINUTES,
                )
                .await,
            block_duration_minutes: settings
                .get_int(
                    keys::BLOCK_DURATION_MINUTES,
                    defaults::BLOCK_DURATION_MINUTES,
                )
                .await,
            detect_multiple_ips: settings
                .get_bool(keys::DETECT_MULTIPLE_IPS, defaults::DETECT_MULTIPLE_IPS)
                .await,
            multiple_ip_window_minutes: settings
                .get_int(
                    keys::MULTIPLE_IP_WINDOW_MINUTES,
                    defaults::MULTIPLE_IP_WINDOW_MINUTES,
                )
                .await,
        }
    }
}

/// `>=`, never `>`: the Nth attempt (inclusive) trips the threshold.
pub fn exceeds_failed_login_threshold(count: i64, thresholds: &DetectorThresholds) -> bool {
    count >= thresholds.max_failed_attempts
}

pub fn exceeds_ip_fanout(distinct_ips: i64, thresholds: &DetectorThresholds) -> bool {
    thresholds.detect_multiple_ips && distinct_ips >= MULTIPLE_IP_FANOUT_THRESHOLD
}

/// What a detection pass decided.
#[derive(Debug, Clone)]
pub enum DetectionOutcome {
    NoAction,
    Blocked(UserBlock),
}

/// Evaluates recent event history against configured thresholds after each
/// failed login and escalates to an automatic block when warranted.
///
/// Every failure inside detection is treated as "insufficient data, do not
/// escalate": a counting or threshold-read outage must never turn into
/// either a spurious block or a failed login decision.
#[derive(Clone)]
pub struct AnomalyDetector {
    settings: SettingsStore,
    events: EventLog,
    blocks: BlockLedger,
}

impl AnomalyDetector {
    pub fn new(settings: SettingsStore, events: EventLog, blocks: BlockLedger) -> Self {
        Self {
            settings,
            events,
            blocks,
        }
    }

    /// Run after a `failed_login` event has been appended (or failed
    /// open). Never errors; detection failures downgrade to no action.
    pub async fn run_after_failed_login(
        &self,
        user_id: Uuid,
        ip_address: Option<&str>,
        user_agent: Option<&str>,
    ) -> DetectionOutcome {
        let thresholds = DetectorThresholds::load(&self.settings).await;

        let outcome = self
            .escalate_failed_logins(user_id, ip_address, user_agent, &thresholds)
            .await;

        if thresholds.detect_multiple_ips {
            self.flag_multiple_ips(user_id, user_agent, &thresholds).await;
        }

        outcome
    }

    /// Multiple-IP detection alone. The facade runs this on successful
    /// logins too; the fan-out signal does not depend on how an attempt
    /// ended.
    pub async fn check_multiple_ips(&self, user_id: Uuid, user_agent: Option<&str>) {
        let thresholds = DetectorThresholds::load(&self.settings).await;
        if thresholds.detect_multiple_ips {
            self.flag_multiple_ips(user_id, user_agent, &thresholds).await;
        }
    }

    async fn escalate_failed_logins(
        &self,
        user_id: Uuid,
        ip_address: Option<&str>,
        user_agent: Option<&str>,
        thresholds: &DetectorThresholds,
    ) -> DetectionOutcome {
        let count = match self
            .events
            .count_by_type_in_window(
                user_id,
                SecurityEventType::FailedLogin,
                thresholds.failed_login_window_minutes,
            )
            .await
        {
            Ok(count) => count,
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    user_id = %user_id,
                    "failed-login count unavailable; skipping escalation"
                );
                return DetectionOutcome::NoAction;
            }
        };

        if !exceeds_failed_login_threshold(count, thresholds) {
            return DetectionOutcome::NoAction;
        }

        match self.blocks.active_block(user_id).await {
            Ok(Some(existing)) if existing.is_currently_blocked() => {
                // Threshold still exceeded but the account is already
                // blocked; nothing to escalate.
                return DetectionOutcome::NoAction;
            }
            Ok(_) => {}
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    user_id = %user_id,
                    "block lookup unavailable; skipping escalation"
                );
                return DetectionOutcome::NoAction;
            }
        }

        let block = match self
            .blocks
            .block(
                user_id,
                FAILED_LOGIN_BLOCK_REASON,
                BlockType::Automatic,
                Some(thresholds.block_duration_minutes),
                None,
                ip_address,
                Some(json!({
                    "failed_attempts": count,
                    "window_minutes": thresholds.failed_login_window_minutes,
                })),
            )
            .await
        {
            Ok(block) => block,
            Err(SecurityError::AlreadyBlocked { .. }) => {
                // Lost the race to a concurrent attempt; the block exists,
                // which is all that matters.
                return DetectionOutcome::NoAction;
            }
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    user_id = %user_id,
                    "automatic block could not be issued"
                );
                return DetectionOutcome::NoAction;
            }
        };

        tracing::info!(
            user_id = %user_id,
            failed_attempts = count,
            block_id = block.id,
            "automatic block issued"
        );

        let audit = NewSecurityEvent::new(
            SecurityEventType::BlockIssued,
            SecurityEventSeverity::Critical,
        )
        .for_user(user_id)
        .from_ip(ip_address)
        .with_user_agent(user_agent)
        .with_metadata(json!({
            "block_id": block.id,
            "block_type": BlockType::Automatic.as_str(),
            "failed_attempts": count,
        }));
        if let Err(err) = self.events.append(audit).await {
            tracing::warn!(error = %err, user_id = %user_id, "block_issued event not recorded");
        }

        DetectionOutcome::Blocked(block)
    }

    /// Detection only: flags the fan-out for operators, never blocks.
    async fn flag_multiple_ips(
        &self,
        user_id: Uuid,
        user_agent: Option<&str>,
        thresholds: &DetectorThresholds,
    ) {
        let distinct_ips = match self
            .events
            .distinct_ip_count_in_window(user_id, thresholds.multiple_ip_window_minutes)
            .await
        {
            Ok(count) => count,
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    user_id = %user_id,
                    "distinct-ip count unavailable; skipping multiple-ip check"
                );
                return;
            }
        };

        if !exceeds_ip_fanout(distinct_ips, thresholds) {
            return;
        }

        let event = NewSecurityEvent::new(
            SecurityEventType::MultipleIpDetected,
            SecurityEventSeverity::Warning,
        )
        .for_user(user_id)
        .with_user_agent(user_agent)
        .with_metadata(json!({
            "distinct_ips": distinct_ips,
            "window_minutes": thresholds.multiple_ip_window_minutes,
        }));
        if let Err(err) = self.events.append(event).await {
            tracing::warn!(
                error = %err,
                user_id = %user_id,
                "multiple_ip_detected event not recorded"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{
        DetectorThresholds, exceeds_failed_login_threshold, exceeds_ip_fanout,
    };

    #[test]
    fn threshold_trips_on_the_nth_attempt_inclusive() {
        let thresholds = DetectorThresholds::default();
        assert!(!exceeds_failed_login_threshold(4, &thresholds));
        assert!(exceeds_failed_login_threshold(5, &thresholds));
        assert!(exceeds_failed_login_threshold(6, &thresholds));
    }

    #[test]
    fn ip_fanout_requires_two_distinct_addresses() {
        let thresholds = DetectorThresholds::default();
        assert!(!exceeds_ip_fanout(1, &thresholds));
        assert!(exceeds_ip_fanout(2, &thresholds));
        assert!(exceeds_ip_fanout(3, &thresholds));
    }

    #[test]
    fn ip_fanout_is_inert_when_detection_is_disabled() {
        let thresholds = DetectorThresholds {
            detect_multiple_ips: false,
            ..DetectorThresholds::default()
        };
        assert!(!exceeds_ip_fanout(10, &thresholds));
    }

    #[test]
    fn defaults_match_the_seeded_configuration() {
        let thresholds = DetectorThresholds::default();
        assert_eq!(thresholds.max_failed_attempts, 5);
        assert_eq!(thresholds.failed_login_window_minutes, 10);
        assert_eq!(thresholds.block_duration_minutes, 30);
        assert!(thresholds.detect_multiple_ips);
        assert_eq!(thresholds.multiple_ip_window_minutes, 30);
    }
}
