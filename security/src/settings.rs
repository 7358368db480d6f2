use std::collections::HashMap;
use std::sync::Arc;

use aula_core::settings::{SecuritySetting, SettingType};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use sqlx::PgPool;
use tokio::sync::RwLock;

use crate::error::SecurityError;

const SETTINGS_CACHE_TTL_SECS: i64 = 3600;

/// Configuration keys consumed by the enforcement engine. The session pair
/// is stored and seeded here but enforced by the external session
/// subsystem.
pub mod keys {
    pub const MAX_FAILED_LOGIN_ATTEMPTS: &str = "max_failed_login_attempts";
    pub const FAILED_LOGIN_WINDOW_MINUTES: &str = "failed_login_window_minutes";
    pub const BLOCK_DURATION_MINUTES: &str = "block_duration_minutes";
    pub const DETECT_MULTIPLE_IPS: &str = "detect_multiple_ips";
    pub const MULTIPLE_IP_WINDOW_MINUTES: &str = "multiple_ip_window_minutes";
    pub const SESSION_TIMEOUT_MINUTES: &str = "session_timeout_minutes";
    pub const MAX_CONCURRENT_SESSIONS: &str = "max_concurrent_sessions";
}

/// Defaults used when a key is missing or unreadable. Enforcement must
/// keep working on an empty settings table.
pub mod defaults {
    pub const MAX_FAILED_LOGIN_ATTEMPTS: i64 = 5;
    pub const FAILED_LOGIN_WINDOW_MINUTES: i64 = 10;
    pub const BLOCK_DURATION_MINUTES: i64 = 30;
    pub const DETECT_MULTIPLE_IPS: bool = true;
    pub const MULTIPLE_IP_WINDOW_MINUTES: i64 = 30;
    pub const SESSION_TIMEOUT_MINUTES: i64 = 30;
    pub const MAX_CONCURRENT_SESSIONS: i64 = 5;
}

/// Typed key/value configuration with a process-wide per-key cache.
///
/// Reads are cache-first with a bounded TTL; absent keys are cached too,
/// so a hot login path never hammers storage for a key nobody created.
/// Writes go straight to storage and evict exactly the written key.
#[derive(Clone)]
pub struct SettingsStore {
    pool: PgPool,
    cache: Arc<RwLock<HashMap<String, CachedEntry>>>,
}

#[derive(Debug, Clone)]
struct CachedEntry {
    /// None = key known to be absent at fetch time.
    setting: Option<SecuritySetting>,
    fetched_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct SecuritySettingRow {
    id: i64,
    key: String,
    value: Option<String>,
    value_type: String,
    description: Option<String>,
    group: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<SecuritySettingRow> for SecuritySetting {
    fn from(row: SecuritySettingRow) -> Self {
        Self {
            id: row.id,
            key: row.key,
            value: row.value,
            value_type: SettingType::from_db_value(&row.value_type),
            description: row.description,
            group: row.group,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

fn is_fresh(fetched_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now - fetched_at <= ChronoDuration::seconds(SETTINGS_CACHE_TTL_SECS)
}

impl SettingsStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn get_int(&self, key: &str, default: i64) -> i64 {
        match self.fetch(key).await {
            Some(setting) => setting.as_int(default),
            None => default,
        }
    }

    pub async fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.fetch(key).await {
            Some(setting) => setting.as_bool(default),
            None => default,
        }
    }

    pub async fn get_float(&self, key: &str, default: f64) -> f64 {
        match self.fetch(key).await {
            Some(setting) => setting.as_float(default),
            None => default,
        }
    }

    pub async fn get_string(&self, key: &str, default: &str) -> String {
        match self.fetch(key).await {
            Some(setting) => setting.as_string(default),
            None => default.to_string(),
        }
    }

    /// Read-through lookup. Returns `None` when the key is absent or
    /// storage is unavailable — missing configuration never halts
    /// enforcement, so callers fall back to their defaults.
    async fn fetch(&self, key: &str) -> Option<SecuritySetting> {
        let now = Utc::now();
        {
            let read = self.cache.read().await;
            if let Some(entry) = read.get(key)
                && is_fresh(entry.fetched_at, now)
            {
                return entry.setting.clone();
            }
        }

        let row = match sqlx::query_as::<_, SecuritySettingRow>(
            r#"
            SELECT id, key, value, type AS value_type, description, "group",
                   created_at, updated_at
            FROM security_settings
            WHERE key = $1
            "#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        {
            Ok(row) => row,
            Err(err) => {
                tracing::warn!(error = %err, key, "settings lookup failed; using default");
                return None;
            }
        };

        let setting = row.map(SecuritySetting::from);
        let mut write = self.cache.write().await;
        write.insert(
            key.to_string(),
            CachedEntry {
                setting: setting.clone(),
                fetched_at: now,
            },
        );
        setting
    }

    /// Upsert a setting, then evict exactly that key from the cache so the
    /// next reader sees fresh data. Fields passed as `None` keep their
    /// stored values on update.
    pub async fn set(
        &self,
        key: &str,
        value: &str,
        value_type: Option<SettingType>,
        description: Option<&str>,
        group: Option<&str>,
    ) -> Result<SecuritySetting, SecurityError> {
        let row = sqlx::query_as::<_, SecuritySettingRow>(
            r#"
            INSERT INTO security_settings (key, value, type, description, "group")
            VALUES ($1, $2, COALESCE($3, 'string'), $4, $5)
            ON CONFLICT (key) DO UPDATE
                SET value = EXCLUDED.value,
                    type = COALESCE($3, security_settings.type),
                    description = COALESCE($4, security_settings.description),
                    "group" = COALESCE($5, security_settings."group"),
                    updated_at = NOW()
            RETURNING id, key, value, type AS value_type, description, "group",
                      created_at, updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(value_type.map(SettingType::as_str))
        .bind(description)
        .bind(group)
        .fetch_one(&self.pool)
        .await?;

        self.clear_cache(key).await;
        Ok(SecuritySetting::from(row))
    }

    pub async fn clear_cache(&self, key: &str) {
        self.cache.write().await.remove(key);
    }

    pub async fn clear_all_cache(&self) {
        self.cache.write().await.clear();
    }

    /// All settings in a classification group, for administrative views.
    pub async fn group(&self, group: &str) -> Result<Vec<SecuritySetting>, SecurityError> {
        let rows = sqlx::query_as::<_, SecuritySettingRow>(
            r#"
            SELECT id, key, value, type AS value_type, description, "group",
                   created_at, updated_at
            FROM security_settings
            WHERE "group" = $1
            ORDER BY key
            "#,
        )
        .bind(group)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(SecuritySetting::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::{SETTINGS_CACHE_TTL_SECS, SecuritySetting, SecuritySettingRow, is_fresh};
    use chrono::{Duration, Utc};

    #[test]
    fn cache_entry_expires_after_ttl() {
        let now = Utc::now();
        assert!(is_fresh(now, now));
        assert!(is_fresh(
            now - Duration::seconds(SETTINGS_CACHE_TTL_SECS),
            now
        ));
        assert!(!is_fresh(
            now - Duration::seconds(SETTINGS_CACHE_TTL_SECS + 1),
            now
        ));
    }

    #[test]
    fn row_maps_unknown_type_to_string() {
        let now = Utc::now();
        let row = SecuritySettingRow {
            id: 3,
            key: "detect_multiple_ips".to_string(),
            value: Some("true".to_string()),
            value_type: "jsonb".to_string(),
            description: None,
            group: Some("login_security".to_string()),
            created_at: now,
            updated_at: now,
        };
        let setting = SecuritySetting::from(row);
        assert_eq!(
            setting.value_type,
            aula_core::settings::SettingType::String
        );
        assert!(setting.as_bool(false));
    }
}
