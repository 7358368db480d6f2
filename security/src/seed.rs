use aula_core::settings::SettingType;
use sqlx::PgPool;

use crate::error::SecurityError;
use crate::settings::keys;

/// One seedable configuration row.
#[derive(Debug, Clone, Copy)]
pub struct DefaultSetting {
    pub key: &'static str,
    pub value: &'static str,
    pub value_type: SettingType,
    pub description: &'static str,
    pub group: &'static str,
}

/// The configuration namespace this engine consumes. The two
/// `session_security` keys are read by the external session subsystem;
/// they live here so the whole namespace is seeded in one place.
pub const DEFAULT_SETTINGS: &[DefaultSetting] = &[
    DefaultSetting {
        key: keys::MAX_FAILED_LOGIN_ATTEMPTS,
        value: "5",
        value_type: SettingType::Integer,
        description: "Failed attempts inside the window that trigger an automatic block",
        group: "login_security",
    },
    DefaultSetting {
        key: keys::FAILED_LOGIN_WINDOW_MINUTES,
        value: "10",
        value_type: SettingType::Integer,
        description: "Trailing window (minutes) over which failed attempts are counted",
        group: "login_security",
    },
    DefaultSetting {
        key: keys::BLOCK_DURATION_MINUTES,
        value: "30",
        value_type: SettingType::Integer,
        description: "Duration (minutes) of automatic blocks",
        group: "login_security",
    },
    DefaultSetting {
        key: keys::DETECT_MULTIPLE_IPS,
        value: "true",
        value_type: SettingType::Boolean,
        description: "Flag accounts seen from multiple addresses inside the window",
        group: "login_security",
    },
    DefaultSetting {
        key: keys::MULTIPLE_IP_WINDOW_MINUTES,
        value: "30",
        value_type: SettingType::Integer,
        description: "Trailing window (minutes) for distinct-address detection",
        group: "login_security",
    },
    DefaultSetting {
        key: keys::SESSION_TIMEOUT_MINUTES,
        value: "30",
        value_type: SettingType::Integer,
        description: "Idle session timeout (minutes); enforced by the session subsystem",
        group: "session_security",
    },
    DefaultSetting {
        key: keys::MAX_CONCURRENT_SESSIONS,
        value: "5",
        value_type: SettingType::Integer,
        description: "Concurrent session cap; enforced by the session subsystem",
        group: "session_security",
    },
];

/// Insert any missing default settings. Existing rows are left untouched,
/// so operator overrides survive re-seeding. Returns how many rows were
/// inserted.
pub async fn seed_default_settings(pool: &PgPool) -> Result<u64, SecurityError> {
    let mut inserted = 0;
    for setting in DEFAULT_SETTINGS {
        let result = sqlx::query(
            r#"
            INSERT INTO security_settings (key, value, type, description, "group")
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (key) DO NOTHING
            "#,
        )
        .bind(setting.key)
        .bind(setting.value)
        .bind(setting.value_type.as_str())
        .bind(setting.description)
        .bind(setting.group)
        .execute(pool)
        .await?;
        inserted += result.rows_affected();
    }

    tracing::info!(inserted, "security settings seeded");
    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::DEFAULT_SETTINGS;
    use crate::settings::{defaults, keys};
    use aula_core::settings::SettingType;

    fn seeded(key: &str) -> &'static super::DefaultSetting {
        DEFAULT_SETTINGS
            .iter()
            .find(|setting| setting.key == key)
            .expect("key should be seeded")
    }

    #[test]
    fn every_consumed_key_is_seeded() {
        for key in [
            keys::MAX_FAILED_LOGIN_ATTEMPTS,
            keys::FAILED_LOGIN_WINDOW_MINUTES,
            keys::BLOCK_DURATION_MINUTES,
            keys::DETECT_MULTIPLE_IPS,
            keys::MULTIPLE_IP_WINDOW_MINUTES,
            keys::SESSION_TIMEOUT_MINUTES,
            keys::MAX_CONCURRENT_SESSIONS,
        ] {
            seeded(key);
        }
        assert_eq!(DEFAULT_SETTINGS.len(), 7);
    }

    #[test]
    fn seeded_values_agree_with_code_defaults() {
        assert_eq!(
            seeded(keys::MAX_FAILED_LOGIN_ATTEMPTS)
                .value
                .parse::<i64>()
                .unwrap(),
            defaults::MAX_FAILED_LOGIN_ATTEMPTS
        );
        assert_eq!(
            seeded(keys::FAILED_LOGIN_WINDOW_MINUTES)
                .value
                .parse::<i64>()
                .unwrap(),
            defaults::FAILED_LOGIN_WINDOW_MINUTES
        );
        assert_eq!(
            seeded(keys::BLOCK_DURATION_MINUTES)
                .value
                .parse::<i64>()
                .unwrap(),
            defaults::BLOCK_DURATION_MINUTES
        );
        assert_eq!(
            aula_core::settings::parse_bool_permissive(seeded(keys::DETECT_MULTIPLE_IPS).value),
            defaults::DETECT_MULTIPLE_IPS
        );
        assert_eq!(
            seeded(keys::MULTIPLE_IP_WINDOW_MINUTES)
                .value
                .parse::<i64>()
                .unwrap(),
            defaults::MULTIPLE_IP_WINDOW_MINUTES
        );
    }

    #[test]
    fn seeded_values_parse_under_their_declared_type() {
        for setting in DEFAULT_SETTINGS {
            match setting.value_type {
                SettingType::Integer => {
                    setting.value.parse::<i64>().expect("integer value");
                }
                SettingType::Float => {
                    setting.value.parse::<f64>().expect("float value");
                }
                SettingType::Boolean | SettingType::String => {}
            }
        }
    }
}
