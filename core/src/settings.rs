use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Declared value type of a stored setting. Coercion through these never
/// errors — malformed values degrade to the caller's default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettingType {
    Integer,
    Boolean,
    Float,
    String,
}

impl SettingType {
    pub fn as_str(self) -> &'static str {
        match self {
            SettingType::Integer => "integer",
            SettingType::Boolean => "boolean",
            SettingType::Float => "float",
            SettingType::String => "string",
        }
    }

    pub fn from_db_value(value: &str) -> Self {
        match value {
            "integer" => SettingType::Integer,
            "boolean" => SettingType::Boolean,
            "float" => SettingType::Float,
            _ => SettingType::String,
        }
    }
}

/// A typed key/value configuration row. Read-heavy; the store in
/// `aula-security` caches these per key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecuritySetting {
    pub id: i64,
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub value_type: SettingType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SecuritySetting {
    pub fn as_int(&self, default: i64) -> i64 {
        self.value
            .as_deref()
            .and_then(|raw| raw.trim().parse().ok())
            .unwrap_or(default)
    }

    pub fn as_bool(&self, default: bool) -> bool {
        match self.value.as_deref() {
            Some(raw) => parse_bool_permissive(raw),
            None => default,
        }
    }

    pub fn as_float(&self, default: f64) -> f64 {
        self.value
            .as_deref()
            .and_then(|raw| raw.trim().parse().ok())
            .unwrap_or(default)
    }

    pub fn as_string(&self, default: &str) -> String {
        self.value
            .clone()
            .unwrap_or_else(|| default.to_string())
    }
}

/// Permissive boolean parse: common truthy spellings are true, everything
/// else — including garbage — is false.
pub fn parse_bool_permissive(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::{SecuritySetting, SettingType, parse_bool_permissive};
    use chrono::Utc;

    fn setting(value: Option<&str>, value_type: SettingType) -> SecuritySetting {
        let now = Utc::now();
        SecuritySetting {
            id: 1,
            key: "max_failed_login_attempts".to_string(),
            value: value.map(str::to_string),
            value_type,
            description: None,
            group: Some("login_security".to_string()),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn integer_value_parses() {
        assert_eq!(setting(Some("5"), SettingType::Integer).as_int(0), 5);
        assert_eq!(setting(Some(" 10 "), SettingType::Integer).as_int(0), 10);
    }

    #[test]
    fn malformed_integer_degrades_to_default() {
        assert_eq!(setting(Some("five"), SettingType::Integer).as_int(7), 7);
        assert_eq!(setting(None, SettingType::Integer).as_int(7), 7);
    }

    #[test]
    fn boolean_parse_is_permissive() {
        for truthy in ["true", "TRUE", "1", "yes", "on", " Yes "] {
            assert!(parse_bool_permissive(truthy), "{truthy} should be true");
        }
        for falsy in ["false", "0", "no", "off", "", "maybe"] {
            assert!(!parse_bool_permissive(falsy), "{falsy} should be false");
        }
    }

    #[test]
    fn absent_boolean_uses_caller_default() {
        assert!(setting(None, SettingType::Boolean).as_bool(true));
        assert!(!setting(None, SettingType::Boolean).as_bool(false));
    }

    #[test]
    fn float_value_parses_and_degrades() {
        assert_eq!(setting(Some("0.75"), SettingType::Float).as_float(0.0), 0.75);
        assert_eq!(setting(Some("n/a"), SettingType::Float).as_float(0.5), 0.5);
    }

    #[test]
    fn string_passthrough() {
        assert_eq!(
            setting(Some("lenient"), SettingType::String).as_string("strict"),
            "lenient"
        );
        assert_eq!(
            setting(None, SettingType::String).as_string("strict"),
            "strict"
        );
    }

    #[test]
    fn setting_type_round_trips_through_db_text() {
        for value_type in [
            SettingType::Integer,
            SettingType::Boolean,
            SettingType::Float,
            SettingType::String,
        ] {
            assert_eq!(
                SettingType::from_db_value(value_type.as_str()),
                value_type
            );
        }
        assert_eq!(SettingType::from_db_value("json"), SettingType::String);
    }
}
