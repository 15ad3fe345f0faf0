//! Telemetry service configuration.
//!
//! Configuration is loaded from environment variables. The ACL (and the
//! optional group table) are parsed and expanded here, so a malformed ACL
//! fails startup instead of surfacing at request time.

use crate::acl::{AclTable, GroupTable};
use crate::fanout::MAX_STAT_INTERVAL;
use std::collections::HashMap;
use std::env;
use std::fmt;
use thiserror::Error;

/// Default gRPC bind address.
pub const DEFAULT_GRPC_BIND_ADDRESS: &str = "0.0.0.0:8082";

/// Default health endpoint bind address.
pub const DEFAULT_HEALTH_BIND_ADDRESS: &str = "0.0.0.0:8083";

/// Default capacity of each log subscriber's inbox.
pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 256;

/// Default upper bound for a statistics flush interval.
pub const DEFAULT_MAX_STAT_INTERVAL_SECONDS: u64 = 3600;

/// Telemetry service configuration.
#[derive(Clone)]
pub struct Config {
    /// Expanded access control table.
    pub acl: AclTable,

    /// Group membership used to expand wildcards.
    pub groups: GroupTable,

    /// gRPC server bind address (default: "0.0.0.0:8082").
    pub grpc_bind_address: String,

    /// Health endpoint bind address (default: "0.0.0.0:8083").
    pub health_bind_address: String,

    /// Log subscriber inbox capacity; events beyond it are dropped for that
    /// subscriber.
    pub subscriber_buffer: usize,

    /// Largest accepted `interval_seconds` for a statistics stream, at most
    /// one day.
    pub max_stat_interval_seconds: u64,
}

/// Summarizes the ACL rather than dumping every permission.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("acl_consumers", &self.acl.len())
            .field("groups", &self.groups.len())
            .field("grpc_bind_address", &self.grpc_bind_address)
            .field("health_bind_address", &self.health_bind_address)
            .field("subscriber_buffer", &self.subscriber_buffer)
            .field("max_stat_interval_seconds", &self.max_stat_interval_seconds)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let groups = match vars.get("TELEMETRY_ACL_GROUPS") {
            Some(raw) => GroupTable::from_json(raw).map_err(|e| {
                ConfigError::InvalidValue(format!("TELEMETRY_ACL_GROUPS: {e}"))
            })?,
            None => GroupTable::default(),
        };

        let raw_acl = vars
            .get("TELEMETRY_ACL")
            .ok_or_else(|| ConfigError::MissingEnvVar("TELEMETRY_ACL".to_string()))?;
        let acl = AclTable::from_json(raw_acl, &groups)
            .map_err(|e| ConfigError::InvalidValue(format!("TELEMETRY_ACL: {e}")))?;

        let grpc_bind_address = vars
            .get("TELEMETRY_GRPC_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_GRPC_BIND_ADDRESS.to_string());

        let health_bind_address = vars
            .get("TELEMETRY_HEALTH_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_HEALTH_BIND_ADDRESS.to_string());

        let subscriber_buffer = match vars.get("TELEMETRY_SUBSCRIBER_BUFFER") {
            Some(raw) => match raw.parse::<usize>() {
                Ok(0) | Err(_) => {
                    return Err(ConfigError::InvalidValue(format!(
                        "TELEMETRY_SUBSCRIBER_BUFFER must be a positive integer, got {raw:?}"
                    )))
                }
                Ok(value) => value,
            },
            None => DEFAULT_SUBSCRIBER_BUFFER,
        };

        let max_stat_interval_seconds = match vars.get("TELEMETRY_MAX_STAT_INTERVAL_SECONDS") {
            Some(raw) => match raw.parse::<u64>() {
                Ok(value) if (1..=MAX_STAT_INTERVAL.as_secs()).contains(&value) => value,
                _ => {
                    return Err(ConfigError::InvalidValue(format!(
                        "TELEMETRY_MAX_STAT_INTERVAL_SECONDS must be between 1 and {}, got {raw:?}",
                        MAX_STAT_INTERVAL.as_secs()
                    )))
                }
            },
            None => DEFAULT_MAX_STAT_INTERVAL_SECONDS,
        };

        Ok(Config {
            acl,
            groups,
            grpc_bind_address,
            health_bind_address,
            subscriber_buffer,
            max_stat_interval_seconds,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn base_vars() -> HashMap<String, String> {
        HashMap::from([(
            "TELEMETRY_ACL".to_string(),
            r#"{"biz_admin": ["/telemetry.Biz/*"], "logger": ["/telemetry.Admin/Logging"]}"#
                .to_string(),
        )])
    }

    #[test]
    fn test_from_vars_defaults() {
        let config = Config::from_vars(&base_vars()).unwrap();

        assert_eq!(config.grpc_bind_address, DEFAULT_GRPC_BIND_ADDRESS);
        assert_eq!(config.health_bind_address, DEFAULT_HEALTH_BIND_ADDRESS);
        assert_eq!(config.subscriber_buffer, DEFAULT_SUBSCRIBER_BUFFER);
        assert_eq!(
            config.max_stat_interval_seconds,
            DEFAULT_MAX_STAT_INTERVAL_SECONDS
        );
        assert_eq!(config.groups, GroupTable::default());
        assert!(config.acl.is_allowed("biz_admin", "/telemetry.Biz/Test"));
    }

    #[test]
    fn test_from_vars_overrides() {
        let mut vars = base_vars();
        vars.insert(
            "TELEMETRY_GRPC_BIND_ADDRESS".to_string(),
            "127.0.0.1:9000".to_string(),
        );
        vars.insert(
            "TELEMETRY_HEALTH_BIND_ADDRESS".to_string(),
            "127.0.0.1:9001".to_string(),
        );
        vars.insert("TELEMETRY_SUBSCRIBER_BUFFER".to_string(), "8".to_string());
        vars.insert(
            "TELEMETRY_MAX_STAT_INTERVAL_SECONDS".to_string(),
            "60".to_string(),
        );

        let config = Config::from_vars(&vars).unwrap();

        assert_eq!(config.grpc_bind_address, "127.0.0.1:9000");
        assert_eq!(config.health_bind_address, "127.0.0.1:9001");
        assert_eq!(config.subscriber_buffer, 8);
        assert_eq!(config.max_stat_interval_seconds, 60);
    }

    #[test]
    fn test_missing_acl() {
        let result = Config::from_vars(&HashMap::new());
        assert!(matches!(
            result,
            Err(ConfigError::MissingEnvVar(ref name)) if name == "TELEMETRY_ACL"
        ));
    }

    #[test]
    fn test_malformed_acl_is_fatal() {
        let vars = HashMap::from([("TELEMETRY_ACL".to_string(), "{\"a\": 1}".to_string())]);
        let result = Config::from_vars(&vars);
        assert!(matches!(result, Err(ConfigError::InvalidValue(ref msg)) if msg.starts_with("TELEMETRY_ACL:")));
    }

    #[test]
    fn test_custom_groups_drive_expansion() {
        let vars = HashMap::from([
            (
                "TELEMETRY_ACL".to_string(),
                r#"{"svcA": ["Admin/*"]}"#.to_string(),
            ),
            (
                "TELEMETRY_ACL_GROUPS".to_string(),
                r#"{"Admin": ["Logging", "Statistics"]}"#.to_string(),
            ),
        ]);

        let config = Config::from_vars(&vars).unwrap();

        assert!(config.acl.is_allowed("svcA", "Admin/Logging"));
        assert!(config.acl.is_allowed("svcA", "Admin/Statistics"));
    }

    #[test]
    fn test_invalid_groups() {
        let mut vars = base_vars();
        vars.insert("TELEMETRY_ACL_GROUPS".to_string(), "[]".to_string());
        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_invalid_subscriber_buffer() {
        for raw in ["0", "-1", "lots"] {
            let mut vars = base_vars();
            vars.insert("TELEMETRY_SUBSCRIBER_BUFFER".to_string(), raw.to_string());
            assert!(
                matches!(Config::from_vars(&vars), Err(ConfigError::InvalidValue(_))),
                "buffer {raw} should be rejected"
            );
        }
    }

    #[test]
    fn test_invalid_max_interval() {
        let too_long = (MAX_STAT_INTERVAL.as_secs() + 1).to_string();
        let overflow = u64::MAX.to_string();
        for raw in ["0", "soon", too_long.as_str(), overflow.as_str()] {
            let mut vars = base_vars();
            vars.insert(
                "TELEMETRY_MAX_STAT_INTERVAL_SECONDS".to_string(),
                raw.to_string(),
            );
            assert!(
                matches!(Config::from_vars(&vars), Err(ConfigError::InvalidValue(_))),
                "max interval {raw} should be rejected"
            );
        }
    }

    #[test]
    fn test_max_interval_upper_bound_accepted() {
        let mut vars = base_vars();
        vars.insert(
            "TELEMETRY_MAX_STAT_INTERVAL_SECONDS".to_string(),
            MAX_STAT_INTERVAL.as_secs().to_string(),
        );
        let config = Config::from_vars(&vars).unwrap();
        assert_eq!(config.max_stat_interval_seconds, 86_400);
    }

    #[test]
    fn test_debug_summarizes_acl() {
        let config = Config::from_vars(&base_vars()).unwrap();
        let debug_str = format!("{config:?}");
        assert!(debug_str.contains("acl_consumers: 2"));
        assert!(!debug_str.contains("biz_admin"));
    }
}
