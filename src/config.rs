// src/config.rs

//! Application configuration loaded from environment variables.
//!
//! This module defines all startup-time configuration for the service.
//! Configuration is validated eagerly and failures are treated as
//! deployment errors rather than recoverable runtime conditions.
//! The resulting [`AppConfig`] is immutable and handed to the components
//! that need it.

use anyhow::Result;
use std::time::Duration;

// ============================================================
// Local macros (config-only, intentionally explicit)
// ============================================================

/// Reads a required environment variable.
///
/// Fails fast with "Missing required configuration: KEY" if the variable
/// is not set.
macro_rules! required_env {
    // ---
    ($key:literal) => {
        std::env::var($key)
            .map_err(|_| anyhow::anyhow!(concat!("Missing required configuration: ", $key)))?
    };
}

/// Reads an optional string environment variable with a default.
macro_rules! optional_env {
    // ---
    ($key:literal, $default:expr) => {
        std::env::var($key).unwrap_or_else(|_| $default.to_string())
    };
}

/// Reads an optional environment variable and attempts to parse it.
///
/// If the variable is missing or cannot be parsed, the provided
/// default value is used. This macro is appropriate for non-critical
/// tuning parameters where fallback behavior is acceptable.
macro_rules! optional_env_parse {
    // ---
    ($key:literal, $ty:ty, $default:expr) => {
        std::env::var($key)
            .ok()
            .and_then(|v| v.parse::<$ty>().ok())
            .unwrap_or($default)
    };
}

#[cfg(test)]
/// Asserts that a configuration constructor fails due to a missing
/// required environment variable.
macro_rules! assert_missing_config {
    // ---
    ($expr:expr, $key:literal) => {{
        let err = $expr.expect_err("expected configuration error");
        assert!(
            err.to_string()
                .contains(concat!("Missing required configuration: ", $key)),
            "unexpected error: {err}"
        );
    }};
}

// ============================================================
// Public configuration facade
// ============================================================

/// Aggregated application configuration.
///
/// This is the single source of truth for startup configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub service: service::ServiceConfig,
    pub schema: schema::SchemaConfig,
    /// Present only when the Postgres backend is selected.
    pub database: Option<database::DatabaseConfig>,
}

impl AppConfig {
    /// Loads and validates all application configuration from the environment.
    ///
    /// # Errors
    /// Returns an error if any required configuration is missing or invalid.
    /// This function is intended to be called exactly once at startup.
    pub fn from_env() -> Result<Self> {
        // ---
        let service = service::ServiceConfig::from_env()?;
        let schema = schema::SchemaConfig::from_env()?;
        let database = match service.store_backend {
            StoreBackend::Postgres => Some(database::DatabaseConfig::from_env()?),
            StoreBackend::Memory => None,
        };

        Ok(Self {
            service,
            schema,
            database,
        })
    }
}

// ============================================================
// Service configuration
// ============================================================

mod service {
    // ---
    use super::*;
    use crate::domain::Consistency;

    /// Which storage backend serves pings.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum StoreBackend {
        Postgres,
        /// Process-local tables; data is lost on exit.
        Memory,
    }

    /// Which metrics implementation backs `/metrics`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum MetricsBackend {
        Noop,
        Prometheus,
    }

    /// Process-level settings.
    #[derive(Debug, Clone)]
    pub struct ServiceConfig {
        /// Socket address the HTTP server binds to. Defaults to 127.0.0.1:8080.
        pub bind_addr: String,

        pub metrics: MetricsBackend,

        pub store_backend: StoreBackend,

        /// Transaction grouping of the ping statements. Defaults to atomic.
        pub consistency: Consistency,

        /// Refuse to start when bootstrap reports unexpected failures.
        pub bootstrap_strict: bool,
    }

    impl ServiceConfig {
        /// Builds a [`ServiceConfig`] from environment variables.
        ///
        /// # Errors
        /// Returns an error for an unknown store backend or consistency mode.
        pub fn from_env() -> Result<Self> {
            // ---
            let bind_addr = optional_env!("USAGE_BIND_ADDR", "127.0.0.1:8080");

            let metrics = match optional_env!("USAGE_METRICS_TYPE", "noop").as_str() {
                "prom" => MetricsBackend::Prometheus,
                _ => MetricsBackend::Noop,
            };

            let store_backend = match optional_env!("USAGE_STORE_BACKEND", "postgres").as_str() {
                "postgres" => StoreBackend::Postgres,
                "memory" => StoreBackend::Memory,
                other => anyhow::bail!(
                    "Invalid USAGE_STORE_BACKEND '{other}' (expected 'postgres' or 'memory')"
                ),
            };

            let consistency = optional_env!("USAGE_PING_CONSISTENCY", "atomic").parse::<Consistency>()?;
            let bootstrap_strict =
                parse_flag("USAGE_BOOTSTRAP_STRICT", &optional_env!("USAGE_BOOTSTRAP_STRICT", "false"))?;

            Ok(Self {
                bind_addr,
                metrics,
                store_backend,
                consistency,
                bootstrap_strict,
            })
        }
    }

    /// Parses an on/off switch. A typo must not silently turn it off.
    fn parse_flag(key: &str, raw: &str) -> Result<bool> {
        // ---
        match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" | "" => Ok(false),
            other => anyhow::bail!("Invalid {key} '{other}' (expected true or false)"),
        }
    }
}
pub use service::{MetricsBackend, ServiceConfig, StoreBackend};

// ============================================================
// Database configuration
// ============================================================

mod database {
    // ---
    use super::*;
    use sqlx::postgres::PgConnectOptions;
    use std::fmt;
    use std::str::FromStr;

    /// How to reach the database.
    #[derive(Clone)]
    pub enum Connection {
        /// A full `postgres://` URL.
        Url(String),

        /// Login, credential and network alias (`host[:port]/database`).
        Credentials {
            user: String,
            password: String,
            alias: String,
        },
    }

    impl fmt::Debug for Connection {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            // ---
            match self {
                Connection::Url(_) => f.write_str("Url(<redacted>)"),
                Connection::Credentials { user, alias, .. } => f
                    .debug_struct("Credentials")
                    .field("user", user)
                    .field("password", &"<redacted>")
                    .field("alias", alias)
                    .finish(),
            }
        }
    }

    impl Connection {
        /// Converts into sqlx connect options.
        ///
        /// # Errors
        /// Returns an error for a malformed URL, alias or port.
        pub fn connect_options(&self) -> Result<PgConnectOptions> {
            // ---
            match self {
                Connection::Url(url) => Ok(PgConnectOptions::from_str(url)?),
                Connection::Credentials {
                    user,
                    password,
                    alias,
                } => {
                    let (host_port, database) = alias.split_once('/').ok_or_else(|| {
                        anyhow::anyhow!("USAGE_DB_ALIAS must look like host[:port]/database")
                    })?;
                    let (host, port) = match host_port.split_once(':') {
                        Some((host, port)) => (host, port.parse::<u16>()?),
                        None => (host_port, 5432),
                    };
                    Ok(PgConnectOptions::new()
                        .host(host)
                        .port(port)
                        .database(database)
                        .username(user)
                        .password(password))
                }
            }
        }
    }

    /// Database-related configuration derived from environment variables.
    #[derive(Debug, Clone)]
    pub struct DatabaseConfig {
        pub connection: Connection,

        /// Number of retry attempts when initializing the database connection. Defaults to 50.
        pub retry_count: u32,

        /// Maximum time to wait when acquiring a connection from the pool. Defaults to 30 seconds.
        pub acquire_timeout: Duration,

        /// Minimum number of connections to keep in the pool, even when idle. Defaults to 2.
        pub min_connections: u32,

        /// Maximum number of connections to be open concurrently. Defaults to 15
        pub max_connections: u32,
    }

    impl DatabaseConfig {
        /// Builds a [`DatabaseConfig`] from environment variables.
        ///
        /// `DATABASE_URL` wins when set; otherwise `USAGE_DB_USER`,
        /// `USAGE_DB_PASSWORD` and `USAGE_DB_ALIAS` are all required.
        ///
        /// # Errors
        /// Returns an error if required configuration is missing.
        pub fn from_env() -> Result<Self> {
            // ---
            let connection = match std::env::var("DATABASE_URL") {
                Ok(url) => Connection::Url(url),
                Err(_) => Connection::Credentials {
                    user: required_env!("USAGE_DB_USER"),
                    password: required_env!("USAGE_DB_PASSWORD"),
                    alias: required_env!("USAGE_DB_ALIAS"),
                },
            };
            let retry_count = optional_env_parse!("USAGE_DB_RETRY_COUNT", u32, 50);
            let acquire_timeout_secs = optional_env_parse!("USAGE_DB_ACQUIRE_TIMEOUT_SEC", u64, 30);
            let min_connections = optional_env_parse!("USAGE_DB_MIN_CONNECTIONS", u32, 2);
            let max_connections = optional_env_parse!("USAGE_DB_MAX_CONNECTIONS", u32, 15);

            Ok(Self {
                connection,
                retry_count,
                acquire_timeout: Duration::from_secs(acquire_timeout_secs),
                min_connections,
                max_connections,
            })
        }
    }
}
pub use database::{Connection, DatabaseConfig};

// ============================================================
// Schema configuration
// ============================================================

mod schema {
    // ---
    use super::*;
    use regex::Regex;

    const IDENTIFIER_PATTERN: &str = r"^[A-Za-z_][A-Za-z0-9_]*$";

    /// Table and column identifiers used to build every query, plus the
    /// sentinel written for unknown versions, applications and organisations.
    ///
    /// Identifiers are spliced into SQL text, so each one is checked against
    /// a plain-identifier pattern when loaded.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct SchemaConfig {
        // ---
        pub acad_user_table: String,
        pub user_name_column: String,
        pub domain_name_column: String,
        pub last_ping_column: String,

        /// External user directory.
        pub user_table: String,
        pub user_login_column: String,
        pub user_organisation_column: String,

        pub applications_table: String,
        pub app_name_column: String,

        pub usage_table: String,
        pub usage_date_column: String,
        pub application_fid_column: String,
        pub app_version_column: String,
        pub minutes_column: String,
        pub organisation_fid_column: String,

        /// External organisation table.
        pub organisation_table: String,
        pub organisation_name_column: String,
        pub organisation_short_name_column: String,

        pub unknown_value: String,
    }

    impl Default for SchemaConfig {
        fn default() -> Self {
            // ---
            Self {
                acad_user_table: "acad_user".to_string(),
                user_name_column: "user_name".to_string(),
                domain_name_column: "domain_name".to_string(),
                last_ping_column: "last_ping".to_string(),
                user_table: "users".to_string(),
                user_login_column: "login".to_string(),
                user_organisation_column: "fid_organisation".to_string(),
                applications_table: "acad_application".to_string(),
                app_name_column: "name".to_string(),
                usage_table: "acad_usage".to_string(),
                usage_date_column: "date_of_usage".to_string(),
                application_fid_column: "fid_application".to_string(),
                app_version_column: "app_version".to_string(),
                minutes_column: "minutes".to_string(),
                organisation_fid_column: "fid_organisation".to_string(),
                organisation_table: "organisation".to_string(),
                organisation_name_column: "name".to_string(),
                organisation_short_name_column: "short_name".to_string(),
                unknown_value: "unknown".to_string(),
            }
        }
    }

    impl SchemaConfig {
        /// Builds a [`SchemaConfig`] from environment variables, falling
        /// back to the defaults for anything unset.
        ///
        /// # Errors
        /// Returns an error if any identifier is not a plain SQL identifier.
        pub fn from_env() -> Result<Self> {
            // ---
            let d = Self::default();
            let cfg = Self {
                acad_user_table: optional_env!("USAGE_ACAD_USER_TABLE", d.acad_user_table),
                user_name_column: optional_env!("USAGE_USER_NAME_COLUMN", d.user_name_column),
                domain_name_column: optional_env!("USAGE_DOMAIN_NAME_COLUMN", d.domain_name_column),
                last_ping_column: optional_env!("USAGE_LAST_PING_COLUMN", d.last_ping_column),
                user_table: optional_env!("USAGE_USER_TABLE", d.user_table),
                user_login_column: optional_env!("USAGE_USER_LOGIN_COLUMN", d.user_login_column),
                user_organisation_column: optional_env!(
                    "USAGE_USER_ORGANISATION_COLUMN",
                    d.user_organisation_column
                ),
                applications_table: optional_env!("USAGE_APPLICATIONS_TABLE", d.applications_table),
                app_name_column: optional_env!("USAGE_APP_NAME_COLUMN", d.app_name_column),
                usage_table: optional_env!("USAGE_DATA_TABLE", d.usage_table),
                usage_date_column: optional_env!("USAGE_DATE_COLUMN", d.usage_date_column),
                application_fid_column: optional_env!(
                    "USAGE_APPLICATION_FID_COLUMN",
                    d.application_fid_column
                ),
                app_version_column: optional_env!("USAGE_APP_VERSION_COLUMN", d.app_version_column),
                minutes_column: optional_env!("USAGE_MINUTES_COLUMN", d.minutes_column),
                organisation_fid_column: optional_env!(
                    "USAGE_ORGANISATION_FID_COLUMN",
                    d.organisation_fid_column
                ),
                organisation_table: optional_env!("USAGE_ORGANISATION_TABLE", d.organisation_table),
                organisation_name_column: optional_env!(
                    "USAGE_ORGANISATION_NAME_COLUMN",
                    d.organisation_name_column
                ),
                organisation_short_name_column: optional_env!(
                    "USAGE_ORGANISATION_SHORT_NAME_COLUMN",
                    d.organisation_short_name_column
                ),
                unknown_value: optional_env!("USAGE_UNKNOWN_VALUE", d.unknown_value),
            };

            cfg.validate()?;
            Ok(cfg)
        }

        /// Checks every identifier against the plain-identifier pattern.
        ///
        /// # Errors
        /// Names the first offending field.
        pub fn validate(&self) -> Result<()> {
            // ---
            let pattern = Regex::new(IDENTIFIER_PATTERN)?;

            for (field, value) in self.identifiers() {
                if !pattern.is_match(value) {
                    anyhow::bail!("Invalid SQL identifier for {field}: '{value}'");
                }
            }
            if self.unknown_value.is_empty() {
                anyhow::bail!("Unknown sentinel value must not be empty");
            }
            Ok(())
        }

        fn identifiers(&self) -> [(&'static str, &str); 18] {
            // ---
            [
                ("acad_user_table", self.acad_user_table.as_str()),
                ("user_name_column", self.user_name_column.as_str()),
                ("domain_name_column", self.domain_name_column.as_str()),
                ("last_ping_column", self.last_ping_column.as_str()),
                ("user_table", self.user_table.as_str()),
                ("user_login_column", self.user_login_column.as_str()),
                ("user_organisation_column", self.user_organisation_column.as_str()),
                ("applications_table", self.applications_table.as_str()),
                ("app_name_column", self.app_name_column.as_str()),
                ("usage_table", self.usage_table.as_str()),
                ("usage_date_column", self.usage_date_column.as_str()),
                ("application_fid_column", self.application_fid_column.as_str()),
                ("app_version_column", self.app_version_column.as_str()),
                ("minutes_column", self.minutes_column.as_str()),
                ("organisation_fid_column", self.organisation_fid_column.as_str()),
                ("organisation_table", self.organisation_table.as_str()),
                ("organisation_name_column", self.organisation_name_column.as_str()),
                (
                    "organisation_short_name_column",
                    self.organisation_short_name_column.as_str(),
                ),
            ]
        }
    }
}
pub use schema::SchemaConfig;

// ============================================================
// Tests
// ============================================================
