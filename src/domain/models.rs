use super::errors::PingError;
use chrono::{NaiveDate, NaiveDateTime};

/// Organisation id recorded for users that have no entry in the user directory.
pub const UNKNOWN_ORGANISATION_ID: i64 = -1;

/// Minutes credited to a usage record each time a ping opens a new bucket.
pub const MINUTES_PER_BUCKET: i64 = 10;

/// Applications the metering clients report on.
///
/// The set is closed: it is seeded once at bootstrap and never extended
/// while serving pings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Application {
    // ---
    Unknown,
    AutoCad,
    AutoCadMap,
    Civil3d,
}

impl Application {
    // ---
    pub const ALL: [Application; 4] = [
        Application::Unknown,
        Application::AutoCad,
        Application::AutoCadMap,
        Application::Civil3d,
    ];

    /// Numeric code used by clients (`appCode`) and as the row id.
    pub fn code(self) -> i32 {
        // ---
        match self {
            Application::Unknown => 0,
            Application::AutoCad => 1,
            Application::AutoCadMap => 2,
            Application::Civil3d => 3,
        }
    }

    /// Display name stored in the application table.
    ///
    /// The unknown entry carries the configured sentinel instead of a fixed name.
    pub fn display_name(self, unknown_value: &str) -> String {
        // ---
        match self {
            Application::Unknown => unknown_value.to_string(),
            Application::AutoCad => "AutoCAD".to_string(),
            Application::AutoCadMap => "AutoCAD Map".to_string(),
            Application::Civil3d => "Civil 3D".to_string(),
        }
    }
}

/// One row of the application reference table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationRow {
    pub id: i32,
    pub name: String,
}

/// Normalised (lower-cased) identity of a metered user.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UserIdentity {
    // ---
    pub username: String,
    pub domain: String,
}

impl UserIdentity {
    // ---
    pub fn new(username: &str, domain: &str) -> Self {
        // ---
        Self {
            username: username.to_lowercase(),
            domain: domain.to_lowercase(),
        }
    }
}

/// A user row as stored by the metering tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeteredUser {
    // ---
    pub id: i64,
    pub username: String,
    pub domain: String,
    pub last_ping: Option<NaiveDateTime>,
}

/// Logical key of a usage record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UsageKey {
    // ---
    pub organisation_id: i64,
    pub day: NaiveDate,
    pub application_id: i32,
    pub version: String,
}

/// A usage record row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageRecord {
    // ---
    pub id: i64,
    pub organisation_id: i64,
    pub day: NaiveDate,
    pub application_id: i32,
    pub version: String,
    pub minutes: i64,
}

impl UsageRecord {
    // ---
    pub fn key(&self) -> UsageKey {
        // ---
        UsageKey {
            organisation_id: self.organisation_id,
            day: self.day,
            application_id: self.application_id,
            version: self.version.clone(),
        }
    }
}

/// Raw ping parameters as received from a client.
#[derive(Debug, Clone, Default)]
pub struct PingParams {
    // ---
    pub user_name: Option<String>,
    pub domain_name: Option<String>,
    pub app_code: Option<i32>,
    pub version: Option<String>,
}

impl PingParams {
    // ---
    /// Builds parameters from raw query pairs.
    ///
    /// Client versions disagree on the casing of parameter names, and some
    /// send the same parameter twice under different spellings. Names are
    /// matched case-insensitively and the first non-empty value wins.
    ///
    /// # Errors
    /// `InvalidAppCode` when the first non-empty `appCode` is not an integer.
    pub fn from_query<I>(pairs: I) -> Result<Self, PingError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        // ---
        let mut params = PingParams::default();
        let mut app_code: Option<String> = None;

        for (name, value) in pairs {
            if value.is_empty() {
                continue;
            }
            let slot = if name.eq_ignore_ascii_case("userName") {
                &mut params.user_name
            } else if name.eq_ignore_ascii_case("domainName") {
                &mut params.domain_name
            } else if name.eq_ignore_ascii_case("appCode") {
                &mut app_code
            } else if name.eq_ignore_ascii_case("version") {
                &mut params.version
            } else {
                continue;
            };
            if slot.is_none() {
                *slot = Some(value);
            }
        }

        params.app_code = app_code
            .map(|raw| raw.trim().parse::<i32>().map_err(|_| PingError::InvalidAppCode))
            .transpose()?;
        Ok(params)
    }
}

/// A validated, normalised ping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ping {
    // ---
    pub identity: UserIdentity,
    pub application_id: i32,
    pub version: String,
}

/// What a successfully recorded ping changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingOutcome {
    // ---
    pub user_created: bool,
    pub minutes_accrued: bool,
    pub organisation_id: i64,
}
