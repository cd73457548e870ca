/// Failures reported by a storage backend.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    // ---
    /// The schema object or unique row being created is already present.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("database error: {0}")]
    Sql(#[from] sqlx::Error),

    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    // ---
    /// True for the benign "object already exists" class of failures.
    pub fn is_already_exists(&self) -> bool {
        // ---
        matches!(self, StoreError::AlreadyExists(_))
    }
}

/// Failures of a single ping request.
#[derive(thiserror::Error, Debug)]
pub enum PingError {
    // ---
    #[error("No user name provided")]
    MissingUserName,

    #[error("No domain name provided")]
    MissingDomainName,

    #[error("Invalid application code")]
    InvalidAppCode,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl PingError {
    // ---
    /// True when the request itself was invalid and storage was never touched.
    pub fn is_client_error(&self) -> bool {
        // ---
        matches!(
            self,
            PingError::MissingUserName | PingError::MissingDomainName | PingError::InvalidAppCode
        )
    }

    /// Short label used for logs and metrics.
    pub fn reason(&self) -> &'static str {
        // ---
        match self {
            PingError::MissingUserName => "missing_user_name",
            PingError::MissingDomainName => "missing_domain_name",
            PingError::InvalidAppCode => "invalid_app_code",
            PingError::Store(_) => "storage",
        }
    }
}
