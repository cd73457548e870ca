use super::errors::StoreError;
use super::models::{ApplicationRow, MeteredUser, UsageKey, UserIdentity};
use chrono::NaiveDateTime;
use std::sync::Arc;

/// Storage used while serving pings.
#[async_trait::async_trait]
pub trait UsageStore: Send + Sync {
    // ---
    /// Open a transaction. Dropping it without `commit` discards its writes.
    async fn begin(&self) -> Result<Box<dyn PingTransaction>, StoreError>;

    /// Cheap round trip used by the full health check.
    async fn check_health(&self) -> Result<(), StoreError>;
}

/// Type alias for any backend that implements UsageStore.
pub type UsageStorePtr = Arc<dyn UsageStore>;

/// Statements a ping issues, scoped to one transaction.
#[async_trait::async_trait]
pub trait PingTransaction: Send {
    // ---
    /// Look up a metered user by normalised identity.
    async fn find_user(&mut self, identity: &UserIdentity) -> Result<Option<MeteredUser>, StoreError>;

    /// Insert a metered user with its first ping time.
    async fn insert_user(&mut self, identity: &UserIdentity, last_ping: NaiveDateTime) -> Result<(), StoreError>;

    /// Overwrite the stored last ping of a user.
    async fn update_last_ping(&mut self, user_id: i64, last_ping: NaiveDateTime) -> Result<(), StoreError>;

    /// Organisation of a login in the external user directory.
    async fn organisation_of(&mut self, username: &str) -> Result<Option<i64>, StoreError>;

    async fn usage_record_exists(&mut self, key: &UsageKey) -> Result<bool, StoreError>;

    /// Insert a usage record with zero minutes.
    async fn insert_usage_record(&mut self, key: &UsageKey) -> Result<(), StoreError>;

    async fn add_minutes(&mut self, key: &UsageKey, minutes: i64) -> Result<(), StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

/// Schema objects owned by the metering service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemaObject {
    // ---
    UserSequence,
    UserTable,
    ApplicationTable,
    UsageSequence,
    UsageTable,
}

impl SchemaObject {
    // ---
    /// Creation order; later objects may reference earlier ones.
    pub const CREATION_ORDER: [SchemaObject; 5] = [
        SchemaObject::UserSequence,
        SchemaObject::UserTable,
        SchemaObject::ApplicationTable,
        SchemaObject::UsageSequence,
        SchemaObject::UsageTable,
    ];

    pub fn name(self) -> &'static str {
        // ---
        match self {
            SchemaObject::UserSequence => "user sequence",
            SchemaObject::UserTable => "user table",
            SchemaObject::ApplicationTable => "application table",
            SchemaObject::UsageSequence => "usage sequence",
            SchemaObject::UsageTable => "usage table",
        }
    }
}

/// DDL and reference-data statements used by the bootstrapper.
#[async_trait::async_trait]
pub trait SchemaStore: Send + Sync {
    // ---
    async fn create(&self, object: SchemaObject) -> Result<(), StoreError>;

    async fn count_applications(&self) -> Result<i64, StoreError>;

    /// Insert every row in one transaction; nothing is kept if any insert fails.
    async fn seed_applications(&self, rows: &[ApplicationRow]) -> Result<(), StoreError>;

    /// Insert the `-1` organisation used for users outside the directory.
    async fn insert_unknown_organisation(&self, name: &str) -> Result<(), StoreError>;
}

/// Type alias for any backend that implements SchemaStore.
pub type SchemaStorePtr = Arc<dyn SchemaStore>;
