//! In-process implementation of the storage traits.
//!
//! Writes apply to the shared tables immediately and are recorded in an undo
//! log; a transaction dropped without `commit` replays the log backwards.
//! Unique constraints mirror the Postgres schema: one user per
//! (username, domain), one application per id, one organisation per id.

use crate::domain::{
    ApplicationRow, MeteredUser, PingTransaction, SchemaObject, SchemaStore, StoreError, UsageKey,
    UsageRecord, UsageStore, UserIdentity,
};
use chrono::NaiveDateTime;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Statements that can be made to fail once, for exercising error paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultPoint {
    // ---
    Begin,
    HealthCheck,
    FindUser,
    InsertUser,
    UpdateLastPing,
    OrganisationLookup,
    UsageLookup,
    InsertUsageRecord,
    AddMinutes,
    Commit,
    Create(SchemaObject),
    CountApplications,
    SeedApplications,
    InsertOrganisation,
}

#[derive(Default)]
struct Tables {
    schema: HashSet<SchemaObject>,
    users: Vec<MeteredUser>,
    next_user_id: i64,
    applications: BTreeMap<i32, String>,
    usage: Vec<UsageRecord>,
    next_usage_id: i64,
    organisations: BTreeMap<i64, String>,
    directory: HashMap<String, i64>,
    faults: HashSet<FaultPoint>,
}

impl Tables {
    // ---
    fn trip(&mut self, point: FaultPoint) -> Result<(), StoreError> {
        // ---
        if self.faults.remove(&point) {
            return Err(StoreError::Backend(format!("injected fault at {point:?}")));
        }
        Ok(())
    }

    fn usage_mut(&mut self, key: &UsageKey) -> Option<&mut UsageRecord> {
        // ---
        self.usage.iter_mut().find(|record| record.key() == *key)
    }
}

enum Undo {
    RemoveUser(i64),
    RestoreLastPing(i64, Option<NaiveDateTime>),
    RemoveUsage(i64),
    SubtractMinutes(i64, i64),
}

/// Shared in-memory tables implementing both `UsageStore` and `SchemaStore`.
#[derive(Clone, Default)]
pub struct MemoryStore {
    // ---
    tables: Arc<Mutex<Tables>>,
}

fn lock(tables: &Mutex<Tables>) -> MutexGuard<'_, Tables> {
    // ---
    tables.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MemoryStore {
    // ---
    pub fn new() -> Self {
        // ---
        Self::default()
    }

    /// Arms a one-shot failure for the next statement of the given kind.
    pub fn inject_fault(&self, point: FaultPoint) {
        // ---
        lock(&self.tables).faults.insert(point);
    }

    /// Adds a login to the simulated external user directory.
    pub fn register_directory_entry(&self, login: &str, organisation_id: i64) {
        // ---
        lock(&self.tables)
            .directory
            .insert(login.to_string(), organisation_id);
    }

    pub fn users(&self) -> Vec<MeteredUser> {
        // ---
        lock(&self.tables).users.clone()
    }

    pub fn usage_records(&self) -> Vec<UsageRecord> {
        // ---
        lock(&self.tables).usage.clone()
    }

    pub fn applications(&self) -> Vec<ApplicationRow> {
        // ---
        lock(&self.tables)
            .applications
            .iter()
            .map(|(id, name)| ApplicationRow {
                id: *id,
                name: name.clone(),
            })
            .collect()
    }

    pub fn organisation_name(&self, id: i64) -> Option<String> {
        // ---
        lock(&self.tables).organisations.get(&id).cloned()
    }

    pub fn has_schema_object(&self, object: SchemaObject) -> bool {
        // ---
        lock(&self.tables).schema.contains(&object)
    }
}

#[async_trait::async_trait]
impl UsageStore for MemoryStore {
    // ---
    async fn begin(&self) -> Result<Box<dyn PingTransaction>, StoreError> {
        // ---
        lock(&self.tables).trip(FaultPoint::Begin)?;
        Ok(Box::new(MemoryTransaction {
            tables: Arc::clone(&self.tables),
            undo: Vec::new(),
            committed: false,
        }))
    }

    async fn check_health(&self) -> Result<(), StoreError> {
        // ---
        lock(&self.tables).trip(FaultPoint::HealthCheck)
    }
}

#[async_trait::async_trait]
impl SchemaStore for MemoryStore {
    // ---
    async fn create(&self, object: SchemaObject) -> Result<(), StoreError> {
        // ---
        let mut tables = lock(&self.tables);
        tables.trip(FaultPoint::Create(object))?;
        if !tables.schema.insert(object) {
            return Err(StoreError::AlreadyExists(object.name().to_string()));
        }
        Ok(())
    }

    async fn count_applications(&self) -> Result<i64, StoreError> {
        // ---
        let mut tables = lock(&self.tables);
        tables.trip(FaultPoint::CountApplications)?;
        Ok(tables.applications.len() as i64)
    }

    async fn seed_applications(&self, rows: &[ApplicationRow]) -> Result<(), StoreError> {
        // ---
        let mut tables = lock(&self.tables);
        let mut staged = tables.applications.clone();

        for (index, row) in rows.iter().enumerate() {
            if index + 1 == rows.len() {
                tables.trip(FaultPoint::SeedApplications)?;
            }
            if staged.insert(row.id, row.name.clone()).is_some() {
                return Err(StoreError::AlreadyExists(format!("application {}", row.id)));
            }
        }

        tables.applications = staged;
        Ok(())
    }

    async fn insert_unknown_organisation(&self, name: &str) -> Result<(), StoreError> {
        // ---
        let mut tables = lock(&self.tables);
        tables.trip(FaultPoint::InsertOrganisation)?;
        if tables.organisations.contains_key(&-1) {
            return Err(StoreError::AlreadyExists("organisation -1".to_string()));
        }
        tables.organisations.insert(-1, name.to_string());
        Ok(())
    }
}

struct MemoryTransaction {
    tables: Arc<Mutex<Tables>>,
    undo: Vec<Undo>,
    committed: bool,
}

#[async_trait::async_trait]
impl PingTransaction for MemoryTransaction {
    // ---
    async fn find_user(&mut self, identity: &UserIdentity) -> Result<Option<MeteredUser>, StoreError> {
        // ---
        let mut tables = lock(&self.tables);
        tables.trip(FaultPoint::FindUser)?;
        Ok(tables
            .users
            .iter()
            .find(|u| u.username == identity.username && u.domain == identity.domain)
            .cloned())
    }

    async fn insert_user(&mut self, identity: &UserIdentity, last_ping: NaiveDateTime) -> Result<(), StoreError> {
        // ---
        let mut tables = lock(&self.tables);
        tables.trip(FaultPoint::InsertUser)?;

        let duplicate = tables
            .users
            .iter()
            .any(|u| u.username == identity.username && u.domain == identity.domain);
        if duplicate {
            return Err(StoreError::AlreadyExists(format!(
                "user {}@{}",
                identity.username, identity.domain
            )));
        }

        tables.next_user_id += 1;
        let id = tables.next_user_id;
        tables.users.push(MeteredUser {
            id,
            username: identity.username.clone(),
            domain: identity.domain.clone(),
            last_ping: Some(last_ping),
        });
        self.undo.push(Undo::RemoveUser(id));
        Ok(())
    }

    async fn update_last_ping(&mut self, user_id: i64, last_ping: NaiveDateTime) -> Result<(), StoreError> {
        // ---
        let mut tables = lock(&self.tables);
        tables.trip(FaultPoint::UpdateLastPing)?;
        if let Some(user) = tables.users.iter_mut().find(|u| u.id == user_id) {
            self.undo.push(Undo::RestoreLastPing(user_id, user.last_ping));
            user.last_ping = Some(last_ping);
        }
        Ok(())
    }

    async fn organisation_of(&mut self, username: &str) -> Result<Option<i64>, StoreError> {
        // ---
        let mut tables = lock(&self.tables);
        tables.trip(FaultPoint::OrganisationLookup)?;
        Ok(tables.directory.get(username).copied())
    }

    async fn usage_record_exists(&mut self, key: &UsageKey) -> Result<bool, StoreError> {
        // ---
        let mut tables = lock(&self.tables);
        tables.trip(FaultPoint::UsageLookup)?;
        Ok(tables.usage_mut(key).is_some())
    }

    async fn insert_usage_record(&mut self, key: &UsageKey) -> Result<(), StoreError> {
        // ---
        let mut tables = lock(&self.tables);
        tables.trip(FaultPoint::InsertUsageRecord)?;

        tables.next_usage_id += 1;
        let id = tables.next_usage_id;
        tables.usage.push(UsageRecord {
            id,
            organisation_id: key.organisation_id,
            day: key.day,
            application_id: key.application_id,
            version: key.version.clone(),
            minutes: 0,
        });
        self.undo.push(Undo::RemoveUsage(id));
        Ok(())
    }

    async fn add_minutes(&mut self, key: &UsageKey, minutes: i64) -> Result<(), StoreError> {
        // ---
        let mut tables = lock(&self.tables);
        tables.trip(FaultPoint::AddMinutes)?;
        if let Some(record) = tables.usage_mut(key) {
            record.minutes += minutes;
            let id = record.id;
            self.undo.push(Undo::SubtractMinutes(id, minutes));
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        // ---
        let mut this = self;
        lock(&this.tables).trip(FaultPoint::Commit)?;
        this.committed = true;
        this.undo.clear();
        Ok(())
    }
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        // ---
        if self.committed || self.undo.is_empty() {
            return;
        }

        let mut tables = lock(&self.tables);
        for step in self.undo.drain(..).rev() {
            match step {
                Undo::RemoveUser(id) => tables.users.retain(|u| u.id != id),
                Undo::RestoreLastPing(id, previous) => {
                    if let Some(user) = tables.users.iter_mut().find(|u| u.id == id) {
                        user.last_ping = previous;
                    }
                }
                Undo::RemoveUsage(id) => tables.usage.retain(|r| r.id != id),
                Undo::SubtractMinutes(id, minutes) => {
                    if let Some(record) = tables.usage.iter_mut().find(|r| r.id == id) {
                        record.minutes -= minutes;
                    }
                }
            }
        }
    }
}
