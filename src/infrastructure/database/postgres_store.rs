use super::queries::Queries;
use crate::config::SchemaConfig;
use crate::domain::{
    ApplicationRow, MeteredUser, PingTransaction, SchemaObject, SchemaStore, StoreError, UsageKey,
    UsageStore, UserIdentity,
};
use chrono::NaiveDateTime;
use sqlx::{PgPool, Postgres, Transaction};
use std::sync::Arc;

// SQLSTATEs treated as "object already exists".
const DUPLICATE_TABLE: &str = "42P07";
const DUPLICATE_OBJECT: &str = "42710";
const UNIQUE_VIOLATION: &str = "23505";

/// Maps driver errors, singling out the "already exists" family.
pub(super) fn classify(err: sqlx::Error) -> StoreError {
    // ---
    let code = err
        .as_database_error()
        .and_then(|db| db.code())
        .map(|code| code.into_owned());

    match code.as_deref() {
        Some(DUPLICATE_TABLE | DUPLICATE_OBJECT | UNIQUE_VIOLATION) => {
            StoreError::AlreadyExists(err.to_string())
        }
        _ => StoreError::Sql(err),
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    fid: i64,
    last_ping: Option<NaiveDateTime>,
}

pub fn create_postgres_store(pool: PgPool, schema: &SchemaConfig) -> PostgresStore {
    // ---
    PostgresStore::new(pool, schema)
}

/// Postgres-backed storage for pings and bootstrap.
#[derive(Clone)]
pub struct PostgresStore {
    // ---
    pool: PgPool,
    queries: Arc<Queries>,
}

impl PostgresStore {
    // ---
    pub fn new(pool: PgPool, schema: &SchemaConfig) -> Self {
        // ---
        Self {
            pool,
            queries: Arc::new(Queries::new(schema)),
        }
    }
}

#[async_trait::async_trait]
impl UsageStore for PostgresStore {
    // ---
    async fn begin(&self) -> Result<Box<dyn PingTransaction>, StoreError> {
        // ---
        let tx = self.pool.begin().await?;
        Ok(Box::new(PostgresTransaction {
            tx,
            queries: Arc::clone(&self.queries),
        }))
    }

    async fn check_health(&self) -> Result<(), StoreError> {
        // ---
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl SchemaStore for PostgresStore {
    // ---
    async fn create(&self, object: SchemaObject) -> Result<(), StoreError> {
        // ---
        sqlx::query(self.queries.ddl(object))
            .execute(&self.pool)
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn count_applications(&self) -> Result<i64, StoreError> {
        // ---
        let (count,): (i64,) = sqlx::query_as(&self.queries.count_applications)
            .fetch_one(&self.pool)
            .await
            .map_err(classify)?;
        Ok(count)
    }

    async fn seed_applications(&self, rows: &[ApplicationRow]) -> Result<(), StoreError> {
        // ---
        let mut tx = self.pool.begin().await?;

        for row in rows {
            // On error `tx` is dropped, which rolls the partial seed back.
            sqlx::query(&self.queries.insert_application)
                .bind(row.id)
                .bind(&row.name)
                .execute(&mut *tx)
                .await
                .map_err(classify)?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn insert_unknown_organisation(&self, name: &str) -> Result<(), StoreError> {
        // ---
        sqlx::query(&self.queries.insert_unknown_organisation)
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(classify)?;
        Ok(())
    }
}

/// One request-scoped transaction. Dropping it rolls back.
struct PostgresTransaction {
    tx: Transaction<'static, Postgres>,
    queries: Arc<Queries>,
}

#[async_trait::async_trait]
impl PingTransaction for PostgresTransaction {
    // ---
    async fn find_user(&mut self, identity: &UserIdentity) -> Result<Option<MeteredUser>, StoreError> {
        // ---
        let row: Option<UserRow> = sqlx::query_as(&self.queries.find_user)
            .bind(&identity.username)
            .bind(&identity.domain)
            .fetch_optional(&mut *self.tx)
            .await?;

        Ok(row.map(|r| MeteredUser {
            id: r.fid,
            username: identity.username.clone(),
            domain: identity.domain.clone(),
            last_ping: r.last_ping,
        }))
    }

    async fn insert_user(&mut self, identity: &UserIdentity, last_ping: NaiveDateTime) -> Result<(), StoreError> {
        // ---
        sqlx::query(&self.queries.insert_user)
            .bind(&identity.username)
            .bind(&identity.domain)
            .bind(last_ping)
            .execute(&mut *self.tx)
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn update_last_ping(&mut self, user_id: i64, last_ping: NaiveDateTime) -> Result<(), StoreError> {
        // ---
        sqlx::query(&self.queries.update_last_ping)
            .bind(last_ping)
            .bind(user_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn organisation_of(&mut self, username: &str) -> Result<Option<i64>, StoreError> {
        // ---
        let row: Option<(Option<i64>,)> = sqlx::query_as(&self.queries.organisation_of)
            .bind(username)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row.and_then(|(organisation_id,)| organisation_id))
    }

    async fn usage_record_exists(&mut self, key: &UsageKey) -> Result<bool, StoreError> {
        // ---
        let row: Option<(i32,)> = sqlx::query_as(&self.queries.usage_exists)
            .bind(key.organisation_id)
            .bind(key.day)
            .bind(key.application_id)
            .bind(&key.version)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row.is_some())
    }

    async fn insert_usage_record(&mut self, key: &UsageKey) -> Result<(), StoreError> {
        // ---
        sqlx::query(&self.queries.insert_usage)
            .bind(key.day)
            .bind(key.application_id)
            .bind(&key.version)
            .bind(key.organisation_id)
            .execute(&mut *self.tx)
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn add_minutes(&mut self, key: &UsageKey, minutes: i64) -> Result<(), StoreError> {
        // ---
        sqlx::query(&self.queries.add_minutes)
            .bind(minutes)
            .bind(key.day)
            .bind(key.organisation_id)
            .bind(key.application_id)
            .bind(&key.version)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        // ---
        self.tx.commit().await?;
        Ok(())
    }
}
