//! Ping aggregation.
//!
//! A ping resolves (or creates) its user, advances the user's last ping,
//! and credits ten minutes to the matching usage record whenever it lands in
//! a bucket the user has not pinged in yet.

use super::bucket::opens_new_bucket;
use super::clock::ClockPtr;
use super::errors::{PingError, StoreError};
use super::keyed_lock::KeyedLocks;
use super::models::{
    Application, Ping, PingOutcome, PingParams, UsageKey, UserIdentity, MINUTES_PER_BUCKET,
    UNKNOWN_ORGANISATION_ID,
};
use super::repository::{PingTransaction, UsageStorePtr};
use chrono::NaiveDateTime;
use std::str::FromStr;

/// How the statements of one ping are grouped into transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Consistency {
    // ---
    /// One transaction per ping. A failure leaves nothing behind.
    #[default]
    Atomic,

    /// User update, record creation and minute increment commit separately.
    /// A failure after the user phase leaves last ping advanced without the
    /// matching minutes.
    PerStep,
}

impl FromStr for Consistency {
    // ---
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        // ---
        match value.trim().to_ascii_lowercase().as_str() {
            "atomic" => Ok(Consistency::Atomic),
            "per-step" | "per_step" => Ok(Consistency::PerStep),
            other => Err(anyhow::anyhow!(
                "unknown ping consistency mode '{other}' (expected 'atomic' or 'per-step')"
            )),
        }
    }
}

enum UserResolution {
    Created,
    Existing { previous_ping: Option<NaiveDateTime> },
}

impl UserResolution {
    // ---
    fn user_created(&self) -> bool {
        // ---
        matches!(self, UserResolution::Created)
    }

    fn opens_bucket(&self, now: NaiveDateTime) -> bool {
        // ---
        match self {
            UserResolution::Created => opens_new_bucket(true, None, now),
            UserResolution::Existing { previous_ping } => opens_new_bucket(false, *previous_ping, now),
        }
    }
}

/// Turns pings into user updates and usage minutes.
pub struct PingAggregator {
    // ---
    store: UsageStorePtr,
    clock: ClockPtr,
    unknown_value: String,
    consistency: Consistency,
    user_locks: KeyedLocks<UserIdentity>,
    usage_locks: KeyedLocks<UsageKey>,
}

impl PingAggregator {
    // ---
    pub fn new(
        store: UsageStorePtr,
        clock: ClockPtr,
        unknown_value: impl Into<String>,
        consistency: Consistency,
    ) -> Self {
        // ---
        Self {
            store,
            clock,
            unknown_value: unknown_value.into(),
            consistency,
            user_locks: KeyedLocks::new(),
            usage_locks: KeyedLocks::new(),
        }
    }

    pub fn consistency(&self) -> Consistency {
        // ---
        self.consistency
    }

    /// Validates and lower-cases raw ping parameters.
    ///
    /// # Errors
    /// `MissingUserName` or `MissingDomainName` when either is absent or empty
    /// (the user name is checked first).
    pub fn normalize(&self, params: PingParams) -> Result<Ping, PingError> {
        // ---
        let user_name = non_empty(params.user_name).ok_or(PingError::MissingUserName)?;
        let domain_name = non_empty(params.domain_name).ok_or(PingError::MissingDomainName)?;
        let version = non_empty(params.version)
            .unwrap_or_else(|| self.unknown_value.clone())
            .to_lowercase();

        Ok(Ping {
            identity: UserIdentity::new(&user_name, &domain_name),
            application_id: params.app_code.unwrap_or(Application::Unknown.code()),
            version,
        })
    }

    /// Records one ping at the current clock time.
    ///
    /// # Errors
    /// Client errors from [`normalize`](Self::normalize) without touching
    /// storage, or `PingError::Store` when any storage step fails.
    pub async fn record(&self, params: PingParams) -> Result<PingOutcome, PingError> {
        // ---
        let ping = self.normalize(params)?;
        let now = self.clock.now();

        let outcome = match self.consistency {
            Consistency::Atomic => self.record_atomic(&ping, now).await?,
            Consistency::PerStep => self.record_per_step(&ping, now).await?,
        };

        tracing::debug!(
            username = %ping.identity.username,
            domain = %ping.identity.domain,
            user_created = outcome.user_created,
            minutes_accrued = outcome.minutes_accrued,
            "ping recorded"
        );

        Ok(outcome)
    }

    async fn record_atomic(&self, ping: &Ping, now: NaiveDateTime) -> Result<PingOutcome, StoreError> {
        // ---
        // The user key stays held until commit so a concurrent ping of the
        // same user sees either nothing or the committed last ping.
        let _user_guard = self.user_locks.lock(&ping.identity).await;
        let mut tx = self.store.begin().await?;

        let resolution = resolve_user(tx.as_mut(), &ping.identity, now).await?;
        let organisation_id = resolve_organisation(tx.as_mut(), &ping.identity.username).await?;

        if !resolution.opens_bucket(now) {
            tx.commit().await?;
            return Ok(PingOutcome {
                user_created: resolution.user_created(),
                minutes_accrued: false,
                organisation_id,
            });
        }

        let key = self.usage_key(ping, organisation_id, now);

        // Lock order is always user, then usage key.
        let _usage_guard = self.usage_locks.lock(&key).await;
        ensure_usage_record(tx.as_mut(), &key).await?;
        tx.add_minutes(&key, MINUTES_PER_BUCKET).await?;
        tx.commit().await?;

        Ok(PingOutcome {
            user_created: resolution.user_created(),
            minutes_accrued: true,
            organisation_id,
        })
    }

    async fn record_per_step(&self, ping: &Ping, now: NaiveDateTime) -> Result<PingOutcome, StoreError> {
        // ---
        let resolution = {
            let _user_guard = self.user_locks.lock(&ping.identity).await;
            let mut tx = self.store.begin().await?;
            let resolution = resolve_user(tx.as_mut(), &ping.identity, now).await?;
            tx.commit().await?;
            resolution
        };

        let organisation_id = {
            let mut tx = self.store.begin().await?;
            let organisation_id = resolve_organisation(tx.as_mut(), &ping.identity.username).await?;
            tx.commit().await?;
            organisation_id
        };

        if !resolution.opens_bucket(now) {
            return Ok(PingOutcome {
                user_created: resolution.user_created(),
                minutes_accrued: false,
                organisation_id,
            });
        }

        let key = self.usage_key(ping, organisation_id, now);

        {
            let _usage_guard = self.usage_locks.lock(&key).await;
            let mut tx = self.store.begin().await?;
            ensure_usage_record(tx.as_mut(), &key).await?;
            tx.commit().await?;
        }

        let mut tx = self.store.begin().await?;
        tx.add_minutes(&key, MINUTES_PER_BUCKET).await?;
        tx.commit().await?;

        Ok(PingOutcome {
            user_created: resolution.user_created(),
            minutes_accrued: true,
            organisation_id,
        })
    }

    fn usage_key(&self, ping: &Ping, organisation_id: i64, now: NaiveDateTime) -> UsageKey {
        // ---
        UsageKey {
            organisation_id,
            day: now.date(),
            application_id: ping.application_id,
            version: ping.version.clone(),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    // ---
    value.filter(|v| !v.is_empty())
}

async fn resolve_user(
    tx: &mut dyn PingTransaction,
    identity: &UserIdentity,
    now: NaiveDateTime,
) -> Result<UserResolution, StoreError> {
    // ---
    match tx.find_user(identity).await? {
        Some(user) => {
            tx.update_last_ping(user.id, now).await?;
            Ok(UserResolution::Existing {
                previous_ping: user.last_ping,
            })
        }
        None => {
            tx.insert_user(identity, now).await?;
            tracing::debug!(username = %identity.username, domain = %identity.domain, "created metered user");
            Ok(UserResolution::Created)
        }
    }
}

async fn resolve_organisation(tx: &mut dyn PingTransaction, username: &str) -> Result<i64, StoreError> {
    // ---
    let organisation_id = tx.organisation_of(username).await?;
    if organisation_id.is_none() {
        tracing::debug!(username, "no directory entry, using the unknown organisation");
    }
    Ok(organisation_id.unwrap_or(UNKNOWN_ORGANISATION_ID))
}

async fn ensure_usage_record(tx: &mut dyn PingTransaction, key: &UsageKey) -> Result<(), StoreError> {
    // ---
    if !tx.usage_record_exists(key).await? {
        tx.insert_usage_record(key).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::domain::clock::ManualClock;
    use crate::infrastructure::memory::{FaultPoint, MemoryStore};
    use chrono::NaiveDate;
    use std::sync::Arc;

    fn at(hour: u32, minute: u32) -> NaiveDateTime {
        // ---
        NaiveDate::from_ymd_opt(2024, 5, 14)
            .and_then(|d| d.and_hms_opt(hour, minute, 0))
            .unwrap()
    }

    fn params(user: &str, domain: &str, app: i32, version: Option<&str>) -> PingParams {
        // ---
        PingParams {
            user_name: Some(user.to_string()),
            domain_name: Some(domain.to_string()),
            app_code: Some(app),
            version: version.map(str::to_string),
        }
    }

    fn setup(consistency: Consistency, start: NaiveDateTime) -> (Arc<MemoryStore>, Arc<ManualClock>, PingAggregator) {
        // ---
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(start));
        let aggregator = PingAggregator::new(store.clone(), clock.clone(), "unknown", consistency);
        (store, clock, aggregator)
    }

    #[tokio::test]
    async fn first_ping_creates_user_and_ten_minutes() {
        // ---
        let (store, _clock, aggregator) = setup(Consistency::Atomic, at(9, 5));

        let outcome = aggregator
            .record(params("alice", "corp", 1, Some("2024")))
            .await
            .unwrap();

        assert!(outcome.user_created);
        assert!(outcome.minutes_accrued);
        assert_eq!(outcome.organisation_id, UNKNOWN_ORGANISATION_ID);

        let users = store.users();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].last_ping, Some(at(9, 5)));

        let records = store.usage_records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].minutes, 10);
        assert_eq!(records[0].day, at(9, 5).date());
        assert_eq!(records[0].application_id, 1);
        assert_eq!(records[0].version, "2024");
    }

    #[tokio::test]
    async fn same_bucket_advances_last_ping_only() {
        // ---
        for consistency in [Consistency::Atomic, Consistency::PerStep] {
            let (store, clock, aggregator) = setup(consistency, at(9, 5));

            aggregator.record(params("alice", "corp", 1, Some("2024"))).await.unwrap();
            clock.set(at(9, 9));
            let outcome = aggregator
                .record(params("alice", "corp", 1, Some("2024")))
                .await
                .unwrap();

            assert!(!outcome.user_created);
            assert!(!outcome.minutes_accrued);
            assert_eq!(store.users().len(), 1);
            assert_eq!(store.users()[0].last_ping, Some(at(9, 9)));
            assert_eq!(store.usage_records()[0].minutes, 10);

            clock.set(at(9, 11));
            let outcome = aggregator
                .record(params("alice", "corp", 1, Some("2024")))
                .await
                .unwrap();

            assert!(outcome.minutes_accrued);
            assert_eq!(store.usage_records().len(), 1);
            assert_eq!(store.usage_records()[0].minutes, 20);
        }
    }

    #[tokio::test]
    async fn crossing_a_boundary_adds_exactly_ten() {
        // ---
        let (store, clock, aggregator) = setup(Consistency::Atomic, at(8, 0));

        aggregator.record(params("bob", "corp", 2, None)).await.unwrap();
        clock.set(at(17, 45));
        aggregator.record(params("bob", "corp", 2, None)).await.unwrap();

        assert_eq!(store.usage_records()[0].minutes, 20);
    }

    #[tokio::test]
    async fn identity_and_version_are_normalised() {
        // ---
        let (store, clock, aggregator) = setup(Consistency::Atomic, at(9, 5));

        aggregator.record(params("Alice", "CORP", 1, Some(""))).await.unwrap();
        clock.set(at(9, 25));
        aggregator.record(params("alice", "corp", 1, None)).await.unwrap();
        clock.set(at(9, 35));
        aggregator.record(params("ALICE", "Corp", 1, Some("V2024"))).await.unwrap();

        let users = store.users();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].username, "alice");
        assert_eq!(users[0].domain, "corp");

        let mut records = store.usage_records();
        records.sort_by(|a, b| a.version.cmp(&b.version));
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].version, "unknown");
        assert_eq!(records[0].minutes, 20);
        assert_eq!(records[1].version, "v2024");
        assert_eq!(records[1].minutes, 10);
    }

    #[tokio::test]
    async fn missing_app_code_counts_as_unknown_application() {
        // ---
        let (store, _clock, aggregator) = setup(Consistency::Atomic, at(9, 5));

        let mut raw = params("carol", "corp", 0, Some("1.0"));
        raw.app_code = None;
        aggregator.record(raw).await.unwrap();

        assert_eq!(store.usage_records()[0].application_id, Application::Unknown.code());
    }

    #[tokio::test]
    async fn missing_identity_is_rejected_before_storage() {
        // ---
        let (store, _clock, aggregator) = setup(Consistency::Atomic, at(9, 5));
        store.inject_fault(FaultPoint::Begin);

        let mut raw = params("", "corp", 1, None);
        let err = aggregator.record(raw.clone()).await.unwrap_err();
        assert!(matches!(err, PingError::MissingUserName));

        raw.user_name = None;
        raw.domain_name = None;
        let err = aggregator.record(raw).await.unwrap_err();
        assert!(matches!(err, PingError::MissingUserName));

        let err = aggregator
            .record(params("dave", "", 1, None))
            .await
            .unwrap_err();
        assert!(matches!(err, PingError::MissingDomainName));
        assert!(err.is_client_error());

        assert!(store.users().is_empty());
        // the injected fault is still armed: nothing reached the store
        assert!(aggregator.record(params("dave", "corp", 1, None)).await.is_err());
    }

    #[tokio::test]
    async fn organisation_comes_from_directory_by_username() {
        // ---
        let (store, _clock, aggregator) = setup(Consistency::Atomic, at(9, 5));
        store.register_directory_entry("erin", 42);

        let outcome = aggregator.record(params("Erin", "corp", 3, Some("2023"))).await.unwrap();
        assert_eq!(outcome.organisation_id, 42);

        // another domain, same login: separate user, same organisation
        let outcome = aggregator.record(params("erin", "lab", 3, Some("2023"))).await.unwrap();
        assert_eq!(outcome.organisation_id, 42);

        assert_eq!(store.users().len(), 2);
        let records = store.usage_records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].organisation_id, 42);
        assert_eq!(records[0].minutes, 20);
    }

    #[tokio::test]
    async fn atomic_failure_leaves_no_partial_state() {
        // ---
        let (store, clock, aggregator) = setup(Consistency::Atomic, at(9, 5));
        aggregator.record(params("frank", "corp", 1, None)).await.unwrap();

        clock.set(at(9, 15));
        store.inject_fault(FaultPoint::AddMinutes);
        let err = aggregator.record(params("frank", "corp", 1, None)).await.unwrap_err();
        assert!(matches!(err, PingError::Store(_)));

        assert_eq!(store.users()[0].last_ping, Some(at(9, 5)));
        assert_eq!(store.usage_records()[0].minutes, 10);

        // retrying in the same bucket still accrues, since nothing was committed
        aggregator.record(params("frank", "corp", 1, None)).await.unwrap();
        assert_eq!(store.usage_records()[0].minutes, 20);
    }

    #[tokio::test]
    async fn per_step_failure_keeps_last_ping_without_minutes() {
        // ---
        let (store, clock, aggregator) = setup(Consistency::PerStep, at(9, 5));
        aggregator.record(params("grace", "corp", 1, None)).await.unwrap();

        clock.set(at(9, 15));
        store.inject_fault(FaultPoint::AddMinutes);
        assert!(aggregator.record(params("grace", "corp", 1, None)).await.is_err());

        assert_eq!(store.users()[0].last_ping, Some(at(9, 15)));
        assert_eq!(store.usage_records()[0].minutes, 10);

        // the bucket is considered used: a retry does not accrue
        aggregator.record(params("grace", "corp", 1, None)).await.unwrap();
        assert_eq!(store.usage_records()[0].minutes, 10);
    }

    #[tokio::test]
    async fn per_step_failure_on_first_ping_leaves_empty_record() {
        // ---
        let (store, _clock, aggregator) = setup(Consistency::PerStep, at(9, 5));
        store.inject_fault(FaultPoint::AddMinutes);

        assert!(aggregator.record(params("heidi", "corp", 1, None)).await.is_err());

        assert_eq!(store.users().len(), 1);
        assert_eq!(store.usage_records().len(), 1);
        assert_eq!(store.usage_records()[0].minutes, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_pings_create_one_user() {
        // ---
        for consistency in [Consistency::Atomic, Consistency::PerStep] {
            let (store, _clock, aggregator) = setup(consistency, at(9, 5));
            let aggregator = Arc::new(aggregator);

            let tasks: Vec<_> = (0..32)
                .map(|_| {
                    let aggregator = Arc::clone(&aggregator);
                    tokio::spawn(async move { aggregator.record(params("ivan", "corp", 1, None)).await })
                })
                .collect();

            for task in tasks {
                task.await.unwrap().unwrap();
            }

            assert_eq!(store.users().len(), 1);
            assert_eq!(store.usage_records().len(), 1);
            assert_eq!(store.usage_records()[0].minutes, 10);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_users_share_one_usage_record() {
        // ---
        let (store, _clock, aggregator) = setup(Consistency::Atomic, at(9, 5));
        let aggregator = Arc::new(aggregator);

        let tasks: Vec<_> = (0..20)
            .map(|n| {
                let aggregator = Arc::clone(&aggregator);
                tokio::spawn(async move {
                    aggregator
                        .record(params(&format!("user{n}"), "corp", 1, Some("2024")))
                        .await
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(store.users().len(), 20);
        let records = store.usage_records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].minutes, 200);
    }

    #[test]
    fn consistency_parses_known_modes() {
        // ---
        assert_eq!("atomic".parse::<Consistency>().unwrap(), Consistency::Atomic);
        assert_eq!("Per-Step".parse::<Consistency>().unwrap(), Consistency::PerStep);
        assert!("eventual".parse::<Consistency>().is_err());
    }
}
