//! Startup schema and reference-data bootstrap.
//!
//! Every step is attempted regardless of earlier failures. "Already exists"
//! outcomes are expected on every start after the first and are only logged
//! at debug level; anything else is logged as an error and collected in the
//! returned [`BootstrapReport`]. The bootstrapper itself never fails.

use super::errors::StoreError;
use super::models::{Application, ApplicationRow};
use super::repository::{SchemaObject, SchemaStorePtr};
use tokio::sync::Mutex;

/// A bootstrap step that failed for a reason other than "already exists".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapFailure {
    pub step: &'static str,
    pub error: String,
}

/// Summary of one bootstrap run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootstrapReport {
    // ---
    pub created: Vec<&'static str>,
    pub already_present: Vec<&'static str>,
    pub failures: Vec<BootstrapFailure>,
    pub applications_seeded: bool,
}

impl BootstrapReport {
    // ---
    /// True when no step failed for an unexpected reason.
    pub fn is_clean(&self) -> bool {
        // ---
        self.failures.is_empty()
    }

    fn record(&mut self, step: &'static str, result: Result<(), StoreError>) {
        // ---
        match result {
            Ok(()) => {
                tracing::info!(step, "bootstrap step applied");
                self.created.push(step);
            }
            Err(err) if err.is_already_exists() => {
                tracing::debug!(step, "bootstrap step skipped, already present");
                self.already_present.push(step);
            }
            Err(err) => {
                tracing::error!(step, error = %err, "bootstrap step failed");
                self.failures.push(BootstrapFailure {
                    step,
                    error: err.to_string(),
                });
            }
        }
    }
}

const APPLICATION_SEED_STEP: &str = "application seed";
const UNKNOWN_ORGANISATION_STEP: &str = "unknown organisation";

/// Creates the service's tables and reference rows.
pub struct SchemaBootstrapper {
    // ---
    store: SchemaStorePtr,
    unknown_value: String,
    seed_lock: Mutex<()>,
}

impl SchemaBootstrapper {
    // ---
    pub fn new(store: SchemaStorePtr, unknown_value: impl Into<String>) -> Self {
        // ---
        Self {
            store,
            unknown_value: unknown_value.into(),
            seed_lock: Mutex::new(()),
        }
    }

    /// Runs every bootstrap step once. Safe to repeat.
    pub async fn run(&self) -> BootstrapReport {
        // ---
        let mut report = BootstrapReport::default();

        for object in [
            SchemaObject::UserSequence,
            SchemaObject::UserTable,
            SchemaObject::ApplicationTable,
        ] {
            report.record(object.name(), self.store.create(object).await);
        }

        self.seed_applications(&mut report).await;

        for object in [SchemaObject::UsageSequence, SchemaObject::UsageTable] {
            report.record(object.name(), self.store.create(object).await);
        }

        let result = self.store.insert_unknown_organisation(&self.unknown_value).await;
        report.record(UNKNOWN_ORGANISATION_STEP, result);

        if report.is_clean() {
            tracing::info!(
                created = report.created.len(),
                already_present = report.already_present.len(),
                "schema bootstrap complete"
            );
        } else {
            tracing::error!(failures = report.failures.len(), "schema bootstrap finished with failures");
        }

        report
    }

    /// Seeds the application catalogue when it is empty.
    async fn seed_applications(&self, report: &mut BootstrapReport) {
        // ---
        let _guard = self.seed_lock.lock().await;

        let existing = match self.store.count_applications().await {
            Ok(count) => count,
            Err(err) => {
                report.record(APPLICATION_SEED_STEP, Err(err));
                return;
            }
        };

        if existing != 0 {
            tracing::debug!(existing, "application catalogue already seeded");
            report.already_present.push(APPLICATION_SEED_STEP);
            return;
        }

        let rows: Vec<ApplicationRow> = Application::ALL
            .iter()
            .map(|app| ApplicationRow {
                id: app.code(),
                name: app.display_name(&self.unknown_value),
            })
            .collect();

        let result = self.store.seed_applications(&rows).await;
        report.applications_seeded = result.is_ok();
        report.record(APPLICATION_SEED_STEP, result);
    }
}
