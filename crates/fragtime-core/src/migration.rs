//! Moving guest data into a freshly signed-in account.
//!
//! Migration is best-effort: every record is attempted, failures are
//! collected instead of aborting the batch, and the local document is
//! cleared afterwards whatever the outcome.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::data::{DataAdapter, DataService};
use crate::error::{CoreError, Result};
use crate::models::NewTaskRecord;
use crate::session::SessionContext;
use crate::storage::{GuestDataSummary, LocalStore};

/// Silent migration only runs at or below these sizes.
pub const SILENT_MAX_RECORDS: usize = 5;
pub const SILENT_MAX_TOTAL_SECS: u64 = 300;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationReport {
    pub success: bool,
    pub migrated_records: usize,
    pub migrated_preferences: bool,
    /// Ids of guest records the backend refused.
    pub failed_records: Vec<String>,
    /// Set only when migration could not start.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MigrationReport {
    fn refused(reason: impl Into<String>) -> Self {
        Self {
            error: Some(reason.into()),
            ..Self::default()
        }
    }
}

#[derive(Clone)]
pub struct MigrationService {
    local: LocalStore,
    data: Arc<DataService>,
    session: SessionContext,
}

impl MigrationService {
    pub fn new(local: LocalStore, data: Arc<DataService>, session: SessionContext) -> Self {
        Self {
            local,
            data,
            session,
        }
    }

    pub fn has_guest_data_to_migrate(&self) -> bool {
        self.local.has_guest_data()
    }

    pub fn guest_data_summary(&self) -> GuestDataSummary {
        self.local.summary()
    }

    /// Signed in, not a guest, and there is something to move.
    pub fn should_show_migration_prompt(&self) -> bool {
        let session = self.session.snapshot();
        session.registered_user_id().is_some() && self.has_guest_data_to_migrate()
    }

    pub async fn migrate_guest_data(&self) -> MigrationReport {
        let session = self.session.snapshot();
        if session.registered_user_id().is_none() {
            let reason = CoreError::NotAuthenticated.to_string();
            warn!(%reason, "guest data migration refused");
            return MigrationReport::refused(reason);
        }

        let data = self.local.guest_data();
        let mut report = MigrationReport {
            success: true,
            ..MigrationReport::default()
        };

        for record in data.task_records {
            let id = record.id.clone();
            match self.data.add_task_record(NewTaskRecord::from(record)).await {
                Ok(_) => report.migrated_records += 1,
                Err(e) => {
                    warn!(record = %id, error = %e, "failed to migrate task record");
                    report.failed_records.push(id);
                }
            }
        }

        match self
            .data
            .update_user_preferences(&data.user_preferences.as_patch())
            .await
        {
            Ok(_) => report.migrated_preferences = true,
            Err(e) => warn!(error = %e, "failed to migrate preferences"),
        }

        self.local.clear_guest_data();
        info!(
            migrated = report.migrated_records,
            failed = report.failed_records.len(),
            preferences = report.migrated_preferences,
            "guest data migrated"
        );
        report
    }

    /// Migrate without asking when the guest data is small. Returns whether
    /// a migration ran and succeeded.
    pub async fn silent_migration(&self) -> bool {
        self.silent_migration_report()
            .await
            .is_some_and(|report| report.success)
    }

    /// Like [`silent_migration`](Self::silent_migration), but hands back the
    /// report when a migration ran.
    pub async fn silent_migration_report(&self) -> Option<MigrationReport> {
        if !self.has_guest_data_to_migrate() {
            return None;
        }
        let summary = self.guest_data_summary();
        if summary.task_records > SILENT_MAX_RECORDS || summary.total_time > SILENT_MAX_TOTAL_SECS {
            info!(
                records = summary.task_records,
                total_time = summary.total_time,
                "guest data too large for silent migration"
            );
            return None;
        }
        Some(self.migrate_guest_data().await)
    }

    pub fn clear_guest_data(&self) {
        self.local.clear_guest_data();
    }

    /// The whole guest document as pretty-printed JSON.
    pub fn export_guest_data(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.local.export_guest_data())?)
    }
}
