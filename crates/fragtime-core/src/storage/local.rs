//! Guest data document.
//!
//! Unauthenticated users keep everything in one JSON document under a
//! single key. The document expires `retention` after its last refresh:
//! reading an expired document discards it, and every save pushes a lapsed
//! expiry forward again. Reads and writes always cover the whole document.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::database::KeyValueStore;
use crate::error::StorageError;
use crate::models::{
    NewTaskRecord, PreferencePatch, TaskRecord, TaskRecordPatch, TaskStats, UserPreference,
};

pub const GUEST_DATA_KEY: &str = "fragment_time_guest_data";
/// Keys written by older releases; removed together with the document.
const LEGACY_KEYS: [&str; 2] = ["fragment_time_task_records", "fragment_time_user_preferences"];

pub const DEFAULT_RETENTION_DAYS: i64 = 7;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuestData {
    #[serde(default)]
    pub task_records: Vec<TaskRecord>,
    pub user_preferences: UserPreference,
    pub last_sync: DateTime<Utc>,
    /// Missing in documents written before expiry existed.
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl GuestData {
    pub fn fresh(now: DateTime<Utc>, retention: Duration) -> Self {
        Self {
            task_records: Vec::new(),
            user_preferences: UserPreference::guest_default(now),
            last_sync: now,
            expires_at: Some(now + retention),
        }
    }

    pub fn summary(&self) -> GuestDataSummary {
        GuestDataSummary {
            task_records: self.task_records.len(),
            total_time: self
                .task_records
                .iter()
                .map(|r| r.actual_duration.unwrap_or(0))
                .sum(),
            has_preferences: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuestDataSummary {
    pub task_records: usize,
    /// Seconds recorded across all attempts.
    pub total_time: u64,
    pub has_preferences: bool,
}

/// Guest document persistence over a [`KeyValueStore`].
#[derive(Clone)]
pub struct LocalStore {
    kv: Arc<dyn KeyValueStore>,
    retention: Duration,
}

impl LocalStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self::with_retention(kv, Duration::days(DEFAULT_RETENTION_DAYS))
    }

    pub fn with_retention(kv: Arc<dyn KeyValueStore>, retention: Duration) -> Self {
        Self { kv, retention }
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    /// Current document, or a fresh one. Never fails: unreadable or expired
    /// documents are cleared and replaced with defaults.
    pub fn guest_data(&self) -> GuestData {
        self.guest_data_at(Utc::now())
    }

    pub fn guest_data_at(&self, now: DateTime<Utc>) -> GuestData {
        let raw = match self.kv.get(GUEST_DATA_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return GuestData::fresh(now, self.retention),
            Err(e) => {
                warn!(error = %e, "failed to read guest data");
                return GuestData::fresh(now, self.retention);
            }
        };

        let mut data: GuestData = match serde_json::from_str(&raw) {
            Ok(data) => data,
            Err(e) => {
                warn!(error = %e, "guest data is corrupt, discarding");
                self.clear_guest_data();
                return GuestData::fresh(now, self.retention);
            }
        };

        match data.expires_at {
            Some(expires_at) if expires_at < now => {
                info!(%expires_at, "guest data expired, clearing local data");
                self.clear_guest_data();
                GuestData::fresh(now, self.retention)
            }
            Some(_) => data,
            None => {
                data.expires_at = Some(now + self.retention);
                if let Err(e) = self.save_guest_data_at(&mut data, now) {
                    warn!(error = %e, "failed to backfill guest data expiry");
                }
                data
            }
        }
    }

    /// Write the whole document. Refreshes `last_sync` and renews a missing
    /// or lapsed expiry.
    pub fn save_guest_data(&self, data: &mut GuestData) -> Result<(), StorageError> {
        self.save_guest_data_at(data, Utc::now())
    }

    pub fn save_guest_data_at(
        &self,
        data: &mut GuestData,
        now: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        data.last_sync = now;
        if data.expires_at.map_or(true, |at| at <= now) {
            data.expires_at = Some(now + self.retention);
        }
        let json = serde_json::to_string(data)
            .map_err(|e| StorageError::QueryFailed(format!("encode guest data: {e}")))?;
        self.kv.set(GUEST_DATA_KEY, &json)
    }

    pub fn clear_guest_data(&self) {
        for key in std::iter::once(GUEST_DATA_KEY).chain(LEGACY_KEYS) {
            if let Err(e) = self.kv.remove(key) {
                warn!(key, error = %e, "failed to clear guest data");
            }
        }
    }

    pub fn has_guest_data(&self) -> bool {
        !self.guest_data().task_records.is_empty()
    }

    pub fn export_guest_data(&self) -> GuestData {
        self.guest_data()
    }

    pub fn summary(&self) -> GuestDataSummary {
        self.guest_data().summary()
    }

    // ── Records ──────────────────────────────────────────────────────

    pub fn task_records(&self) -> Vec<TaskRecord> {
        self.guest_data().task_records
    }

    pub fn add_task_record(&self, record: NewTaskRecord) -> Result<TaskRecord, StorageError> {
        let now = Utc::now();
        let mut data = self.guest_data_at(now);
        let record = record.normalized().into_record(guest_record_id(now), now);
        data.task_records.push(record.clone());
        self.save_guest_data_at(&mut data, now)?;
        Ok(record)
    }

    pub fn update_task_record(
        &self,
        id: &str,
        patch: &TaskRecordPatch,
    ) -> Result<Option<TaskRecord>, StorageError> {
        let mut data = self.guest_data();
        let Some(record) = data.task_records.iter_mut().find(|r| r.id == id) else {
            return Ok(None);
        };
        patch.apply_to(record);
        let updated = record.clone();
        self.save_guest_data(&mut data)?;
        Ok(Some(updated))
    }

    pub fn delete_task_record(&self, id: &str) -> Result<bool, StorageError> {
        let mut data = self.guest_data();
        let before = data.task_records.len();
        data.task_records.retain(|r| r.id != id);
        if data.task_records.len() == before {
            return Ok(false);
        }
        self.save_guest_data(&mut data)?;
        Ok(true)
    }

    // ── Preferences ──────────────────────────────────────────────────

    pub fn user_preferences(&self) -> UserPreference {
        self.guest_data().user_preferences
    }

    pub fn update_user_preferences(
        &self,
        patch: &PreferencePatch,
    ) -> Result<UserPreference, StorageError> {
        let now = Utc::now();
        let mut data = self.guest_data_at(now);
        patch.apply_to(&mut data.user_preferences, now);
        let updated = data.user_preferences.clone();
        self.save_guest_data_at(&mut data, now)?;
        Ok(updated)
    }

    pub fn task_stats(&self) -> TaskStats {
        TaskStats::from_records(&self.task_records())
    }
}

fn guest_record_id(now: DateTime<Utc>) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(9)
        .map(|c| char::from(c).to_ascii_lowercase())
        .collect();
    format!("guest-record-{}-{suffix}", now.timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TaskStatus;
    use crate::storage::MemoryStore;

    fn store() -> (Arc<MemoryStore>, LocalStore) {
        let kv = Arc::new(MemoryStore::new());
        (kv.clone(), LocalStore::new(kv))
    }

    #[test]
    fn empty_store_yields_defaults() {
        let (kv, local) = store();
        let data = local.guest_data();
        assert!(data.task_records.is_empty());
        assert_eq!(data.user_preferences.id, "guest-preferences");
        assert!(data.expires_at.unwrap() > Utc::now());
        assert!(kv.is_empty());
        assert!(!local.has_guest_data());
    }

    #[test]
    fn add_update_delete_cycle() {
        let (_, local) = store();
        let record = local
            .add_task_record(NewTaskRecord::started("Read a page", 300))
            .unwrap();
        assert!(record.id.starts_with("guest-record-"));
        assert!(local.has_guest_data());

        let updated = local
            .update_task_record(&record.id, &TaskRecordPatch::finish(TaskStatus::Completed, 280))
            .unwrap()
            .unwrap();
        assert_eq!(updated.actual_duration, Some(280));
        assert!(local.update_task_record("nope", &TaskRecordPatch::default()).unwrap().is_none());

        let stats = local.task_stats();
        assert_eq!(stats.completed_tasks, 1);
        assert_eq!(stats.average_time, 280);

        assert!(local.delete_task_record(&record.id).unwrap());
        assert!(!local.delete_task_record(&record.id).unwrap());
        assert!(local.task_records().is_empty());
    }

    #[test]
    fn record_ids_are_unique() {
        let (_, local) = store();
        let a = local.add_task_record(NewTaskRecord::started("a", 60)).unwrap();
        let b = local.add_task_record(NewTaskRecord::started("b", 60)).unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(local.task_records().len(), 2);
    }

    #[test]
    fn lapsed_expiry_is_renewed_on_save() {
        let (_, local) = store();
        let now = Utc::now();
        let mut data = GuestData::fresh(now, local.retention());
        data.expires_at = Some(now - Duration::days(1));
        local.save_guest_data_at(&mut data, now).unwrap();
        assert_eq!(data.expires_at, Some(now + Duration::days(7)));
        assert_eq!(data.last_sync, now);
    }

    #[test]
    fn expired_document_is_discarded_on_read() {
        let (kv, local) = store();
        let past = Utc::now() - Duration::days(10);
        let mut data = GuestData::fresh(past, Duration::days(7));
        data.task_records
            .push(NewTaskRecord::started("old", 60).into_record("x".into(), past));
        kv.set(GUEST_DATA_KEY, &serde_json::to_string(&data).unwrap()).unwrap();

        let read = local.guest_data();
        assert!(read.task_records.is_empty());
        assert!(kv.get(GUEST_DATA_KEY).unwrap().is_none());
    }

    #[test]
    fn legacy_document_gets_expiry_backfilled() {
        let (kv, local) = store();
        let legacy = r#"{
            "taskRecords": [],
            "userPreferences": {
                "id": "guest-preferences",
                "preferred_categories": ["reading"],
                "difficulty_preference": "easy",
                "notifications_enabled": false,
                "updated_at": "2026-01-01T00:00:00Z"
            },
            "lastSync": "2026-01-01T00:00:00Z"
        }"#;
        kv.set(GUEST_DATA_KEY, legacy).unwrap();

        let data = local.guest_data();
        assert!(data.expires_at.unwrap() > Utc::now() + Duration::days(6));
        assert_eq!(data.user_preferences.preferred_categories, vec!["reading"]);

        let stored: GuestData =
            serde_json::from_str(&kv.get(GUEST_DATA_KEY).unwrap().unwrap()).unwrap();
        assert!(stored.expires_at.is_some());
    }

    #[test]
    fn corrupt_document_is_cleared() {
        let (kv, local) = store();
        kv.set(GUEST_DATA_KEY, "{not json").unwrap();
        kv.set("fragment_time_task_records", "[]").unwrap();
        let data = local.guest_data();
        assert!(data.task_records.is_empty());
        assert!(kv.is_empty());
    }

    #[test]
    fn document_uses_camel_case_envelope() {
        let (kv, local) = store();
        local.add_task_record(NewTaskRecord::started("a", 60)).unwrap();
        let raw = kv.get(GUEST_DATA_KEY).unwrap().unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert!(json["taskRecords"].is_array());
        assert!(json["userPreferences"].is_object());
        assert!(json["lastSync"].is_string());
        assert!(json["expiresAt"].is_string());
    }
}
