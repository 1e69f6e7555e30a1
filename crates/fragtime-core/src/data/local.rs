use async_trait::async_trait;

use super::DataAdapter;
use crate::error::Result;
use crate::models::{
    NewTaskRecord, PointsStats, PreferencePatch, TaskRecord, TaskRecordPatch, TaskStats,
    UserPreference,
};
use crate::storage::LocalStore;

/// Guest adapter over the local document. Never touches the network.
#[derive(Clone)]
pub struct LocalAdapter {
    store: LocalStore,
}

impl LocalAdapter {
    pub fn new(store: LocalStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl DataAdapter for LocalAdapter {
    async fn task_records(&self) -> Result<Vec<TaskRecord>> {
        let mut records = self.store.task_records();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    async fn add_task_record(&self, record: NewTaskRecord) -> Result<TaskRecord> {
        Ok(self.store.add_task_record(record)?)
    }

    async fn update_task_record(
        &self,
        id: &str,
        patch: &TaskRecordPatch,
    ) -> Result<Option<TaskRecord>> {
        Ok(self.store.update_task_record(id, patch)?)
    }

    async fn delete_task_record(&self, id: &str) -> Result<bool> {
        Ok(self.store.delete_task_record(id)?)
    }

    async fn user_preferences(&self) -> Result<UserPreference> {
        Ok(self.store.user_preferences())
    }

    async fn update_user_preferences(&self, patch: &PreferencePatch) -> Result<UserPreference> {
        Ok(self.store.update_user_preferences(patch)?)
    }

    async fn task_stats(&self) -> Result<TaskStats> {
        Ok(self.store.task_stats())
    }

    async fn user_points_stats(&self) -> Result<Option<PointsStats>> {
        Ok(None)
    }
}
