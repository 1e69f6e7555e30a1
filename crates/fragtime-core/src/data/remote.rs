use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;

use super::DataAdapter;
use crate::error::{CoreError, Result};
use crate::models::{
    registered_default_patch, NewTaskRecord, PointsStats, PreferencePatch, TaskRecord,
    TaskRecordPatch, TaskStats, TaskStatus, UserPreference,
};
use crate::points::{calculate_task_points, PointsService};
use crate::remote::{Order, Query, RemoteBackend, Row};
use crate::session::SessionContext;

pub const TASK_RECORDS_TABLE: &str = "task_records";
pub const PREFERENCES_TABLE: &str = "user_preferences";
/// Title shown when neither the record nor its task has one.
pub const UNTITLED_TASK: &str = "Untitled task";

const RECORD_COLUMNS: &str = "*,tasks(title,description)";

/// Registered-user adapter over the backend tables, scoped to the session
/// user.
#[derive(Clone)]
pub struct RemoteAdapter {
    backend: Arc<dyn RemoteBackend>,
    session: SessionContext,
}

impl RemoteAdapter {
    pub fn new(backend: Arc<dyn RemoteBackend>, session: SessionContext) -> Self {
        Self { backend, session }
    }

    pub fn backend(&self) -> &Arc<dyn RemoteBackend> {
        &self.backend
    }

    fn user_id(&self) -> Result<String> {
        self.session
            .snapshot()
            .registered_user_id()
            .map(str::to_owned)
            .ok_or(CoreError::NotAuthenticated)
    }

    fn owned(&self, user_id: &str) -> Query {
        Query::new().eq("user_id", user_id)
    }
}

/// Fill `task_title`/`task_description` from the joined `tasks` row when
/// the record lacks them.
fn record_from_row(mut row: Row) -> Result<TaskRecord> {
    let joined = row.get("tasks").cloned().unwrap_or(Value::Null);
    let pick = |own: Option<&Value>, key: &str| -> Option<String> {
        own.and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .or_else(|| joined.get(key).and_then(Value::as_str).filter(|s| !s.is_empty()))
            .map(str::to_owned)
    };
    let title = pick(row.get("task_title"), "title").unwrap_or_else(|| UNTITLED_TASK.to_string());
    let description = pick(row.get("task_description"), "description").unwrap_or_default();

    if let Some(obj) = row.as_object_mut() {
        obj.insert("task_title".into(), Value::String(title));
        obj.insert("task_description".into(), Value::String(description));
    }
    Ok(serde_json::from_value(row)?)
}

#[derive(Deserialize)]
struct StatusRow {
    status: TaskStatus,
    #[serde(default)]
    actual_duration: Option<u64>,
}

fn with_user(value: Value, user_id: &str) -> Value {
    let mut value = value;
    if let Some(obj) = value.as_object_mut() {
        obj.insert("user_id".into(), Value::String(user_id.to_string()));
    }
    value
}

#[async_trait]
impl DataAdapter for RemoteAdapter {
    async fn task_records(&self) -> Result<Vec<TaskRecord>> {
        let user_id = self.user_id()?;
        let rows = self
            .backend
            .select(
                TASK_RECORDS_TABLE,
                &self
                    .owned(&user_id)
                    .select(RECORD_COLUMNS)
                    .order("created_at", Order::Desc),
            )
            .await?;
        rows.into_iter().map(record_from_row).collect()
    }

    async fn add_task_record(&self, record: NewTaskRecord) -> Result<TaskRecord> {
        let user_id = self.user_id()?;
        let mut record = record.normalized();
        if record.status == TaskStatus::Completed {
            if let Some(actual) = record.actual_duration {
                record.points_earned = Some(calculate_task_points(actual));
            }
        }
        let row = with_user(serde_json::to_value(&record)?, &user_id);
        let stored = self.backend.insert(TASK_RECORDS_TABLE, row).await?;
        record_from_row(stored)
    }

    async fn update_task_record(
        &self,
        id: &str,
        patch: &TaskRecordPatch,
    ) -> Result<Option<TaskRecord>> {
        let user_id = self.user_id()?;
        let mut patch = patch.normalized();
        if patch.completes() {
            if let Some(actual) = patch.actual_duration {
                patch.points_earned = Some(calculate_task_points(actual));
            }
        }

        let query = self.owned(&user_id).eq("id", id);
        match self
            .backend
            .update(TASK_RECORDS_TABLE, serde_json::to_value(&patch)?, &query)
            .await
        {
            Ok(rows) => rows.into_iter().next().map(record_from_row).transpose(),
            Err(e) if e.is_no_rows() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_task_record(&self, id: &str) -> Result<bool> {
        let user_id = self.user_id()?;
        let query = self.owned(&user_id).eq("id", id);
        match self.backend.delete(TASK_RECORDS_TABLE, &query).await {
            Ok(rows) => Ok(!rows.is_empty()),
            Err(e) => {
                warn!(record = id, error = %e, "failed to delete task record");
                Ok(false)
            }
        }
    }

    async fn user_preferences(&self) -> Result<UserPreference> {
        let user_id = self.user_id()?;
        match self
            .backend
            .select_single(PREFERENCES_TABLE, &self.owned(&user_id))
            .await
        {
            Ok(row) => Ok(serde_json::from_value(row)?),
            Err(e) if e.is_no_rows() => {
                let mut row = with_user(serde_json::to_value(registered_default_patch())?, &user_id);
                if let Some(obj) = row.as_object_mut() {
                    obj.insert("updated_at".into(), json!(Utc::now()));
                }
                let stored = self.backend.insert(PREFERENCES_TABLE, row).await?;
                Ok(serde_json::from_value(stored)?)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn update_user_preferences(&self, patch: &PreferencePatch) -> Result<UserPreference> {
        let user_id = self.user_id()?;
        let mut row = with_user(serde_json::to_value(patch)?, &user_id);
        if let Some(obj) = row.as_object_mut() {
            obj.insert("updated_at".into(), json!(Utc::now()));
        }
        let stored = self
            .backend
            .upsert(PREFERENCES_TABLE, row, "user_id")
            .await?;
        Ok(serde_json::from_value(stored)?)
    }

    async fn task_stats(&self) -> Result<TaskStats> {
        let user_id = self.user_id()?;
        let rows = self
            .backend
            .select(
                TASK_RECORDS_TABLE,
                &self.owned(&user_id).select("status,actual_duration"),
            )
            .await?;
        let pairs = rows
            .into_iter()
            .map(serde_json::from_value::<StatusRow>)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(TaskStats::from_pairs(
            pairs.into_iter().map(|r| (r.status, r.actual_duration)),
        ))
    }

    async fn user_points_stats(&self) -> Result<Option<PointsStats>> {
        self.user_id()?;
        PointsService::new(self.backend.clone(), self.session.clone())
            .stats()
            .await
    }
}
