//! Task catalog: the short tasks users pick from to fill a gap.
//!
//! Tasks and their categories live in the `tasks` and `task_categories`
//! tables. Reads need no account; task lengths are minutes.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::debug;

use crate::error::{Result, ValidationError};
use crate::models::{Difficulty, NewTask, Task, TaskCategory};
use crate::remote::{Order, Query, RemoteBackend};

pub const TASKS_TABLE: &str = "tasks";
pub const CATEGORIES_TABLE: &str = "task_categories";

const TASK_COLUMNS: &str = "*,task_categories(id,name,color,icon)";
/// Recommendations may run this many minutes past the requested gap.
const RECOMMEND_OVER: u32 = 5;
/// ...and fall this many minutes short of it.
const RECOMMEND_UNDER: u32 = 10;
/// Shortest task ever recommended, in minutes.
const RECOMMEND_FLOOR: u32 = 5;
const RECOMMEND_LIMIT: usize = 10;
const SEARCH_LIMIT: usize = 20;

/// Minute range `(shortest, longest)` recommended for a gap of `minutes`.
pub fn recommended_range(minutes: u32) -> (u32, u32) {
    (
        minutes.saturating_sub(RECOMMEND_UNDER).max(RECOMMEND_FLOOR),
        minutes.saturating_add(RECOMMEND_OVER),
    )
}

#[derive(Clone)]
pub struct TaskCatalog {
    backend: Arc<dyn RemoteBackend>,
}

impl TaskCatalog {
    pub fn new(backend: Arc<dyn RemoteBackend>) -> Self {
        Self { backend }
    }

    /// All categories by name.
    pub async fn categories(&self) -> Result<Vec<TaskCategory>> {
        let rows = self
            .backend
            .select(CATEGORIES_TABLE, &Query::new().order("name", Order::Asc))
            .await?;
        let categories = rows
            .into_iter()
            .map(serde_json::from_value::<TaskCategory>)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(categories)
    }

    /// Active tasks that fit a gap of `minutes`, easiest first.
    pub async fn recommended(&self, minutes: u32) -> Result<Vec<Task>> {
        let (shortest, longest) = recommended_range(minutes);
        debug!(minutes, shortest, longest, "recommending tasks");
        let query = active()
            .lte("duration", i64::from(longest))
            .gte("duration", i64::from(shortest))
            .limit(RECOMMEND_LIMIT);
        self.tasks(&query).await
    }

    pub async fn by_category(&self, category_id: &str) -> Result<Vec<Task>> {
        self.tasks(&active().eq("category_id", category_id)).await
    }

    /// `None` when no task has this id.
    pub async fn task(&self, id: &str) -> Result<Option<Task>> {
        let query = Query::new().select(TASK_COLUMNS).eq("id", id);
        match self.backend.select_single(TASKS_TABLE, &query).await {
            Ok(row) => Ok(Some(serde_json::from_value(row)?)),
            Err(e) if e.is_no_rows() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Active tasks whose title or description contains `text`.
    pub async fn search(&self, text: &str) -> Result<Vec<Task>> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ValidationError::InvalidValue {
                field: "query".into(),
                message: "must not be empty".into(),
            }
            .into());
        }
        let query = active()
            .search(["title", "description"], text)
            .limit(SEARCH_LIMIT);
        self.tasks(&query).await
    }

    /// Store a user-authored task. New tasks are active and of medium
    /// difficulty.
    pub async fn create_custom(&self, task: NewTask) -> Result<Task> {
        task.validate()?;
        let mut row = serde_json::to_value(&task)?;
        if let Some(obj) = row.as_object_mut() {
            obj.insert("title".into(), json!(task.title.trim()));
            obj.insert("difficulty".into(), json!(Difficulty::Medium));
            obj.insert("is_active".into(), json!(true));
            obj.insert("created_at".into(), json!(Utc::now()));
        }
        let stored = self.backend.insert(TASKS_TABLE, row).await?;
        Ok(serde_json::from_value(stored)?)
    }

    async fn tasks(&self, query: &Query) -> Result<Vec<Task>> {
        let rows = self.backend.select(TASKS_TABLE, query).await?;
        let mut tasks = rows
            .into_iter()
            .map(serde_json::from_value::<Task>)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        tasks.sort_by_key(|t| t.difficulty);
        Ok(tasks)
    }
}

fn active() -> Query {
    Query::new()
        .select(TASK_COLUMNS)
        .eq("is_active", "true")
        .order("difficulty", Order::Asc)
}
