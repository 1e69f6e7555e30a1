//! In-process [`RemoteBackend`] with failure injection.
//!
//! Used by tests and offline runs. Inserted rows get a UUID `id` and a
//! `created_at` timestamp when they lack one. Every call is counted so
//! callers can assert that nothing reached the backend.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use super::{Order, Query, RemoteBackend, Row};
use crate::error::BackendError;

type InsertFilter = Box<dyn Fn(&str, &Row) -> bool + Send + Sync>;

#[derive(Default)]
pub struct MemoryBackend {
    tables: Mutex<HashMap<String, Vec<Row>>>,
    rpc_calls: Mutex<Vec<(String, Row)>>,
    calls: AtomicUsize,
    failing_tables: Mutex<HashMap<String, BackendError>>,
    failing_inserts: Mutex<Option<InsertFilter>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every operation on `table` fails with `error`.
    pub fn fail_table(&self, table: &str, error: BackendError) {
        lock(&self.failing_tables).insert(table.to_string(), error);
    }

    /// Inserts for which `filter(table, row)` holds are rejected.
    pub fn fail_inserts_when(&self, filter: impl Fn(&str, &Row) -> bool + Send + Sync + 'static) {
        *lock(&self.failing_inserts) = Some(Box::new(filter));
    }

    pub fn seed(&self, table: &str, rows: Vec<Row>) {
        lock(&self.tables)
            .entry(table.to_string())
            .or_default()
            .extend(rows);
    }

    pub fn rows(&self, table: &str) -> Vec<Row> {
        lock(&self.tables).get(table).cloned().unwrap_or_default()
    }

    pub fn rpc_calls(&self) -> Vec<(String, Row)> {
        lock(&self.rpc_calls).clone()
    }

    /// Total operations attempted, including failed ones.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn enter(&self, table: &str) -> Result<(), BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match lock(&self.failing_tables).get(table) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn merge(target: &mut Row, patch: &Row) {
    if let (Some(target), Some(patch)) = (target.as_object_mut(), patch.as_object()) {
        for (key, value) in patch {
            target.insert(key.clone(), value.clone());
        }
    }
}

/// Numbers compare numerically, everything else by its text. Missing
/// values sort first.
fn compare(a: &Row, b: &Row, column: &str) -> std::cmp::Ordering {
    match (a.get(column), b.get(column)) {
        (Some(Row::Number(x)), Some(Row::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(std::cmp::Ordering::Equal),
        (x, y) => text(x).cmp(&text(y)),
    }
}

fn text(value: Option<&Row>) -> String {
    match value {
        Some(Row::String(s)) => s.clone(),
        Some(Row::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

fn stamp(mut row: Row) -> Result<Row, BackendError> {
    let obj = row
        .as_object_mut()
        .ok_or_else(|| BackendError::new("row must be a JSON object"))?;
    obj.entry("id")
        .or_insert_with(|| Row::String(Uuid::new_v4().to_string()));
    obj.entry("created_at")
        .or_insert_with(|| Row::String(Utc::now().to_rfc3339()));
    Ok(row)
}

#[async_trait]
impl RemoteBackend for MemoryBackend {
    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Row>, BackendError> {
        self.enter(table)?;
        let mut rows: Vec<Row> = self
            .rows(table)
            .into_iter()
            .filter(|row| query.matches(row))
            .collect();
        if let Some((column, order)) = &query.order {
            rows.sort_by(|a, b| compare(a, b, column));
            if *order == Order::Desc {
                rows.reverse();
            }
        }
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    async fn select_single(&self, table: &str, query: &Query) -> Result<Row, BackendError> {
        let mut rows = self.select(table, query).await?;
        if rows.len() == 1 {
            Ok(rows.remove(0))
        } else {
            Err(BackendError::no_rows())
        }
    }

    async fn insert(&self, table: &str, row: Row) -> Result<Row, BackendError> {
        self.enter(table)?;
        if let Some(filter) = lock(&self.failing_inserts).as_ref() {
            if filter(table, &row) {
                return Err(BackendError::with_code("23514", "insert rejected"));
            }
        }
        let row = stamp(row)?;
        lock(&self.tables)
            .entry(table.to_string())
            .or_default()
            .push(row.clone());
        Ok(row)
    }

    async fn update(
        &self,
        table: &str,
        patch: Row,
        query: &Query,
    ) -> Result<Vec<Row>, BackendError> {
        self.enter(table)?;
        let mut tables = lock(&self.tables);
        let mut updated = Vec::new();
        for row in tables.entry(table.to_string()).or_default().iter_mut() {
            if query.matches(row) {
                merge(row, &patch);
                updated.push(row.clone());
            }
        }
        Ok(updated)
    }

    async fn delete(&self, table: &str, query: &Query) -> Result<Vec<Row>, BackendError> {
        self.enter(table)?;
        let mut tables = lock(&self.tables);
        let rows = tables.entry(table.to_string()).or_default();
        let (deleted, kept): (Vec<Row>, Vec<Row>) =
            rows.drain(..).partition(|row| query.matches(row));
        *rows = kept;
        Ok(deleted)
    }

    async fn upsert(&self, table: &str, row: Row, on_conflict: &str) -> Result<Row, BackendError> {
        self.enter(table)?;
        let key = row
            .get(on_conflict)
            .cloned()
            .ok_or_else(|| BackendError::new(format!("upsert row lacks {on_conflict}")))?;
        let mut tables = lock(&self.tables);
        let rows = tables.entry(table.to_string()).or_default();
        if let Some(existing) = rows.iter_mut().find(|r| r.get(on_conflict) == Some(&key)) {
            merge(existing, &row);
            return Ok(existing.clone());
        }
        let row = stamp(row)?;
        rows.push(row.clone());
        Ok(row)
    }

    async fn rpc(&self, function: &str, args: Row) -> Result<Row, BackendError> {
        self.enter(&format!("rpc/{function}"))?;
        lock(&self.rpc_calls).push((function.to_string(), args));
        Ok(Row::Null)
    }
}
