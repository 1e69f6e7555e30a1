//! Table-oriented remote backend.
//!
//! [`RemoteBackend`] is the narrow contract the remote data adapter, the
//! points service, migration and the task catalog are written against: row
//! CRUD over named tables with simple filters, plus stored-procedure calls.
//! Rows are plain JSON objects.

mod memory;
mod rest;

pub use memory::MemoryBackend;
pub use rest::RestBackend;

use async_trait::async_trait;

use crate::error::BackendError;

pub type Row = serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, String),
    /// Numeric column at least the bound.
    Gte(String, i64),
    /// Numeric column at most the bound.
    Lte(String, i64),
    /// Case-insensitive substring match on any of the columns.
    Search(Vec<String>, String),
}

impl Filter {
    pub fn matches(&self, row: &Row) -> bool {
        match self {
            Filter::Eq(column, value) => match row.get(column) {
                Some(Row::String(s)) => s == value,
                Some(Row::Null) | None => false,
                Some(other) => other.to_string() == *value,
            },
            Filter::Gte(column, bound) => number(row, column).is_some_and(|n| n >= *bound as f64),
            Filter::Lte(column, bound) => number(row, column).is_some_and(|n| n <= *bound as f64),
            Filter::Search(columns, needle) => {
                let needle = needle.to_lowercase();
                columns.iter().any(|column| {
                    row.get(column)
                        .and_then(Row::as_str)
                        .is_some_and(|s| s.to_lowercase().contains(&needle))
                })
            }
        }
    }
}

fn number(row: &Row, column: &str) -> Option<f64> {
    row.get(column).and_then(Row::as_f64)
}

/// Row selection: filters, projection, ordering and a row cap.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub columns: Option<String>,
    pub filters: Vec<Filter>,
    pub order: Option<(String, Order)>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select(mut self, columns: impl Into<String>) -> Self {
        self.columns = Some(columns.into());
        self
    }

    pub fn eq(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.push(Filter::Eq(column.into(), value.into()));
        self
    }

    pub fn gte(mut self, column: impl Into<String>, bound: i64) -> Self {
        self.filters.push(Filter::Gte(column.into(), bound));
        self
    }

    pub fn lte(mut self, column: impl Into<String>, bound: i64) -> Self {
        self.filters.push(Filter::Lte(column.into(), bound));
        self
    }

    pub fn search<I, S>(mut self, columns: I, needle: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let columns = columns.into_iter().map(Into::into).collect();
        self.filters.push(Filter::Search(columns, needle.into()));
        self
    }

    pub fn limit(mut self, rows: usize) -> Self {
        self.limit = Some(rows);
        self
    }

    pub fn order(mut self, column: impl Into<String>, order: Order) -> Self {
        self.order = Some((column.into(), order));
        self
    }

    /// True when `row` satisfies every filter.
    pub fn matches(&self, row: &Row) -> bool {
        self.filters.iter().all(|filter| filter.matches(row))
    }
}

#[async_trait]
pub trait RemoteBackend: Send + Sync {
    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Row>, BackendError>;

    /// Exactly one matching row, or a no-rows error.
    async fn select_single(&self, table: &str, query: &Query) -> Result<Row, BackendError>;

    /// Insert one row and return it as stored.
    async fn insert(&self, table: &str, row: Row) -> Result<Row, BackendError>;

    /// Merge `patch` into every matching row; returns the updated rows.
    async fn update(&self, table: &str, patch: Row, query: &Query)
        -> Result<Vec<Row>, BackendError>;

    /// Returns the deleted rows.
    async fn delete(&self, table: &str, query: &Query) -> Result<Vec<Row>, BackendError>;

    /// Insert, or merge into the row whose `on_conflict` column matches.
    async fn upsert(&self, table: &str, row: Row, on_conflict: &str)
        -> Result<Row, BackendError>;

    async fn rpc(&self, function: &str, args: Row) -> Result<Row, BackendError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn query_matches_strings_and_scalars() {
        let row = json!({"user_id": "u1", "status": "completed", "planned_duration": 300});
        assert!(Query::new().matches(&row));
        assert!(Query::new().eq("user_id", "u1").eq("status", "completed").matches(&row));
        assert!(Query::new().eq("planned_duration", "300").matches(&row));
        assert!(!Query::new().eq("user_id", "u2").matches(&row));
        assert!(!Query::new().eq("missing", "x").matches(&row));
    }

    #[test]
    fn range_and_search_filters() {
        let row = json!({"title": "Water the Plants", "description": null, "duration": 10});
        assert!(Query::new().gte("duration", 5).lte("duration", 15).matches(&row));
        assert!(!Query::new().gte("duration", 11).matches(&row));
        assert!(!Query::new().lte("title", 100).matches(&row));
        assert!(Query::new().search(["title", "description"], "plants").matches(&row));
        assert!(!Query::new().search(["description"], "plants").matches(&row));
    }
}
