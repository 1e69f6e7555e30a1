//! Points: one per full minute of completed work.
//!
//! Only registered users earn points. The per-user totals live in the
//! `user_points_stats` table and are recomputed server-side by the
//! `update_user_points_stats` procedure.

use std::sync::Arc;

use serde::Serialize;
use serde_json::json;

use crate::error::{CoreError, Result};
use crate::models::PointsStats;
use crate::remote::{Query, RemoteBackend};
use crate::session::SessionContext;

pub const POINTS_STATS_TABLE: &str = "user_points_stats";
pub const RECOMPUTE_PROCEDURE: &str = "update_user_points_stats";

/// Points for an attempt that ran `actual_duration_secs` seconds.
pub fn calculate_task_points(actual_duration_secs: u64) -> u32 {
    u32::try_from(actual_duration_secs / 60).unwrap_or(u32::MAX)
}

/// `12345` renders as `12.3k`; smaller totals are printed as-is.
pub fn format_points(points: u64) -> String {
    if points >= 10_000 {
        format!("{:.1}k", points as f64 / 1000.0)
    } else {
        points.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PointsLevel {
    pub level: u8,
    pub title: &'static str,
    /// Points needed to reach the next level; `None` at the top level.
    pub next_level_points: Option<u64>,
    /// Percent of the way from this level to the next, capped at 100.
    pub progress: f64,
}

const LEVELS: [(u8, &str, u64); 5] = [
    (1, "Time Novice", 0),
    (2, "Efficiency Pro", 100),
    (3, "Focus Master", 500),
    (4, "Time Management Expert", 1500),
    (5, "Productivity King", 5000),
];

pub fn points_level(total_points: u64) -> PointsLevel {
    let idx = LEVELS
        .iter()
        .rposition(|&(_, _, min)| total_points >= min)
        .unwrap_or(0);
    let (level, title, min) = LEVELS[idx];
    match LEVELS.get(idx + 1) {
        Some(&(_, _, next_min)) => {
            let progress = (total_points - min) as f64 / (next_min - min) as f64 * 100.0;
            PointsLevel {
                level,
                title,
                next_level_points: Some(next_min),
                progress: progress.min(100.0),
            }
        }
        None => PointsLevel {
            level,
            title,
            next_level_points: None,
            progress: 100.0,
        },
    }
}

/// Reads and refreshes a registered user's points totals.
#[derive(Clone)]
pub struct PointsService {
    backend: Arc<dyn RemoteBackend>,
    session: SessionContext,
}

impl PointsService {
    pub fn new(backend: Arc<dyn RemoteBackend>, session: SessionContext) -> Self {
        Self { backend, session }
    }

    pub fn is_supported(&self) -> bool {
        self.session.snapshot().registered_user_id().is_some()
    }

    /// Totals for the signed-in user; `None` for guests or when no row
    /// exists yet.
    pub async fn stats(&self) -> Result<Option<PointsStats>> {
        let Some(user_id) = self.session.snapshot().registered_user_id().map(str::to_owned)
        else {
            return Ok(None);
        };
        match self
            .backend
            .select_single(POINTS_STATS_TABLE, &Query::new().eq("user_id", user_id))
            .await
        {
            Ok(row) => Ok(Some(serde_json::from_value(row)?)),
            Err(e) if e.is_no_rows() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn total_points(&self) -> Result<u64> {
        Ok(self.stats().await?.map_or(0, |s| s.total_points))
    }

    /// Ask the backend to recompute the signed-in user's totals.
    pub async fn recompute(&self) -> Result<()> {
        let user_id = self
            .session
            .snapshot()
            .registered_user_id()
            .map(str::to_owned)
            .ok_or(CoreError::NotAuthenticated)?;
        self.backend
            .rpc(RECOMPUTE_PROCEDURE, json!({ "user_uuid": user_id }))
            .await?;
        Ok(())
    }
}
