//! Account data: export, deletion, streaks and achievements.
//!
//! Export and the history views go through [`DataService`], so guests get
//! them over their local records too. Deletion is for registered users and
//! removes every row the backend keeps for them. Calendar days are UTC.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::Serialize;
use tracing::info;

use crate::data::{DataAdapter, DataService, PREFERENCES_TABLE, TASK_RECORDS_TABLE};
use crate::error::{CoreError, Result};
use crate::models::{TaskRecord, TaskStatus, UserPreference};
use crate::points::POINTS_STATS_TABLE;
use crate::remote::{Query, RemoteBackend};
use crate::session::SessionContext;

/// Everything the account holds, as one document.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountExport {
    pub exported_at: DateTime<Utc>,
    pub preferences: UserPreference,
    pub task_records: Vec<TaskRecord>,
    pub stats: ExportStats,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportStats {
    pub completed_tasks: usize,
    /// Seconds across completed attempts.
    pub total_time: u64,
    /// Percent of attempts that were completed, rounded.
    pub completion_rate: u32,
    pub first_task_at: Option<DateTime<Utc>>,
    pub last_task_at: Option<DateTime<Utc>>,
}

impl ExportStats {
    pub fn from_records(records: &[TaskRecord]) -> Self {
        let completed: Vec<&TaskRecord> = completed(records).collect();
        let completion_rate = if records.is_empty() {
            0
        } else {
            (completed.len() as f64 / records.len() as f64 * 100.0).round() as u32
        };
        Self {
            completed_tasks: completed.len(),
            total_time: completed.iter().map(|r| r.actual_duration.unwrap_or(0)).sum(),
            completion_rate,
            first_task_at: records.iter().map(|r| r.created_at).min(),
            last_task_at: records.iter().map(|r| r.created_at).max(),
        }
    }
}

/// Rows removed by [`AccountService::delete_all`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletionReport {
    pub task_records: usize,
    pub preferences: usize,
    pub points_stats: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Achievements {
    pub first_task: bool,
    pub streak_7_days: bool,
    pub streak_30_days: bool,
    pub complete_100_tasks: bool,
    pub complete_1000_minutes: bool,
    /// A completion on each of the last seven days, today included.
    pub perfect_week: bool,
}

impl Achievements {
    pub fn from_records(records: &[TaskRecord], today: NaiveDate) -> Self {
        let days = completion_days(records);
        let streak = streak_days(&days, today);
        let count = completed(records).count();
        let seconds: u64 = completed(records)
            .map(|r| r.actual_duration.unwrap_or(0))
            .sum();
        Self {
            first_task: count > 0,
            streak_7_days: streak >= 7,
            streak_30_days: streak >= 30,
            complete_100_tasks: count >= 100,
            complete_1000_minutes: seconds >= 1000 * 60,
            perfect_week: (0..7).all(|back| {
                today
                    .checked_sub_days(Days::new(back))
                    .is_some_and(|day| days.contains(&day))
            }),
        }
    }
}

/// Completions on one calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyActivity {
    pub date: NaiveDate,
    pub tasks_completed: usize,
    /// Seconds.
    pub time_spent: u64,
}

/// One entry per day for the `days` days ending today, oldest first.
pub fn daily_activity(records: &[TaskRecord], days: u32, today: NaiveDate) -> Vec<DailyActivity> {
    (0..u64::from(days))
        .rev()
        .filter_map(|back| today.checked_sub_days(Days::new(back)))
        .map(|date| {
            let on_day: Vec<&TaskRecord> = completed(records)
                .filter(|r| completion_day(r) == date)
                .collect();
            DailyActivity {
                date,
                tasks_completed: on_day.len(),
                time_spent: on_day.iter().map(|r| r.actual_duration.unwrap_or(0)).sum(),
            }
        })
        .collect()
}

/// Consecutive days with a completion, counting back from today. Zero when
/// nothing was completed today.
pub fn streak_days(days: &BTreeSet<NaiveDate>, today: NaiveDate) -> u32 {
    let mut streak = 0;
    let mut day = today;
    while days.contains(&day) {
        streak += 1;
        match day.pred_opt() {
            Some(prev) => day = prev,
            None => break,
        }
    }
    streak
}

/// Days on which at least one attempt was completed.
pub fn completion_days(records: &[TaskRecord]) -> BTreeSet<NaiveDate> {
    completed(records).map(completion_day).collect()
}

fn completion_day(record: &TaskRecord) -> NaiveDate {
    record.completed_at.unwrap_or(record.created_at).date_naive()
}

fn completed(records: &[TaskRecord]) -> impl Iterator<Item = &TaskRecord> {
    records.iter().filter(|r| r.status == TaskStatus::Completed)
}

pub struct AccountService {
    data: Arc<DataService>,
    backend: Arc<dyn RemoteBackend>,
    session: SessionContext,
}

impl AccountService {
    pub fn new(
        data: Arc<DataService>,
        backend: Arc<dyn RemoteBackend>,
        session: SessionContext,
    ) -> Self {
        Self {
            data,
            backend,
            session,
        }
    }

    pub async fn export(&self) -> Result<AccountExport> {
        let preferences = self.data.user_preferences().await?;
        let task_records = self.data.task_records().await?;
        let stats = ExportStats::from_records(&task_records);
        Ok(AccountExport {
            exported_at: Utc::now(),
            preferences,
            task_records,
            stats,
        })
    }

    /// Remove the signed-in user's records, preferences and points totals.
    pub async fn delete_all(&self) -> Result<DeletionReport> {
        let user_id = self
            .session
            .snapshot()
            .registered_user_id()
            .map(str::to_owned)
            .ok_or(CoreError::NotAuthenticated)?;
        let owned = Query::new().eq("user_id", user_id.as_str());

        let report = DeletionReport {
            task_records: self.backend.delete(TASK_RECORDS_TABLE, &owned).await?.len(),
            preferences: self.backend.delete(PREFERENCES_TABLE, &owned).await?.len(),
            points_stats: self.backend.delete(POINTS_STATS_TABLE, &owned).await?.len(),
        };
        info!(
            user = %user_id,
            records = report.task_records,
            "deleted account data"
        );
        Ok(report)
    }

    pub async fn achievements(&self, today: NaiveDate) -> Result<Achievements> {
        let records = self.data.task_records().await?;
        Ok(Achievements::from_records(&records, today))
    }

    pub async fn streak_days(&self, today: NaiveDate) -> Result<u32> {
        let records = self.data.task_records().await?;
        Ok(streak_days(&completion_days(&records), today))
    }

    pub async fn daily_activity(&self, days: u32, today: NaiveDate) -> Result<Vec<DailyActivity>> {
        let records = self.data.task_records().await?;
        Ok(daily_activity(&records, days, today))
    }
}
