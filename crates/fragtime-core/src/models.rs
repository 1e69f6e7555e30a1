//! Task records, preferences, the task catalog and derived statistics.
//!
//! Durations are whole seconds, except where a field says minutes (catalog
//! task lengths and the default-duration preference). Field names follow the remote
//! table columns (snake_case) so the same types serialize into both the
//! guest document and backend rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Started,
    Paused,
    Completed,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Started => "started",
            TaskStatus::Paused => "paused",
            TaskStatus::Completed => "completed",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    /// Completed and cancelled attempts carry an actual duration.
    pub fn is_final(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Cancelled)
    }
}

impl FromStr for TaskStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "started" => Ok(TaskStatus::Started),
            "paused" => Ok(TaskStatus::Paused),
            "completed" => Ok(TaskStatus::Completed),
            "cancelled" => Ok(TaskStatus::Cancelled),
            other => Err(ValidationError::UnknownVariant {
                kind: "task status",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

impl FromStr for Difficulty {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            other => Err(ValidationError::UnknownVariant {
                kind: "difficulty",
                value: other.to_string(),
            }),
        }
    }
}

/// One timed task attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    pub task_title: String,
    #[serde(default)]
    pub task_description: String,
    pub planned_duration: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_duration: Option<u64>,
    pub status: TaskStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    /// Registered users only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub points_earned: Option<u32>,
}

/// A record before storage assigns `id` and `created_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTaskRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    pub task_title: String,
    #[serde(default)]
    pub task_description: String,
    pub planned_duration: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_duration: Option<u64>,
    pub status: TaskStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub points_earned: Option<u32>,
}

impl NewTaskRecord {
    /// A freshly started attempt.
    pub fn started(title: impl Into<String>, planned_duration: u64) -> Self {
        Self {
            task_id: None,
            task_title: title.into(),
            task_description: String::new(),
            planned_duration,
            actual_duration: None,
            status: TaskStatus::Started,
            started_at: Utc::now(),
            completed_at: None,
            points_earned: None,
        }
    }

    /// `actual_duration` is only kept on a finished attempt.
    pub fn normalized(mut self) -> Self {
        if !self.status.is_final() {
            self.actual_duration = None;
        }
        self
    }

    pub fn into_record(self, id: String, created_at: DateTime<Utc>) -> TaskRecord {
        TaskRecord {
            id,
            task_id: self.task_id,
            task_title: self.task_title,
            task_description: self.task_description,
            planned_duration: self.planned_duration,
            actual_duration: self.actual_duration,
            status: self.status,
            started_at: self.started_at,
            completed_at: self.completed_at,
            created_at,
            points_earned: self.points_earned,
        }
    }
}

impl From<TaskRecord> for NewTaskRecord {
    fn from(record: TaskRecord) -> Self {
        Self {
            task_id: record.task_id,
            task_title: record.task_title,
            task_description: record.task_description,
            planned_duration: record.planned_duration,
            actual_duration: record.actual_duration,
            status: record.status,
            started_at: record.started_at,
            completed_at: record.completed_at,
            points_earned: record.points_earned,
        }
    }
}

/// Partial update of a [`TaskRecord`]. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskRecordPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_duration: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub points_earned: Option<u32>,
}

impl TaskRecordPatch {
    /// Finish an attempt: final status, actual duration and completion time.
    pub fn finish(status: TaskStatus, actual_duration: u64) -> Self {
        Self {
            status: Some(status),
            actual_duration: Some(actual_duration),
            completed_at: (status == TaskStatus::Completed).then(Utc::now),
            ..Self::default()
        }
    }

    pub fn status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn completes(&self) -> bool {
        self.status == Some(TaskStatus::Completed)
    }

    /// `actual_duration` only travels with a move to a final status.
    pub fn normalized(&self) -> Self {
        let mut patch = self.clone();
        if !patch.status.is_some_and(|s| s.is_final()) {
            patch.actual_duration = None;
        }
        patch
    }

    /// Apply the [`normalized`](Self::normalized) form of this patch.
    pub fn apply_to(&self, record: &mut TaskRecord) {
        let patch = self.normalized();
        if let Some(title) = &patch.task_title {
            record.task_title = title.clone();
        }
        if let Some(description) = &patch.task_description {
            record.task_description = description.clone();
        }
        if let Some(status) = patch.status {
            record.status = status;
        }
        if let Some(actual) = patch.actual_duration {
            record.actual_duration = Some(actual);
        }
        if let Some(at) = patch.completed_at {
            record.completed_at = Some(at);
        }
        if let Some(points) = patch.points_earned {
            record.points_earned = Some(points);
        }
    }
}

/// Per-user (or guest singleton) preferences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserPreference {
    pub id: String,
    #[serde(default)]
    pub preferred_categories: Vec<String>,
    #[serde(default)]
    pub difficulty_preference: Difficulty,
    #[serde(default = "default_true")]
    pub notifications_enabled: bool,
    pub updated_at: DateTime<Utc>,
    // Registered-user extras; absent for the guest singleton.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_reminder: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_celebration: Option<bool>,
    /// Minutes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_duration: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_pause: Option<bool>,
}

fn default_true() -> bool {
    true
}

pub const GUEST_PREFERENCE_ID: &str = "guest-preferences";

impl UserPreference {
    pub fn guest_default(now: DateTime<Utc>) -> Self {
        Self {
            id: GUEST_PREFERENCE_ID.to_string(),
            preferred_categories: Vec::new(),
            difficulty_preference: Difficulty::Medium,
            notifications_enabled: true,
            updated_at: now,
            task_reminder: None,
            completion_celebration: None,
            default_duration: None,
            theme_color: None,
            auto_pause: None,
        }
    }

    /// Preference values every patch would carry over to another store.
    pub fn as_patch(&self) -> PreferencePatch {
        PreferencePatch {
            preferred_categories: Some(self.preferred_categories.clone()),
            difficulty_preference: Some(self.difficulty_preference),
            notifications_enabled: Some(self.notifications_enabled),
            task_reminder: self.task_reminder,
            completion_celebration: self.completion_celebration,
            default_duration: self.default_duration,
            theme_color: self.theme_color.clone(),
            auto_pause: self.auto_pause,
        }
    }
}

/// Defaults for a registered user's first preference row.
pub fn registered_default_patch() -> PreferencePatch {
    PreferencePatch {
        preferred_categories: Some(Vec::new()),
        difficulty_preference: Some(Difficulty::Medium),
        notifications_enabled: Some(true),
        task_reminder: Some(true),
        completion_celebration: Some(true),
        default_duration: Some(25),
        theme_color: Some("blue".to_string()),
        auto_pause: Some(true),
    }
}

/// Partial update of a [`UserPreference`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PreferencePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_categories: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty_preference: Option<Difficulty>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notifications_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_reminder: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_celebration: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_duration: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_pause: Option<bool>,
}

impl PreferencePatch {
    pub fn is_empty(&self) -> bool {
        self == &PreferencePatch::default()
    }

    pub fn apply_to(&self, pref: &mut UserPreference, now: DateTime<Utc>) {
        if let Some(categories) = &self.preferred_categories {
            pref.preferred_categories = categories.clone();
        }
        if let Some(difficulty) = self.difficulty_preference {
            pref.difficulty_preference = difficulty;
        }
        if let Some(enabled) = self.notifications_enabled {
            pref.notifications_enabled = enabled;
        }
        if self.task_reminder.is_some() {
            pref.task_reminder = self.task_reminder;
        }
        if self.completion_celebration.is_some() {
            pref.completion_celebration = self.completion_celebration;
        }
        if self.default_duration.is_some() {
            pref.default_duration = self.default_duration;
        }
        if self.theme_color.is_some() {
            pref.theme_color = self.theme_color.clone();
        }
        if self.auto_pause.is_some() {
            pref.auto_pause = self.auto_pause;
        }
        pref.updated_at = now;
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStats {
    pub total_tasks: usize,
    pub completed_tasks: usize,
    /// Seconds across completed attempts.
    pub total_time: u64,
    pub average_time: u64,
}

impl TaskStats {
    /// Aggregate `(status, actual_duration)` pairs.
    pub fn from_pairs<I>(rows: I) -> Self
    where
        I: IntoIterator<Item = (TaskStatus, Option<u64>)>,
    {
        let mut stats = TaskStats::default();
        for (status, actual) in rows {
            stats.total_tasks += 1;
            if status == TaskStatus::Completed {
                stats.completed_tasks += 1;
                stats.total_time += actual.unwrap_or(0);
            }
        }
        if stats.completed_tasks > 0 {
            stats.average_time =
                (stats.total_time as f64 / stats.completed_tasks as f64).round() as u64;
        }
        stats
    }

    pub fn from_records(records: &[TaskRecord]) -> Self {
        Self::from_pairs(records.iter().map(|r| (r.status, r.actual_duration)))
    }
}

/// Row of `user_points_stats`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointsStats {
    pub id: String,
    pub user_id: String,
    pub total_points: u64,
    pub points_this_week: u64,
    pub points_this_month: u64,
    pub last_updated_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Row of `task_categories`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskCategory {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub icon: String,
}

/// A short task users can pick to fill a gap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Minutes.
    pub duration: u32,
    #[serde(default)]
    pub difficulty: Difficulty,
    #[serde(default)]
    pub category_id: Option<String>,
    #[serde(default)]
    pub steps: Vec<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    /// Joined category, when the query asked for it.
    #[serde(default, rename = "task_categories", skip_serializing_if = "Option::is_none")]
    pub category: Option<TaskCategory>,
}

/// A user-authored task before the backend stores it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTask {
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Minutes.
    pub duration: u32,
    pub category_id: String,
    #[serde(default)]
    pub steps: Vec<String>,
}

impl NewTask {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.title.trim().is_empty() {
            return Err(ValidationError::InvalidValue {
                field: "title".into(),
                message: "must not be empty".into(),
            });
        }
        if self.duration == 0 {
            return Err(ValidationError::InvalidValue {
                field: "duration".into(),
                message: "must be at least one minute".into(),
            });
        }
        if self.category_id.trim().is_empty() {
            return Err(ValidationError::InvalidValue {
                field: "category_id".into(),
                message: "must not be empty".into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(status: TaskStatus, actual: Option<u64>) -> TaskRecord {
        let mut new = NewTaskRecord::started("Stretch", 120);
        new.status = status;
        new.actual_duration = actual;
        new.into_record("r".into(), Utc::now())
    }

    #[test]
    fn stats_average_rounds() {
        let records = vec![
            record(TaskStatus::Completed, Some(100)),
            record(TaskStatus::Completed, Some(51)),
            record(TaskStatus::Cancelled, Some(30)),
            record(TaskStatus::Started, None),
        ];
        let stats = TaskStats::from_records(&records);
        assert_eq!(stats.total_tasks, 4);
        assert_eq!(stats.completed_tasks, 2);
        assert_eq!(stats.total_time, 151);
        assert_eq!(stats.average_time, 76);
    }

    #[test]
    fn stats_empty_average_is_zero() {
        let stats = TaskStats::from_records(&[record(TaskStatus::Started, None)]);
        assert_eq!(stats.completed_tasks, 0);
        assert_eq!(stats.average_time, 0);
    }

    #[test]
    fn actual_duration_only_on_final_status() {
        let mut r = record(TaskStatus::Started, None);
        TaskRecordPatch {
            actual_duration: Some(40),
            status: Some(TaskStatus::Paused),
            ..TaskRecordPatch::default()
        }
        .apply_to(&mut r);
        assert_eq!(r.actual_duration, None);

        TaskRecordPatch::finish(TaskStatus::Completed, 95).apply_to(&mut r);
        assert_eq!(r.status, TaskStatus::Completed);
        assert_eq!(r.actual_duration, Some(95));
        assert!(r.completed_at.is_some());
    }

    #[test]
    fn bare_actual_duration_is_dropped() {
        let mut r = record(TaskStatus::Completed, Some(100));
        TaskRecordPatch {
            actual_duration: Some(5),
            ..TaskRecordPatch::default()
        }
        .apply_to(&mut r);
        assert_eq!(r.actual_duration, Some(100));

        let mut new = NewTaskRecord::started("Stretch", 120);
        new.actual_duration = Some(30);
        assert_eq!(new.clone().normalized().actual_duration, None);
        new.status = TaskStatus::Cancelled;
        assert_eq!(new.normalized().actual_duration, Some(30));
    }

    #[test]
    fn preference_patch_updates_timestamp() {
        let t0 = Utc::now() - chrono::Duration::days(1);
        let mut pref = UserPreference::guest_default(t0);
        let now = Utc::now();
        PreferencePatch {
            difficulty_preference: Some(Difficulty::Hard),
            ..PreferencePatch::default()
        }
        .apply_to(&mut pref, now);
        assert_eq!(pref.difficulty_preference, Difficulty::Hard);
        assert!(pref.notifications_enabled);
        assert_eq!(pref.updated_at, now);
    }

    #[test]
    fn guest_preference_omits_registered_fields() {
        let json = serde_json::to_value(UserPreference::guest_default(Utc::now())).unwrap();
        assert_eq!(json["id"], "guest-preferences");
        assert_eq!(json["difficulty_preference"], "medium");
        assert!(json.get("theme_color").is_none());
    }

    #[test]
    fn task_row_with_joined_category() {
        let task: Task = serde_json::from_value(serde_json::json!({
            "id": "t1",
            "title": "Water the plants",
            "description": null,
            "duration": 5,
            "difficulty": "easy",
            "category_id": "c1",
            "is_active": true,
            "created_at": "2026-03-01T08:00:00Z",
            "task_categories": {"id": "c1", "name": "Home", "color": "green", "icon": "leaf"}
        }))
        .unwrap();
        assert_eq!(task.description, None);
        assert!(task.steps.is_empty());
        assert_eq!(task.category.map(|c| c.name), Some("Home".to_string()));
    }

    #[test]
    fn difficulty_orders_easy_first() {
        let mut all = vec![Difficulty::Hard, Difficulty::Easy, Difficulty::Medium];
        all.sort();
        assert_eq!(all, vec![Difficulty::Easy, Difficulty::Medium, Difficulty::Hard]);
    }

    #[test]
    fn new_task_validation() {
        let mut task = NewTask {
            title: "Fold laundry".into(),
            description: String::new(),
            duration: 10,
            category_id: "c1".into(),
            steps: vec![],
        };
        assert!(task.validate().is_ok());
        task.duration = 0;
        assert!(task.validate().is_err());
        task.duration = 10;
        task.title = "  ".into();
        assert!(task.validate().is_err());
    }

    #[test]
    fn status_parses() {
        assert_eq!("completed".parse::<TaskStatus>().unwrap(), TaskStatus::Completed);
        assert!("in_progress".parse::<TaskStatus>().is_err());
    }
}
