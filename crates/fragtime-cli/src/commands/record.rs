use chrono::Utc;
use clap::Subcommand;
use fragtime_core::data::UNTITLED_TASK;
use fragtime_core::{
    format_time, DataAdapter, NewTaskRecord, TaskRecord, TaskRecordPatch, TaskStatus,
};

use crate::context::{print_json, AppContext, CliResult};

#[derive(Subcommand)]
pub enum RecordAction {
    /// List task records, newest first
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
        /// Show at most this many records
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Open a record for a task that just started
    Start {
        /// Task title
        title: String,
        /// Task description
        #[arg(long)]
        description: Option<String>,
        /// Planned duration in seconds (defaults to the timer length)
        #[arg(long)]
        planned: Option<u64>,
    },
    /// Mark a record completed
    Complete {
        id: String,
        /// Seconds actually spent (defaults to time since start)
        #[arg(long)]
        actual: Option<u64>,
    },
    /// Mark a record cancelled
    Cancel {
        id: String,
        /// Seconds actually spent (defaults to time since start)
        #[arg(long)]
        actual: Option<u64>,
    },
    /// Delete a record
    Delete { id: String },
}

fn summary_line(record: &TaskRecord) -> String {
    let secs = record.actual_duration.unwrap_or(record.planned_duration);
    let points = record
        .points_earned
        .map(|p| format!("  +{p}"))
        .unwrap_or_default();
    format!(
        "{}  {:<9}  {}  {}  {}{}",
        record.id,
        record.status.as_str(),
        record.started_at.format("%Y-%m-%d %H:%M"),
        format_time(secs as i64),
        record.task_title,
        points
    )
}

async fn find(ctx: &AppContext, id: &str) -> CliResult<TaskRecord> {
    ctx.data
        .task_records()
        .await?
        .into_iter()
        .find(|r| r.id == id)
        .ok_or_else(|| format!("no task record with id {id}").into())
}

async fn finish(ctx: &AppContext, id: &str, status: TaskStatus, actual: Option<u64>) -> CliResult {
    let actual = match actual {
        Some(secs) => secs,
        None => {
            let record = find(ctx, id).await?;
            (Utc::now() - record.started_at).num_seconds().max(0) as u64
        }
    };
    let patch = TaskRecordPatch::finish(status, actual);
    match ctx.data.update_task_record(id, &patch).await? {
        Some(record) => print_json(&record),
        None => Err(format!("no task record with id {id}").into()),
    }
}

pub async fn run(ctx: &AppContext, action: RecordAction) -> CliResult {
    match action {
        RecordAction::List { json, limit } => {
            let mut records = ctx.data.task_records().await?;
            if let Some(limit) = limit {
                records.truncate(limit);
            }
            if json {
                print_json(&records)?;
            } else if records.is_empty() {
                println!("no task records");
            } else {
                for record in &records {
                    println!("{}", summary_line(record));
                }
            }
        }
        RecordAction::Start {
            title,
            description,
            planned,
        } => {
            let title = if title.trim().is_empty() {
                UNTITLED_TASK.to_string()
            } else {
                title
            };
            let planned = planned.unwrap_or(ctx.config.timer.default_duration_secs);
            let mut record = NewTaskRecord::started(title, planned);
            record.task_description = description.unwrap_or_default();
            let stored = ctx.data.add_task_record(record).await?;
            print_json(&stored)?;
        }
        RecordAction::Complete { id, actual } => {
            finish(ctx, &id, TaskStatus::Completed, actual).await?;
        }
        RecordAction::Cancel { id, actual } => {
            finish(ctx, &id, TaskStatus::Cancelled, actual).await?;
        }
        RecordAction::Delete { id } => {
            if !ctx.data.delete_task_record(&id).await? {
                return Err(format!("no task record with id {id}").into());
            }
            println!("deleted {id}");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_line_prefers_actual_duration() {
        let mut new = NewTaskRecord::started("Write report", 300);
        new.status = TaskStatus::Completed;
        new.actual_duration = Some(125);
        new.points_earned = Some(2);
        let record = new.into_record("r1".into(), Utc::now());

        let line = summary_line(&record);
        assert!(line.starts_with("r1  completed"));
        assert!(line.contains("02:05"));
        assert!(line.ends_with("Write report  +2"));
    }

    #[test]
    fn summary_line_falls_back_to_planned() {
        let record = NewTaskRecord::started("Inbox", 90).into_record("r2".into(), Utc::now());
        assert!(summary_line(&record).contains("01:30"));
    }
}
