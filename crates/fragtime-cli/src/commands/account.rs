use std::path::PathBuf;

use chrono::Utc;
use clap::Subcommand;
use fragtime_core::account::DailyActivity;
use fragtime_core::format_time;

use crate::context::{print_json, AppContext, CliResult};

#[derive(Subcommand)]
pub enum AccountAction {
    /// Export preferences, history and totals as JSON
    Export {
        /// Write to this file instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Delete everything the backend stores for the signed-in user
    Delete {
        /// Required; deletion cannot be undone
        #[arg(long)]
        yes: bool,
    },
    /// Days in a row with a completed task
    Streak,
    /// Milestones reached so far
    Achievements,
    /// Completions per day
    Activity {
        #[arg(long, default_value_t = 7)]
        days: u32,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn activity_line(day: &DailyActivity) -> String {
    format!(
        "{}  {:>3} done  {}",
        day.date.format("%Y-%m-%d"),
        day.tasks_completed,
        format_time(day.time_spent as i64)
    )
}

pub async fn run(ctx: &AppContext, action: AccountAction) -> CliResult {
    let today = Utc::now().date_naive();
    match action {
        AccountAction::Export { output } => {
            let export = ctx.account.export().await?;
            match output {
                Some(path) => {
                    std::fs::write(&path, serde_json::to_string_pretty(&export)?)?;
                    println!(
                        "exported {} task records to {}",
                        export.task_records.len(),
                        path.display()
                    );
                    Ok(())
                }
                None => print_json(&export),
            }
        }
        AccountAction::Delete { yes } => {
            if !yes {
                return Err("this deletes all of your account data; pass --yes to confirm".into());
            }
            print_json(&ctx.account.delete_all().await?)
        }
        AccountAction::Streak => {
            let days = ctx.account.streak_days(today).await?;
            println!("{days} day streak");
            Ok(())
        }
        AccountAction::Achievements => print_json(&ctx.account.achievements(today).await?),
        AccountAction::Activity { days, json } => {
            let activity = ctx.account.daily_activity(days, today).await?;
            if json {
                return print_json(&activity);
            }
            for day in &activity {
                println!("{}", activity_line(day));
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn activity_line_shows_count_and_time() {
        let day = DailyActivity {
            date: NaiveDate::from_ymd_opt(2026, 3, 9).unwrap(),
            tasks_completed: 2,
            time_spent: 180,
        };
        assert_eq!(activity_line(&day), "2026-03-09    2 done  03:00");
    }
}
