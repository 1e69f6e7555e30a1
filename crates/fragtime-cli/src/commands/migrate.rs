use std::path::PathBuf;

use clap::Subcommand;
use serde::Serialize;

use crate::context::{print_json, AppContext, CliResult};

#[derive(Subcommand)]
pub enum MigrateAction {
    /// Show what guest data is waiting to be moved into the account
    Status,
    /// Move all guest data into the signed-in account
    Run,
    /// Move guest data only if it is small (a handful of short records)
    Silent,
    /// Write the guest document as JSON
    Export {
        /// File to write instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Delete the guest document
    Clear {
        /// Required; the data cannot be recovered
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusView {
    has_guest_data: bool,
    task_records: usize,
    total_time: u64,
    has_preferences: bool,
    should_prompt: bool,
}

pub async fn run(ctx: &AppContext, action: MigrateAction) -> CliResult {
    let migration = &ctx.migration;
    match action {
        MigrateAction::Status => {
            let summary = migration.guest_data_summary();
            print_json(&StatusView {
                has_guest_data: migration.has_guest_data_to_migrate(),
                task_records: summary.task_records,
                total_time: summary.total_time,
                has_preferences: summary.has_preferences,
                should_prompt: migration.should_show_migration_prompt(),
            })?;
        }
        MigrateAction::Run => {
            let report = migration.migrate_guest_data().await;
            print_json(&report)?;
            if !report.success {
                return Err(report
                    .error
                    .unwrap_or_else(|| "migration failed".to_string())
                    .into());
            }
        }
        MigrateAction::Silent => match migration.silent_migration_report().await {
            Some(report) => print_json(&report)?,
            None => println!("nothing migrated"),
        },
        MigrateAction::Export { output } => {
            let json = migration.export_guest_data()?;
            match output {
                Some(path) => {
                    std::fs::write(&path, json)?;
                    println!("guest data written to {}", path.display());
                }
                None => println!("{json}"),
            }
        }
        MigrateAction::Clear { yes } => {
            if !yes {
                return Err("refusing to delete guest data without --yes".into());
            }
            migration.clear_guest_data();
            println!("guest data cleared");
        }
    }
    Ok(())
}
