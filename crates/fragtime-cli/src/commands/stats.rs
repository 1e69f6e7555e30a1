use fragtime_core::{format_time, DataAdapter, TaskStats};

use crate::context::{print_json, AppContext, CliResult};

fn render(stats: &TaskStats) -> String {
    let rate = if stats.total_tasks == 0 {
        0.0
    } else {
        stats.completed_tasks as f64 / stats.total_tasks as f64 * 100.0
    };
    format!(
        "tasks:      {} ({} completed, {rate:.0}%)\ntotal time: {}\naverage:    {}",
        stats.total_tasks,
        stats.completed_tasks,
        format_time(stats.total_time as i64),
        format_time(stats.average_time as i64),
    )
}

pub async fn run(ctx: &AppContext, json: bool) -> CliResult {
    let stats = ctx.data.task_stats().await?;
    if json {
        print_json(&stats)
    } else {
        println!("{}", render(&stats));
        Ok(())
    }
}
