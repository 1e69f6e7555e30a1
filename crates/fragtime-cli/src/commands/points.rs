use fragtime_core::{format_points, points_level, DataAdapter};
use serde::Serialize;

use crate::context::{print_json, AppContext, CliResult};

#[derive(Serialize)]
struct PointsView {
    total_points: u64,
    points_this_week: u64,
    points_this_month: u64,
    formatted: String,
    level: u8,
    title: &'static str,
    next_level_points: Option<u64>,
    progress: f64,
}

pub async fn run(ctx: &AppContext, refresh: bool, json: bool) -> CliResult {
    if !ctx.data.points().is_supported() {
        println!("points are earned by signed-in users; run `fragtime auth login`");
        return Ok(());
    }
    if refresh {
        ctx.data.points().recompute().await?;
    }

    let stats = ctx.data.user_points_stats().await?;
    let (total, week, month) = stats
        .as_ref()
        .map_or((0, 0, 0), |s| (s.total_points, s.points_this_week, s.points_this_month));
    let level = points_level(total);
    let view = PointsView {
        total_points: total,
        points_this_week: week,
        points_this_month: month,
        formatted: format_points(total),
        level: level.level,
        title: level.title,
        next_level_points: level.next_level_points,
        progress: level.progress,
    };

    if json {
        return print_json(&view);
    }
    println!("{} points  (week {week}, month {month})", view.formatted);
    match view.next_level_points {
        Some(next) => println!(
            "level {} {}  {:.0}% of the way to {next}",
            view.level, view.title, view.progress
        ),
        None => println!("level {} {}", view.level, view.title),
    }
    Ok(())
}
