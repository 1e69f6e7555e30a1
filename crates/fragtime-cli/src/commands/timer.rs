use std::io::Write;

use chrono::{DateTime, Duration, Utc};
use clap::Subcommand;
use fragtime_core::data::UNTITLED_TASK;
use fragtime_core::timer::{AudioError, ToneSink};
use fragtime_core::{
    DataAdapter, Event, KeyValueStore, NewTaskRecord, RestoreState, TaskRecordPatch, TaskStatus,
    TickDriver, TickSound, TimerEngine, TimerState,
};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

use crate::context::{print_json, AppContext, CliResult};

const TIMER_KEY: &str = "timer_engine";
const FINISHED: &str = "timer already finished; run `fragtime timer reset` first";
const EMPTY: &str = "timer has no time on it; run `fragtime timer set <seconds>` first";

#[derive(Subcommand)]
pub enum TimerAction {
    /// Start (or continue) the countdown and open a task record
    Start {
        /// Task title stored on the record
        #[arg(long)]
        title: Option<String>,
        /// Task description stored on the record
        #[arg(long)]
        description: Option<String>,
        /// Countdown length in seconds (only when idle)
        #[arg(long)]
        duration: Option<u64>,
        /// Run the timer without creating a task record
        #[arg(long)]
        no_record: bool,
    },
    /// Pause the countdown
    Pause,
    /// Resume a paused countdown
    Resume,
    /// Stop the countdown and cancel its record
    Stop,
    /// Stop and rewind, optionally to a new length in seconds
    Reset {
        #[arg(long)]
        duration: Option<u64>,
    },
    /// Set the countdown length in seconds
    Set { seconds: u64 },
    /// Add seconds to the countdown
    Add { seconds: u64 },
    /// Subtract seconds from the countdown
    Subtract { seconds: u64 },
    /// Toggle the tick sound
    Sound,
    /// Set the tick volume (0.0 - 1.0)
    Volume { value: f64 },
    /// Print current timer state as JSON
    Status,
    /// Drive the countdown in the foreground until it completes or Ctrl-C
    Run {
        /// Task title if a new record is opened
        #[arg(long)]
        title: Option<String>,
        /// No terminal bell on ticks
        #[arg(long)]
        quiet: bool,
    },
}

/// Timer as persisted between invocations. While running, `saved_at` is
/// the instant the last counted second ended, not the write time.
#[derive(Debug, Serialize, Deserialize)]
struct SavedTimer {
    state: TimerState,
    saved_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    record_id: Option<String>,
}

#[derive(Serialize)]
struct TimerView<'a> {
    #[serde(flatten)]
    state: &'a TimerState,
    formatted_remaining: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    record_id: Option<&'a str>,
}

struct LoadedTimer {
    engine: TimerEngine,
    record_id: Option<String>,
    anchor: DateTime<Utc>,
}

/// A saved timer brought up to `now`.
struct Restored {
    engine: TimerEngine,
    completed: Option<Event>,
    anchor: DateTime<Utc>,
}

/// Rings the terminal bell for every tick.
struct BellSink;

impl ToneSink for BellSink {
    fn play(&mut self, _samples: &[f32], _sample_rate: u32) -> Result<(), AudioError> {
        let mut stderr = std::io::stderr();
        stderr
            .write_all(b"\x07")
            .and_then(|_| stderr.flush())
            .map_err(|e| AudioError::Playback(e.to_string()))
    }
}

/// Tick a restored engine through the seconds that passed while no
/// process was driving it. Returns the completion event, if reached.
pub(crate) fn catch_up(engine: &mut TimerEngine, seconds: u64) -> Option<Event> {
    for _ in 0..seconds {
        match engine.tick() {
            Some(event) if event.is_completion() => return Some(event),
            Some(_) => {}
            None => break,
        }
    }
    None
}

/// Whole seconds from `anchor` to `now`, and the anchor moved forward by
/// exactly that many. The fraction left over stays owed to the next run.
pub(crate) fn whole_seconds_since(
    anchor: DateTime<Utc>,
    now: DateTime<Utc>,
) -> (u64, DateTime<Utc>) {
    if now < anchor {
        return (0, now);
    }
    let secs = (now - anchor).num_seconds();
    (secs as u64, anchor + Duration::seconds(secs))
}

fn restore_saved(saved: &SavedTimer, now: DateTime<Utc>) -> Restored {
    let mut engine = TimerEngine::default();
    engine.restore_from_state(&RestoreState::from(&saved.state));
    if !engine.is_running() {
        return Restored {
            engine,
            completed: None,
            anchor: now,
        };
    }
    let (elapsed, anchor) = whole_seconds_since(saved.saved_at, now);
    let completed = catch_up(&mut engine, elapsed);
    Restored {
        engine,
        completed,
        anchor,
    }
}

fn fresh_engine(ctx: &AppContext) -> TimerEngine {
    let mut engine = TimerEngine::new(ctx.config.timer.default_duration_secs);
    if !ctx.config.timer.sound_enabled {
        engine.toggle_sound();
    }
    engine.set_volume(ctx.config.timer.volume);
    engine
}

/// Load the saved timer and catch it up. A completion reached while
/// nothing was running closes the open record.
async fn load_timer(ctx: &AppContext) -> CliResult<LoadedTimer> {
    let saved = match ctx.db.get(TIMER_KEY)? {
        Some(raw) => match serde_json::from_str::<SavedTimer>(&raw) {
            Ok(saved) => Some(saved),
            Err(e) => {
                warn!(error = %e, "discarding unreadable timer state");
                None
            }
        },
        None => None,
    };
    let Some(saved) = saved else {
        return Ok(LoadedTimer {
            engine: fresh_engine(ctx),
            record_id: None,
            anchor: Utc::now(),
        });
    };

    let Restored {
        engine,
        completed,
        anchor,
    } = restore_saved(&saved, Utc::now());
    let mut record_id = saved.record_id;
    if let Some(event) = completed {
        print_json(&event)?;
        if let Some(id) = record_id.take() {
            finish_record(ctx, &id, TaskStatus::Completed, engine.elapsed_time()).await;
        }
    }
    Ok(LoadedTimer {
        engine,
        record_id,
        anchor,
    })
}

fn save_timer(
    ctx: &AppContext,
    state: &TimerState,
    record_id: Option<&str>,
    anchor: DateTime<Utc>,
) -> CliResult {
    let saved = SavedTimer {
        state: state.clone(),
        saved_at: anchor,
        record_id: record_id.map(str::to_string),
    };
    ctx.db.set(TIMER_KEY, &serde_json::to_string(&saved)?)?;
    Ok(())
}

async fn open_record(
    ctx: &AppContext,
    title: Option<String>,
    description: Option<String>,
    planned: u64,
) -> Option<String> {
    let title = title
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| UNTITLED_TASK.to_string());
    let mut record = NewTaskRecord::started(title, planned);
    record.task_description = description.unwrap_or_default();
    match ctx.data.add_task_record(record).await {
        Ok(stored) => Some(stored.id),
        Err(e) => {
            warn!(error = %e, "could not open a task record, timing without one");
            None
        }
    }
}

async fn finish_record(ctx: &AppContext, id: &str, status: TaskStatus, actual: u64) {
    let patch = TaskRecordPatch::finish(status, actual);
    match ctx.data.update_task_record(id, &patch).await {
        Ok(Some(_)) => {}
        Ok(None) => warn!(record = id, "task record no longer exists"),
        Err(e) => warn!(record = id, error = %e, "failed to close task record"),
    }
}

async fn mark_record(ctx: &AppContext, id: &str, status: TaskStatus) {
    if let Err(e) = ctx
        .data
        .update_task_record(id, &TaskRecordPatch::status(status))
        .await
    {
        warn!(record = id, error = %e, "failed to update task record");
    }
}

fn no_time_left(engine: &TimerEngine) -> &'static str {
    if engine.is_completed() {
        FINISHED
    } else {
        EMPTY
    }
}

fn print_event_or_snapshot(event: Option<Event>, engine: &TimerEngine) -> CliResult {
    match event {
        Some(event) => print_json(&event),
        None => print_json(&engine.snapshot()),
    }
}

pub async fn run(ctx: &AppContext, action: TimerAction) -> CliResult {
    let mut timer = load_timer(ctx).await?;
    if let TimerAction::Run { title, quiet } = action {
        return run_live(ctx, timer, title, quiet).await;
    }
    let outcome = apply(ctx, &mut timer, action).await;
    save_timer(
        ctx,
        &timer.engine.timer_state(),
        timer.record_id.as_deref(),
        timer.anchor,
    )?;
    outcome
}

async fn apply(ctx: &AppContext, timer: &mut LoadedTimer, action: TimerAction) -> CliResult {
    let LoadedTimer {
        engine, record_id, ..
    } = timer;

    match action {
        TimerAction::Start {
            title,
            description,
            duration,
            no_record,
        } => {
            if let Some(secs) = duration {
                if engine.start_time().is_none() {
                    engine.set_duration(secs);
                }
            }
            if engine.remaining_time() == 0 {
                return Err(no_time_left(engine).into());
            }
            let resuming = engine.is_paused();
            let event = engine.start();
            if event.is_some() {
                if let Some(id) = record_id.as_deref() {
                    if resuming {
                        mark_record(ctx, id, TaskStatus::Started).await;
                    }
                } else if !no_record {
                    *record_id =
                        open_record(ctx, title, description, engine.total_duration()).await;
                }
            }
            print_event_or_snapshot(event, engine)?;
        }
        TimerAction::Pause => {
            let event = engine.pause();
            if let (Some(_), Some(id)) = (&event, record_id.as_deref()) {
                mark_record(ctx, id, TaskStatus::Paused).await;
            }
            print_event_or_snapshot(event, engine)?;
        }
        TimerAction::Resume => {
            let event = engine.resume();
            if let (Some(_), Some(id)) = (&event, record_id.as_deref()) {
                mark_record(ctx, id, TaskStatus::Started).await;
            }
            print_event_or_snapshot(event, engine)?;
        }
        TimerAction::Stop => {
            let event = engine.stop();
            if let Some(id) = record_id.take() {
                finish_record(ctx, &id, TaskStatus::Cancelled, engine.elapsed_time()).await;
            }
            print_event_or_snapshot(event, engine)?;
        }
        TimerAction::Reset { duration } => {
            if let Some(id) = record_id.take() {
                finish_record(ctx, &id, TaskStatus::Cancelled, engine.elapsed_time()).await;
            }
            print_json(&engine.reset(duration))?;
        }
        TimerAction::Set { seconds } => {
            engine.set_duration(seconds);
            print_json(&engine.snapshot())?;
        }
        TimerAction::Add { seconds } => {
            engine.add_time(seconds);
            print_json(&engine.snapshot())?;
        }
        TimerAction::Subtract { seconds } => {
            if !engine.subtract_time(seconds) {
                return Err(format!(
                    "cannot subtract {seconds}s: only {}s remaining",
                    engine.remaining_time()
                )
                .into());
            }
            print_json(&engine.snapshot())?;
        }
        TimerAction::Sound => {
            let enabled = engine.toggle_sound();
            println!("sound {}", if enabled { "on" } else { "off" });
        }
        TimerAction::Volume { value } => {
            engine.set_volume(value);
            println!("volume {:.2}", engine.volume());
        }
        TimerAction::Status => {
            let state = engine.timer_state();
            print_json(&TimerView {
                state: &state,
                formatted_remaining: engine.formatted_remaining_time(),
                record_id: record_id.as_deref(),
            })?;
        }
        // Driven by `run_live`.
        TimerAction::Run { .. } => {}
    }
    Ok(())
}

async fn run_live(
    ctx: &AppContext,
    loaded: LoadedTimer,
    title: Option<String>,
    quiet: bool,
) -> CliResult {
    let LoadedTimer {
        engine,
        mut record_id,
        ..
    } = loaded;
    if engine.remaining_time() == 0 {
        return Err(no_time_left(&engine).into());
    }

    let sound = if quiet {
        TickSound::silent()
    } else {
        TickSound::new(|| Ok(Box::new(BellSink) as Box<dyn ToneSink>))
    };
    let was_running = engine.is_running();
    let was_paused = engine.is_paused();
    let restore = RestoreState::from(&engine.timer_state());
    let mut driver = TickDriver::new(engine, sound);
    let mut events = driver.subscribe();

    if was_running {
        driver.restore_from_state(&restore);
    } else {
        driver.start();
        if let Some(id) = record_id.as_deref() {
            if was_paused {
                mark_record(ctx, id, TaskStatus::Started).await;
            }
        } else {
            let planned = driver.inspect(|e| e.total_duration());
            record_id = open_record(ctx, title, None, planned).await;
        }
    }

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;
    loop {
        tokio::select! {
            received = events.recv() => match received {
                Ok(event) => {
                    println!("{}", serde_json::to_string(&event)?);
                    if event.is_completion() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "output fell behind the timer");
                }
                Err(RecvError::Closed) => break,
            },
            _ = &mut ctrl_c => {
                interrupted = true;
                break;
            }
        }
    }

    if interrupted {
        if let Some(event) = driver.pause() {
            println!("{}", serde_json::to_string(&event)?);
        }
        if let Some(id) = &record_id {
            mark_record(ctx, id, TaskStatus::Paused).await;
        }
    } else if let Some(id) = record_id.take() {
        let elapsed = driver.inspect(|e| e.elapsed_time());
        finish_record(ctx, &id, TaskStatus::Completed, elapsed).await;
    }

    save_timer(ctx, &driver.state(), record_id.as_deref(), Utc::now())
}
