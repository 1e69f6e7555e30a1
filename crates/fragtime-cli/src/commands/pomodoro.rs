use chrono::{DateTime, Utc};
use clap::Subcommand;
use fragtime_core::{Event, KeyValueStore, PomodoroState, PomodoroTimer};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::timer::whole_seconds_since;
use crate::context::{print_json, AppContext, CliResult};

const POMODORO_KEY: &str = "pomodoro_state";

#[derive(Subcommand)]
pub enum PomodoroAction {
    /// Print the cycle state as JSON
    Status,
    /// Start or continue the current phase
    Start,
    /// Pause the current phase
    Pause,
    /// Skip to the next phase
    Skip,
    /// Back to the first work phase, using the configured lengths
    Reset,
}

/// Cycle as persisted between invocations. While a phase runs, `saved_at`
/// is the instant the last counted second ended.
#[derive(Debug, Serialize, Deserialize)]
struct SavedPomodoro {
    state: PomodoroState,
    saved_at: DateTime<Utc>,
}

/// Tick the cycle through the seconds nobody was watching. Stops once a
/// phase switch leaves the next phase idle.
fn catch_up(pomodoro: &mut PomodoroTimer, seconds: u64) -> Vec<Event> {
    let mut notable = Vec::new();
    for _ in 0..seconds {
        let events = pomodoro.tick();
        if events.is_empty() {
            break;
        }
        notable.extend(
            events
                .into_iter()
                .filter(|e| !matches!(e, Event::TimerTicked { .. })),
        );
    }
    notable
}

struct Loaded {
    pomodoro: PomodoroTimer,
    caught_up: Vec<Event>,
    anchor: DateTime<Utc>,
}

fn restore_saved(saved: &SavedPomodoro, now: DateTime<Utc>) -> Loaded {
    let mut pomodoro = PomodoroTimer::from_state(&saved.state);
    if !pomodoro.current_timer().is_running() {
        return Loaded {
            pomodoro,
            caught_up: Vec::new(),
            anchor: now,
        };
    }
    let (elapsed, anchor) = whole_seconds_since(saved.saved_at, now);
    let caught_up = catch_up(&mut pomodoro, elapsed);
    Loaded {
        pomodoro,
        caught_up,
        anchor,
    }
}

fn load(ctx: &AppContext) -> CliResult<Loaded> {
    let saved = match ctx.db.get(POMODORO_KEY)? {
        Some(raw) => match serde_json::from_str::<SavedPomodoro>(&raw) {
            Ok(saved) => Some(saved),
            Err(e) => {
                warn!(error = %e, "discarding unreadable pomodoro state");
                None
            }
        },
        None => None,
    };
    Ok(match saved {
        Some(saved) => restore_saved(&saved, Utc::now()),
        None => Loaded {
            pomodoro: PomodoroTimer::new(ctx.config.pomodoro_settings()),
            caught_up: Vec::new(),
            anchor: Utc::now(),
        },
    })
}

fn save(ctx: &AppContext, pomodoro: &PomodoroTimer, anchor: DateTime<Utc>) -> CliResult {
    let saved = SavedPomodoro {
        state: pomodoro.state(),
        saved_at: anchor,
    };
    ctx.db.set(POMODORO_KEY, &serde_json::to_string(&saved)?)?;
    Ok(())
}

pub async fn run(ctx: &AppContext, action: PomodoroAction) -> CliResult {
    let Loaded {
        mut pomodoro,
        caught_up,
        mut anchor,
    } = load(ctx)?;
    for event in &caught_up {
        print_json(event)?;
    }

    match action {
        PomodoroAction::Status => print_json(&pomodoro.state())?,
        PomodoroAction::Start => {
            let event = pomodoro.current_timer_mut().start();
            match event {
                Some(event) => print_json(&event)?,
                None => print_json(&pomodoro.current_timer().snapshot())?,
            }
        }
        PomodoroAction::Pause => {
            let event = pomodoro.current_timer_mut().pause();
            match event {
                Some(event) => print_json(&event)?,
                None => print_json(&pomodoro.current_timer().snapshot())?,
            }
        }
        PomodoroAction::Skip => print_json(&pomodoro.skip_current())?,
        PomodoroAction::Reset => {
            pomodoro = PomodoroTimer::new(ctx.config.pomodoro_settings());
            anchor = Utc::now();
            print_json(&pomodoro.state())?;
        }
    }

    save(ctx, &pomodoro, anchor)
}
