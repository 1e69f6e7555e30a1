use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::timer::{PomodoroMode, TimerStatus};

/// Every timer state change produces an Event.
/// The CLI prints them; embedders subscribe through the tick driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    TimerStarted {
        total_duration: u64,
        remaining_time: u64,
        at: DateTime<Utc>,
    },
    TimerPaused {
        remaining_time: u64,
        at: DateTime<Utc>,
    },
    TimerResumed {
        remaining_time: u64,
        at: DateTime<Utc>,
    },
    TimerTicked {
        remaining_time: u64,
        at: DateTime<Utc>,
    },
    TimerCompleted {
        total_duration: u64,
        at: DateTime<Utc>,
    },
    TimerStopped {
        remaining_time: u64,
        at: DateTime<Utc>,
    },
    TimerReset {
        total_duration: u64,
        at: DateTime<Utc>,
    },
    PhaseSwitched {
        mode: PomodoroMode,
        completed_pomodoros: u32,
        is_long_break: bool,
        duration: u64,
        at: DateTime<Utc>,
    },
    StateSnapshot {
        status: TimerStatus,
        remaining_time: u64,
        total_duration: u64,
        progress_pct: f64,
        formatted_remaining: String,
        at: DateTime<Utc>,
    },
}

impl Event {
    /// True for the event that ends a countdown.
    pub fn is_completion(&self) -> bool {
        matches!(self, Event::TimerCompleted { .. })
    }
}
