//! Work/break cycle built from two countdown engines.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::engine::{RestoreState, TimerEngine, TimerState};
use crate::events::Event;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PomodoroMode {
    Work,
    Break,
}

/// Durations in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PomodoroSettings {
    pub work_duration: u64,
    pub short_break: u64,
    pub long_break: u64,
    /// Every n-th finished work phase earns the long break.
    pub long_break_interval: u32,
}

impl Default for PomodoroSettings {
    fn default() -> Self {
        Self {
            work_duration: 25 * 60,
            short_break: 5 * 60,
            long_break: 15 * 60,
            long_break_interval: 4,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PomodoroTimer {
    settings: PomodoroSettings,
    work: TimerEngine,
    rest: TimerEngine,
    mode: PomodoroMode,
    completed_pomodoros: u32,
    is_long_break: bool,
}

/// Serializable form of a [`PomodoroTimer`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PomodoroState {
    pub settings: PomodoroSettings,
    pub current_mode: PomodoroMode,
    pub completed_pomodoros: u32,
    pub is_long_break: bool,
    pub work_timer: TimerState,
    pub break_timer: TimerState,
}

impl Default for PomodoroTimer {
    fn default() -> Self {
        Self::new(PomodoroSettings::default())
    }
}

impl PomodoroTimer {
    pub fn new(settings: PomodoroSettings) -> Self {
        Self {
            settings,
            work: TimerEngine::new(settings.work_duration),
            rest: TimerEngine::new(settings.short_break),
            mode: PomodoroMode::Work,
            completed_pomodoros: 0,
            is_long_break: false,
        }
    }

    pub fn settings(&self) -> PomodoroSettings {
        self.settings
    }

    pub fn current_mode(&self) -> PomodoroMode {
        self.mode
    }

    pub fn completed_pomodoros(&self) -> u32 {
        self.completed_pomodoros
    }

    pub fn is_long_break(&self) -> bool {
        self.is_long_break
    }

    pub fn work_timer(&self) -> &TimerEngine {
        &self.work
    }

    pub fn break_timer(&self) -> &TimerEngine {
        &self.rest
    }

    pub fn current_timer(&self) -> &TimerEngine {
        match self.mode {
            PomodoroMode::Work => &self.work,
            PomodoroMode::Break => &self.rest,
        }
    }

    pub fn current_timer_mut(&mut self) -> &mut TimerEngine {
        match self.mode {
            PomodoroMode::Work => &mut self.work,
            PomodoroMode::Break => &mut self.rest,
        }
    }

    /// Leave the current phase and enter the other one, fully reset.
    pub fn switch_to_next_phase(&mut self) -> Event {
        match self.mode {
            PomodoroMode::Work => {
                self.work.stop();
                self.completed_pomodoros += 1;
                let interval = self.settings.long_break_interval.max(1);
                self.is_long_break = self.completed_pomodoros % interval == 0;
                let duration = if self.is_long_break {
                    self.settings.long_break
                } else {
                    self.settings.short_break
                };
                self.rest.set_duration(duration);
                self.rest.reset(None);
                self.mode = PomodoroMode::Break;
            }
            PomodoroMode::Break => {
                self.rest.stop();
                self.work.reset(None);
                self.mode = PomodoroMode::Work;
            }
        }

        Event::PhaseSwitched {
            mode: self.mode,
            completed_pomodoros: self.completed_pomodoros,
            is_long_break: self.is_long_break,
            duration: self.current_timer().total_duration(),
            at: Utc::now(),
        }
    }

    /// Switch immediately, without waiting for the countdown.
    pub fn skip_current(&mut self) -> Event {
        self.current_timer_mut().stop();
        self.switch_to_next_phase()
    }

    pub fn reset_pomodoro(&mut self) {
        self.work.reset(None);
        self.rest.reset(None);
        self.mode = PomodoroMode::Work;
        self.completed_pomodoros = 0;
        self.is_long_break = false;
    }

    /// Tick the active engine; on completion the next phase begins.
    pub fn tick(&mut self) -> Vec<Event> {
        let Some(event) = self.current_timer_mut().tick() else {
            return Vec::new();
        };
        if event.is_completion() {
            vec![event, self.switch_to_next_phase()]
        } else {
            vec![event]
        }
    }

    pub fn state(&self) -> PomodoroState {
        PomodoroState {
            settings: self.settings,
            current_mode: self.mode,
            completed_pomodoros: self.completed_pomodoros,
            is_long_break: self.is_long_break,
            work_timer: self.work.timer_state(),
            break_timer: self.rest.timer_state(),
        }
    }

    pub fn from_state(state: &PomodoroState) -> Self {
        let mut timer = Self::new(state.settings);
        timer.work.restore_from_state(&RestoreState::from(&state.work_timer));
        timer.rest.restore_from_state(&RestoreState::from(&state.break_timer));
        timer.mode = state.current_mode;
        timer.completed_pomodoros = state.completed_pomodoros;
        timer.is_long_break = state.is_long_break;
        timer
    }
}
