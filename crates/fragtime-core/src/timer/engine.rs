//! Countdown timer engine.
//!
//! The engine is a plain state machine counting whole seconds. It owns no
//! threads or tasks: something else (normally [`super::TickDriver`]) calls
//! `tick()` once per second while the engine is running.
//!
//! ## State Transitions
//!
//! ```text
//! Idle -> Running <-> Paused
//!            |
//!            v
//!        Completed -> (reset) -> Idle
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! let mut engine = TimerEngine::new(300);
//! engine.start();
//! // once per second:
//! if let Some(Event::TimerCompleted { .. }) = engine.tick() { /* done */ }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::events::Event;

/// Default tick volume, matching the quiet default of the tone generator.
pub const DEFAULT_VOLUME: f64 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerStatus {
    Idle,
    Running,
    Paused,
    /// Countdown reached zero. Leaves via `reset` or `set_duration`.
    Completed,
}

/// Full view of a timer, as handed to a UI or persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerState {
    pub total_duration: u64,
    pub remaining_time: u64,
    pub elapsed_time: u64,
    pub progress: f64,
    pub is_running: bool,
    pub is_paused: bool,
    pub is_completed: bool,
    /// ISO-8601 when set, `null` otherwise.
    pub start_time: Option<DateTime<Utc>>,
    pub actual_run_time: u64,
    /// Seconds spent in pauses that have already ended.
    #[serde(default)]
    pub paused_time: u64,
    /// When the current pause began, if paused.
    #[serde(default)]
    pub paused_at: Option<DateTime<Utc>>,
    #[serde(rename = "enableSound")]
    pub sound_enabled: bool,
    pub volume: f64,
}

/// The subset of [`TimerState`] needed to rebuild a timer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreState {
    pub total_duration: u64,
    pub remaining_time: u64,
    pub is_running: bool,
    pub is_paused: bool,
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub paused_time: Option<u64>,
    #[serde(default)]
    pub paused_at: Option<DateTime<Utc>>,
    #[serde(default, rename = "enableSound")]
    pub sound_enabled: Option<bool>,
    #[serde(default)]
    pub volume: Option<f64>,
}

impl From<&TimerState> for RestoreState {
    fn from(state: &TimerState) -> Self {
        Self {
            total_duration: state.total_duration,
            remaining_time: state.remaining_time,
            is_running: state.is_running,
            is_paused: state.is_paused,
            start_time: state.start_time,
            paused_time: Some(state.paused_time),
            paused_at: state.paused_at,
            sound_enabled: Some(state.sound_enabled),
            volume: Some(state.volume),
        }
    }
}

/// Per-second countdown timer.
#[derive(Debug, Clone)]
pub struct TimerEngine {
    total_duration: u64,
    remaining_time: u64,
    is_running: bool,
    is_paused: bool,
    /// Set by the first `start()`, never overwritten by a resume.
    start_time: Option<DateTime<Utc>>,
    /// Seconds spent paused between `start_time` and now.
    paused_secs: u64,
    paused_at: Option<DateTime<Utc>>,
    sound_enabled: bool,
    volume: f64,
}

impl Default for TimerEngine {
    fn default() -> Self {
        Self::new(0)
    }
}

impl TimerEngine {
    /// Create an idle timer counting down from `initial_duration` seconds.
    pub fn new(initial_duration: u64) -> Self {
        Self {
            total_duration: initial_duration,
            remaining_time: initial_duration,
            is_running: false,
            is_paused: false,
            start_time: None,
            paused_secs: 0,
            paused_at: None,
            sound_enabled: true,
            volume: DEFAULT_VOLUME,
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn status(&self) -> TimerStatus {
        if self.is_running {
            TimerStatus::Running
        } else if self.is_paused {
            TimerStatus::Paused
        } else if self.is_completed() {
            TimerStatus::Completed
        } else {
            TimerStatus::Idle
        }
    }

    pub fn total_duration(&self) -> u64 {
        self.total_duration
    }

    pub fn remaining_time(&self) -> u64 {
        self.remaining_time
    }

    pub fn is_running(&self) -> bool {
        self.is_running
    }

    pub fn is_paused(&self) -> bool {
        self.is_paused
    }

    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.start_time
    }

    pub fn sound_enabled(&self) -> bool {
        self.sound_enabled
    }

    pub fn volume(&self) -> f64 {
        self.volume
    }

    /// True when a tick would be audible.
    pub fn is_audible(&self) -> bool {
        self.sound_enabled && self.volume > 0.0
    }

    /// 0.0 ..= 100.0 progress through the countdown.
    pub fn progress(&self) -> f64 {
        if self.total_duration == 0 {
            return 0.0;
        }
        self.elapsed_time() as f64 / self.total_duration as f64 * 100.0
    }

    pub fn elapsed_time(&self) -> u64 {
        self.total_duration.saturating_sub(self.remaining_time)
    }

    pub fn is_completed(&self) -> bool {
        self.remaining_time == 0 && self.total_duration > 0
    }

    pub fn formatted_remaining_time(&self) -> String {
        format_time(self.remaining_time as i64)
    }

    pub fn formatted_elapsed_time(&self) -> String {
        format_time(self.elapsed_time() as i64)
    }

    pub fn formatted_total_duration(&self) -> String {
        format_time(self.total_duration as i64)
    }

    /// Wall-clock seconds since the first start, minus time spent paused.
    pub fn actual_run_time(&self) -> u64 {
        self.actual_run_time_at(Utc::now())
    }

    pub fn actual_run_time_at(&self, now: DateTime<Utc>) -> u64 {
        let Some(start) = self.start_time else {
            return 0;
        };
        let total = (now - start).num_seconds().max(0) as u64;
        let current_pause = self
            .paused_at
            .map(|at| (now - at).num_seconds().max(0) as u64)
            .unwrap_or(0);
        total.saturating_sub(self.paused_secs + current_pause)
    }

    pub fn timer_state(&self) -> TimerState {
        self.timer_state_at(Utc::now())
    }

    pub fn timer_state_at(&self, now: DateTime<Utc>) -> TimerState {
        TimerState {
            total_duration: self.total_duration,
            remaining_time: self.remaining_time,
            elapsed_time: self.elapsed_time(),
            progress: self.progress(),
            is_running: self.is_running,
            is_paused: self.is_paused,
            is_completed: self.is_completed(),
            start_time: self.start_time,
            actual_run_time: self.actual_run_time_at(now),
            paused_time: self.paused_secs,
            paused_at: self.paused_at,
            sound_enabled: self.sound_enabled,
            volume: self.volume,
        }
    }

    /// Build a state snapshot event.
    pub fn snapshot(&self) -> Event {
        Event::StateSnapshot {
            status: self.status(),
            remaining_time: self.remaining_time,
            total_duration: self.total_duration,
            progress_pct: self.progress(),
            formatted_remaining: self.formatted_remaining_time(),
            at: Utc::now(),
        }
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Idle/Paused -> Running. Returns `None` when already running or when
    /// there is no time left to count down.
    pub fn start(&mut self) -> Option<Event> {
        self.start_at(Utc::now())
    }

    pub fn start_at(&mut self, now: DateTime<Utc>) -> Option<Event> {
        if self.is_running || self.remaining_time == 0 {
            return None;
        }
        let resuming = self.is_paused;
        if self.start_time.is_none() {
            self.paused_secs = 0;
            self.paused_at = None;
        }
        self.close_pause(now);
        self.is_running = true;
        self.is_paused = false;
        self.start_time.get_or_insert(now);
        debug!(remaining = self.remaining_time, resuming, "timer running");

        Some(if resuming {
            Event::TimerResumed {
                remaining_time: self.remaining_time,
                at: now,
            }
        } else {
            Event::TimerStarted {
                total_duration: self.total_duration,
                remaining_time: self.remaining_time,
                at: now,
            }
        })
    }

    /// Running -> Paused. Returns `None` unless running.
    pub fn pause(&mut self) -> Option<Event> {
        self.pause_at(Utc::now())
    }

    pub fn pause_at(&mut self, now: DateTime<Utc>) -> Option<Event> {
        if !self.is_running {
            return None;
        }
        self.is_running = false;
        self.is_paused = true;
        self.paused_at = Some(now);
        debug!(remaining = self.remaining_time, "timer paused");
        Some(Event::TimerPaused {
            remaining_time: self.remaining_time,
            at: now,
        })
    }

    /// Paused -> Running only.
    pub fn resume(&mut self) -> Option<Event> {
        self.resume_at(Utc::now())
    }

    pub fn resume_at(&mut self, now: DateTime<Utc>) -> Option<Event> {
        if self.is_running || !self.is_paused {
            return None;
        }
        self.start_at(now)
    }

    /// Any state -> Idle. Leaves `remaining_time` where it is.
    pub fn stop(&mut self) -> Option<Event> {
        let now = Utc::now();
        let was_active = self.is_running || self.is_paused;
        self.close_pause(now);
        self.is_running = false;
        self.is_paused = false;
        if !was_active {
            return None;
        }
        debug!(remaining = self.remaining_time, "timer stopped");
        Some(Event::TimerStopped {
            remaining_time: self.remaining_time,
            at: now,
        })
    }

    /// Stop, then rewind to `new_duration` (or the current total).
    pub fn reset(&mut self, new_duration: Option<u64>) -> Event {
        self.stop();
        if let Some(duration) = new_duration {
            self.total_duration = duration;
        }
        self.remaining_time = self.total_duration;
        self.start_time = None;
        self.paused_secs = 0;
        self.paused_at = None;
        Event::TimerReset {
            total_duration: self.total_duration,
            at: Utc::now(),
        }
    }

    pub fn set_duration(&mut self, duration: u64) {
        self.total_duration = duration;
        self.remaining_time = duration;
        self.start_time = None;
        self.paused_secs = 0;
        self.paused_at = None;
    }

    pub fn add_time(&mut self, seconds: u64) {
        self.remaining_time = self.remaining_time.saturating_add(seconds);
        self.total_duration = self.total_duration.saturating_add(seconds);
    }

    /// Returns `false` (and changes nothing) if either value would go negative.
    pub fn subtract_time(&mut self, seconds: u64) -> bool {
        match (
            self.remaining_time.checked_sub(seconds),
            self.total_duration.checked_sub(seconds),
        ) {
            (Some(remaining), Some(total)) => {
                self.remaining_time = remaining;
                self.total_duration = total;
                true
            }
            _ => false,
        }
    }

    /// Flip the tick sound; returns the new setting.
    pub fn toggle_sound(&mut self) -> bool {
        self.sound_enabled = !self.sound_enabled;
        self.sound_enabled
    }

    pub fn set_volume(&mut self, volume: f64) {
        self.volume = if volume.is_nan() {
            0.0
        } else {
            volume.clamp(0.0, 1.0)
        };
    }

    /// One second elapsed. Returns `Some(Event::TimerCompleted)` on the tick
    /// that reaches zero, `Some(Event::TimerTicked)` otherwise, and `None`
    /// when the timer is not running.
    pub fn tick(&mut self) -> Option<Event> {
        if !self.is_running {
            return None;
        }
        if self.remaining_time > 0 {
            self.remaining_time -= 1;
        }
        let now = Utc::now();
        if self.remaining_time == 0 {
            self.stop();
            if self.total_duration == 0 {
                return None;
            }
            return Some(Event::TimerCompleted {
                total_duration: self.total_duration,
                at: now,
            });
        }
        Some(Event::TimerTicked {
            remaining_time: self.remaining_time,
            at: now,
        })
    }

    /// Rebuild from a snapshot. A running snapshot is started again (the
    /// caller must re-arm its tick); a paused one only gets its flag back.
    /// Pause bookkeeping carries over when the snapshot has it, so time
    /// spent paused before the restore is not counted as run time.
    pub fn restore_from_state(&mut self, state: &RestoreState) -> Option<Event> {
        self.total_duration = state.total_duration;
        self.remaining_time = state.remaining_time;
        self.start_time = state.start_time;
        self.is_running = false;
        self.is_paused = false;
        self.paused_secs = state.paused_time.unwrap_or(0);
        self.paused_at = None;
        if let Some(enabled) = state.sound_enabled {
            self.sound_enabled = enabled;
        }
        if let Some(volume) = state.volume {
            self.set_volume(volume);
        }

        if state.is_running {
            self.start()
        } else {
            if state.is_paused {
                self.is_paused = true;
                self.paused_at = Some(state.paused_at.unwrap_or_else(Utc::now));
            }
            None
        }
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn close_pause(&mut self, now: DateTime<Utc>) {
        if let Some(at) = self.paused_at.take() {
            self.paused_secs += (now - at).num_seconds().max(0) as u64;
        }
    }
}

/// Render seconds as `MM:SS`, ignoring the sign.
pub fn format_time(seconds: i64) -> String {
    let abs = seconds.unsigned_abs();
    format!("{:02}:{:02}", abs / 60, abs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use proptest::prelude::*;

    #[test]
    fn start_pause_resume() {
        let mut engine = TimerEngine::new(60);
        assert_eq!(engine.status(), TimerStatus::Idle);

        assert!(engine.start().is_some());
        assert_eq!(engine.status(), TimerStatus::Running);
        assert!(engine.start().is_none());

        assert!(engine.pause().is_some());
        assert_eq!(engine.status(), TimerStatus::Paused);
        assert!(engine.pause().is_none());

        assert!(matches!(engine.resume(), Some(Event::TimerResumed { .. })));
        assert_eq!(engine.status(), TimerStatus::Running);
    }

    #[test]
    fn resume_requires_paused() {
        let mut engine = TimerEngine::new(60);
        assert!(engine.resume().is_none());
        assert!(!engine.is_running());
    }

    #[test]
    fn start_time_survives_resume() {
        let t0 = Utc::now();
        let mut engine = TimerEngine::new(60);
        engine.start_at(t0);
        engine.pause_at(t0 + Duration::seconds(5));
        engine.resume_at(t0 + Duration::seconds(30));
        assert_eq!(engine.start_time(), Some(t0));
    }

    #[test]
    fn tick_counts_down_and_completes() {
        let mut engine = TimerEngine::new(3);
        engine.start();
        assert!(matches!(engine.tick(), Some(Event::TimerTicked { remaining_time: 2, .. })));
        assert!(matches!(engine.tick(), Some(Event::TimerTicked { remaining_time: 1, .. })));
        assert!(engine.tick().unwrap().is_completion());

        assert_eq!(engine.status(), TimerStatus::Completed);
        assert!(!engine.is_running());
        assert!(!engine.is_paused());
        assert!(engine.tick().is_none());
    }

    #[test]
    fn tick_ignored_while_paused() {
        let mut engine = TimerEngine::new(10);
        engine.start();
        engine.tick();
        engine.pause();
        assert!(engine.tick().is_none());
        assert_eq!(engine.remaining_time(), 9);
    }

    #[test]
    fn stop_keeps_remaining_time() {
        let mut engine = TimerEngine::new(10);
        engine.start();
        engine.tick();
        engine.tick();
        assert!(engine.stop().is_some());
        assert_eq!(engine.remaining_time(), 8);
        assert_eq!(engine.status(), TimerStatus::Idle);
        assert!(engine.stop().is_none());
    }

    #[test]
    fn reset_rewinds_and_clears_start() {
        let mut engine = TimerEngine::new(10);
        engine.start();
        engine.tick();
        engine.reset(None);
        assert_eq!(engine.remaining_time(), 10);
        assert!(engine.start_time().is_none());
        assert_eq!(engine.actual_run_time(), 0);

        engine.reset(Some(90));
        assert_eq!(engine.total_duration(), 90);
        assert_eq!(engine.remaining_time(), 90);
    }

    #[test]
    fn subtract_time_rejects_negative() {
        let mut engine = TimerEngine::new(30);
        engine.start();
        for _ in 0..20 {
            engine.tick();
        }
        assert!(!engine.subtract_time(15));
        assert_eq!(engine.remaining_time(), 10);
        assert_eq!(engine.total_duration(), 30);

        assert!(engine.subtract_time(10));
        assert_eq!(engine.remaining_time(), 0);
        assert_eq!(engine.total_duration(), 20);
    }

    #[test]
    fn add_time_grows_both() {
        let mut engine = TimerEngine::new(30);
        engine.add_time(30);
        assert_eq!(engine.remaining_time(), 60);
        assert_eq!(engine.total_duration(), 60);
    }

    #[test]
    fn progress_edges() {
        let engine = TimerEngine::new(0);
        assert_eq!(engine.progress(), 0.0);
        assert!(!engine.is_completed());

        let mut engine = TimerEngine::new(2);
        engine.start();
        engine.tick();
        assert_eq!(engine.progress(), 50.0);
        engine.tick();
        assert_eq!(engine.progress(), 100.0);
        assert!(engine.is_completed());
    }

    #[test]
    fn format_time_examples() {
        assert_eq!(format_time(0), "00:00");
        assert_eq!(format_time(65), "01:05");
        assert_eq!(format_time(-5), "00:05");
        assert_eq!(format_time(3600), "60:00");
    }

    #[test]
    fn actual_run_time_excludes_pause() {
        let t0 = Utc::now() - Duration::seconds(100);
        let mut engine = TimerEngine::new(600);
        assert_eq!(engine.actual_run_time_at(t0), 0);

        engine.start_at(t0);
        engine.pause_at(t0 + Duration::seconds(10));
        assert_eq!(engine.actual_run_time_at(t0 + Duration::seconds(40)), 10);
        engine.resume_at(t0 + Duration::seconds(40));
        assert_eq!(engine.actual_run_time_at(t0 + Duration::seconds(55)), 25);
    }

    #[test]
    fn actual_run_time_never_negative() {
        let t0 = Utc::now();
        let mut engine = TimerEngine::new(60);
        engine.start_at(t0);
        assert_eq!(engine.actual_run_time_at(t0 - Duration::seconds(10)), 0);
    }

    #[test]
    fn volume_is_clamped() {
        let mut engine = TimerEngine::new(60);
        engine.set_volume(3.0);
        assert_eq!(engine.volume(), 1.0);
        engine.set_volume(-1.0);
        assert_eq!(engine.volume(), 0.0);
        assert!(!engine.is_audible());
        engine.set_volume(f64::NAN);
        assert_eq!(engine.volume(), 0.0);
    }

    #[test]
    fn toggle_sound_flips() {
        let mut engine = TimerEngine::new(60);
        assert!(!engine.toggle_sound());
        assert!(!engine.is_audible());
        assert!(engine.toggle_sound());
    }

    #[test]
    fn state_roundtrip_through_json() {
        let mut engine = TimerEngine::new(120);
        engine.start();
        engine.tick();
        engine.pause();

        let json = serde_json::to_string(&engine.timer_state()).unwrap();
        assert!(json.contains("\"totalDuration\":120"));
        assert!(json.contains("\"isPaused\":true"));

        let state: TimerState = serde_json::from_str(&json).unwrap();
        let mut restored = TimerEngine::default();
        assert!(restored.restore_from_state(&RestoreState::from(&state)).is_none());
        assert_eq!(restored.total_duration(), 120);
        assert_eq!(restored.remaining_time(), 119);
        assert!(restored.is_paused());
        assert!(!restored.is_running());
        assert_eq!(restored.start_time(), engine.start_time());
    }

    #[test]
    fn restore_running_restarts() {
        let json = r#"{
            "totalDuration": 60,
            "remainingTime": 42,
            "isRunning": true,
            "isPaused": false,
            "startTime": "2026-01-01T10:00:00Z"
        }"#;
        let state: RestoreState = serde_json::from_str(json).unwrap();
        let mut engine = TimerEngine::default();
        assert!(engine.restore_from_state(&state).is_some());
        assert!(engine.is_running());
        assert_eq!(engine.remaining_time(), 42);
        assert_eq!(
            engine.start_time().map(|t| t.to_rfc3339()),
            Some("2026-01-01T10:00:00+00:00".to_string())
        );
        assert!(engine.sound_enabled());
    }

    #[test]
    fn zero_length_timer_never_starts() {
        let mut engine = TimerEngine::new(0);
        assert!(engine.start().is_none());
        assert!(!engine.is_running());
        assert!(engine.tick().is_none());
        assert!(engine.start_time().is_none());
    }

    #[test]
    fn emptied_running_timer_stops_without_completion() {
        let mut engine = TimerEngine::new(10);
        engine.start();
        assert!(engine.subtract_time(10));
        assert_eq!(engine.total_duration(), 0);
        assert!(engine.tick().is_none());
        assert!(!engine.is_running());
        assert!(!engine.is_completed());
    }

    #[test]
    fn completed_timer_does_not_restart() {
        let mut engine = TimerEngine::new(1);
        engine.start();
        assert!(engine.tick().unwrap().is_completion());
        assert!(engine.start().is_none());
        assert!(engine.is_completed());
    }

    #[test]
    fn restored_pause_keeps_run_time() {
        let t0 = Utc::now() - Duration::seconds(600);
        let mut engine = TimerEngine::new(900);
        engine.start_at(t0);
        engine.pause_at(t0 + Duration::seconds(20));
        engine.resume_at(t0 + Duration::seconds(50));
        engine.pause_at(t0 + Duration::seconds(80));
        let state = engine.timer_state_at(t0 + Duration::seconds(90));
        assert_eq!(state.actual_run_time, 50);
        assert_eq!(state.paused_time, 30);

        let json = serde_json::to_string(&state).unwrap();
        let state: TimerState = serde_json::from_str(&json).unwrap();
        let mut restored = TimerEngine::default();
        restored.restore_from_state(&RestoreState::from(&state));
        assert!(restored.is_paused());
        assert_eq!(restored.actual_run_time(), 50);
    }

    #[test]
    fn restored_run_keeps_earlier_pauses() {
        let t0 = Utc::now() - Duration::seconds(100);
        let mut engine = TimerEngine::new(900);
        engine.start_at(t0);
        engine.pause_at(t0 + Duration::seconds(10));
        engine.resume_at(t0 + Duration::seconds(40));

        let mut restored = TimerEngine::default();
        restored.restore_from_state(&RestoreState::from(&engine.timer_state()));
        assert!(restored.is_running());
        let now = Utc::now();
        assert_eq!(
            restored.actual_run_time_at(now),
            engine.actual_run_time_at(now)
        );
    }

    proptest! {
        #[test]
        fn set_duration_yields_idle_full_timer(d in 0u64..1_000_000) {
            let mut engine = TimerEngine::new(17);
            engine.start();
            engine.tick();
            engine.stop();
            engine.set_duration(d);
            let state = engine.timer_state();
            prop_assert_eq!(state.total_duration, d);
            prop_assert_eq!(state.remaining_time, d);
            prop_assert!(!state.is_running);
            prop_assert!(!state.is_paused);
        }

        #[test]
        fn pause_resume_preserves_remaining(d in 2u64..10_000, ticks in 0usize..50) {
            let mut engine = TimerEngine::new(d);
            engine.start();
            for _ in 0..ticks.min(d as usize - 1) {
                engine.tick();
            }
            let before = engine.remaining_time();
            engine.pause();
            engine.resume();
            prop_assert_eq!(engine.remaining_time(), before);
            prop_assert!(engine.is_running());
        }

        #[test]
        fn format_time_ignores_sign(s in -100_000i64..100_000) {
            prop_assert_eq!(format_time(s), format_time(-s));
            prop_assert!(format_time(s).len() >= 5);
        }
    }
}
