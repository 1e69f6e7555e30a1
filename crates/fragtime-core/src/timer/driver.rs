//! Owns the recurring one-second tick for a [`TimerEngine`].
//!
//! The driver keeps at most one tick task alive. Arming always aborts the
//! previous handle first, and pause/stop/reset/drop disarm it. All methods
//! that may arm a tick must run inside a Tokio runtime.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

use super::engine::{RestoreState, TimerEngine, TimerState};
use super::sound::TickSound;
use crate::events::Event;

pub const TICK_PERIOD: Duration = Duration::from_secs(1);
const EVENT_CAPACITY: usize = 64;

pub struct TickDriver {
    engine: Arc<Mutex<TimerEngine>>,
    sound: Arc<TickSound>,
    events: broadcast::Sender<Event>,
    ticker: Option<JoinHandle<()>>,
}

impl TickDriver {
    pub fn new(engine: TimerEngine, sound: TickSound) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            engine: Arc::new(Mutex::new(engine)),
            sound: Arc::new(sound),
            events,
            ticker: None,
        }
    }

    /// Receive every event the timer produces from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    pub fn state(&self) -> TimerState {
        self.engine().timer_state()
    }

    /// Run a read-only closure against the engine.
    pub fn inspect<R>(&self, f: impl FnOnce(&TimerEngine) -> R) -> R {
        f(&self.engine())
    }

    /// Number of tick tasks currently alive (0 or 1).
    pub fn live_ticks(&self) -> usize {
        self.ticker
            .as_ref()
            .map_or(0, |handle| usize::from(!handle.is_finished()))
    }

    // ── Commands ─────────────────────────────────────────────────────

    pub fn start(&mut self) -> Option<Event> {
        let event = self.engine().start();
        if event.is_some() {
            self.arm();
        }
        self.publish(event)
    }

    pub fn pause(&mut self) -> Option<Event> {
        let event = self.engine().pause();
        self.disarm();
        self.publish(event)
    }

    pub fn resume(&mut self) -> Option<Event> {
        let event = self.engine().resume();
        if event.is_some() {
            self.arm();
        }
        self.publish(event)
    }

    pub fn stop(&mut self) -> Option<Event> {
        self.disarm();
        let event = self.engine().stop();
        self.publish(event)
    }

    pub fn reset(&mut self, new_duration: Option<u64>) -> Event {
        self.disarm();
        let event = self.engine().reset(new_duration);
        let _ = self.events.send(event.clone());
        event
    }

    pub fn set_duration(&mut self, duration: u64) {
        self.engine().set_duration(duration);
    }

    pub fn add_time(&mut self, seconds: u64) {
        self.engine().add_time(seconds);
    }

    pub fn subtract_time(&mut self, seconds: u64) -> bool {
        self.engine().subtract_time(seconds)
    }

    pub fn toggle_sound(&mut self) -> bool {
        self.engine().toggle_sound()
    }

    pub fn set_volume(&mut self, volume: f64) {
        self.engine().set_volume(volume);
    }

    pub fn restore_from_state(&mut self, state: &RestoreState) -> Option<Event> {
        self.disarm();
        let (event, running) = {
            let mut engine = self.engine();
            let event = engine.restore_from_state(state);
            (event, engine.is_running())
        };
        if running {
            self.arm();
        }
        self.publish(event)
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn engine(&self) -> MutexGuard<'_, TimerEngine> {
        self.engine.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn publish(&self, event: Option<Event>) -> Option<Event> {
        if let Some(ev) = &event {
            let _ = self.events.send(ev.clone());
        }
        event
    }

    fn arm(&mut self) {
        self.disarm();
        let engine = Arc::clone(&self.engine);
        let sound = Arc::clone(&self.sound);
        let events = self.events.clone();

        self.ticker = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + TICK_PERIOD, TICK_PERIOD);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let (event, audible, volume) = {
                    let mut engine = engine.lock().unwrap_or_else(|p| p.into_inner());
                    (engine.tick(), engine.is_audible(), engine.volume())
                };
                let Some(event) = event else {
                    break;
                };
                if audible {
                    sound.play_tick(volume);
                }
                let done = event.is_completion();
                let _ = events.send(event);
                if done {
                    debug!("countdown finished, tick task exiting");
                    break;
                }
            }
        }));
    }

    fn disarm(&mut self) {
        if let Some(handle) = self.ticker.take() {
            handle.abort();
        }
    }
}

impl Drop for TickDriver {
    fn drop(&mut self) {
        self.disarm();
        self.sound.close();
    }
}
