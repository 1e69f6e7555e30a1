mod driver;
mod engine;
mod pomodoro;
pub mod sound;

pub use driver::{TickDriver, TICK_PERIOD};
pub use engine::{format_time, RestoreState, TimerEngine, TimerState, TimerStatus, DEFAULT_VOLUME};
pub use pomodoro::{PomodoroMode, PomodoroSettings, PomodoroState, PomodoroTimer};
pub use sound::{AudioError, NullSink, TickSound, ToneSink, ToneSpec};
