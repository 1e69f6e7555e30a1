//! # Fragtime Core Library
//!
//! This library provides the core logic for Fragtime, a countdown timer for
//! short bursts of work. Guests keep their history on this machine; signed-in
//! users store it in a remote backend and earn points for completed work.
//! The `fragtime` CLI is a thin layer over the same library.
//!
//! ## Architecture
//!
//! - **Timer**: A tick-driven countdown state machine, a Pomodoro cycle built
//!   on top of it, and a driver that owns the one-second tick
//! - **Storage**: SQLite key-value table, the expiring guest document, and
//!   TOML configuration
//! - **Data**: One adapter contract with local and remote implementations,
//!   selected per call from the session
//! - **Auth and migration**: Session lifecycle and the move of guest data into
//!   a new account
//! - **Catalog and account**: The shared task catalog, plus export, deletion
//!   and achievements over a user's history
//!
//! ## Key Components
//!
//! - [`TimerEngine`]: Countdown state machine
//! - [`TickDriver`]: Owns the recurring tick
//! - [`LocalStore`]: Guest data document
//! - [`DataService`]: Adapter routing and points refresh
//! - [`MigrationService`]: Guest-to-account migration
//! - [`AuthStore`]: Sign-in, sign-up, sign-out and guest mode
//! - [`TaskCatalog`]: Categories, recommendations and custom tasks
//! - [`AccountService`]: Export, deletion, streaks and achievements

pub mod account;
pub mod auth;
pub mod catalog;
pub mod data;
pub mod error;
pub mod events;
pub mod migration;
pub mod models;
pub mod points;
pub mod remote;
pub mod session;
pub mod storage;
pub mod timer;

pub use account::{AccountExport, AccountService, Achievements, DailyActivity, DeletionReport};
pub use auth::{AuthOutcome, AuthProvider, AuthStore, RestAuthProvider};
pub use catalog::TaskCatalog;
pub use data::{AdapterKind, DataAdapter, DataService, LocalAdapter, RemoteAdapter};
pub use error::{AuthError, BackendError, ConfigError, CoreError, StorageError, ValidationError};
pub use events::Event;
pub use migration::{MigrationReport, MigrationService};
pub use models::{
    Difficulty, NewTask, NewTaskRecord, PointsStats, PreferencePatch, Task, TaskCategory,
    TaskRecord, TaskRecordPatch, TaskStats, TaskStatus, UserPreference,
};
pub use points::{calculate_task_points, format_points, points_level, PointsService};
pub use remote::{MemoryBackend, RemoteBackend, RestBackend};
pub use session::{Session, SessionContext, User};
pub use storage::{Config, Database, KeyValueStore, LocalStore, MemoryStore};
pub use timer::{
    format_time, PomodoroMode, PomodoroSettings, PomodoroState, PomodoroTimer, RestoreState,
    TickDriver, TickSound, TimerEngine, TimerState, TimerStatus,
};
