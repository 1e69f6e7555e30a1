pub mod account;
pub mod auth;
pub mod config;
pub mod migrate;
pub mod points;
pub mod pomodoro;
pub mod prefs;
pub mod record;
pub mod stats;
pub mod task;
pub mod timer;
