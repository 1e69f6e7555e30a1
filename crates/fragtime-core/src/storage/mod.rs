mod config;
pub mod database;
pub mod local;

pub use config::{BackendConfig, Config, GuestConfig, PomodoroConfig, TimerConfig};
pub use database::{Database, KeyValueStore, MemoryStore};
pub use local::{GuestData, GuestDataSummary, LocalStore};

use std::path::PathBuf;

use crate::error::StorageError;

/// Returns the data directory, creating it if needed.
///
/// `FRAGTIME_DATA_DIR` wins when set; otherwise `~/.config/fragtime`, or
/// `~/.config/fragtime-dev` when `FRAGTIME_ENV=dev`.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, StorageError> {
    let dir = match std::env::var_os("FRAGTIME_DATA_DIR") {
        Some(custom) => PathBuf::from(custom),
        None => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");
            let env = std::env::var("FRAGTIME_ENV").unwrap_or_else(|_| "production".to_string());
            if env == "dev" {
                base_dir.join("fragtime-dev")
            } else {
                base_dir.join("fragtime")
            }
        }
    };

    std::fs::create_dir_all(&dir)
        .map_err(|e| StorageError::DataDir(format!("{}: {e}", dir.display())))?;
    Ok(dir)
}
