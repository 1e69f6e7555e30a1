use clap::Subcommand;
use fragtime_core::{Config, ConfigError};

use crate::context::CliResult;

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Get a config value
    Get {
        /// Dot-separated key (e.g. "timer.volume", "backend.url")
        key: String,
    },
    /// Set a config value
    Set {
        /// Config key
        key: String,
        /// New value
        value: String,
    },
    /// List all config values
    List,
    /// Reset config to defaults
    Reset,
    /// Print the config file location
    Path,
}

/// Environment overrides are left out so `set` never writes them to disk.
fn load_file() -> Result<Config, ConfigError> {
    Config::load_from(&Config::path()?)
}

pub fn run(action: ConfigAction) -> CliResult {
    match action {
        ConfigAction::Get { key } => {
            let config = load_file()?;
            match config.get(&key) {
                Some(value) => println!("{value}"),
                None => return Err(ConfigError::UnknownKey(key).into()),
            }
        }
        ConfigAction::Set { key, value } => {
            let mut config = load_file()?;
            config.set(&key, &value)?;
            println!("ok");
        }
        ConfigAction::List => {
            for (key, value) in load_file()?.entries() {
                println!("{key} = {value}");
            }
        }
        ConfigAction::Reset => {
            Config::default().save()?;
            println!("config reset to defaults");
        }
        ConfigAction::Path => println!("{}", Config::path()?.display()),
    }
    Ok(())
}
