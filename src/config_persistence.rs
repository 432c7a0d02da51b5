use std::path::{Path, PathBuf};

use log::info;

use crate::config::{Config, ConfigError};

const APP_DIR_NAME: &str = "placeshot";
const CONFIG_FILE_NAME: &str = "config.toml";
const DATABASE_FILE_NAME: &str = "places.db";

/// Default config location under the platform config directory.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|path| path.join(APP_DIR_NAME).join(CONFIG_FILE_NAME))
}

/// Default SQLite location under the platform data directory.
pub fn default_database_path() -> Option<PathBuf> {
    dirs::data_dir().map(|path| path.join(APP_DIR_NAME).join(DATABASE_FILE_NAME))
}

pub fn parse_config_text(text: &str, path: &Path) -> Result<Config, ConfigError> {
    toml::from_str::<Config>(text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Writes `Config::default()` to `path`, creating parent directories.
pub fn write_default_config(path: &Path) -> Result<Config, ConfigError> {
    let default_config = Config::default();
    let text = toml::to_string(&default_config)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    std::fs::write(path, text).map_err(|source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(default_config)
}

/// Loads the config at `path`, creating a default one when the file is missing.
pub fn load_or_create_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        info!(
            "Config file not found. Creating default config. path={}",
            path.display()
        );
        return write_default_config(path);
    }
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config_text(&text, path)
}
