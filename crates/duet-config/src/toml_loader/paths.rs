//! Where the shared duet config lives, and writing its first copy.
//!
//! The relay binary and participant runtimes on one machine read the same
//! file, so the default is only ever written when no file exists yet.

use duet_common::ConfigError;
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::template::default_config_toml;

const APP_DIR: &str = "duet";
const FILE_NAME: &str = "config.toml";

/// `<platform config dir>/duet/config.toml`, e.g. `~/.config/duet/config.toml`
/// on Linux.
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    dirs::config_dir()
        .map(|dir| dir.join(APP_DIR).join(FILE_NAME))
        .ok_or_else(|| ConfigError::ParseError("could not determine config directory".into()))
}

/// Write the commented default config to `path`, creating parent
/// directories. An existing file is left untouched; returns whether a
/// file was written.
pub fn create_default_config(path: &Path) -> Result<bool, ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| write_error(parent, "create directory", e))?;
    }

    let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            debug!(path = %path.display(), "Config appeared concurrently, keeping it");
            return Ok(false);
        }
        Err(e) => return Err(write_error(path, "create", e)),
    };
    file.write_all(default_config_toml().as_bytes())
        .map_err(|e| write_error(path, "write", e))?;

    info!(path = %path.display(), "Created default config");
    Ok(true)
}

fn write_error(path: &Path, action: &str, e: std::io::Error) -> ConfigError {
    ConfigError::ParseError(format!("failed to {action} {}: {e}", path.display()))
}
