use std::path::{Path, PathBuf};

use tracing::debug;

use crate::{error::ConfigError, schema::GqlragConfig};

pub const CONFIG_FILE_NAME: &str = "gqlrag.toml";

/// `gqlrag.toml` in the platform config directory, if one can be resolved.
pub fn user_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "gqlrag", "gqlrag")
        .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
}

/// Find the config file to use.
///
/// An explicit path always wins, even if it does not exist (loading it then
/// reports the error). Otherwise `./gqlrag.toml` is tried before the user
/// config directory.
pub fn discover(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let cwd = std::env::current_dir().ok()?;
    discover_in(&cwd, user_config_path().as_deref())
}

fn discover_in(cwd: &Path, user_path: Option<&Path>) -> Option<PathBuf> {
    let local = cwd.join(CONFIG_FILE_NAME);
    if local.is_file() {
        return Some(local);
    }
    user_path.filter(|p| p.is_file()).map(Path::to_path_buf)
}

pub fn load_from(path: &Path) -> Result<GqlragConfig, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), "loaded config");
    Ok(config)
}

/// Load the discovered config, or defaults when there is none.
/// Returns the path that was read alongside the config.
pub fn load(explicit: Option<&Path>) -> Result<(GqlragConfig, Option<PathBuf>), ConfigError> {
    match discover(explicit) {
        Some(path) => {
            let config = load_from(&path)?;
            Ok((config, Some(path)))
        },
        None => {
            debug!("no config file found, using defaults");
            Ok((GqlragConfig::default(), None))
        },
    }
}
