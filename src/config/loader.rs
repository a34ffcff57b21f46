use crate::config::schema::{Settings, ValidationError};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Settings file looked up in the project root when none is given.
pub const SETTINGS_FILENAME: &str = "patchset.toml";

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("failed to read settings from {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse settings{}: {source}", located(path))]
    Toml {
        path: Option<PathBuf>,
        source: toml_edit::de::Error,
    },

    #[error("invalid settings{}: {source}", located(path))]
    Validation {
        path: Option<PathBuf>,
        source: ValidationError,
    },
}

fn located(path: &Option<PathBuf>) -> String {
    path.as_ref()
        .map(|p| format!(" in {}", p.display()))
        .unwrap_or_default()
}

/// Settings from TOML text that did not come from a file.
pub fn load_from_str(input: &str) -> Result<Settings, SettingsError> {
    parse(input, None)
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<Settings, SettingsError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|source| SettingsError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse(&contents, Some(path))
}

/// An explicit path must exist; otherwise `patchset.toml` in the project
/// root is used when present, defaults when not.
pub fn discover(project_root: &Path, explicit: Option<&Path>) -> Result<Settings, SettingsError> {
    let candidate = match explicit {
        Some(path) => path.to_path_buf(),
        None => project_root.join(SETTINGS_FILENAME),
    };

    if explicit.is_none() && !candidate.is_file() {
        return Ok(Settings::default());
    }
    load_from_path(&candidate)
}

fn parse(input: &str, origin: Option<&Path>) -> Result<Settings, SettingsError> {
    let path = || origin.map(Path::to_path_buf);

    let settings: Settings = toml_edit::de::from_str(input).map_err(|source| {
        SettingsError::Toml {
            path: path(),
            source,
        }
    })?;
    settings
        .validate()
        .map_err(|source| SettingsError::Validation {
            path: path(),
            source,
        })?;

    Ok(settings)
}
