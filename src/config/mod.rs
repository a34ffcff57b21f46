pub mod loader;
pub mod schema;

pub use loader::{discover, load_from_path, load_from_str, SettingsError, SETTINGS_FILENAME};
pub use schema::{
    InstallerSettings, Project, Settings, Tools, ValidationError, ValidationIssue,
    DEFAULT_MANIFEST,
};
