use crate::applicator::{DEFAULT_GIT_PROGRAM, DEFAULT_PATCH_PROGRAM};
use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;

/// Default location of the installed-packages manifest, relative to the
/// project root.
pub const DEFAULT_MANIFEST: &str = "vendor/patchset-installed.json";

#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    #[serde(default)]
    pub tools: Tools,
    #[serde(default)]
    pub project: Project,
    #[serde(default)]
    pub installer: Option<InstallerSettings>,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Tools {
    #[serde(default = "default_patch")]
    pub patch: String,
    #[serde(default = "default_git")]
    pub git: String,
}

impl Default for Tools {
    fn default() -> Self {
        Self {
            patch: default_patch(),
            git: default_git(),
        }
    }
}

fn default_patch() -> String {
    DEFAULT_PATCH_PROGRAM.to_string()
}

fn default_git() -> String {
    DEFAULT_GIT_PROGRAM.to_string()
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Project {
    #[serde(default = "default_manifest")]
    pub manifest: PathBuf,
}

impl Default for Project {
    fn default() -> Self {
        Self {
            manifest: default_manifest(),
        }
    }
}

fn default_manifest() -> PathBuf {
    PathBuf::from(DEFAULT_MANIFEST)
}

/// Host command used to reinstall a package; `{name}` and `{version}` are
/// substituted per package.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct InstallerSettings {
    pub command: Vec<String>,
}

impl Settings {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();

        if self.tools.patch.trim().is_empty() {
            issues.push(ValidationIssue::EmptyValue { field: "tools.patch" });
        }
        if self.tools.git.trim().is_empty() {
            issues.push(ValidationIssue::EmptyValue { field: "tools.git" });
        }
        if self.project.manifest.as_os_str().is_empty() {
            issues.push(ValidationIssue::EmptyValue {
                field: "project.manifest",
            });
        }

        if let Some(installer) = &self.installer {
            match installer.command.first() {
                None => issues.push(ValidationIssue::EmptyValue {
                    field: "installer.command",
                }),
                Some(program) if program.trim().is_empty() => {
                    issues.push(ValidationIssue::EmptyValue {
                        field: "installer.command",
                    })
                }
                Some(_) => {}
            }
            if !installer.command.is_empty()
                && !installer.command.iter().any(|part| part.contains("{name}"))
            {
                issues.push(ValidationIssue::MissingPlaceholder {
                    field: "installer.command",
                    placeholder: "{name}",
                });
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }
}

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, issue) in self.issues.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationIssue {
    EmptyValue {
        field: &'static str,
    },
    MissingPlaceholder {
        field: &'static str,
        placeholder: &'static str,
    },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::EmptyValue { field } => write!(f, "'{field}' must not be empty"),
            ValidationIssue::MissingPlaceholder { field, placeholder } => {
                write!(f, "'{field}' must contain the {placeholder} placeholder")
            }
        }
    }
}
