use crate::error::PatchsetError;
use crate::package::Package;
use crate::patch::version::{self, VersionError, ANY_VERSION};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// How a patch file is applied to the target tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchMethod {
    /// `patch`, falling back to `git apply` when the binary is missing.
    #[default]
    Patch,
    /// Always `git apply`.
    Git,
}

impl PatchMethod {
    pub const ALL: [PatchMethod; 2] = [PatchMethod::Patch, PatchMethod::Git];

    pub fn as_str(self) -> &'static str {
        match self {
            PatchMethod::Patch => "patch",
            PatchMethod::Git => "git",
        }
    }

    /// Closest allowed method name, for error hints.
    pub fn suggest(input: &str) -> Option<&'static str> {
        let input = input.trim().to_ascii_lowercase();
        Self::ALL
            .iter()
            .map(|m| (m.as_str(), strsim::damerau_levenshtein(&input, m.as_str())))
            .filter(|(_, distance)| *distance <= 2)
            .min_by_key(|(_, distance)| *distance)
            .map(|(name, _)| name)
    }
}

impl fmt::Display for PatchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PatchMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "patch" => Ok(PatchMethod::Patch),
            "git" => Ok(PatchMethod::Git),
            other => Err(other.to_string()),
        }
    }
}

/// One declared patch. Immutable once built.
///
/// Equality compares every field ("same declaration"); identical applied
/// content is detected separately through the patch file hash.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Patch {
    source_package: String,
    target_package: String,
    #[serde(default = "default_constraint", deserialize_with = "constraint_or_any")]
    version_constraint: String,
    filename: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default = "default_strip")]
    strip_path_components: u32,
    #[serde(default)]
    method: PatchMethod,
    #[serde(default)]
    keep_empty_files: bool,
}

fn default_constraint() -> String {
    ANY_VERSION.to_string()
}

fn default_strip() -> u32 {
    1
}

/// Legacy records may store `null` where "any version" was meant.
fn constraint_or_any<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value.unwrap_or_else(default_constraint))
}

/// Per-patch option map as written in a patchset declaration. Keys other
/// than these are annotations for other tools and are ignored.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct PatchOptions {
    filename: String,
    #[serde(default, alias = "version_constraint")]
    version_constraint: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default, alias = "strip_path_components")]
    strip_path_components: Option<u32>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default, alias = "keep_empty_files")]
    keep_empty_files: Option<bool>,
}

impl Patch {
    pub fn new(
        source_package: impl Into<String>,
        target_package: impl Into<String>,
        filename: impl Into<String>,
    ) -> Self {
        Self {
            source_package: source_package.into(),
            target_package: target_package.into(),
            version_constraint: default_constraint(),
            filename: filename.into(),
            description: None,
            strip_path_components: default_strip(),
            method: PatchMethod::default(),
            keep_empty_files: false,
        }
    }

    pub fn with_version_constraint(mut self, constraint: impl Into<String>) -> Self {
        self.version_constraint = constraint.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_strip_path_components(mut self, strip: u32) -> Self {
        self.strip_path_components = strip;
        self
    }

    pub fn with_method(mut self, method: PatchMethod) -> Self {
        self.method = method;
        self
    }

    pub fn with_keep_empty_files(mut self, keep: bool) -> Self {
        self.keep_empty_files = keep;
        self
    }

    /// Build a patch from one option map of a patchset declaration.
    pub fn from_options(
        source_package: &str,
        target_package: &str,
        options: &Value,
    ) -> Result<Self, PatchsetError> {
        let malformed = |reason: String| PatchsetError::MalformedDeclaration {
            patchset: source_package.to_string(),
            target: target_package.to_string(),
            reason,
        };

        let options = PatchOptions::deserialize(options).map_err(|e| malformed(e.to_string()))?;

        if options.filename.trim().is_empty() {
            return Err(malformed("empty filename".to_string()));
        }

        let method = match options.method.as_deref() {
            None => PatchMethod::default(),
            Some(raw) => raw.parse().map_err(|method: String| {
                PatchsetError::UnsupportedMethod {
                    patchset: source_package.to_string(),
                    target: target_package.to_string(),
                    suggestion: PatchMethod::suggest(&method).map(str::to_string),
                    method,
                }
            })?,
        };

        let version_constraint = options.version_constraint.unwrap_or_else(default_constraint);
        if !version::is_any(&version_constraint) {
            version::parse_constraint(&version_constraint).map_err(|source| {
                PatchsetError::InvalidConstraint {
                    patchset: source_package.to_string(),
                    constraint: version_constraint.clone(),
                    source,
                }
            })?;
        }

        Ok(Self {
            source_package: source_package.to_string(),
            target_package: target_package.to_string(),
            version_constraint,
            filename: options.filename,
            description: options.description,
            strip_path_components: options.strip_path_components.unwrap_or_else(default_strip),
            method,
            keep_empty_files: options.keep_empty_files.unwrap_or(false),
        })
    }

    /// Whether this patch targets `package` at its resolved version.
    ///
    /// A package version that cannot be parsed only satisfies `*`.
    pub fn can_be_applied_to(&self, package: &Package) -> bool {
        self.applies_to(package).unwrap_or(false)
    }

    /// Like [`Patch::can_be_applied_to`] but reports why the version check
    /// could not be evaluated.
    pub fn applies_to(&self, package: &Package) -> Result<bool, VersionError> {
        if package.name() != self.target_package {
            return Ok(false);
        }

        version::satisfies(package.version(), &self.version_constraint)
    }

    /// Location of the patch file inside the declaring package.
    pub fn file_path(&self, source: &Package) -> PathBuf {
        source
            .install_path()
            .join(self.filename.trim_start_matches('/'))
    }

    pub fn source_package(&self) -> &str {
        &self.source_package
    }

    pub fn target_package(&self) -> &str {
        &self.target_package
    }

    pub fn version_constraint(&self) -> &str {
        &self.version_constraint
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn strip_path_components(&self) -> u32 {
        self.strip_path_components
    }

    pub fn method(&self) -> PatchMethod {
        self.method
    }

    pub fn keep_empty_files(&self) -> bool {
        self.keep_empty_files
    }
}
