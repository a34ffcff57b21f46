//! Applied-state store
//!
//! Each patched package records what was applied to it in a JSON file that
//! lives inside its own install directory. Reinstalling the package wipes the
//! record together with the patched sources.

use crate::error::PatchsetError;
use crate::hash::aggregate_hash;
use crate::logging::Logger;
use crate::package::{Package, Repository};
use crate::patch::{satisfies, PackagePatchApplication, Patch, PatchApplication};
use crate::resolver::ApplicationMap;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Current state file name.
pub const STATE_FILENAME: &str = "patches-applied.json";

/// Older name, still read but never written.
pub const LEGACY_STATE_FILENAME: &str = "composer.patches_applied.json";

#[derive(Debug, Serialize, Deserialize)]
struct StateRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    hash: Option<String>,
    #[serde(default)]
    patches: Vec<ApplicationRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApplicationRecord {
    hash: String,
    target_package: PackageRecord,
    #[serde(default)]
    source_package: Option<PackageRecord>,
    patch: Patch,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PackageRecord {
    name: String,
    version: String,
    #[serde(rename = "ref", default)]
    reference: Option<String>,
    /// Older records nest the reference as `source.reference`.
    #[serde(default, skip_serializing)]
    source: Option<LegacySource>,
}

#[derive(Debug, Clone, Deserialize)]
struct LegacySource {
    #[serde(default)]
    reference: Option<String>,
}

impl PackageRecord {
    fn from_package(package: &Package) -> Self {
        Self {
            name: package.name().to_string(),
            version: package.pretty_version().to_string(),
            reference: package.source_reference().map(str::to_string),
            source: None,
        }
    }

    fn reference(&self) -> Option<&str> {
        self.reference
            .as_deref()
            .or_else(|| self.source.as_ref().and_then(|s| s.reference.as_deref()))
    }

    fn label(&self) -> String {
        format!("{} ({})", self.name, self.version)
    }
}

pub struct StateStore<'a> {
    repository: &'a Repository,
    logger: &'a dyn Logger,
}

impl<'a> StateStore<'a> {
    pub fn new(repository: &'a Repository, logger: &'a dyn Logger) -> Self {
        Self { repository, logger }
    }

    /// Path of the state file for a package (current name).
    pub fn state_file(package: &Package) -> PathBuf {
        package.install_path().join(STATE_FILENAME)
    }

    /// Existing state file for a package, preferring the current name.
    pub fn existing_state_file(package: &Package) -> Option<PathBuf> {
        [STATE_FILENAME, LEGACY_STATE_FILENAME]
            .iter()
            .map(|name| package.install_path().join(name))
            .find(|path| path.exists())
    }

    /// Load the recorded application of every non-alias package.
    pub fn load_all(&self) -> Result<ApplicationMap, PatchsetError> {
        let mut installed = ApplicationMap::new();

        for package in self.repository.packages() {
            if package.is_alias() {
                continue;
            }
            if let Some(application) = self.load(package)? {
                installed.insert(package.name().to_string(), application);
            }
        }

        Ok(installed)
    }

    /// Recorded application for one package; `None` when it was never patched.
    pub fn load(
        &self,
        package: &Arc<Package>,
    ) -> Result<Option<PackagePatchApplication>, PatchsetError> {
        let Some(path) = Self::existing_state_file(package) else {
            return Ok(None);
        };

        let contents = fs::read_to_string(&path).map_err(|source| PatchsetError::StateRead {
            path: path.clone(),
            source,
        })?;
        let record: StateRecord =
            serde_json::from_str(&contents).map_err(|source| PatchsetError::StateParse {
                path: path.clone(),
                source,
            })?;

        let recorded_reference = record
            .patches
            .first()
            .and_then(|entry| entry.target_package.reference())
            .map(str::to_string);

        let mut applications = Vec::with_capacity(record.patches.len());
        for entry in record.patches {
            applications.push(self.hydrate(package, entry, &path)?);
        }

        let hash = record.hash.unwrap_or_else(|| {
            aggregate_hash(
                recorded_reference.as_deref().or(package.source_reference()),
                applications.iter().map(PatchApplication::hash),
            )
        });

        self.logger.debug(&format!(
            "Loaded {} applied patches for {} from {}",
            applications.len(),
            package.name(),
            path.display()
        ));

        Ok(Some(PackagePatchApplication::with_hash(
            package.clone(),
            applications,
            hash,
        )))
    }

    fn hydrate(
        &self,
        owner: &Arc<Package>,
        entry: ApplicationRecord,
        path: &Path,
    ) -> Result<PatchApplication, PatchsetError> {
        let source = entry.source_package.as_ref().and_then(|record| {
            let found = self.repository.find_version(&record.name, &record.version);
            if found.is_none() {
                self.logger.debug(&format!(
                    "Could not find source package {} for installed patch, it was removed probably",
                    record.label()
                ));
            }
            found.cloned()
        });

        let target = self
            .match_target(owner, &entry.target_package, &entry.patch)
            .ok_or_else(|| PatchsetError::UnresolvedTarget {
                name: entry.target_package.name.clone(),
                version: entry.target_package.version.clone(),
                state_file: path.to_path_buf(),
            })?;

        Ok(PatchApplication::new(entry.patch, source, target, entry.hash))
    }

    /// The package owning the state file wins when it plausibly is the
    /// recorded target; otherwise fall back to an exact lookup.
    fn match_target(
        &self,
        owner: &Arc<Package>,
        recorded: &PackageRecord,
        patch: &Patch,
    ) -> Option<Arc<Package>> {
        if owner.name() == recorded.name {
            if owner.has_version(&recorded.version)
                || satisfies(owner.version(), patch.version_constraint()).unwrap_or(false)
            {
                return Some(owner.clone());
            }

            self.logger.warning(&format!(
                "Could not find installed package {} matching version {} loaded from applied patch. \
                 Name and location check out, but it might indicate a potential problem. Continuing...",
                owner.label(),
                recorded.label()
            ));
        }

        self.repository
            .find_version(&recorded.name, &recorded.version)
            .cloned()
    }

    /// Drop any state file left behind for `package`. Returns how many were removed.
    pub fn clear(&self, package: &Package) -> Result<usize, PatchsetError> {
        let mut removed = 0;
        for name in [STATE_FILENAME, LEGACY_STATE_FILENAME] {
            let path = package.install_path().join(name);
            if !path.exists() {
                continue;
            }
            fs::remove_file(&path).map_err(|source| PatchsetError::StateWrite {
                path: path.clone(),
                source,
            })?;
            self.logger
                .debug(&format!("Removed stale state file {}", path.display()));
            removed += 1;
        }
        Ok(removed)
    }

    /// Persist a package application as the package's new state.
    pub fn save(&self, application: &PackagePatchApplication) -> Result<PathBuf, PatchsetError> {
        let path = Self::state_file(application.target_package());
        ensure_writable(&path)?;

        let record = StateRecord {
            hash: Some(application.hash().to_string()),
            patches: application
                .applications()
                .iter()
                .map(|a| ApplicationRecord {
                    hash: a.hash().to_string(),
                    target_package: PackageRecord::from_package(a.target_package()),
                    source_package: a.source_package().map(|p| PackageRecord::from_package(p)),
                    patch: a.patch().clone(),
                })
                .collect(),
        };

        let encoded = encode_pretty(&record).map_err(|source| PatchsetError::StateWrite {
            path: path.clone(),
            source: source.into(),
        })?;
        atomic_write(&path, &encoded).map_err(|source| PatchsetError::StateWrite {
            path: path.clone(),
            source,
        })?;

        self.logger.debug(&format!(
            "Saved {} applied patches for {} to {}",
            application.applications().len(),
            application.target_package().name(),
            path.display()
        ));

        Ok(path)
    }
}

fn ensure_writable(path: &Path) -> Result<(), PatchsetError> {
    if path.exists() {
        return OpenOptions::new()
            .append(true)
            .open(path)
            .map(|_| ())
            .map_err(|_| PatchsetError::StateNotWritable {
                path: path.to_path_buf(),
            });
    }

    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    tempfile::NamedTempFile::new_in(parent)
        .map(|_| ())
        .map_err(|_| PatchsetError::DirectoryNotWritable {
            path: parent.to_path_buf(),
        })
}

/// Pretty JSON with 4-space indentation; slashes and unicode stay unescaped.
fn encode_pretty<T: Serialize>(value: &T) -> Result<Vec<u8>, serde_json::Error> {
    let mut out = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    value.serialize(&mut serializer)?;
    Ok(out)
}

/// Atomic file write: tempfile + fsync + rename.
fn atomic_write(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(content)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
