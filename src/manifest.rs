//! Installed-packages manifest.
//!
//! A JSON snapshot of the resolved dependency set written by the host
//! package manager. Relative paths are resolved against the project root.
//!
//! ```json
//! {
//!     "root": {"name": "acme/project", "version": "dev-main", "extra": {}},
//!     "packages": [
//!         {
//!             "name": "vendor/lib",
//!             "version": "1.2.0",
//!             "source_reference": "abc123",
//!             "install_path": "vendor/vendor/lib",
//!             "dist_path": "vendor/.dist/vendor/lib"
//!         }
//!     ]
//! }
//! ```

use crate::package::{Package, PackageKind, Repository};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("failed to read package manifest {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse package manifest {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("package manifest {} lists {name} more than once", path.display())]
    Duplicate { path: PathBuf, name: String },
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ManifestFile {
    root: RootEntry,
    #[serde(default)]
    packages: Vec<PackageEntry>,
}

#[derive(Debug, Deserialize)]
struct RootEntry {
    name: String,
    #[serde(default = "root_version")]
    version: String,
    #[serde(default)]
    pretty_version: Option<String>,
    #[serde(default)]
    install_path: Option<PathBuf>,
    #[serde(default)]
    extra: Map<String, Value>,
}

fn root_version() -> String {
    "dev-main".to_string()
}

#[derive(Debug, Deserialize)]
struct PackageEntry {
    name: String,
    version: String,
    #[serde(default)]
    pretty_version: Option<String>,
    #[serde(default, rename = "type")]
    package_type: Option<String>,
    #[serde(default)]
    source_reference: Option<String>,
    install_path: PathBuf,
    #[serde(default)]
    dist_path: Option<PathBuf>,
    #[serde(default)]
    extra: Map<String, Value>,
    /// Name of the package this entry aliases.
    #[serde(default)]
    alias_of: Option<String>,
}

/// Parsed manifest: the package snapshot plus where pristine copies live.
#[derive(Debug, Clone)]
pub struct Manifest {
    repository: Repository,
    dist_paths: BTreeMap<String, PathBuf>,
}

impl Manifest {
    pub fn load(path: &Path, project_root: &Path) -> Result<Self, ManifestError> {
        let contents = fs::read_to_string(path).map_err(|source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let file: ManifestFile =
            serde_json::from_str(&contents).map_err(|source| ManifestError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_file(file, path, project_root)
    }

    fn from_file(
        file: ManifestFile,
        path: &Path,
        project_root: &Path,
    ) -> Result<Self, ManifestError> {
        let resolve = |p: &Path| {
            if p.is_absolute() {
                p.to_path_buf()
            } else {
                project_root.join(p)
            }
        };

        let root = file.root;
        let mut root_package = Package::new(
            root.name,
            root.version,
            root.install_path
                .as_deref()
                .map(resolve)
                .unwrap_or_else(|| project_root.to_path_buf()),
        )
        .with_kind(PackageKind::Root)
        .with_type("project")
        .with_extra(root.extra);
        if let Some(pretty) = root.pretty_version {
            root_package = root_package.with_pretty_version(pretty);
        }

        let mut packages = vec![root_package];
        let mut dist_paths = BTreeMap::new();

        for entry in file.packages {
            let is_alias = entry.alias_of.is_some();
            let duplicate = packages
                .iter()
                .any(|p: &Package| !p.is_alias() && p.name() == entry.name);
            if !is_alias && duplicate {
                return Err(ManifestError::Duplicate {
                    path: path.to_path_buf(),
                    name: entry.name,
                });
            }

            let mut package =
                Package::new(&entry.name, entry.version, resolve(&entry.install_path))
                    .with_extra(entry.extra);
            if let Some(pretty) = entry.pretty_version {
                package = package.with_pretty_version(pretty);
            }
            if let Some(package_type) = entry.package_type {
                package = package.with_type(package_type);
            }
            if let Some(reference) = entry.source_reference {
                package = package.with_source_reference(reference);
            }
            if is_alias {
                package = package.with_kind(PackageKind::Alias);
            } else if let Some(dist) = entry.dist_path {
                dist_paths.insert(entry.name, resolve(&dist));
            }
            packages.push(package);
        }

        Ok(Self {
            repository: Repository::new(packages),
            dist_paths,
        })
    }

    pub fn repository(&self) -> &Repository {
        &self.repository
    }

    pub fn dist_paths(&self) -> &BTreeMap<String, PathBuf> {
        &self.dist_paths
    }

    pub fn into_parts(self) -> (Repository, BTreeMap<String, PathBuf>) {
        (self.repository, self.dist_paths)
    }
}
