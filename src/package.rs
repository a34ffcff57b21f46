//! Read-only view of resolved packages.
//!
//! A [`Repository`] is built once per run and never mutated. Everything the
//! engine knows about a package comes from the capability set exposed here.

use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Package type that marks a patchset.
pub const PATCHSET_TYPE: &str = "patchset";

/// Extra field holding patch declarations.
pub const PATCHSET_EXTRA: &str = "patchset";

/// Extra field holding ignored patch filenames.
pub const PATCHSET_IGNORE_EXTRA: &str = "patchset-ignore";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PackageKind {
    /// The project itself.
    Root,
    #[default]
    Regular,
    /// A version alias of another package.
    Alias,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Package {
    name: String,
    version: String,
    pretty_version: String,
    source_reference: Option<String>,
    install_path: PathBuf,
    package_type: String,
    kind: PackageKind,
    extra: Map<String, Value>,
}

impl Package {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        install_path: impl Into<PathBuf>,
    ) -> Self {
        let version = version.into();
        Self {
            name: name.into(),
            pretty_version: version.clone(),
            version,
            source_reference: None,
            install_path: install_path.into(),
            package_type: "library".to_string(),
            kind: PackageKind::Regular,
            extra: Map::new(),
        }
    }

    pub fn with_pretty_version(mut self, pretty_version: impl Into<String>) -> Self {
        self.pretty_version = pretty_version.into();
        self
    }

    pub fn with_source_reference(mut self, reference: impl Into<String>) -> Self {
        self.source_reference = Some(reference.into());
        self
    }

    pub fn with_type(mut self, package_type: impl Into<String>) -> Self {
        self.package_type = package_type.into();
        self
    }

    pub fn with_kind(mut self, kind: PackageKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_extra(mut self, extra: Map<String, Value>) -> Self {
        self.extra = extra;
        self
    }

    /// Convenience for setting a single extra field.
    pub fn with_extra_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn pretty_version(&self) -> &str {
        &self.pretty_version
    }

    pub fn source_reference(&self) -> Option<&str> {
        self.source_reference.as_deref()
    }

    pub fn install_path(&self) -> &Path {
        &self.install_path
    }

    pub fn package_type(&self) -> &str {
        &self.package_type
    }

    pub fn kind(&self) -> PackageKind {
        self.kind
    }

    pub fn is_root(&self) -> bool {
        self.kind == PackageKind::Root
    }

    pub fn is_alias(&self) -> bool {
        self.kind == PackageKind::Alias
    }

    pub fn extra(&self) -> &Map<String, Value> {
        &self.extra
    }

    /// Whether `version` names this package's normalized or pretty version.
    pub fn has_version(&self, version: &str) -> bool {
        self.version == version || self.pretty_version == version
    }

    /// `name (pretty_version)` for log lines.
    pub fn label(&self) -> String {
        format!("{} ({})", self.name, self.pretty_version)
    }
}

/// Immutable snapshot of every resolved package, root included.
#[derive(Debug, Clone, Default)]
pub struct Repository {
    packages: Vec<Arc<Package>>,
}

impl Repository {
    pub fn new(packages: impl IntoIterator<Item = Package>) -> Self {
        Self {
            packages: packages.into_iter().map(Arc::new).collect(),
        }
    }

    pub fn packages(&self) -> &[Arc<Package>] {
        &self.packages
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    pub fn root(&self) -> Option<&Arc<Package>> {
        self.packages.iter().find(|p| p.is_root())
    }

    /// First non-alias package named `name`, whatever its version.
    pub fn find(&self, name: &str) -> Option<&Arc<Package>> {
        self.packages
            .iter()
            .find(|p| !p.is_alias() && p.name() == name)
    }

    /// Non-alias package named `name` at exactly `version` (normalized or pretty).
    pub fn find_version(&self, name: &str, version: &str) -> Option<&Arc<Package>> {
        self.packages
            .iter()
            .find(|p| !p.is_alias() && p.name() == name && p.has_version(version))
    }

    /// Packages ordered by `(name, version)`; ties keep snapshot order.
    pub fn sorted(&self) -> Vec<&Arc<Package>> {
        let mut packages: Vec<&Arc<Package>> = self.packages.iter().collect();
        packages.sort_by(|a, b| {
            a.name()
                .cmp(b.name())
                .then_with(|| a.version().cmp(b.version()))
        });
        packages
    }
}
