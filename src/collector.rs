//! Patch declaration collector
//!
//! Walks every resolved package in a fixed `(name, version)` order and turns
//! patchset declarations into [`Patch`] values, dropping ignored files.

use crate::error::PatchsetError;
use crate::logging::Logger;
use crate::package::{Package, Repository, PATCHSET_EXTRA, PATCHSET_IGNORE_EXTRA, PATCHSET_TYPE};
use crate::patch::Patch;
use serde_json::Value;

pub struct PatchCollector<'a> {
    logger: &'a dyn Logger,
}

impl<'a> PatchCollector<'a> {
    pub fn new(logger: &'a dyn Logger) -> Self {
        Self { logger }
    }

    /// Collect all declared patches, in sorted-package then declaration order.
    pub fn collect(&self, repository: &Repository) -> Result<Vec<Patch>, PatchsetError> {
        let mut patches = Vec::new();

        for package in repository.sorted() {
            if package.is_alias() {
                continue;
            }

            let package_patches = self.collect_from_package(package)?;
            if !package_patches.is_empty() {
                self.logger.debug(&format!(
                    "Collected {} patches from {}",
                    package_patches.len(),
                    package.name()
                ));
            }
            patches.extend(package_patches);
        }

        let ignored = self.collect_ignored(repository)?;
        if !ignored.is_empty() {
            patches.retain(|patch| !ignored.iter().any(|f| f == patch.filename()));
        }

        Ok(patches)
    }

    pub fn is_valid_patchset(package: &Package) -> bool {
        (package.is_root() || package.package_type() == PATCHSET_TYPE)
            && package.extra().contains_key(PATCHSET_EXTRA)
    }

    fn collect_from_package(&self, package: &Package) -> Result<Vec<Patch>, PatchsetError> {
        if !Self::is_valid_patchset(package) {
            self.logger
                .debug(&format!("Package {} is not a patchset", package.name()));
            return Ok(Vec::new());
        }

        let declaration = &package.extra()[PATCHSET_EXTRA];
        // An empty map encoded as `[]` or left `null` declares nothing.
        if declaration.is_null() || declaration.as_array().is_some_and(Vec::is_empty) {
            return Ok(Vec::new());
        }
        let targets = declaration
            .as_object()
            .ok_or_else(|| PatchsetError::MalformedDeclaration {
                patchset: package.name().to_string(),
                target: PATCHSET_EXTRA.to_string(),
                reason: format!("expected a map of target packages, found {}", kind_of(declaration)),
            })?;

        let mut patches = Vec::new();
        for (target, options_list) in targets {
            let options_list =
                options_list
                    .as_array()
                    .ok_or_else(|| PatchsetError::MalformedDeclaration {
                        patchset: package.name().to_string(),
                        target: target.clone(),
                        reason: format!(
                            "expected a list of patches, found {}",
                            kind_of(options_list)
                        ),
                    })?;

            for options in options_list {
                patches.push(Patch::from_options(package.name(), target, options)?);
            }
        }

        Ok(patches)
    }

    /// Ignored filenames from every package; each entry is announced.
    fn collect_ignored(&self, repository: &Repository) -> Result<Vec<String>, PatchsetError> {
        let mut ignored = Vec::new();

        for package in repository.packages() {
            let Some(list) = package.extra().get(PATCHSET_IGNORE_EXTRA) else {
                continue;
            };
            let malformed = || PatchsetError::MalformedDeclaration {
                patchset: package.name().to_string(),
                target: PATCHSET_IGNORE_EXTRA.to_string(),
                reason: "expected a list of patch filenames".to_string(),
            };

            for entry in list.as_array().ok_or_else(malformed)? {
                let filename = entry.as_str().ok_or_else(malformed)?;
                self.logger
                    .notice(&format!("IMPORTANT: Patch will be skipped: {filename}"));
                ignored.push(filename.to_string());
            }
        }

        Ok(ignored)
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a map",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::{Level, MemoryLogger};
    use crate::package::PackageKind;
    use serde_json::json;

    fn patchset(name: &str, version: &str, declaration: Value) -> Package {
        Package::new(name, version, format!("/vendor/{name}"))
            .with_type(PATCHSET_TYPE)
            .with_extra_field(PATCHSET_EXTRA, declaration)
    }

    #[test]
    fn test_collects_in_sorted_package_order() {
        let logger = MemoryLogger::new();
        let repo = Repository::new([
            patchset(
                "z/patches",
                "1.0",
                json!({"vendor/lib": [{"filename": "z1.diff"}, {"filename": "z2.diff"}]}),
            ),
            patchset("a/patches", "1.0", json!({"vendor/lib": [{"filename": "a.diff"}]})),
        ]);

        let patches = PatchCollector::new(&logger).collect(&repo).unwrap();
        let files: Vec<_> = patches.iter().map(|p| p.filename()).collect();

        assert_eq!(files, vec!["a.diff", "z1.diff", "z2.diff"]);
        assert_eq!(patches[0].source_package(), "a/patches");
    }

    #[test]
    fn test_ignores_non_patchset_and_alias_packages() {
        let logger = MemoryLogger::new();
        let declaration = json!({"vendor/lib": [{"filename": "fix.diff"}]});
        let repo = Repository::new([
            Package::new("plain/library", "1.0", "/vendor/plain")
                .with_extra_field(PATCHSET_EXTRA, declaration.clone()),
            patchset("a/patches", "1.0", declaration.clone()).with_kind(PackageKind::Alias),
            Package::new("acme/project", "dev-main", "/project")
                .with_kind(PackageKind::Root)
                .with_extra_field(PATCHSET_EXTRA, declaration),
        ]);

        let patches = PatchCollector::new(&logger).collect(&repo).unwrap();

        assert_eq!(patches.len(), 1);
        assert_eq!(patches[0].source_package(), "acme/project");
        assert!(logger.contains(Level::Debug, "plain/library is not a patchset"));
    }

    #[test]
    fn test_ignore_list_removes_matching_patches() {
        let logger = MemoryLogger::new();
        let repo = Repository::new([
            patchset(
                "a/patches",
                "1.0",
                json!({"vendor/lib": [{"filename": "keep.diff"}, {"filename": "drop.diff"}]}),
            ),
            Package::new("acme/project", "dev-main", "/project")
                .with_kind(PackageKind::Root)
                .with_extra_field(PATCHSET_IGNORE_EXTRA, json!(["drop.diff", "gone.diff"])),
        ]);

        let patches = PatchCollector::new(&logger).collect(&repo).unwrap();

        assert_eq!(patches.len(), 1);
        assert_eq!(patches[0].filename(), "keep.diff");
        // Every ignored entry is announced, even one that matched nothing.
        assert_eq!(logger.messages(Level::Notice).len(), 2);
        assert!(logger.contains(Level::Notice, "gone.diff"));
    }

    #[test]
    fn test_unsupported_method_aborts_collection() {
        let logger = MemoryLogger::new();
        let repo = Repository::new([patchset(
            "a/patches",
            "1.0",
            json!({"vendor/lib": [{"filename": "fix.diff", "method": "svn"}]}),
        )]);

        let err = PatchCollector::new(&logger).collect(&repo).unwrap_err();
        assert!(matches!(
            err,
            PatchsetError::UnsupportedMethod { ref patchset, .. } if patchset == "a/patches"
        ));
    }

    #[test]
    fn test_malformed_declaration_names_patchset() {
        let logger = MemoryLogger::new();
        let repo = Repository::new([patchset("a/patches", "1.0", json!({"vendor/lib": "fix.diff"}))]);

        let err = PatchCollector::new(&logger).collect(&repo).unwrap_err();
        match err {
            PatchsetError::MalformedDeclaration { patchset, target, .. } => {
                assert_eq!(patchset, "a/patches");
                assert_eq!(target, "vendor/lib");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_null_or_empty_list_declares_nothing() {
        let logger = MemoryLogger::new();
        let repo = Repository::new([
            patchset("a/patches", "1.0", Value::Null),
            patchset("b/patches", "1.0", json!([])),
            patchset("c/patches", "1.0", json!({"vendor/lib": [{"filename": "c.diff"}]})),
        ]);

        let patches = PatchCollector::new(&logger).collect(&repo).unwrap();

        assert_eq!(patches.len(), 1);
        assert_eq!(patches[0].source_package(), "c/patches");
    }

    #[test]
    fn test_non_empty_list_is_still_malformed() {
        let logger = MemoryLogger::new();
        let repo = Repository::new([patchset("a/patches", "1.0", json!(["fix.diff"]))]);

        let err = PatchCollector::new(&logger).collect(&repo).unwrap_err();
        assert!(matches!(err, PatchsetError::MalformedDeclaration { .. }));
    }

    #[test]
    fn test_extra_option_keys_still_collect() {
        let logger = MemoryLogger::new();
        let repo = Repository::new([patchset(
            "a/patches",
            "1.0",
            json!({"vendor/lib": [{"filename": "fix.diff", "url": "https://example.com/fix.diff"}]}),
        )]);

        let patches = PatchCollector::new(&logger).collect(&repo).unwrap();

        assert_eq!(patches.len(), 1);
        assert_eq!(patches[0].filename(), "fix.diff");
    }
}
