use crate::hash::aggregate_hash;
use crate::package::Package;
use crate::patch::definition::Patch;
use std::sync::Arc;

/// One patch bound to the concrete packages it came from and goes to.
#[derive(Debug, Clone)]
pub struct PatchApplication {
    patch: Patch,
    /// `None` when the declaring package has been removed since application.
    source_package: Option<Arc<Package>>,
    target_package: Arc<Package>,
    hash: String,
}

impl PatchApplication {
    pub fn new(
        patch: Patch,
        source_package: Option<Arc<Package>>,
        target_package: Arc<Package>,
        hash: impl Into<String>,
    ) -> Self {
        Self {
            patch,
            source_package,
            target_package,
            hash: hash.into(),
        }
    }

    pub fn patch(&self) -> &Patch {
        &self.patch
    }

    pub fn source_package(&self) -> Option<&Arc<Package>> {
        self.source_package.as_ref()
    }

    pub fn target_package(&self) -> &Arc<Package> {
        &self.target_package
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }
}

/// Full, ordered patch set for a single target package.
#[derive(Debug, Clone)]
pub struct PackagePatchApplication {
    target_package: Arc<Package>,
    applications: Vec<PatchApplication>,
    hash: String,
}

impl PackagePatchApplication {
    /// Build a package application, computing its aggregate hash.
    pub fn new(target_package: Arc<Package>, applications: Vec<PatchApplication>) -> Self {
        let hash = aggregate_hash(
            target_package.source_reference(),
            applications.iter().map(PatchApplication::hash),
        );
        Self {
            target_package,
            applications,
            hash,
        }
    }

    /// Rehydrate a persisted package application with its recorded hash.
    pub fn with_hash(
        target_package: Arc<Package>,
        applications: Vec<PatchApplication>,
        hash: impl Into<String>,
    ) -> Self {
        Self {
            target_package,
            applications,
            hash: hash.into(),
        }
    }

    pub fn target_package(&self) -> &Arc<Package> {
        &self.target_package
    }

    pub fn applications(&self) -> &[PatchApplication] {
        &self.applications
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn is_empty(&self) -> bool {
        self.applications.is_empty()
    }

    /// Whether an application with this content hash is part of the set.
    pub fn contains_hash(&self, hash: &str) -> bool {
        self.applications.iter().any(|a| a.hash == hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::sha1_hex;

    fn target(reference: &str) -> Arc<Package> {
        Arc::new(Package::new("vendor/lib", "1.2.0", "/v/lib").with_source_reference(reference))
    }

    fn application(target: &Arc<Package>, file: &str, hash: &str) -> PatchApplication {
        PatchApplication::new(
            Patch::new("acme/patches", "vendor/lib", file),
            None,
            target.clone(),
            hash,
        )
    }

    #[test]
    fn test_aggregate_hash_uses_reference_and_order() {
        let t = target("abc");
        let app = PackagePatchApplication::new(
            t.clone(),
            vec![application(&t, "a.diff", "h1"), application(&t, "b.diff", "h2")],
        );

        assert_eq!(app.hash(), sha1_hex(b"abch1-h2"));
        assert!(app.contains_hash("h2"));
        assert!(!app.contains_hash("h3"));
    }

    #[test]
    fn test_hash_ignores_package_identity() {
        let first = target("abc");
        let second = target("abc");
        let a = PackagePatchApplication::new(first.clone(), vec![application(&first, "a.diff", "h1")]);
        let b = PackagePatchApplication::new(second.clone(), vec![application(&second, "x.diff", "h1")]);

        assert!(!Arc::ptr_eq(a.target_package(), b.target_package()));
        assert_eq!(a.hash(), b.hash());
    }

    #[test]
    fn test_reference_change_changes_hash() {
        let old = target("abc");
        let new = target("def");
        let a = PackagePatchApplication::new(old.clone(), vec![application(&old, "a.diff", "h1")]);
        let b = PackagePatchApplication::new(new.clone(), vec![application(&new, "a.diff", "h1")]);

        assert_ne!(a.hash(), b.hash());
    }
}
