//! Patch application resolver
//!
//! Binds collected patches to the resolved target and source packages,
//! filters by version constraint and collapses byte-identical patches.

use crate::error::PatchsetError;
use crate::hash::hash_patch_file;
use crate::logging::Logger;
use crate::package::Repository;
use crate::patch::{PackagePatchApplication, Patch, PatchApplication, VersionError};
use std::collections::BTreeMap;

/// Target package name to its scheduled patch set.
pub type ApplicationMap = BTreeMap<String, PackagePatchApplication>;

pub struct ApplicationResolver<'a> {
    repository: &'a Repository,
    logger: &'a dyn Logger,
}

impl<'a> ApplicationResolver<'a> {
    pub fn new(repository: &'a Repository, logger: &'a dyn Logger) -> Self {
        Self { repository, logger }
    }

    /// Compute the patch set every resolved target package should carry.
    ///
    /// Targets that are not installed, or that end up with no matching
    /// patch, are left out of the map.
    pub fn resolve(&self, patches: &[Patch]) -> Result<ApplicationMap, PatchsetError> {
        let mut groups: Vec<(&str, Vec<&Patch>)> = Vec::new();
        for patch in patches {
            match groups.iter_mut().find(|(t, _)| *t == patch.target_package()) {
                Some((_, group)) => group.push(patch),
                None => groups.push((patch.target_package(), vec![patch])),
            }
        }

        let mut resolved = ApplicationMap::new();
        for (target_name, group) in groups {
            if let Some(application) = self.resolve_target(target_name, &group)? {
                resolved.insert(target_name.to_string(), application);
            }
        }

        Ok(resolved)
    }

    fn resolve_target(
        &self,
        target_name: &str,
        patches: &[&Patch],
    ) -> Result<Option<PackagePatchApplication>, PatchsetError> {
        let Some(target) = self.repository.find(target_name) else {
            // Nothing installed to patch.
            return Ok(None);
        };

        let mut applications: Vec<PatchApplication> = Vec::new();

        for patch in patches {
            match patch.applies_to(target) {
                Ok(true) => {}
                Ok(false) => continue,
                Err(VersionError::InvalidVersion { value, .. }) => {
                    self.logger.debug(&format!(
                        "Version {value} of {target_name} cannot be compared, skipping patch {} from {}",
                        patch.filename(),
                        patch.source_package()
                    ));
                    continue;
                }
                Err(source) => {
                    return Err(PatchsetError::InvalidConstraint {
                        patchset: patch.source_package().to_string(),
                        constraint: patch.version_constraint().to_string(),
                        source,
                    })
                }
            }

            let source = self
                .repository
                .find(patch.source_package())
                .ok_or_else(|| PatchsetError::UnresolvedSource {
                    name: patch.source_package().to_string(),
                })?;

            let hash = hash_patch_file(&patch.file_path(source))?;

            if let Some(existing) = applications.iter().find(|a| a.hash() == hash) {
                self.logger.notice(&format!(
                    "Skipping patch {} ({}) as it was already added by package {}",
                    patch.description().unwrap_or(patch.filename()),
                    patch.source_package(),
                    existing.patch().source_package()
                ));
                continue;
            }

            applications.push(PatchApplication::new(
                (*patch).clone(),
                Some(source.clone()),
                target.clone(),
                hash,
            ));
        }

        if applications.is_empty() {
            return Ok(None);
        }

        Ok(Some(PackagePatchApplication::new(target.clone(), applications)))
    }
}
