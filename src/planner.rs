//! Change planner
//!
//! Compares the patch sets packages should carry with the ones recorded on
//! disk. Re-patching never happens on top of an already patched tree: any
//! change routes through a reinstall first.

use crate::logging::Logger;
use crate::package::Package;
use crate::resolver::ApplicationMap;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// What has to happen to one package.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlannedAction {
    /// Installed patches are stale and nothing replaces them.
    Reinstall,
    /// First application on a pristine tree.
    Patch,
    /// Patch set changed: back to pristine, then apply again.
    ReinstallAndPatch,
    UpToDate,
}

impl PlannedAction {
    pub fn reinstalls(self) -> bool {
        matches!(self, PlannedAction::Reinstall | PlannedAction::ReinstallAndPatch)
    }

    pub fn patches(self) -> bool {
        matches!(self, PlannedAction::Patch | PlannedAction::ReinstallAndPatch)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ChangePlan {
    reinstall: BTreeMap<String, Arc<Package>>,
    patch: BTreeMap<String, Arc<Package>>,
    actions: BTreeMap<String, PlannedAction>,
}

impl ChangePlan {
    pub fn packages_to_reinstall(&self) -> &BTreeMap<String, Arc<Package>> {
        &self.reinstall
    }

    pub fn packages_to_patch(&self) -> &BTreeMap<String, Arc<Package>> {
        &self.patch
    }

    /// Decision for every package present in either map.
    pub fn actions(&self) -> &BTreeMap<String, PlannedAction> {
        &self.actions
    }

    pub fn action(&self, name: &str) -> Option<PlannedAction> {
        self.actions.get(name).copied()
    }

    pub fn should_reinstall(&self, name: &str) -> bool {
        self.reinstall.contains_key(name)
    }

    pub fn should_patch(&self, name: &str) -> bool {
        self.patch.contains_key(name)
    }

    pub fn has_actions(&self) -> bool {
        !self.reinstall.is_empty() || !self.patch.is_empty()
    }
}

pub struct ChangePlanner<'a> {
    logger: &'a dyn Logger,
}

impl<'a> ChangePlanner<'a> {
    pub fn new(logger: &'a dyn Logger) -> Self {
        Self { logger }
    }

    pub fn plan(&self, target: &ApplicationMap, installed: &ApplicationMap) -> ChangePlan {
        let names: BTreeSet<&String> = target.keys().chain(installed.keys()).collect();
        let mut plan = ChangePlan::default();

        for name in names {
            let action = match (target.get(name), installed.get(name)) {
                (Some(target_app), None) => {
                    self.logger.debug(&format!(
                        "Package {name} has pending patches - schedule for patching"
                    ));
                    plan.patch
                        .insert(name.clone(), target_app.target_package().clone());
                    PlannedAction::Patch
                }
                (None, Some(installed_app)) => {
                    self.logger.debug(&format!(
                        "Package {name} has no pending patches, but some installed - schedule for reinstall to clear them"
                    ));
                    plan.reinstall
                        .insert(name.clone(), installed_app.target_package().clone());
                    PlannedAction::Reinstall
                }
                (Some(target_app), Some(installed_app))
                    if target_app.hash() != installed_app.hash() =>
                {
                    self.logger.debug(&format!(
                        "Different installed patchset hash for {name} - scheduled for re-patch"
                    ));
                    plan.patch
                        .insert(name.clone(), target_app.target_package().clone());
                    plan.reinstall
                        .insert(name.clone(), target_app.target_package().clone());
                    PlannedAction::ReinstallAndPatch
                }
                (Some(_), Some(_)) => {
                    self.logger
                        .debug(&format!("Package {name} has installed patches up to date"));
                    PlannedAction::UpToDate
                }
                (None, None) => continue,
            };
            plan.actions.insert(name.clone(), action);
        }

        plan
    }
}
