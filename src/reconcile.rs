//! Reconciliation driver
//!
//! Single pass, no loop-back:
//! collect, resolve, load installed state, plan, reinstall, apply, persist.
//! Any fatal error aborts the run; state of the package being patched at
//! that moment is left untouched.

use crate::applicator::PatchApplicator;
use crate::collector::PatchCollector;
use crate::error::PatchsetError;
use crate::installer::Installer;
use crate::logging::Logger;
use crate::package::Repository;
use crate::patch::{PackagePatchApplication, Patch, PatchApplication};
use crate::planner::{ChangePlan, ChangePlanner, PlannedAction};
use crate::resolver::{ApplicationMap, ApplicationResolver};
use crate::state::StateStore;
use std::collections::BTreeSet;

/// Everything computed before the first side effect.
#[derive(Debug, Clone)]
pub struct Reconciliation {
    pub patches: Vec<Patch>,
    pub target: ApplicationMap,
    pub installed: ApplicationMap,
    pub plan: ChangePlan,
}

impl Reconciliation {
    pub fn is_noop(&self) -> bool {
        !self.plan.has_actions()
    }
}

/// What a run actually did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub reinstalled: Vec<String>,
    pub patched: Vec<String>,
    /// Individual patch invocations.
    pub applied: usize,
}

impl RunReport {
    pub fn is_noop(&self) -> bool {
        self.reinstalled.is_empty() && self.patched.is_empty()
    }
}

/// Collect, resolve, load and plan without touching the filesystem.
pub fn prepare(
    repository: &Repository,
    logger: &dyn Logger,
) -> Result<Reconciliation, PatchsetError> {
    let patches = PatchCollector::new(logger).collect(repository)?;
    let target = ApplicationResolver::new(repository, logger).resolve(&patches)?;
    let installed = StateStore::new(repository, logger).load_all()?;
    let plan = ChangePlanner::new(logger).plan(&target, &installed);

    Ok(Reconciliation {
        patches,
        target,
        installed,
        plan,
    })
}

pub struct Reconciler<'a> {
    repository: &'a Repository,
    logger: &'a dyn Logger,
    installer: &'a dyn Installer,
    applicator: &'a PatchApplicator<'a>,
}

impl<'a> Reconciler<'a> {
    pub fn new(
        repository: &'a Repository,
        logger: &'a dyn Logger,
        installer: &'a dyn Installer,
        applicator: &'a PatchApplicator<'a>,
    ) -> Self {
        Self {
            repository,
            logger,
            installer,
            applicator,
        }
    }

    pub fn run(&self) -> Result<RunReport, PatchsetError> {
        let reconciliation = self.prepare()?;
        self.execute(&reconciliation)
    }

    /// Side-effect free part of a run.
    pub fn prepare(&self) -> Result<Reconciliation, PatchsetError> {
        prepare(self.repository, self.logger)
    }

    pub fn execute(&self, reconciliation: &Reconciliation) -> Result<RunReport, PatchsetError> {
        let mut report = RunReport::default();

        if reconciliation.is_noop() {
            self.logger.notice("No patches to apply or clean");
            return Ok(report);
        }

        let store = StateStore::new(self.repository, self.logger);
        let plan = &reconciliation.plan;

        for (name, package) in plan.packages_to_reinstall() {
            if package.is_root() {
                self.logger.warning(
                    "Root package patches have changed but cannot reinstall it, will apply only new patches...",
                );
                continue;
            }

            self.logger
                .notice(&format!("Reinstalling {} for re-patch", package.label()));
            self.installer.reinstall(package)?;
            store.clear(package)?;
            report.reinstalled.push(name.clone());
        }

        for (name, action) in plan.actions() {
            if *action == PlannedAction::UpToDate {
                self.logger
                    .debug(&format!("Not patching {name} as it is up-to-date"));
            }
        }

        for (name, package) in plan.packages_to_patch() {
            let Some(application) = reconciliation.target.get(name) else {
                continue;
            };

            self.logger
                .notice(&format!("Applying patches to {}", package.label()));

            let applied = if package.is_root() && plan.should_reinstall(name) {
                self.apply_new_only(application, reconciliation.installed.get(name))?
            } else {
                self.applicator.apply_all(application)?
            };

            store.save(application)?;
            report.patched.push(name.clone());
            report.applied += applied;
        }

        Ok(report)
    }

    /// Root tree cannot go back to pristine: apply what was not there before.
    fn apply_new_only(
        &self,
        application: &PackagePatchApplication,
        installed: Option<&PackagePatchApplication>,
    ) -> Result<usize, PatchsetError> {
        let known: BTreeSet<&str> = installed
            .map(|i| i.applications().iter().map(PatchApplication::hash).collect())
            .unwrap_or_default();

        let mut applied = 0;
        for patch_application in application.applications() {
            if known.contains(patch_application.hash()) {
                continue;
            }
            self.applicator.apply(patch_application)?;
            applied += 1;
        }
        Ok(applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::{Level, MemoryLogger};
    use crate::package::{Package, PackageKind, PATCHSET_EXTRA, PATCHSET_TYPE};
    use crate::process::{CommandOutput, RecordingRunner};
    use crate::state::STATE_FILENAME;
    use serde_json::json;
    use std::cell::RefCell;
    use std::fs;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    #[derive(Default)]
    struct RecordingInstaller {
        reinstalled: RefCell<Vec<String>>,
    }

    impl Installer for RecordingInstaller {
        fn reinstall(&self, package: &Package) -> Result<(), PatchsetError> {
            self.reinstalled.borrow_mut().push(package.name().to_string());
            Ok(())
        }
    }

    struct Project {
        tmp: TempDir,
    }

    impl Project {
        fn new() -> Self {
            let tmp = TempDir::new().unwrap();
            fs::create_dir_all(tmp.path().join("vendor/lib")).unwrap();
            fs::create_dir_all(tmp.path().join("vendor/patches")).unwrap();
            fs::write(tmp.path().join("vendor/patches/fix.diff"), "fix").unwrap();
            fs::write(tmp.path().join("vendor/patches/more.diff"), "more").unwrap();
            Self { tmp }
        }

        fn path(&self, rel: &str) -> PathBuf {
            self.tmp.path().join(rel)
        }

        fn repository(&self, files: &[&str]) -> Repository {
            let declared: Vec<_> = files.iter().map(|f| json!({"filename": f})).collect();
            Repository::new([
                Package::new("acme/patches", "1.0.0", self.path("vendor/patches"))
                    .with_type(PATCHSET_TYPE)
                    .with_extra_field(PATCHSET_EXTRA, json!({ "vendor/lib": declared })),
                Package::new("vendor/lib", "1.2.0", self.path("vendor/lib")),
                Package::new("acme/project", "dev-main", self.tmp.path()).with_kind(PackageKind::Root),
            ])
        }
    }

    fn run(
        repo: &Repository,
        runner: &RecordingRunner,
        installer: &RecordingInstaller,
        logger: &MemoryLogger,
        root: &Path,
    ) -> Result<RunReport, PatchsetError> {
        let applicator = PatchApplicator::new(runner, logger, root);
        Reconciler::new(repo, logger, installer, &applicator).run()
    }

    #[test]
    fn test_first_run_patches_then_second_is_noop() {
        let project = Project::new();
        let repo = project.repository(&["fix.diff"]);
        let installer = RecordingInstaller::default();

        let runner = RecordingRunner::new();
        let logger = MemoryLogger::new();
        let report = run(&repo, &runner, &installer, &logger, project.tmp.path()).unwrap();

        assert_eq!(report.patched, vec!["vendor/lib".to_string()]);
        assert_eq!(report.applied, 1);
        assert!(report.reinstalled.is_empty());
        assert!(project.path("vendor/lib").join(STATE_FILENAME).exists());
        assert!(logger.contains(Level::Notice, "Applying patches to vendor/lib (1.2.0)"));

        let runner = RecordingRunner::new();
        let logger = MemoryLogger::new();
        let report = run(&repo, &runner, &installer, &logger, project.tmp.path()).unwrap();

        assert!(report.is_noop());
        assert!(runner.invocations().is_empty());
        assert!(logger.contains(Level::Notice, "No patches to apply or clean"));
    }

    #[test]
    fn test_changed_patch_set_reinstalls_then_patches() {
        let project = Project::new();
        let installer = RecordingInstaller::default();
        let logger = MemoryLogger::new();
        run(&project.repository(&["fix.diff"]), &RecordingRunner::new(), &installer, &logger, project.tmp.path()).unwrap();

        let runner = RecordingRunner::new();
        let report = run(
            &project.repository(&["fix.diff", "more.diff"]),
            &runner,
            &installer,
            &logger,
            project.tmp.path(),
        )
        .unwrap();

        assert_eq!(*installer.reinstalled.borrow(), vec!["vendor/lib".to_string()]);
        assert_eq!(report.applied, 2);
        assert_eq!(runner.invocations_of("patch").len(), 2);
    }

    #[test]
    fn test_removed_declarations_reinstall_without_patching() {
        let project = Project::new();
        let installer = RecordingInstaller::default();
        let logger = MemoryLogger::new();
        run(&project.repository(&["fix.diff"]), &RecordingRunner::new(), &installer, &logger, project.tmp.path()).unwrap();

        let runner = RecordingRunner::new();
        let report = run(&project.repository(&[]), &runner, &installer, &logger, project.tmp.path()).unwrap();

        assert_eq!(report.reinstalled, vec!["vendor/lib".to_string()]);
        assert!(report.patched.is_empty());
        assert!(runner.invocations_of("patch").is_empty());
        assert!(!project.path("vendor/lib").join(STATE_FILENAME).exists());
    }

    #[test]
    fn test_failed_patch_leaves_state_unpersisted() {
        let project = Project::new();
        let installer = RecordingInstaller::default();
        let logger = MemoryLogger::new();
        let runner = RecordingRunner::new();
        runner.push_output(CommandOutput::success());
        runner.push_output(CommandOutput::success());
        runner.push_output(CommandOutput::failure(1, "Hunk #1 FAILED"));

        let err = run(
            &project.repository(&["fix.diff", "more.diff"]),
            &runner,
            &installer,
            &logger,
            project.tmp.path(),
        )
        .unwrap_err();

        assert!(matches!(err, PatchsetError::CommandFailed { .. }));
        assert!(!project.path("vendor/lib").join(STATE_FILENAME).exists());
    }

    #[test]
    fn test_root_package_applies_only_new_patches() {
        let project = Project::new();
        fs::write(project.path("root.diff"), "root").unwrap();
        fs::write(project.path("root2.diff"), "root2").unwrap();
        let root = |files: &[&str]| {
            let declared: Vec<_> = files.iter().map(|f| json!({"filename": f})).collect();
            Repository::new([Package::new("acme/project", "dev-main", project.tmp.path())
                .with_kind(PackageKind::Root)
                .with_extra_field(PATCHSET_EXTRA, json!({ "acme/project": declared }))])
        };
        let installer = RecordingInstaller::default();
        let logger = MemoryLogger::new();
        run(&root(&["root.diff"]), &RecordingRunner::new(), &installer, &logger, project.tmp.path()).unwrap();

        let runner = RecordingRunner::new();
        let report = run(&root(&["root.diff", "root2.diff"]), &runner, &installer, &logger, project.tmp.path()).unwrap();

        assert!(installer.reinstalled.borrow().is_empty());
        assert_eq!(report.applied, 1);
        let calls = runner.invocations_of("patch");
        assert_eq!(calls.len(), 1);
        assert!(calls[0].command_line().contains("root2.diff"));
        assert!(logger.contains(Level::Warning, "cannot reinstall it"));

        let state: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(project.path(STATE_FILENAME)).unwrap()).unwrap();
        assert_eq!(state["patches"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_prepare_has_no_side_effects() {
        let project = Project::new();
        let repo = project.repository(&["fix.diff"]);
        let installer = RecordingInstaller::default();
        let runner = RecordingRunner::new();
        let logger = MemoryLogger::new();
        let applicator = PatchApplicator::new(&runner, &logger, project.tmp.path());

        let reconciliation = Reconciler::new(&repo, &logger, &installer, &applicator)
            .prepare()
            .unwrap();

        assert_eq!(reconciliation.patches.len(), 1);
        assert_eq!(reconciliation.plan.action("vendor/lib"), Some(PlannedAction::Patch));
        assert!(runner.invocations().is_empty());
        assert!(!project.path("vendor/lib").join(STATE_FILENAME).exists());
    }
}
