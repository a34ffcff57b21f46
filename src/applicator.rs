//! Patch applicator
//!
//! Runs `patch` or `git apply` against a target package's install path.
//! Nothing besides files under that path is touched.

use crate::error::PatchsetError;
use crate::logging::Logger;
use crate::patch::{PackagePatchApplication, PatchApplication, PatchMethod};
use crate::process::{CommandRunner, Invocation};
use std::cell::{Cell, OnceCell};
use std::path::{Component, Path, PathBuf};

pub const DEFAULT_PATCH_PROGRAM: &str = "patch";
pub const DEFAULT_GIT_PROGRAM: &str = "git";

pub struct PatchApplicator<'a> {
    runner: &'a dyn CommandRunner,
    logger: &'a dyn Logger,
    patch_program: String,
    git_program: String,
    base_dir: PathBuf,
    // Probed lazily, once per applicator.
    patch_available: OnceCell<bool>,
    fallback_announced: Cell<bool>,
}

impl<'a> PatchApplicator<'a> {
    /// `base_dir` is the directory `git apply` runs from when the target is
    /// not a repository of its own; normally the project root.
    pub fn new(
        runner: &'a dyn CommandRunner,
        logger: &'a dyn Logger,
        base_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            runner,
            logger,
            patch_program: DEFAULT_PATCH_PROGRAM.to_string(),
            git_program: DEFAULT_GIT_PROGRAM.to_string(),
            base_dir: base_dir.into(),
            patch_available: OnceCell::new(),
            fallback_announced: Cell::new(false),
        }
    }

    pub fn with_programs(mut self, patch: impl Into<String>, git: impl Into<String>) -> Self {
        self.patch_program = patch.into();
        self.git_program = git.into();
        self
    }

    /// Apply every patch of a package in list order, stopping at the first
    /// failure.
    pub fn apply_all(&self, application: &PackagePatchApplication) -> Result<usize, PatchsetError> {
        for patch_application in application.applications() {
            self.apply(patch_application)?;
        }
        Ok(application.applications().len())
    }

    pub fn apply(&self, application: &PatchApplication) -> Result<(), PatchsetError> {
        let patch = application.patch();
        let source = application
            .source_package()
            .ok_or_else(|| PatchsetError::UnresolvedSource {
                name: patch.source_package().to_string(),
            })?;
        let file = patch.file_path(source);
        let target_dir = application.target_package().install_path();

        let (invocation, method) = if patch.method() == PatchMethod::Patch && self.has_patch() {
            (
                self.patch_invocation(&file, target_dir, patch.strip_path_components()),
                PatchMethod::Patch,
            )
        } else {
            if patch.method() == PatchMethod::Patch {
                self.announce_fallback();
            }
            (
                self.git_invocation(&file, target_dir, patch.strip_path_components()),
                PatchMethod::Git,
            )
        };

        let output = self.runner.run(&invocation)?;
        if !output.is_success() {
            return Err(PatchsetError::CommandFailed {
                command: invocation.command_line(),
                exit_code: output.exit_code,
                stderr: output.stderr,
            });
        }

        self.logger.info(&format!(
            "Applied patch {}:{} [{}] ({}) using {} method",
            patch.source_package(),
            patch.filename(),
            patch.version_constraint(),
            patch.description().unwrap_or(""),
            method
        ));

        Ok(())
    }

    /// Whether the `patch` program is on the search path.
    pub fn has_patch(&self) -> bool {
        *self.patch_available.get_or_init(|| {
            // The program name travels as a positional argument, never as script text.
            let probe = Invocation::new("sh").args([
                "-c",
                "command -v \"$1\"",
                "sh",
                self.patch_program.as_str(),
            ]);
            match self.runner.run(&probe) {
                Ok(output) => output.is_success(),
                Err(err) => {
                    self.logger.debug(&format!("Probe for {} failed: {err}", self.patch_program));
                    false
                }
            }
        })
    }

    fn announce_fallback(&self) {
        if !self.fallback_announced.replace(true) {
            self.logger.warning(&format!(
                "{} not found, falling back to {} apply",
                self.patch_program, self.git_program
            ));
        }
    }

    fn patch_invocation(&self, file: &Path, target_dir: &Path, strip: u32) -> Invocation {
        Invocation::new(&self.patch_program).args([
            "--posix".to_string(),
            format!("--strip={strip}"),
            format!("--input={}", file.display()),
            format!("--directory={}", target_dir.display()),
        ])
    }

    fn git_invocation(&self, file: &Path, target_dir: &Path, strip: u32) -> Invocation {
        let invocation = Invocation::new(&self.git_program).args([
            "apply".to_string(),
            "-v".to_string(),
            format!("-p{strip}"),
            "--inaccurate-eof".to_string(),
            "--ignore-whitespace".to_string(),
            file.display().to_string(),
        ]);

        if target_dir.join(".git").exists() {
            return invocation.current_dir(target_dir);
        }

        let invocation = invocation.current_dir(&self.base_dir);
        match relative_path(&self.base_dir, target_dir) {
            Some(rel) if rel.as_os_str().is_empty() => invocation,
            Some(rel) => invocation.arg(format!("--directory={}", rel.display())),
            None => invocation.arg(format!("--directory={}", target_dir.display())),
        }
    }
}

/// Path of `target` relative to `base`, lexically. `None` when one is
/// absolute and the other is not.
pub fn relative_path(base: &Path, target: &Path) -> Option<PathBuf> {
    if base.is_absolute() != target.is_absolute() {
        return None;
    }

    let base: Vec<Component<'_>> = normalized(base);
    let target: Vec<Component<'_>> = normalized(target);
    let common = base
        .iter()
        .zip(target.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut rel = PathBuf::new();
    for _ in common..base.len() {
        rel.push("..");
    }
    for component in &target[common..] {
        rel.push(component.as_os_str());
    }
    Some(rel)
}

fn normalized(path: &Path) -> Vec<Component<'_>> {
    let mut out = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir if matches!(out.last(), Some(Component::Normal(_))) => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}
