//! Reinstall collaborators.
//!
//! Reinstalling brings a package back to pristine sources, dropping its
//! patches and its state file along with them.

use crate::error::PatchsetError;
use crate::logging::Logger;
use crate::package::Package;
use crate::process::{CommandRunner, Invocation};
use filetime::FileTime;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub trait Installer {
    fn reinstall(&self, package: &Package) -> Result<(), PatchsetError>;
}

/// Restores install directories from pristine distribution copies.
pub struct DistInstaller<'a> {
    dist_paths: BTreeMap<String, PathBuf>,
    logger: &'a dyn Logger,
}

impl<'a> DistInstaller<'a> {
    pub fn new(dist_paths: BTreeMap<String, PathBuf>, logger: &'a dyn Logger) -> Self {
        Self { dist_paths, logger }
    }

    pub fn dist_path(&self, name: &str) -> Option<&Path> {
        self.dist_paths.get(name).map(PathBuf::as_path)
    }
}

impl Installer for DistInstaller<'_> {
    fn reinstall(&self, package: &Package) -> Result<(), PatchsetError> {
        let failed = |reason: String| PatchsetError::Reinstall {
            package: package.name().to_string(),
            reason,
        };

        let dist = self
            .dist_path(package.name())
            .ok_or_else(|| failed("no pristine distribution path is known".to_string()))?;
        if !dist.is_dir() {
            return Err(failed(format!("{} is not a directory", dist.display())));
        }

        let install_path = package.install_path();
        if install_path.exists() {
            fs::remove_dir_all(install_path)
                .map_err(|e| failed(format!("cannot remove {}: {e}", install_path.display())))?;
        }

        let copied = copy_tree(dist, install_path)
            .map_err(|e| failed(format!("cannot restore {}: {e}", install_path.display())))?;

        self.logger.debug(&format!(
            "Restored {copied} files of {} from {}",
            package.name(),
            dist.display()
        ));
        Ok(())
    }
}

/// Recursive copy keeping file modification times. Returns the file count.
fn copy_tree(from: &Path, to: &Path) -> io::Result<usize> {
    let mut files = 0;

    for entry in WalkDir::new(from).follow_links(false) {
        let entry = entry.map_err(io::Error::other)?;
        let rel = entry
            .path()
            .strip_prefix(from)
            .map_err(io::Error::other)?;
        let dest = to.join(rel);

        let file_type = entry.file_type();
        if file_type.is_dir() {
            fs::create_dir_all(&dest)?;
        } else if file_type.is_file() {
            fs::copy(entry.path(), &dest)?;
            let metadata = entry.metadata().map_err(io::Error::other)?;
            filetime::set_file_mtime(&dest, FileTime::from_last_modification_time(&metadata))?;
            files += 1;
        } else if file_type.is_symlink() {
            copy_symlink(entry.path(), &dest)?;
        }
    }

    Ok(files)
}

#[cfg(unix)]
fn copy_symlink(from: &Path, to: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(fs::read_link(from)?, to)
}

#[cfg(not(unix))]
fn copy_symlink(from: &Path, to: &Path) -> io::Result<()> {
    fs::copy(from, to).map(|_| ())
}

/// Delegates to a host package manager command, e.g.
/// `["composer", "reinstall", "{name}"]`.
pub struct CommandInstaller<'a> {
    runner: &'a dyn CommandRunner,
    template: Vec<String>,
    cwd: PathBuf,
}

impl<'a> CommandInstaller<'a> {
    pub fn new(runner: &'a dyn CommandRunner, template: Vec<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            template,
            cwd: cwd.into(),
        }
    }

    fn invocation(&self, package: &Package) -> Option<Invocation> {
        let mut parts = self.template.iter().map(|part| {
            part.replace("{name}", package.name())
                .replace("{version}", package.pretty_version())
        });
        let program = parts.next()?;
        Some(Invocation::new(program).args(parts).current_dir(&self.cwd))
    }
}

impl Installer for CommandInstaller<'_> {
    fn reinstall(&self, package: &Package) -> Result<(), PatchsetError> {
        let invocation = self.invocation(package).ok_or_else(|| PatchsetError::Reinstall {
            package: package.name().to_string(),
            reason: "installer command is empty".to_string(),
        })?;

        let output = self.runner.run(&invocation)?;
        if !output.is_success() {
            return Err(PatchsetError::Reinstall {
                package: package.name().to_string(),
                reason: format!(
                    "\"{}\" exited with {}: {}",
                    invocation.command_line(),
                    output
                        .exit_code
                        .map(|c| format!("code {c}"))
                        .unwrap_or_else(|| "a signal".to_string()),
                    output.stderr.trim()
                ),
            });
        }
        Ok(())
    }
}
