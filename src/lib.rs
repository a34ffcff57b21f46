//! Patchset: patch reconciliation for installed packages
//!
//! Packages of type `patchset` (and the project root) declare patch files
//! for other packages. After every install or update the engine works out
//! which patches each installed package should carry, compares that with
//! what was applied last time, and brings the tree in line.
//!
//! # Architecture
//!
//! A run is a single pass:
//!
//! 1. [`PatchCollector`] gathers declarations in `(name, version)` order.
//! 2. [`ApplicationResolver`] binds them to installed packages, filters by
//!    version constraint and collapses byte-identical patch files.
//! 3. [`StateStore`] loads what each package recorded as applied.
//! 4. [`ChangePlanner`] diffs the two maps by aggregate hash.
//! 5. [`Reconciler`] reinstalls, applies with [`PatchApplicator`] and
//!    persists the new state.
//!
//! Re-patching never happens on top of a patched tree. A changed patch set
//! always routes through a reinstall first.
//!
//! # Example
//!
//! ```no_run
//! use patchset::{
//!     DistInstaller, LogLogger, Manifest, PatchApplicator, Reconciler, SystemRunner,
//! };
//! use std::path::Path;
//!
//! let root = Path::new("/srv/app");
//! let manifest = Manifest::load(&root.join("vendor/patchset-installed.json"), root)?;
//! let logger = LogLogger;
//! let installer = DistInstaller::new(manifest.dist_paths().clone(), &logger);
//! let applicator = PatchApplicator::new(&SystemRunner, &logger, root);
//!
//! let report = Reconciler::new(manifest.repository(), &logger, &installer, &applicator).run()?;
//! println!("{} patches applied", report.applied);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod applicator;
pub mod collector;
pub mod config;
pub mod error;
pub mod hash;
pub mod installer;
pub mod logging;
pub mod manifest;
pub mod package;
pub mod patch;
pub mod planner;
pub mod process;
pub mod reconcile;
pub mod resolver;
pub mod state;

// Re-exports
pub use applicator::PatchApplicator;
pub use collector::PatchCollector;
pub use config::{Settings, SettingsError};
pub use error::PatchsetError;
pub use installer::{CommandInstaller, DistInstaller, Installer};
pub use logging::{Level, LogLogger, Logger, MemoryLogger};
pub use manifest::{Manifest, ManifestError};
pub use package::{Package, PackageKind, Repository};
pub use patch::{PackagePatchApplication, Patch, PatchApplication, PatchMethod, VersionError};
pub use planner::{ChangePlan, ChangePlanner, PlannedAction};
pub use process::{CommandOutput, CommandRunner, Invocation, RecordingRunner, SystemRunner};
pub use reconcile::{Reconciler, Reconciliation, RunReport};
pub use resolver::{ApplicationMap, ApplicationResolver};
pub use state::{StateStore, LEGACY_STATE_FILENAME, STATE_FILENAME};
