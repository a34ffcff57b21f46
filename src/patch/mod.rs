pub mod application;
pub mod definition;
pub mod version;

pub use application::{PackagePatchApplication, PatchApplication};
pub use definition::{Patch, PatchMethod};
pub use version::{satisfies, VersionError};
