use crate::patch::version::VersionError;
use std::path::PathBuf;
use thiserror::Error;

/// Every fatal condition of a reconciliation run.
#[derive(Error, Debug)]
pub enum PatchsetError {
    #[error(
        "patchset {patchset} declares unsupported method '{method}' for {target} (allowed: patch, git){}",
        suggestion.as_deref().map(|s| format!("; did you mean '{s}'?")).unwrap_or_default()
    )]
    UnsupportedMethod {
        patchset: String,
        target: String,
        method: String,
        suggestion: Option<String>,
    },

    #[error("patchset {patchset} has a malformed declaration for {target}: {reason}")]
    MalformedDeclaration {
        patchset: String,
        target: String,
        reason: String,
    },

    #[error("patchset {patchset} declares invalid version constraint '{constraint}': {source}")]
    InvalidConstraint {
        patchset: String,
        constraint: String,
        source: VersionError,
    },

    #[error(
        "could not find target package {name} ({version}) for applied patches recorded in {}",
        state_file.display()
    )]
    UnresolvedTarget {
        name: String,
        version: String,
        state_file: PathBuf,
    },

    #[error("patch declared by {name} but the package is not resolved")]
    UnresolvedSource { name: String },

    #[error("patch source file {} is not readable: {source}", path.display())]
    PatchFileUnreadable {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot read applied patches data file {}: {source}", path.display())]
    StateRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot parse applied patches data file {}: {source}", path.display())]
    StateParse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("cannot write applied patches data file {}", path.display())]
    StateNotWritable { path: PathBuf },

    #[error("package directory is not writable {}", path.display())]
    DirectoryNotWritable { path: PathBuf },

    #[error("failed to write applied patches data file {}: {source}", path.display())]
    StateWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("could not run \"{command}\": {source}")]
    CommandSpawn {
        command: String,
        source: std::io::Error,
    },

    #[error(
        "could not apply patch - command \"{command}\" failed{}:\n{stderr}",
        exit_code.map(|c| format!(" with exit code {c}")).unwrap_or_default()
    )]
    CommandFailed {
        command: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("failed to reinstall {package}: {reason}")]
    Reinstall { package: String, reason: String },
}

impl PatchsetError {
    /// Configuration errors abort before any side effect happens.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            PatchsetError::UnsupportedMethod { .. }
                | PatchsetError::MalformedDeclaration { .. }
                | PatchsetError::InvalidConstraint { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_method_message_names_patchset() {
        let err = PatchsetError::UnsupportedMethod {
            patchset: "acme/patches".into(),
            target: "vendor/lib".into(),
            method: "gti".into(),
            suggestion: Some("git".into()),
        };
        let msg = err.to_string();
        assert!(msg.contains("acme/patches"));
        assert!(msg.contains("allowed: patch, git"));
        assert!(msg.contains("did you mean 'git'"));
        assert!(err.is_configuration());
    }

    #[test]
    fn test_command_failed_carries_fields() {
        let err = PatchsetError::CommandFailed {
            command: "patch --posix --strip=1".into(),
            exit_code: Some(1),
            stderr: "Hunk #1 FAILED".into(),
        };
        assert!(err.to_string().contains("exit code 1"));
        assert!(err.to_string().contains("Hunk #1 FAILED"));
        assert!(!err.is_configuration());
    }
}
