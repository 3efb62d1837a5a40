//! Error types for fnstage
//!
//! All modules use `StageResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for staging operations
pub type StageResult<T> = Result<T, StageError>;

/// All errors that can occur while staging
#[derive(Error, Debug)]
pub enum StageError {
    // Artifact errors
    #[error("{name} not found in specified dependency")]
    MissingArtifact { name: String },

    // Catalog errors
    #[error("Dependency not found in catalog: {0}")]
    DependencyNotFound(String),

    #[error("No default version of {name} in catalog")]
    NoDefaultVersion { name: String },

    #[error("Invalid catalog at {path}: {reason}")]
    CatalogInvalid { path: PathBuf, reason: String },

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    // Layout errors
    #[error("Build directory does not exist: {0}")]
    BuildDirMissing(PathBuf),

    // Installer errors
    #[error("{command} exited with code {code}\n{output}")]
    InstallerFailed {
        command: String,
        code: i32,
        output: String,
    },

    // IO errors
    #[error("IO error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Process errors
    #[error("Command failed: {command}: {source}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Process terminated by signal")]
    ProcessSignaled,

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("{0}")]
    User(String),
}

impl StageError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Whether this is the installed-artifact-missing kind
    pub fn is_missing_artifact(&self) -> bool {
        matches!(self, Self::MissingArtifact { .. })
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::MissingArtifact { .. } => {
                Some("The dependency archive is empty or corrupt. Rebuild the buildpack package.")
            }
            Self::NoDefaultVersion { .. } => {
                Some("Add a [[default_versions]] entry for it to manifest.toml")
            }
            Self::BuildDirMissing(_) => Some("Pass the application directory as the first argument"),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = StageError::MissingArtifact {
            name: "invoker".to_string(),
        };
        assert_eq!(err.to_string(), "invoker not found in specified dependency");
    }

    #[test]
    fn error_hint() {
        let err = StageError::NoDefaultVersion {
            name: "node".to_string(),
        };
        assert!(err.hint().unwrap().contains("default_versions"));
        assert_eq!(StageError::User("x".to_string()).hint(), None);
    }

    #[test]
    fn missing_artifact_is_distinct_from_io() {
        let artifact = StageError::MissingArtifact {
            name: "invoker".to_string(),
        };
        let io = StageError::io(
            "moving invoker",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(artifact.is_missing_artifact());
        assert!(!io.is_missing_artifact());
    }

    #[test]
    fn installer_failure_is_verbatim() {
        let err = StageError::InstallerFailed {
            command: "npm install".to_string(),
            code: 1,
            output: "npm ERR! missing script".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("npm install exited with code 1"));
        assert!(msg.contains("npm ERR! missing script"));
    }

    #[test]
    fn io_error_renders_cause() {
        let err = StageError::io(
            "cache /c is not writable",
            std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        );
        assert_eq!(
            err.to_string(),
            "IO error: cache /c is not writable: permission denied"
        );
    }
}
