//! Configuration schema for fnstage
//!
//! Configuration is read from `<buildpack-dir>/fnstage.toml`. Every section
//! is optional; missing keys fall back to the defaults below.

use serde::{Deserialize, Serialize};

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Runtime component (invoker) settings
    pub invoker: InvokerConfig,

    /// Package installer settings
    pub installer: InstallerConfig,

    /// Dependency cache settings
    pub cache: CacheConfig,

    /// Staging hooks
    pub hooks: HooksConfig,
}

/// Runtime component settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InvokerConfig {
    /// Catalog name of the invoker dependency
    pub dependency: String,

    /// Directory under the dependency dir the invoker is installed into
    pub install_dir: String,

    /// Name of the profile.d script carrying the default environment
    pub profile_script: String,

    /// Default bind address
    pub host: String,

    /// Default HTTP port
    pub http_port: u16,

    /// Default gRPC port
    pub grpc_port: u16,
}

impl Default for InvokerConfig {
    fn default() -> Self {
        Self {
            dependency: "node-function-invoker".to_string(),
            install_dir: "invoker".to_string(),
            profile_script: "fn.sh".to_string(),
            host: "0.0.0.0".to_string(),
            http_port: 8080,
            grpc_port: 10382,
        }
    }
}

/// Package installer settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallerConfig {
    /// Installer executable
    pub program: String,

    /// Arguments for a cold install
    pub install_args: Vec<String>,

    /// Arguments for an incremental rebuild
    pub rebuild_args: Vec<String>,

    /// Install output directory, relative to the project
    pub modules_dir: String,
}

impl Default for InstallerConfig {
    fn default() -> Self {
        Self {
            program: "npm".to_string(),
            install_args: vec![
                "install".to_string(),
                "--unsafe-perm".to_string(),
                "--no-audit".to_string(),
            ],
            rebuild_args: vec!["rebuild".to_string()],
            modules_dir: "node_modules".to_string(),
        }
    }
}

/// Dependency cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Subdirectory of the cache dir holding the cache entry
    pub dir_name: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir_name: "fn-deps".to_string(),
        }
    }
}

/// Hooks run around staging
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HooksConfig {
    /// Shell command run in the build dir before staging
    pub before_compile: Option<String>,
}
