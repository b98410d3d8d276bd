//! Global configuration model for the Hatch pipeline.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants;
use crate::error::HatchError;

/// Root configuration for a pull-and-launch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HatchConfig {
    /// Directory under which `<image>` rootfs trees are assembled.
    pub base_dir: PathBuf,
    /// Registry endpoints and resolution limits.
    pub registry: RegistryConfig,
    /// Verify every blob against its manifest-declared digest.
    pub verify_digests: bool,
    /// Treatment of symlink and hard-link entries in layer archives.
    pub link_policy: LinkPolicy,
    /// How the target command is placed inside the rootfs.
    pub isolation: IsolationStrategy,
    /// Host binaries hard-linked into the rootfs before the root change.
    pub helper_binaries: Vec<PathBuf>,
}

impl Default for HatchConfig {
    fn default() -> Self {
        Self {
            base_dir: constants::default_rootfs_dir(),
            registry: RegistryConfig::default(),
            verify_digests: true,
            link_policy: LinkPolicy::default(),
            isolation: IsolationStrategy::default(),
            helper_binaries: Vec::new(),
        }
    }
}

/// Registry endpoints used by the pull pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Token-issuing endpoint.
    pub auth_url: String,
    /// `service` query parameter sent to the token endpoint.
    pub auth_service: String,
    /// Base URL of the registry `/v2/` API.
    pub registry_url: String,
    /// Namespace prepended to image names (`library` on Docker Hub).
    pub namespace: String,
    /// Maximum manifest-list nesting followed before giving up.
    pub max_manifest_depth: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            auth_url: constants::DEFAULT_AUTH_URL.into(),
            auth_service: constants::DEFAULT_AUTH_SERVICE.into(),
            registry_url: constants::DEFAULT_REGISTRY_URL.into(),
            namespace: constants::DEFAULT_NAMESPACE.into(),
            max_manifest_depth: constants::MAX_MANIFEST_DEPTH,
        }
    }
}

impl RegistryConfig {
    /// Returns the full repository path for an image name
    /// (`library/alpine`).
    #[must_use]
    pub fn repository(&self, name: &str) -> String {
        if self.namespace.is_empty() {
            name.to_string()
        } else {
            format!("{}/{name}", self.namespace)
        }
    }
}

/// What the extractor does with symlink and hard-link entries.
///
/// Device nodes and FIFOs are skipped under every policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LinkPolicy {
    /// Only directories and regular files are written.
    #[default]
    Skip,
    /// Symlinks and hard links are created as well.
    Materialize,
}

impl FromStr for LinkPolicy {
    type Err = HatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "skip" => Ok(Self::Skip),
            "materialize" => Ok(Self::Materialize),
            other => Err(HatchError::Config {
                message: format!("unknown link policy: {other}"),
            }),
        }
    }
}

impl fmt::Display for LinkPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Skip => write!(f, "skip"),
            Self::Materialize => write!(f, "materialize"),
        }
    }
}

/// Where the root change happens.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IsolationStrategy {
    /// The spawned child changes root and runs in a new PID namespace;
    /// the parent's filesystem view is untouched.
    #[default]
    SpawnedChild,
    /// The calling process itself changes root before spawning.
    /// Irreversible for the rest of the process lifetime.
    InProcess,
}

impl FromStr for IsolationStrategy {
    type Err = HatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "spawned-child" => Ok(Self::SpawnedChild),
            "in-process" => Ok(Self::InProcess),
            other => Err(HatchError::Config {
                message: format!("unknown isolation strategy: {other}"),
            }),
        }
    }
}

impl fmt::Display for IsolationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SpawnedChild => write!(f, "spawned-child"),
            Self::InProcess => write!(f, "in-process"),
        }
    }
}
