//! Domain primitive types used across the Hatch workspace.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{HatchError, Result};

/// A human-readable image reference split into repository name and tag.
///
/// The original string is kept verbatim because it names the rootfs
/// directory (`<base_dir>/<reference>`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageReference {
    raw: String,
    name: String,
    tag: String,
}

impl ImageReference {
    /// Parses `name[:tag]`.
    ///
    /// The split happens at the first `:`. A reference without one gets the
    /// `latest` tag.
    ///
    /// # Errors
    ///
    /// Returns [`HatchError::Config`] if the name or the tag is empty.
    pub fn parse(reference: &str) -> Result<Self> {
        let (name, tag) = reference
            .split_once(':')
            .unwrap_or((reference, crate::constants::DEFAULT_TAG));
        if name.is_empty() || tag.is_empty() {
            return Err(HatchError::Config {
                message: format!("invalid image reference: {reference:?}"),
            });
        }
        Ok(Self {
            raw: reference.to_string(),
            name: name.to_string(),
            tag: tag.to_string(),
        })
    }

    /// Repository name without tag (e.g. `alpine`).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Tag, `latest` when none was given.
    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// The reference exactly as supplied by the caller.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl FromStr for ImageReference {
    type Err = HatchError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

/// Operating system and CPU architecture in registry vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Platform {
    /// Operating system (`linux`).
    pub os: String,
    /// Architecture (`amd64`, `arm64`, ...).
    pub architecture: String,
}

impl Platform {
    /// Creates a platform from explicit values.
    #[must_use]
    pub fn new(os: impl Into<String>, architecture: impl Into<String>) -> Self {
        Self {
            os: os.into(),
            architecture: architecture.into(),
        }
    }

    /// Returns the platform of the running host.
    #[must_use]
    pub fn current() -> Self {
        Self::new(std::env::consts::OS, registry_arch(std::env::consts::ARCH))
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.os, self.architecture)
    }
}

/// Maps a Rust target architecture name to the name registries use.
#[must_use]
pub fn registry_arch(rust_arch: &str) -> &str {
    match rust_arch {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        "x86" => "386",
        "powerpc64" if cfg!(target_endian = "little") => "ppc64le",
        "loongarch64" => "loong64",
        other => other,
    }
}

/// SHA-256 hash digest used for content verification.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Sha256Hash(String);

impl Sha256Hash {
    /// Creates a hash from a hex-encoded string.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not a valid 64-character hex string.
    pub fn from_hex(hex: impl Into<String>) -> Result<Self> {
        let hex = hex.into();
        if hex.len() != crate::constants::SHA256_HEX_LENGTH
            || !hex.chars().all(|c| c.is_ascii_hexdigit())
        {
            return Err(HatchError::Config {
                message: format!("invalid SHA-256 hex string: {hex}"),
            });
        }
        Ok(Self(hex.to_ascii_lowercase()))
    }

    /// Creates a hash from raw digest bytes.
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(hex::encode(bytes))
    }

    /// Parses a registry digest of the form `sha256:<hex>`.
    ///
    /// Returns `None` for other algorithms or malformed input.
    #[must_use]
    pub fn from_digest(digest: &str) -> Option<Self> {
        digest
            .strip_prefix("sha256:")
            .and_then(|hex| Self::from_hex(hex).ok())
    }

    /// Returns the hex-encoded hash string.
    #[must_use]
    pub fn as_hex(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Sha256Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sha256:{}", self.0)
    }
}
