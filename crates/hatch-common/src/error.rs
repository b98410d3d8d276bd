//! Unified error types for the Hatch workspace.
//!
//! Every stage of the pull-and-launch pipeline reports failures through
//! [`HatchError`]. None of the variants are retried internally; the launcher
//! surfaces them and exits with status `255`.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum HatchError {
    /// The token endpoint refused to issue a pull token or returned a
    /// body without one.
    #[error("authentication failed for {repository}: {message}")]
    Auth {
        /// Repository the token was requested for.
        repository: String,
        /// Description of the failure.
        message: String,
    },

    /// A manifest or blob request failed at the transport level or
    /// returned a non-success HTTP status.
    #[error("registry request to {url} failed: {message}")]
    Registry {
        /// URL of the failing request.
        url: String,
        /// HTTP status code, when the server answered.
        status: Option<u16>,
        /// Description of the failure.
        message: String,
    },

    /// A registry response body was not the JSON document expected.
    #[error("malformed {what}: {source}")]
    Decode {
        /// Document being decoded.
        what: String,
        /// Underlying JSON error.
        source: serde_json::Error,
    },

    /// Decompression or a filesystem write failed while unpacking a layer.
    #[error("layer extraction failed at {path}: {source}")]
    Extract {
        /// Path being written, or the destination directory.
        path: PathBuf,
        /// Underlying I/O or decompression error.
        source: std::io::Error,
    },

    /// Changing the root filesystem or entering a new namespace failed.
    #[error("isolation failed: {message}")]
    Isolation {
        /// Description of the failure.
        message: String,
    },

    /// Downloaded blob content does not hash to its declared digest.
    #[error("digest mismatch for blob {expected}: computed {actual}")]
    DigestMismatch {
        /// Digest declared by the manifest.
        expected: String,
        /// Digest computed over the received bytes.
        actual: String,
    },

    /// The target command could not be started.
    #[error("failed to launch {command}: {source}")]
    Launch {
        /// Command that failed to spawn.
        command: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// An I/O operation outside layer extraction failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A configuration value or image reference is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },
}

impl HatchError {
    /// Returns the HTTP status attached to a registry failure, if any.
    #[must_use]
    pub const fn http_status(&self) -> Option<u16> {
        match self {
            Self::Registry { status, .. } => *status,
            _ => None,
        }
    }

    /// Short machine-friendly name of the error category.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Auth { .. } => "auth",
            Self::Registry { .. } => "registry",
            Self::Decode { .. } => "decode",
            Self::Extract { .. } => "extract",
            Self::Isolation { .. } => "isolation",
            Self::DigestMismatch { .. } => "digest",
            Self::Launch { .. } => "launch",
            Self::Io { .. } => "io",
            Self::Config { .. } => "config",
        }
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, HatchError>;
