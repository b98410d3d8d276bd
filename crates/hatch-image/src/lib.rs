//! # hatch-image
//!
//! Turns an image reference into an assembled root filesystem.
//!
//! Handles:
//! - **Registry**: Pull tokens, manifest and manifest-list resolution, blob download.
//! - **Manifests**: The registry document model and platform filtering.
//! - **Layers**: Streaming gzip/tar extraction onto the rootfs directory.
//! - **Hashing**: SHA-256 verification of downloaded blobs.
//! - **Pull**: The sequential token → manifest → layers pipeline.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod hash;
pub mod layer;
pub mod manifest;
pub mod pull;
pub mod registry;

pub use layer::TarExtractor;
pub use manifest::{Layer, ManifestNode};
pub use pull::ImagePuller;
pub use registry::{PullToken, RegistryClient};
