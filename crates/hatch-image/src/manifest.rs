//! Registry manifest documents.
//!
//! A manifest endpoint answers with one of two shapes: a manifest list
//! (OCI index / Docker manifest list) naming per-platform manifests by
//! digest, or a concrete manifest listing the layers of one image.

use hatch_common::types::Platform;
use serde::{Deserialize, Serialize};

/// A content-addressed layer blob referenced by a concrete manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Layer {
    /// Media type of the blob (gzip tar for every layer we extract).
    #[serde(default)]
    pub media_type: String,
    /// Compressed size in bytes.
    #[serde(default)]
    pub size: u64,
    /// Content digest, the only key used to fetch the blob.
    pub digest: String,
}

/// An entry of a manifest list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformManifest {
    /// Digest of the platform-specific manifest.
    pub digest: String,
    /// Media type of the referenced manifest.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub media_type: String,
    /// Platform the manifest targets. Attestation entries may omit it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,
}

impl PlatformManifest {
    /// Whether both `os` and `architecture` equal those of `platform`.
    #[must_use]
    pub fn matches(&self, platform: &Platform) -> bool {
        self.platform.as_ref().is_some_and(|p| {
            p.os == platform.os && p.architecture == platform.architecture
        })
    }
}

/// A decoded manifest response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ManifestNode {
    /// Multi-platform manifest list.
    List {
        /// Per-platform entries in registry order.
        manifests: Vec<PlatformManifest>,
    },
    /// Single-platform manifest.
    Concrete {
        /// Layers, bottom to top.
        layers: Vec<Layer>,
    },
}

impl ManifestNode {
    /// Digests of the list entries matching `platform`, in list order.
    ///
    /// Empty for a concrete manifest.
    pub fn matching_digests<'a>(
        &'a self,
        platform: &'a Platform,
    ) -> impl Iterator<Item = &'a str> + 'a {
        let entries: &[PlatformManifest] = match self {
            Self::List { manifests } => manifests,
            Self::Concrete { .. } => &[],
        };
        entries
            .iter()
            .filter(move |m| m.matches(platform))
            .map(|m| m.digest.as_str())
    }
}
