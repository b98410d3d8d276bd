//! Image pull orchestration.
//!
//! Strictly sequential: token, manifest resolution, then for each layer
//! in manifest order a download streamed straight into the extractor. The
//! first failure aborts the pull; layers already applied stay on disk.

use std::path::{Path, PathBuf};

use hatch_common::config::HatchConfig;
use hatch_common::error::{HatchError, Result};
use hatch_common::types::ImageReference;

use crate::hash::{DigestReader, verify_digest};
use crate::layer::TarExtractor;
use crate::manifest::Layer;
use crate::registry::{PullToken, RegistryClient};

/// Assembles rootfs directories from registry images.
#[derive(Debug, Clone)]
pub struct ImagePuller {
    client: RegistryClient,
    extractor: TarExtractor,
    verify_digests: bool,
}

impl ImagePuller {
    /// Creates a puller from its parts. Digest verification is on.
    #[must_use]
    pub const fn new(client: RegistryClient, extractor: TarExtractor) -> Self {
        Self {
            client,
            extractor,
            verify_digests: true,
        }
    }

    /// Builds a puller from the registry, link and verification settings
    /// of `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry client cannot be created.
    pub fn from_config(config: &HatchConfig) -> Result<Self> {
        let client = RegistryClient::new(config.registry.clone())?;
        let extractor = TarExtractor::new().with_link_policy(config.link_policy);
        Ok(Self::new(client, extractor).with_digest_verification(config.verify_digests))
    }

    /// Enables or disables blob digest verification.
    #[must_use]
    pub const fn with_digest_verification(mut self, verify: bool) -> Self {
        self.verify_digests = verify;
        self
    }

    /// Pulls `reference` into `base_dir/<reference>` and returns that path.
    ///
    /// The directory is created only once the layer list is known, so a
    /// failed resolution leaves nothing behind.
    ///
    /// # Errors
    ///
    /// Returns the error of the first failing step: [`HatchError::Config`]
    /// for an invalid reference, [`HatchError::Auth`],
    /// [`HatchError::Registry`], [`HatchError::Decode`],
    /// [`HatchError::Extract`] or [`HatchError::DigestMismatch`].
    pub fn pull(&self, reference: &str, base_dir: &Path) -> Result<PathBuf> {
        let image = ImageReference::parse(reference)?;
        tracing::info!(image = %image, platform = %self.client.platform(), "pulling image");

        let token = self.client.get_token(image.name())?;
        let layers = self
            .client
            .resolve_layers(image.name(), image.tag(), &token)?;
        tracing::info!(image = %image, layers = layers.len(), "resolved layers");

        let rootfs = base_dir.join(image.as_str());
        std::fs::create_dir_all(&rootfs).map_err(|e| HatchError::Io {
            path: rootfs.clone(),
            source: e,
        })?;

        for (index, layer) in layers.iter().enumerate() {
            tracing::info!(
                index = index + 1,
                total = layers.len(),
                digest = %layer.digest,
                size = layer.size,
                "applying layer"
            );
            self.apply_layer(image.name(), layer, &token, &rootfs)?;
        }

        tracing::info!(image = %image, rootfs = %rootfs.display(), "image pulled");
        Ok(rootfs)
    }

    fn apply_layer(
        &self,
        name: &str,
        layer: &Layer,
        token: &PullToken,
        rootfs: &Path,
    ) -> Result<()> {
        let blob = self.client.fetch_layer_blob(layer, name, token)?;
        tracing::debug!(
            digest = blob.digest(),
            declared = layer.size,
            content_length = ?blob.content_length(),
            "streaming layer blob"
        );
        if !self.verify_digests {
            let _ = self.extractor.extract(rootfs, blob)?;
            return Ok(());
        }

        let mut reader = DigestReader::new(blob);
        let _ = self.extractor.extract(rootfs, &mut reader)?;
        let (actual, bytes) = reader.finish().map_err(|e| HatchError::Extract {
            path: rootfs.to_path_buf(),
            source: e,
        })?;
        tracing::debug!(digest = %layer.digest, bytes, "layer blob consumed");
        verify_digest(&layer.digest, &actual)
    }
}
