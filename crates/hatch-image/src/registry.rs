//! Registry client for anonymous image pulls.
//!
//! Speaks the Docker Registry HTTP API v2 with bearer-token auth:
//! a token is requested from the auth endpoint for one repository, then
//! used for every manifest and blob request of the same pull. Each request
//! is made exactly once; nothing is retried.

use std::fmt;
use std::io::{self, Read};
use std::time::Duration;

use hatch_common::config::RegistryConfig;
use hatch_common::constants::{
    DOCKER_LAYER_GZIP_MEDIA_TYPE, DOCKER_MANIFEST_LIST_MEDIA_TYPE, DOCKER_MANIFEST_MEDIA_TYPE,
    OCI_INDEX_MEDIA_TYPE, OCI_LAYER_GZIP_MEDIA_TYPE, OCI_MANIFEST_MEDIA_TYPE,
};
use hatch_common::error::{HatchError, Result};
use hatch_common::types::Platform;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{ACCEPT, AUTHORIZATION};
use serde::Deserialize;

use crate::manifest::{Layer, ManifestNode};

/// Short-lived bearer credential scoped to one repository.
#[derive(Clone, PartialEq, Eq)]
pub struct PullToken(String);

impl PullToken {
    /// Wraps a raw token string.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the raw token.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

impl fmt::Debug for PullToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PullToken(<redacted>)")
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    token: Option<String>,
    access_token: Option<String>,
}

/// Streaming body of a layer blob.
///
/// Dropping it releases the underlying connection.
pub struct BlobStream {
    digest: String,
    response: Response,
}

impl BlobStream {
    /// Digest of the blob being streamed.
    #[must_use]
    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// `Content-Length` announced by the registry, if any.
    #[must_use]
    pub fn content_length(&self) -> Option<u64> {
        self.response.content_length()
    }
}

impl Read for BlobStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.response.read(buf)
    }
}

impl fmt::Debug for BlobStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlobStream")
            .field("digest", &self.digest)
            .field("status", &self.response.status())
            .finish_non_exhaustive()
    }
}

/// Blocking client for one registry.
#[derive(Debug, Clone)]
pub struct RegistryClient {
    http: Client,
    config: RegistryConfig,
    platform: Platform,
}

impl RegistryClient {
    /// Creates a client for the configured registry, resolving manifest
    /// lists for the running host's platform.
    ///
    /// # Errors
    ///
    /// Returns [`HatchError::Config`] if the HTTP client cannot be built.
    pub fn new(config: RegistryConfig) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("hatch/", env!("CARGO_PKG_VERSION")))
            .timeout(None::<Duration>)
            .build()
            .map_err(|e| HatchError::Config {
                message: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self::with_http_client(config, http))
    }

    /// Creates a client around a preconfigured HTTP client.
    #[must_use]
    pub fn with_http_client(config: RegistryConfig, http: Client) -> Self {
        Self {
            http,
            config,
            platform: Platform::current(),
        }
    }

    /// Resolves manifest lists for `platform` instead of the host's.
    #[must_use]
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    /// Platform used when filtering manifest lists.
    #[must_use]
    pub const fn platform(&self) -> &Platform {
        &self.platform
    }

    /// Requests an anonymous pull token for `name`.
    ///
    /// # Errors
    ///
    /// Returns [`HatchError::Auth`] on a transport failure, a non-success
    /// status, or a body carrying no token.
    pub fn get_token(&self, name: &str) -> Result<PullToken> {
        let repository = self.config.repository(name);
        let url = format!(
            "{}?service={}&scope=repository:{repository}:pull",
            self.config.auth_url, self.config.auth_service
        );
        tracing::debug!(url = %url, "requesting pull token");

        let auth_err = |message: String| HatchError::Auth {
            repository: repository.clone(),
            message,
        };

        let response = self
            .http
            .get(&url)
            .send()
            .map_err(|e| auth_err(format!("token request failed: {e}")))?;
        if !response.status().is_success() {
            return Err(auth_err(format!("token endpoint returned HTTP {}", response.status())));
        }
        let body = response
            .bytes()
            .map_err(|e| auth_err(format!("failed to read token response: {e}")))?;
        let parsed: TokenResponse = serde_json::from_slice(&body)
            .map_err(|e| auth_err(format!("malformed token response: {e}")))?;

        match parsed.token.or(parsed.access_token) {
            Some(token) if !token.is_empty() => {
                tracing::info!(repository = %repository, "obtained pull token");
                Ok(PullToken(token))
            }
            _ => Err(auth_err("token response carries no token".into())),
        }
    }

    /// Resolves `reference` (a tag or a digest) to the ordered layer list
    /// of the manifest matching this client's platform.
    ///
    /// Manifest lists are followed into every matching entry, and the
    /// resulting layer lists are concatenated in list order. A list with no
    /// matching entry yields no layers.
    ///
    /// # Errors
    ///
    /// Returns [`HatchError::Registry`] on a failed request or when list
    /// nesting exceeds the configured depth, and [`HatchError::Decode`] on a
    /// malformed manifest.
    pub fn resolve_layers(
        &self,
        name: &str,
        reference: &str,
        token: &PullToken,
    ) -> Result<Vec<Layer>> {
        let layers = self.resolve_at_depth(name, reference, token, 0)?;
        if layers.is_empty() {
            tracing::warn!(
                image = name,
                reference,
                platform = %self.platform,
                "no layers resolved for this platform"
            );
        }
        Ok(layers)
    }

    fn resolve_at_depth(
        &self,
        name: &str,
        reference: &str,
        token: &PullToken,
        depth: usize,
    ) -> Result<Vec<Layer>> {
        if depth > self.config.max_manifest_depth {
            return Err(HatchError::Registry {
                url: self.manifest_url(name, reference),
                status: None,
                message: format!(
                    "manifest lists nested deeper than {} levels",
                    self.config.max_manifest_depth
                ),
            });
        }

        let node = self.get_manifest(name, reference, token)?;
        if let ManifestNode::Concrete { layers } = node {
            tracing::debug!(reference, layers = layers.len(), "resolved concrete manifest");
            return Ok(layers);
        }

        let mut layers = Vec::new();
        for digest in node.matching_digests(&self.platform) {
            tracing::debug!(reference, digest, platform = %self.platform, "following manifest list entry");
            layers.extend(self.resolve_at_depth(name, digest, token, depth + 1)?);
        }
        Ok(layers)
    }

    /// Fetches and decodes the manifest at `reference`.
    ///
    /// # Errors
    ///
    /// Returns [`HatchError::Registry`] on a failed request and
    /// [`HatchError::Decode`] on a malformed body.
    pub fn get_manifest(
        &self,
        name: &str,
        reference: &str,
        token: &PullToken,
    ) -> Result<ManifestNode> {
        let url = self.manifest_url(name, reference);
        let accept = [
            OCI_INDEX_MEDIA_TYPE,
            OCI_MANIFEST_MEDIA_TYPE,
            DOCKER_MANIFEST_LIST_MEDIA_TYPE,
            DOCKER_MANIFEST_MEDIA_TYPE,
        ]
        .join(", ");
        let request = self
            .http
            .get(&url)
            .header(ACCEPT, accept)
            .header(AUTHORIZATION, token.bearer());
        let response = send(request, &url)?;

        let body = response.bytes().map_err(|e| HatchError::Registry {
            url: url.clone(),
            status: None,
            message: format!("failed to read manifest body: {e}"),
        })?;
        serde_json::from_slice(&body).map_err(|source| HatchError::Decode {
            what: format!("manifest {name}@{reference}"),
            source,
        })
    }

    /// Starts downloading the blob of `layer`.
    ///
    /// # Errors
    ///
    /// Returns [`HatchError::Registry`] on a failed request.
    pub fn fetch_layer_blob(
        &self,
        layer: &Layer,
        name: &str,
        token: &PullToken,
    ) -> Result<BlobStream> {
        let url = format!(
            "{}/v2/{}/blobs/{}",
            self.config.registry_url,
            self.config.repository(name),
            layer.digest
        );
        let accept = [OCI_LAYER_GZIP_MEDIA_TYPE, DOCKER_LAYER_GZIP_MEDIA_TYPE].join(", ");
        let request = self
            .http
            .get(&url)
            .header(ACCEPT, accept)
            .header(AUTHORIZATION, token.bearer());
        let response = send(request, &url)?;
        tracing::debug!(digest = %layer.digest, size = layer.size, "downloading layer blob");

        Ok(BlobStream {
            digest: layer.digest.clone(),
            response,
        })
    }

    fn manifest_url(&self, name: &str, reference: &str) -> String {
        format!(
            "{}/v2/{}/manifests/{reference}",
            self.config.registry_url,
            self.config.repository(name)
        )
    }
}

/// Sends `request` and rejects non-success responses.
fn send(request: RequestBuilder, url: &str) -> Result<Response> {
    let response = request.send().map_err(|e| HatchError::Registry {
        url: url.to_string(),
        status: None,
        message: e.to_string(),
    })?;
    let status = response.status();
    if !status.is_success() {
        return Err(HatchError::Registry {
            url: url.to_string(),
            status: Some(status.as_u16()),
            message: format!("HTTP {status}"),
        });
    }
    Ok(response)
}
