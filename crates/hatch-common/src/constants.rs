//! System-wide constants and default paths.

use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::OnceLock;

/// Default base directory for Hatch data on Linux with root access.
pub const SYSTEM_DATA_DIR: &str = "/var/lib/hatch";

/// Picks the data directory for a given `$HOME`: `$HOME/.hatch`, or
/// `/var/lib/hatch` without one. Nothing is created on disk.
fn data_dir_for(home: Option<OsString>) -> PathBuf {
    home.filter(|h| !h.is_empty())
        .map_or_else(|| PathBuf::from(SYSTEM_DATA_DIR), |h| PathBuf::from(h).join(".hatch"))
}

static DATA_DIR: OnceLock<PathBuf> = OnceLock::new();

/// Returns the resolved data directory for this session.
pub fn data_dir() -> &'static PathBuf {
    DATA_DIR.get_or_init(|| data_dir_for(std::env::var_os("HOME")))
}

/// Returns the default directory under which rootfs trees are assembled.
pub fn default_rootfs_dir() -> PathBuf {
    data_dir().join("rootfs")
}

/// Token-issuing endpoint for anonymous pulls.
pub const DEFAULT_AUTH_URL: &str = "https://auth.docker.io/token";

/// Service name passed to the token endpoint.
pub const DEFAULT_AUTH_SERVICE: &str = "registry.docker.io";

/// Registry base URL serving the `/v2/` API.
pub const DEFAULT_REGISTRY_URL: &str = "https://registry.hub.docker.com";

/// Repository namespace prepended to bare image names.
pub const DEFAULT_NAMESPACE: &str = "library";

/// Tag used when an image reference carries none.
pub const DEFAULT_TAG: &str = "latest";

/// Maximum nesting of manifest lists followed during resolution.
pub const MAX_MANIFEST_DEPTH: usize = 8;

/// OCI image index media type.
pub const OCI_INDEX_MEDIA_TYPE: &str = "application/vnd.oci.image.index.v1+json";
/// OCI image manifest media type.
pub const OCI_MANIFEST_MEDIA_TYPE: &str = "application/vnd.oci.image.manifest.v1+json";
/// Docker manifest list media type.
pub const DOCKER_MANIFEST_LIST_MEDIA_TYPE: &str =
    "application/vnd.docker.distribution.manifest.list.v2+json";
/// Docker image manifest media type.
pub const DOCKER_MANIFEST_MEDIA_TYPE: &str =
    "application/vnd.docker.distribution.manifest.v2+json";
/// OCI gzip layer media type.
pub const OCI_LAYER_GZIP_MEDIA_TYPE: &str = "application/vnd.oci.image.layer.v1.tar+gzip";
/// Docker gzip layer media type.
pub const DOCKER_LAYER_GZIP_MEDIA_TYPE: &str =
    "application/vnd.docker.image.rootfs.diff.tar.gzip";

/// SHA-256 digest length in hex characters.
pub const SHA256_HEX_LENGTH: usize = 64;

/// Exit status reported when the pull or isolation pipeline fails.
pub const PIPELINE_FAILURE_EXIT_CODE: i32 = 255;

/// Binary name for the CLI.
pub const BIN_NAME: &str = "hatch";
