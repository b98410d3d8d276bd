//! Pull pipeline tests against an in-process stub registry.
//!
//! The stub serves a fixed route table over plain HTTP on a loopback port
//! and records every request, so tests can check both the assembled rootfs
//! and what was asked of the registry.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::collections::{BTreeMap, HashMap};
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use flate2::Compression;
use flate2::write::GzEncoder;
use hatch_common::config::{LinkPolicy, RegistryConfig};
use hatch_common::error::HatchError;
use hatch_common::types::Platform;
use hatch_image::hash::sha256_digest;
use hatch_image::{ImagePuller, Layer, RegistryClient, TarExtractor};

// ── Stub registry ────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct Request {
    target: String,
    headers: HashMap<String, String>,
}

impl Request {
    fn path(&self) -> &str {
        self.target.split('?').next().unwrap_or_default()
    }

    fn header(&self, name: &str) -> &str {
        self.headers.get(name).map_or("", String::as_str)
    }
}

struct StubRegistry {
    base: String,
    routes: Arc<Mutex<HashMap<String, (u16, Vec<u8>)>>>,
    requests: Arc<Mutex<Vec<Request>>>,
}

impl StubRegistry {
    fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind stub registry");
        let base = format!("http://{}", listener.local_addr().unwrap());
        let routes: Arc<Mutex<HashMap<String, (u16, Vec<u8>)>>> = Arc::default();
        let requests: Arc<Mutex<Vec<Request>>> = Arc::default();

        let (r, q) = (Arc::clone(&routes), Arc::clone(&requests));
        let _ = std::thread::spawn(move || {
            for stream in listener.incoming().flatten() {
                let (r, q) = (Arc::clone(&r), Arc::clone(&q));
                let _ = std::thread::spawn(move || serve(stream, &r, &q));
            }
        });

        Self {
            base,
            routes,
            requests,
        }
    }

    fn route(&self, path: &str, status: u16, body: impl Into<Vec<u8>>) {
        let _ = self
            .routes
            .lock()
            .unwrap()
            .insert(path.to_string(), (status, body.into()));
    }

    fn token(&self, token: &str) {
        self.route("/token", 200, format!(r#"{{"token":"{token}","expires_in":300}}"#));
    }

    fn manifest(&self, reference: &str, body: &serde_json::Value) {
        self.route(
            &format!("/v2/library/demo/manifests/{reference}"),
            200,
            body.to_string(),
        );
    }

    fn blob(&self, blob: &[u8]) -> Layer {
        let digest = sha256_digest(blob).to_string();
        self.route(&format!("/v2/library/demo/blobs/{digest}"), 200, blob);
        Layer {
            media_type: "application/vnd.oci.image.layer.v1.tar+gzip".into(),
            size: blob.len() as u64,
            digest,
        }
    }

    fn requests(&self) -> Vec<Request> {
        self.requests.lock().unwrap().clone()
    }

    fn requested(&self, path: &str) -> bool {
        self.requests().iter().any(|r| r.path() == path)
    }

    fn config(&self) -> RegistryConfig {
        RegistryConfig {
            auth_url: format!("{}/token", self.base),
            auth_service: "stub.registry".into(),
            registry_url: self.base.clone(),
            ..RegistryConfig::default()
        }
    }

    fn client(&self) -> RegistryClient {
        let http = reqwest::blocking::Client::builder()
            .no_proxy()
            .build()
            .expect("build http client");
        RegistryClient::with_http_client(self.config(), http)
            .with_platform(Platform::new("linux", "amd64"))
    }

    fn puller(&self) -> ImagePuller {
        ImagePuller::new(self.client(), TarExtractor::new())
    }
}

fn serve(
    stream: TcpStream,
    routes: &Mutex<HashMap<String, (u16, Vec<u8>)>>,
    requests: &Mutex<Vec<Request>>,
) {
    let mut reader = BufReader::new(stream.try_clone().expect("clone stream"));
    let mut line = String::new();
    if reader.read_line(&mut line).is_err() {
        return;
    }
    let target = line.split_whitespace().nth(1).unwrap_or("/").to_string();

    let mut headers = HashMap::new();
    loop {
        let mut header = String::new();
        if reader.read_line(&mut header).unwrap_or(0) == 0 || header.trim().is_empty() {
            break;
        }
        if let Some((name, value)) = header.split_once(':') {
            let _ = headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
        }
    }

    let request = Request { target, headers };
    let (status, body) = routes
        .lock()
        .unwrap()
        .get(request.path())
        .cloned()
        .unwrap_or((404, br#"{"errors":[{"code":"NOT_FOUND"}]}"#.to_vec()));
    requests.lock().unwrap().push(request);

    let mut stream = stream;
    let head = format!(
        "HTTP/1.1 {status} Stub\r\nContent-Length: {}\r\nContent-Type: application/octet-stream\r\nConnection: close\r\n\r\n",
        body.len()
    );
    let _ = stream.write_all(head.as_bytes());
    let _ = stream.write_all(&body);
    let _ = stream.flush();
}

// ── Fixtures ─────────────────────────────────────────────────────────

fn layer_blob(files: &[(&str, u32, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    for (path, mode, data) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(*mode);
        header.set_cksum();
        builder.append_data(&mut header, path, *data).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

fn concrete(layers: &[&Layer]) -> serde_json::Value {
    serde_json::json!({
        "schemaVersion": 2,
        "mediaType": "application/vnd.oci.image.manifest.v1+json",
        "config": {"digest": "sha256:config", "size": 2},
        "layers": layers,
    })
}

fn index(entries: &[(&str, &str)]) -> serde_json::Value {
    let manifests: Vec<_> = entries
        .iter()
        .map(|(digest, arch)| {
            serde_json::json!({
                "digest": digest,
                "mediaType": "application/vnd.oci.image.manifest.v1+json",
                "platform": {"os": "linux", "architecture": arch},
            })
        })
        .collect();
    serde_json::json!({
        "schemaVersion": 2,
        "mediaType": "application/vnd.oci.image.index.v1+json",
        "manifests": manifests,
    })
}

/// Relative path → (mode, content) for every regular file under `root`.
fn snapshot(root: &Path) -> BTreeMap<PathBuf, (u32, Vec<u8>)> {
    use std::os::unix::fs::PermissionsExt;

    fn walk(root: &Path, dir: &Path, out: &mut BTreeMap<PathBuf, (u32, Vec<u8>)>) {
        for entry in std::fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            let meta = std::fs::metadata(&path).unwrap();
            if meta.is_dir() {
                walk(root, &path, out);
            } else {
                let rel = path.strip_prefix(root).unwrap().to_path_buf();
                let mode = meta.permissions().mode() & 0o7777;
                let _ = out.insert(rel, (mode, std::fs::read(&path).unwrap()));
            }
        }
    }

    let mut out = BTreeMap::new();
    walk(root, root, &mut out);
    out
}

/// A stub serving `demo:latest` as a two-platform index.
fn multi_platform_registry() -> StubRegistry {
    let stub = StubRegistry::start();
    stub.token("tok-123");

    let base = stub.blob(&layer_blob(&[
        ("etc/os-release", 0o644, b"ID=demo\n"),
        ("bin/app", 0o755, b"amd64 v1"),
    ]));
    let top = stub.blob(&layer_blob(&[("bin/app", 0o755, b"amd64 v2")]));
    let arm = stub.blob(&layer_blob(&[("bin/app", 0o755, b"arm64")]));

    stub.manifest("sha256:amd64", &concrete(&[&base, &top]));
    stub.manifest("sha256:arm64", &concrete(&[&arm]));
    stub.manifest(
        "latest",
        &index(&[("sha256:amd64", "amd64"), ("sha256:arm64", "arm64")]),
    );
    stub
}

// ── Registry client ──────────────────────────────────────────────────

#[test]
fn token_request_is_scoped_to_repository() {
    let stub = StubRegistry::start();
    stub.token("tok-abc");

    let token = stub.client().get_token("demo").expect("token");
    assert_eq!(token.as_str(), "tok-abc");

    let requests = stub.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(
        requests[0].target,
        "/token?service=stub.registry&scope=repository:library/demo:pull"
    );
    assert!(requests[0].header("authorization").is_empty());
}

#[test]
fn token_accepts_access_token_field() {
    let stub = StubRegistry::start();
    stub.route("/token", 200, r#"{"access_token":"oauth-style"}"#);
    let token = stub.client().get_token("demo").expect("token");
    assert_eq!(token.as_str(), "oauth-style");
}

#[test]
fn token_failures_are_auth_errors() {
    let stub = StubRegistry::start();
    stub.route("/token", 401, r#"{"details":"denied"}"#);
    let err = stub.client().get_token("demo").unwrap_err();
    assert!(matches!(err, HatchError::Auth { .. }), "{err}");

    stub.route("/token", 200, "<html>oops</html>");
    let err = stub.client().get_token("demo").unwrap_err();
    assert!(matches!(err, HatchError::Auth { .. }), "{err}");

    stub.route("/token", 200, r#"{"token":""}"#);
    let err = stub.client().get_token("demo").unwrap_err();
    assert!(matches!(err, HatchError::Auth { .. }), "{err}");
}

#[test]
fn manifest_list_resolves_only_host_platform() {
    let stub = multi_platform_registry();
    let client = stub.client();
    let token = client.get_token("demo").unwrap();

    let layers = client.resolve_layers("demo", "latest", &token).expect("resolve");
    assert_eq!(layers.len(), 2);
    assert!(stub.requested("/v2/library/demo/manifests/sha256:amd64"));
    assert!(!stub.requested("/v2/library/demo/manifests/sha256:arm64"));

    let manifest_request = stub
        .requests()
        .into_iter()
        .find(|r| r.path() == "/v2/library/demo/manifests/latest")
        .unwrap();
    assert_eq!(manifest_request.header("authorization"), "Bearer tok-123");
    assert!(
        manifest_request
            .header("accept")
            .contains("application/vnd.oci.image.manifest.v1+json")
    );
    assert!(
        manifest_request
            .header("accept")
            .contains("application/vnd.oci.image.index.v1+json")
    );
}

#[test]
fn other_platform_sees_its_own_layers() {
    let stub = multi_platform_registry();
    let client = stub.client().with_platform(Platform::new("linux", "arm64"));
    let token = client.get_token("demo").unwrap();

    let layers = client.resolve_layers("demo", "latest", &token).unwrap();
    assert_eq!(layers.len(), 1);
    assert!(!stub.requested("/v2/library/demo/manifests/sha256:amd64"));
}

#[test]
fn resolution_is_repeatable() {
    let stub = multi_platform_registry();
    let client = stub.client();
    let token = client.get_token("demo").unwrap();

    let first = client.resolve_layers("demo", "latest", &token).unwrap();
    let second = client.resolve_layers("demo", "latest", &token).unwrap();
    assert_eq!(first, second);
}

#[test]
fn list_without_matching_platform_yields_no_layers() {
    let stub = StubRegistry::start();
    stub.token("t");
    stub.manifest("latest", &index(&[("sha256:s390x", "s390x")]));

    let client = stub.client();
    let token = client.get_token("demo").unwrap();
    assert!(client.resolve_layers("demo", "latest", &token).unwrap().is_empty());
    assert!(!stub.requested("/v2/library/demo/manifests/sha256:s390x"));
}

#[test]
fn duplicate_platform_entries_are_concatenated_in_order() {
    let stub = StubRegistry::start();
    stub.token("t");
    let a = stub.blob(&layer_blob(&[("a", 0o644, b"a")]));
    let b = stub.blob(&layer_blob(&[("b", 0o644, b"b")]));
    stub.manifest("sha256:first", &concrete(&[&a]));
    stub.manifest("sha256:second", &concrete(&[&b, &a]));
    stub.manifest(
        "latest",
        &index(&[("sha256:first", "amd64"), ("sha256:second", "amd64")]),
    );

    let client = stub.client();
    let token = client.get_token("demo").unwrap();
    let digests: Vec<_> = client
        .resolve_layers("demo", "latest", &token)
        .unwrap()
        .into_iter()
        .map(|l| l.digest)
        .collect();
    assert_eq!(digests, [a.digest.clone(), b.digest, a.digest]);
}

#[test]
fn self_referencing_list_hits_depth_guard() {
    let stub = StubRegistry::start();
    stub.token("t");
    stub.manifest("latest", &index(&[("sha256:loop", "amd64")]));
    stub.manifest("sha256:loop", &index(&[("sha256:loop", "amd64")]));

    let config = RegistryConfig {
        max_manifest_depth: 3,
        ..stub.config()
    };
    let http = reqwest::blocking::Client::builder().no_proxy().build().unwrap();
    let client = RegistryClient::with_http_client(config, http)
        .with_platform(Platform::new("linux", "amd64"));
    let token = client.get_token("demo").unwrap();

    let err = client.resolve_layers("demo", "latest", &token).unwrap_err();
    assert!(matches!(err, HatchError::Registry { status: None, .. }), "{err}");
}

#[test]
fn malformed_manifest_is_decode_error() {
    let stub = StubRegistry::start();
    stub.token("t");
    stub.route("/v2/library/demo/manifests/latest", 200, "{\"layers\": 42}");

    let client = stub.client();
    let token = client.get_token("demo").unwrap();
    let err = client.resolve_layers("demo", "latest", &token).unwrap_err();
    assert!(matches!(err, HatchError::Decode { .. }), "{err}");
}

#[test]
fn blob_request_carries_token_and_layer_media_type() {
    let stub = multi_platform_registry();
    let dir = tempfile::tempdir().unwrap();
    let _ = stub.puller().pull("demo", dir.path()).unwrap();

    let blob_requests: Vec<_> = stub
        .requests()
        .into_iter()
        .filter(|r| r.path().contains("/blobs/"))
        .collect();
    assert_eq!(blob_requests.len(), 2);
    for r in blob_requests {
        assert_eq!(r.header("authorization"), "Bearer tok-123");
        assert!(r.header("accept").contains("application/vnd.oci.image.layer.v1.tar+gzip"));
    }
}

#[test]
fn blob_stream_reports_digest_and_length() {
    let stub = StubRegistry::start();
    stub.token("tok-123");
    let blob = layer_blob(&[("hello", 0o644, b"hi")]);
    let layer = stub.blob(&blob);
    let client = stub.client();
    let token = client.get_token("demo").unwrap();

    let mut stream = client.fetch_layer_blob(&layer, "demo", &token).unwrap();
    assert_eq!(stream.digest(), layer.digest);
    assert_eq!(stream.content_length(), Some(blob.len() as u64));

    let mut body = Vec::new();
    let _ = std::io::Read::read_to_end(&mut stream, &mut body).unwrap();
    assert_eq!(body, blob);
}

// ── Image puller ─────────────────────────────────────────────────────

#[test]
fn pull_applies_layers_in_manifest_order() {
    let stub = multi_platform_registry();
    let dir = tempfile::tempdir().unwrap();

    let rootfs = stub.puller().pull("demo", dir.path()).expect("pull");

    assert_eq!(rootfs, dir.path().join("demo"));
    assert_eq!(std::fs::read(rootfs.join("bin/app")).unwrap(), b"amd64 v2");
    assert_eq!(std::fs::read(rootfs.join("etc/os-release")).unwrap(), b"ID=demo\n");
}

#[test]
fn rootfs_directory_keeps_tag_suffix() {
    let stub = StubRegistry::start();
    stub.token("t");
    let layer = stub.blob(&layer_blob(&[("hello", 0o644, b"hi")]));
    stub.manifest("1.2", &concrete(&[&layer]));

    let dir = tempfile::tempdir().unwrap();
    let rootfs = stub.puller().pull("demo:1.2", dir.path()).unwrap();
    assert_eq!(rootfs, dir.path().join("demo:1.2"));
    assert_eq!(std::fs::read(rootfs.join("hello")).unwrap(), b"hi");
}

#[test]
fn independent_pulls_produce_identical_trees() {
    let stub = multi_platform_registry();
    let first = tempfile::tempdir().unwrap();
    let second = tempfile::tempdir().unwrap();

    let a = stub.puller().pull("demo", first.path()).unwrap();
    let b = stub.puller().pull("demo", second.path()).unwrap();

    let snap = snapshot(&a);
    assert!(!snap.is_empty());
    assert_eq!(snap, snapshot(&b));
}

#[test]
fn manifest_404_fails_before_creating_rootfs() {
    let stub = StubRegistry::start();
    stub.token("t");

    let dir = tempfile::tempdir().unwrap();
    let err = stub.puller().pull("demo:missing", dir.path()).unwrap_err();

    assert!(matches!(err, HatchError::Registry { .. }), "{err}");
    assert_eq!(err.http_status(), Some(404));
    assert!(!dir.path().join("demo:missing").exists());
}

#[test]
fn blob_failure_keeps_earlier_layers() {
    let stub = StubRegistry::start();
    stub.token("t");
    let good = stub.blob(&layer_blob(&[("first", 0o644, b"kept")]));
    let missing = Layer {
        media_type: "application/vnd.oci.image.layer.v1.tar+gzip".into(),
        size: 10,
        digest: format!("sha256:{}", "f".repeat(64)),
    };
    stub.manifest("latest", &concrete(&[&good, &missing]));

    let dir = tempfile::tempdir().unwrap();
    let err = stub.puller().pull("demo", dir.path()).unwrap_err();

    assert_eq!(err.http_status(), Some(404));
    assert_eq!(std::fs::read(dir.path().join("demo/first")).unwrap(), b"kept");
}

#[test]
fn corrupted_blob_fails_digest_check() {
    let stub = StubRegistry::start();
    stub.token("t");
    let blob = layer_blob(&[("file", 0o644, b"payload")]);
    let mut layer = stub.blob(&blob);
    let forged = format!("sha256:{}", "0".repeat(64));
    stub.route(&format!("/v2/library/demo/blobs/{forged}"), 200, blob);
    layer.digest = forged;
    stub.manifest("latest", &concrete(&[&layer]));

    let dir = tempfile::tempdir().unwrap();
    let err = stub.puller().pull("demo", dir.path()).unwrap_err();
    assert!(matches!(err, HatchError::DigestMismatch { .. }), "{err}");

    let unchecked = stub.puller().with_digest_verification(false);
    let rootfs = unchecked.pull("demo", dir.path()).expect("pull without verification");
    assert_eq!(std::fs::read(rootfs.join("file")).unwrap(), b"payload");
}

#[test]
fn corrupt_archive_is_extract_error() {
    let stub = StubRegistry::start();
    stub.token("t");
    let layer = stub.blob(b"this is not a gzip stream");
    stub.manifest("latest", &concrete(&[&layer]));

    let dir = tempfile::tempdir().unwrap();
    let err = stub.puller().pull("demo", dir.path()).unwrap_err();
    assert!(matches!(err, HatchError::Extract { .. }), "{err}");
}

#[test]
fn materialized_links_survive_pull() {
    let stub = StubRegistry::start();
    stub.token("t");

    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    let mut header = tar::Header::new_gnu();
    header.set_size(3);
    header.set_mode(0o755);
    header.set_cksum();
    builder.append_data(&mut header, "bin/busybox", &b"elf"[..]).unwrap();
    let mut link = tar::Header::new_gnu();
    link.set_entry_type(tar::EntryType::Symlink);
    link.set_size(0);
    builder.append_link(&mut link, "bin/sh", "busybox").unwrap();
    let blob = builder.into_inner().unwrap().finish().unwrap();

    let layer = stub.blob(&blob);
    stub.manifest("latest", &concrete(&[&layer]));

    let dir = tempfile::tempdir().unwrap();
    let puller = ImagePuller::new(
        stub.client(),
        TarExtractor::new().with_link_policy(LinkPolicy::Materialize),
    );
    let rootfs = puller.pull("demo", dir.path()).unwrap();
    assert_eq!(std::fs::read(rootfs.join("bin/sh")).unwrap(), b"elf");
}

#[test]
fn invalid_reference_makes_no_requests() {
    let stub = StubRegistry::start();
    let dir = tempfile::tempdir().unwrap();
    let err = stub.puller().pull("demo:", dir.path()).unwrap_err();
    assert!(matches!(err, HatchError::Config { .. }));
    assert!(stub.requests().is_empty());
}

#[test]
#[ignore = "requires network access to Docker Hub"]
fn pull_alpine_from_docker_hub() {
    let dir = tempfile::tempdir().unwrap();
    let puller = ImagePuller::new(
        RegistryClient::new(RegistryConfig::default()).unwrap(),
        TarExtractor::new().with_link_policy(LinkPolicy::Materialize),
    );
    let rootfs = puller.pull("alpine", dir.path()).expect("pull alpine");
    assert_eq!(rootfs, dir.path().join("alpine"));
    assert!(rootfs.join("bin/busybox").exists());
    assert!(std::fs::read_dir(&rootfs).unwrap().next().is_some());
}
