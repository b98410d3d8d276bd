//! Filesystem layer extraction.
//!
//! Layers are gzip-compressed tar streams applied in manifest order onto
//! one rootfs directory. Later layers overwrite files from earlier ones;
//! whiteout entries get no special treatment.
//!
//! Only directories and regular files are written by default. Symlinks and
//! hard links are created under [`LinkPolicy::Materialize`]. Device nodes,
//! FIFOs and every other entry type are skipped: an unprivileged rootfs
//! cannot hold them and the launched command does not need them.
//!
//! Entry paths are joined onto the destination as recorded in the archive,
//! without sanitization; archives from the registry are trusted. Extraction
//! is not transactional and a failure leaves earlier entries in place.

use std::fs::{self, OpenOptions, Permissions};
use std::io::{self, Read};
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::Path;

use flate2::read::GzDecoder;
use hatch_common::config::LinkPolicy;
use hatch_common::error::{HatchError, Result};
use tar::EntryType;

/// Permission bits kept from tar headers.
const MODE_MASK: u32 = 0o7777;

/// Owner bits a directory needs while entries are written into it.
const OWNER_RWX: u32 = 0o700;

/// Counts of what one extraction wrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractStats {
    /// Directory entries applied.
    pub directories: usize,
    /// Regular files written.
    pub files: usize,
    /// Symlinks and hard links created.
    pub links: usize,
    /// Entries skipped because of their type.
    pub skipped: usize,
}

/// Unpacks gzip-compressed tar layers onto a directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct TarExtractor {
    link_policy: LinkPolicy,
}

impl TarExtractor {
    /// Creates an extractor writing only directories and regular files.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            link_policy: LinkPolicy::Skip,
        }
    }

    /// Sets how symlink and hard-link entries are handled.
    #[must_use]
    pub const fn with_link_policy(mut self, link_policy: LinkPolicy) -> Self {
        self.link_policy = link_policy;
        self
    }

    /// Decompresses `source` and applies every entry under `destination`.
    ///
    /// `source` is read only as far as the tar end marker.
    ///
    /// # Errors
    ///
    /// Returns [`HatchError::Extract`] on a decompression, tar framing, or
    /// filesystem error.
    pub fn extract<R: Read>(&self, destination: &Path, source: R) -> Result<ExtractStats> {
        tracing::debug!(destination = %destination.display(), "extracting layer");

        let mut archive = tar::Archive::new(GzDecoder::new(source));
        let entries = archive
            .entries()
            .map_err(|e| extract_err(destination, e))?;

        let mut stats = ExtractStats::default();
        let mut directory_modes = Vec::new();
        for entry in entries {
            let mut entry = entry.map_err(|e| extract_err(destination, e))?;
            let entry_path = entry
                .path()
                .map_err(|e| extract_err(destination, e))?
                .into_owned();
            let target = destination.join(&entry_path);
            let entry_type = entry.header().entry_type();

            match entry_type {
                EntryType::Directory => {
                    let mode = header_mode(&entry, &target)?;
                    create_directory(&target)?;
                    directory_modes.push((target, mode));
                    stats.directories += 1;
                }
                EntryType::Regular | EntryType::Continuous => {
                    let mode = header_mode(&entry, &target)?;
                    write_file(&target, mode, &mut entry)?;
                    stats.files += 1;
                }
                EntryType::Symlink | EntryType::Link
                    if self.link_policy == LinkPolicy::Materialize =>
                {
                    let link_name = entry
                        .link_name()
                        .map_err(|e| extract_err(&target, e))?
                        .ok_or_else(|| {
                            extract_err(
                                &target,
                                io::Error::new(io::ErrorKind::InvalidData, "link entry without target"),
                            )
                        })?
                        .into_owned();
                    if entry_type == EntryType::Symlink {
                        create_symlink(&link_name, &target)?;
                    } else {
                        create_hard_link(&destination.join(&link_name), &target)?;
                    }
                    stats.links += 1;
                }
                other => {
                    tracing::debug!(path = %entry_path.display(), kind = ?other, "skipping tar entry");
                    stats.skipped += 1;
                }
            }
        }

        // Reverse archive order: children before their read-only parents.
        for (path, mode) in directory_modes.iter().rev() {
            fs::set_permissions(path, Permissions::from_mode(*mode))
                .map_err(|e| extract_err(path, e))?;
        }

        tracing::debug!(
            directories = stats.directories,
            files = stats.files,
            links = stats.links,
            skipped = stats.skipped,
            "layer extracted"
        );
        Ok(stats)
    }
}

fn extract_err(path: &Path, source: io::Error) -> HatchError {
    HatchError::Extract {
        path: path.to_path_buf(),
        source,
    }
}

fn header_mode<R: Read>(entry: &tar::Entry<'_, R>, target: &Path) -> Result<u32> {
    entry
        .header()
        .mode()
        .map(|m| m & MODE_MASK)
        .map_err(|e| extract_err(target, e))
}

/// Creates `target`, leaving it owner-writable until the archive's own mode
/// is applied after the last entry.
fn create_directory(target: &Path) -> Result<()> {
    if !target.is_dir() {
        remove_non_directory(target)?;
        fs::create_dir_all(target).map_err(|e| extract_err(target, e))?;
    }
    let current = fs::metadata(target)
        .map_err(|e| extract_err(target, e))?
        .permissions()
        .mode();
    if current & OWNER_RWX != OWNER_RWX {
        fs::set_permissions(target, Permissions::from_mode((current | OWNER_RWX) & MODE_MASK))
            .map_err(|e| extract_err(target, e))?;
    }
    Ok(())
}

/// Creates `target` afresh and fills it from `content`.
///
/// Whatever was at `target` is unlinked first, so neither a symlink nor a
/// file without owner write permission gets in the way.
fn write_file(target: &Path, mode: u32, content: &mut impl Read) -> Result<()> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|e| extract_err(parent, e))?;
    }
    remove_non_directory(target)?;

    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(mode)
        .open(target)
        .map_err(|e| extract_err(target, e))?;
    let _ = io::copy(content, &mut file).map_err(|e| extract_err(target, e))?;
    // The umask narrowed the creation mode.
    file.set_permissions(Permissions::from_mode(mode))
        .map_err(|e| extract_err(target, e))
}

fn create_symlink(link_name: &Path, target: &Path) -> Result<()> {
    prepare_link_target(target)?;
    std::os::unix::fs::symlink(link_name, target).map_err(|e| extract_err(target, e))
}

fn create_hard_link(original: &Path, target: &Path) -> Result<()> {
    prepare_link_target(target)?;
    fs::hard_link(original, target).map_err(|e| extract_err(target, e))
}

fn prepare_link_target(target: &Path) -> Result<()> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|e| extract_err(parent, e))?;
    }
    remove_non_directory(target)
}

/// Removes a file or symlink at `path` so a later entry can take its place.
fn remove_non_directory(path: &Path) -> Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if !meta.is_dir() => fs::remove_file(path).map_err(|e| extract_err(path, e)),
        _ => Ok(()),
    }
}
