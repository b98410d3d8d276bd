//! Staging of host helper binaries into a new root.
//!
//! Anything the isolated process needs from the host must be inside the
//! root before it changes. Helpers are hard-linked to the same absolute
//! path under the rootfs, or copied when the rootfs lives on another
//! filesystem.

use std::fs;
use std::path::{Path, PathBuf};

use hatch_common::error::{HatchError, Result};

/// Places every helper at `rootfs/<helper path>`.
///
/// An existing file at the destination is replaced.
///
/// # Errors
///
/// Returns [`HatchError::Config`] for a relative helper path and
/// [`HatchError::Isolation`] if a helper cannot be linked or copied.
pub fn stage_helpers(rootfs: &Path, helpers: &[PathBuf]) -> Result<()> {
    for helper in helpers {
        let relative = helper.strip_prefix("/").map_err(|_| HatchError::Config {
            message: format!("helper binary path must be absolute: {}", helper.display()),
        })?;
        let destination = rootfs.join(relative);
        stage_one(helper, &destination)?;
        tracing::debug!(
            helper = %helper.display(),
            destination = %destination.display(),
            "staged helper binary"
        );
    }
    Ok(())
}

fn stage_one(source: &Path, destination: &Path) -> Result<()> {
    let isolation_err = |action: &str, e: std::io::Error| HatchError::Isolation {
        message: format!(
            "failed to {action} helper {} into {}: {e}",
            source.display(),
            destination.display()
        ),
    };

    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent).map_err(|e| isolation_err("prepare", e))?;
    }
    if fs::symlink_metadata(destination).is_ok() {
        fs::remove_file(destination).map_err(|e| isolation_err("replace", e))?;
    }

    match fs::hard_link(source, destination) {
        Ok(()) => Ok(()),
        Err(e) if e.raw_os_error() == Some(libc::EXDEV) => {
            let _ = fs::copy(source, destination).map_err(|e| isolation_err("copy", e))?;
            Ok(())
        }
        Err(e) => Err(isolation_err("link", e)),
    }
}
