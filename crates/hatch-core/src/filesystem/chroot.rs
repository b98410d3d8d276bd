//! Root filesystem switching via `chroot(2)`.
//!
//! Two entry points exist. [`commit_root`] changes the root of the calling
//! process and can never be undone; it is guarded so it runs at most once
//! per process. [`child_root_hook`] builds a closure for
//! [`std::os::unix::process::CommandExt::pre_exec`] that performs the same
//! change inside a forked child, leaving the parent untouched.

use std::ffi::CString;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use hatch_common::error::{HatchError, Result};

static ROOT_COMMITTED: AtomicBool = AtomicBool::new(false);

/// Whether [`commit_root`] has already succeeded in this process.
pub fn root_committed() -> bool {
    ROOT_COMMITTED.load(Ordering::SeqCst)
}

/// Changes the calling process's root to `new_root` and its working
/// directory to the new `/`.
///
/// Not reentrant: every later path lookup of the process, including
/// relative ones, resolves inside `new_root`. Call it only right before
/// launching the target command.
///
/// # Errors
///
/// Returns [`HatchError::Isolation`] if the root was already changed or
/// if `chroot(2)` or `chdir(2)` fails. A failed `chroot` leaves the
/// process unchanged and releases the guard.
pub fn commit_root(new_root: &Path) -> Result<()> {
    if ROOT_COMMITTED
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        return Err(HatchError::Isolation {
            message: "process root has already been changed".into(),
        });
    }

    if let Err(e) = nix::unistd::chroot(new_root) {
        ROOT_COMMITTED.store(false, Ordering::SeqCst);
        return Err(HatchError::Isolation {
            message: format!("chroot to {} failed: {e}", new_root.display()),
        });
    }
    // Past this point the root has changed; the guard stays set.
    nix::unistd::chdir("/").map_err(|e| HatchError::Isolation {
        message: format!("chdir to new root failed: {e}"),
    })?;

    tracing::info!(root = %new_root.display(), "process root changed");
    Ok(())
}

/// Builds a pre-exec closure that moves a forked child into `new_root`.
///
/// The path is converted before the fork so the closure itself does not
/// allocate.
///
/// # Errors
///
/// Returns [`HatchError::Isolation`] if the path contains a NUL byte.
pub fn child_root_hook(
    new_root: &Path,
) -> Result<impl FnMut() -> io::Result<()> + Send + Sync + 'static> {
    let root = CString::new(new_root.as_os_str().as_bytes()).map_err(|e| {
        HatchError::Isolation {
            message: format!("invalid rootfs path {}: {e}", new_root.display()),
        }
    })?;

    Ok(move || {
        // SAFETY: `root` is a valid NUL-terminated string owned by the
        // closure. chroot(2) and chdir(2) are async-signal-safe, so they may
        // run between fork and exec.
        #[allow(unsafe_code)]
        let rc = unsafe { libc::chroot(root.as_ptr()) };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: as above; the literal is NUL-terminated.
        #[allow(unsafe_code)]
        let rc = unsafe { libc::chdir(c"/".as_ptr()) };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    })
}
