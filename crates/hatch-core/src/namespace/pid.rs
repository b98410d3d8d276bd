//! PID namespace isolation.
//!
//! `unshare(CLONE_NEWPID)` does not move the caller. It places the
//! caller's *next* child into a fresh PID namespace, where that child is
//! PID 1. The caller's own view of the filesystem is unaffected.

use hatch_common::error::{HatchError, Result};

/// Creates a new PID namespace for the children of the calling process.
///
/// After a successful call, the next `fork(2)` child will see
/// itself as PID 1 inside the new namespace.
///
/// # Errors
///
/// Returns [`HatchError::Isolation`] if the `unshare(CLONE_NEWPID)`
/// syscall fails (typically `EPERM` without `CAP_SYS_ADMIN`).
#[cfg(target_os = "linux")]
pub fn create_pid_namespace() -> Result<()> {
    use nix::sched::{CloneFlags, unshare};

    unshare(CloneFlags::CLONE_NEWPID).map_err(|e| HatchError::Isolation {
        message: format!("PID namespace creation failed: {e}"),
    })?;
    tracing::debug!("PID namespace created");
    Ok(())
}

/// Stub for non-Linux platforms.
///
/// # Errors
///
/// Always returns an error: PID namespaces require Linux.
#[cfg(not(target_os = "linux"))]
pub fn create_pid_namespace() -> Result<()> {
    Err(HatchError::Isolation {
        message: "PID namespaces require Linux".into(),
    })
}
