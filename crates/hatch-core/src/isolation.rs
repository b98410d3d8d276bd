//! Placing the target command inside the assembled rootfs.
//!
//! [`IsolationStrategy::SpawnedChild`] is preferred: the parent creates a
//! PID namespace for its next child and attaches a pre-exec hook that
//! changes the child's root, so only the child sees the rootfs.
//! [`IsolationStrategy::InProcess`] changes the root of the calling process
//! itself and is meant for launchers that exec the target right after.
//!
//! In both cases a failed root change is fatal: the command never runs
//! against the host filesystem.

use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::Command;

use hatch_common::config::IsolationStrategy;
use hatch_common::error::{HatchError, Result};

use crate::filesystem::{chroot, helpers};
use crate::namespace::pid;

/// Prepares a command to run inside a rootfs.
#[derive(Debug, Clone)]
pub struct ProcessIsolator {
    rootfs: PathBuf,
    strategy: IsolationStrategy,
    helper_binaries: Vec<PathBuf>,
}

impl ProcessIsolator {
    /// Creates an isolator for `rootfs` using the spawned-child strategy.
    #[must_use]
    pub fn new(rootfs: impl Into<PathBuf>) -> Self {
        Self {
            rootfs: rootfs.into(),
            strategy: IsolationStrategy::SpawnedChild,
            helper_binaries: Vec::new(),
        }
    }

    /// Selects the isolation strategy.
    #[must_use]
    pub const fn with_strategy(mut self, strategy: IsolationStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Host binaries to stage into the rootfs before the root change.
    #[must_use]
    pub fn with_helper_binaries(mut self, helpers: Vec<PathBuf>) -> Self {
        self.helper_binaries = helpers;
        self
    }

    /// Root the command will see as `/`.
    #[must_use]
    pub fn rootfs(&self) -> &Path {
        &self.rootfs
    }

    /// Selected strategy.
    #[must_use]
    pub const fn strategy(&self) -> IsolationStrategy {
        self.strategy
    }

    /// Isolates `command`, which must be spawned right after this returns.
    ///
    /// With [`IsolationStrategy::InProcess`] the calling process's root has
    /// changed when this returns `Ok`, and it cannot be called again.
    ///
    /// With [`IsolationStrategy::SpawnedChild`] the root change happens in
    /// the child between fork and exec. If it fails there, the spawn itself
    /// fails and the caller sees a launch error rather than
    /// [`HatchError::Isolation`]; the command never runs on the host root.
    ///
    /// # Errors
    ///
    /// Returns [`HatchError::Isolation`] if the rootfs is not a directory,
    /// a helper cannot be staged, or the namespace or root change fails.
    #[allow(unsafe_code)]
    pub fn enter(&self, command: &mut Command) -> Result<()> {
        self.check_rootfs()?;
        helpers::stage_helpers(&self.rootfs, &self.helper_binaries)?;

        tracing::info!(
            rootfs = %self.rootfs.display(),
            strategy = %self.strategy,
            "entering isolation"
        );
        match self.strategy {
            IsolationStrategy::SpawnedChild => {
                pid::create_pid_namespace()?;
                let hook = chroot::child_root_hook(&self.rootfs)?;
                // SAFETY: the hook only calls chroot(2) and chdir(2), both
                // async-signal-safe, and allocates nothing after fork.
                unsafe {
                    let _ = command.pre_exec(hook);
                }
            }
            IsolationStrategy::InProcess => {
                chroot::commit_root(&self.rootfs)?;
                pid::create_pid_namespace()?;
            }
        }
        Ok(())
    }

    fn check_rootfs(&self) -> Result<()> {
        match std::fs::metadata(&self.rootfs) {
            Ok(meta) if meta.is_dir() => Ok(()),
            Ok(_) => Err(HatchError::Isolation {
                message: format!("rootfs {} is not a directory", self.rootfs.display()),
            }),
            Err(e) => Err(HatchError::Isolation {
                message: format!("rootfs {} is not accessible: {e}", self.rootfs.display()),
            }),
        }
    }
}
