//! The pull, isolate, and run sequence behind `hatch run`.

use std::ffi::OsStr;
use std::path::PathBuf;
use std::process::Command;

use hatch_common::config::HatchConfig;
use hatch_common::error::Result;
use hatch_core::ProcessIsolator;
use hatch_image::ImagePuller;

use crate::process;

/// Runs a single command inside a freshly pulled image.
#[derive(Debug, Clone)]
pub struct Launcher {
    config: HatchConfig,
}

impl Launcher {
    /// Creates a launcher from a resolved configuration.
    #[must_use]
    pub const fn new(config: HatchConfig) -> Self {
        Self { config }
    }

    /// Pulls `image` into `<base_dir>/<image>` and returns the rootfs path.
    ///
    /// # Errors
    ///
    /// Returns any error from the pull pipeline.
    pub fn pull(&self, image: &str) -> Result<PathBuf> {
        ImagePuller::from_config(&self.config)?.pull(image, &self.config.base_dir)
    }

    /// Pulls `image`, then runs `command` with `args` isolated inside it.
    ///
    /// Returns the exit code of the command. The rootfs is left on disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the pull fails, isolation cannot be set up, or
    /// the command cannot be spawned. The caller maps these to exit `255`.
    pub fn run<I, S>(&self, image: &str, command: &str, args: I) -> Result<i32>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        tracing::info!(image, command, "launching");
        let rootfs = self.pull(image)?;

        let mut target = Command::new(command);
        let _ = target.args(args);
        ProcessIsolator::new(rootfs)
            .with_strategy(self.config.isolation)
            .with_helper_binaries(self.config.helper_binaries.clone())
            .enter(&mut target)?;

        process::run(&mut target)
    }
}
