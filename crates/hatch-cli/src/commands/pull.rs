//! `hatch pull`: assemble an image rootfs without running anything.

use clap::Args;
use hatch_common::config::HatchConfig;
use hatch_runtime::Launcher;

/// Arguments for the `pull` command.
#[derive(Args, Debug)]
pub struct PullArgs {
    /// Image reference, `name[:tag]`.
    pub image: String,
}

/// Executes the `pull` command and prints the rootfs path.
///
/// # Errors
///
/// Returns an error if any pull step fails.
#[allow(clippy::print_stdout)]
pub fn execute(args: &PullArgs, config: HatchConfig) -> anyhow::Result<i32> {
    let rootfs = Launcher::new(config).pull(&args.image)?;
    println!("{}", rootfs.display());
    Ok(0)
}
