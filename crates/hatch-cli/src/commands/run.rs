//! `hatch run`: pull an image and run a command inside it.

use clap::Args;
use hatch_common::config::HatchConfig;
use hatch_runtime::Launcher;

/// Arguments for the `run` command.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Image reference, `name[:tag]`.
    pub image: String,

    /// Command to execute inside the image.
    pub command: String,

    /// Arguments passed to the command.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,
}

/// Executes the `run` command and returns the target's exit code.
///
/// # Errors
///
/// Returns an error if the pull, isolation, or spawn fails.
pub fn execute(args: RunArgs, config: HatchConfig) -> anyhow::Result<i32> {
    let launcher = Launcher::new(config);
    let code = launcher.run(&args.image, &args.command, &args.args)?;
    Ok(code)
}
