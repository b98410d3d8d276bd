//! Spawning the isolated command and mapping its exit status.

use std::os::unix::process::ExitStatusExt;
use std::process::{Command, ExitStatus};

use hatch_common::constants::PIPELINE_FAILURE_EXIT_CODE;
use hatch_common::error::{HatchError, Result};

/// Offset added to a terminating signal number, as shells report it.
const SIGNAL_EXIT_BASE: i32 = 128;

/// Spawns `command` with inherited stdio and waits for it.
///
/// Returns the exit code the launcher should propagate.
///
/// # Errors
///
/// Returns [`HatchError::Launch`] if the command cannot be spawned or if
/// waiting on it fails. A pre-exec hook failing in the child, such as the
/// root change of a spawned-child isolation, surfaces here as a failed
/// spawn.
pub fn run(command: &mut Command) -> Result<i32> {
    let program = command.get_program().to_string_lossy().into_owned();
    let launch_err = |source| HatchError::Launch {
        command: program.clone(),
        source,
    };

    let mut child = command.spawn().map_err(launch_err)?;
    tracing::info!(pid = child.id(), command = %program, "command started");

    let status = child.wait().map_err(launch_err)?;
    let code = exit_code(status);
    tracing::info!(command = %program, code, "command exited");
    Ok(code)
}

/// Maps a wait status to a process exit code.
///
/// A normal exit keeps its code, a signal `n` becomes `128 + n`, and
/// anything else is reported as a pipeline failure.
#[must_use]
pub fn exit_code(status: ExitStatus) -> i32 {
    status
        .code()
        .or_else(|| status.signal().map(|signal| SIGNAL_EXIT_BASE + signal))
        .unwrap_or(PIPELINE_FAILURE_EXIT_CODE)
}
