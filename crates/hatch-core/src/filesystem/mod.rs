//! Filesystem root switching for process isolation.
//!
//! Provides the `chroot(2)` commit point for the calling process, the
//! equivalent pre-exec hook for a spawned child, and staging of host
//! helper binaries into the new root.

pub mod chroot;
pub mod helpers;
