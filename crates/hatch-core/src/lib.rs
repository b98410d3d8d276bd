//! # hatch-core
//!
//! Low-level isolation primitives for launching a command inside an
//! assembled rootfs.
//!
//! This crate provides safe abstractions over:
//! - **Filesystem**: `chroot(2)` as a one-way commit point or as a
//!   pre-exec hook for a spawned child, plus helper-binary staging.
//! - **Namespaces**: PID namespace creation.
//! - **Isolation**: [`isolation::ProcessIsolator`], which applies one of
//!   the two strategies to a [`std::process::Command`].
//!
//! All unsafe system calls are encapsulated in safe wrappers with
//! proper error handling and `// SAFETY:` documentation.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod filesystem;
pub mod isolation;
pub mod namespace;

pub use isolation::ProcessIsolator;
