//! Launch orchestration for the Hatch runtime.
//!
//! [`Launcher`] ties the pipeline together: pull the image into a rootfs,
//! isolate the target command inside it, run it with inherited stdio, and
//! report its exit status.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod launch;
pub mod process;

pub use launch::Launcher;
