//! Lemon Pi library.
//!
//! Attaches a Raspberry Pi OS image, mounts its partitions, and runs the
//! customization steps against the mounted tree. The binary in `main.rs` is
//! a thin clap front end over [`commands`].

pub mod cleanup;
pub mod commands;
pub mod config;
pub mod error;
pub mod finalize;
pub mod image;
pub mod interrupt;
pub mod pipeline;
pub mod preflight;
pub mod process;
pub mod steps;
pub mod timing;
pub mod validate;

#[cfg(any(test, feature = "testing"))]
#[doc(hidden)]
pub mod testing;
