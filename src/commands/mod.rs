//! CLI command handlers.
//!
//! Each submodule handles a specific CLI command:
//! - `build` - Customize a copy of the base image
//! - `mount` - Mount an image for inspection (and `unmount` to release it)
//! - `expand` - Grow an image's root partition and filesystem
//! - `validate` - Check a built image read-only
//! - `preflight` - Run preflight checks
//! - `steps` - List the customization pipeline
//! - `show` - Display information

pub mod build;
mod expand;
mod mount;
mod preflight;
pub mod show;
mod steps;
mod validate;

pub use build::{cmd_build, BuildOptions, BuildStatus};
pub use expand::cmd_expand;
pub use mount::{cmd_mount, cmd_unmount};
pub use preflight::cmd_preflight;
pub use show::cmd_show;
pub use steps::cmd_steps;
pub use validate::cmd_validate;
