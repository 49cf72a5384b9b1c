//! Image subsystem: attach, mount, change-root binds and expansion.
//!
//! Acquisition order is attach, mount, bind; release runs in reverse and
//! is driven by guards so that every exit path unwinds.

pub mod attach;
pub mod chroot;
pub mod expand;
pub mod mount;

pub use attach::{AttachedPartitionSet, Attachment, DeviceAttacher};
pub use chroot::ChrootGuard;
pub use expand::{expand, ExpandResult};
pub use mount::{release_by_path, MountSet, MountedImage};
