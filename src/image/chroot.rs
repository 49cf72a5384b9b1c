//! Change-Root Bind-Mount Manager.
//!
//! Package managers and user tools run inside the image need the host's
//! `/proc`, `/sys`, `/dev` and `/run`. The recursive binds are marked
//! rslave so that mounts made inside the change-root never propagate back
//! to the host namespace.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::cleanup::best_effort;
use crate::error::BindMountError;
use crate::process::{Cmd, CommandResult, Host};

/// One kernel interface bound into the change-root.
#[derive(Debug, Clone, Copy)]
pub struct KernelBind {
    pub name: &'static str,
    /// Host source for recursive binds; `None` mounts a fresh procfs.
    pub source: Option<&'static str>,
}

/// Binds in the order they are set up. Torn down in reverse.
pub const KERNEL_BINDS: [KernelBind; 4] = [
    KernelBind {
        name: "proc",
        source: None,
    },
    KernelBind {
        name: "sys",
        source: Some("/sys"),
    },
    KernelBind {
        name: "dev",
        source: Some("/dev"),
    },
    KernelBind {
        name: "run",
        source: Some("/run"),
    },
];

/// Active kernel-interface binds inside a mounted root.
///
/// Borrows the mounted image, so the root cannot be unmounted while the
/// binds exist. Dropping it unbinds everything in reverse order.
pub struct ChrootGuard<'a> {
    host: &'a dyn Host,
    root: PathBuf,
    bound: Vec<PathBuf>,
}

impl<'a> ChrootGuard<'a> {
    /// Bind all [`KERNEL_BINDS`] under `root`. A failure unbinds whatever
    /// was already bound before returning.
    pub fn bind(host: &'a dyn Host, root: &Path) -> Result<Self, BindMountError> {
        let mut guard = Self {
            host,
            root: root.to_path_buf(),
            bound: Vec::with_capacity(KERNEL_BINDS.len()),
        };
        for bind in KERNEL_BINDS {
            // On error `guard` drops and unwinds the earlier binds.
            guard.bind_one(bind)?;
        }
        Ok(guard)
    }

    fn bind_one(&mut self, bind: KernelBind) -> Result<(), BindMountError> {
        let target = self.root.join(bind.name);
        fs::create_dir_all(&target).map_err(|source| BindMountError::CreateTarget {
            target: target.clone(),
            source,
        })?;

        let cmd = match bind.source {
            None => Cmd::new("mount").args(["-t", "proc", "proc"]),
            Some(source) => Cmd::new("mount").args(["--rbind", source]),
        };
        cmd.arg_path(&target)
            .run_on(self.host)
            .map_err(|e| BindMountError::Bind {
                name: bind.name,
                target: target.clone(),
                detail: format!("{e:#}"),
            })?;
        self.bound.push(target.clone());

        if bind.source.is_some() {
            Cmd::new("mount")
                .arg("--make-rslave")
                .arg_path(&target)
                .run_on(self.host)
                .map_err(|e| BindMountError::MakeSlave {
                    target: target.clone(),
                    detail: format!("{e:#}"),
                })?;
        }

        tracing::debug!(target = %target.display(), "bound {}", bind.name);
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Paths currently bound, in bind order.
    pub fn bound(&self) -> &[PathBuf] {
        &self.bound
    }

    /// A command that runs `program` with the image as `/`.
    pub fn command(&self, program: &str) -> Cmd {
        Cmd::new("chroot").arg_path(&self.root).arg(program)
    }

    /// Run `program args...` inside the change-root, output streamed.
    pub fn run<I, S>(&self, program: &str, args: I) -> Result<CommandResult>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.command(program)
            .args(args)
            .streaming()
            .error_msg(format!("chroot {program} failed"))
            .run_on(self.host)
    }

    /// Run a prepared change-root command.
    pub fn exec(&self, cmd: Cmd) -> Result<CommandResult> {
        cmd.run_on(self.host)
    }

    /// Unbind in reverse order. Each unbind is attempted regardless of the
    /// others; failures are logged. Calling it again is a no-op.
    pub fn unbind(&mut self) {
        while let Some(target) = self.bound.pop() {
            best_effort(&format!("unbind {}", target.display()), || {
                Cmd::new("umount")
                    .arg("-R")
                    .arg_path(&target)
                    .run_on(self.host)
            });
        }
    }
}

impl Drop for ChrootGuard<'_> {
    fn drop(&mut self) {
        self.unbind();
    }
}
