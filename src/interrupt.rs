//! Ctrl-C handling.
//!
//! The handler only records the request. The foreground child gets the same
//! SIGINT and exits non-zero, so the running step fails, the guards on the
//! stack unwind normally, and the runner refuses to start another step.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

static FLAG: OnceLock<Arc<AtomicBool>> = OnceLock::new();

/// Process exit code for an interrupted command (128 + SIGINT).
pub const EXIT_INTERRUPTED: u8 = 130;

/// The process-wide interrupt flag.
pub fn flag() -> Arc<AtomicBool> {
    FLAG.get_or_init(|| Arc::new(AtomicBool::new(false))).clone()
}

/// Install the Ctrl-C handler. Safe to call more than once.
pub fn install() -> anyhow::Result<()> {
    static INSTALLED: OnceLock<()> = OnceLock::new();
    if INSTALLED.get().is_some() {
        return Ok(());
    }

    let flag = flag();
    ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
        eprintln!("\nInterrupt received, cleaning up...");
    })?;
    let _ = INSTALLED.set(());
    Ok(())
}

/// Whether an interrupt has been requested.
pub fn requested() -> bool {
    flag().load(Ordering::SeqCst)
}

/// Process exit code for a command that finished with `ok`. An interrupt
/// wins over either outcome.
pub fn exit_code(ok: bool, interrupted: bool) -> u8 {
    match (interrupted, ok) {
        (true, _) => EXIT_INTERRUPTED,
        (false, true) => 0,
        (false, false) => 1,
    }
}
