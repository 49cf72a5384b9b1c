//! Best-effort teardown policy.
//!
//! Every release path (unmount, unbind, detach, file restore) goes through
//! [`best_effort`]: try the action, log a warning on failure, carry on.
//! Teardown must never turn a successful build into a failed one, and a
//! failing teardown step must not stop the ones after it.

use std::fmt::Display;

/// Run `action`, logging and swallowing any error. Returns whether it
/// succeeded so callers can make ordering decisions (never detach while
/// something is still mounted).
pub fn best_effort<T, E, F>(what: &str, action: F) -> bool
where
    F: FnOnce() -> Result<T, E>,
    E: Display,
{
    match action() {
        Ok(_) => true,
        Err(e) => {
            tracing::warn!("{what} failed: {e:#}");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_is_reported() {
        assert!(best_effort("noop", || Ok::<_, anyhow::Error>(())));
    }

    #[test]
    fn test_failure_is_swallowed() {
        let failed = best_effort("unbind", || Err::<(), _>(anyhow::anyhow!("device busy")));
        assert!(!failed);
    }

    #[test]
    fn test_failures_do_not_stop_later_attempts() {
        let mut attempts = Vec::new();
        for target in ["run", "dev", "sys", "proc"] {
            best_effort(target, || {
                attempts.push(target);
                if target == "dev" {
                    Err(anyhow::anyhow!("target is busy"))
                } else {
                    Ok(())
                }
            });
        }
        assert_eq!(attempts, ["run", "dev", "sys", "proc"]);
    }
}
