//! Step definitions and outcome normalization.

use std::collections::BTreeMap;

use anyhow::Result;

use super::context::StepContext;

/// What a step reports back.
///
/// Steps may return `bool`, `()` or a full `StepOutcome`; all of them
/// normalize through `Into<StepOutcome>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// Completed, optionally with data for later stages (e.g. `version`).
    Success(BTreeMap<String, String>),
    Failure(String),
}

impl StepOutcome {
    pub fn success() -> Self {
        Self::Success(BTreeMap::new())
    }

    /// Success carrying one metadata entry.
    pub fn with(key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut metadata = BTreeMap::new();
        metadata.insert(key.into(), value.into());
        Self::Success(metadata)
    }

    pub fn failure(reason: impl Into<String>) -> Self {
        Self::Failure(reason.into())
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

impl From<bool> for StepOutcome {
    fn from(ok: bool) -> Self {
        if ok {
            Self::success()
        } else {
            Self::failure("step reported failure")
        }
    }
}

impl From<()> for StepOutcome {
    fn from(_: ()) -> Self {
        Self::success()
    }
}

type StepFn = Box<dyn Fn(&StepContext<'_>) -> Result<StepOutcome>>;

/// A named customization step.
pub struct Step {
    name: String,
    run: StepFn,
}

impl Step {
    pub fn new<F, R>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&StepContext<'_>) -> Result<R> + 'static,
        R: Into<StepOutcome>,
    {
        Self {
            name: name.into(),
            run: Box::new(move |ctx: &StepContext<'_>| f(ctx).map(Into::into)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn run(&self, ctx: &StepContext<'_>) -> Result<StepOutcome> {
        (self.run)(ctx)
    }
}

impl std::fmt::Debug for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Step").field("name", &self.name).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bool_normalization() {
        assert_eq!(StepOutcome::from(true), StepOutcome::success());
        assert!(!StepOutcome::from(false).is_success());
    }

    #[test]
    fn test_with_metadata() {
        let StepOutcome::Success(metadata) = StepOutcome::with("version", "1.4.0") else {
            panic!("expected success");
        };
        assert_eq!(metadata.get("version").map(String::as_str), Some("1.4.0"));
    }
}
