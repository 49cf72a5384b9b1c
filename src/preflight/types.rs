//! Check result types and report, shared by preflight and image validation.

use std::fmt::Write;

/// Result of a single check.
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    pub details: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    /// Check passed.
    Pass,
    /// Check failed - the operation will fail.
    Fail,
    /// Check passed but with a warning.
    Warn,
    /// Check skipped (not applicable).
    Skip,
}

impl CheckStatus {
    fn icon(self) -> &'static str {
        match self {
            CheckStatus::Pass => "✓",
            CheckStatus::Fail => "✗",
            CheckStatus::Warn => "⚠",
            CheckStatus::Skip => "○",
        }
    }

    fn label(self) -> &'static str {
        match self {
            CheckStatus::Pass => "PASS",
            CheckStatus::Fail => "FAIL",
            CheckStatus::Warn => "WARN",
            CheckStatus::Skip => "SKIP",
        }
    }
}

impl CheckResult {
    pub fn pass(name: &str) -> Self {
        Self::new(name, CheckStatus::Pass, None)
    }

    pub fn pass_with(name: &str, details: &str) -> Self {
        Self::new(name, CheckStatus::Pass, Some(details))
    }

    pub fn fail(name: &str, details: &str) -> Self {
        Self::new(name, CheckStatus::Fail, Some(details))
    }

    pub fn warn(name: &str, details: &str) -> Self {
        Self::new(name, CheckStatus::Warn, Some(details))
    }

    pub fn skip(name: &str, details: &str) -> Self {
        Self::new(name, CheckStatus::Skip, Some(details))
    }

    /// Pass or fail on `ok`, with `details` shown when it fails.
    pub fn check(name: &str, ok: bool, details: &str) -> Self {
        if ok {
            Self::pass(name)
        } else {
            Self::fail(name, details)
        }
    }

    fn new(name: &str, status: CheckStatus, details: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            status,
            details: details.map(String::from),
        }
    }
}

/// Results of a group of checks.
pub struct CheckReport {
    pub title: String,
    pub checks: Vec<CheckResult>,
}

/// Host readiness report.
pub type PreflightReport = CheckReport;

impl CheckReport {
    pub fn new(title: impl Into<String>, checks: Vec<CheckResult>) -> Self {
        Self {
            title: title.into(),
            checks,
        }
    }

    /// Returns true if no check failed.
    pub fn all_passed(&self) -> bool {
        self.fail_count() == 0
    }

    pub fn fail_count(&self) -> usize {
        self.count(CheckStatus::Fail)
    }

    pub fn warn_count(&self) -> usize {
        self.count(CheckStatus::Warn)
    }

    fn count(&self, status: CheckStatus) -> usize {
        self.checks.iter().filter(|c| c.status == status).count()
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "=== {} ===\n", self.title);

        for check in &self.checks {
            let _ = write!(
                out,
                "  {} [{}] {}",
                check.status.icon(),
                check.status.label(),
                check.name
            );
            match &check.details {
                Some(details) => {
                    let _ = writeln!(out, ": {details}");
                }
                None => out.push('\n'),
            }
        }

        let passed = self.count(CheckStatus::Pass);
        let _ = writeln!(out, "\nSummary: {}/{} passed", passed, self.checks.len());
        if self.fail_count() > 0 {
            let _ = writeln!(out, "         {} FAILED", self.fail_count());
        }
        if self.warn_count() > 0 {
            let _ = writeln!(out, "         {} warnings", self.warn_count());
        }
        out
    }

    /// Print the report to stdout.
    pub fn print(&self) {
        print!("{}", self.render());
    }
}
