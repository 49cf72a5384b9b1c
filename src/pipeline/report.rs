//! Build summary table.

use std::fmt::Write;
use std::time::Duration;

use crate::timing::format_elapsed;

const MIN_NAME_WIDTH: usize = 20;
const STATUS_WIDTH: usize = 10;
const TIME_WIDTH: usize = 15;
const RULE_WIDTH: usize = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowStatus {
    Success,
    Failed,
    /// Did not complete but did not fail the build (expansion).
    Warning,
}

impl RowStatus {
    pub fn label(self) -> &'static str {
        match self {
            Self::Success => "✓ SUCCESS",
            Self::Failed => "✗ FAILED",
            Self::Warning => "⚠ WARNING",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SummaryRow {
    pub name: String,
    pub status: RowStatus,
    pub elapsed: Duration,
}

impl SummaryRow {
    pub fn new(name: impl Into<String>, status: RowStatus, elapsed: Duration) -> Self {
        Self {
            name: name.into(),
            status,
            elapsed,
        }
    }
}

/// Sum of the rows' elapsed times.
pub fn total_elapsed(rows: &[SummaryRow]) -> Duration {
    rows.iter().map(|r| r.elapsed).sum()
}

/// Render the summary table. Empty when there is nothing to report.
pub fn render_summary(rows: &[SummaryRow]) -> String {
    if rows.is_empty() {
        return String::new();
    }

    let width = rows
        .iter()
        .map(|r| r.name.chars().count())
        .max()
        .unwrap_or(0)
        .max(MIN_NAME_WIDTH);
    let heavy = "=".repeat(RULE_WIDTH);
    let rule = format!(
        "{}  {}  {}",
        "-".repeat(width),
        "-".repeat(STATUS_WIDTH),
        "-".repeat(TIME_WIDTH)
    );

    let mut out = String::new();
    let _ = writeln!(out, "{heavy}\nBUILD SUMMARY\n{heavy}\n");
    let _ = writeln!(out, "{:<width$}  {:<STATUS_WIDTH$}  Time", "Step", "Status");
    let _ = writeln!(out, "{rule}");
    for row in rows {
        let _ = writeln!(
            out,
            "{:<width$}  {:<STATUS_WIDTH$}  {}",
            row.name,
            row.status.label(),
            format_elapsed(row.elapsed)
        );
    }
    let _ = writeln!(out, "{rule}");
    let _ = writeln!(
        out,
        "{:<width$}  {:<STATUS_WIDTH$}  {}",
        "Total",
        "",
        format_elapsed(total_elapsed(rows))
    );
    let _ = writeln!(out, "{heavy}");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows() -> Vec<SummaryRow> {
        vec![
            SummaryRow::new("Expand image", RowStatus::Warning, Duration::from_millis(1_500)),
            SummaryRow::new("Configure hostname", RowStatus::Success, Duration::from_millis(200)),
            SummaryRow::new("Update packages", RowStatus::Failed, Duration::from_secs(61)),
        ]
    }

    #[test]
    fn test_total_is_sum_of_rows() {
        assert_eq!(total_elapsed(&rows()), Duration::from_millis(62_700));
        let table = render_summary(&rows());
        assert!(table.contains("Total"));
        assert!(table.contains("1m 2s"));
    }

    #[test]
    fn test_statuses_rendered() {
        let table = render_summary(&rows());
        assert!(table.contains("⚠ WARNING"));
        assert!(table.contains("✓ SUCCESS"));
        assert!(table.contains("✗ FAILED"));
        assert!(table.contains("1m 1s"));
        assert!(table.contains("0.2s"));
    }

    #[test]
    fn test_name_column_minimum_width() {
        let table = render_summary(&[SummaryRow::new("Short", RowStatus::Success, Duration::ZERO)]);
        let header = table.lines().find(|l| l.starts_with("Step")).unwrap();
        assert!(header.starts_with(&format!("{:<22}Status", "Step")));
    }

    #[test]
    fn test_name_column_grows_with_long_names() {
        let long = "Install application and configure service";
        let table = render_summary(&[SummaryRow::new(long, RowStatus::Success, Duration::ZERO)]);
        let rule = table.lines().find(|l| l.starts_with('-')).unwrap();
        assert!(rule.starts_with(&format!("{}  ", "-".repeat(long.len()))));
    }

    #[test]
    fn test_empty_renders_nothing() {
        assert!(render_summary(&[]).is_empty());
    }
}
