//! Terminal output for batch summaries

use colored::*;

use crate::pipeline::{BatchSummary, FieldReport, FieldStatus};

pub fn print_summary(summary: &BatchSummary) {
  println!("{}", "NDVI update summary".bold());
  println!("  {:<10} {}", "processed", summary.processed);
  println!("  {:<10} {}", "inserted".green(), summary.inserted);
  println!("  {:<10} {}", "skipped".yellow(), summary.skipped);
  println!("  {:<10} {}", "failed".red(), summary.failed);

  let notable: Vec<&FieldReport> = summary
    .details
    .iter()
    .filter(|report| report.status != FieldStatus::Inserted || report.warning.is_some())
    .collect();
  if notable.is_empty() {
    return;
  }

  println!();
  for report in notable {
    println!("  {}", report_line(report));
  }
}

/// One line per field: status, id, reason and any message
pub fn report_line(report: &FieldReport) -> String {
  let status = match report.status {
    FieldStatus::Inserted => "inserted".green(),
    FieldStatus::Skipped => "skipped".yellow(),
    FieldStatus::Failed => "failed".red(),
  };

  let mut line = format!("{status} {}", report.field_id.bold());
  if let Some(reason) = &report.reason {
    line.push_str(&format!(" [{reason}]"));
  }
  if let Some(error) = &report.error {
    line.push_str(&format!(": {error}"));
  }
  if let Some(warning) = &report.warning {
    line.push_str(&format!(" ({})", warning.yellow()));
  }
  line
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_report_line_includes_reason_and_error() {
    let report = FieldReport {
      field_id: "f1".to_string(),
      status: FieldStatus::Failed,
      reason: Some("FETCH_ERROR".to_string()),
      error: Some("upstream returned 502".to_string()),
      warning: None,
    };

    let line = report_line(&report);
    assert!(line.contains("f1"));
    assert!(line.contains("[FETCH_ERROR]"));
    assert!(line.contains("upstream returned 502"));
  }
}
