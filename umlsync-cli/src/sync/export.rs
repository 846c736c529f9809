//! CSV export of reconciliation reports

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use csv::Writer;

use super::report::ReconciliationReport;

const HEADER: [&str; 9] = [
    "Kind",
    "Action",
    "Id",
    "GUID",
    "Name",
    "Changed Fields",
    "Tag Writes",
    "Version",
    "Detail",
];

/// Write one row per report entry
pub fn write_report_csv<W: Write>(report: &ReconciliationReport, writer: W) -> Result<()> {
    let mut wtr = Writer::from_writer(writer);

    wtr.write_record(HEADER).context("Failed to write CSV header")?;

    for entry in &report.entries {
        let changed = entry.changed_fields.join(";");
        let tag_writes = entry.tag_writes.to_string();
        wtr.write_record([
            entry.kind.label(),
            entry.action.as_str(),
            entry.id.as_deref().unwrap_or(""),
            entry.guid.as_deref().unwrap_or(""),
            entry.name.as_deref().unwrap_or(""),
            changed.as_str(),
            tag_writes.as_str(),
            entry.version.as_deref().unwrap_or(""),
            entry.detail.as_deref().unwrap_or(""),
        ])
        .with_context(|| format!("Failed to write report row for {:?}", entry.guid))?;
    }

    if let Some(failure) = &report.failure {
        wtr.write_record([failure.kind.label(), "failed", "", "", "", "", "", "", failure.message.as_str()])
            .context("Failed to write batch failure row")?;
    }

    wtr.flush().context("Failed to flush CSV writer")?;
    Ok(())
}

/// Export a report to a CSV file
pub fn export_report_csv(report: &ReconciliationReport, file_path: &Path) -> Result<()> {
    let file = std::fs::File::create(file_path)
        .with_context(|| format!("Failed to create CSV file: {}", file_path.display()))?;
    write_report_csv(report, file)?;

    log::info!("Reconciliation report exported to: {}", file_path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EntityKind;
    use crate::sync::report::{Action, BatchFailure, ReportEntry};
    use crate::sync::ReconcileOptions;

    #[test]
    fn test_csv_rows() {
        let mut report = ReconciliationReport::new(chrono::Utc::now(), ReconcileOptions::default());
        let mut entry = ReportEntry::new(EntityKind::Class, Action::Updated)
            .id("EAID_1")
            .name(Some("Person"));
        entry.changed_fields = vec!["Name".into(), "Alias".into()];
        entry.tag_writes = 2;
        report.push(entry);
        report.failure = Some(BatchFailure {
            kind: EntityKind::Attribute,
            message: "disk full".into(),
        });

        let mut buf = Vec::new();
        write_report_csv(&report, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("Kind,Action,Id"));
        assert_eq!(lines[1], "Class,updated,EAID_1,,Person,Name;Alias,2,,");
        assert!(lines[2].ends_with("disk full"));
    }
}
