//! Report rendering

use std::io::{self, Write};

use kubeinv_collect::{CollectionReport, CollectionStatus, FetchError, RawRecord};

/// Longest raw snippet printed for a skipped record without a name
const SNIPPET_LEN: usize = 60;

/// Print the report for a person.
///
/// The inventory and summary go to `out`; setup problems and data quality
/// warnings go to `diag` and use different wording so they are never confused.
pub fn write_human<W: Write, E: Write>(
    out: &mut W,
    diag: &mut E,
    report: &CollectionReport,
    noun: &str,
) -> io::Result<()> {
    match (&report.status, &report.failure) {
        (CollectionStatus::Cancelled, last) => {
            writeln!(
                diag,
                "Collection cancelled after {} attempt(s).",
                report.attempts
            )?;
            if let Some(err) = last {
                writeln!(diag, "Last error: {}", err)?;
            }
        }
        (_, Some(err @ FetchError::NotAvailable(_))) => {
            writeln!(diag, "Setup problem: {}", err)?;
            writeln!(diag, "No data source is available; nothing was collected.")?;
        }
        (_, Some(err)) => {
            writeln!(
                diag,
                "Error: the cluster query failed after {} attempt(s): {}",
                report.attempts, err
            )?;
        }
        (_, None) => {}
    }

    if !report.groups.is_empty() {
        writeln!(out, "Found the following Kubernetes {}, grouped by namespace:", noun)?;
        for (namespace, records) in report.groups.iter() {
            let width = records
                .iter()
                .map(|r| r.name().chars().count())
                .max()
                .unwrap_or(0);
            writeln!(out)?;
            writeln!(out, "--- Namespace: {} ---", namespace)?;
            for record in records {
                writeln!(out, "  - {:<width$}  {}", record.name(), record.status())?;
            }
        }
    } else if report.failure.is_none() && report.status != CollectionStatus::Cancelled {
        match &report.namespace_filter {
            Some(namespace) => writeln!(out, "No {} found in namespace {}.", noun, namespace)?,
            None => writeln!(out, "No {} found.", noun)?,
        }
    }

    if !report.skipped.is_empty() {
        writeln!(
            diag,
            "Data quality: {} of {} record(s) were unreadable and skipped:",
            report.skipped.len(),
            report.fetched
        )?;
        for skipped in &report.skipped {
            writeln!(diag, "  - {}: {}", label(&skipped.raw), skipped.reason)?;
        }
    }

    writeln!(out)?;
    writeln!(
        out,
        "Summary: {} {} in {} namespace(s), {} skipped, status {}",
        report.record_count(),
        noun,
        report.groups.len(),
        report.skipped.len(),
        report.status
    )
}

/// Print the report as pretty JSON
pub fn write_json<W: Write>(out: &mut W, report: &CollectionReport) -> io::Result<()> {
    serde_json::to_writer_pretty(&mut *out, report)?;
    writeln!(out)
}

/// Something recognisable for a record that failed validation
fn label(raw: &RawRecord) -> String {
    let value = raw.as_value();
    let name = value
        .pointer("/metadata/name")
        .or_else(|| value.get("name"))
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty());
    if let Some(name) = name {
        return name.to_string();
    }

    let compact = value.to_string();
    if compact.chars().count() > SNIPPET_LEN {
        let head: String = compact.chars().take(SNIPPET_LEN).collect();
        format!("{}...", head)
    } else {
        compact
    }
}
