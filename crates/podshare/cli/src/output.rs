//! Output formatting utilities

use colored::*;
use podshare_audit::OutgoingRecord;
use podshare_policy::PermissionSummary;
use podshare_sharing::{Inspection, ShareResult};
use podshare_types::{AuditEntry, Principal};
use serde::Serialize;
use tabled::{Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Pretty-printed table format
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Table row for audit entries
#[derive(Debug, Serialize, Tabled)]
pub struct EntryRow {
    time: String,
    #[tabled(rename = "type")]
    entry_type: String,
    pattern: String,
    granter: String,
    recipient: String,
    permissions: String,
    resource: String,
}

impl From<&AuditEntry> for EntryRow {
    fn from(entry: &AuditEntry) -> Self {
        let mut time = entry.timestamp.format("%Y-%m-%d %H:%M:%S").to_string();
        if entry.timestamp_recovered {
            time.push_str(" (recovered)");
        }
        Self {
            time,
            entry_type: entry.entry_type.to_string(),
            pattern: entry.pattern.to_string(),
            granter: entry.granter.to_string(),
            recipient: entry.recipient.to_string(),
            permissions: entry.permissions.to_string(),
            resource: entry.resource.clone(),
        }
    }
}

#[derive(Debug, Serialize, Tabled)]
pub struct OutgoingRow {
    sent: String,
    #[tabled(rename = "type")]
    entry_type: String,
    resource: String,
    recipient: String,
    inbox: String,
}

impl From<&OutgoingRecord> for OutgoingRow {
    fn from(record: &OutgoingRecord) -> Self {
        Self {
            sent: record.sent_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            entry_type: record.entry_type.to_string(),
            resource: record.resource.clone(),
            recipient: record.recipient.to_string(),
            inbox: record.inbox.clone(),
        }
    }
}

/// One audit replica in a share result
#[derive(Debug, Serialize, Tabled)]
pub struct ReplicaRow {
    log_of: String,
    written: String,
}

impl ReplicaRow {
    fn new(principal: &Principal, written: bool) -> Self {
        Self {
            log_of: principal.to_string(),
            written: if written { "yes" } else { "no" }.to_string(),
        }
    }
}

#[derive(Debug, Serialize, Tabled)]
pub struct SummaryRow {
    read: bool,
    write: bool,
    append: bool,
    control: bool,
    public: bool,
}

impl From<PermissionSummary> for SummaryRow {
    fn from(s: PermissionSummary) -> Self {
        Self {
            read: s.read,
            write: s.write,
            append: s.append,
            control: s.control,
            public: s.public,
        }
    }
}

/// Print a list of rows in the specified format
pub fn print_output<T: Serialize + Tabled>(
    data: Vec<T>,
    format: OutputFormat,
) -> anyhow::Result<()> {
    match format {
        OutputFormat::Table => {
            if data.is_empty() {
                println!("{}", "No results".dimmed());
            } else {
                println!("{}", Table::new(data));
            }
            Ok(())
        }
        OutputFormat::Json => print_json(&data),
    }
}

pub fn print_json<T: Serialize + ?Sized>(data: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(data)?);
    Ok(())
}

pub fn print_success(message: &str) {
    println!("{} {}", "✓".green(), message);
}

pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow(), message);
}

pub fn print_share(result: &ShareResult, format: OutputFormat) -> anyhow::Result<()> {
    if format == OutputFormat::Json {
        return print_json(result);
    }
    match &result.entry_id {
        Some(id) => {
            print_success(&format!("policy applied, audit entry {}", id.to_string().bold()))
        }
        None => print_success("policy applied"),
    }
    if !result.audit_outcome.is_empty() {
        let rows: Vec<ReplicaRow> = result
            .audit_outcome
            .iter()
            .map(|(principal, written)| ReplicaRow::new(principal, *written))
            .collect();
        println!("{}", Table::new(rows));
    }
    if result.notified {
        print_success("recipient notified");
    }
    for warning in &result.warnings {
        print_warning(&warning.to_string());
    }
    Ok(())
}

pub fn print_inspection(
    resource: &str,
    inspection: Option<&Inspection>,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let Some(inspection) = inspection else {
        println!("{} {}", resource, "no policy".dimmed());
        return Ok(());
    };
    if format == OutputFormat::Json {
        return print_json(&inspection.summary);
    }
    println!("{} ({})", resource.bold(), inspection.policy.location);
    println!("{}", Table::new([SummaryRow::from(inspection.summary)]));
    Ok(())
}

pub fn print_entries(entries: &[AuditEntry], format: OutputFormat) -> anyhow::Result<()> {
    print_output(entries.iter().map(EntryRow::from).collect(), format)
}

pub fn print_outgoing(records: &[OutgoingRecord], format: OutputFormat) -> anyhow::Result<()> {
    print_output(records.iter().map(OutgoingRow::from).collect(), format)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use podshare_types::{AuditEntryId, AuditEntryType, PermissionSet, SharePattern};

    #[test]
    fn test_output_format_default() {
        assert_eq!(OutputFormat::default(), OutputFormat::Table);
    }

    #[test]
    fn entry_rows_render_as_a_table() {
        let alice = Principal::parse("https://alice.example/profile/card#me").unwrap();
        let entry = AuditEntry {
            id: AuditEntryId("0001714564800000-000001-abcd1234".to_string()),
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            resource: "https://alice.example/notes/a.ttl".to_string(),
            owner: alice.clone(),
            granter: alice.clone(),
            recipient: Principal::parse("https://bob.example/profile/card#me").unwrap(),
            permissions: PermissionSet::read_only(),
            entry_type: AuditEntryType::Grant,
            pattern: SharePattern::SharedRead,
            expires_at: None,
            timestamp_recovered: true,
        };
        let row = EntryRow::from(&entry);
        assert_eq!(row.time, "2024-05-01 12:00:00 (recovered)");

        let table = Table::new(vec![row]).to_string();
        assert!(table.contains("type"));
        assert!(table.contains("https://bob.example/profile/card#me"));
    }
}
