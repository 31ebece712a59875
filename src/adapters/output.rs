//! CSV materializer for checkpointed records
//!
//! Columns: `email, remote_id, <field columns...>, processed_at, outcome, error`.

use crate::domain::{ExtractedRecord, HarvestError, Result, ResultExt};
use std::collections::BTreeSet;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Field columns for an export
///
/// The configured list wins when it is non-empty; otherwise every field name
/// seen in `records`, sorted.
pub fn field_columns(records: &[ExtractedRecord], configured: &[String]) -> Vec<String> {
    if !configured.is_empty() {
        return configured.to_vec();
    }
    records
        .iter()
        .flat_map(|record| record.fields.keys().cloned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Write `records` to `path` as CSV, returning the number of data rows
///
/// Parent directories are created as needed. The file is written next to
/// the target and renamed into place.
///
/// # Errors
///
/// `Io` when the file cannot be created, written or renamed
pub fn write_csv(
    path: impl AsRef<Path>,
    records: &[ExtractedRecord],
    field_names: &[String],
) -> Result<usize> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| {
            HarvestError::Io(format!(
                "Failed to create output directory {}: {}",
                parent.display(),
                e
            ))
        })?;
    }

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = std::path::PathBuf::from(tmp_name);

    let file = std::fs::File::create(&tmp_path)
        .with_context(|| format!("Failed to create {}", tmp_path.display()))?;
    let mut writer = BufWriter::new(file);

    write_rows(&mut writer, records, field_names)
        .with_context(|| format!("Failed to write {}", tmp_path.display()))?;

    writer
        .into_inner()
        .map_err(|e| e.into_error())
        .and_then(|file| file.sync_all())
        .with_context(|| format!("Failed to flush {}", tmp_path.display()))?;

    std::fs::rename(&tmp_path, path).map_err(|e| {
        HarvestError::Io(format!("Failed to move CSV into {}: {}", path.display(), e))
    })?;

    tracing::info!(path = %path.display(), rows = records.len(), "Wrote CSV export");

    Ok(records.len())
}

/// Serialize records to any writer
pub fn write_rows<W: Write>(
    writer: &mut W,
    records: &[ExtractedRecord],
    field_names: &[String],
) -> Result<()> {
    let mut header = vec!["email".to_string(), "remote_id".to_string()];
    header.extend(field_names.iter().cloned());
    header.extend(["processed_at", "outcome", "error"].map(String::from));
    write_line(writer, &header)?;

    for record in records {
        let mut row = Vec::with_capacity(header.len());
        row.push(record.key.to_string());
        row.push(
            record
                .remote_id
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default(),
        );
        for name in field_names {
            row.push(record.field_text(name).unwrap_or_default());
        }
        row.push(record.processed_at.to_rfc3339());
        row.push(record.outcome.to_string());
        row.push(
            record
                .error
                .as_ref()
                .map(|e| format!("{}: {}", e.kind, e.message))
                .unwrap_or_default(),
        );
        write_line(writer, &row)?;
    }

    Ok(())
}

fn write_line<W: Write>(writer: &mut W, cells: &[String]) -> Result<()> {
    let line = cells
        .iter()
        .map(|cell| quote(cell))
        .collect::<Vec<_>>()
        .join(",");
    writer.write_all(line.as_bytes())?;
    writer.write_all(b"\r\n")?;
    Ok(())
}

/// RFC 4180 quoting, applied only when the cell needs it
fn quote(cell: &str) -> String {
    if cell.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", cell.replace('"', "\"\""))
    } else {
        cell.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FailureKind, FetchOutcome, FieldMap, RemoteId, SubscriberKey};
    use serde_json::json;
    use tempfile::TempDir;

    fn success(email: &str, fields: &[(&str, serde_json::Value)]) -> ExtractedRecord {
        let fields: FieldMap = fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        ExtractedRecord::from_outcome(
            SubscriberKey::new(email).unwrap(),
            FetchOutcome::Success {
                fields,
                remote_id: RemoteId::new("1").unwrap(),
            },
        )
        .unwrap()
    }

    #[test]
    fn test_quote() {
        assert_eq!(quote("plain"), "plain");
        assert_eq!(quote("a,b"), "\"a,b\"");
        assert_eq!(quote("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(quote("two\nlines"), "\"two\nlines\"");
    }

    #[test]
    fn test_field_columns() {
        let records = vec![
            success("a@x.com", &[("telephone", json!("1"))]),
            success("b@x.com", &[("city", json!("Porto"))]),
        ];
        assert_eq!(field_columns(&records, &[]), vec!["city", "telephone"]);

        let configured = vec!["shopify_domain".to_string()];
        assert_eq!(field_columns(&records, &configured), configured);
    }

    #[test]
    fn test_write_rows_layout() {
        let failed = ExtractedRecord::from_outcome(
            SubscriberKey::new("c@x.com").unwrap(),
            FetchOutcome::Failed {
                kind: FailureKind::Timeout,
                message: "timed out, giving up".to_string(),
            },
        )
        .unwrap();
        let records = vec![success("a@x.com", &[("telephone", json!("+1"))]), failed];

        let mut out = Vec::new();
        write_rows(&mut out, &records, &["telephone".to_string()]).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.split("\r\n").collect();

        assert_eq!(lines[0], "email,remote_id,telephone,processed_at,outcome,error");
        assert!(lines[1].starts_with("a@x.com,1,+1,"));
        assert!(lines[1].ends_with(",success,"));
        assert!(lines[2].starts_with("c@x.com,,,"));
        assert!(lines[2].ends_with(",failed,\"timeout: timed out, giving up\""));
    }

    #[test]
    fn test_write_csv_creates_parent_dir() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("out.csv");
        let records = vec![success("a@x.com", &[("telephone", json!("+1"))])];

        let rows = write_csv(&path, &records, &["telephone".to_string()]).unwrap();
        assert_eq!(rows, 1);

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("email,remote_id,telephone"));
        assert!(!dir.path().join("nested").join("out.csv.tmp").exists());
    }
}
