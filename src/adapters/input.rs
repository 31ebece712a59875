//! CSV key loader
//!
//! Reads the subscriber keys out of one column of a CSV file. Quoted fields
//! (embedded commas, doubled quotes, line breaks) are supported; everything
//! else about the file is ignored.

use crate::domain::{HarvestError, Result, SubscriberKey};
use std::collections::HashSet;
use std::path::Path;

/// Keys read from an input file, deduplicated in first-seen order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadedKeys {
    pub keys: Vec<SubscriberKey>,
    /// Data rows read (header excluded)
    pub rows: usize,
    /// Rows whose key cell was blank or missing
    pub blank: usize,
    /// Rows repeating an earlier key after normalization
    pub duplicates: usize,
}

/// Load the keys in column `column` (matched case-insensitively)
///
/// # Errors
///
/// `Input` when the file cannot be read, has no header, lacks the column or
/// contains an unterminated quoted field.
///
/// # Example
///
/// ```rust,no_run
/// use harvest::adapters::input::load_keys;
///
/// # fn example() -> harvest::domain::Result<()> {
/// let loaded = load_keys("subscribers.csv", "email")?;
/// println!("{} unique keys from {} rows", loaded.keys.len(), loaded.rows);
/// # Ok(())
/// # }
/// ```
pub fn load_keys(path: impl AsRef<Path>, column: &str) -> Result<LoadedKeys> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path).map_err(|e| {
        HarvestError::Input(format!("Failed to read input file {}: {}", path.display(), e))
    })?;

    let loaded = parse_keys(&contents, column)
        .map_err(|e| HarvestError::Input(format!("{}: {}", path.display(), e)))?;

    tracing::info!(
        path = %path.display(),
        rows = loaded.rows,
        unique = loaded.keys.len(),
        blank = loaded.blank,
        duplicates = loaded.duplicates,
        "Loaded input keys"
    );

    Ok(loaded)
}

/// Extract keys from CSV text
pub fn parse_keys(contents: &str, column: &str) -> std::result::Result<LoadedKeys, String> {
    let contents = contents.strip_prefix('\u{feff}').unwrap_or(contents);
    let mut records = parse_records(contents)?.into_iter();

    let header = records
        .next()
        .ok_or_else(|| "file is empty, expected a header row".to_string())?;
    let index = header
        .iter()
        .position(|name| name.trim().eq_ignore_ascii_case(column.trim()))
        .ok_or_else(|| format!("missing required column '{column}'"))?;

    let mut loaded = LoadedKeys::default();
    let mut seen = HashSet::new();

    for record in records {
        // A lone empty line is not a data row
        if record.len() == 1 && record[0].is_empty() {
            continue;
        }
        loaded.rows += 1;

        let Some(key) = record.get(index).and_then(|cell| SubscriberKey::new(cell).ok()) else {
            loaded.blank += 1;
            continue;
        };

        if seen.insert(key.clone()) {
            loaded.keys.push(key);
        } else {
            loaded.duplicates += 1;
        }
    }

    Ok(loaded)
}

/// Split CSV text into records of unescaped fields
fn parse_records(input: &str) -> std::result::Result<Vec<Vec<String>>, String> {
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                _ => field.push(c),
            }
            continue;
        }

        match c {
            '"' if field.is_empty() => in_quotes = true,
            ',' => record.push(std::mem::take(&mut field)),
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' | '\r' => {
                record.push(std::mem::take(&mut field));
                records.push(std::mem::take(&mut record));
            }
            _ => field.push(c),
        }
    }

    if in_quotes {
        return Err("unterminated quoted field".to_string());
    }

    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        records.push(record);
    }

    Ok(records)
}
