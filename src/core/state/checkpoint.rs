//! Durable checkpoint of processed keys
//!
//! The checkpoint is a JSON Lines file. Each committed batch is exactly one
//! line, `{"batch_id", "written_at", "records": [...]}`, written with a single
//! `write_all` followed by `fsync`. A batch counts as committed only once its
//! terminating newline is on disk, so a crash mid-write leaves a torn trailing
//! line that readers skip and the next append cuts away.

use crate::core::state::run_state::RunState;
use crate::domain::{ExtractedRecord, HarvestError, Result, SubscriberKey};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Records per line when compacting
const COMPACT_CHUNK: usize = 1000;

/// Read size when scanning backwards for the last newline
const TAIL_SCAN_CHUNK: u64 = 8 * 1024;

/// Persistence for extraction results
///
/// Implementations must make `append` atomic per batch: after a crash,
/// `load` sees either all of a batch or none of it.
pub trait CheckpointStore: Send {
    /// Rebuild run state from every committed batch
    ///
    /// # Errors
    ///
    /// `CorruptState` when a committed batch cannot be parsed; `Checkpoint`
    /// when the store cannot be read.
    fn load(&mut self) -> Result<RunState>;

    /// Commit a batch of records. Empty batches are a no-op.
    ///
    /// # Errors
    ///
    /// `Checkpoint` when the batch could not be made durable
    fn append(&mut self, records: &[ExtractedRecord]) -> Result<()>;

    /// Latest record per key, ordered by key
    fn records(&self) -> Result<Vec<ExtractedRecord>>;

    /// Move a corrupt checkpoint aside so a fresh run can start
    ///
    /// Returns the new location, or `None` when there was nothing to move.
    fn quarantine(&mut self) -> Result<Option<PathBuf>>;

    /// Rewrite the store with one record per key, returning the record count
    fn compact(&mut self) -> Result<usize>;
}

/// One committed line of the checkpoint file
#[derive(Debug, Serialize, Deserialize)]
struct CheckpointBatch {
    batch_id: u64,
    written_at: DateTime<Utc>,
    records: Vec<ExtractedRecord>,
}

/// Borrowing twin of [`CheckpointBatch`] used on the write path
#[derive(Serialize)]
struct CheckpointBatchRef<'a> {
    batch_id: u64,
    written_at: DateTime<Utc>,
    records: &'a [ExtractedRecord],
}

/// JSON Lines checkpoint file
///
/// # Example
///
/// ```rust,no_run
/// use harvest::core::state::{CheckpointStore, JsonlCheckpointStore};
///
/// # fn example() -> harvest::domain::Result<()> {
/// let mut store = JsonlCheckpointStore::new("harvest_checkpoint.jsonl");
/// let state = store.load()?;
/// println!("{} keys already processed", state.processed_len());
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct JsonlCheckpointStore {
    path: PathBuf,
    next_batch_id: u64,
    /// The file is known to end on a committed line
    tail_clean: bool,
}

impl JsonlCheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            next_batch_id: 1,
            tail_clean: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Parse every committed batch, in file order
    fn read_batches(&self) -> Result<Vec<CheckpointBatch>> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(HarvestError::Checkpoint(format!(
                    "Failed to read checkpoint {}: {}",
                    self.path.display(),
                    e
                )))
            }
        };

        let committed_len = bytes
            .iter()
            .rposition(|&b| b == b'\n')
            .map_or(0, |pos| pos + 1);

        if committed_len < bytes.len() {
            tracing::warn!(
                path = %self.path.display(),
                torn_bytes = bytes.len() - committed_len,
                "Ignoring incomplete trailing checkpoint batch"
            );
        }

        let mut batches = Vec::new();
        for (index, line) in bytes[..committed_len].split(|&b| b == b'\n').enumerate() {
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            let batch: CheckpointBatch = serde_json::from_slice(line).map_err(|e| {
                HarvestError::CorruptState(format!(
                    "{} line {}: {}",
                    self.path.display(),
                    index + 1,
                    e
                ))
            })?;
            batches.push(batch);
        }

        Ok(batches)
    }

    /// Cut a torn trailing line off the file
    fn repair_tail(&mut self) -> Result<()> {
        let mut file = match OpenOptions::new().read(true).write(true).open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                self.tail_clean = true;
                return Ok(());
            }
            Err(e) => return Err(checkpoint_error(&self.path, "open", e)),
        };

        let len = file
            .metadata()
            .map_err(|e| checkpoint_error(&self.path, "stat", e))?
            .len();
        let committed = committed_length(&mut file, len)
            .map_err(|e| checkpoint_error(&self.path, "scan", e))?;

        if committed < len {
            tracing::warn!(
                path = %self.path.display(),
                torn_bytes = len - committed,
                "Truncating incomplete trailing checkpoint batch"
            );
            file.set_len(committed)
                .and_then(|()| file.sync_all())
                .map_err(|e| checkpoint_error(&self.path, "truncate", e))?;
        }

        self.tail_clean = true;
        Ok(())
    }

    fn ensure_parent_dir(&self) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| checkpoint_error(parent, "create directory", e))?;
        }
        Ok(())
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(suffix);
        PathBuf::from(name)
    }
}

impl CheckpointStore for JsonlCheckpointStore {
    fn load(&mut self) -> Result<RunState> {
        let batches = self.read_batches()?;
        let mut state = RunState::new();

        for batch in &batches {
            self.next_batch_id = self.next_batch_id.max(batch.batch_id + 1);
            for record in &batch.records {
                state.record(record.key.clone(), record.outcome);
            }
        }

        tracing::info!(
            path = %self.path.display(),
            batches = batches.len(),
            processed = state.processed_len(),
            "Loaded checkpoint"
        );

        Ok(state)
    }

    fn append(&mut self, records: &[ExtractedRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        if !self.tail_clean {
            self.ensure_parent_dir()?;
            self.repair_tail()?;
        }

        let batch = CheckpointBatchRef {
            batch_id: self.next_batch_id,
            written_at: Utc::now(),
            records,
        };
        let mut line = serde_json::to_vec(&batch)
            .map_err(|e| HarvestError::Checkpoint(format!("Failed to encode batch: {e}")))?;
        line.push(b'\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| checkpoint_error(&self.path, "open", e))?;

        if let Err(e) = file.write_all(&line).and_then(|()| file.sync_data()) {
            // Whatever reached the disk is now an unterminated tail
            self.tail_clean = false;
            return Err(checkpoint_error(&self.path, "write", e));
        }

        self.next_batch_id += 1;
        Ok(())
    }

    fn records(&self) -> Result<Vec<ExtractedRecord>> {
        let mut latest: BTreeMap<SubscriberKey, ExtractedRecord> = BTreeMap::new();
        for batch in self.read_batches()? {
            for record in batch.records {
                latest.insert(record.key.clone(), record);
            }
        }
        Ok(latest.into_values().collect())
    }

    fn quarantine(&mut self) -> Result<Option<PathBuf>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let target = self.sibling(&format!(
            ".corrupt-{}",
            Utc::now().format("%Y%m%dT%H%M%S%.3fZ")
        ));
        std::fs::rename(&self.path, &target)
            .map_err(|e| checkpoint_error(&self.path, "quarantine", e))?;

        tracing::warn!(
            path = %self.path.display(),
            moved_to = %target.display(),
            "Quarantined corrupt checkpoint"
        );

        self.next_batch_id = 1;
        self.tail_clean = false;
        Ok(Some(target))
    }

    fn compact(&mut self) -> Result<usize> {
        let records = self.records()?;
        let tmp_path = self.sibling(".compact.tmp");

        let write = || -> std::io::Result<()> {
            let mut file = File::create(&tmp_path)?;
            let written_at = Utc::now();
            for (index, chunk) in records.chunks(COMPACT_CHUNK).enumerate() {
                let batch = CheckpointBatchRef {
                    batch_id: index as u64 + 1,
                    written_at,
                    records: chunk,
                };
                let mut line = serde_json::to_vec(&batch)?;
                line.push(b'\n');
                file.write_all(&line)?;
            }
            file.sync_all()
        };
        write().map_err(|e| checkpoint_error(&tmp_path, "write", e))?;

        std::fs::rename(&tmp_path, &self.path)
            .map_err(|e| checkpoint_error(&self.path, "replace", e))?;

        self.next_batch_id = records.len().div_ceil(COMPACT_CHUNK) as u64 + 1;
        self.tail_clean = true;

        tracing::info!(
            path = %self.path.display(),
            records = records.len(),
            "Compacted checkpoint"
        );

        Ok(records.len())
    }
}

fn checkpoint_error(path: &Path, action: &str, err: std::io::Error) -> HarvestError {
    HarvestError::Checkpoint(format!(
        "Failed to {} checkpoint {}: {}",
        action,
        path.display(),
        err
    ))
}

/// Length of the file up to and including its last newline
fn committed_length(file: &mut File, len: u64) -> std::io::Result<u64> {
    let mut end = len;
    let mut buf = vec![0u8; TAIL_SCAN_CHUNK as usize];

    while end > 0 {
        let start = end.saturating_sub(TAIL_SCAN_CHUNK);
        let chunk = &mut buf[..(end - start) as usize];
        file.seek(SeekFrom::Start(start))?;
        file.read_exact(chunk)?;
        if let Some(pos) = chunk.iter().rposition(|&b| b == b'\n') {
            return Ok(start + pos as u64 + 1);
        }
        end = start;
    }

    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FailureKind, FetchOutcome, OutcomeKind};
    use tempfile::TempDir;

    fn record(email: &str, outcome: FetchOutcome) -> ExtractedRecord {
        ExtractedRecord::from_outcome(SubscriberKey::new(email).unwrap(), outcome).unwrap()
    }

    fn failed(email: &str) -> ExtractedRecord {
        record(
            email,
            FetchOutcome::Failed {
                kind: FailureKind::Transport,
                message: "connection reset".to_string(),
            },
        )
    }

    fn store_in(dir: &TempDir) -> JsonlCheckpointStore {
        JsonlCheckpointStore::new(dir.path().join("checkpoint.jsonl"))
    }

    #[test]
    fn test_missing_file_is_empty_state() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);
        let state = store.load().unwrap();
        assert_eq!(state.processed_len(), 0);
        assert!(store.records().unwrap().is_empty());
    }

    #[test]
    fn test_append_then_load() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);
        store
            .append(&[
                record("a@x.com", FetchOutcome::EmptyResult),
                failed("b@x.com"),
            ])
            .unwrap();

        let contents = std::fs::read_to_string(store.path()).unwrap();
        assert_eq!(contents.lines().count(), 1);
        assert!(contents.ends_with('\n'));

        let state = JsonlCheckpointStore::new(store.path()).load().unwrap();
        assert_eq!(state.counts().total, 2);
        assert_eq!(state.counts().failed, 1);
    }

    #[test]
    fn test_empty_append_is_noop() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);
        store.append(&[]).unwrap();
        assert!(!store.exists());
    }

    #[test]
    fn test_last_write_wins_on_load_and_records() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);
        store.append(&[failed("a@x.com")]).unwrap();
        store
            .append(&[record("a@x.com", FetchOutcome::EmptyResult)])
            .unwrap();

        let state = store.load().unwrap();
        assert_eq!(state.counts().total, 1);
        assert_eq!(
            state.outcome(&SubscriberKey::new("a@x.com").unwrap()),
            Some(OutcomeKind::Empty)
        );

        let records = store.records().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].outcome, OutcomeKind::Empty);
    }

    #[test]
    fn test_torn_tail_is_ignored_then_truncated() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);
        store
            .append(&[record("a@x.com", FetchOutcome::EmptyResult)])
            .unwrap();

        // Crash in the middle of the second batch
        let mut file = OpenOptions::new().append(true).open(store.path()).unwrap();
        file.write_all(br#"{"batch_id":2,"written_at":"2026-01-0"#)
            .unwrap();
        drop(file);

        let mut reopened = JsonlCheckpointStore::new(store.path());
        let state = reopened.load().unwrap();
        assert_eq!(state.counts().total, 1);

        reopened
            .append(&[record("b@x.com", FetchOutcome::EmptyResult)])
            .unwrap();

        let contents = std::fs::read_to_string(reopened.path()).unwrap();
        assert_eq!(contents.lines().count(), 2);
        assert!(!contents.contains("2026-01-0\""));

        let state = JsonlCheckpointStore::new(reopened.path()).load().unwrap();
        assert_eq!(state.counts().total, 2);
    }

    #[test]
    fn test_corrupt_committed_line() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("checkpoint.jsonl");
        std::fs::write(&path, "this is not json\n").unwrap();

        let mut store = JsonlCheckpointStore::new(&path);
        let err = store.load().unwrap_err();
        assert!(matches!(err, HarvestError::CorruptState(_)));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_quarantine_moves_file_aside() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("checkpoint.jsonl");
        std::fs::write(&path, "garbage\n").unwrap();

        let mut store = JsonlCheckpointStore::new(&path);
        let moved = store.quarantine().unwrap().unwrap();

        assert!(!path.exists());
        assert!(moved.exists());
        assert!(moved
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("checkpoint.jsonl.corrupt-"));
        assert_eq!(store.load().unwrap().processed_len(), 0);
        assert!(store.quarantine().unwrap().is_none());
    }

    #[test]
    fn test_compact_keeps_latest_record_per_key() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);
        store.append(&[failed("a@x.com"), failed("b@x.com")]).unwrap();
        store
            .append(&[record("a@x.com", FetchOutcome::EmptyResult)])
            .unwrap();

        assert_eq!(store.compact().unwrap(), 2);

        let contents = std::fs::read_to_string(store.path()).unwrap();
        assert_eq!(contents.lines().count(), 1);

        let state = store.load().unwrap();
        assert_eq!(state.counts().empty, 1);
        assert_eq!(state.counts().failed, 1);

        store.append(&[failed("c@x.com")]).unwrap();
        assert_eq!(store.records().unwrap().len(), 3);
    }

    #[test]
    fn test_append_creates_parent_directory() {
        let dir = TempDir::new().unwrap();
        let mut store = JsonlCheckpointStore::new(dir.path().join("runs").join("cp.jsonl"));
        store.append(&[failed("a@x.com")]).unwrap();
        assert!(store.exists());
    }

    #[test]
    fn test_committed_length_scans_across_chunks() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("big");
        let mut data = b"line\n".to_vec();
        data.extend(std::iter::repeat(b'x').take(TAIL_SCAN_CHUNK as usize * 2 + 10));
        std::fs::write(&path, &data).unwrap();

        let mut file = File::open(&path).unwrap();
        let committed = committed_length(&mut file, data.len() as u64).unwrap();
        assert_eq!(committed, 5);
    }
}
