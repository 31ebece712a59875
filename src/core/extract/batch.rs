//! In-memory buffer of outcomes awaiting a checkpoint flush

use crate::domain::ExtractedRecord;

/// Records collected since the last committed flush
#[derive(Debug)]
pub struct RecordBuffer {
    records: Vec<ExtractedRecord>,
    batch_size: usize,
}

impl RecordBuffer {
    pub fn new(batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            records: Vec::with_capacity(batch_size),
            batch_size,
        }
    }

    pub fn push(&mut self, record: ExtractedRecord) {
        self.records.push(record);
    }

    /// The buffer has reached the flush threshold
    pub fn is_full(&self) -> bool {
        self.records.len() >= self.batch_size
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Take the buffered records for a flush attempt
    pub fn take(&mut self) -> Vec<ExtractedRecord> {
        std::mem::replace(&mut self.records, Vec::with_capacity(self.batch_size))
    }

    /// Put records back after a failed flush, ahead of anything newer
    pub fn restore(&mut self, mut records: Vec<ExtractedRecord>) {
        records.append(&mut self.records);
        self.records = records;
    }

    pub fn records(&self) -> &[ExtractedRecord] {
        &self.records
    }
}
