//! Frozen result of an evaluation sweep.

use std::io::Write;
use std::path::Path;

use tracing::info;

use super::{ExportRecord, PredictionsCsvWriter};
use crate::{Error, Result};

/// Immutable, normalized and sorted export records.
///
/// Produced only by `EvaluationAccumulator::finalize`.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportSnapshot {
    num_candidates: usize,
    future_len: usize,
    records: Vec<ExportRecord>,
}

impl ExportSnapshot {
    pub(crate) fn new(num_candidates: usize, future_len: usize, records: Vec<ExportRecord>) -> Self {
        Self {
            num_candidates,
            future_len,
            records,
        }
    }

    /// Records sorted by `(timestamp, track_id)`.
    pub fn records(&self) -> &[ExportRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn num_candidates(&self) -> usize {
        self.num_candidates
    }

    pub fn future_len(&self) -> usize {
        self.future_len
    }

    /// Serialize all records to `writer` in the interchange CSV format.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<W> {
        let mut csv = PredictionsCsvWriter::new(writer, self.num_candidates, self.future_len)?;
        for record in &self.records {
            csv.write_record(record)?;
        }
        csv.into_inner()
    }

    /// Serialize to a file, creating parent directories as needed.
    pub fn write_csv_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let mut csv = PredictionsCsvWriter::create(path, self.num_candidates, self.future_len)?;
        for record in &self.records {
            csv.write_record(record)?;
        }
        csv.flush()?;

        info!(path = %path.display(), rows = csv.rows_written(), "Wrote predictions file");
        Ok(())
    }

    /// Serialize to an in-memory string.
    pub fn to_csv_string(&self) -> Result<String> {
        let bytes = self.write_csv(Vec::new())?;
        String::from_utf8(bytes).map_err(|e| Error::FormatError(e.to_string()))
    }
}
