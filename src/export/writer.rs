//! Interchange CSV writer.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use super::ExportRecord;
use crate::internal::tensor::shape_string;
use crate::{Error, Result};

/// Header line of the interchange format for K candidates of T timesteps.
///
/// Columns: `timestamp,track_id,conf_0..conf_{K-1}`, then for each candidate
/// `k` and timestep `t` the pair `coord_x{k}{t},coord_y{k}{t}`.
pub fn csv_header(num_candidates: usize, future_len: usize) -> String {
    let mut columns = vec!["timestamp".to_string(), "track_id".to_string()];
    columns.extend((0..num_candidates).map(|k| format!("conf_{}", k)));
    for k in 0..num_candidates {
        for t in 0..future_len {
            columns.push(format!("coord_x{}{}", k, t));
            columns.push(format!("coord_y{}{}", k, t));
        }
    }
    columns.join(",")
}

/// Writer for export records in the interchange CSV format.
///
/// One line per `(timestamp, track_id)`:
/// `timestamp,track_id,conf_0,...,coord_x00,coord_y00,coord_x01,...`
///
/// Floats use the shortest representation that round-trips, so identical
/// records always serialize to identical bytes.
pub struct PredictionsCsvWriter<W: Write> {
    writer: BufWriter<W>,
    num_candidates: usize,
    future_len: usize,
    rows_written: usize,
}

impl PredictionsCsvWriter<File> {
    /// Create the file at `path` (and its parent directories) and write the header.
    pub fn create<P: AsRef<Path>>(path: P, num_candidates: usize, future_len: usize) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                Error::IoError(std::io::Error::new(
                    e.kind(),
                    format!("failed to create output folder: {}", e),
                ))
            })?;
        }

        let file = File::create(path).map_err(|e| {
            Error::IoError(std::io::Error::new(
                e.kind(),
                format!("failed to create output file: {}", e),
            ))
        })?;

        Self::new(file, num_candidates, future_len)
    }
}

impl<W: Write> PredictionsCsvWriter<W> {
    /// Wrap `inner` and write the header line.
    pub fn new(inner: W, num_candidates: usize, future_len: usize) -> Result<Self> {
        let mut writer = BufWriter::new(inner);
        writeln!(writer, "{}", csv_header(num_candidates, future_len))?;

        Ok(Self {
            writer,
            num_candidates,
            future_len,
            rows_written: 0,
        })
    }

    /// Get the number of data rows written so far.
    pub fn rows_written(&self) -> usize {
        self.rows_written
    }

    /// Write one record.
    pub fn write_record(&mut self, record: &ExportRecord) -> Result<()> {
        if record.coords.dim() != (self.num_candidates, self.future_len, 2)
            || record.confidences.len() != self.num_candidates
        {
            return Err(Error::ShapeMismatch {
                name: format!("export record for track {}", record.track_id),
                expected: format!(
                    "coords {}, {} confidences",
                    shape_string(&[self.num_candidates, self.future_len, 2]),
                    self.num_candidates
                ),
                got: format!(
                    "coords {}, {} confidences",
                    shape_string(record.coords.shape()),
                    record.confidences.len()
                ),
            });
        }

        write!(self.writer, "{},{}", record.timestamp, record.track_id)?;
        for confidence in &record.confidences {
            write!(self.writer, ",{}", confidence)?;
        }
        // Row-major iteration over [K, T, 2] matches the header order
        for value in record.coords.iter() {
            write!(self.writer, ",{}", value)?;
        }
        writeln!(self.writer)?;

        self.rows_written += 1;
        Ok(())
    }

    /// Flush the writer.
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush().map_err(Error::IoError)
    }

    /// Flush and return the inner writer.
    pub fn into_inner(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|e| Error::IoError(e.into_error()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::TrackId;
    use ndarray::Array3;

    fn record() -> ExportRecord {
        ExportRecord {
            timestamp: 1000,
            track_id: TrackId::from_raw(42).unwrap(),
            coords: Array3::from_shape_vec((2, 2, 2), vec![0.5, -1.0, 1.5, -2.0, 0.0, 0.25, 0.0, 0.5]).unwrap(),
            confidences: vec![0.75, 0.25],
        }
    }

    #[test]
    fn test_header() {
        assert_eq!(
            csv_header(2, 2),
            "timestamp,track_id,conf_0,conf_1,\
             coord_x00,coord_y00,coord_x01,coord_y01,\
             coord_x10,coord_y10,coord_x11,coord_y11"
        );
    }

    #[test]
    fn test_write_record() {
        let mut writer = PredictionsCsvWriter::new(Vec::new(), 2, 2).unwrap();
        writer.write_record(&record()).unwrap();
        assert_eq!(writer.rows_written(), 1);

        let bytes = writer.into_inner().unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1], "1000,42,0.75,0.25,0.5,-1,1.5,-2,0,0.25,0,0.5");
    }

    #[test]
    fn test_write_record_rejects_wrong_shape() {
        let mut writer = PredictionsCsvWriter::new(Vec::new(), 3, 2).unwrap();
        assert!(writer.write_record(&record()).is_err());
        assert_eq!(writer.rows_written(), 0);
    }

    #[test]
    fn test_create_makes_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("predictions.csv");

        let mut writer = PredictionsCsvWriter::create(&path, 2, 2).unwrap();
        writer.write_record(&record()).unwrap();
        writer.flush().unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("timestamp,track_id,conf_0,conf_1,"));
        assert_eq!(text.lines().count(), 2);
    }
}
