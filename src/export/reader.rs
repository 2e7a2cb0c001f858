//! Interchange CSV parser.

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use ndarray::Array3;

use super::{csv_header, ExportRecord};
use crate::sample::TrackId;
use crate::{Error, Result};

/// Records read back from an interchange CSV file.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedPredictions {
    pub num_candidates: usize,
    pub future_len: usize,
    pub records: Vec<ExportRecord>,
}

/// Parse an interchange CSV file.
///
/// K and T are inferred from the header. Every row must have the header's
/// column count, a non-zero track id and confidences summing to 1 within 1e-6.
pub fn read_predictions_csv<P: AsRef<Path>>(path: P) -> Result<ParsedPredictions> {
    let file = File::open(&path).map_err(|e| {
        Error::IoError(std::io::Error::new(
            e.kind(),
            format!("failed to open predictions file: {}", e),
        ))
    })?;
    parse_predictions(file)
}

pub(crate) fn parse_predictions<R: Read>(input: R) -> Result<ParsedPredictions> {
    let mut lines = BufReader::new(input).lines();

    let header = match lines.next() {
        Some(line) => line.map_err(Error::IoError)?,
        None => return Err(Error::FormatError("predictions file is empty".to_string())),
    };
    let (num_candidates, future_len) = parse_header(header.trim_end())?;
    let num_columns = 2 + num_candidates + num_candidates * future_len * 2;

    let mut records = Vec::new();
    for (line_index, line_result) in lines.enumerate() {
        let line = line_result.map_err(Error::IoError)?;
        let line = line.trim_end();
        if line.is_empty() {
            continue;
        }
        // Header is line 1
        let line_no = line_index + 2;

        let parts: Vec<&str> = line.split(',').collect();
        if parts.len() != num_columns {
            return Err(Error::FormatError(format!(
                "line {}: expected {} columns, got {}",
                line_no,
                num_columns,
                parts.len()
            )));
        }

        let timestamp: i64 = parse_field(parts[0], "timestamp", line_no)?;
        let raw_id: i64 = parse_field(parts[1], "track_id", line_no)?;
        let track_id = TrackId::from_raw(raw_id)
            .ok_or_else(|| Error::FormatError(format!("line {}: track_id 0 is reserved", line_no)))?;

        let confidences = parts[2..2 + num_candidates]
            .iter()
            .map(|s| parse_field::<f64>(s, "confidence", line_no))
            .collect::<Result<Vec<f64>>>()?;
        let total: f64 = confidences.iter().sum();
        if (total - 1.0).abs() > 1e-6 {
            return Err(Error::FormatError(format!(
                "line {}: confidences sum to {}, expected 1",
                line_no, total
            )));
        }

        let values = parts[2 + num_candidates..]
            .iter()
            .map(|s| parse_field::<f64>(s, "coordinate", line_no))
            .collect::<Result<Vec<f64>>>()?;
        let coords = Array3::from_shape_vec((num_candidates, future_len, 2), values)
            .map_err(|e| Error::FormatError(format!("line {}: {}", line_no, e)))?;

        records.push(ExportRecord {
            timestamp,
            track_id,
            coords,
            confidences,
        });
    }

    Ok(ParsedPredictions {
        num_candidates,
        future_len,
        records,
    })
}

fn parse_header(header: &str) -> Result<(usize, usize)> {
    let columns: Vec<&str> = header.split(',').collect();
    let num_candidates = columns.iter().filter(|c| c.starts_with("conf_")).count();
    let num_coords = columns.iter().filter(|c| c.starts_with("coord_")).count();

    if num_candidates == 0 || num_coords % (2 * num_candidates) != 0 {
        return Err(Error::FormatError(format!(
            "cannot infer candidate layout from header with {} confidence and {} coordinate columns",
            num_candidates, num_coords
        )));
    }
    let future_len = num_coords / (2 * num_candidates);

    if header != csv_header(num_candidates, future_len) {
        return Err(Error::FormatError(format!(
            "header does not match the layout for K={}, T={}",
            num_candidates, future_len
        )));
    }

    Ok((num_candidates, future_len))
}

fn parse_field<T: std::str::FromStr>(value: &str, name: &str, line_no: usize) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::FormatError(format!("line {}: invalid {} '{}'", line_no, name, value)))
}
