//! Accumulation and export of evaluation records.
//!
//! This module turns per-batch pipeline output into the interchange file the
//! metrics stage reads:
//!
//! - `EvaluationAccumulator` - Append-only buffer owned by the evaluation driver
//! - `ExportSnapshot` - Frozen, normalized and sorted result of a sweep
//! - `PredictionsCsvWriter` - Writes records in the interchange CSV format
//! - `read_predictions_csv` - Parses an interchange CSV back into records

mod record;
mod accumulator;
mod snapshot;
mod writer;
mod reader;

pub use record::{ExportRecord, PredictionRecord, RecordOrigin};
pub use accumulator::EvaluationAccumulator;
pub use snapshot::ExportSnapshot;
pub use writer::{csv_header, PredictionsCsvWriter};
pub use reader::{read_predictions_csv, ParsedPredictions};
