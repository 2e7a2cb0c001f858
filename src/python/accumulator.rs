//! Python wrapper for `EvaluationAccumulator`.

use numpy::{PyReadonlyArray1, PyReadonlyArray3};
use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;

use crate::export::{EvaluationAccumulator, ExportSnapshot, PredictionRecord, RecordOrigin};
use crate::impute::Imputer;
use crate::sample::TrackId;

/// Append-only record buffer for one evaluation sweep.
///
/// `finalize_*` consumes the buffer; any later call raises `RuntimeError`.
#[pyclass(name = "EvaluationAccumulator")]
pub struct PyEvaluationAccumulator {
    inner: Option<EvaluationAccumulator>,
    imputer: Imputer,
}

impl PyEvaluationAccumulator {
    fn inner_mut(&mut self) -> PyResult<&mut EvaluationAccumulator> {
        self.inner
            .as_mut()
            .ok_or_else(|| PyRuntimeError::new_err("accumulator already finalized"))
    }

    fn take(&mut self) -> PyResult<EvaluationAccumulator> {
        self.inner
            .take()
            .ok_or_else(|| PyRuntimeError::new_err("accumulator already finalized"))
    }

    fn finalize(&mut self) -> PyResult<ExportSnapshot> {
        Ok(self.take()?.finalize()?)
    }
}

fn parse_track_id(raw: i64) -> PyResult<TrackId> {
    TrackId::from_raw(raw).ok_or_else(|| PyValueError::new_err("track_id 0 is reserved for empty slots"))
}

#[pymethods]
impl PyEvaluationAccumulator {
    #[new]
    fn new(num_candidates: usize, future_len: usize) -> Self {
        Self {
            inner: Some(EvaluationAccumulator::new(num_candidates, future_len)),
            imputer: Imputer::new(num_candidates, future_len),
        }
    }

    /// Add `count` agents of interest to the expected population.
    fn expect(&mut self, count: usize) -> PyResult<()> {
        self.inner_mut()?.expect(count);
        Ok(())
    }

    /// Append a predicted record.
    ///
    /// Args:
    ///     timestamp: Sample timestamp.
    ///     track_id: Non-zero track id.
    ///     coords: Agent-relative offsets, shape (K, T, 2).
    ///     logits: Unnormalized candidate scores, shape (K,).
    fn append(
        &mut self,
        timestamp: i64,
        track_id: i64,
        coords: PyReadonlyArray3<'_, f64>,
        logits: PyReadonlyArray1<'_, f64>,
    ) -> PyResult<()> {
        let record = PredictionRecord {
            timestamp,
            track_id: parse_track_id(track_id)?,
            coords: coords.as_array().to_owned(),
            logits: logits.as_array().to_vec(),
            origin: RecordOrigin::Predicted,
        };
        self.inner_mut()?.append(record)?;
        Ok(())
    }

    /// Append a stationary placeholder for an agent without a prediction.
    fn append_imputed(&mut self, timestamp: i64, track_id: i64) -> PyResult<()> {
        let record = self.imputer.impute(timestamp, parse_track_id(track_id)?);
        self.inner_mut()?.append(record)?;
        Ok(())
    }

    #[getter]
    fn expected(&self) -> usize {
        self.inner.as_ref().map_or(0, EvaluationAccumulator::expected)
    }

    fn __len__(&self) -> usize {
        self.inner.as_ref().map_or(0, EvaluationAccumulator::len)
    }

    /// Finalize and write the interchange CSV to `path`.
    ///
    /// Returns the number of records written.
    fn finalize_to_csv(&mut self, path: std::path::PathBuf) -> PyResult<usize> {
        let snapshot = self.finalize()?;
        snapshot.write_csv_file(&path)?;
        Ok(snapshot.len())
    }

    /// Finalize and return the interchange CSV as a string.
    fn finalize_to_string(&mut self) -> PyResult<String> {
        Ok(self.finalize()?.to_csv_string()?)
    }
}
