//! Batch samples as seen by the evaluation pipeline.

use std::fmt;
use std::num::NonZeroI64;

use serde::{Deserialize, Serialize};

use crate::transform::RigidTransform;
use crate::{Error, Result};

/// A non-zero track identifier.
///
/// Empty slots and padding in agents-of-interest lists are `None` rather
/// than a literal 0; the raw wire value 0 maps to `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct TrackId(NonZeroI64);

impl TrackId {
    /// Interpret a raw wire identifier, mapping 0 to `None`.
    pub fn from_raw(raw: i64) -> Option<Self> {
        NonZeroI64::new(raw).map(TrackId)
    }

    /// The raw identifier.
    pub fn raw(self) -> i64 {
        self.0.get()
    }
}

impl TryFrom<i64> for TrackId {
    type Error = Error;

    fn try_from(raw: i64) -> Result<Self> {
        TrackId::from_raw(raw).ok_or_else(|| Error::InvalidInput("track id 0 is reserved for empty slots".to_string()))
    }
}

impl From<TrackId> for i64 {
    fn from(id: TrackId) -> i64 {
        id.raw()
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Convert a padded raw id array into optional ids.
pub fn ids_from_raw(raw: &[i64]) -> Vec<Option<TrackId>> {
    raw.iter().map(|&id| TrackId::from_raw(id)).collect()
}

/// Position and heading.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    pub position: [f64; 2],
    pub yaw: f64,
}

impl Pose {
    pub fn new(position: [f64; 2], yaw: f64) -> Self {
        Self { position, yaw }
    }

    pub fn is_finite(&self) -> bool {
        self.position.iter().all(|v| v.is_finite()) && self.yaw.is_finite()
    }
}

/// One of the fixed number of per-sample agent positions the model fills.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentSlot {
    /// Track occupying the slot, `None` for an empty slot.
    pub track_id: Option<TrackId>,

    /// Historical positions in the sample's local frame.
    /// Index 0 is the first historical timestep (the anchor timestep).
    pub history_positions: Vec<[f64; 2]>,

    /// Historical yaws in the sample's local frame.
    pub history_yaws: Vec<f64>,

    /// Per-timestep availability of the history.
    pub history_availability: Vec<bool>,
}

impl AgentSlot {
    /// An empty (padding) slot with `history_len` unavailable timesteps.
    pub fn empty(history_len: usize) -> Self {
        Self {
            track_id: None,
            history_positions: vec![[0.0, 0.0]; history_len],
            history_yaws: vec![0.0; history_len],
            history_availability: vec![false; history_len],
        }
    }

    /// A slot for `track_id` with a single available anchor pose.
    pub fn anchored(track_id: TrackId, anchor: Pose) -> Self {
        Self {
            track_id: Some(track_id),
            history_positions: vec![anchor.position],
            history_yaws: vec![anchor.yaw],
            history_availability: vec![true],
        }
    }

    /// Number of history timesteps.
    pub fn history_len(&self) -> usize {
        self.history_positions.len()
    }

    /// The local-frame pose at the first historical timestep, if available.
    pub fn anchor(&self) -> Option<Pose> {
        if !self.history_availability.first().copied().unwrap_or(false) {
            return None;
        }
        let position = *self.history_positions.first()?;
        let yaw = *self.history_yaws.first()?;
        Some(Pose { position, yaw })
    }

    fn validate(&self) -> Result<()> {
        let n = self.history_positions.len();
        if self.history_yaws.len() != n || self.history_availability.len() != n {
            return Err(Error::ShapeMismatch {
                name: "agent history".to_string(),
                expected: format!("{} positions, yaws and availability flags", n),
                got: format!(
                    "{} yaws, {} availability flags",
                    self.history_yaws.len(),
                    self.history_availability.len()
                ),
            });
        }
        Ok(())
    }
}

/// One batch element.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Timestamp of the sample's reference frame.
    pub timestamp: i64,

    /// Ego world-from-agent transform.
    pub world_from_agent: RigidTransform,

    /// Ego yaw in the world frame.
    pub ego_yaw: f64,

    /// Fixed-capacity agent slots.
    pub slots: Vec<AgentSlot>,

    /// Agents of interest for this sample, padded with `None`.
    pub agents_of_interest: Vec<Option<TrackId>>,
}

impl Sample {
    /// Create a sample whose ego frame is given as a world pose.
    pub fn new(
        timestamp: i64,
        ego: Pose,
        slots: Vec<AgentSlot>,
        agents_of_interest: Vec<Option<TrackId>>,
    ) -> Result<Self> {
        let sample = Self {
            timestamp,
            world_from_agent: RigidTransform::build(ego.position, ego.yaw)?,
            ego_yaw: ego.yaw,
            slots,
            agents_of_interest,
        };
        sample.validate()?;
        Ok(sample)
    }

    /// Track ids per slot.
    pub fn slot_ids(&self) -> Vec<Option<TrackId>> {
        self.slots.iter().map(|slot| slot.track_id).collect()
    }

    /// Number of agents of interest (non-padding entries).
    pub fn interest_count(&self) -> usize {
        self.agents_of_interest.iter().filter(|id| id.is_some()).count()
    }

    /// Check internal consistency of slot histories.
    pub fn validate(&self) -> Result<()> {
        if !self.ego_yaw.is_finite() {
            return Err(Error::InvalidInput(format!(
                "ego yaw of sample at timestamp {} is not finite",
                self.timestamp
            )));
        }
        for slot in &self.slots {
            slot.validate()?;
        }
        Ok(())
    }
}

/// An ordered set of samples processed together.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Batch {
    pub samples: Vec<Sample>,
}

impl Batch {
    pub fn new(samples: Vec<Sample>) -> Self {
        Self { samples }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Sum of agents-of-interest counts over all samples.
    pub fn interest_count(&self) -> usize {
        self.samples.iter().map(Sample::interest_count).sum()
    }
}

/// Group samples into batches of at most `batch_size`, preserving order.
pub fn into_batches(samples: Vec<Sample>, batch_size: usize) -> Result<Vec<Batch>> {
    if batch_size == 0 {
        return Err(Error::InvalidInput("batch size must be positive".to_string()));
    }

    let mut batches = Vec::with_capacity(samples.len().div_ceil(batch_size));
    let mut current = Vec::with_capacity(batch_size);
    for sample in samples {
        current.push(sample);
        if current.len() == batch_size {
            batches.push(Batch::new(std::mem::replace(&mut current, Vec::with_capacity(batch_size))));
        }
    }
    if !current.is_empty() {
        batches.push(Batch::new(current));
    }
    Ok(batches)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_id_zero_is_empty() {
        assert!(TrackId::from_raw(0).is_none());
        assert_eq!(TrackId::from_raw(42).map(TrackId::raw), Some(42));
        assert_eq!(TrackId::from_raw(-3).map(TrackId::raw), Some(-3));
    }

    #[test]
    fn test_track_id_serde_rejects_zero() {
        assert!(TrackId::try_from(0).is_err());
        assert_eq!(i64::from(TrackId::try_from(9).unwrap()), 9);
    }

    #[test]
    fn test_option_track_id_is_pointer_sized() {
        assert_eq!(std::mem::size_of::<Option<TrackId>>(), std::mem::size_of::<i64>());
    }

    #[test]
    fn test_ids_from_raw() {
        let ids = ids_from_raw(&[7, 0, 9]);
        assert_eq!(ids.len(), 3);
        assert!(ids[1].is_none());
        assert_eq!(ids[2].map(TrackId::raw), Some(9));
    }

    #[test]
    fn test_anchor_requires_availability() {
        let id = TrackId::from_raw(1).unwrap();
        let slot = AgentSlot::anchored(id, Pose::new([1.0, 2.0], 0.5));
        assert_eq!(slot.anchor(), Some(Pose::new([1.0, 2.0], 0.5)));

        let empty = AgentSlot::empty(3);
        assert_eq!(empty.history_len(), 3);
        assert!(empty.anchor().is_none());

        let no_history = AgentSlot::empty(0);
        assert!(no_history.anchor().is_none());
    }

    #[test]
    fn test_interest_count_skips_padding() {
        let sample = Sample::new(
            10,
            Pose::default(),
            vec![AgentSlot::empty(1)],
            ids_from_raw(&[3, 0, 4, 0]),
        )
        .unwrap();
        assert_eq!(sample.interest_count(), 2);
        assert_eq!(Batch::new(vec![sample.clone(), sample]).interest_count(), 4);
    }

    #[test]
    fn test_sample_rejects_ragged_history() {
        let mut slot = AgentSlot::empty(2);
        slot.history_yaws.pop();
        assert!(Sample::new(0, Pose::default(), vec![slot], vec![]).is_err());
    }

    #[test]
    fn test_sample_rejects_non_finite_ego() {
        assert!(Sample::new(0, Pose::new([0.0, 0.0], f64::NAN), vec![], vec![]).is_err());
    }

    #[test]
    fn test_into_batches() {
        let samples: Vec<Sample> = (0..5)
            .map(|t| Sample::new(t, Pose::default(), vec![], vec![]).unwrap())
            .collect();
        let batches = into_batches(samples, 2).unwrap();

        let sizes: Vec<usize> = batches.iter().map(Batch::len).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
        assert_eq!(batches[2].samples[0].timestamp, 4);
        assert!(into_batches(Vec::new(), 0).is_err());
    }
}
