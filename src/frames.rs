//! Conversion of model output from the ego frame to agent-relative offsets.
//!
//! The model predicts every slot's K x T trajectories in the sample's
//! ego-centric frame. Export wants them relative to each agent's own pose at
//! the first historical timestep, so each slot goes through:
//!
//! 1. anchor: first-timestep local pose -> world pose -> `world_from_slot`
//! 2. predictions: ego frame -> world (`world_from_agent`)
//! 3. predictions: world -> slot frame (inverse of `world_from_slot`)

use nalgebra::DMatrix;
use ndarray::{Array2, Array3, ArrayView3, ArrayView4, Axis};

use crate::internal::tensor::{points_to_trajectories, shape_string, trajectories_to_points};
use crate::sample::{Pose, Sample};
use crate::transform::{CoordinateTransformation, RigidTransform};
use crate::{Error, Result};

/// Agent-relative predictions for one slot.
#[derive(Debug, Clone, PartialEq)]
pub struct SlotTrajectories {
    /// Offsets relative to the slot's anchor pose, `[K, T, 2]`.
    pub coords: Array3<f64>,
    /// Headings relative to the anchor heading, `[K, T]`.
    pub yaws: Array2<f64>,
    /// The slot's anchor.
    pub anchor: SlotAnchor,
}

/// A slot's first-timestep pose in the world frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlotAnchor {
    /// World pose; the yaw is ego yaw + local yaw, unwrapped.
    pub world_pose: Pose,
    /// Transform from the slot's frame to the world frame.
    pub world_from_slot: RigidTransform,
}

/// Build the `world_from_slot` anchor of slot `index` in `sample`.
///
/// Returns `None` when the slot's first historical timestep is unavailable.
pub fn slot_anchor(sample: &Sample, index: usize) -> Result<Option<SlotAnchor>> {
    let slot = sample.slots.get(index).ok_or_else(|| {
        Error::InvalidInput(format!(
            "slot {} out of range for sample at timestamp {} with {} slots",
            index,
            sample.timestamp,
            sample.slots.len()
        ))
    })?;
    let Some(local) = slot.anchor() else {
        return Ok(None);
    };
    if !local.is_finite() {
        return Err(Error::InvalidInput(format!(
            "slot {} of sample at timestamp {} has a non-finite anchor pose",
            index, sample.timestamp
        )));
    }

    let world_pose = Pose {
        position: sample.world_from_agent.apply_point(local.position),
        yaw: sample.ego_yaw + local.yaw,
    };
    let world_from_slot = RigidTransform::build(world_pose.position, world_pose.yaw)?;
    Ok(Some(SlotAnchor {
        world_pose,
        world_from_slot,
    }))
}

/// Build the anchor of every slot in `sample`.
pub fn slot_anchors(sample: &Sample) -> Result<Vec<Option<SlotAnchor>>> {
    (0..sample.slots.len()).map(|i| slot_anchor(sample, i)).collect()
}

/// Convert a `[K, T, 2]` ego-frame trajectory set to world points.
///
/// All K x T points go through a single batched application.
pub fn ego_to_world(sample: &Sample, trajectories: ArrayView3<'_, f64>) -> Result<DMatrix<f64>> {
    let points = trajectories_to_points(trajectories)?;
    sample.world_from_agent.rel_to_abs(&points)
}

/// Convert one slot's ego-frame predictions into offsets relative to `anchor`.
pub fn to_agent_relative(
    sample: &Sample,
    anchor: &SlotAnchor,
    positions: ArrayView3<'_, f64>,
    yaws: ArrayView3<'_, f64>,
) -> Result<SlotTrajectories> {
    let (k, t, _) = positions.dim();
    if yaws.dim() != (k, t, 1) {
        return Err(Error::ShapeMismatch {
            name: "predicted yaws".to_string(),
            expected: shape_string(&[k, t, 1]),
            got: shape_string(yaws.shape()),
        });
    }
    if positions.iter().chain(yaws.iter()).any(|v| !v.is_finite()) {
        return Err(Error::InvalidInput(format!(
            "non-finite prediction for an anchored slot in sample at timestamp {}",
            sample.timestamp
        )));
    }

    let world = ego_to_world(sample, positions)?;
    let relative = anchor.world_from_slot.abs_to_rel(&world)?;
    let coords = points_to_trajectories(&relative, k, t)?;

    let yaw_offset = sample.ego_yaw - anchor.world_pose.yaw;
    let yaws = yaws.index_axis(Axis(2), 0).mapv(|yaw| yaw + yaw_offset);

    Ok(SlotTrajectories {
        coords,
        yaws,
        anchor: *anchor,
    })
}

/// Convert every slot of `sample`.
///
/// `positions` is `[A, K, T, 2]` and `yaws` is `[A, K, T, 1]`. The result has
/// one entry per slot; slots without an anchor map to `None`.
pub fn convert_sample(
    sample: &Sample,
    positions: ArrayView4<'_, f64>,
    yaws: ArrayView4<'_, f64>,
) -> Result<Vec<Option<SlotTrajectories>>> {
    let slots = sample.slots.len();
    if positions.len_of(Axis(0)) != slots || yaws.len_of(Axis(0)) != slots {
        return Err(Error::ShapeMismatch {
            name: "per-sample predictions".to_string(),
            expected: format!("{} slots", slots),
            got: format!(
                "positions {}, yaws {}",
                shape_string(positions.shape()),
                shape_string(yaws.shape())
            ),
        });
    }

    let anchors = slot_anchors(sample)?;
    anchors
        .iter()
        .enumerate()
        .map(|(i, anchor)| match anchor {
            Some(anchor) => to_agent_relative(
                sample,
                anchor,
                positions.index_axis(Axis(0), i),
                yaws.index_axis(Axis(0), i),
            )
            .map(Some),
            None => Ok(None),
        })
        .collect()
}
