//! Rigid-body coordinate transforms.
//!
//! This module provides the 2D rigid transform used to move trajectories
//! between frames during evaluation export:
//!
//! - Ego/agent-local frame to world frame (`rel_to_abs`)
//! - World frame to an agent's anchor frame (`abs_to_rel`)
//! - Masked batch application that carries point availability through

mod rigid;

pub use rigid::{transform_points, CoordinateTransformation, MaskedPoints, RigidTransform};
