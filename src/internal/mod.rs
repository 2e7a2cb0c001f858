//! Internal helpers shared across modules.
//!
//! - tensor: conversions between ndarray trajectory tensors and nalgebra point matrices

pub mod tensor;
