//! # sinew-mesh
//!
//! Particle and distance-constraint model for soft bodies.
//!
//! ## Key Types
//!
//! - [`MeshData`]: Serializable input: positions, rest positions, constraint pairs.
//! - [`SoftBody`]: Validated model with cached rest lengths. The solver owns one.
//! - [`DistanceConstraint`]: A directionless particle pair and its correction formula.
//! - Procedural generators and constraint coloring for batched dispatch.

pub mod body;
pub mod coloring;
pub mod constraint;
pub mod generators;
pub mod mesh;

pub use body::SoftBody;
pub use coloring::{color_constraints, ConstraintBatches};
pub use constraint::DistanceConstraint;
pub use glam::Vec3;
pub use mesh::MeshData;
