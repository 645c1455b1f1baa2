//! Geometry and pose primitives for rigid four-point marker tracking.
//!
//! This crate is purely geometric: a validated marker layout, the pinhole
//! camera derived from the image size, and the four-point pose solver. It
//! knows nothing about detectors, frames or tracking state.

mod camera;
mod logger;
mod marker;
mod pnp;
mod pose;

pub use camera::{CameraError, CameraModel, DEFAULT_FOCAL_FACTOR};
pub use marker::{GeometryError, MarkerGeometry, MARKER_POINTS};
pub use pnp::{pose_from_points, solve_pose, PnpError};
pub use pose::{reprojection_error, Pose};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::init_with_level;
