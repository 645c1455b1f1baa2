use tooltrack_core::{CameraError, PnpError, MARKER_POINTS};

use crate::params::ConfigError;

/// Expected, per-frame reasons for not producing a pose.
///
/// None of these abort the loop: the frame reports "no pose" and the session
/// drops back to searching.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ResolveFailure {
    #[error("{found} detections, at least {} required", MARKER_POINTS)]
    InsufficientDetections { found: usize },
    #[error("marker point {index}: nearest detection at {distance_px:.1} px exceeds gate {gate_px:.1} px")]
    GatingFailure {
        index: usize,
        distance_px: f64,
        gate_px: f64,
    },
    #[error("pose solve failed: {0}")]
    SolveFailure(#[from] PnpError),
    #[error("reprojection error {error_px:.2} px not below {threshold_px:.2} px")]
    ValidationFailure { error_px: f64, threshold_px: f64 },
}

/// Unexpected failures; these propagate out of the frame loop.
#[derive(thiserror::Error, Debug)]
pub enum TrackError {
    #[error("detection {index} has non-finite coordinates")]
    MalformedDetection { index: usize },
    #[error("invalid camera: {0}")]
    Camera(#[from] CameraError),
    #[error("detector failed: {0}")]
    Detector(String),
    #[error("capture source failed: {0}")]
    Capture(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
