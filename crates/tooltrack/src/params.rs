//! Tracker parameters and the JSON configuration file.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tooltrack_core::{MarkerGeometry, DEFAULT_FOCAL_FACTOR, MARKER_POINTS};

/// Errors raised while loading or validating configuration and recordings.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("invalid parameter: {0}")]
    Invalid(String),
}

fn default_focal_factor() -> f64 {
    DEFAULT_FOCAL_FACTOR
}

fn default_min_confidence() -> f64 {
    0.4
}

fn default_gate_threshold_px() -> f64 {
    50.0
}

fn default_acceptance_threshold_px() -> f64 {
    20.0
}

fn default_smoothing_alpha() -> f64 {
    0.5
}

/// Largest accepted `recovery_candidates`; 8 detections give 1680 orderings.
pub const MAX_RECOVERY_CANDIDATES: usize = 8;

fn default_recovery_candidates() -> usize {
    MARKER_POINTS
}

/// Parameters of the tracking core. Every field has a default.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrackerParams {
    #[serde(default)]
    pub marker: MarkerGeometry,
    /// Focal length as a fraction of the image width.
    #[serde(default = "default_focal_factor")]
    pub focal_factor: f64,
    /// Detector boxes below this confidence are dropped.
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
    /// Fast-path matches farther than this from the prediction fail (pixels).
    #[serde(default = "default_gate_threshold_px")]
    pub gate_threshold_px: f64,
    /// A pose is accepted only when its reprojection error is below this (pixels).
    #[serde(default = "default_acceptance_threshold_px")]
    pub acceptance_threshold_px: f64,
    /// Weight of the new observation in the smoothed point cache, in (0, 1].
    #[serde(default = "default_smoothing_alpha")]
    pub smoothing_alpha: f64,
    /// Number of leading detections the recovery search permutes.
    ///
    /// The default only looks at the first four detections, so a false
    /// positive emitted early can hide the marker until it disappears.
    #[serde(default = "default_recovery_candidates")]
    pub recovery_candidates: usize,
}

impl Default for TrackerParams {
    fn default() -> Self {
        Self {
            marker: MarkerGeometry::default(),
            focal_factor: default_focal_factor(),
            min_confidence: default_min_confidence(),
            gate_threshold_px: default_gate_threshold_px(),
            acceptance_threshold_px: default_acceptance_threshold_px(),
            smoothing_alpha: default_smoothing_alpha(),
            recovery_candidates: default_recovery_candidates(),
        }
    }
}

impl TrackerParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = |name: &str, v: f64| {
            if v.is_finite() && v > 0.0 {
                Ok(())
            } else {
                Err(ConfigError::Invalid(format!("{name} must be finite and positive, got {v}")))
            }
        };
        positive("focal_factor", self.focal_factor)?;
        positive("gate_threshold_px", self.gate_threshold_px)?;
        positive("acceptance_threshold_px", self.acceptance_threshold_px)?;
        if !self.min_confidence.is_finite() {
            return Err(ConfigError::Invalid(format!(
                "min_confidence must be finite, got {}",
                self.min_confidence
            )));
        }
        if !(self.smoothing_alpha > 0.0 && self.smoothing_alpha <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "smoothing_alpha must lie in (0, 1], got {}",
                self.smoothing_alpha
            )));
        }
        if !(MARKER_POINTS..=MAX_RECOVERY_CANDIDATES).contains(&self.recovery_candidates) {
            return Err(ConfigError::Invalid(format!(
                "recovery_candidates must lie in [{MARKER_POINTS}, {MAX_RECOVERY_CANDIDATES}], got {}",
                self.recovery_candidates
            )));
        }
        Ok(())
    }
}

/// Configuration file for the `tooltrack` binary.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackerConfig {
    #[serde(default)]
    pub params: TrackerParams,
    /// Where `replay` writes the JSON report list, if anywhere.
    #[serde(default)]
    pub report_path: Option<String>,
}

impl TrackerConfig {
    /// Load a JSON config from disk and validate its parameters.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.params.validate()?;
        Ok(config)
    }

    /// Write this config to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn report_path(&self) -> Option<PathBuf> {
        self.report_path.as_ref().map(PathBuf::from)
    }
}
