//! Tracking state carried from frame to frame.

use log::{debug, info, warn};
use nalgebra::Point3;
use serde::{Deserialize, Serialize};
use tooltrack_core::{CameraModel, MarkerGeometry, Pose};

use crate::correspondence::{resolve_fast, resolve_recovery};
use crate::{Correspondence, DetectionSet, ResolveFailure, SmoothedPointCache, TrackerParams};

/// Whether the last frame produced a pose to predict from.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum TrackingMode {
    #[default]
    Searching,
    Tracking {
        pose: Pose,
        smoothed: SmoothedPointCache,
    },
}

impl TrackingMode {
    #[inline]
    pub fn is_tracking(&self) -> bool {
        matches!(self, Self::Tracking { .. })
    }
}

/// Baseline for reported displacement; camera-frame x and z in meters.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ZeroReference {
    pub x: f64,
    pub z: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionPath {
    Fast,
    Recovery,
}

/// Result of one frame: a validated pose, or the reason there is none.
#[derive(Clone, Debug, PartialEq)]
pub enum FrameOutcome {
    Pose {
        pose: Pose,
        correspondence: Correspondence,
        path: ResolutionPath,
    },
    NoPose {
        /// Why recovery (the last path tried) failed.
        failure: ResolveFailure,
        /// Set when the fast path was tried first and failed.
        fast_path_failure: Option<ResolveFailure>,
    },
}

impl FrameOutcome {
    pub fn pose(&self) -> Option<&Pose> {
        match self {
            Self::Pose { pose, .. } => Some(pose),
            Self::NoPose { .. } => None,
        }
    }
}

/// Owned tracker state, threaded through [`TrackingSession::step`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TrackingSession {
    mode: TrackingMode,
    last_position: Option<Point3<f64>>,
    zero_reference: Option<ZeroReference>,
}

impl TrackingSession {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn mode(&self) -> &TrackingMode {
        &self.mode
    }

    /// Most recent valid marker position; survives frames without a pose.
    #[inline]
    pub fn last_position(&self) -> Option<Point3<f64>> {
        self.last_position
    }

    #[inline]
    pub fn zero_reference(&self) -> Option<ZeroReference> {
        self.zero_reference
    }

    /// Capture the last valid position as the zero reference.
    ///
    /// Overwrites any previous reference. Returns `None` when no pose has
    /// been produced yet.
    pub fn set_zero_reference(&mut self) -> Option<ZeroReference> {
        let Some(p) = self.last_position else {
            warn!("zero trigger ignored: no valid position yet");
            return None;
        };
        let zero = ZeroReference { x: p.x, z: p.z };
        info!("zero reference set at x={:.4} m, z={:.4} m", zero.x, zero.z);
        self.zero_reference = Some(zero);
        Some(zero)
    }

    pub fn clear_zero_reference(&mut self) {
        self.zero_reference = None;
    }

    /// Resolve one frame and return the next session state.
    ///
    /// While tracking, the fast path runs first; if it fails, recovery runs
    /// in the same frame and its result decides the outcome.
    pub fn step(
        mut self,
        detections: &DetectionSet,
        camera: &CameraModel,
        geometry: &MarkerGeometry,
        params: &TrackerParams,
    ) -> (Self, FrameOutcome) {
        let mut fast_path_failure = None;
        if let TrackingMode::Tracking { pose, smoothed } = self.mode {
            match resolve_fast(detections, geometry, camera, &pose, &smoothed, params) {
                Ok(fast) => {
                    self.commit(fast.pose, fast.smoothed);
                    let outcome = FrameOutcome::Pose {
                        pose: fast.pose,
                        correspondence: fast.correspondence,
                        path: ResolutionPath::Fast,
                    };
                    return (self, outcome);
                }
                Err(failure) => {
                    debug!("fast path failed: {failure}");
                    fast_path_failure = Some(failure);
                }
            }
        }

        match resolve_recovery(detections, geometry, camera, params) {
            Ok(rec) => {
                if !self.mode.is_tracking() {
                    info!(
                        "tracking acquired (reprojection {:.2} px)",
                        rec.pose.reprojection_error
                    );
                }
                let smoothed = SmoothedPointCache::from_raw(*rec.correspondence.points());
                self.commit(rec.pose, smoothed);
                let outcome = FrameOutcome::Pose {
                    pose: rec.pose,
                    correspondence: rec.correspondence,
                    path: ResolutionPath::Recovery,
                };
                (self, outcome)
            }
            Err(failure) => {
                if self.mode.is_tracking() {
                    info!("tracking lost: {failure}");
                } else {
                    debug!("searching: {failure}");
                }
                self.mode = TrackingMode::Searching;
                let outcome = FrameOutcome::NoPose {
                    failure,
                    fast_path_failure,
                };
                (self, outcome)
            }
        }
    }

    fn commit(&mut self, pose: Pose, smoothed: SmoothedPointCache) {
        self.last_position = Some(pose.position());
        self.mode = TrackingMode::Tracking { pose, smoothed };
    }
}
