//! Per-frame metrics and the report emitted for each frame.
//!
//! Metrics are a pure read of the frame outcome and the previous session
//! state; nothing here feeds back into tracking.

use std::time::Duration;

use nalgebra::Point3;
use serde::{Deserialize, Serialize};

use crate::{FrameOutcome, ResolutionPath, ZeroReference};

/// Lower bound on the frame duration used for the frame rate (seconds).
pub const MIN_FRAME_SECONDS: f64 = 1e-5;

/// Console table header matching [`FrameReport::table_row`].
pub const TABLE_HEADER: &str =
    "FPS   | LAT(ms)  | DET(ms)  | JITTER   | POS_X(m)   | POS_Z(m)   | MOVED_X(mm)  | MOVED_Z(mm)";

/// Wall-clock durations measured by the frame loop.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FrameTiming {
    /// Whole frame, capture to metrics.
    pub total: Duration,
    /// Detector call only.
    pub detector: Duration,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PoseMetrics {
    /// Marker origin in the camera frame (meters).
    pub position: Point3<f64>,
    /// Distance to the previous valid position (millimeters).
    pub jitter_mm: Option<f64>,
    /// `(x, z)` offset from the zero reference (millimeters).
    pub displacement_mm: [f64; 2],
    pub reprojection_error_px: f64,
    pub path: ResolutionPath,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FrameMetrics {
    pub fps: f64,
    pub latency_ms: f64,
    pub detector_ms: f64,
    pub pose: Option<PoseMetrics>,
}

impl FrameMetrics {
    /// `previous_position` is the last valid position before this frame.
    pub fn compute(
        timing: &FrameTiming,
        outcome: &FrameOutcome,
        previous_position: Option<Point3<f64>>,
        zero: Option<ZeroReference>,
    ) -> Self {
        let total_s = timing.total.as_secs_f64();
        let pose = match outcome {
            FrameOutcome::Pose { pose, path, .. } => {
                let position = pose.position();
                let jitter_mm = previous_position.map(|prev| (position - prev).norm() * 1000.0);
                let displacement_mm = zero.map_or([0.0, 0.0], |z| {
                    [(position.x - z.x) * 1000.0, (position.z - z.z) * 1000.0]
                });
                Some(PoseMetrics {
                    position,
                    jitter_mm,
                    displacement_mm,
                    reprojection_error_px: pose.reprojection_error,
                    path: *path,
                })
            }
            FrameOutcome::NoPose { .. } => None,
        };
        Self {
            fps: 1.0 / total_s.max(MIN_FRAME_SECONDS),
            latency_ms: total_s * 1000.0,
            detector_ms: timing.detector.as_secs_f64() * 1000.0,
            pose,
        }
    }

    pub fn report(&self, frame: u64) -> FrameReport {
        match self.pose {
            Some(p) => FrameReport::Pose {
                frame,
                fps: self.fps,
                latency_ms: self.latency_ms,
                detector_ms: self.detector_ms,
                jitter_mm: p.jitter_mm,
                x_m: p.position.x,
                y_m: p.position.y,
                z_m: p.position.z,
                moved_x_mm: p.displacement_mm[0],
                moved_z_mm: p.displacement_mm[1],
                reprojection_error_px: p.reprojection_error_px,
                path: p.path,
            },
            None => FrameReport::NoPose {
                frame,
                fps: self.fps,
                latency_ms: self.latency_ms,
                detector_ms: self.detector_ms,
            },
        }
    }
}

/// Per-frame output, tagged by `status`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FrameReport {
    Pose {
        frame: u64,
        fps: f64,
        latency_ms: f64,
        detector_ms: f64,
        jitter_mm: Option<f64>,
        x_m: f64,
        y_m: f64,
        z_m: f64,
        moved_x_mm: f64,
        moved_z_mm: f64,
        reprojection_error_px: f64,
        path: ResolutionPath,
    },
    NoPose {
        frame: u64,
        fps: f64,
        latency_ms: f64,
        detector_ms: f64,
    },
}

impl FrameReport {
    pub fn frame(&self) -> u64 {
        match self {
            Self::Pose { frame, .. } | Self::NoPose { frame, .. } => *frame,
        }
    }

    pub fn has_pose(&self) -> bool {
        matches!(self, Self::Pose { .. })
    }

    /// One fixed-width row under [`TABLE_HEADER`].
    pub fn table_row(&self) -> String {
        match self {
            Self::Pose {
                fps,
                latency_ms,
                detector_ms,
                jitter_mm,
                x_m,
                z_m,
                moved_x_mm,
                moved_z_mm,
                ..
            } => {
                let jitter = jitter_mm.map_or_else(|| "---".to_string(), |j| format!("{j:.2}"));
                format!(
                    "{:<5} | {:<8.1} | {:<8.1} | {:<8} | {:<10.4} | {:<10.4} | {:<12.2} | {:<12.2}",
                    *fps as u64, latency_ms, detector_ms, jitter, x_m, z_m, moved_x_mm, moved_z_mm
                )
            }
            Self::NoPose {
                fps,
                latency_ms,
                detector_ms,
                ..
            } => format!(
                "{:<5} | {:<8.1} | {:<8.1} | {:<8} | {:<10} | {:<10} | {:<12} | {:<12}",
                *fps as u64, latency_ms, detector_ms, "---", "---", "---", "---", "---"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Correspondence, DetectionSet, ResolveFailure};
    use approx::assert_relative_eq;
    use nalgebra::{Isometry3, Point2, Vector3};
    use tooltrack_core::Pose;

    fn outcome_at(x: f64, z: f64) -> FrameOutcome {
        let d = DetectionSet::from_points(vec![Point2::origin(); 4]).expect("finite");
        let correspondence = Correspondence::new([0, 1, 2, 3], &d).expect("injective");
        FrameOutcome::Pose {
            pose: Pose {
                marker_to_camera: Isometry3::new(Vector3::new(x, 0.01, z), Vector3::zeros()),
                reprojection_error: 0.5,
            },
            correspondence,
            path: ResolutionPath::Fast,
        }
    }

    fn timing(total_ms: u64, detector_ms: u64) -> FrameTiming {
        FrameTiming {
            total: Duration::from_millis(total_ms),
            detector: Duration::from_millis(detector_ms),
        }
    }

    #[test]
    fn timing_fields() {
        let m = FrameMetrics::compute(
            &timing(40, 25),
            &FrameOutcome::NoPose {
                failure: ResolveFailure::InsufficientDetections { found: 0 },
                fast_path_failure: None,
            },
            None,
            None,
        );
        assert_relative_eq!(m.fps, 25.0, epsilon = 1e-9);
        assert_relative_eq!(m.latency_ms, 40.0, epsilon = 1e-9);
        assert_relative_eq!(m.detector_ms, 25.0, epsilon = 1e-9);
        assert!(m.pose.is_none());

        let instant = FrameMetrics::compute(&timing(0, 0), &outcome_at(0.0, 0.5), None, None);
        assert_relative_eq!(instant.fps, 1.0 / MIN_FRAME_SECONDS);
    }

    #[test]
    fn jitter_and_displacement() {
        let first = FrameMetrics::compute(&timing(10, 5), &outcome_at(0.1, 0.5), None, None)
            .pose
            .expect("pose");
        assert_eq!(first.jitter_mm, None);
        assert_eq!(first.displacement_mm, [0.0, 0.0]);

        let zero = ZeroReference { x: 0.1, z: 0.5 };
        let next = FrameMetrics::compute(
            &timing(10, 5),
            &outcome_at(0.103, 0.496),
            Some(Point3::new(0.1, 0.01, 0.5)),
            Some(zero),
        )
        .pose
        .expect("pose");
        assert_relative_eq!(next.jitter_mm.expect("jitter"), 5.0, epsilon = 1e-9);
        assert_relative_eq!(next.displacement_mm[0], 3.0, epsilon = 1e-9);
        assert_relative_eq!(next.displacement_mm[1], -4.0, epsilon = 1e-9);
    }

    #[test]
    fn report_is_tagged_and_tabulated() {
        let m = FrameMetrics::compute(&timing(20, 10), &outcome_at(0.1, 0.5), None, None);
        let report = m.report(7);
        let json = serde_json::to_value(&report).expect("json");
        assert_eq!(json["status"], "pose");
        assert_eq!(json["frame"], 7);
        assert_eq!(json["path"], "fast");
        let back: FrameReport = serde_json::from_value(json).expect("round trip");
        assert_eq!(back, report);

        let row = report.table_row();
        assert_eq!(row.split('|').count(), TABLE_HEADER.split('|').count());
        assert!(row.starts_with("50 "));
        assert!(row.contains("0.1000"));

        let none = FrameReport::NoPose {
            frame: 8,
            fps: 30.0,
            latency_ms: 33.3,
            detector_ms: 20.0,
        };
        assert_eq!(serde_json::to_value(&none).expect("json")["status"], "no_pose");
        assert!(none.table_row().contains("---"));
        assert!(!none.has_pose());
    }
}
