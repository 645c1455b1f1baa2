//! Synthetic detector output: the marker projected under known poses.

use nalgebra::{Isometry3, Vector3};
use tooltrack_core::{CameraError, CameraModel, MarkerGeometry, DEFAULT_FOCAL_FACTOR};

use crate::{RawDetection, RecordedFrame, Recording};

/// Camera plus marker, rendering one detector box per visible marker point.
#[derive(Clone, Debug, PartialEq)]
pub struct SyntheticScene {
    pub image_width: u32,
    pub image_height: u32,
    pub camera: CameraModel,
    pub geometry: MarkerGeometry,
    pub box_size_px: f64,
    pub confidence: f64,
}

impl SyntheticScene {
    pub fn new(
        image_width: u32,
        image_height: u32,
        geometry: MarkerGeometry,
    ) -> Result<Self, CameraError> {
        Ok(Self {
            image_width,
            image_height,
            camera: CameraModel::from_image_size(image_width, image_height, DEFAULT_FOCAL_FACTOR)?,
            geometry,
            box_size_px: 12.0,
            confidence: 0.9,
        })
    }

    /// Tool half a meter in front of the camera, slightly tilted.
    pub fn default_pose() -> Isometry3<f64> {
        Isometry3::new(Vector3::new(0.0, 0.0, 0.5), Vector3::new(0.25, -0.15, 0.05))
    }

    /// Boxes in marker order; empty when any point is behind the camera.
    pub fn detections(&self, pose: &Isometry3<f64>) -> Vec<RawDetection> {
        self.geometry
            .points()
            .iter()
            .map(|p| self.camera.project(&pose.transform_point(p)))
            .collect::<Option<Vec<_>>>()
            .map(|centers| {
                centers
                    .into_iter()
                    .map(|c| RawDetection::centered(c, self.box_size_px, self.confidence))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn frame(&self, pose: &Isometry3<f64>) -> RecordedFrame {
        RecordedFrame {
            detections: self.detections(pose),
            zero: false,
        }
    }

    pub fn recording<I>(&self, poses: I) -> Recording
    where
        I: IntoIterator<Item = Isometry3<f64>>,
    {
        Recording {
            image_width: self.image_width,
            image_height: self.image_height,
            frames: poses.into_iter().map(|pose| self.frame(&pose)).collect(),
        }
    }

    /// `frames` poses moving `step_mm` along camera x per frame from [`Self::default_pose`].
    pub fn translating_x(&self, frames: usize, step_mm: f64) -> Recording {
        let start = Self::default_pose();
        self.recording((0..frames).map(|i| {
            let mut pose = start;
            pose.translation.vector.x += i as f64 * step_mm / 1000.0;
            pose
        }))
    }
}
