use nalgebra::{Matrix3, Point2, Point3, Vector3};
use serde::{Deserialize, Serialize};

/// Focal length as a fraction of the image width.
pub const DEFAULT_FOCAL_FACTOR: f64 = 0.65;

/// Errors returned when building a camera model.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum CameraError {
    #[error("invalid image dimensions (width={width}, height={height})")]
    InvalidDimensions { width: u32, height: u32 },
    #[error("focal factor must be finite and positive, got {0}")]
    InvalidFocalFactor(f64),
}

/// Undistorted pinhole camera derived from the current image size.
///
/// Rebuilt every frame; `fx == fy > 0`, principal point at the image center.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraModel {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
}

impl CameraModel {
    pub fn from_image_size(width: u32, height: u32, focal_factor: f64) -> Result<Self, CameraError> {
        if width == 0 || height == 0 {
            return Err(CameraError::InvalidDimensions { width, height });
        }
        if !focal_factor.is_finite() || focal_factor <= 0.0 {
            return Err(CameraError::InvalidFocalFactor(focal_factor));
        }
        let f = width as f64 * focal_factor;
        Ok(Self {
            fx: f,
            fy: f,
            cx: width as f64 / 2.0,
            cy: height as f64 / 2.0,
        })
    }

    pub fn k_matrix(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.fx, 0.0, self.cx, //
            0.0, self.fy, self.cy, //
            0.0, 0.0, 1.0,
        )
    }

    /// Distortion coefficients `[k1, k2, p1, p2]`; always zero.
    #[inline]
    pub fn distortion(&self) -> [f64; 4] {
        [0.0; 4]
    }

    /// Project a camera-frame point; `None` when it is not in front of the camera.
    #[inline]
    pub fn project(&self, p: &Point3<f64>) -> Option<Point2<f64>> {
        if p.z <= f64::EPSILON {
            return None;
        }
        Some(Point2::new(
            self.fx * p.x / p.z + self.cx,
            self.fy * p.y / p.z + self.cy,
        ))
    }

    /// Viewing ray through a pixel, scaled so that `z == 1`.
    #[inline]
    pub fn bearing(&self, px: &Point2<f64>) -> Vector3<f64> {
        Vector3::new((px.x - self.cx) / self.fx, (px.y - self.cy) / self.fy, 1.0)
    }
}
