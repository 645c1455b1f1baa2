use nalgebra::{Isometry3, Point2, Point3, Vector3};
use serde::{Deserialize, Serialize};

use crate::{CameraModel, MarkerGeometry, MARKER_POINTS};

/// Rigid marker pose in the camera frame plus the pixel error it was accepted with.
///
/// A pose is only meaningful for the frame that produced it.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    /// Transform from marker-local coordinates into the camera frame.
    pub marker_to_camera: Isometry3<f64>,
    /// Reprojection error against the image points used for the solve (pixels).
    pub reprojection_error: f64,
}

impl Pose {
    /// Marker origin in the camera frame (meters).
    #[inline]
    pub fn position(&self) -> Point3<f64> {
        Point3::from(self.marker_to_camera.translation.vector)
    }

    /// Axis-angle rotation vector (radians).
    #[inline]
    pub fn rotation_vector(&self) -> Vector3<f64> {
        self.marker_to_camera.rotation.scaled_axis()
    }

    /// Pixel positions of the marker points under this pose.
    pub fn project(
        &self,
        geometry: &MarkerGeometry,
        camera: &CameraModel,
    ) -> Option<[Point2<f64>; MARKER_POINTS]> {
        project_marker(&self.marker_to_camera, geometry, camera)
    }
}

pub(crate) fn project_marker(
    iso: &Isometry3<f64>,
    geometry: &MarkerGeometry,
    camera: &CameraModel,
) -> Option<[Point2<f64>; MARKER_POINTS]> {
    let mut out = [Point2::origin(); MARKER_POINTS];
    for (dst, p) in out.iter_mut().zip(geometry.points()) {
        *dst = camera.project(&iso.transform_point(p))?;
    }
    Some(out)
}

/// L2 norm of the stacked pixel residuals over all marker points.
///
/// Returns `None` when any marker point lands behind the camera.
pub fn reprojection_error(
    iso: &Isometry3<f64>,
    geometry: &MarkerGeometry,
    camera: &CameraModel,
    image: &[Point2<f64>; MARKER_POINTS],
) -> Option<f64> {
    let projected = project_marker(iso, geometry, camera)?;
    let sum_sq: f64 = projected
        .iter()
        .zip(image)
        .map(|(p, q)| (p - q).norm_squared())
        .sum();
    Some(sum_sq.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{Translation3, UnitQuaternion};

    #[test]
    fn residual_is_stacked_l2_norm() {
        let cam = CameraModel::from_image_size(1280, 720, 0.65).expect("camera");
        let tool = MarkerGeometry::default();
        let iso = Isometry3::from_parts(
            Translation3::new(0.0, 0.0, 0.5),
            UnitQuaternion::identity(),
        );
        let mut image = project_marker(&iso, &tool, &cam).expect("visible");
        assert_relative_eq!(
            reprojection_error(&iso, &tool, &cam, &image).unwrap(),
            0.0,
            epsilon = 1e-12
        );

        image[0].x += 3.0;
        image[2].y -= 4.0;
        assert_relative_eq!(
            reprojection_error(&iso, &tool, &cam, &image).unwrap(),
            5.0,
            epsilon = 1e-9
        );
    }

    #[test]
    fn behind_camera_has_no_error() {
        let cam = CameraModel::from_image_size(640, 480, 0.65).expect("camera");
        let tool = MarkerGeometry::default();
        let iso = Isometry3::from_parts(
            Translation3::new(0.0, 0.0, -0.5),
            UnitQuaternion::identity(),
        );
        let image = [Point2::origin(); MARKER_POINTS];
        assert!(reprojection_error(&iso, &tool, &cam, &image).is_none());
    }

    #[test]
    fn position_and_rotation_vector() {
        let rot = UnitQuaternion::from_scaled_axis(Vector3::new(0.0, 0.2, 0.0));
        let pose = Pose {
            marker_to_camera: Isometry3::from_parts(Translation3::new(0.1, 0.0, 0.4), rot),
            reprojection_error: 0.0,
        };
        assert_relative_eq!(pose.position(), Point3::new(0.1, 0.0, 0.4));
        assert_relative_eq!(pose.rotation_vector(), Vector3::new(0.0, 0.2, 0.0), epsilon = 1e-12);
    }
}
