//! Detector adapter contract.
//!
//! The tracker never sees detector boxes: a [`DetectionSet`] is the ordered
//! list of box centers that passed the confidence threshold.

use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use crate::TrackError;

/// One detector box `[x0, y0, x1, y1]` (pixels) with its confidence.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    pub bbox: [f64; 4],
    pub confidence: f64,
}

impl RawDetection {
    /// Build a square box of side `size` centered on `center`.
    pub fn centered(center: Point2<f64>, size: f64, confidence: f64) -> Self {
        let h = size / 2.0;
        Self {
            bbox: [center.x - h, center.y - h, center.x + h, center.y + h],
            confidence,
        }
    }

    #[inline]
    pub fn center(&self) -> Point2<f64> {
        let [x0, y0, x1, y1] = self.bbox;
        Point2::new((x0 + x1) / 2.0, (y0 + y1) / 2.0)
    }
}

/// Candidate marker points for one frame, in detector emission order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DetectionSet {
    points: Vec<Point2<f64>>,
}

impl DetectionSet {
    pub fn from_points(points: Vec<Point2<f64>>) -> Result<Self, TrackError> {
        if let Some(index) = points
            .iter()
            .position(|p| !p.x.is_finite() || !p.y.is_finite())
        {
            return Err(TrackError::MalformedDetection { index });
        }
        Ok(Self { points })
    }

    /// Keep boxes with `confidence >= min_confidence` and reduce them to centers.
    pub fn from_raw(raw: &[RawDetection], min_confidence: f64) -> Result<Self, TrackError> {
        Self::from_points(
            raw.iter()
                .filter(|d| d.confidence >= min_confidence)
                .map(RawDetection::center)
                .collect(),
        )
    }

    #[inline]
    pub fn points(&self) -> &[Point2<f64>] {
        &self.points
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// A frame with known pixel dimensions.
pub trait ImageFrame {
    fn dimensions(&self) -> (u32, u32);
}

/// Capture source; `Ok(None)` marks the end of the stream.
pub trait FrameSource {
    type Frame: ImageFrame;

    fn next_frame(&mut self) -> Result<Option<Self::Frame>, TrackError>;
}

/// Point detector, called exactly once per frame.
pub trait DetectorAdapter<F> {
    fn detect(&mut self, frame: &F) -> Result<DetectionSet, TrackError>;
}

impl<F, T> DetectorAdapter<F> for T
where
    T: FnMut(&F) -> Result<DetectionSet, TrackError>,
{
    fn detect(&mut self, frame: &F) -> Result<DetectionSet, TrackError> {
        self(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filters_by_confidence_and_keeps_order() {
        let raw = [
            RawDetection::centered(Point2::new(10.0, 20.0), 8.0, 0.9),
            RawDetection::centered(Point2::new(30.0, 40.0), 8.0, 0.39),
            RawDetection::centered(Point2::new(50.0, 60.0), 8.0, 0.4),
        ];
        let set = DetectionSet::from_raw(&raw, 0.4).expect("valid");
        assert_eq!(
            set.points(),
            &[Point2::new(10.0, 20.0), Point2::new(50.0, 60.0)]
        );
    }

    #[test]
    fn non_finite_points_are_malformed() {
        let err = DetectionSet::from_points(vec![Point2::new(1.0, 1.0), Point2::new(f64::NAN, 0.0)])
            .unwrap_err();
        assert!(matches!(err, TrackError::MalformedDetection { index: 1 }));
    }

    #[test]
    fn box_center() {
        let d = RawDetection {
            bbox: [10.0, 4.0, 14.0, 10.0],
            confidence: 1.0,
        };
        assert_eq!(d.center(), Point2::new(12.0, 7.0));
    }
}
