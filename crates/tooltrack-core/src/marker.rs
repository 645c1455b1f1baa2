use nalgebra::Point3;
use serde::{Deserialize, Serialize};

/// Number of points on a marker tool.
pub const MARKER_POINTS: usize = 4;

const MIN_SEPARATION: f64 = 1e-6;
const MIN_TRIANGLE_AREA: f64 = 1e-9;

/// Errors returned when a marker geometry is rejected.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    #[error("marker point {index} has non-finite coordinates")]
    NonFinite { index: usize },
    #[error("marker points {a} and {b} coincide")]
    Coincident { a: usize, b: usize },
    #[error("marker points are collinear")]
    Collinear,
}

/// Rigid four-point marker in the tool's local frame (meters).
///
/// The order of the points is the marker index used everywhere else.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "[Point3<f64>; 4]", into = "[Point3<f64>; 4]")]
pub struct MarkerGeometry {
    points: [Point3<f64>; MARKER_POINTS],
}

impl MarkerGeometry {
    pub fn new(points: [Point3<f64>; MARKER_POINTS]) -> Result<Self, GeometryError> {
        for (index, p) in points.iter().enumerate() {
            if !p.coords.iter().all(|v| v.is_finite()) {
                return Err(GeometryError::NonFinite { index });
            }
        }
        for a in 0..MARKER_POINTS {
            for b in (a + 1)..MARKER_POINTS {
                if (points[a] - points[b]).norm() < MIN_SEPARATION {
                    return Err(GeometryError::Coincident { a, b });
                }
            }
        }
        let (_, area) = widest_triangle(&points);
        if area < MIN_TRIANGLE_AREA {
            return Err(GeometryError::Collinear);
        }
        Ok(Self { points })
    }

    #[inline]
    pub fn points(&self) -> &[Point3<f64>; MARKER_POINTS] {
        &self.points
    }

    #[inline]
    pub fn point(&self, index: usize) -> Point3<f64> {
        self.points[index]
    }

    /// Euclidean distance between two marker points.
    #[inline]
    pub fn distance(&self, a: usize, b: usize) -> f64 {
        (self.points[a] - self.points[b]).norm()
    }

    /// Index triple spanning the largest triangle.
    ///
    /// Ties keep the first triple in lexicographic order.
    pub fn widest_triangle(&self) -> [usize; 3] {
        widest_triangle(&self.points).0
    }
}

impl Default for MarkerGeometry {
    /// The four-sphere reference tool.
    fn default() -> Self {
        Self {
            points: [
                Point3::new(0.000, 0.000, 0.000),
                Point3::new(0.074789, 0.000, 0.000),
                Point3::new(0.025217, 0.034311, 0.000),
                Point3::new(0.045238, -0.030790, 0.017880),
            ],
        }
    }
}

impl TryFrom<[Point3<f64>; MARKER_POINTS]> for MarkerGeometry {
    type Error = GeometryError;

    fn try_from(points: [Point3<f64>; MARKER_POINTS]) -> Result<Self, Self::Error> {
        Self::new(points)
    }
}

impl From<MarkerGeometry> for [Point3<f64>; MARKER_POINTS] {
    fn from(geometry: MarkerGeometry) -> Self {
        geometry.points
    }
}

fn triangle_area(a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>) -> f64 {
    0.5 * (b - a).cross(&(c - a)).norm()
}

fn widest_triangle(points: &[Point3<f64>; MARKER_POINTS]) -> ([usize; 3], f64) {
    let mut best = ([0, 1, 2], f64::NEG_INFINITY);
    for i in 0..MARKER_POINTS {
        for j in (i + 1)..MARKER_POINTS {
            for k in (j + 1)..MARKER_POINTS {
                let area = triangle_area(&points[i], &points[j], &points[k]);
                if area > best.1 {
                    best = ([i, j, k], area);
                }
            }
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_tool_is_valid() {
        let tool = MarkerGeometry::default();
        assert!(MarkerGeometry::new(*tool.points()).is_ok());
        assert!((tool.distance(0, 1) - 0.074789).abs() < 1e-12);
    }

    #[test]
    fn rejects_degenerate_layouts() {
        let coincident = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(0.0, 0.0, 1.0),
        ];
        assert_eq!(
            MarkerGeometry::new(coincident),
            Err(GeometryError::Coincident { a: 0, b: 1 })
        );

        let collinear = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(0.1, 0.0, 0.0),
            Point3::new(0.2, 0.0, 0.0),
            Point3::new(0.3, 0.0, 0.0),
        ];
        assert_eq!(
            MarkerGeometry::new(collinear),
            Err(GeometryError::Collinear)
        );

        let planar = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(0.1, 0.0, 0.0),
            Point3::new(0.0, 0.1, 0.0),
            Point3::new(0.1, 0.1, 0.0),
        ];
        assert!(MarkerGeometry::new(planar).is_ok());

        let nan = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(f64::NAN, 0.0, 0.0),
            Point3::new(0.0, 0.1, 0.0),
            Point3::new(0.0, 0.0, 0.1),
        ];
        assert_eq!(
            MarkerGeometry::new(nan),
            Err(GeometryError::NonFinite { index: 1 })
        );
    }

    #[test]
    fn widest_triangle_of_reference_tool() {
        let tool = MarkerGeometry::default();
        let [i, j, k] = tool.widest_triangle();
        let best = triangle_area(&tool.point(i), &tool.point(j), &tool.point(k));
        for (a, b, c) in [(0, 1, 2), (0, 1, 3), (0, 2, 3), (1, 2, 3)] {
            assert!(best >= triangle_area(&tool.point(a), &tool.point(b), &tool.point(c)));
        }
    }

    #[test]
    fn serde_revalidates() {
        let json = serde_json::to_string(&MarkerGeometry::default()).expect("serialize");
        let back: MarkerGeometry = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, MarkerGeometry::default());

        let collinear = "[[0,0,0],[1,0,0],[2,0,0],[3,0,0]]";
        assert!(serde_json::from_str::<MarkerGeometry>(collinear).is_err());
        let planar = "[[0,0,0],[1,0,0],[0,1,0],[1,1,0]]";
        assert!(serde_json::from_str::<MarkerGeometry>(planar).is_ok());
    }
}
