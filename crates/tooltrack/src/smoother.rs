use nalgebra::Point2;
use tooltrack_core::MARKER_POINTS;

/// Exponential moving average of the matched image point for each marker index.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SmoothedPointCache([Point2<f64>; MARKER_POINTS]);

impl SmoothedPointCache {
    /// Reset the cache to raw observations.
    #[inline]
    pub fn from_raw(points: [Point2<f64>; MARKER_POINTS]) -> Self {
        Self(points)
    }

    /// `old * (1 - alpha) + raw * alpha`, per marker index.
    pub fn blended(&self, raw: &[Point2<f64>; MARKER_POINTS], alpha: f64) -> Self {
        let mut out = self.0;
        for (dst, new) in out.iter_mut().zip(raw) {
            *dst = Point2::from(dst.coords * (1.0 - alpha) + new.coords * alpha);
        }
        Self(out)
    }

    #[inline]
    pub fn points(&self) -> &[Point2<f64>; MARKER_POINTS] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn half_weight_blend() {
        let cache = SmoothedPointCache::from_raw([Point2::new(0.0, 0.0); MARKER_POINTS]);
        let raw = [Point2::new(10.0, -4.0); MARKER_POINTS];
        let once = cache.blended(&raw, 0.5);
        assert_relative_eq!(once.points()[2], Point2::new(5.0, -2.0));
        let twice = once.blended(&raw, 0.5);
        assert_relative_eq!(twice.points()[0], Point2::new(7.5, -3.0));
        // `blended` leaves the receiver unchanged.
        assert_eq!(cache.points()[0], Point2::origin());
    }

    #[test]
    fn alpha_one_tracks_raw() {
        let cache = SmoothedPointCache::from_raw([Point2::new(3.0, 3.0); MARKER_POINTS]);
        let raw = [
            Point2::new(1.0, 2.0),
            Point2::new(3.0, 4.0),
            Point2::new(5.0, 6.0),
            Point2::new(7.0, 8.0),
        ];
        assert_eq!(cache.blended(&raw, 1.0).points(), &raw);
    }
}
