//! Marker-to-detection assignment.
//!
//! Two strategies share the same output:
//! - the fast path predicts where the marker points should be from the last
//!   pose and takes the nearest unused detection for each, under a pixel gate;
//! - the recovery path tries every ordering of the leading detections and
//!   keeps the one whose pose reprojects best.
//!
//! Both validate the solved pose against the acceptance threshold.

use log::debug;
use nalgebra::Point2;
use tooltrack_core::{solve_pose, CameraModel, MarkerGeometry, PnpError, Pose, MARKER_POINTS};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::params::MAX_RECOVERY_CANDIDATES;
use crate::{DetectionSet, ResolveFailure, SmoothedPointCache, TrackerParams};

/// Complete, injective assignment of marker indices to detections.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Correspondence {
    indices: [usize; MARKER_POINTS],
    points: [Point2<f64>; MARKER_POINTS],
}

impl Correspondence {
    /// `indices[m]` is the detection assigned to marker point `m`.
    ///
    /// `None` when an index is out of range or two marker points share a detection.
    pub fn new(indices: [usize; MARKER_POINTS], detections: &DetectionSet) -> Option<Self> {
        let all = detections.points();
        for (i, &a) in indices.iter().enumerate() {
            if a >= all.len() || indices[..i].contains(&a) {
                return None;
            }
        }
        Some(Self {
            indices,
            points: indices.map(|j| all[j]),
        })
    }

    #[inline]
    pub fn indices(&self) -> &[usize; MARKER_POINTS] {
        &self.indices
    }

    /// Raw detected points, in marker order.
    #[inline]
    pub fn points(&self) -> &[Point2<f64>; MARKER_POINTS] {
        &self.points
    }
}

/// Output of an accepted fast-path frame.
///
/// `smoothed` is the candidate cache; the session commits it together with the pose.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FastResolution {
    pub pose: Pose,
    pub correspondence: Correspondence,
    pub smoothed: SmoothedPointCache,
}

/// Output of an accepted recovery-path frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RecoveryResolution {
    pub pose: Pose,
    pub correspondence: Correspondence,
}

/// Greedy nearest-neighbour matching in marker order.
///
/// Detections are scanned in emission order and the first of equally near
/// candidates wins. Any marker point without an unused detection within
/// `gate_px` fails the whole match.
pub fn match_predicted(
    predicted: &[Point2<f64>; MARKER_POINTS],
    detections: &DetectionSet,
    gate_px: f64,
) -> Result<Correspondence, ResolveFailure> {
    let found = detections.len();
    if found < MARKER_POINTS {
        return Err(ResolveFailure::InsufficientDetections { found });
    }

    let mut used = vec![false; found];
    let mut indices = [0usize; MARKER_POINTS];
    for (index, pred) in predicted.iter().enumerate() {
        let mut best: Option<(usize, f64)> = None;
        for (j, p) in detections.points().iter().enumerate() {
            if used[j] {
                continue;
            }
            let d = (p - pred).norm();
            if best.is_none_or(|(_, best_d)| d < best_d) {
                best = Some((j, d));
            }
        }
        let Some((j, distance_px)) = best else {
            return Err(ResolveFailure::InsufficientDetections { found });
        };
        if distance_px > gate_px {
            return Err(ResolveFailure::GatingFailure {
                index,
                distance_px,
                gate_px,
            });
        }
        used[j] = true;
        indices[index] = j;
    }

    Correspondence::new(indices, detections).ok_or(ResolveFailure::InsufficientDetections { found })
}

/// Track from the previous pose: predict, gate, smooth, solve, validate.
pub fn resolve_fast(
    detections: &DetectionSet,
    geometry: &MarkerGeometry,
    camera: &CameraModel,
    last_pose: &Pose,
    cache: &SmoothedPointCache,
    params: &TrackerParams,
) -> Result<FastResolution, ResolveFailure> {
    let gate_px = params.gate_threshold_px;
    let mut predicted = [Point2::origin(); MARKER_POINTS];
    for (index, (dst, p)) in predicted.iter_mut().zip(geometry.points()).enumerate() {
        *dst = camera
            .project(&last_pose.marker_to_camera.transform_point(p))
            .ok_or(ResolveFailure::GatingFailure {
                index,
                distance_px: f64::INFINITY,
                gate_px,
            })?;
    }

    let correspondence = match_predicted(&predicted, detections, gate_px)?;
    let smoothed = cache.blended(correspondence.points(), params.smoothing_alpha);
    let pose = solve_pose(geometry, smoothed.points(), camera)?;
    validate(&pose, params.acceptance_threshold_px)?;

    Ok(FastResolution {
        pose,
        correspondence,
        smoothed,
    })
}

/// Exhaustive search over orderings of the leading detections.
///
/// Orderings are visited in lexicographic order and only a strictly lower
/// error replaces the current best. Orderings whose solve fails are skipped.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip_all, fields(detections = detections.len()))
)]
pub fn resolve_recovery(
    detections: &DetectionSet,
    geometry: &MarkerGeometry,
    camera: &CameraModel,
    params: &TrackerParams,
) -> Result<RecoveryResolution, ResolveFailure> {
    let found = detections.len();
    if found < MARKER_POINTS {
        return Err(ResolveFailure::InsufficientDetections { found });
    }
    let pool = found.min(
        params
            .recovery_candidates
            .clamp(MARKER_POINTS, MAX_RECOVERY_CANDIDATES),
    );
    if found > pool {
        debug!("recovery ignores {} of {found} detections", found - pool);
    }

    let mut best: Option<RecoveryResolution> = None;
    let mut first_error: Option<PnpError> = None;
    for indices in orderings(pool) {
        let Some(correspondence) = Correspondence::new(indices, detections) else {
            continue;
        };
        match solve_pose(geometry, correspondence.points(), camera) {
            Ok(pose) => {
                if best.is_none_or(|b| pose.reprojection_error < b.pose.reprojection_error) {
                    best = Some(RecoveryResolution {
                        pose,
                        correspondence,
                    });
                }
            }
            Err(err) => {
                first_error.get_or_insert(err);
            }
        }
    }

    let Some(best) = best else {
        return Err(ResolveFailure::SolveFailure(
            first_error.unwrap_or(PnpError::NoRealSolution),
        ));
    };
    validate(&best.pose, params.acceptance_threshold_px)?;
    debug!(
        "recovered ordering {:?} at {:.3} px",
        best.correspondence.indices(),
        best.pose.reprojection_error
    );
    Ok(best)
}

fn validate(pose: &Pose, threshold_px: f64) -> Result<(), ResolveFailure> {
    if pose.reprojection_error < threshold_px {
        Ok(())
    } else {
        Err(ResolveFailure::ValidationFailure {
            error_px: pose.reprojection_error,
            threshold_px,
        })
    }
}

/// Ordered selections of four distinct indices from `0..pool`, lexicographic.
///
/// Yields lazily; the caller decides how far to walk.
fn orderings(pool: usize) -> impl Iterator<Item = [usize; MARKER_POINTS]> {
    (0..pool).flat_map(move |a| {
        (0..pool).filter(move |&b| b != a).flat_map(move |b| {
            (0..pool)
                .filter(move |&c| c != a && c != b)
                .flat_map(move |c| {
                    (0..pool)
                        .filter(move |&d| d != a && d != b && d != c)
                        .map(move |d| [a, b, c, d])
                })
        })
    })
}
