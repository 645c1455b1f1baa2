//! Four-point perspective-n-point solver.
//!
//! The solve is minimal and deterministic, it needs no initial guess:
//! - closed-form P3P on the widest model triangle gives up to four candidates,
//! - the fourth correspondence picks the candidate with the lowest reprojection error,
//! - a few Gauss-Newton steps on the EPnP depth kernel polish the winner.
//!
//! With exactly four correspondences the EPnP control-point system reduces to
//! one unknown depth per point along its viewing ray, constrained by the six
//! model distances. The polish works directly on those four depths.

use nalgebra::{
    DMatrix, Isometry3, Matrix3, Matrix4, Point2, Point3, Rotation3, Translation3, UnitQuaternion,
    Vector3, Vector4,
};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::pose::reprojection_error;
use crate::{CameraModel, MarkerGeometry, Pose, MARKER_POINTS};

const PAIRS: [(usize, usize); 6] = [(0, 1), (0, 2), (0, 3), (1, 2), (1, 3), (2, 3)];
const POLISH_ITERATIONS: usize = 5;
const ROOT_IMAG_TOL: f64 = 1e-6;
const PARALLEL_RAY_TOL: f64 = 1e-12;

/// Reasons a pose could not be computed for one set of correspondences.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum PnpError {
    #[error("image points are not finite")]
    NonFinite,
    #[error("viewing rays {a} and {b} are parallel")]
    DegenerateImage { a: usize, b: usize },
    #[error("no real P3P solution")]
    NoRealSolution,
    #[error("every candidate places the marker behind the camera")]
    BehindCamera,
    #[error("rigid alignment failed")]
    Alignment,
}

/// Solve the marker pose from four ordered image points.
///
/// `image[i]` must be the observation of `geometry.point(i)`. The returned
/// pose carries the raw reprojection error; acceptance is up to the caller.
#[cfg_attr(feature = "tracing", instrument(level = "trace", skip_all))]
pub fn solve_pose(
    geometry: &MarkerGeometry,
    image: &[Point2<f64>; MARKER_POINTS],
    camera: &CameraModel,
) -> Result<Pose, PnpError> {
    if image.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()) {
        return Err(PnpError::NonFinite);
    }
    let rays = image.map(|p| camera.bearing(&p));
    let triangle = geometry.widest_triangle();
    let candidates = p3p(geometry, &rays, triangle)?;

    let model = triangle.map(|i| geometry.point(i));
    let mut best: Option<(Isometry3<f64>, f64)> = None;
    let mut any_aligned = false;
    for camera_points in &candidates {
        let Ok(iso) = pose_from_points(&model, camera_points) else {
            continue;
        };
        any_aligned = true;
        let Some(err) = reprojection_error(&iso, geometry, camera, image) else {
            continue;
        };
        if best.is_none_or(|(_, best_err)| err < best_err) {
            best = Some((iso, err));
        }
    }
    let Some((iso, err)) = best else {
        return Err(if any_aligned {
            PnpError::BehindCamera
        } else {
            PnpError::Alignment
        });
    };

    let (iso, err) = polish(geometry, camera, image, &rays, iso, err);
    Ok(Pose {
        marker_to_camera: iso,
        reprojection_error: err,
    })
}

/// Rigid transform mapping `model` points onto `camera` points (Kabsch).
///
/// Reflections are corrected, so the result is always a proper rotation.
pub fn pose_from_points(
    model: &[Point3<f64>],
    camera: &[Point3<f64>],
) -> Result<Isometry3<f64>, PnpError> {
    if model.len() != camera.len() || model.len() < 3 {
        return Err(PnpError::Alignment);
    }

    let n = model.len() as f64;
    let c_m = model.iter().fold(Vector3::zeros(), |acc, p| acc + p.coords) / n;
    let c_c = camera.iter().fold(Vector3::zeros(), |acc, p| acc + p.coords) / n;

    let mut h = Matrix3::zeros();
    for (pm, pc) in model.iter().zip(camera) {
        h += (pc.coords - c_c) * (pm.coords - c_m).transpose();
    }

    let svd = h.svd(true, true);
    let u = svd.u.ok_or(PnpError::Alignment)?;
    let v_t = svd.v_t.ok_or(PnpError::Alignment)?;
    let mut r = u * v_t;
    if r.determinant() < 0.0 {
        let mut u_fix = u;
        u_fix.column_mut(2).neg_mut();
        r = u_fix * v_t;
    }
    if !r.iter().all(|v| v.is_finite()) {
        return Err(PnpError::Alignment);
    }

    let t = c_c - r * c_m;
    let rot = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(r));
    Ok(Isometry3::from_parts(Translation3::from(t), rot))
}

/// Camera-frame positions of the triangle's points, one entry per real P3P root.
fn p3p(
    geometry: &MarkerGeometry,
    rays: &[Vector3<f64>; MARKER_POINTS],
    [i, j, k]: [usize; 3],
) -> Result<Vec<[Point3<f64>; 3]>, PnpError> {
    let b1 = rays[i].normalize();
    let b2 = rays[j].normalize();
    let b3 = rays[k].normalize();

    let cos_a = b2.dot(&b3);
    let cos_b = b1.dot(&b3);
    let cos_g = b1.dot(&b2);
    for (cos, a, b) in [(cos_g, i, j), (cos_b, i, k), (cos_a, j, k)] {
        if 1.0 - cos < PARALLEL_RAY_TOL {
            return Err(PnpError::DegenerateImage { a, b });
        }
    }

    let a2 = geometry.distance(j, k).powi(2);
    let b2_len = geometry.distance(i, k).powi(2);
    let c2 = geometry.distance(i, j).powi(2);

    // Depth ratios u = s2/s1, v = s3/s1. Eliminating u between the three
    // law-of-cosines constraints leaves u = N(v)/D(v) and a quartic in v.
    let ac = a2 - c2;
    let r = c2 / b2_len;
    let q = [1.0, -2.0 * cos_b, 1.0];
    let n = [ac + b2_len, -2.0 * cos_b * ac, ac - b2_len];
    let d = [2.0 * b2_len * cos_g, -2.0 * b2_len * cos_a];
    let e = [1.0 - r, 2.0 * r * cos_b, -r];

    let nn = poly_mul(&n, &n);
    let nd = poly_mul(&n, &d);
    let dd = poly_mul(&d, &d);
    let edd = poly_mul(&e, &dd);
    let mut quartic = [0.0; 5];
    for (deg, c) in quartic.iter_mut().enumerate() {
        *c = coeff(&nn, deg) - 2.0 * cos_g * coeff(&nd, deg) + coeff(&edd, deg);
    }

    let mut out = Vec::with_capacity(4);
    for v in real_roots(&quartic) {
        if v <= 0.0 {
            continue;
        }
        let dv = poly_eval(&d, v);
        if dv.abs() < 1e-12 {
            continue;
        }
        let u = poly_eval(&n, v) / dv;
        let qv = poly_eval(&q, v);
        if u <= 0.0 || qv <= 0.0 {
            continue;
        }
        let s1 = (b2_len / qv).sqrt();
        out.push([
            Point3::from(b1 * s1),
            Point3::from(b2 * (u * s1)),
            Point3::from(b3 * (v * s1)),
        ]);
    }

    if out.is_empty() {
        return Err(PnpError::NoRealSolution);
    }
    Ok(out)
}

/// Gauss-Newton on the four per-point depths; keeps the input when it does not improve.
fn polish(
    geometry: &MarkerGeometry,
    camera: &CameraModel,
    image: &[Point2<f64>; MARKER_POINTS],
    rays: &[Vector3<f64>; MARKER_POINTS],
    iso: Isometry3<f64>,
    err: f64,
) -> (Isometry3<f64>, f64) {
    let init = geometry.points().map(|p| iso.transform_point(&p).z);
    let Some(depths) = refine_depths(geometry, rays, init) else {
        return (iso, err);
    };
    let camera_points: [Point3<f64>; MARKER_POINTS] =
        std::array::from_fn(|i| Point3::from(rays[i] * depths[i]));
    let Ok(refined) = pose_from_points(geometry.points(), &camera_points) else {
        return (iso, err);
    };
    match reprojection_error(&refined, geometry, camera, image) {
        Some(refined_err) if refined_err < err => (refined, refined_err),
        _ => (iso, err),
    }
}

fn refine_depths(
    geometry: &MarkerGeometry,
    rays: &[Vector3<f64>; MARKER_POINTS],
    init: [f64; MARKER_POINTS],
) -> Option<[f64; MARKER_POINTS]> {
    let rho = PAIRS.map(|(a, b)| geometry.distance(a, b).powi(2));
    let mut beta = Vector4::from(init);

    for _ in 0..POLISH_ITERATIONS {
        let mut jtj = Matrix4::zeros();
        let mut jtr = Vector4::zeros();
        for (&(a, b), rho_ab) in PAIRS.iter().zip(rho) {
            let diff = rays[a] * beta[a] - rays[b] * beta[b];
            let residual = diff.norm_squared() - rho_ab;
            let mut row = Vector4::zeros();
            row[a] = 2.0 * diff.dot(&rays[a]);
            row[b] = -2.0 * diff.dot(&rays[b]);
            jtj += row * row.transpose();
            jtr += row * residual;
        }
        let step = jtj.cholesky()?.solve(&jtr);
        beta -= step;
        if step.norm() <= 1e-12 * beta.norm() {
            break;
        }
    }

    beta.iter()
        .all(|b| b.is_finite() && *b > 0.0)
        .then(|| [beta[0], beta[1], beta[2], beta[3]])
}

#[inline]
fn coeff(p: &[f64], deg: usize) -> f64 {
    p.get(deg).copied().unwrap_or(0.0)
}

/// Product of two polynomials, coefficients ordered from the constant term up.
fn poly_mul(a: &[f64], b: &[f64]) -> Vec<f64> {
    let mut out = vec![0.0; a.len() + b.len() - 1];
    for (i, ai) in a.iter().enumerate() {
        for (j, bj) in b.iter().enumerate() {
            out[i + j] += ai * bj;
        }
    }
    out
}

#[inline]
fn poly_eval(p: &[f64], x: f64) -> f64 {
    p.iter().rev().fold(0.0, |acc, c| acc * x + c)
}

/// Real roots of a polynomial (constant term first), via companion-matrix eigenvalues.
fn real_roots(coeffs: &[f64]) -> Vec<f64> {
    let scale = coeffs.iter().fold(0.0_f64, |m, c| m.max(c.abs()));
    if scale == 0.0 || !scale.is_finite() {
        return Vec::new();
    }
    let mut c: Vec<f64> = coeffs.iter().map(|v| v / scale).collect();
    while c.len() > 1 && c.last().is_some_and(|v| v.abs() < 1e-14) {
        c.pop();
    }
    let degree = c.len() - 1;
    match degree {
        0 => return Vec::new(),
        1 => return vec![-c[0] / c[1]],
        _ => {}
    }

    let lead = c[degree];
    let mut companion = DMatrix::<f64>::zeros(degree, degree);
    for col in 0..degree {
        companion[(0, col)] = -c[degree - 1 - col] / lead;
    }
    for row in 1..degree {
        companion[(row, row - 1)] = 1.0;
    }

    let mut roots: Vec<f64> = companion
        .complex_eigenvalues()
        .iter()
        .filter(|z| z.im.abs() <= ROOT_IMAG_TOL * (1.0 + z.re.abs()))
        .map(|z| newton_polish(&c, z.re))
        .collect();
    roots.sort_by(|a, b| a.total_cmp(b));
    roots
}

fn newton_polish(c: &[f64], mut x: f64) -> f64 {
    for _ in 0..3 {
        let (p, dp) = c
            .iter()
            .rev()
            .fold((0.0, 0.0), |(p, dp), &ci| (p * x + ci, dp * x + p));
        if dp.abs() < 1e-300 {
            break;
        }
        x -= p / dp;
    }
    x
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn camera() -> CameraModel {
        CameraModel::from_image_size(1280, 720, 0.65).expect("camera")
    }

    fn ground_truth() -> Isometry3<f64> {
        Isometry3::new(Vector3::new(0.02, -0.015, 0.45), Vector3::new(0.3, -0.2, 0.1))
    }

    fn observe(iso: &Isometry3<f64>) -> [Point2<f64>; MARKER_POINTS] {
        let cam = camera();
        MarkerGeometry::default()
            .points()
            .map(|p| cam.project(&iso.transform_point(&p)).expect("visible"))
    }

    fn rotation_angle(a: &Isometry3<f64>, b: &Isometry3<f64>) -> f64 {
        a.rotation.angle_to(&b.rotation)
    }

    #[test]
    fn recovers_pose_from_noiseless_projections() {
        let gt = ground_truth();
        let image = observe(&gt);
        let pose = solve_pose(&MarkerGeometry::default(), &image, &camera()).expect("solve");

        assert!(pose.reprojection_error < 1e-6, "error {}", pose.reprojection_error);
        let dt = (pose.marker_to_camera.translation.vector - gt.translation.vector).norm();
        assert!(dt < 1e-6, "translation error too large: {dt}");
        let ang = rotation_angle(&pose.marker_to_camera, &gt);
        assert!(ang < 1e-6, "rotation error too large: {ang}");
    }

    #[test]
    fn recovers_several_viewpoints() {
        let tool = MarkerGeometry::default();
        let views = [
            Isometry3::new(Vector3::new(0.0, 0.0, 0.3), Vector3::zeros()),
            Isometry3::new(Vector3::new(-0.05, 0.03, 0.6), Vector3::new(-0.4, 0.1, 0.7)),
            Isometry3::new(Vector3::new(0.08, 0.02, 0.8), Vector3::new(0.2, 0.5, -1.2)),
        ];
        for gt in views {
            let pose = solve_pose(&tool, &observe(&gt), &camera()).expect("solve");
            assert!(pose.reprojection_error < 1e-6);
            assert_relative_eq!(
                pose.position(),
                Point3::from(gt.translation.vector),
                epsilon = 1e-6
            );
        }
    }

    #[test]
    fn recovers_planar_tool() {
        let tool = MarkerGeometry::new([
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(0.05, 0.0, 0.0),
            Point3::new(0.0, 0.04, 0.0),
            Point3::new(0.06, 0.05, 0.0),
        ])
        .expect("planar tool");
        let cam = camera();
        let views = [
            ground_truth(),
            Isometry3::new(Vector3::new(-0.03, 0.01, 0.5), Vector3::new(-0.3, 0.4, 0.2)),
        ];
        for gt in views {
            let image = tool
                .points()
                .map(|p| cam.project(&gt.transform_point(&p)).expect("visible"));
            let pose = solve_pose(&tool, &image, &cam).expect("solve");
            assert!(pose.reprojection_error < 1e-6, "error {}", pose.reprojection_error);
            let dt = (pose.marker_to_camera.translation.vector - gt.translation.vector).norm();
            assert!(dt < 1e-6, "translation error too large: {dt}");
        }
    }

    #[test]
    fn wrong_ordering_reprojects_badly() {
        let mut image = observe(&ground_truth());
        image.swap(0, 3);
        if let Ok(pose) = solve_pose(&MarkerGeometry::default(), &image, &camera()) {
            assert!(pose.reprojection_error > 1.0);
        }
    }

    #[test]
    fn noisy_points_give_small_nonzero_error() {
        let mut image = observe(&ground_truth());
        image[1].x += 1.5;
        image[3].y -= 1.0;
        let pose = solve_pose(&MarkerGeometry::default(), &image, &camera()).expect("solve");
        assert!(pose.reprojection_error > 0.0);
        assert!(pose.reprojection_error < 5.0);
        let recheck = reprojection_error(
            &pose.marker_to_camera,
            &MarkerGeometry::default(),
            &camera(),
            &image,
        )
        .expect("visible");
        assert_relative_eq!(recheck, pose.reprojection_error, epsilon = 1e-9);
    }

    #[test]
    fn degenerate_inputs_report_failure() {
        let same = [Point2::new(100.0, 100.0); MARKER_POINTS];
        assert!(matches!(
            solve_pose(&MarkerGeometry::default(), &same, &camera()),
            Err(PnpError::DegenerateImage { .. })
        ));

        let mut image = observe(&ground_truth());
        image[2].x = f64::NAN;
        assert_eq!(
            solve_pose(&MarkerGeometry::default(), &image, &camera()),
            Err(PnpError::NonFinite)
        );
    }

    #[test]
    fn kabsch_recovers_rigid_motion() {
        let gt = ground_truth();
        let model = *MarkerGeometry::default().points();
        let moved = model.map(|p| gt.transform_point(&p));
        let iso = pose_from_points(&model, &moved).expect("align");
        assert_relative_eq!(iso.translation.vector, gt.translation.vector, epsilon = 1e-9);
        assert!(rotation_angle(&iso, &gt) < 1e-9);
        assert_eq!(
            pose_from_points(&model[..2], &moved[..2]),
            Err(PnpError::Alignment)
        );
    }

    #[test]
    fn quartic_roots() {
        // (x-1)(x-2)(x-3)(x-4)
        let roots = real_roots(&[24.0, -50.0, 35.0, -10.0, 1.0]);
        assert_eq!(roots.len(), 4);
        for (r, expected) in roots.iter().zip([1.0, 2.0, 3.0, 4.0]) {
            assert_relative_eq!(*r, expected, epsilon = 1e-9);
        }
        // x^2 + 1 has no real roots; trailing zeros reduce the degree.
        assert!(real_roots(&[1.0, 0.0, 1.0, 0.0, 0.0]).is_empty());
        assert_eq!(real_roots(&[-2.0, 1.0, 0.0]), vec![2.0]);
    }
}
