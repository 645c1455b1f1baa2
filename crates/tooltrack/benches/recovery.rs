use criterion::{black_box, criterion_group, criterion_main, Criterion};
use nalgebra::Point2;
use tooltrack::synthetic::SyntheticScene;
use tooltrack::{resolve_recovery, DetectionSet, MarkerGeometry, TrackerParams};
use tooltrack_core::solve_pose;

fn bench_recovery(c: &mut Criterion) {
    let scene = SyntheticScene::new(1280, 720, MarkerGeometry::default()).expect("scene");
    let boxes = scene.detections(&SyntheticScene::default_pose());
    let mut points: Vec<Point2<f64>> = boxes.iter().map(|b| b.center()).collect();
    points.rotate_left(1);
    let four = DetectionSet::from_points(points.clone()).expect("finite");

    points.insert(0, Point2::new(100.0, 600.0));
    let five = DetectionSet::from_points(points).expect("finite");
    let wide = TrackerParams {
        recovery_candidates: 5,
        ..TrackerParams::default()
    };

    let geometry = MarkerGeometry::default();
    let params = TrackerParams::default();
    c.bench_function("recovery_24_orderings", |b| {
        b.iter(|| resolve_recovery(black_box(&four), &geometry, &scene.camera, &params))
    });
    c.bench_function("recovery_120_orderings", |b| {
        b.iter(|| resolve_recovery(black_box(&five), &geometry, &scene.camera, &wide))
    });

    let image = [boxes[0].center(), boxes[1].center(), boxes[2].center(), boxes[3].center()];
    c.bench_function("solve_pose", |b| {
        b.iter(|| solve_pose(&geometry, black_box(&image), &scene.camera))
    });
}

criterion_group!(benches, bench_recovery);
criterion_main!(benches);
