use charuco_intrinsic_calibration::optimization::factors::{IntrinsicLayout, ReprojectionFactor};
use charuco_intrinsic_calibration::resolution::{ResolutionTableConfig, build_resolution_table};
use criterion::{Criterion, black_box, criterion_group, criterion_main};
use glam::{Vec2, Vec3};
use nalgebra as na;
use tiny_solver::factors::Factor;

fn bench_resolution_table(c: &mut Criterion) {
    let config = ResolutionTableConfig::k16vga();
    c.bench_function("build_resolution_table", |b| {
        b.iter(|| build_resolution_table(black_box(&config)))
    });
}

fn bench_reprojection_residual(c: &mut Criterion) {
    let factor = ReprojectionFactor::new(
        IntrinsicLayout::FixedAspect { aspect: 1.0 },
        &Vec3::new(0.36, 0.72, 0.0),
        &Vec2::new(320.0, 240.0),
    );
    let params = vec![
        na::dvector![800.0, 320.0, 240.0],
        na::dvector![0.1, -0.05, 0.001, 0.001, 0.01, 0.0, 0.0, 0.0],
        na::dvector![0.1, -0.2, 0.05],
        na::dvector![-0.5, -0.3, 2.0],
    ];

    c.bench_function("reprojection_residual", |b| {
        b.iter(|| Factor::<f64>::residual_func(&factor, black_box(&params)))
    });
}

criterion_group!(benches, bench_resolution_table, bench_reprojection_residual);
criterion_main!(benches);
