use std::collections::BTreeMap;

use charuco_intrinsic_calibration::board::create_default_8x5_board;
use charuco_intrinsic_calibration::camera_model::{CameraModel, RationalPolynomial};
use charuco_intrinsic_calibration::detected_points::{FeaturePoint, FrameFeature, ObservationSet};
use charuco_intrinsic_calibration::optimization::factors::{IntrinsicLayout, ReprojectionFactor};
use charuco_intrinsic_calibration::optimization::{
    CalibrationError, CalibrationFlags, CalibrationOptions, calibrate, init_pose,
    initial_camera_matrix,
};
use charuco_intrinsic_calibration::types::RvecTvec;
use nalgebra as na;

const IMG_W_H: (u32, u32) = (640, 480);

fn ground_truth_camera() -> RationalPolynomial<f64> {
    RationalPolynomial::new(&na::dvector![500.0, 500.0, 320.0, 240.0], IMG_W_H.0, IMG_W_H.1)
}

/// Board poses looking at the board centre from slightly different angles.
fn synthetic_poses() -> Vec<RvecTvec> {
    let board_center = na::Vector3::new(1.44, 0.9, 0.0);
    let tilts = [
        [0.0, 0.0, 0.0],
        [0.3, 0.0, 0.0],
        [-0.3, 0.0, 0.05],
        [0.0, 0.3, 0.0],
        [0.0, -0.3, -0.05],
        [0.2, 0.2, 0.1],
        [-0.2, 0.25, -0.1],
        [0.25, -0.2, 0.0],
    ];
    tilts
        .iter()
        .enumerate()
        .map(|(i, r)| {
            let rvec = na::Vector3::new(r[0], r[1], r[2]);
            let rotation = na::Rotation3::new(rvec);
            let offset = na::Vector3::new(0.1 * (i % 3) as f64 - 0.1, 0.05 * (i % 2) as f64, 0.0);
            let tvec = na::Vector3::new(0.0, 0.0, 5.0 + 0.2 * i as f64) - rotation * board_center
                + offset;
            RvecTvec { rvec, tvec }
        })
        .collect()
}

fn synthetic_frame(
    camera: &RationalPolynomial<f64>,
    pose: &RvecTvec,
    image_idx: usize,
) -> FrameFeature {
    let board = create_default_8x5_board();
    let transform = pose.to_na_isometry3();
    let features: BTreeMap<u32, FeaturePoint> = board
        .id_to_3d
        .iter()
        .map(|(id, p3d)| {
            let p = transform
                * na::Point3::new(p3d.x as f64, p3d.y as f64, p3d.z as f64);
            let p2d = camera.project_one(&p.coords);
            (
                *id,
                FeaturePoint {
                    p2d: glam::Vec2::new(p2d.x as f32, p2d.y as f32),
                    p3d: *p3d,
                },
            )
        })
        .collect();
    FrameFeature {
        image_idx,
        img_w_h: IMG_W_H,
        features,
    }
}

fn synthetic_observations(camera: &RationalPolynomial<f64>) -> ObservationSet {
    let frames: Vec<FrameFeature> = synthetic_poses()
        .iter()
        .enumerate()
        .map(|(i, pose)| synthetic_frame(camera, pose, i))
        .collect();
    ObservationSet {
        image_paths: (0..frames.len())
            .map(|i| format!("{}.png", i).into())
            .collect(),
        frames,
        skipped: Vec::new(),
        img_w_h: IMG_W_H,
    }
}

#[test]
fn test_reprojection_factor_is_zero_at_ground_truth() {
    let camera = ground_truth_camera();
    let pose = synthetic_poses()[5];
    let frame = synthetic_frame(&camera, &pose, 0);
    let layout = IntrinsicLayout::Free;
    let intrinsics = layout.pack(&camera.camera_matrix());
    let distortion = na::DVector::zeros(5);
    for f in frame.features.values() {
        let factor = ReprojectionFactor::new(layout, &f.p3d, &f.p2d);
        let r = factor.residual_generic(&intrinsics, &distortion, &pose.na_rvec(), &pose.na_tvec());
        assert!(r.norm() < 1e-3, "residual {}", r);
    }

    // a focal length error shows up in the residual
    let wrong = na::dvector![520.0, 500.0, 320.0, 240.0];
    let f = frame.features[&0];
    let factor = ReprojectionFactor::new(layout, &f.p3d, &f.p2d);
    let r = factor.residual_generic(&wrong, &distortion, &pose.na_rvec(), &pose.na_tvec());
    assert!(r.norm() > 1.0);
}

#[test]
fn test_fixed_aspect_layout() {
    let layout = IntrinsicLayout::FixedAspect { aspect: 1.5 };
    let k = na::Matrix3::new(400.0, 0.0, 320.0, 0.0, 600.0, 240.0, 0.0, 0.0, 1.0);
    let block = layout.pack(&k);
    assert_eq!(block.len(), 3);
    assert_eq!(layout.unpack(&block), [400.0, 600.0, 320.0, 240.0]);
}

#[test]
fn test_init_pose_recovers_board_pose() {
    let camera = ground_truth_camera();
    for (i, pose) in synthetic_poses().iter().enumerate() {
        let frame = synthetic_frame(&camera, pose, i);
        let estimated = init_pose(&frame, &camera.camera_matrix()).unwrap();
        assert!((estimated.tvec - pose.tvec).norm() < 1e-2, "view {}", i);
        let delta = estimated.to_na_isometry3().rotation.angle_to(&pose.to_na_isometry3().rotation);
        assert!(delta < 1e-2, "view {}", i);
    }
}

#[test]
fn test_init_pose_needs_four_points() {
    let camera = ground_truth_camera();
    let mut frame = synthetic_frame(&camera, &synthetic_poses()[0], 0);
    frame.features.retain(|id, _| *id < 3);
    assert!(init_pose(&frame, &camera.camera_matrix()).is_none());
}

#[test]
fn test_calibrate_synthetic_views() {
    let camera = ground_truth_camera();
    let observations = synthetic_observations(&camera);
    let options = CalibrationOptions {
        initial_focal: 600.0,
        flags: CalibrationFlags {
            rational_model: false,
            ..Default::default()
        },
        ..Default::default()
    };
    let result = calibrate(&observations, &options).unwrap();

    assert!(result.rms < 1e-2, "rms {}", result.rms);
    assert!(result.initial_rms > result.rms);
    assert!((result.camera_matrix[(0, 0)] - 500.0).abs() < 1.0);
    assert!((result.camera_matrix[(1, 1)] - 500.0).abs() < 1.0);
    assert!((result.camera_matrix[(0, 2)] - 320.0).abs() < 1.0);
    assert!((result.camera_matrix[(1, 2)] - 240.0).abs() < 1.0);
    assert_eq!(result.camera_matrix[(2, 2)], 1.0);
    // rational terms stay fixed
    assert_eq!(&result.distortion[5..], &[0.0, 0.0, 0.0]);

    assert_eq!(result.extrinsics.len(), 8);
    assert_eq!(result.per_view_errors.len(), 8);
    assert_eq!(result.image_indices, (0..8).collect::<Vec<_>>());
    assert_eq!(result.std_dev_intrinsics.len(), 12);
    assert_eq!(result.std_dev_extrinsics.len(), 8);
    assert!(result.std_dev_intrinsics[..9].iter().all(|v| v.is_finite()));
    assert_eq!(&result.std_dev_intrinsics[9..], &[0.0, 0.0, 0.0]);
    for (pose, estimated) in synthetic_poses().iter().zip(&result.extrinsics) {
        assert!((pose.tvec - estimated.tvec).norm() < 1e-2);
    }
}

#[test]
fn test_calibrate_recovers_distortion() {
    let camera = RationalPolynomial::new(
        &na::dvector![500.0, 500.0, 320.0, 240.0, -0.2, 0.05, 0.001, -0.002, 0.0],
        IMG_W_H.0,
        IMG_W_H.1,
    );
    let observations = synthetic_observations(&camera);
    let options = CalibrationOptions {
        initial_focal: 600.0,
        flags: CalibrationFlags {
            rational_model: false,
            ..Default::default()
        },
        ..Default::default()
    };
    let result = calibrate(&observations, &options).unwrap();

    assert!(result.rms < 1e-2, "rms {}", result.rms);
    assert!((result.camera_matrix[(0, 0)] - 500.0).abs() < 1.0);
    let d = result.distortion;
    assert!((d[0] + 0.2).abs() < 1e-2, "k1 {}", d[0]);
    assert!((d[1] - 0.05).abs() < 1e-2, "k2 {}", d[1]);
    assert!((d[2] - 0.001).abs() < 1e-4, "p1 {}", d[2]);
    assert!((d[3] + 0.002).abs() < 1e-4, "p2 {}", d[3]);
}

#[test]
fn test_calibrate_iteration_budget_exhausted() {
    let camera = ground_truth_camera();
    let observations = synthetic_observations(&camera);
    let mut options = CalibrationOptions {
        initial_focal: 1000.0,
        ..Default::default()
    };
    options.criteria.max_iterations = 1;
    match calibrate(&observations, &options) {
        Err(CalibrationError::Divergence {
            views,
            max_iterations,
            initial_rms,
        }) => {
            assert_eq!(views, 8);
            assert_eq!(max_iterations, 1);
            assert!(initial_rms > 0.0);
        }
        other => panic!("unexpected {:?}", other.map(|r| r.rms)),
    }
}

#[test]
fn test_calibrate_rational_model() {
    let camera = ground_truth_camera();
    let observations = synthetic_observations(&camera);
    let result = calibrate(&observations, &CalibrationOptions::default()).unwrap();
    assert!(result.rms < 1e-2, "rms {}", result.rms);
    assert_eq!(result.distortion.len(), 8);
    assert_eq!(result.std_dev_intrinsics.len(), 12);
    assert_eq!(result.flags, CalibrationFlags::default());
    let model = result.camera_model();
    assert_eq!(model.width, 640);
    assert_eq!(model.params().len(), 12);
}

#[test]
fn test_calibrate_without_views() {
    let observations = ObservationSet {
        img_w_h: IMG_W_H,
        ..Default::default()
    };
    assert!(matches!(
        calibrate(&observations, &CalibrationOptions::default()),
        Err(CalibrationError::NotEnoughViews)
    ));

    let observations = ObservationSet::default();
    assert!(matches!(
        calibrate(&observations, &CalibrationOptions::default()),
        Err(CalibrationError::InvalidImageSize((0, 0)))
    ));
}

#[test]
fn test_calibrate_reports_failed_pose() {
    let camera = ground_truth_camera();
    let mut observations = synthetic_observations(&camera);
    observations.frames[3].features.retain(|id, _| *id < 3);
    assert!(matches!(
        calibrate(&observations, &CalibrationOptions::default()),
        Err(CalibrationError::PoseInit { image_idx: 3 })
    ));
}

#[test]
fn test_initial_camera_matrix_centre() {
    let k = initial_camera_matrix((2560, 1920), 1000.0);
    assert_eq!(k[(0, 0)], 1000.0);
    assert_eq!(k[(1, 1)], 1000.0);
    assert_eq!(k[(0, 2)], 1280.0);
    assert_eq!(k[(1, 2)], 960.0);
}
