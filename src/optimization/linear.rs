use nalgebra as na;
use sqpnp_simple::sqpnp_solve_glam;

use crate::detected_points::FrameFeature;
use crate::types::RvecTvec;

/// Initial board pose of one view from the pinhole part of `camera_matrix`.
///
/// Distortion is ignored, pixels are normalized with the initial guess and
/// handed to SQPnP.
pub fn init_pose(frame_feature: &FrameFeature, camera_matrix: &na::Matrix3<f64>) -> Option<RvecTvec> {
    let fx = camera_matrix[(0, 0)];
    let fy = camera_matrix[(1, 1)];
    let cx = camera_matrix[(0, 2)];
    let cy = camera_matrix[(1, 2)];
    let (p2ds_z, p3ds): (Vec<_>, Vec<_>) = frame_feature
        .features
        .values()
        .map(|f| {
            let xy = glam::Vec2::new(
                ((f.p2d.x as f64 - cx) / fx) as f32,
                ((f.p2d.y as f64 - cy) / fy) as f32,
            );
            (xy, f.p3d)
        })
        .unzip();
    if p3ds.len() < 4 {
        return None;
    }

    let (rvec, tvec) = sqpnp_solve_glam(&p3ds, &p2ds_z)?;
    let pose = RvecTvec::new(&[rvec.0, rvec.1, rvec.2], &[tvec.0, tvec.1, tvec.2]);
    if pose.rvec.iter().chain(pose.tvec.iter()).all(|v| v.is_finite()) {
        Some(pose)
    } else {
        None
    }
}
