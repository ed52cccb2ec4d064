use nalgebra as na;
use tiny_solver::factors::Factor;

use crate::camera_model::{CameraModel, DISTORTION_LEN, RationalPolynomial};

/// How the intrinsic parameter block maps to fx, fy, cx, cy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IntrinsicLayout {
    /// `[fx, fy, cx, cy]`
    Free,
    /// `[f, cx, cy]` with `fx = f` and `fy = f * aspect`.
    FixedAspect { aspect: f64 },
}

impl IntrinsicLayout {
    pub fn block_len(&self) -> usize {
        match self {
            IntrinsicLayout::Free => 4,
            IntrinsicLayout::FixedAspect { .. } => 3,
        }
    }

    /// Packs a camera matrix into the parameter block.
    pub fn pack(&self, camera_matrix: &na::Matrix3<f64>) -> na::DVector<f64> {
        let fx = camera_matrix[(0, 0)];
        let fy = camera_matrix[(1, 1)];
        let cx = camera_matrix[(0, 2)];
        let cy = camera_matrix[(1, 2)];
        match self {
            IntrinsicLayout::Free => na::dvector![fx, fy, cx, cy],
            IntrinsicLayout::FixedAspect { .. } => na::dvector![fx, cx, cy],
        }
    }

    /// Returns `[fx, fy, cx, cy]` from the parameter block.
    pub fn unpack<T: na::RealField>(&self, block: &na::DVector<T>) -> [T; 4] {
        match self {
            IntrinsicLayout::Free => [
                block[0].clone(),
                block[1].clone(),
                block[2].clone(),
                block[3].clone(),
            ],
            IntrinsicLayout::FixedAspect { aspect } => {
                let aspect: T = na::convert(*aspect);
                [
                    block[0].clone(),
                    block[0].clone() * aspect,
                    block[1].clone(),
                    block[2].clone(),
                ]
            }
        }
    }
}

/// Reprojection residual of one board corner in one view.
///
/// Parameter blocks are `[intrinsics, distortion, rvec, tvec]`. A distortion
/// block shorter than eight terms leaves the remaining coefficients at zero.
#[derive(Debug, Clone)]
pub struct ReprojectionFactor {
    pub layout: IntrinsicLayout,
    pub p3d: na::Point3<f64>,
    pub p2d: na::Vector2<f64>,
}

impl ReprojectionFactor {
    pub fn new(layout: IntrinsicLayout, p3d: &glam::Vec3, p2d: &glam::Vec2) -> ReprojectionFactor {
        ReprojectionFactor {
            layout,
            p3d: na::Point3::new(p3d.x as f64, p3d.y as f64, p3d.z as f64),
            p2d: na::Vector2::new(p2d.x as f64, p2d.y as f64),
        }
    }

    /// Projects the board point and returns `projected - observed`.
    pub fn residual_generic<T: na::RealField>(
        &self,
        intrinsics: &na::DVector<T>,
        distortion: &na::DVector<T>,
        rvec: &na::DVector<T>,
        tvec: &na::DVector<T>,
    ) -> na::Vector2<T> {
        let [fx, fy, cx, cy] = self.layout.unpack(intrinsics);
        let dist: [T; DISTORTION_LEN] =
            std::array::from_fn(|i| distortion.get(i).cloned().unwrap_or_else(T::zero));
        let model = RationalPolynomial {
            fx,
            fy,
            cx,
            cy,
            distortion: dist,
            width: 0,
            height: 0,
        };
        let rvec = na::Vector3::new(rvec[0].clone(), rvec[1].clone(), rvec[2].clone());
        let tvec = na::Vector3::new(tvec[0].clone(), tvec[1].clone(), tvec[2].clone());
        let transform = na::Isometry3::new(tvec, rvec);
        let p3d = na::Point3::new(
            na::convert::<f64, T>(self.p3d.x),
            na::convert::<f64, T>(self.p3d.y),
            na::convert::<f64, T>(self.p3d.z),
        );
        let p3d_t = transform * p3d;
        let p2d_p = model.project_one(&p3d_t.coords);
        na::Vector2::new(
            p2d_p[0].clone() - na::convert::<f64, T>(self.p2d.x),
            p2d_p[1].clone() - na::convert::<f64, T>(self.p2d.y),
        )
    }
}

impl<T: na::RealField> Factor<T> for ReprojectionFactor {
    fn residual_func(&self, params: &[na::DVector<T>]) -> na::DVector<T> {
        // params[intrinsics, distortion, rvec, tvec]
        let r = self.residual_generic(&params[0], &params[1], &params[2], &params[3]);
        na::dvector![r[0].clone(), r[1].clone()]
    }
}
