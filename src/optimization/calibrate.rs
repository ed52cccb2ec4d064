use std::collections::HashMap;

use nalgebra as na;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tiny_solver::LevenbergMarquardtOptimizer;
use tiny_solver::factors::Factor;
use tiny_solver::optimizer::{Optimizer, OptimizerOptions};
use tiny_solver::problem::Problem;

use super::factors::{IntrinsicLayout, ReprojectionFactor};
use super::linear::init_pose;
use crate::camera_model::{DISTORTION_LEN, RationalPolynomial};
use crate::detected_points::ObservationSet;
use crate::types::RvecTvec;

const INTRINSICS: &str = "intrinsics";
const DISTORTION: &str = "distortion";
/// k1, k2, p1, p2, k3 without the rational denominator.
const PLAIN_DISTORTION_LEN: usize = 5;
/// Marquardt damping of the convergence check step.
const STEP_DAMPING: f64 = 1e-3;
/// Remaining RMS improvement in pixels that still counts as converged.
const CONVERGED_RMS_STEP: f64 = 1e-4;

#[derive(Debug, Error)]
pub enum CalibrationError {
    #[error("no view passed the corner filter")]
    NotEnoughViews,
    #[error("invalid image size {0:?}")]
    InvalidImageSize((u32, u32)),
    #[error("initial pose estimation failed for image {image_idx}")]
    PoseInit { image_idx: usize },
    #[error(
        "calibration did not converge within {max_iterations} iterations ({views} views, initial rms {initial_rms:.4} px)"
    )]
    Divergence {
        initial_rms: f64,
        views: usize,
        max_iterations: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationFlags {
    /// Start from the configured focal length instead of `max(width, height)`.
    pub use_intrinsic_guess: bool,
    /// Estimate k4, k5, k6 as well.
    pub rational_model: bool,
    /// Keep fy / fx at its initial value.
    pub fix_aspect_ratio: bool,
}

impl Default for CalibrationFlags {
    fn default() -> Self {
        Self {
            use_intrinsic_guess: true,
            rational_model: true,
            fix_aspect_ratio: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TermCriteria {
    pub max_iterations: usize,
    /// Relative cost decrease below which the solver stops.
    pub epsilon: f64,
}

impl Default for TermCriteria {
    fn default() -> Self {
        Self {
            max_iterations: 10000,
            epsilon: 1e-9,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationOptions {
    pub initial_focal: f64,
    pub flags: CalibrationFlags,
    pub criteria: TermCriteria,
}

impl Default for CalibrationOptions {
    fn default() -> Self {
        Self {
            initial_focal: 1000.0,
            flags: CalibrationFlags::default(),
            criteria: TermCriteria::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CalibrationResult {
    /// RMS reprojection error over all corners, in pixels.
    pub rms: f64,
    /// RMS before optimization, with the initial guess and PnP poses.
    pub initial_rms: f64,
    pub camera_matrix: na::Matrix3<f64>,
    /// `[k1, k2, p1, p2, k3, k4, k5, k6]`
    pub distortion: [f64; DISTORTION_LEN],
    pub img_w_h: (u32, u32),
    /// Index into the image list for each view.
    pub image_indices: Vec<usize>,
    pub extrinsics: Vec<RvecTvec>,
    pub per_view_errors: Vec<f64>,
    /// `[fx, fy, cx, cy, k1, k2, p1, p2, k3, k4, k5, k6]`, zero for fixed terms.
    pub std_dev_intrinsics: Vec<f64>,
    /// `[rx, ry, rz, tx, ty, tz]` per view.
    pub std_dev_extrinsics: Vec<[f64; 6]>,
    pub flags: CalibrationFlags,
}

impl CalibrationResult {
    pub fn camera_model(&self) -> RationalPolynomial<f64> {
        RationalPolynomial::from_camera_matrix(
            &self.camera_matrix,
            &self.distortion,
            self.img_w_h.0,
            self.img_w_h.1,
        )
    }
}

/// Initial intrinsic guess with the principal point at the image centre.
pub fn initial_camera_matrix(img_w_h: (u32, u32), focal: f64) -> na::Matrix3<f64> {
    na::Matrix3::new(
        focal,
        0.0,
        img_w_h.0 as f64 / 2.0,
        0.0,
        focal,
        img_w_h.1 as f64 / 2.0,
        0.0,
        0.0,
        1.0,
    )
}

fn rvec_key(view: usize) -> String {
    format!("rvec{}", view)
}

fn tvec_key(view: usize) -> String {
    format!("tvec{}", view)
}

/// Residual blocks of one calibration, kept to evaluate errors outside the solver.
struct ViewResiduals {
    layout: IntrinsicLayout,
    distortion_len: usize,
    /// Factors per view.
    factors: Vec<Vec<ReprojectionFactor>>,
}

impl ViewResiduals {
    fn new(observations: &ObservationSet, layout: IntrinsicLayout, distortion_len: usize) -> Self {
        let factors = observations
            .frames
            .iter()
            .map(|frame| {
                frame
                    .features
                    .values()
                    .map(|f| ReprojectionFactor::new(layout, &f.p3d, &f.p2d))
                    .collect()
            })
            .collect();
        ViewResiduals {
            layout,
            distortion_len,
            factors,
        }
    }

    fn views(&self) -> usize {
        self.factors.len()
    }

    fn param_len(&self) -> usize {
        self.layout.block_len() + self.distortion_len + 6 * self.views()
    }

    fn residual_len(&self) -> usize {
        self.factors.iter().map(|f| f.len() * 2).sum()
    }

    fn build_problem(&self) -> Problem {
        let mut problem = Problem::new();
        for (view, factors) in self.factors.iter().enumerate() {
            let rkey = rvec_key(view);
            let tkey = tvec_key(view);
            for factor in factors {
                problem.add_residual_block(
                    2,
                    &[INTRINSICS, DISTORTION, rkey.as_str(), tkey.as_str()],
                    Box::new(factor.clone()),
                    None,
                );
            }
        }
        problem
    }

    /// Sum of squared pixel residuals per view.
    fn view_squared_errors(&self, values: &HashMap<String, na::DVector<f64>>) -> Vec<f64> {
        let intrinsics = &values[INTRINSICS];
        let distortion = &values[DISTORTION];
        self.factors
            .iter()
            .enumerate()
            .map(|(view, factors)| {
                let params = [
                    intrinsics.clone(),
                    distortion.clone(),
                    values[&rvec_key(view)].clone(),
                    values[&tvec_key(view)].clone(),
                ];
                factors
                    .iter()
                    .map(|f| Factor::<f64>::residual_func(f, &params).norm_squared())
                    .sum()
            })
            .collect()
    }

    fn rms(&self, values: &HashMap<String, na::DVector<f64>>) -> f64 {
        let total: f64 = self.view_squared_errors(values).iter().sum();
        let count: usize = self.factors.iter().map(Vec::len).sum();
        (total / count.max(1) as f64).sqrt()
    }

    fn pack(&self, values: &HashMap<String, na::DVector<f64>>) -> na::DVector<f64> {
        let mut theta = Vec::with_capacity(self.param_len());
        theta.extend(values[INTRINSICS].iter());
        theta.extend(values[DISTORTION].iter());
        for view in 0..self.views() {
            theta.extend(values[&rvec_key(view)].iter());
            theta.extend(values[&tvec_key(view)].iter());
        }
        na::DVector::from_vec(theta)
    }

    fn unpack(&self, theta: &na::DVector<f64>) -> HashMap<String, na::DVector<f64>> {
        let mut values = HashMap::new();
        let n_intr = self.layout.block_len();
        values.insert(INTRINSICS.to_string(), theta.rows(0, n_intr).into_owned());
        values.insert(
            DISTORTION.to_string(),
            theta.rows(n_intr, self.distortion_len).into_owned(),
        );
        let offset = n_intr + self.distortion_len;
        for view in 0..self.views() {
            let start = offset + view * 6;
            values.insert(rvec_key(view), theta.rows(start, 3).into_owned());
            values.insert(tvec_key(view), theta.rows(start + 3, 3).into_owned());
        }
        values
    }

    fn stacked_residuals(&self, theta: &na::DVector<f64>) -> na::DVector<f64> {
        let values = self.unpack(theta);
        let intrinsics = &values[INTRINSICS];
        let distortion = &values[DISTORTION];
        let mut residuals = Vec::with_capacity(self.residual_len());
        for (view, factors) in self.factors.iter().enumerate() {
            let rvec = &values[&rvec_key(view)];
            let tvec = &values[&tvec_key(view)];
            for f in factors {
                let r = f.residual_generic(intrinsics, distortion, rvec, tvec);
                residuals.push(r[0]);
                residuals.push(r[1]);
            }
        }
        na::DVector::from_vec(residuals)
    }

    /// Central difference Jacobian of all residuals.
    fn numerical_jacobian(&self, theta: &na::DVector<f64>) -> na::DMatrix<f64> {
        let mut jac = na::DMatrix::zeros(self.residual_len(), theta.len());
        let mut theta_p = theta.clone();
        for col in 0..theta.len() {
            let step = 1e-6 * theta[col].abs().max(1.0);
            theta_p[col] = theta[col] + step;
            let r_plus = self.stacked_residuals(&theta_p);
            theta_p[col] = theta[col] - step;
            let r_minus = self.stacked_residuals(&theta_p);
            theta_p[col] = theta[col];
            jac.set_column(col, &((r_plus - r_minus) / (2.0 * step)));
        }
        jac
    }

    /// RMS the linearized problem reaches after one damped Gauss-Newton step.
    ///
    /// Equals the current RMS at a minimum, where the gradient vanishes.
    fn predicted_step_rms(&self, values: &HashMap<String, na::DVector<f64>>) -> f64 {
        let theta = self.pack(values);
        let residuals = self.stacked_residuals(&theta);
        let count = self.factors.iter().map(Vec::len).sum::<usize>().max(1) as f64;
        let jac = self.numerical_jacobian(&theta);
        let gradient = jac.transpose() * &residuals;
        let mut normal = jac.transpose() * &jac;
        for i in 0..normal.nrows() {
            normal[(i, i)] = normal[(i, i)] * (1.0 + STEP_DAMPING) + f64::EPSILON;
        }
        let Some(cholesky) = normal.cholesky() else {
            log::debug!("normal matrix is not positive definite, skip convergence step");
            return (residuals.norm_squared() / count).sqrt();
        };
        let step = cholesky.solve(&(-gradient));
        let linearized = residuals + jac * step;
        (linearized.norm_squared() / count).sqrt()
    }

    /// Standard deviation of every free parameter from `sigma^2 (J^T J)^-1`.
    fn parameter_std_devs(&self, values: &HashMap<String, na::DVector<f64>>) -> Option<na::DVector<f64>> {
        let theta = self.pack(values);
        let n_res = self.residual_len();
        let n_param = theta.len();
        if n_res <= n_param {
            log::warn!(
                "{} residuals for {} parameters, skip standard deviations",
                n_res,
                n_param
            );
            return None;
        }
        let residuals = self.stacked_residuals(&theta);
        let sigma2 = residuals.norm_squared() / (n_res - n_param) as f64;
        let jac = self.numerical_jacobian(&theta);
        let jtj = jac.transpose() * jac;
        let Some(cov) = jtj.try_inverse() else {
            log::warn!("normal matrix is singular, skip standard deviations");
            return None;
        };
        Some(cov.diagonal().map(|v| (v.max(0.0) * sigma2).sqrt()))
    }
}

/// Fits intrinsics and distortion to all accepted views by Levenberg-Marquardt.
pub fn calibrate(
    observations: &ObservationSet,
    options: &CalibrationOptions,
) -> Result<CalibrationResult, CalibrationError> {
    let img_w_h = observations.img_w_h;
    if img_w_h.0 == 0 || img_w_h.1 == 0 {
        return Err(CalibrationError::InvalidImageSize(img_w_h));
    }
    if observations.frames.is_empty() {
        return Err(CalibrationError::NotEnoughViews);
    }
    let flags = options.flags;
    let focal = if flags.use_intrinsic_guess {
        options.initial_focal
    } else {
        img_w_h.0.max(img_w_h.1) as f64
    };
    let camera_matrix_init = initial_camera_matrix(img_w_h, focal);
    let layout = if flags.fix_aspect_ratio {
        IntrinsicLayout::FixedAspect {
            aspect: camera_matrix_init[(1, 1)] / camera_matrix_init[(0, 0)],
        }
    } else {
        IntrinsicLayout::Free
    };
    let distortion_len = if flags.rational_model {
        DISTORTION_LEN
    } else {
        PLAIN_DISTORTION_LEN
    };
    log::debug!("initial camera matrix {}", camera_matrix_init);

    let mut initial_values = HashMap::<String, na::DVector<f64>>::new();
    initial_values.insert(INTRINSICS.to_string(), layout.pack(&camera_matrix_init));
    initial_values.insert(DISTORTION.to_string(), na::DVector::zeros(distortion_len));
    for (view, frame) in observations.frames.iter().enumerate() {
        let pose = init_pose(frame, &camera_matrix_init).ok_or(CalibrationError::PoseInit {
            image_idx: frame.image_idx,
        })?;
        initial_values.insert(rvec_key(view), pose.na_rvec());
        initial_values.insert(tvec_key(view), pose.na_tvec());
    }

    let residuals = ViewResiduals::new(observations, layout, distortion_len);
    let initial_rms = residuals.rms(&initial_values);
    log::info!(
        "calibrating {} views, {} corners, initial rms {:.4} px",
        residuals.views(),
        observations.total_corners(),
        initial_rms
    );

    let problem = residuals.build_problem();
    let optimizer = LevenbergMarquardtOptimizer::default();
    let optimizer_options = OptimizerOptions {
        max_iteration: options.criteria.max_iterations,
        min_rel_error_decrease_threshold: options.criteria.epsilon,
        min_abs_error_decrease_threshold: 0.0,
        ..OptimizerOptions::default()
    };
    let divergence = || CalibrationError::Divergence {
        initial_rms,
        views: residuals.views(),
        max_iterations: options.criteria.max_iterations,
    };
    let result = optimizer
        .optimize(&problem, &initial_values, Some(optimizer_options))
        .ok_or_else(divergence)?;

    let [fx, fy, cx, cy] = layout.unpack(&result[INTRINSICS]);
    let finite = result.values().all(|v| v.iter().all(|x| x.is_finite()));
    if !finite || fx <= 0.0 || fy <= 0.0 {
        return Err(divergence());
    }
    let camera_matrix = na::Matrix3::new(fx, 0.0, cx, 0.0, fy, cy, 0.0, 0.0, 1.0);
    let mut distortion = [0.0; DISTORTION_LEN];
    for (d, v) in distortion.iter_mut().zip(result[DISTORTION].iter()) {
        *d = *v;
    }

    let per_view_errors: Vec<f64> = residuals
        .view_squared_errors(&result)
        .iter()
        .zip(&residuals.factors)
        .map(|(sq, factors)| (sq / factors.len() as f64).sqrt())
        .collect();
    let rms = residuals.rms(&result);
    if !rms.is_finite() {
        return Err(divergence());
    }
    // the solver also stops when it runs out of iterations
    let step_rms = residuals.predicted_step_rms(&result);
    let rel_decrease = (rms * rms - step_rms * step_rms) / (rms * rms).max(f64::MIN_POSITIVE);
    if rel_decrease > options.criteria.epsilon && rms - step_rms > CONVERGED_RMS_STEP {
        log::warn!(
            "not converged: rms {:.5} px, one more step reaches {:.5} px",
            rms,
            step_rms
        );
        return Err(divergence());
    }

    let extrinsics: Vec<RvecTvec> = (0..residuals.views())
        .map(|view| RvecTvec {
            rvec: na::Vector3::from_column_slice(result[&rvec_key(view)].as_slice()),
            tvec: na::Vector3::from_column_slice(result[&tvec_key(view)].as_slice()),
        })
        .collect();

    let (std_dev_intrinsics, std_dev_extrinsics) =
        split_std_devs(residuals.parameter_std_devs(&result), layout, distortion_len, residuals.views());

    log::info!(
        "rms {:.5} px (initial {:.5} px)",
        rms,
        initial_rms
    );
    Ok(CalibrationResult {
        rms,
        initial_rms,
        camera_matrix,
        distortion,
        img_w_h,
        image_indices: observations.frames.iter().map(|f| f.image_idx).collect(),
        extrinsics,
        per_view_errors,
        std_dev_intrinsics,
        std_dev_extrinsics,
        flags,
    })
}

/// Maps the free parameter deviations back to fx, fy, cx, cy, distortion and poses.
fn split_std_devs(
    std_devs: Option<na::DVector<f64>>,
    layout: IntrinsicLayout,
    distortion_len: usize,
    views: usize,
) -> (Vec<f64>, Vec<[f64; 6]>) {
    let Some(std_devs) = std_devs else {
        return (
            vec![f64::NAN; 4 + DISTORTION_LEN],
            vec![[f64::NAN; 6]; views],
        );
    };
    let mut intrinsics = match layout {
        IntrinsicLayout::Free => std_devs.rows(0, 4).iter().copied().collect::<Vec<_>>(),
        IntrinsicLayout::FixedAspect { aspect } => {
            vec![std_devs[0], std_devs[0] * aspect, std_devs[1], std_devs[2]]
        }
    };
    let n_intr = layout.block_len();
    intrinsics.extend(std_devs.rows(n_intr, distortion_len).iter());
    intrinsics.resize(4 + DISTORTION_LEN, 0.0);

    let offset = n_intr + distortion_len;
    let extrinsics = (0..views)
        .map(|view| std::array::from_fn(|i| std_devs[offset + view * 6 + i]))
        .collect();
    (intrinsics, extrinsics)
}
