use super::generic::CameraModel;
use nalgebra as na;

/// Number of distortion coefficients: k1, k2, p1, p2, k3, k4, k5, k6.
pub const DISTORTION_LEN: usize = 8;

/// Pinhole camera with rational radial and tangential distortion.
///
/// Parameter layout is `[fx, fy, cx, cy, k1, k2, p1, p2, k3, k4, k5, k6]`,
/// the distortion part follows OpenCV's ordering.
#[derive(Debug, Clone, PartialEq)]
pub struct RationalPolynomial<T: na::RealField + Clone> {
    pub fx: T,
    pub fy: T,
    pub cx: T,
    pub cy: T,
    pub distortion: [T; DISTORTION_LEN],
    pub width: u32,
    pub height: u32,
}

impl<T: na::RealField + Clone> RationalPolynomial<T> {
    /// Missing trailing coefficients (e.g. a 5 term OpenCV vector) are zero.
    pub fn new(params: &na::DVector<T>, width: u32, height: u32) -> RationalPolynomial<T> {
        let distortion = std::array::from_fn(|i| {
            params
                .get(4 + i)
                .cloned()
                .unwrap_or_else(T::zero)
        });
        RationalPolynomial {
            fx: params[0].clone(),
            fy: params[1].clone(),
            cx: params[2].clone(),
            cy: params[3].clone(),
            distortion,
            width,
            height,
        }
    }

    pub fn from_camera_matrix(
        camera_matrix: &na::Matrix3<T>,
        distortion: &[T],
        width: u32,
        height: u32,
    ) -> RationalPolynomial<T> {
        let distortion =
            std::array::from_fn(|i| distortion.get(i).cloned().unwrap_or_else(T::zero));
        RationalPolynomial {
            fx: camera_matrix[(0, 0)].clone(),
            fy: camera_matrix[(1, 1)].clone(),
            cx: camera_matrix[(0, 2)].clone(),
            cy: camera_matrix[(1, 2)].clone(),
            distortion,
            width,
            height,
        }
    }

    pub fn camera_matrix(&self) -> na::Matrix3<T> {
        let zero = T::zero();
        na::Matrix3::new(
            self.fx.clone(),
            zero.clone(),
            self.cx.clone(),
            zero.clone(),
            self.fy.clone(),
            self.cy.clone(),
            zero.clone(),
            zero,
            T::one(),
        )
    }

    /// Applies lens distortion to a point on the normalized image plane.
    pub fn distort_normalized(distortion: &[T; DISTORTION_LEN], x: T, y: T) -> (T, T) {
        let [k1, k2, p1, p2, k3, k4, k5, k6] = distortion;
        let one = T::one();
        let two: T = na::convert(2.0);
        let r2 = x.clone() * x.clone() + y.clone() * y.clone();
        let r4 = r2.clone() * r2.clone();
        let r6 = r4.clone() * r2.clone();
        let radial = (one.clone()
            + k1.clone() * r2.clone()
            + k2.clone() * r4.clone()
            + k3.clone() * r6.clone())
            / (one + k4.clone() * r2.clone() + k5.clone() * r4 + k6.clone() * r6);
        let xy = x.clone() * y.clone();
        let xd = x.clone() * radial.clone()
            + two.clone() * p1.clone() * xy.clone()
            + p2.clone() * (r2.clone() + two.clone() * x.clone() * x);
        let yd = y.clone() * radial
            + p1.clone() * (r2 + two.clone() * y.clone() * y)
            + two * p2.clone() * xy;
        (xd, yd)
    }

    fn project_one_impl(&self, pt: &na::Vector3<T>) -> na::Vector2<T> {
        let xn = pt[0].clone() / pt[2].clone();
        let yn = pt[1].clone() / pt[2].clone();
        let (xd, yd) = Self::distort_normalized(&self.distortion, xn, yn);
        na::Vector2::new(
            self.fx.clone() * xd + self.cx.clone(),
            self.fy.clone() * yd + self.cy.clone(),
        )
    }
}

impl<T: na::RealField + Clone> CameraModel<T> for RationalPolynomial<T> {
    fn params(&self) -> na::DVector<T> {
        let mut params = vec![
            self.fx.clone(),
            self.fy.clone(),
            self.cx.clone(),
            self.cy.clone(),
        ];
        params.extend(self.distortion.iter().cloned());
        na::DVector::from_vec(params)
    }

    fn width(&self) -> T {
        na::convert(self.width as f64)
    }

    fn height(&self) -> T {
        na::convert(self.height as f64)
    }

    fn project_one(&self, pt: &na::Vector3<T>) -> na::Vector2<T> {
        self.project_one_impl(pt)
    }
}
