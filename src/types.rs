use nalgebra as na;

/// Board-to-camera pose as a Rodrigues rotation vector and a translation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RvecTvec {
    pub rvec: na::Vector3<f64>,
    pub tvec: na::Vector3<f64>,
}

impl RvecTvec {
    pub fn new(rvec: &[f64; 3], tvec: &[f64; 3]) -> RvecTvec {
        RvecTvec {
            rvec: na::Vector3::from_row_slice(rvec),
            tvec: na::Vector3::from_row_slice(tvec),
        }
    }

    pub fn na_rvec(&self) -> na::DVector<f64> {
        na::DVector::from_column_slice(self.rvec.as_slice())
    }

    pub fn na_tvec(&self) -> na::DVector<f64> {
        na::DVector::from_column_slice(self.tvec.as_slice())
    }

    pub fn to_na_isometry3(&self) -> na::Isometry3<f64> {
        na::Isometry3::new(self.tvec, self.rvec)
    }
}

pub trait ToRvecTvec {
    fn to_rvec_tvec(&self) -> RvecTvec;
}

impl ToRvecTvec for na::Isometry3<f64> {
    fn to_rvec_tvec(&self) -> RvecTvec {
        RvecTvec {
            rvec: self.rotation.scaled_axis(),
            tvec: self.translation.vector,
        }
    }
}
