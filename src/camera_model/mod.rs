pub mod generic;
pub mod rational;

pub use generic::{CameraModel, init_undistort_map, remap, undistort};
pub use rational::{DISTORTION_LEN, RationalPolynomial};
