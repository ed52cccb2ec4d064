pub mod calibrate;
pub mod factors;
pub mod linear;

pub use calibrate::*;
pub use linear::*;
