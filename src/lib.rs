pub mod board;
pub mod camera_model;
pub mod config;
pub mod data_loader;
pub mod detected_points;
pub mod detector;
pub mod error;
pub mod io;
pub mod optimization;
pub mod resolution;
pub mod types;
pub mod visualization;

pub use error::CalibError;
