use thiserror::Error;

use crate::board::BoardError;
use crate::data_loader::DataLoadError;
use crate::optimization::CalibrationError;
use crate::resolution::ResolutionError;

/// Top level error for the calibration pipeline.
#[derive(Debug, Error)]
pub enum CalibError {
    #[error(transparent)]
    Board(#[from] BoardError),
    #[error(transparent)]
    DataLoad(#[from] DataLoadError),
    #[error(transparent)]
    Calibration(#[from] CalibrationError),
    #[error(transparent)]
    Resolution(#[from] ResolutionError),
    #[error("io error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("json error on {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("rerun error: {0}")]
    Recording(#[from] rerun::RecordingStreamError),
}
