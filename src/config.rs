use serde::{Deserialize, Serialize};

use crate::board::BoardConfig;
use crate::data_loader::MIN_CORNERS;
use crate::optimization::{CalibrationFlags, CalibrationOptions, TermCriteria};

/// Everything a calibration run needs besides the image list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    pub board: BoardConfig,
    /// A frame is kept only with at least this many interpolated corners.
    pub min_corners: usize,
    pub initial_focal: f64,
    pub flags: CalibrationFlags,
    pub criteria: TermCriteria,
    /// Index into the image list used for the undistortion preview.
    pub preview_index: usize,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            board: BoardConfig::default(),
            min_corners: MIN_CORNERS,
            initial_focal: 1000.0,
            flags: CalibrationFlags::default(),
            criteria: TermCriteria::default(),
            preview_index: 2,
        }
    }
}

impl CalibrationConfig {
    pub fn calibration_options(&self) -> CalibrationOptions {
        CalibrationOptions {
            initial_focal: self.initial_focal,
            flags: self.flags,
            criteria: self.criteria,
        }
    }
}
