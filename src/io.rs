use std::path::Path;

use nalgebra as na;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::CalibError;
use crate::detected_points::ObservationSet;
use crate::optimization::{CalibrationFlags, CalibrationResult};

/// Serializes an object to a JSON file.
pub fn object_to_json<T: Serialize>(output_path: &Path, object: &T) -> Result<(), CalibError> {
    let j = serde_json::to_string_pretty(object).map_err(|source| CalibError::Json {
        path: output_path.display().to_string(),
        source,
    })?;
    std::fs::write(output_path, j).map_err(|source| CalibError::Io {
        path: output_path.display().to_string(),
        source,
    })
}

/// Deserializes an object from a JSON file.
pub fn object_from_json<T: DeserializeOwned>(file_path: &Path) -> Result<T, CalibError> {
    let contents = std::fs::read_to_string(file_path).map_err(|source| CalibError::Io {
        path: file_path.display().to_string(),
        source,
    })?;
    serde_json::from_str(&contents).map_err(|source| CalibError::Json {
        path: file_path.display().to_string(),
        source,
    })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewReport {
    pub image: String,
    pub rms_error: f64,
    pub rvec: [f64; 3],
    pub tvec: [f64; 3],
    pub std_dev: [f64; 6],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedReport {
    pub image: String,
    pub corner_count: usize,
}

/// Everything a calibration run produced, as written to `calibration.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationReport {
    pub timestamp: String,
    pub image_width: u32,
    pub image_height: u32,
    pub rms: f64,
    pub initial_rms: f64,
    /// Row-major 3x3.
    pub camera_matrix: [[f64; 3]; 3],
    /// `[k1, k2, p1, p2, k3, k4, k5, k6]`
    pub distortion: Vec<f64>,
    pub std_dev_intrinsics: Vec<f64>,
    pub flags: CalibrationFlags,
    pub views: Vec<ViewReport>,
    pub skipped: Vec<SkippedReport>,
}

impl CalibrationReport {
    pub fn new(
        result: &CalibrationResult,
        observations: &ObservationSet,
        timestamp: String,
    ) -> CalibrationReport {
        let image_name = |idx: usize| {
            observations
                .image_paths
                .get(idx)
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| format!("#{}", idx))
        };
        let views = result
            .image_indices
            .iter()
            .zip(&result.extrinsics)
            .zip(&result.per_view_errors)
            .zip(&result.std_dev_extrinsics)
            .map(|(((idx, rt), rms), std_dev)| ViewReport {
                image: image_name(*idx),
                rms_error: *rms,
                rvec: rt.rvec.into(),
                tvec: rt.tvec.into(),
                std_dev: *std_dev,
            })
            .collect();
        let skipped = observations
            .skipped
            .iter()
            .map(|s| SkippedReport {
                image: s.path.display().to_string(),
                corner_count: s.corner_count,
            })
            .collect();
        let m = &result.camera_matrix;
        CalibrationReport {
            timestamp,
            image_width: result.img_w_h.0,
            image_height: result.img_w_h.1,
            rms: result.rms,
            initial_rms: result.initial_rms,
            camera_matrix: [0, 1, 2].map(|r| [m[(r, 0)], m[(r, 1)], m[(r, 2)]]),
            distortion: result.distortion.to_vec(),
            std_dev_intrinsics: result.std_dev_intrinsics.clone(),
            flags: result.flags,
            views,
            skipped,
        }
    }

    pub fn camera_matrix(&self) -> na::Matrix3<f64> {
        na::Matrix3::from_fn(|r, c| self.camera_matrix[r][c])
    }
}

/// Human readable summary: rms, camera matrix, distortion and per-view errors.
pub fn format_report(result: &CalibrationResult, observations: &ObservationSet) -> String {
    let mut s = String::new();
    s += format!(
        "image size: {} x {}\n",
        result.img_w_h.0, result.img_w_h.1
    )
    .as_str();
    s += format!(
        "views: {} accepted, {} skipped\n\n",
        result.extrinsics.len(),
        observations.skipped.len()
    )
    .as_str();
    s += format!("reprojection error (rms): {:.5} px\n", result.rms).as_str();
    s += format!("camera matrix:{}", result.camera_matrix).as_str();
    s += format!("distortion: {:?}\n\n", result.distortion).as_str();
    for (idx, rms) in result.image_indices.iter().zip(&result.per_view_errors) {
        let name = observations
            .image_paths
            .get(*idx)
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        s += format!("    {}: {:.5} px\n", name, rms).as_str();
    }
    for skipped in &observations.skipped {
        s += format!(
            "    {}: skipped, {} corners\n",
            skipped.path.display(),
            skipped.corner_count
        )
        .as_str();
    }
    s
}

pub fn write_report(
    output_path: &Path,
    result: &CalibrationResult,
    observations: &ObservationSet,
) -> Result<(), CalibError> {
    std::fs::write(output_path, format_report(result, observations)).map_err(|source| {
        CalibError::Io {
            path: output_path.display().to_string(),
            source,
        }
    })
}
