//! Per-resolution camera matrices derived from one reference calibration.
//!
//! A camera that can stream at several power-of-two subsamplings of its
//! native sensor resolution shares one set of distortion coefficients across
//! all of them, while focal length and principal point scale linearly with
//! the image dimension. The table is computed once from a base intrinsic
//! matrix and is read-only afterwards.

use std::collections::{BTreeMap, HashSet};

use nalgebra as na;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Native sensor resolution of the reference camera.
pub const K16VGA_RESOLUTION: ImageSize = ImageSize {
    width: 2560,
    height: 1920,
};

/// Resolution ids served by the reference camera, finest first.
pub const CAMERA_RESOLUTIONS: [u32; 7] = [1, 2, 3, 4, 5, 6, 7];

/// Top two rows of the reference camera matrix at 2560x1920.
pub const CAMERA_MATRIX_RESOLUTION_2560_1920: [[f64; 3]; 2] = [
    [2.41523736e+03, 0.00000000e+00, 1.25128063e+03],
    [0.00000000e+00, 2.41690366e+03, 9.94791007e+02],
];

/// `[k1, k2, p1, p2, k3]` of the reference camera.
pub const CAMERA_DISTORTION_COEFF: [f64; 5] =
    [0.13086823, -0.44239733, 0.0004841, -0.00322714, 0.16996254];

pub const DEFAULT_FPS: u32 = 5;

/// Beyond this exponent the scaled image is too small to be useful.
pub const MAX_SCALE_EXPONENT: u32 = 10;

#[derive(Debug, Error, PartialEq)]
pub enum ResolutionError {
    #[error("base matrix needs finite entries and positive focal lengths, got fx={fx} fy={fy}")]
    InvalidBaseMatrix { fx: f64, fy: f64 },
    #[error("base resolution {0} must be positive")]
    InvalidBaseResolution(ImageSize),
    #[error("resolution list is empty")]
    EmptyResolutionList,
    #[error("resolution {0} is listed twice")]
    DuplicateResolution(u32),
    #[error("resolution {resolution} needs scale 2^{exponent}, max is 2^{max}")]
    ScaleTooLarge {
        resolution: u32,
        exponent: u32,
        max: u32,
    },
    #[error("base {base} is not divisible by 2^{exponent} needed for resolution {resolution}")]
    InexactScale {
        resolution: u32,
        exponent: u32,
        base: ImageSize,
    },
    #[error("resolution {resolution} at scale 2^{exponent} degenerates to {width}x{height}")]
    DegenerateResolution {
        resolution: u32,
        exponent: u32,
        width: u32,
        height: u32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl std::fmt::Display for ImageSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Input of the table builder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolutionTableConfig {
    /// Top two rows of the intrinsic matrix at `base_resolution`.
    pub base_matrix: [[f64; 3]; 2],
    pub base_resolution: ImageSize,
    pub distortion: Vec<f64>,
    /// Resolution ids; the id at position `i` is scaled by `2^i`.
    pub resolutions: Vec<u32>,
    pub fps: u32,
}

impl Default for ResolutionTableConfig {
    fn default() -> Self {
        Self::k16vga()
    }
}

impl ResolutionTableConfig {
    /// The reference camera calibrated at 2560x1920.
    pub fn k16vga() -> Self {
        Self {
            base_matrix: CAMERA_MATRIX_RESOLUTION_2560_1920,
            base_resolution: K16VGA_RESOLUTION,
            distortion: CAMERA_DISTORTION_COEFF.to_vec(),
            resolutions: CAMERA_RESOLUTIONS.to_vec(),
            fps: DEFAULT_FPS,
        }
    }

    /// Uses a fitted camera as the base, keeping the default ids and fps.
    pub fn from_camera(
        camera_matrix: &na::Matrix3<f64>,
        distortion: &[f64],
        img_w_h: (u32, u32),
    ) -> Self {
        let row = |r: usize| {
            [
                camera_matrix[(r, 0)],
                camera_matrix[(r, 1)],
                camera_matrix[(r, 2)],
            ]
        };
        Self {
            base_matrix: [row(0), row(1)],
            base_resolution: ImageSize {
                width: img_w_h.0,
                height: img_w_h.1,
            },
            distortion: distortion.to_vec(),
            ..Self::k16vga()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionProfile {
    pub scale_exponent: u32,
    /// Row-major 3x3 camera matrix, bottom row always `[0, 0, 1]`.
    pub matrix: [[f64; 3]; 3],
    pub image_size: ImageSize,
    pub fps: u32,
}

impl ResolutionProfile {
    pub fn camera_matrix(&self) -> na::Matrix3<f64> {
        na::Matrix3::from_fn(|r, c| self.matrix[r][c])
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionTable {
    pub distortion: Vec<f64>,
    pub profiles: BTreeMap<u32, ResolutionProfile>,
}

impl ResolutionTable {
    pub fn get(&self, resolution: u32) -> Option<&ResolutionProfile> {
        self.profiles.get(&resolution)
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

fn validate_base(
    base_matrix: &[[f64; 3]; 2],
    base_resolution: ImageSize,
) -> Result<(), ResolutionError> {
    let fx = base_matrix[0][0];
    let fy = base_matrix[1][1];
    let finite = base_matrix.iter().flatten().all(|v| v.is_finite());
    if !finite || fx <= 0.0 || fy <= 0.0 {
        return Err(ResolutionError::InvalidBaseMatrix { fx, fy });
    }
    if base_resolution.width == 0 || base_resolution.height == 0 {
        return Err(ResolutionError::InvalidBaseResolution(base_resolution));
    }
    Ok(())
}

/// Scales the base calibration down by `2^exponent`.
///
/// Both base dimensions must divide evenly so every level keeps the base
/// aspect ratio and the principal point stays consistent with the image size.
pub fn scale_profile(
    base_matrix: &[[f64; 3]; 2],
    base_resolution: ImageSize,
    resolution: u32,
    exponent: u32,
    fps: u32,
) -> Result<ResolutionProfile, ResolutionError> {
    validate_base(base_matrix, base_resolution)?;
    scale_level(base_matrix, base_resolution, resolution, exponent, fps)
}

/// `scale_profile` on an already validated base.
fn scale_level(
    base_matrix: &[[f64; 3]; 2],
    base_resolution: ImageSize,
    resolution: u32,
    exponent: u32,
    fps: u32,
) -> Result<ResolutionProfile, ResolutionError> {
    if exponent > MAX_SCALE_EXPONENT {
        return Err(ResolutionError::ScaleTooLarge {
            resolution,
            exponent,
            max: MAX_SCALE_EXPONENT,
        });
    }
    let width = base_resolution.width >> exponent;
    let height = base_resolution.height >> exponent;
    if width == 0 || height == 0 {
        return Err(ResolutionError::DegenerateResolution {
            resolution,
            exponent,
            width,
            height,
        });
    }
    if width << exponent != base_resolution.width || height << exponent != base_resolution.height
    {
        return Err(ResolutionError::InexactScale {
            resolution,
            exponent,
            base: base_resolution,
        });
    }
    let scale = f64::from(1u32 << exponent);
    let scaled_row = |r: usize| base_matrix[r].map(|v| v / scale);
    Ok(ResolutionProfile {
        scale_exponent: exponent,
        matrix: [scaled_row(0), scaled_row(1), [0.0, 0.0, 1.0]],
        image_size: ImageSize { width, height },
        fps,
    })
}

/// Builds the full table. Any invalid level fails the whole build.
pub fn build_resolution_table(
    config: &ResolutionTableConfig,
) -> Result<ResolutionTable, ResolutionError> {
    validate_base(&config.base_matrix, config.base_resolution)?;
    if config.resolutions.is_empty() {
        return Err(ResolutionError::EmptyResolutionList);
    }
    let mut seen = HashSet::new();
    let mut profiles = BTreeMap::new();
    for (i, &resolution) in config.resolutions.iter().enumerate() {
        if !seen.insert(resolution) {
            return Err(ResolutionError::DuplicateResolution(resolution));
        }
        let exponent = u32::try_from(i).unwrap_or(u32::MAX);
        let profile = scale_level(
            &config.base_matrix,
            config.base_resolution,
            resolution,
            exponent,
            config.fps,
        )?;
        log::trace!(
            "resolution {} -> {} fx {:.3}",
            resolution,
            profile.image_size,
            profile.matrix[0][0]
        );
        profiles.insert(resolution, profile);
    }
    Ok(ResolutionTable {
        distortion: config.distortion.clone(),
        profiles,
    })
}
