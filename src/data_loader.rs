use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::board::Board;
use crate::detected_points::{FeaturePoint, FrameFeature, ObservationSet, SkippedImage};
use crate::detector::CornerDetector;
use crate::visualization::{log_feature_frame, log_image_as_compressed};
use glob::glob;
use image::{DynamicImage, GrayImage, ImageReader};
use indicatif::ParallelProgressIterator;
use rayon::prelude::*;
use rerun::TimeCell;
use thiserror::Error;

/// Interpolation needs more than three corners for a usable view.
pub const MIN_CORNERS: usize = 4;

const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

#[derive(Debug, Error)]
pub enum DataLoadError {
    #[error("failed to load image {path}: {source}")]
    ImageLoad {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("invalid image pattern {pattern}: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },
    #[error("no images found for {0}")]
    NoImages(String),
    #[error("image {path} is {got:?} but previous images are {expected:?}")]
    ImageSizeMismatch {
        path: PathBuf,
        expected: (u32, u32),
        got: (u32, u32),
    },
}

/// Too few interpolated corners. Recovered by skipping the image.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("only {corner_count} corners detected, need at least {min_corners}")]
pub struct InsufficientDetection {
    pub corner_count: usize,
    pub min_corners: usize,
}

fn is_image_path(p: &Path) -> bool {
    p.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn img_filter(rp: glob::GlobResult) -> Option<PathBuf> {
    match rp {
        Ok(p) if is_image_path(&p) => Some(p),
        _ => None,
    }
}

/// Numeric file stems sort by value so `10.jpg` comes after `9.jpg`.
fn path_sort_key(path: &Path) -> (Option<u64>, PathBuf) {
    let number = path
        .file_stem()
        .and_then(|s| s.to_str())
        .and_then(|s| s.parse::<u64>().ok());
    (number, path.to_path_buf())
}

fn expand_source(source: &str) -> Result<Vec<PathBuf>, DataLoadError> {
    let path = Path::new(source);
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    let pattern = if path.is_dir() {
        format!("{}/*", source.trim_end_matches('/'))
    } else {
        source.to_string()
    };
    let img_paths = glob(&pattern).map_err(|source| DataLoadError::Pattern {
        pattern: pattern.clone(),
        source,
    })?;
    let mut sorted_path: Vec<PathBuf> = img_paths.filter_map(img_filter).collect();
    sorted_path.sort_by_key(|p| path_sort_key(p));
    Ok(sorted_path)
}

/// Resolves image sources into an ordered path list.
///
/// Each source is an image file (kept in the given order), a directory (all
/// images inside, sorted) or a glob pattern (matches, sorted).
pub fn resolve_image_sources(sources: &[String]) -> Result<Vec<PathBuf>, DataLoadError> {
    let mut all_paths = Vec::new();
    for source in sources {
        let paths = expand_source(source)?;
        log::trace!("{} -> {} images", source, paths.len());
        all_paths.extend(paths);
    }
    if all_paths.is_empty() {
        return Err(DataLoadError::NoImages(sources.join(", ")));
    }
    Ok(all_paths)
}

pub fn load_image(path: &Path) -> Result<DynamicImage, DataLoadError> {
    ImageReader::open(path)
        .map_err(image::ImageError::IoError)
        .and_then(|reader| reader.decode())
        .map_err(|source| DataLoadError::ImageLoad {
            path: path.to_path_buf(),
            source,
        })
}

pub fn load_gray(path: &Path) -> Result<GrayImage, DataLoadError> {
    Ok(load_image(path)?.to_luma8())
}

/// Detects corners in an image and converts them to a `FrameFeature`.
///
/// Corners whose id is not on the board are dropped before counting.
pub fn image_to_feature_frame(
    detector: &dyn CornerDetector,
    img: &GrayImage,
    board: &Board,
    min_corners: usize,
    image_idx: usize,
) -> Result<FrameFeature, InsufficientDetection> {
    let features: BTreeMap<u32, FeaturePoint> = detector
        .detect(img)
        .into_iter()
        .filter_map(|(id, p2d)| {
            board
                .id_to_3d
                .get(&id)
                .map(|p3d| (id, FeaturePoint { p2d, p3d: *p3d }))
        })
        .collect();
    if features.len() < min_corners {
        Err(InsufficientDetection {
            corner_count: features.len(),
            min_corners,
        })
    } else {
        Ok(FrameFeature {
            image_idx,
            img_w_h: (img.width(), img.height()),
            features,
        })
    }
}

type PerImage = (usize, (u32, u32), Result<FrameFeature, InsufficientDetection>);

/// Loads every image, detects corners in parallel and accumulates the
/// accepted frames in input order.
///
/// A decode failure aborts the run. Images with too few corners are
/// recorded in `ObservationSet::skipped`.
pub fn collect_corners(
    img_paths: &[PathBuf],
    detector: &dyn CornerDetector,
    board: &Board,
    min_corners: usize,
    recording_option: Option<&rerun::RecordingStream>,
) -> Result<ObservationSet, DataLoadError> {
    let mut per_image: Vec<PerImage> = img_paths
        .par_iter()
        .enumerate()
        .progress_count(img_paths.len() as u64)
        .map(|(idx, path)| {
            log::trace!("processing {}", path.display());
            let img = load_gray(path)?;
            let frame = image_to_feature_frame(detector, &img, board, min_corners, idx);
            if let Some(recording) = recording_option {
                recording.set_time("image", TimeCell::from_sequence(idx as i64));
                log_image_as_compressed(recording, "cam0", &img, image::ImageFormat::Jpeg);
                if let Ok(f) = &frame {
                    log_feature_frame(recording, "cam0", f);
                }
            }
            Ok::<PerImage, DataLoadError>((idx, (img.width(), img.height()), frame))
        })
        .collect::<Result<_, DataLoadError>>()?;
    per_image.sort_by_key(|f| f.0);

    let mut observations = ObservationSet {
        image_paths: img_paths.to_vec(),
        ..Default::default()
    };
    let mut size: Option<(u32, u32)> = None;
    for (path, (_, img_w_h, frame)) in img_paths.iter().zip(per_image) {
        match size {
            Some(expected) if expected != img_w_h => {
                return Err(DataLoadError::ImageSizeMismatch {
                    path: path.clone(),
                    expected,
                    got: img_w_h,
                });
            }
            _ => size = Some(img_w_h),
        }
        match frame {
            Ok(f) => {
                log::debug!("{}: {} corners", path.display(), f.len());
                observations.frames.push(f);
            }
            Err(e) => {
                log::warn!("skip {}: {}", path.display(), e);
                observations.skipped.push(SkippedImage {
                    path: path.clone(),
                    corner_count: e.corner_count,
                });
            }
        }
    }
    observations.img_w_h = size.unwrap_or((0, 0));
    log::info!(
        "accepted {} of {} images, {} corners",
        observations.frames.len(),
        img_paths.len(),
        observations.total_corners()
    );
    Ok(observations)
}
