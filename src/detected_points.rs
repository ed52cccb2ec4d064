use glam;
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy)]
pub struct FeaturePoint {
    pub p2d: glam::Vec2,
    pub p3d: glam::Vec3,
}

/// Corners accepted from one image, ordered by ChArUco id.
#[derive(Debug, Clone)]
pub struct FrameFeature {
    pub image_idx: usize,
    pub img_w_h: (u32, u32),
    pub features: BTreeMap<u32, FeaturePoint>,
}

impl FrameFeature {
    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

/// An image that was loaded but rejected by the corner-count filter.
#[derive(Debug, Clone)]
pub struct SkippedImage {
    pub path: PathBuf,
    pub corner_count: usize,
}

/// All accepted observations of one image sequence, in input order.
#[derive(Debug, Clone, Default)]
pub struct ObservationSet {
    pub image_paths: Vec<PathBuf>,
    pub frames: Vec<FrameFeature>,
    pub skipped: Vec<SkippedImage>,
    pub img_w_h: (u32, u32),
}

impl ObservationSet {
    pub fn total_corners(&self) -> usize {
        self.frames.iter().map(FrameFeature::len).sum()
    }

    pub fn frame_path(&self, frame: &FrameFeature) -> Option<&PathBuf> {
        self.image_paths.get(frame.image_idx)
    }
}
