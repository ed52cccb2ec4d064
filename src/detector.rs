use calib_targets::aruco::builtins;
use calib_targets::charuco::{CharucoBoardSpec, CharucoDetectorParams, MarkerLayout};
use calib_targets::detect;
use glam::Vec2;
use image::GrayImage;

use crate::board::BoardConfig;

/// Finds interpolated ChArUco corners in a grayscale image.
///
/// Implementations own marker detection, sub-pixel refinement and corner
/// interpolation. Returned ids are ChArUco corner ids, positions are pixels.
pub trait CornerDetector: Sync {
    fn detect(&self, img: &GrayImage) -> Vec<(u32, Vec2)>;
}

/// ChArUco detector backed by `calib-targets`.
pub struct CharucoCornerDetector {
    params: CharucoDetectorParams,
}

impl CharucoCornerDetector {
    pub fn new(board_config: &BoardConfig) -> CharucoCornerDetector {
        // The 4x4 dictionaries are prefixes of DICT_4X4_1000, board
        // validation keeps marker ids inside the configured one.
        let spec = CharucoBoardSpec {
            rows: board_config.squares_y as _,
            cols: board_config.squares_x as _,
            cell_size: 1.0,
            marker_size_rel: (board_config.marker_length / board_config.square_length) as _,
            dictionary: builtins::DICT_4X4_1000,
            marker_layout: MarkerLayout::OpenCvCharuco,
        };
        CharucoCornerDetector {
            params: CharucoDetectorParams::for_board(&spec),
        }
    }
}

impl CornerDetector for CharucoCornerDetector {
    fn detect(&self, img: &GrayImage) -> Vec<(u32, Vec2)> {
        match detect::detect_charuco_default(img, self.params.clone()) {
            Ok(result) => result
                .detection
                .corners
                .iter()
                .filter_map(|c| c.id.map(|id| (id, Vec2::new(c.position.x, c.position.y))))
                .collect(),
            Err(e) => {
                log::debug!("charuco detection failed: {:?}", e);
                Vec::new()
            }
        }
    }
}
