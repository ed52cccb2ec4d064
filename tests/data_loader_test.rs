use std::path::{Path, PathBuf};

use charuco_intrinsic_calibration::board::create_default_8x5_board;
use charuco_intrinsic_calibration::data_loader::{
    DataLoadError, InsufficientDetection, MIN_CORNERS, collect_corners, image_to_feature_frame,
    resolve_image_sources,
};
use charuco_intrinsic_calibration::detector::CornerDetector;
use glam::Vec2;
use image::GrayImage;

/// Reports as many corners as the value of the top left pixel, plus one id
/// that is not on the board.
struct PixelCountDetector;

impl CornerDetector for PixelCountDetector {
    fn detect(&self, img: &GrayImage) -> Vec<(u32, Vec2)> {
        let count = img.get_pixel(0, 0)[0] as u32;
        let mut corners: Vec<(u32, Vec2)> = (0..count)
            .map(|id| (id, Vec2::new(10.0 + id as f32, 20.0)))
            .collect();
        corners.push((999, Vec2::new(1.0, 1.0)));
        corners
    }
}

fn write_image(dir: &Path, name: &str, corner_count: u8, w_h: (u32, u32)) -> PathBuf {
    let mut img = GrayImage::new(w_h.0, w_h.1);
    img.put_pixel(0, 0, image::Luma([corner_count]));
    let path = dir.join(name);
    img.save(&path).unwrap();
    path
}

#[test]
fn test_feature_frame_filter() {
    let board = create_default_8x5_board();
    let mut img = GrayImage::new(32, 24);

    img.put_pixel(0, 0, image::Luma([3]));
    assert_eq!(
        image_to_feature_frame(&PixelCountDetector, &img, &board, MIN_CORNERS, 0).err(),
        Some(InsufficientDetection {
            corner_count: 3,
            min_corners: MIN_CORNERS
        })
    );

    img.put_pixel(0, 0, image::Luma([4]));
    let frame = image_to_feature_frame(&PixelCountDetector, &img, &board, MIN_CORNERS, 7).unwrap();
    assert_eq!(frame.len(), 4);
    assert_eq!(frame.image_idx, 7);
    assert_eq!(frame.img_w_h, (32, 24));
    assert!(!frame.features.contains_key(&999));
    assert_eq!(frame.features[&2].p2d, Vec2::new(12.0, 20.0));
    assert_eq!(frame.features[&2].p3d, board.id_to_3d[&2]);
}

#[test]
fn test_collect_corners_keeps_order_and_skips() {
    let dir = tempfile::tempdir().unwrap();
    let paths = vec![
        write_image(dir.path(), "0.png", 10, (32, 24)),
        write_image(dir.path(), "1.png", 2, (32, 24)),
        write_image(dir.path(), "2.png", 6, (32, 24)),
        write_image(dir.path(), "3.png", 0, (32, 24)),
        write_image(dir.path(), "4.png", 28, (32, 24)),
    ];
    let board = create_default_8x5_board();
    let observations =
        collect_corners(&paths, &PixelCountDetector, &board, MIN_CORNERS, None).unwrap();

    assert_eq!(observations.img_w_h, (32, 24));
    assert_eq!(observations.image_paths, paths);
    let accepted: Vec<(usize, usize)> = observations
        .frames
        .iter()
        .map(|f| (f.image_idx, f.len()))
        .collect();
    assert_eq!(accepted, vec![(0, 10), (2, 6), (4, 28)]);
    assert_eq!(observations.total_corners(), 44);
    let skipped: Vec<(PathBuf, usize)> = observations
        .skipped
        .iter()
        .map(|s| (s.path.clone(), s.corner_count))
        .collect();
    assert_eq!(skipped, vec![(paths[1].clone(), 2), (paths[3].clone(), 0)]);
    assert_eq!(
        observations.frame_path(&observations.frames[1]),
        Some(&paths[2])
    );
}

#[test]
fn test_collect_corners_rejects_mixed_sizes() {
    let dir = tempfile::tempdir().unwrap();
    let paths = vec![
        write_image(dir.path(), "0.png", 10, (32, 24)),
        write_image(dir.path(), "1.png", 10, (24, 32)),
    ];
    let board = create_default_8x5_board();
    let result = collect_corners(&paths, &PixelCountDetector, &board, MIN_CORNERS, None);
    match result {
        Err(DataLoadError::ImageSizeMismatch {
            path,
            expected,
            got,
        }) => {
            assert_eq!(path, paths[1]);
            assert_eq!(expected, (32, 24));
            assert_eq!(got, (24, 32));
        }
        other => panic!("unexpected {:?}", other.map(|o| o.frames.len())),
    }
}

#[test]
fn test_collect_corners_fails_on_unreadable_image() {
    let dir = tempfile::tempdir().unwrap();
    let good = write_image(dir.path(), "0.png", 10, (32, 24));
    let broken = dir.path().join("1.png");
    std::fs::write(&broken, b"not an image").unwrap();
    let board = create_default_8x5_board();
    let result = collect_corners(
        &[good, broken.clone()],
        &PixelCountDetector,
        &board,
        MIN_CORNERS,
        None,
    );
    assert!(matches!(result, Err(DataLoadError::ImageLoad { path, .. }) if path == broken));
}

#[test]
fn test_resolve_image_sources() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["10.png", "9.png", "2.JPG", "b.jpeg", "a.png"] {
        std::fs::write(dir.path().join(name), b"listed, not decoded").unwrap();
    }
    std::fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();

    let folder = dir.path().display().to_string();
    let names: Vec<String> = resolve_image_sources(&[folder])
        .unwrap()
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
        .collect();
    assert_eq!(names, vec!["a.png", "b.jpeg", "2.JPG", "9.png", "10.png"]);

    let pattern = format!("{}/*.png", dir.path().display());
    let single = dir.path().join("b.jpeg").display().to_string();
    let paths = resolve_image_sources(&[single, pattern]).unwrap();
    assert_eq!(paths.len(), 4);
    assert!(paths[0].ends_with("b.jpeg"));
    assert!(paths[1].ends_with("a.png"));
    assert!(paths[3].ends_with("10.png"));
}

#[test]
fn test_resolve_image_sources_empty() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();
    let folder = dir.path().display().to_string();
    assert!(matches!(
        resolve_image_sources(&[folder]),
        Err(DataLoadError::NoImages(_))
    ));
}
