use charuco_intrinsic_calibration::camera_model::{RationalPolynomial, undistort};
use charuco_intrinsic_calibration::data_loader::load_image;
use charuco_intrinsic_calibration::resolution::{ResolutionTableConfig, build_resolution_table};
use charuco_intrinsic_calibration::visualization::side_by_side;
use std::path::Path;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let Some(path) = std::env::args().nth(1) else {
        eprintln!("Usage: undistort_image <image_path> [resolution]");
        return Ok(());
    };
    let resolution: u32 = std::env::args()
        .nth(2)
        .and_then(|s| s.parse().ok())
        .unwrap_or(1);

    let img = load_image(Path::new(&path))?;
    let table = build_resolution_table(&ResolutionTableConfig::k16vga())?;
    let Some(profile) = table.get(resolution) else {
        eprintln!("unknown resolution {}", resolution);
        return Ok(());
    };
    let img = img.resize_exact(
        profile.image_size.width,
        profile.image_size.height,
        image::imageops::FilterType::Triangle,
    );
    let camera_matrix = profile.camera_matrix();
    let model = RationalPolynomial::from_camera_matrix(
        &camera_matrix,
        &table.distortion,
        profile.image_size.width,
        profile.image_size.height,
    );
    let corrected = undistort(&img, &model, &camera_matrix);
    side_by_side(&img, &corrected).save("undistorted.png")?;
    Ok(())
}
