use image::{DynamicImage, GenericImageView, GrayImage};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use rerun::RecordingStream;
use std::io::Cursor;

use crate::detected_points::FrameFeature;

pub fn log_image_as_compressed(
    recording: &RecordingStream,
    topic: &str,
    img: &GrayImage,
    format: image::ImageFormat,
) {
    let mut bytes: Vec<u8> = Vec::new();
    if let Err(e) = img.write_to(&mut Cursor::new(&mut bytes), format) {
        log::warn!("failed to encode {}: {}", topic, e);
        return;
    }
    if let Err(e) = recording.log(
        format!("{}/image", topic),
        &rerun::EncodedImage::from_file_contents(bytes),
    ) {
        log::warn!("failed to log {}: {}", topic, e);
    }
}

pub fn log_dynamic_image(recording: &RecordingStream, topic: &str, img: &DynamicImage) {
    let mut bytes: Vec<u8> = Vec::new();
    if let Err(e) = img.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png) {
        log::warn!("failed to encode {}: {}", topic, e);
        return;
    }
    if let Err(e) = recording.log(topic, &rerun::EncodedImage::from_file_contents(bytes)) {
        log::warn!("failed to log {}: {}", topic, e);
    }
}

pub fn id_to_color(id: usize) -> (u8, u8, u8, u8) {
    let mut rng = ChaCha8Rng::seed_from_u64(id as u64);
    let color_num = rng.random_range(0..2u32.pow(24));
    (
        ((color_num >> 16) % 256) as u8,
        ((color_num >> 8) % 256) as u8,
        (color_num % 256) as u8,
        255,
    )
}

/// rerun use top left corner as (0, 0)
pub fn rerun_shift(p2ds: &[(f32, f32)]) -> Vec<(f32, f32)> {
    p2ds.iter().map(|(x, y)| (*x + 0.5, *y + 0.5)).collect()
}

pub fn log_feature_frame(recording: &RecordingStream, topic: &str, frame: &FrameFeature) {
    let (pts, colors_labels): (Vec<_>, Vec<_>) = frame
        .features
        .iter()
        .map(|(id, p)| {
            let color = id_to_color(*id as usize);
            ((p.p2d.x, p.p2d.y), (color, id.to_string()))
        })
        .unzip();
    let (colors, labels): (Vec<_>, Vec<_>) = colors_labels.into_iter().unzip();
    let pts = rerun_shift(&pts);

    if let Err(e) = recording.log(
        format!("{}/pts", topic),
        &rerun::Points2D::new(pts)
            .with_colors(colors)
            .with_labels(labels)
            .with_radii([rerun::Radius::new_ui_points(5.0)]),
    ) {
        log::warn!("failed to log corners of {}: {}", topic, e);
    }
}

/// Places `left` and `right` next to each other on a black canvas.
pub fn side_by_side(left: &DynamicImage, right: &DynamicImage) -> DynamicImage {
    let (lw, lh) = left.dimensions();
    let (rw, rh) = right.dimensions();
    let mut canvas = image::RgbImage::new(lw + rw, lh.max(rh));
    image::imageops::replace(&mut canvas, &left.to_rgb8(), 0, 0);
    image::imageops::replace(&mut canvas, &right.to_rgb8(), lw as i64, 0);
    DynamicImage::ImageRgb8(canvas)
}
