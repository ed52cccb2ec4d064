use image::{DynamicImage, GenericImageView};
use nalgebra as na;
use rayon::prelude::*;

pub fn remap(src: &DynamicImage, map0: &na::DMatrix<f32>, map1: &na::DMatrix<f32>) -> DynamicImage {
    let (r, c) = map0.shape();
    let lookup = |x: u32, y: u32, w: u32, h: u32| -> Option<(u32, u32)> {
        let (x_cor, y_cor) = (map0[(y as usize, x as usize)], map1[(y as usize, x as usize)]);
        if x_cor.is_nan() || y_cor.is_nan() || x_cor < -0.5 || y_cor < -0.5 {
            return None;
        }
        let x_cor = x_cor.round() as u32;
        let y_cor = y_cor.round() as u32;
        if x_cor >= w || y_cor >= h {
            None
        } else {
            Some((x_cor, y_cor))
        }
    };
    match src {
        DynamicImage::ImageLuma8(img) => {
            let out_img = image::GrayImage::from_par_fn(c as u32, r as u32, |x, y| {
                lookup(x, y, img.width(), img.height())
                    .map(|(xs, ys)| *img.get_pixel(xs, ys))
                    .unwrap_or(image::Luma([0]))
            });
            DynamicImage::ImageLuma8(out_img)
        }
        DynamicImage::ImageRgb8(img) => {
            let out_img = image::RgbImage::from_par_fn(c as u32, r as u32, |x, y| {
                lookup(x, y, img.width(), img.height())
                    .map(|(xs, ys)| *img.get_pixel(xs, ys))
                    .unwrap_or(image::Rgb([0, 0, 0]))
            });
            DynamicImage::ImageRgb8(out_img)
        }
        other => {
            log::debug!("remap converts {:?} to rgb8", other.color());
            remap(&DynamicImage::ImageRgb8(other.to_rgb8()), map0, map1)
        }
    }
}

pub trait CameraModel<T: na::RealField + Clone>
where
    Self: Sync,
{
    fn params(&self) -> na::DVector<T>;
    fn width(&self) -> T;
    fn height(&self) -> T;
    fn project_one(&self, pt: &na::Vector3<T>) -> na::Vector2<T>;
    /// Projects points, `None` for points behind the camera or outside the image.
    fn project(&self, p3d: &[na::Vector3<T>]) -> Vec<Option<na::Vector2<T>>> {
        p3d.par_iter()
            .map(|pt| {
                if pt[2] <= T::zero() {
                    return None;
                }
                let p2d = self.project_one(pt);
                if p2d[0] < T::zero()
                    || p2d[0] > self.width()
                    || p2d[1] < T::zero()
                    || p2d[1] > self.height()
                {
                    None
                } else {
                    Some(p2d)
                }
            })
            .collect()
    }
}

/// Builds per-pixel source coordinates for an image rendered with the
/// pinhole `projection_mat` at size `new_w_h`. Maps are `height x width`.
pub fn init_undistort_map(
    camera_model: &dyn CameraModel<f64>,
    projection_mat: &na::Matrix3<f64>,
    new_w_h: (u32, u32),
) -> (na::DMatrix<f32>, na::DMatrix<f32>) {
    let fx = projection_mat[(0, 0)];
    let fy = projection_mat[(1, 1)];
    let cx = projection_mat[(0, 2)];
    let cy = projection_mat[(1, 2)];
    let (w, h) = new_w_h;
    let p3ds: Vec<na::Vector3<f64>> = (0..h)
        .into_par_iter()
        .flat_map_iter(|y| {
            (0..w).map(move |x| na::Vector3::new((x as f64 - cx) / fx, (y as f64 - cy) / fy, 1.0))
        })
        .collect();
    let p2ds = camera_model.project(&p3ds);
    let (xvec, yvec): (Vec<f32>, Vec<f32>) = p2ds
        .par_iter()
        .map(|xy| {
            if let Some(xy) = xy {
                (xy[0] as f32, xy[1] as f32)
            } else {
                (f32::NAN, f32::NAN)
            }
        })
        .unzip();
    let xmap = na::DMatrix::from_row_iterator(h as usize, w as usize, xvec);
    let ymap = na::DMatrix::from_row_iterator(h as usize, w as usize, yvec);
    (xmap, ymap)
}

/// Removes lens distortion, rendering with `camera_matrix` at the input size.
pub fn undistort(
    img: &DynamicImage,
    camera_model: &dyn CameraModel<f64>,
    camera_matrix: &na::Matrix3<f64>,
) -> DynamicImage {
    let (xmap, ymap) = init_undistort_map(camera_model, camera_matrix, img.dimensions());
    remap(img, &xmap, &ymap)
}
