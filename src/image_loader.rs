//! Loading report pages and chart crops into OpenCV matrices
//!
//! Charts arrive as PNG or JPEG renders of PDF pages, sometimes as other
//! raster formats exported by report tooling. Everything is decoded with
//! the `image` crate and handed to the pipeline as an 8-bit BGR `Mat`.

use image::{ImageReader, RgbImage};
use opencv::{
    core::{Mat, Scalar, Vec3b, CV_8UC3},
    prelude::*,
};
use std::path::Path;

use crate::{ChartError, Result};

/// Load an image from disk as an 8-bit BGR matrix
///
/// # Errors
///
/// Returns [`ChartError::ImageLoadError`] when the file cannot be opened,
/// its format is not recognized or decoding fails.
///
/// # Example
///
/// ```rust,no_run
/// use scan_piecharts::image_loader::load_image;
/// use opencv::prelude::*;
/// use std::path::Path;
///
/// let page = load_image(Path::new("report-page-3.png"))?;
/// println!("{}x{}", page.cols(), page.rows());
/// # Ok::<(), scan_piecharts::ChartError>(())
/// ```
pub fn load_image(path: &Path) -> Result<Mat> {
    let reader = ImageReader::open(path)
        .map_err(|e| ChartError::image_load(format!("cannot open {}", path.display()), e))?
        .with_guessed_format()
        .map_err(|e| ChartError::image_load(format!("cannot read {}", path.display()), e))?;

    let decoded = reader
        .decode()
        .map_err(|e| ChartError::image_load(format!("cannot decode {}", path.display()), e))?;

    rgb_image_to_mat(&decoded.to_rgb8())
}

/// Decode an in-memory PNG/JPEG buffer, e.g. an image extracted from a PDF
pub fn load_image_from_memory(bytes: &[u8]) -> Result<Mat> {
    let decoded = image::load_from_memory(bytes).map_err(|e| ChartError::image_load("cannot decode buffer", e))?;
    rgb_image_to_mat(&decoded.to_rgb8())
}

/// Convert an RGB buffer to an OpenCV BGR matrix
pub fn rgb_image_to_mat(rgb: &RgbImage) -> Result<Mat> {
    let (width, height) = rgb.dimensions();
    if width == 0 || height == 0 {
        return Err(ChartError::processing("image has no pixels"));
    }

    let mut mat = Mat::new_rows_cols_with_default(height as i32, width as i32, CV_8UC3, Scalar::all(0.0))
        .map_err(|e| ChartError::opencv("allocate image", e))?;

    for (x, y, pixel) in rgb.enumerate_pixels() {
        let [r, g, b] = pixel.0;
        let target = mat
            .at_2d_mut::<Vec3b>(y as i32, x as i32)
            .map_err(|e| ChartError::opencv("write pixel", e))?;
        *target = Vec3b::from([b, g, r]);
    }

    Ok(mat)
}
