//! Small OpenCV helpers shared by the detectors
//!
//! Each helper wraps one OpenCV call and maps its error to
//! [`ChartError::OpenCvError`] naming the failed operation.

use opencv::{
    core::{Mat, Point, Rect, Scalar, Vec3b, Vector, BORDER_CONSTANT, CV_8UC1},
    imgproc::{self, bounding_rect, find_contours, get_structuring_element, CHAIN_APPROX_NONE},
    prelude::*,
};

use crate::{ChartError, Result};

pub(crate) type Contour = Vector<Point>;

/// BGR image to single-channel gray
pub(crate) fn to_gray(image: &Mat) -> Result<Mat> {
    let mut gray = Mat::default();
    imgproc::cvt_color_def(image, &mut gray, imgproc::COLOR_BGR2GRAY)
        .map_err(|e| ChartError::opencv("grayscale conversion", e))?;
    Ok(gray)
}

/// Brightest channel of each BGR pixel
pub(crate) fn max_channel(image: &Mat) -> Result<Mat> {
    let mut out = Mat::new_rows_cols_with_default(image.rows(), image.cols(), CV_8UC1, Scalar::all(0.0))
        .map_err(|e| ChartError::opencv("max channel allocation", e))?;
    for row in 0..image.rows() {
        for col in 0..image.cols() {
            let pixel = image
                .at_2d::<Vec3b>(row, col)
                .map_err(|e| ChartError::opencv("pixel read", e))?;
            let value = pixel[0].max(pixel[1]).max(pixel[2]);
            *out.at_2d_mut::<u8>(row, col)
                .map_err(|e| ChartError::opencv("pixel write", e))? = value;
        }
    }
    Ok(out)
}

/// Gamma lookup table: `255 * (i / 255)^(1 / gamma)`, truncated
pub(crate) fn gamma_table(gamma: f64) -> [u8; 256] {
    let inv = 1.0 / gamma;
    let mut table = [0u8; 256];
    for (i, entry) in table.iter_mut().enumerate() {
        *entry = ((i as f64 / 255.0).powf(inv) * 255.0) as u8;
    }
    table
}

/// Apply gamma correction to a single-channel image
pub(crate) fn gamma_correct(gray: &Mat, gamma: f64) -> Result<Mat> {
    let table = gamma_table(gamma);
    let mut out = gray
        .try_clone()
        .map_err(|e| ChartError::opencv("gamma copy", e))?;
    for row in 0..out.rows() {
        for col in 0..out.cols() {
            let value = out
                .at_2d_mut::<u8>(row, col)
                .map_err(|e| ChartError::opencv("gamma pixel", e))?;
            *value = table[*value as usize];
        }
    }
    Ok(out)
}

/// Intersect `rect` with the image area; `None` when nothing remains
pub(crate) fn clamp_rect(rect: Rect, width: i32, height: i32) -> Option<Rect> {
    let x0 = rect.x.max(0);
    let y0 = rect.y.max(0);
    let x1 = (rect.x + rect.width).min(width);
    let y1 = (rect.y + rect.height).min(height);
    (x1 > x0 && y1 > y0).then(|| Rect::new(x0, y0, x1 - x0, y1 - y0))
}

/// Owned copy of a region of `image`, clamped to its bounds
pub(crate) fn crop(image: &Mat, rect: Rect) -> Result<Mat> {
    let rect = clamp_rect(rect, image.cols(), image.rows()).ok_or_else(|| {
        ChartError::processing(format!(
            "crop {}x{}+{}+{} lies outside the {}x{} image",
            rect.width,
            rect.height,
            rect.x,
            rect.y,
            image.cols(),
            image.rows()
        ))
    })?;
    let roi = Mat::roi(image, rect).map_err(|e| ChartError::opencv("region of interest", e))?;
    roi.try_clone().map_err(|e| ChartError::opencv("crop copy", e))
}

/// Structuring element of `shape` (`MORPH_RECT`, `MORPH_ELLIPSE`)
pub(crate) fn kernel(shape: i32, width: i32, height: i32) -> Result<Mat> {
    get_structuring_element(
        shape,
        opencv::core::Size::new(width.max(1), height.max(1)),
        Point::new(-1, -1),
    )
    .map_err(|e| ChartError::opencv("structuring element", e))
}

pub(crate) fn dilate(src: &Mat, kernel: &Mat) -> Result<Mat> {
    let mut out = Mat::default();
    imgproc::dilate(
        src,
        &mut out,
        kernel,
        Point::new(-1, -1),
        1,
        BORDER_CONSTANT,
        Scalar::default(),
    )
    .map_err(|e| ChartError::opencv("dilation", e))?;
    Ok(out)
}

pub(crate) fn erode(src: &Mat, kernel: &Mat) -> Result<Mat> {
    let mut out = Mat::default();
    imgproc::erode(
        src,
        &mut out,
        kernel,
        Point::new(-1, -1),
        1,
        BORDER_CONSTANT,
        Scalar::default(),
    )
    .map_err(|e| ChartError::opencv("erosion", e))?;
    Ok(out)
}

/// Threshold a single-channel image; returns the mask and the level used
/// (meaningful with `THRESH_OTSU`)
pub(crate) fn threshold(src: &Mat, level: f64, kind: i32) -> Result<(Mat, f64)> {
    let mut out = Mat::default();
    let used = imgproc::threshold(src, &mut out, level, 255.0, kind)
        .map_err(|e| ChartError::opencv("threshold", e))?;
    Ok((out, used))
}

pub(crate) fn contours(mask: &Mat, mode: i32) -> Result<Vector<Contour>> {
    let mut found = Vector::<Contour>::new();
    find_contours(mask, &mut found, mode, CHAIN_APPROX_NONE, Point::new(0, 0))
        .map_err(|e| ChartError::opencv("contour search", e))?;
    Ok(found)
}

pub(crate) fn bounding_box(contour: &Contour) -> Result<Rect> {
    bounding_rect(contour).map_err(|e| ChartError::opencv("bounding rectangle", e))
}

/// Bounding boxes of the blobs of a binary mask, top-to-bottom then
/// left-to-right
pub(crate) fn block_boxes(mask: &Mat, mode: i32) -> Result<Vec<Rect>> {
    let mut boxes = contours(mask, mode)?
        .iter()
        .map(|c| bounding_box(&c))
        .collect::<Result<Vec<_>>>()?;
    boxes.sort_by_key(|r| (r.y, r.x));
    Ok(boxes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use opencv::core::CV_8UC3;

    #[test]
    fn test_gamma_table_endpoints() {
        for gamma in [0.1, 0.5, 1.8] {
            let table = gamma_table(gamma);
            assert_eq!(table[0], 0);
            assert_eq!(table[255], 255);
        }
        // gamma below one darkens mid-tones
        assert!(gamma_table(0.5)[128] < 128);
        assert!(gamma_table(1.8)[128] > 128);
    }

    #[test]
    fn test_clamp_rect() {
        let r = clamp_rect(Rect::new(-5, -5, 20, 20), 10, 10).unwrap();
        assert_eq!(r, Rect::new(0, 0, 10, 10));
        assert!(clamp_rect(Rect::new(12, 0, 5, 5), 10, 10).is_none());
    }

    #[test]
    fn test_max_channel() {
        let mut image =
            Mat::new_rows_cols_with_default(2, 2, CV_8UC3, Scalar::new(10.0, 200.0, 30.0, 0.0)).unwrap();
        *image.at_2d_mut::<Vec3b>(1, 1).unwrap() = Vec3b::from([5, 6, 7]);
        let max = max_channel(&image).unwrap();
        assert_eq!(*max.at_2d::<u8>(0, 0).unwrap(), 200);
        assert_eq!(*max.at_2d::<u8>(1, 1).unwrap(), 7);
    }

    #[test]
    fn test_crop_outside_image_fails() {
        let image = Mat::new_rows_cols_with_default(10, 10, CV_8UC3, Scalar::all(255.0)).unwrap();
        assert!(crop(&image, Rect::new(20, 20, 5, 5)).is_err());
        let inside = crop(&image, Rect::new(8, 8, 5, 5)).unwrap();
        assert_eq!((inside.cols(), inside.rows()), (2, 2));
    }
}
