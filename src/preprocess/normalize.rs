//! Geometric and radiometric normalization into NHWC float tensors.

use super::{Preprocessing, decode_oriented};
use crate::error::{Error, Result};
use image::imageops::{self, FilterType};
use image::DynamicImage;
use ndarray::{Array3, Array4, Axis};
use std::path::Path;
use tracing::debug;

/// Resampling filter used for every resize. Must stay a smooth filter to
/// match training-time resizing.
const RESIZE_FILTER: FilterType = FilterType::Triangle;

/// Convert an already decoded image into a `[size, size, 3]` tensor.
///
/// The image is converted to RGB, resized to exactly `size × size`, widened
/// to `f32` in the 0–255 range and finally passed through `preprocessing`.
pub fn to_tensor(img: &DynamicImage, size: u32, preprocessing: Preprocessing) -> Result<Array3<f32>> {
    let rgb = img.to_rgb8();
    let resized = imageops::resize(&rgb, size, size, RESIZE_FILTER);

    let mut data: Vec<f32> = resized.into_raw().into_iter().map(f32::from).collect();
    preprocessing.apply(&mut data);

    let edge = size as usize;
    Array3::from_shape_vec((edge, edge, 3), data).map_err(|e| Error::Internal {
        message: format!("failed to shape image tensor: {e}"),
    })
}

/// Decode and normalize one image file.
pub fn normalize(path: &Path, size: u32, preprocessing: Preprocessing) -> Result<Array3<f32>> {
    let img = decode_oriented(path)?;
    to_tensor(&img, size, preprocessing)
}

/// Decode and normalize several images into one `[N, size, size, 3]` batch.
///
/// The batch is all-or-nothing: the first image that fails aborts the call
/// with an error naming that file.
pub fn normalize_many<P: AsRef<Path>>(
    paths: &[P],
    size: u32,
    preprocessing: Preprocessing,
) -> Result<Array4<f32>> {
    let edge = size as usize;
    let mut batch = Array4::<f32>::zeros((paths.len(), edge, edge, 3));

    for (i, path) in paths.iter().enumerate() {
        let tensor = normalize(path.as_ref(), size, preprocessing)?;
        batch.index_axis_mut(Axis(0), i).assign(&tensor);
    }

    debug!("Normalized {} image(s) to {}x{}", paths.len(), size, size);
    Ok(batch)
}
