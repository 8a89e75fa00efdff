//! Image decoding with EXIF orientation applied.

use crate::error::{Error, Result};
use image::metadata::Orientation;
use image::{DynamicImage, ImageDecoder, ImageError, ImageReader};
use std::path::Path;
use tracing::trace;

/// Decode an image file so that its pixel layout matches its visual orientation.
///
/// Missing orientation metadata is treated as "no transform".
pub fn decode_oriented(path: &Path) -> Result<DynamicImage> {
    if !path.is_file() {
        return Err(Error::ImageNotFound {
            path: path.to_path_buf(),
        });
    }

    let decode_error = |source: ImageError| Error::ImageDecode {
        path: path.to_path_buf(),
        source,
    };

    let reader = ImageReader::open(path)
        .and_then(ImageReader::with_guessed_format)
        .map_err(|e| decode_error(ImageError::IoError(e)))?;

    let mut decoder = reader.into_decoder().map_err(decode_error)?;
    let orientation = decoder.orientation().unwrap_or(Orientation::NoTransforms);
    let mut img = DynamicImage::from_decoder(decoder).map_err(decode_error)?;

    trace!("Orientation {:?} for {}", orientation, path.display());
    img.apply_orientation(orientation);

    Ok(img)
}
