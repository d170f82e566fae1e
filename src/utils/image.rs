//! Image decoding and encoding for uploaded files

use std::io::Cursor;

use image::{DynamicImage, ImageFormat};

use crate::engine::HwcImage;
use crate::error::{FilterError, Result};

/// Decode an uploaded image (JPEG, PNG, ...) to RGB8 with EXIF orientation
/// applied.
pub fn decode_image(data: &[u8]) -> Result<HwcImage> {
    let image = image::load_from_memory(data)
        .map_err(|e| FilterError::InvalidImage(format!("decode: {e}")))?;
    let oriented = apply_exif_orientation(data, image);
    HwcImage::try_from(oriented.to_rgb8())
}

/// Mobile phones often store a rotation tag instead of rotating pixels.
fn apply_exif_orientation(data: &[u8], image: DynamicImage) -> DynamicImage {
    let orientation = match exif::Reader::new().read_from_container(&mut Cursor::new(data)) {
        Ok(exif_data) => exif_data
            .get_field(exif::Tag::Orientation, exif::In::PRIMARY)
            .and_then(|field| field.value.get_uint(0))
            .unwrap_or(1),
        Err(_) => 1,
    };

    // https://exiftool.org/TagNames/EXIF.html (Orientation)
    match orientation {
        2 => image.fliph(),
        3 => image.rotate180(),
        4 => image.flipv(),
        5 => image.rotate90().fliph(),
        6 => image.rotate90(),
        7 => image.rotate270().fliph(),
        8 => image.rotate270(),
        _ => image,
    }
}

/// Encode an image to PNG bytes.
pub fn encode_png(image: &HwcImage) -> Result<Vec<u8>> {
    let rgb = image.to_rgb_image()?;
    let mut buffer = Cursor::new(Vec::new());
    rgb.write_to(&mut buffer, ImageFormat::Png)
        .map_err(|e| FilterError::Encode(e.to_string()))?;
    Ok(buffer.into_inner())
}
