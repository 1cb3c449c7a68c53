use image::{codecs::jpeg::JpegEncoder, imageops::FilterType, DynamicImage, ImageDecoder, ImageReader};
use std::io::Cursor;
use tracing::{debug, warn};

use crate::payload::ImagePayload;

const JPEG_QUALITY: u8 = 90;

/// Re-encodes `payload` as JPEG with its longer edge at most `max_dimension`.
///
/// EXIF orientation is applied first, so the output is upright. Aspect ratio is
/// preserved and images are never upscaled. Any decode or encode failure
/// returns the input unchanged.
pub fn normalize(payload: &ImagePayload, max_dimension: u32) -> ImagePayload {
    match try_normalize(payload, max_dimension) {
        Ok(resized) => resized,
        Err(e) => {
            warn!("⚠️ Resize failed, sending original image: {}", e);
            payload.clone()
        }
    }
}

fn try_normalize(payload: &ImagePayload, max_dimension: u32) -> anyhow::Result<ImagePayload> {
    anyhow::ensure!(max_dimension > 0, "max dimension must be positive");
    let bytes = payload.decode()?;
    let mut decoder = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()?
        .into_decoder()?;
    let orientation = decoder.orientation()?;
    let mut img = DynamicImage::from_decoder(decoder)?;
    img.apply_orientation(orientation);
    let (w, h) = (img.width(), img.height());

    let img = if w.max(h) > max_dimension {
        // `resize` fits within the box and keeps the aspect ratio
        img.resize(max_dimension, max_dimension, FilterType::Lanczos3)
    } else {
        img
    };
    debug!("normalized {}x{} ({:?}) -> {}x{}", w, h, orientation, img.width(), img.height());

    let mut out = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY);
    DynamicImage::ImageRgb8(img.to_rgb8()).write_with_encoder(encoder)?;
    Ok(ImagePayload::from_bytes("image/jpeg", &out))
}
