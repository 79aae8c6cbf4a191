//! Image compression before upload.
//!
//! Images are downscaled so the longer edge fits a maximum, then JPEG
//! quality is binary-searched for a bounded number of rounds to land near a
//! target byte size.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::RgbImage;
use tracing::debug;

use crate::constants::MAX_QUALITY_ITERATIONS;
use crate::error::ImageError;

const MIN_QUALITY: u8 = 10;
const MAX_QUALITY: u8 = 95;

/// Accepted deviation from the target size, in percent.
const TOLERANCE_PERCENT: usize = 10;

pub fn within_tolerance(len: usize, target: usize) -> bool {
    len.abs_diff(target) * 100 <= target * TOLERANCE_PERCENT
}

/// Downscale and re-encode `bytes` as JPEG near `target_bytes`.
pub fn compress_for_upload(
    bytes: &[u8],
    max_edge: u32,
    target_bytes: usize,
) -> Result<Vec<u8>, ImageError> {
    if bytes.is_empty() {
        return Err(ImageError::Empty);
    }

    let mut img = image::load_from_memory(bytes)?;
    if img.width().max(img.height()) > max_edge {
        img = img.resize(max_edge, max_edge, FilterType::Lanczos3);
    }
    let rgb = img.to_rgb8();

    let encoded = search_quality(target_bytes, |quality| encode_jpeg(&rgb, quality))?;
    debug!(
        original = bytes.len(),
        compressed = encoded.len(),
        width = rgb.width(),
        height = rgb.height(),
        "Compressed image for upload"
    );
    Ok(encoded)
}

fn encode_jpeg(rgb: &RgbImage, quality: u8) -> Result<Vec<u8>, ImageError> {
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality).encode_image(rgb)?;
    Ok(buf)
}

/// Binary search over quality. Returns the first encoding within tolerance,
/// else the largest encoding not above target, else the smallest produced.
pub fn search_quality<F>(target_bytes: usize, mut encode: F) -> Result<Vec<u8>, ImageError>
where
    F: FnMut(u8) -> Result<Vec<u8>, ImageError>,
{
    let (mut lo, mut hi) = (MIN_QUALITY, MAX_QUALITY);
    let mut under: Option<Vec<u8>> = None;
    let mut smallest_over: Option<Vec<u8>> = None;

    for _ in 0..MAX_QUALITY_ITERATIONS {
        if lo > hi {
            break;
        }
        let quality = lo + (hi - lo) / 2;
        let encoded = encode(quality)?;

        if within_tolerance(encoded.len(), target_bytes) {
            return Ok(encoded);
        }
        if encoded.len() > target_bytes {
            if smallest_over.as_ref().map_or(true, |s| encoded.len() < s.len()) {
                smallest_over = Some(encoded);
            }
            if quality == MIN_QUALITY {
                break;
            }
            hi = quality - 1;
        } else {
            under = Some(encoded);
            lo = quality + 1;
        }
    }

    under.or(smallest_over).ok_or(ImageError::Empty)
}
