use image::RgbImage;

/// Grayscale weights applied to the R, G and B channels.
pub const LUMA_WEIGHTS: [f64; 3] = [0.2125, 0.7154, 0.0721];

/// Luminance of a single RGB pixel, in [0, 255].
#[inline]
pub fn pixel_luma(px: &[u8; 3]) -> f64 {
    LUMA_WEIGHTS[0] * px[0] as f64 + LUMA_WEIGHTS[1] * px[1] as f64 + LUMA_WEIGHTS[2] * px[2] as f64
}

/// Mean grayscale luminance of a frame, in [0, 255].
///
/// Returns 0.0 for an empty frame.
pub fn luminance(frame: &RgbImage) -> f64 {
    let count = frame.width() as u64 * frame.height() as u64;
    if count == 0 {
        return 0.0;
    }
    let sum: f64 = frame.pixels().map(|p| pixel_luma(&p.0)).sum();
    sum / count as f64
}
