//! Image decoding, uniform resizing, and foreground masks.
//!
//! Accepts raw image bytes (PNG, JPEG, BMP, WebP) and produces the 8-bit
//! RGB buffers every stitching stage works on. Background pixels are
//! all-zero; [`foreground_mask`] turns an image into the binary mask the
//! cropping strategies operate on.

use std::fmt;

use image::{GrayImage, Luma, Rgb, RgbImage};
use serde::{Deserialize, Serialize};

use crate::types::StitchError;

/// Mask value for foreground (non-background) pixels.
pub const FOREGROUND: u8 = 255;

/// Resampling filter used when resizing inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ResizeFilter {
    /// Nearest-neighbor: fastest, blocky artifacts.
    Nearest,
    /// Bilinear interpolation: fast, decent quality.
    #[default]
    Triangle,
    /// Bicubic (Catmull-Rom): moderate speed, good quality.
    CatmullRom,
    /// Gaussian: moderate speed, smooth output.
    Gaussian,
    /// Lanczos with 3 lobes: slowest, sharpest.
    Lanczos3,
}

impl ResizeFilter {
    /// Convert to the `image` crate's `FilterType`.
    const fn to_image_filter(self) -> image::imageops::FilterType {
        match self {
            Self::Nearest => image::imageops::FilterType::Nearest,
            Self::Triangle => image::imageops::FilterType::Triangle,
            Self::CatmullRom => image::imageops::FilterType::CatmullRom,
            Self::Gaussian => image::imageops::FilterType::Gaussian,
            Self::Lanczos3 => image::imageops::FilterType::Lanczos3,
        }
    }
}

impl fmt::Display for ResizeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nearest => f.write_str("Nearest"),
            Self::Triangle => f.write_str("Triangle"),
            Self::CatmullRom => f.write_str("CatmullRom"),
            Self::Gaussian => f.write_str("Gaussian"),
            Self::Lanczos3 => f.write_str("Lanczos3"),
        }
    }
}

/// Decode raw image bytes into an 8-bit RGB image.
///
/// Any alpha channel is dropped and higher bit depths are reduced.
///
/// # Errors
///
/// Returns [`StitchError::EmptyInput`] if `bytes` is empty.
/// Returns [`StitchError::ImageLoad`] if the format is unrecognized or
/// the data is corrupt.
pub fn decode(bytes: &[u8]) -> Result<RgbImage, StitchError> {
    if bytes.is_empty() {
        return Err(StitchError::EmptyInput);
    }

    let img = image::load_from_memory(bytes)?;
    Ok(img.to_rgb8())
}

/// Resize an image uniformly to `percent` of its size on both axes.
///
/// New dimensions are `round(side * percent / 100)`, never below one
/// pixel. `percent == 100` returns an unchanged copy.
#[must_use = "returns the resized image"]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn scale_percent(image: &RgbImage, percent: u32, filter: ResizeFilter) -> RgbImage {
    if percent == 100 {
        return image.clone();
    }

    let scale = f64::from(percent) / 100.0;
    let width = (f64::from(image.width()) * scale).round().max(1.0) as u32;
    let height = (f64::from(image.height()) * scale).round().max(1.0) as u32;
    image::imageops::resize(image, width, height, filter.to_image_filter())
}

/// Returns `true` if every channel of the pixel is zero.
#[must_use]
pub const fn is_background(pixel: &Rgb<u8>) -> bool {
    pixel.0[0] == 0 && pixel.0[1] == 0 && pixel.0[2] == 0
}

/// Build the binary foreground mask of an image.
///
/// A pixel is foreground ([`FOREGROUND`]) when its luma is greater than
/// zero, background (0) otherwise.
#[must_use = "returns the binary mask"]
pub fn foreground_mask(image: &RgbImage) -> GrayImage {
    let gray = image::imageops::grayscale(image);
    GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        if gray.get_pixel(x, y).0[0] > 0 {
            Luma([FOREGROUND])
        } else {
            Luma([0])
        }
    })
}
