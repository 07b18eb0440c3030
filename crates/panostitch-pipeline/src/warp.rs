//! Perspective resampling of an image onto a canvas.
//!
//! The [`PerspectiveWarper`] trait is the seam between the compositor and
//! the pixel resampler, so compositing can be tested with any warper.
//! [`ProjectionWarper`] is the production implementation backed by
//! `imageproc::geometric_transformations::warp_into`.

use image::{Rgb, RgbImage};
use imageproc::geometric_transformations::{Interpolation, Projection, warp_into};
use serde::{Deserialize, Serialize};

use crate::homography::Homography;
use crate::types::{Dimensions, StitchError};

/// Pixel interpolation used when resampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WarpInterpolation {
    /// Nearest neighbour: exact source pixel values, blocky under scale.
    Nearest,
    /// Bilinear: smooth, the usual choice for photographs.
    #[default]
    Bilinear,
    /// Bicubic: sharper, slower.
    Bicubic,
}

impl WarpInterpolation {
    const fn to_imageproc(self) -> Interpolation {
        match self {
            Self::Nearest => Interpolation::Nearest,
            Self::Bilinear => Interpolation::Bilinear,
            Self::Bicubic => Interpolation::Bicubic,
        }
    }
}

/// Resample an image through a homography into a canvas of a given size.
pub trait PerspectiveWarper {
    /// Warp `image` through `transform` (source -> canvas coordinates)
    /// into a `size` canvas. Canvas pixels outside the warped footprint
    /// are zero.
    ///
    /// # Errors
    ///
    /// Returns [`StitchError::NonInvertibleHomography`] if the transform
    /// cannot be inverted for backward mapping.
    fn warp(
        &self,
        image: &RgbImage,
        transform: &Homography,
        size: Dimensions,
    ) -> Result<RgbImage, StitchError>;
}

/// [`PerspectiveWarper`] backed by `imageproc`'s projective warp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProjectionWarper {
    interpolation: WarpInterpolation,
}

impl ProjectionWarper {
    /// Create a warper using the given interpolation.
    #[must_use]
    pub const fn new(interpolation: WarpInterpolation) -> Self {
        Self { interpolation }
    }
}

impl PerspectiveWarper for ProjectionWarper {
    fn warp(
        &self,
        image: &RgbImage,
        transform: &Homography,
        size: Dimensions,
    ) -> Result<RgbImage, StitchError> {
        // Reject singular transforms before narrowing to f32.
        if transform.inverse().is_none() {
            return Err(StitchError::NonInvertibleHomography);
        }
        let projection = Projection::from_matrix(transform.normalized().to_row_major_f32())
            .ok_or(StitchError::NonInvertibleHomography)?;

        let mut canvas = RgbImage::new(size.width, size.height);
        warp_into(
            image,
            &projection,
            self.interpolation.to_imageproc(),
            Rgb([0, 0, 0]),
            &mut canvas,
        );
        Ok(canvas)
    }
}
