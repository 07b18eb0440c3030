//! panostitch-pipeline: Three-image panorama stitching (sans-IO).
//!
//! Stitches left, center and right photographs into one panorama:
//! features -> matching -> RANSAC homography -> union canvas -> layer
//! blend, once for left onto center and once for right onto that
//! composite, followed by a border crop.
//!
//! This crate has **no I/O dependencies** -- it operates on in-memory
//! byte slices and image buffers. All filesystem and terminal
//! interaction lives in the `panostitch` binary.

pub mod align;
pub mod blend;
pub mod compose;
pub mod crop;
pub mod diagnostics;
pub mod features;
pub mod homography;
pub mod image_io;
pub mod matching;
pub mod ransac;
pub mod stitch;
pub mod types;
pub mod warp;

pub use align::{Aligner, Alignment, FeatureAligner};
pub use blend::{BlendStrategy, LayerBlender};
pub use compose::{CanvasGeometry, Composition, canvas_geometry, compose};
pub use crop::{BorderCropper, CropOutcome, CropStrategy};
pub use diagnostics::{CropDiagnostics, PairDiagnostics, PanoramaDiagnostics};
pub use homography::Homography;
pub use image_io::{ResizeFilter, decode, scale_percent};
pub use stitch::{DefaultAligner, Panorama, Stitcher};
pub use types::{
    Dimensions, GrayImage, Point, Rectangle, RgbImage, Stage, StitchConfig, StitchError,
};
pub use warp::{PerspectiveWarper, ProjectionWarper, WarpInterpolation};

/// Stitch three images with the default feature stack.
///
/// Convenience wrapper around [`Stitcher::new`] and
/// [`Stitcher::stitch_three`].
///
/// # Pipeline steps
///
/// 1. Align left onto center (FAST/BRIEF, ratio test, RANSAC)
/// 2. Compose and blend the stage-1 pair
/// 3. Align right onto the stage-1 composite
/// 4. Compose and blend the stage-2 pair
/// 5. Crop the black borders with `config.crop`
///
/// # Errors
///
/// Returns [`StitchError::InvalidConfig`] for a bad config, otherwise a
/// [`StitchError::Stage`] wrapping the first stage failure.
pub fn stitch_three(
    left: &RgbImage,
    center: &RgbImage,
    right: &RgbImage,
    config: &StitchConfig,
) -> Result<Panorama, StitchError> {
    Stitcher::new(config.clone())?.stitch_three(left, center, right)
}

/// Stitch `source` onto `reference` with the default feature stack.
///
/// # Errors
///
/// Returns [`StitchError::InvalidConfig`] for a bad config, otherwise the
/// failure of the alignment, compositing or warping step.
pub fn stitch_pair(
    source: &RgbImage,
    reference: &RgbImage,
    config: &StitchConfig,
) -> Result<RgbImage, StitchError> {
    Stitcher::new(config.clone())?.stitch_pair(source, reference)
}
