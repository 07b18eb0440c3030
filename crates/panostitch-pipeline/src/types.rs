//! Shared types for the panostitch pipeline.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::blend::BlendStrategy;
use crate::crop::CropStrategy;
use crate::warp::WarpInterpolation;

/// Re-export `GrayImage` so downstream crates can reference binary
/// masks without depending on `image` directly.
pub use image::GrayImage;

/// Re-export `RgbImage`, the image type every stitching stage consumes
/// and produces.
pub use image::RgbImage;

/// A 2D point in floating-point image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal position (pixels from left edge).
    pub x: f64,
    /// Vertical position (pixels from top edge).
    pub y: f64,
}

impl Point {
    /// Create a new point.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Squared Euclidean distance to another point.
    #[must_use]
    pub fn distance_squared(self, other: Self) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx.mul_add(dx, dy * dy)
    }

    /// Euclidean distance to another point.
    #[must_use]
    pub fn distance(self, other: Self) -> f64 {
        self.distance_squared(other).sqrt()
    }
}

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Dimensions of an image buffer.
    #[must_use]
    pub fn of<P: image::Pixel>(image: &image::ImageBuffer<P, Vec<P::Subpixel>>) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
        }
    }

    /// Total pixel count.
    #[must_use]
    pub const fn area(self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Axis-aligned rectangle in integer pixel coordinates.
///
/// `(x, y)` is the top-left pixel; the rectangle covers columns
/// `x..x + width` and rows `y..y + height`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rectangle {
    /// Left column.
    pub x: u32,
    /// Top row.
    pub y: u32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Rectangle {
    /// Create a new rectangle.
    #[must_use]
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Rectangle covering a whole image of the given dimensions.
    #[must_use]
    pub const fn covering(dimensions: Dimensions) -> Self {
        Self::new(0, 0, dimensions.width, dimensions.height)
    }

    /// Area in pixels.
    #[must_use]
    pub const fn area(self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Returns `true` if the rectangle covers no pixels.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Translate by `(dx, dy)`; used to map a rectangle found inside a
    /// sub-image back into its parent's coordinates.
    #[must_use]
    pub const fn offset(self, dx: u32, dy: u32) -> Self {
        Self::new(self.x + dx, self.y + dy, self.width, self.height)
    }
}

impl fmt::Display for Rectangle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{}+{}+{}",
            self.width, self.height, self.x, self.y
        )
    }
}

/// Which pairwise stitch a failure occurred in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    /// Stage 1: left image warped onto the center image.
    LeftCenter,
    /// Stage 2: right image warped onto the stage-1 composite.
    RightComposite,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LeftCenter => f.write_str("stage 1 (left -> center)"),
            Self::RightComposite => f.write_str("stage 2 (right -> composite)"),
        }
    }
}

/// Configuration for the stitching pipeline.
///
/// All parameters have defaults matching the reference behaviour:
/// Lowe ratio 0.75, more than 10 good matches, RANSAC threshold 5 px.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StitchConfig {
    /// Lowe's ratio test factor. A match survives only if its distance is
    /// strictly less than `ratio` times the second-best distance.
    pub ratio: f32,

    /// A stitch proceeds only if the number of ratio-test survivors
    /// exceeds this value.
    pub min_matches: usize,

    /// RANSAC inlier threshold: maximum reprojection error in pixels.
    pub ransac_threshold: f64,

    /// Maximum number of RANSAC sampling iterations.
    pub ransac_max_iterations: usize,

    /// Seed for RANSAC sampling, so repeated runs are reproducible.
    pub ransac_seed: u64,

    /// FAST-9 intensity threshold for corner detection.
    pub fast_threshold: u8,

    /// Keep at most this many of the strongest corners per image.
    pub max_keypoints: usize,

    /// BRIEF descriptor length in bits. Must be a positive multiple of 128.
    pub brief_bits: usize,

    /// Seed for the BRIEF sampling pattern. Descriptors are only
    /// comparable between extractors built with the same seed.
    pub brief_seed: u64,

    /// Gaussian blur sigma applied before description. Non-positive
    /// disables the blur.
    pub blur_sigma: f32,

    /// Interpolation used when resampling the warped source image.
    pub interpolation: WarpInterpolation,

    /// How the warped and placed layers are merged.
    pub blend: BlendStrategy,

    /// How black warp borders are removed from the final panorama.
    pub crop: CropStrategy,

    /// Largest canvas (in pixels) a compositor call may allocate.
    /// Larger canvases indicate a pathological homography.
    pub max_canvas_pixels: u64,
}

impl StitchConfig {
    /// Default Lowe ratio.
    pub const DEFAULT_RATIO: f32 = 0.75;
    /// Default minimum number of good matches (exclusive).
    pub const DEFAULT_MIN_MATCHES: usize = 10;
    /// Default RANSAC reprojection threshold in pixels.
    pub const DEFAULT_RANSAC_THRESHOLD: f64 = 5.0;
    /// Default RANSAC iteration cap.
    pub const DEFAULT_RANSAC_MAX_ITERATIONS: usize = 2000;
    /// Default RANSAC seed.
    pub const DEFAULT_RANSAC_SEED: u64 = 0;
    /// Default FAST threshold.
    pub const DEFAULT_FAST_THRESHOLD: u8 = 20;
    /// Default keypoint cap per image.
    pub const DEFAULT_MAX_KEYPOINTS: usize = 1500;
    /// Default BRIEF length in bits.
    pub const DEFAULT_BRIEF_BITS: usize = 256;
    /// Default BRIEF pattern seed.
    pub const DEFAULT_BRIEF_SEED: u64 = 0;
    /// Default pre-description blur sigma.
    pub const DEFAULT_BLUR_SIGMA: f32 = 1.0;
    /// Default canvas sanity limit (100 megapixels).
    pub const DEFAULT_MAX_CANVAS_PIXELS: u64 = 100_000_000;

    /// Check every field against its valid range.
    ///
    /// # Errors
    ///
    /// Returns [`StitchError::InvalidConfig`] naming the first offending
    /// field.
    pub fn validate(&self) -> Result<(), StitchError> {
        if !(self.ratio > 0.0 && self.ratio <= 1.0) {
            return Err(StitchError::InvalidConfig(format!(
                "ratio must be in (0, 1], got {}",
                self.ratio
            )));
        }
        if !(self.ransac_threshold.is_finite() && self.ransac_threshold > 0.0) {
            return Err(StitchError::InvalidConfig(format!(
                "ransac_threshold must be positive, got {}",
                self.ransac_threshold
            )));
        }
        if self.ransac_max_iterations == 0 {
            return Err(StitchError::InvalidConfig(
                "ransac_max_iterations must be at least 1".to_string(),
            ));
        }
        if self.max_keypoints == 0 {
            return Err(StitchError::InvalidConfig(
                "max_keypoints must be at least 1".to_string(),
            ));
        }
        if self.brief_bits == 0 || self.brief_bits % 128 != 0 {
            return Err(StitchError::InvalidConfig(format!(
                "brief_bits must be a positive multiple of 128, got {}",
                self.brief_bits
            )));
        }
        if self.max_canvas_pixels == 0 {
            return Err(StitchError::InvalidConfig(
                "max_canvas_pixels must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for StitchConfig {
    fn default() -> Self {
        Self {
            ratio: Self::DEFAULT_RATIO,
            min_matches: Self::DEFAULT_MIN_MATCHES,
            ransac_threshold: Self::DEFAULT_RANSAC_THRESHOLD,
            ransac_max_iterations: Self::DEFAULT_RANSAC_MAX_ITERATIONS,
            ransac_seed: Self::DEFAULT_RANSAC_SEED,
            fast_threshold: Self::DEFAULT_FAST_THRESHOLD,
            max_keypoints: Self::DEFAULT_MAX_KEYPOINTS,
            brief_bits: Self::DEFAULT_BRIEF_BITS,
            brief_seed: Self::DEFAULT_BRIEF_SEED,
            blur_sigma: Self::DEFAULT_BLUR_SIGMA,
            interpolation: WarpInterpolation::default(),
            blend: BlendStrategy::default(),
            crop: CropStrategy::default(),
            max_canvas_pixels: Self::DEFAULT_MAX_CANVAS_PIXELS,
        }
    }
}

/// Errors that can occur while stitching.
#[derive(Debug, thiserror::Error)]
pub enum StitchError {
    /// The input image bytes were empty.
    #[error("input image data is empty")]
    EmptyInput,

    /// Failed to decode an input image.
    #[error("failed to load image: {0}")]
    ImageLoad(#[from] image::ImageError),

    /// Too few descriptor matches survived the ratio test.
    #[error("not enough matches: found {found}, need more than {required}")]
    InsufficientMatches {
        /// Number of ratio-test survivors.
        found: usize,
        /// Threshold the count had to exceed.
        required: usize,
    },

    /// The robust solver found no consistent homography.
    #[error("could not estimate a homography from the matched points")]
    HomographyEstimationFailed,

    /// The homography could not be inverted for resampling.
    #[error("homography is not invertible")]
    NonInvertibleHomography,

    /// The union canvas is empty, non-finite, or larger than the limit.
    #[error("degenerate canvas {width}x{height} (limit {max_pixels} pixels)")]
    DegenerateCanvas {
        /// Computed canvas width.
        width: i64,
        /// Computed canvas height.
        height: i64,
        /// Configured pixel limit.
        max_pixels: u64,
    },

    /// Keypoint description failed.
    #[error("feature extraction failed: {0}")]
    FeatureExtraction(String),

    /// Pipeline configuration is invalid.
    #[error("invalid stitch configuration: {0}")]
    InvalidConfig(String),

    /// A pairwise stitch failed inside a multi-image run.
    #[error("{stage} failed: {source}")]
    Stage {
        /// Which stitch failed.
        stage: Stage,
        /// The underlying failure.
        #[source]
        source: Box<StitchError>,
    },
}

impl StitchError {
    /// Wrap this error with the stage it occurred in.
    #[must_use]
    pub fn in_stage(self, stage: Stage) -> Self {
        Self::Stage {
            stage,
            source: Box::new(self),
        }
    }

    /// The innermost error, with any stage wrappers removed.
    #[must_use]
    pub fn root_cause(&self) -> &Self {
        match self {
            Self::Stage { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// The stage this error was raised in, if it was wrapped.
    #[must_use]
    pub const fn stage(&self) -> Option<Stage> {
        match self {
            Self::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}
