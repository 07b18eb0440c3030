//! Keypoint detection and description.
//!
//! [`BriefExtractor`] finds FAST-9 corners and describes them with BRIEF
//! binary descriptors, both from `imageproc`. BRIEF compares pixel pairs
//! at fixed offsets around each keypoint; the offsets are drawn once per
//! extractor from a seeded generator, so descriptors of different images,
//! and of different extractors with the same seed, are comparable bit for
//! bit.

use image::{GrayImage, RgbImage};
use imageproc::binary_descriptors::BinaryDescriptor;
use imageproc::binary_descriptors::brief::{BriefDescriptor, TestPair, brief};
use imageproc::corners::{Corner, corners_fast9};
use imageproc::point::Point as PixelPoint;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::types::{Point, StitchConfig, StitchError};

/// Keypoints closer than this to the image edge are discarded: the BRIEF
/// sampling patch must fit inside the image.
const EDGE_MARGIN: u32 = 24;

/// Side of the square patch BRIEF test pairs are sampled from.
const PATCH_DIAMETER: u32 = 31;

/// A detected keypoint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keypoint {
    /// Position in image coordinates.
    pub position: Point,
    /// Detector response; larger is stronger.
    pub response: f32,
}

/// Keypoints and their descriptors, index-aligned.
#[derive(Debug, Clone)]
pub struct Features<D> {
    /// Detected keypoints.
    pub keypoints: Vec<Keypoint>,
    /// `descriptors[i]` describes `keypoints[i]`.
    pub descriptors: Vec<D>,
}

impl<D> Features<D> {
    /// Number of keypoints.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    /// Returns `true` if no keypoints were found.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }
}

/// Detects keypoints and computes a descriptor for each.
pub trait FeatureExtractor {
    /// Descriptor produced for each keypoint.
    type Descriptor;

    /// Detect and describe keypoints in `image`.
    ///
    /// # Errors
    ///
    /// Returns [`StitchError::FeatureExtraction`] if description fails.
    fn detect_and_describe(
        &self,
        image: &RgbImage,
    ) -> Result<Features<Self::Descriptor>, StitchError>;
}

/// Draw `bits` test pairs uniformly over the sampling patch.
fn sample_test_pairs(bits: usize, seed: u64) -> Vec<TestPair> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut point = || {
        PixelPoint::new(
            rng.random_range(0..PATCH_DIAMETER),
            rng.random_range(0..PATCH_DIAMETER),
        )
    };
    (0..bits)
        .map(|_| TestPair {
            p0: point(),
            p1: point(),
        })
        .collect()
}

/// FAST-9 corners described with BRIEF.
#[derive(Debug, Clone)]
pub struct BriefExtractor {
    fast_threshold: u8,
    max_keypoints: usize,
    bits: usize,
    blur_sigma: f32,
    test_pairs: Vec<TestPair>,
}

impl BriefExtractor {
    /// Create an extractor whose sampling pattern is drawn from `seed`.
    ///
    /// `bits` must be a positive multiple of 128. A non-positive
    /// `blur_sigma` disables the pre-description blur.
    #[must_use]
    pub fn new(
        fast_threshold: u8,
        max_keypoints: usize,
        bits: usize,
        blur_sigma: f32,
        seed: u64,
    ) -> Self {
        Self {
            fast_threshold,
            max_keypoints,
            bits,
            blur_sigma,
            test_pairs: sample_test_pairs(bits, seed),
        }
    }

    /// Create an extractor from the detection fields of a config.
    #[must_use]
    pub fn from_config(config: &StitchConfig) -> Self {
        Self::new(
            config.fast_threshold,
            config.max_keypoints,
            config.brief_bits,
            config.blur_sigma,
            config.brief_seed,
        )
    }

    /// Strongest corners that leave room for the sampling patch.
    fn detect(&self, gray: &GrayImage) -> Vec<Corner> {
        let (width, height) = gray.dimensions();
        let mut corners: Vec<Corner> = corners_fast9(gray, self.fast_threshold)
            .into_iter()
            .filter(|c| {
                c.x >= EDGE_MARGIN
                    && c.y >= EDGE_MARGIN
                    && c.x + EDGE_MARGIN < width
                    && c.y + EDGE_MARGIN < height
            })
            .collect();
        corners.sort_by(|a, b| b.score.total_cmp(&a.score));
        corners.truncate(self.max_keypoints);
        corners
    }
}

impl Default for BriefExtractor {
    fn default() -> Self {
        Self::from_config(&StitchConfig::default())
    }
}

impl FeatureExtractor for BriefExtractor {
    type Descriptor = BriefDescriptor;

    fn detect_and_describe(
        &self,
        image: &RgbImage,
    ) -> Result<Features<BriefDescriptor>, StitchError> {
        let gray = image::imageops::grayscale(image);
        let corners = self.detect(&gray);
        if corners.is_empty() {
            return Ok(Features {
                keypoints: Vec::new(),
                descriptors: Vec::new(),
            });
        }

        let smoothed = if self.blur_sigma > 0.0 {
            imageproc::filter::gaussian_blur_f32(&gray, self.blur_sigma)
        } else {
            gray
        };

        let locations: Vec<PixelPoint<u32>> =
            corners.iter().map(|c| PixelPoint::new(c.x, c.y)).collect();
        let (descriptors, _) = brief(&smoothed, &locations, self.bits, Some(&self.test_pairs))
            .map_err(StitchError::FeatureExtraction)?;
        if descriptors.len() != corners.len() {
            return Err(StitchError::FeatureExtraction(format!(
                "described {} of {} keypoints",
                descriptors.len(),
                corners.len()
            )));
        }

        let keypoints = descriptors
            .iter()
            .zip(&corners)
            .map(|(d, c)| {
                let p = d.position();
                Keypoint {
                    position: Point::new(f64::from(p.x), f64::from(p.y)),
                    response: c.score,
                }
            })
            .collect();

        Ok(Features {
            keypoints,
            descriptors,
        })
    }
}
