//! Pairwise alignment: estimate the homography that maps a source image
//! onto a reference image.
//!
//! [`FeatureAligner`] runs detection, two-nearest-neighbour matching,
//! Lowe's ratio test and robust estimation through the collaborator
//! traits of [`features`](crate::features),
//! [`matching`](crate::matching) and [`ransac`](crate::ransac). The
//! [`Aligner`] trait lets the stitcher run with any other source of
//! homographies, e.g. a fixed one in tests.

use image::RgbImage;

use crate::features::{BriefExtractor, FeatureExtractor, Keypoint};
use crate::homography::Homography;
use crate::matching::{BruteForceMatcher, DMatch, DescriptorMatcher, ratio_test};
use crate::ransac::{HomographyEstimator, RansacEstimator};
use crate::types::{Point, StitchConfig, StitchError};

/// A source-to-reference homography and the evidence behind it.
#[derive(Debug, Clone, PartialEq)]
pub struct Alignment {
    /// Maps source image coordinates into the reference frame.
    pub homography: Homography,
    /// Keypoints found in the source image.
    pub source_keypoints: usize,
    /// Keypoints found in the reference image.
    pub reference_keypoints: usize,
    /// Query descriptors that received at least one candidate.
    pub raw_matches: usize,
    /// Matches surviving the ratio test.
    pub good_matches: usize,
    /// Good matches consistent with the homography.
    pub inliers: usize,
}

impl Alignment {
    /// An alignment with a known homography and no match statistics.
    #[must_use]
    pub const fn fixed(homography: Homography) -> Self {
        Self {
            homography,
            source_keypoints: 0,
            reference_keypoints: 0,
            raw_matches: 0,
            good_matches: 0,
            inliers: 0,
        }
    }
}

/// Estimates the homography mapping `source` onto `reference`.
pub trait Aligner {
    /// Align `source` to `reference`.
    ///
    /// # Errors
    ///
    /// Returns [`StitchError::InsufficientMatches`] or
    /// [`StitchError::HomographyEstimationFailed`] when no trustworthy
    /// homography can be found.
    fn align(&self, source: &RgbImage, reference: &RgbImage) -> Result<Alignment, StitchError>;
}

/// Feature-based aligner built from pluggable collaborators.
#[derive(Debug)]
pub struct FeatureAligner<F, M, E> {
    extractor: F,
    matcher: M,
    estimator: E,
    ratio: f32,
    min_matches: usize,
}

impl<F, M, E> FeatureAligner<F, M, E> {
    /// Assemble an aligner. A stitch proceeds only with more than
    /// `min_matches` matches passing the `ratio` test.
    #[must_use]
    pub const fn new(extractor: F, matcher: M, estimator: E, ratio: f32, min_matches: usize) -> Self {
        Self {
            extractor,
            matcher,
            estimator,
            ratio,
            min_matches,
        }
    }
}

impl FeatureAligner<BriefExtractor, BruteForceMatcher, RansacEstimator> {
    /// FAST/BRIEF features, brute-force Hamming matching and seeded RANSAC,
    /// parameterised by `config`.
    #[must_use]
    pub fn from_config(config: &StitchConfig) -> Self {
        Self::new(
            BriefExtractor::from_config(config),
            BruteForceMatcher,
            RansacEstimator::new(
                config.ransac_threshold,
                config.ransac_max_iterations,
                config.ransac_seed,
            ),
            config.ratio,
            config.min_matches,
        )
    }
}

fn matched_points(matches: &[DMatch], src: &[Keypoint], dst: &[Keypoint]) -> (Vec<Point>, Vec<Point>) {
    matches
        .iter()
        .map(|m| (src[m.query].position, dst[m.train].position))
        .unzip()
}

impl<F, M, E> Aligner for FeatureAligner<F, M, E>
where
    F: FeatureExtractor,
    M: DescriptorMatcher<F::Descriptor>,
    E: HomographyEstimator,
{
    fn align(&self, source: &RgbImage, reference: &RgbImage) -> Result<Alignment, StitchError> {
        let src = self.extractor.detect_and_describe(source)?;
        let dst = self.extractor.detect_and_describe(reference)?;
        log::debug!(
            "keypoints: {} source, {} reference",
            src.len(),
            dst.len()
        );

        let knn = self.matcher.knn_match(&src.descriptors, &dst.descriptors, 2);
        let raw_matches = knn.iter().filter(|c| !c.is_empty()).count();
        let good = ratio_test(&knn, self.ratio);
        log::debug!(
            "matches: {raw_matches} raw, {} after ratio test {}",
            good.len(),
            self.ratio
        );
        if good.len() <= self.min_matches {
            return Err(StitchError::InsufficientMatches {
                found: good.len(),
                required: self.min_matches,
            });
        }

        let (src_pts, dst_pts) = matched_points(&good, &src.keypoints, &dst.keypoints);
        let fit = self
            .estimator
            .estimate(&src_pts, &dst_pts)
            .ok_or(StitchError::HomographyEstimationFailed)?;
        log::debug!("homography: {} of {} inliers", fit.inlier_count, good.len());

        Ok(Alignment {
            homography: fit.homography,
            source_keypoints: src.len(),
            reference_keypoints: dst.len(),
            raw_matches,
            good_matches: good.len(),
            inliers: fit.inlier_count,
        })
    }
}
