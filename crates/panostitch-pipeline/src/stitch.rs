//! Orchestration: pairwise stitches chained into a three-image panorama.
//!
//! A pairwise stitch aligns a source image to a reference image, composes
//! both onto their union canvas and blends the two layers. The three-image
//! run stitches left onto center, then right onto that composite, and
//! finally crops the black warp borders. The first failing stage aborts
//! the run; its error is wrapped with the [`Stage`] it came from.

use std::time::Instant;

use image::RgbImage;

use crate::align::{Aligner, FeatureAligner};
use crate::blend::LayerBlender;
use crate::compose::compose;
use crate::crop::BorderCropper;
use crate::diagnostics::{CropDiagnostics, PairDiagnostics, PanoramaDiagnostics};
use crate::features::BriefExtractor;
use crate::matching::BruteForceMatcher;
use crate::ransac::RansacEstimator;
use crate::types::{Dimensions, Rectangle, Stage, StitchConfig, StitchError};
use crate::warp::{PerspectiveWarper, ProjectionWarper};

/// The feature-based aligner used unless another is supplied.
pub type DefaultAligner = FeatureAligner<BriefExtractor, BruteForceMatcher, RansacEstimator>;

/// Output of a three-image stitch.
#[derive(Debug, Clone)]
pub struct Panorama {
    /// Left image stitched onto the center image.
    pub stage1: RgbImage,
    /// Right image stitched onto `stage1`, before cropping.
    pub uncropped: RgbImage,
    /// `uncropped` with its black borders removed.
    pub cropped: RgbImage,
    /// Where `cropped` was cut from `uncropped`.
    pub crop_rect: Rectangle,
}

/// Runs pairwise and three-image stitches.
#[derive(Debug)]
pub struct Stitcher<A = DefaultAligner, W = ProjectionWarper> {
    config: StitchConfig,
    aligner: A,
    warper: W,
}

impl Stitcher {
    /// A stitcher using FAST/BRIEF features, RANSAC and projective
    /// warping, all parameterised by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`StitchError::InvalidConfig`] if `config` fails
    /// validation.
    pub fn new(config: StitchConfig) -> Result<Self, StitchError> {
        let aligner = FeatureAligner::from_config(&config);
        let warper = ProjectionWarper::new(config.interpolation);
        Self::with_parts(config, aligner, warper)
    }
}

impl<A: Aligner, W: PerspectiveWarper> Stitcher<A, W> {
    /// A stitcher with caller-supplied alignment and warping.
    ///
    /// # Errors
    ///
    /// Returns [`StitchError::InvalidConfig`] if `config` fails
    /// validation.
    pub fn with_parts(config: StitchConfig, aligner: A, warper: W) -> Result<Self, StitchError> {
        config.validate()?;
        Ok(Self {
            config,
            aligner,
            warper,
        })
    }

    /// The active configuration.
    #[must_use]
    pub const fn config(&self) -> &StitchConfig {
        &self.config
    }

    /// Stitch `source` onto `reference` and return the blended canvas.
    ///
    /// # Errors
    ///
    /// Returns [`StitchError::InsufficientMatches`],
    /// [`StitchError::HomographyEstimationFailed`],
    /// [`StitchError::DegenerateCanvas`] or
    /// [`StitchError::NonInvertibleHomography`] when the pair cannot be
    /// stitched.
    pub fn stitch_pair(
        &self,
        source: &RgbImage,
        reference: &RgbImage,
    ) -> Result<RgbImage, StitchError> {
        self.pair_with_diagnostics(source, reference, Stage::LeftCenter)
            .map(|(image, _)| image)
    }

    fn pair_with_diagnostics(
        &self,
        source: &RgbImage,
        reference: &RgbImage,
        stage: Stage,
    ) -> Result<(RgbImage, PairDiagnostics), StitchError> {
        log::debug!(
            "{stage}: source {}, reference {}",
            Dimensions::of(source),
            Dimensions::of(reference)
        );

        let start = Instant::now();
        let alignment = self.aligner.align(source, reference)?;
        let align_duration = start.elapsed();

        let start = Instant::now();
        let composition = compose(
            source,
            reference,
            &alignment.homography,
            &self.warper,
            self.config.max_canvas_pixels,
        )?;
        let compose_duration = start.elapsed();

        let start = Instant::now();
        let blended = self
            .config
            .blend
            .blend(&composition.warped, &composition.placed);
        let blend_duration = start.elapsed();

        let diagnostics = PairDiagnostics {
            stage,
            source: Dimensions::of(source),
            reference: Dimensions::of(reference),
            source_keypoints: alignment.source_keypoints,
            reference_keypoints: alignment.reference_keypoints,
            raw_matches: alignment.raw_matches,
            good_matches: alignment.good_matches,
            inliers: alignment.inliers,
            canvas: composition.geometry.size,
            translation: composition.geometry.translation,
            align_duration,
            compose_duration,
            blend_duration,
        };
        Ok((blended, diagnostics))
    }

    /// Stitch three images left to right.
    ///
    /// # Errors
    ///
    /// Returns [`StitchError::Stage`] wrapping the first failure, tagged
    /// with the stage it happened in. Stage 2 is not attempted if stage 1
    /// fails.
    pub fn stitch_three(
        &self,
        left: &RgbImage,
        center: &RgbImage,
        right: &RgbImage,
    ) -> Result<Panorama, StitchError> {
        self.stitch_three_with_diagnostics(left, center, right)
            .map(|(panorama, _)| panorama)
    }

    /// [`stitch_three`](Self::stitch_three), also returning per-stage
    /// diagnostics.
    ///
    /// # Errors
    ///
    /// See [`stitch_three`](Self::stitch_three).
    pub fn stitch_three_with_diagnostics(
        &self,
        left: &RgbImage,
        center: &RgbImage,
        right: &RgbImage,
    ) -> Result<(Panorama, PanoramaDiagnostics), StitchError> {
        let total_start = Instant::now();

        let (stage1, stage1_diag) = self
            .pair_with_diagnostics(left, center, Stage::LeftCenter)
            .map_err(|e| e.in_stage(Stage::LeftCenter))?;
        let (uncropped, stage2_diag) = self
            .pair_with_diagnostics(right, &stage1, Stage::RightComposite)
            .map_err(|e| e.in_stage(Stage::RightComposite))?;

        let start = Instant::now();
        let outcome = self.config.crop.crop(&uncropped);
        let crop_duration = start.elapsed();
        log::debug!(
            "crop {:?}: {} -> {}",
            self.config.crop,
            Dimensions::of(&uncropped),
            outcome.rect
        );

        let diagnostics = PanoramaDiagnostics {
            stage1: stage1_diag,
            stage2: stage2_diag,
            crop: CropDiagnostics {
                strategy: self.config.crop,
                input: Dimensions::of(&uncropped),
                rect: outcome.rect,
                fell_back: outcome.fell_back,
                duration: crop_duration,
            },
            total_duration: total_start.elapsed(),
        };
        let panorama = Panorama {
            stage1,
            uncropped,
            cropped: outcome.image,
            crop_rect: outcome.rect,
        };
        Ok((panorama, diagnostics))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::cell::Cell;

    use image::Rgb;

    use super::*;
    use crate::align::Alignment;
    use crate::crop::CropStrategy;
    use crate::homography::Homography;
    use crate::warp::WarpInterpolation;

    /// Returns the next horizontal translation from a list and counts
    /// calls.
    struct Shift {
        dx: Vec<f64>,
        calls: Cell<usize>,
    }

    impl Shift {
        fn new(dx: &[f64]) -> Self {
            Self {
                dx: dx.to_vec(),
                calls: Cell::new(0),
            }
        }
    }

    impl Aligner for Shift {
        fn align(&self, _: &RgbImage, _: &RgbImage) -> Result<Alignment, StitchError> {
            let call = self.calls.get();
            self.calls.set(call + 1);
            let dx = self.dx[call % self.dx.len()];
            Ok(Alignment::fixed(Homography::translation(dx, 0.0)))
        }
    }

    /// Fails every call with too few matches.
    struct NoMatches {
        calls: Cell<usize>,
    }

    impl Aligner for NoMatches {
        fn align(&self, _: &RgbImage, _: &RgbImage) -> Result<Alignment, StitchError> {
            self.calls.set(self.calls.get() + 1);
            Err(StitchError::InsufficientMatches {
                found: 2,
                required: 10,
            })
        }
    }

    fn nearest() -> ProjectionWarper {
        ProjectionWarper::new(WarpInterpolation::Nearest)
    }

    fn solid(width: u32, height: u32, v: u8) -> RgbImage {
        RgbImage::from_pixel(width, height, Rgb([v, v, v]))
    }

    #[test]
    fn new_rejects_invalid_config() {
        let config = StitchConfig {
            ratio: 0.0,
            ..StitchConfig::default()
        };
        assert!(matches!(
            Stitcher::new(config),
            Err(StitchError::InvalidConfig(_))
        ));
    }

    #[test]
    fn pair_extends_canvas_by_shift() {
        let aligner = Shift::new(&[-30.0]);
        let stitcher = Stitcher::with_parts(StitchConfig::default(), aligner, nearest()).unwrap();
        let out = stitcher
            .stitch_pair(&solid(50, 40, 100), &solid(50, 40, 200))
            .unwrap();
        assert_eq!(out.dimensions(), (80, 40));
        // Left part only covered by the warped source.
        assert_eq!(out.get_pixel(5, 20), &Rgb([100, 100, 100]));
        // Overlap resolved by the max blend.
        assert_eq!(out.get_pixel(40, 20), &Rgb([200, 200, 200]));
    }

    #[test]
    fn three_images_chain_and_crop() {
        // Stage 2 maps the right image 60 px into the 80 px composite.
        let aligner = Shift::new(&[30.0, 60.0]);
        let config = StitchConfig {
            crop: CropStrategy::BoundingBox,
            ..StitchConfig::default()
        };
        let stitcher = Stitcher::with_parts(config, aligner, nearest()).unwrap();
        let (panorama, diag) = stitcher
            .stitch_three_with_diagnostics(
                &solid(50, 40, 60),
                &solid(50, 40, 120),
                &solid(50, 40, 180),
            )
            .unwrap();

        assert_eq!(stitcher.aligner.calls.get(), 2);
        assert_eq!(panorama.stage1.dimensions(), (80, 40));
        assert_eq!(panorama.uncropped.dimensions(), (110, 40));
        assert_eq!(panorama.cropped.dimensions(), (110, 40));
        assert_eq!(diag.stage1.stage, Stage::LeftCenter);
        assert_eq!(diag.stage2.canvas, Dimensions::of(&panorama.uncropped));
        assert_eq!(diag.crop.rect, panorama.crop_rect);
    }

    #[test]
    fn stage1_failure_skips_stage2() {
        let aligner = NoMatches {
            calls: Cell::new(0),
        };
        let stitcher = Stitcher::with_parts(StitchConfig::default(), aligner, nearest()).unwrap();
        let img = solid(20, 20, 50);
        let err = stitcher.stitch_three(&img, &img, &img).unwrap_err();

        assert_eq!(err.stage(), Some(Stage::LeftCenter));
        assert!(matches!(
            err.root_cause(),
            StitchError::InsufficientMatches { found: 2, .. }
        ));
        assert_eq!(stitcher.aligner.calls.get(), 1);
    }

    #[test]
    fn stage2_canvas_failure_is_tagged() {
        let aligner = Shift::new(&[10.0, 20.0]);
        // Stage 1 canvas is 30x20 = 600 pixels; stage 2 needs 800.
        let config = StitchConfig {
            max_canvas_pixels: 700,
            ..StitchConfig::default()
        };
        let stitcher = Stitcher::with_parts(config, aligner, nearest()).unwrap();
        let img = solid(20, 20, 50);
        let err = stitcher.stitch_three(&img, &img, &img).unwrap_err();
        assert_eq!(err.stage(), Some(Stage::RightComposite));
        assert!(matches!(
            err.root_cause(),
            StitchError::DegenerateCanvas { width: 40, .. }
        ));
    }
}
