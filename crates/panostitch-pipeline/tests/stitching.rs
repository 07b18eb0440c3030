//! Integration tests: drive the public stitching API with synthetic
//! images, both through a fixed-homography aligner and through the real
//! FAST/BRIEF/RANSAC stack.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::cell::Cell;

use image::{Rgb, RgbImage};
use panostitch_pipeline::{
    Aligner, Alignment, BlendStrategy, BorderCropper, CropStrategy, FeatureAligner, Homography,
    ProjectionWarper, Stage, StitchConfig, StitchError, Stitcher, WarpInterpolation,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Aligner returning a scripted sequence of homographies.
struct Scripted {
    homographies: Vec<Homography>,
    next: Cell<usize>,
}

impl Scripted {
    fn new(homographies: Vec<Homography>) -> Self {
        Self {
            homographies,
            next: Cell::new(0),
        }
    }
}

impl Aligner for Scripted {
    fn align(&self, _: &RgbImage, _: &RgbImage) -> Result<Alignment, StitchError> {
        let i = self.next.get();
        self.next.set(i + 1);
        Ok(Alignment::fixed(self.homographies[i]))
    }
}

fn nearest() -> ProjectionWarper {
    ProjectionWarper::new(WarpInterpolation::Nearest)
}

/// A scene with no black pixels.
fn smooth_scene(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        Rgb([
            ((x * 7 + y * 3) % 200 + 20) as u8,
            ((x * 2 + y * 5) % 180 + 30) as u8,
            ((x + y) % 150 + 40) as u8,
        ])
    })
}

/// A scene of random 8x8 gray blocks: rich in FAST corners.
fn block_scene(width: u32, height: u32, seed: u64) -> RgbImage {
    let mut rng = StdRng::seed_from_u64(seed);
    let cols = width.div_ceil(8) as usize;
    let rows = height.div_ceil(8) as usize;
    let cells: Vec<u8> = (0..cols * rows).map(|_| rng.random_range(16..=255)).collect();
    RgbImage::from_fn(width, height, |x, y| {
        let v = cells[(y / 8) as usize * cols + (x / 8) as usize];
        Rgb([v, v, v])
    })
}

fn window(scene: &RgbImage, x: u32, width: u32) -> RgbImage {
    image::imageops::crop_imm(scene, x, 0, width, scene.height()).to_image()
}

#[test]
fn known_translation_reassembles_scene() {
    // Reference shows scene columns 0..100, source shows 20..120, so a
    // source pixel lands 20 columns right in the reference frame.
    let scene = smooth_scene(120, 100);
    let reference = window(&scene, 0, 100);
    let source = window(&scene, 20, 100);

    let aligner = Scripted::new(vec![Homography::translation(20.0, 0.0)]);
    let stitcher = Stitcher::with_parts(StitchConfig::default(), aligner, nearest()).unwrap();
    let out = stitcher.stitch_pair(&source, &reference).unwrap();

    assert_eq!(out.dimensions(), (120, 100));
    assert_eq!(out.get_pixel(110, 50), source.get_pixel(90, 50));
    assert_eq!(out.as_raw(), scene.as_raw());
}

#[test]
fn offset_triple_is_cropped_to_clean_interior() {
    let img = smooth_scene(100, 80);
    let homographies = vec![
        Homography::translation(-60.0, 6.0),
        Homography::translation(150.0, -4.0),
    ];

    for crop in [CropStrategy::LargestInterior, CropStrategy::Shrink] {
        let config = StitchConfig {
            crop,
            ..StitchConfig::default()
        };
        let aligner = Scripted::new(homographies.clone());
        let stitcher = Stitcher::with_parts(config, aligner, nearest()).unwrap();
        let (panorama, diag) = stitcher
            .stitch_three_with_diagnostics(&img, &img, &img)
            .unwrap();

        assert_eq!(panorama.stage1.dimensions(), (160, 86));
        assert_eq!(panorama.uncropped.dimensions(), (250, 90));
        assert_eq!(diag.stage2.translation, (0, 4));

        // Warp borders leave black corners in the uncropped result.
        assert_eq!(panorama.uncropped.get_pixel(0, 0), &Rgb([0, 0, 0]));
        assert_eq!(panorama.cropped.dimensions(), (250, 70), "{crop:?}");
        assert_eq!(panorama.crop_rect.y, 10);
        assert!(
            panorama.cropped.pixels().all(|p| p.0 != [0, 0, 0]),
            "{crop:?} kept background pixels"
        );
        assert!(!diag.crop.fell_back);
    }
}

#[test]
fn blend_strategy_changes_only_the_overlap() {
    let dark = RgbImage::from_pixel(40, 30, Rgb([50, 60, 70]));
    let bright = RgbImage::from_pixel(40, 30, Rgb([150, 40, 200]));

    let run = |blend: BlendStrategy| {
        let config = StitchConfig {
            blend,
            ..StitchConfig::default()
        };
        let aligner = Scripted::new(vec![Homography::translation(-20.0, 0.0)]);
        Stitcher::with_parts(config, aligner, nearest())
            .unwrap()
            .stitch_pair(&dark, &bright)
            .unwrap()
    };

    let max = run(BlendStrategy::Max);
    let prefer = run(BlendStrategy::PreferReference);
    let average = run(BlendStrategy::Average);

    // Source only.
    for out in [&max, &prefer, &average] {
        assert_eq!(out.dimensions(), (60, 30));
        assert_eq!(out.get_pixel(5, 10), &Rgb([50, 60, 70]));
        assert_eq!(out.get_pixel(55, 10), &Rgb([150, 40, 200]));
    }
    // Overlap.
    assert_eq!(max.get_pixel(30, 10), &Rgb([150, 60, 200]));
    assert_eq!(prefer.get_pixel(30, 10), &Rgb([150, 40, 200]));
    assert_eq!(average.get_pixel(30, 10), &Rgb([100, 50, 135]));
}

#[test]
fn stage2_failure_reports_stage_and_cause() {
    struct FailSecond(Cell<usize>);

    impl Aligner for FailSecond {
        fn align(&self, _: &RgbImage, _: &RgbImage) -> Result<Alignment, StitchError> {
            let n = self.0.get();
            self.0.set(n + 1);
            if n == 0 {
                Ok(Alignment::fixed(Homography::translation(-10.0, 0.0)))
            } else {
                Err(StitchError::HomographyEstimationFailed)
            }
        }
    }

    let img = smooth_scene(30, 20);
    let stitcher =
        Stitcher::with_parts(StitchConfig::default(), FailSecond(Cell::new(0)), nearest())
            .unwrap();
    let err = stitcher.stitch_three(&img, &img, &img).unwrap_err();
    assert_eq!(err.stage(), Some(Stage::RightComposite));
    assert!(matches!(
        err.root_cause(),
        StitchError::HomographyEstimationFailed
    ));
    assert!(err.to_string().contains("stage 2"));
}

#[test]
fn feature_stack_recovers_horizontal_shift() {
    let scene = block_scene(240, 160, 17);
    let reference = window(&scene, 0, 160);
    let source = window(&scene, 40, 160);

    let stitcher = Stitcher::new(StitchConfig::default()).unwrap();
    let out = stitcher.stitch_pair(&source, &reference).unwrap();
    let (width, height) = out.dimensions();
    assert!(width.abs_diff(200) <= 1, "canvas width {width}");
    assert!(height.abs_diff(160) <= 1, "canvas height {height}");
}

#[test]
fn fresh_aligners_agree_on_the_same_pair() {
    let scene = block_scene(240, 160, 23);
    let reference = window(&scene, 0, 160);
    let source = window(&scene, 40, 160);

    let config = StitchConfig::default();
    let first = FeatureAligner::from_config(&config)
        .align(&source, &reference)
        .unwrap();
    for _ in 0..3 {
        let again = FeatureAligner::from_config(&config)
            .align(&source, &reference)
            .unwrap();
        assert_eq!(again, first);
    }
}

#[test]
fn panorama_starting_at_canvas_column_zero_is_cropped() {
    // The left image lands 60 px left of and 6 px above the center, so
    // its top-left corner is the canvas origin.
    let img = smooth_scene(100, 80);
    let aligner = Scripted::new(vec![Homography::translation(-60.0, -6.0)]);
    let stitcher = Stitcher::with_parts(StitchConfig::default(), aligner, nearest()).unwrap();
    let stage1 = stitcher.stitch_pair(&img, &img).unwrap();
    assert_eq!(stage1.dimensions(), (160, 86));
    assert_ne!(stage1.get_pixel(0, 0), &Rgb([0, 0, 0]));

    let out = CropStrategy::LargestInterior.crop(&stage1);
    assert_eq!(out.rect.to_string(), "160x74+0+6");
    assert!(out.image.pixels().all(|p| p.0 != [0, 0, 0]));
}
