//! Stitch diagnostics: timing, counts, and geometry for each stage.
//!
//! Every call to
//! [`Stitcher::stitch_three_with_diagnostics`](crate::Stitcher::stitch_three_with_diagnostics)
//! collects these alongside the panorama. They are meant for tuning the
//! matching and cropping parameters.
//!
//! Durations are serialized as fractional seconds (`f64`) for JSON
//! compatibility, since `std::time::Duration` does not implement serde
//! traits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::crop::CropStrategy;
use crate::types::{Dimensions, Rectangle, Stage};

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a `Duration` as fractional seconds (`f64`).
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    /// Deserialize a `Duration` from fractional seconds (`f64`).
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// Diagnostics for one pairwise stitch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairDiagnostics {
    /// Which stitch these numbers belong to.
    pub stage: Stage,
    /// Source image size.
    pub source: Dimensions,
    /// Reference image size.
    pub reference: Dimensions,
    /// Keypoints detected in the source image.
    pub source_keypoints: usize,
    /// Keypoints detected in the reference image.
    pub reference_keypoints: usize,
    /// Source descriptors that received a match candidate.
    pub raw_matches: usize,
    /// Matches surviving the ratio test.
    pub good_matches: usize,
    /// Matches consistent with the estimated homography.
    pub inliers: usize,
    /// Union canvas size.
    pub canvas: Dimensions,
    /// Offset of the reference image on the canvas.
    pub translation: (i64, i64),
    /// Feature detection, matching and estimation (seconds).
    #[serde(with = "duration_serde")]
    pub align_duration: Duration,
    /// Canvas computation, warping and reference placement (seconds).
    #[serde(with = "duration_serde")]
    pub compose_duration: Duration,
    /// Layer blending (seconds).
    #[serde(with = "duration_serde")]
    pub blend_duration: Duration,
}

impl PairDiagnostics {
    /// Wall-clock time of the whole pairwise stitch.
    #[must_use]
    pub fn total_duration(&self) -> Duration {
        self.align_duration + self.compose_duration + self.blend_duration
    }
}

/// Diagnostics for the final border crop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropDiagnostics {
    /// Strategy that was requested.
    pub strategy: CropStrategy,
    /// Size of the uncropped panorama.
    pub input: Dimensions,
    /// Rectangle kept, in uncropped coordinates.
    pub rect: Rectangle,
    /// `true` if the shrink strategy fell back to the bounding box.
    pub fell_back: bool,
    /// Wall-clock duration (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
}

/// Diagnostics for a full three-image run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanoramaDiagnostics {
    /// Left image onto center image.
    pub stage1: PairDiagnostics,
    /// Right image onto the stage-1 composite.
    pub stage2: PairDiagnostics,
    /// Border crop of the stage-2 composite.
    pub crop: CropDiagnostics,
    /// Wall-clock duration of the whole run (seconds).
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
}

impl PanoramaDiagnostics {
    /// Render a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Panorama Diagnostics Report\n{}", "=".repeat(60)));
        lines.push(format!(
            "Total duration: {:.3}ms",
            duration_ms(self.total_duration),
        ));
        lines.push(String::new());

        for pair in [&self.stage1, &self.stage2] {
            lines.push(format!("{}", pair.stage));
            lines.push("-".repeat(60));
            lines.push(format!(
                "  Inputs:     source {}  reference {}",
                pair.source, pair.reference,
            ));
            lines.push(format!(
                "  Keypoints:  {} source, {} reference",
                pair.source_keypoints, pair.reference_keypoints,
            ));
            lines.push(format!(
                "  Matches:    {} raw, {} good, {} inliers",
                pair.raw_matches, pair.good_matches, pair.inliers,
            ));
            lines.push(format!(
                "  Canvas:     {} (reference at {}, {})",
                pair.canvas, pair.translation.0, pair.translation.1,
            ));
            lines.push(format!(
                "  Timing:     align {:.3}ms  compose {:.3}ms  blend {:.3}ms",
                duration_ms(pair.align_duration),
                duration_ms(pair.compose_duration),
                duration_ms(pair.blend_duration),
            ));
            lines.push(String::new());
        }

        lines.push(format!("Crop ({:?})", self.crop.strategy));
        lines.push("-".repeat(60));
        lines.push(format!(
            "  {} -> {} at ({}, {}){}",
            self.crop.input,
            Dimensions {
                width: self.crop.rect.width,
                height: self.crop.rect.height,
            },
            self.crop.rect.x,
            self.crop.rect.y,
            if self.crop.fell_back {
                "  [fell back to bounding box]"
            } else {
                ""
            },
        ));
        lines.push(format!(
            "  Timing:     {:.3}ms",
            duration_ms(self.crop.duration)
        ));

        lines.join("\n")
    }
}

/// Convert a `Duration` to fractional milliseconds.
fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn pair(stage: Stage) -> PairDiagnostics {
        PairDiagnostics {
            stage,
            source: Dimensions {
                width: 100,
                height: 80,
            },
            reference: Dimensions {
                width: 100,
                height: 80,
            },
            source_keypoints: 400,
            reference_keypoints: 420,
            raw_matches: 400,
            good_matches: 120,
            inliers: 95,
            canvas: Dimensions {
                width: 170,
                height: 84,
            },
            translation: (0, 2),
            align_duration: Duration::from_millis(40),
            compose_duration: Duration::from_millis(8),
            blend_duration: Duration::from_millis(2),
        }
    }

    fn sample() -> PanoramaDiagnostics {
        PanoramaDiagnostics {
            stage1: pair(Stage::LeftCenter),
            stage2: pair(Stage::RightComposite),
            crop: CropDiagnostics {
                strategy: CropStrategy::Shrink,
                input: Dimensions {
                    width: 240,
                    height: 88,
                },
                rect: Rectangle::new(3, 4, 230, 80),
                fell_back: true,
                duration: Duration::from_millis(5),
            },
            total_duration: Duration::from_millis(110),
        }
    }

    #[test]
    fn pair_total_sums_phases() {
        assert_eq!(
            pair(Stage::LeftCenter).total_duration(),
            Duration::from_millis(50)
        );
    }

    #[test]
    fn report_mentions_both_stages_and_fallback() {
        let report = sample().report();
        assert!(report.contains("stage 1 (left -> center)"));
        assert!(report.contains("stage 2 (right -> composite)"));
        assert!(report.contains("120 good"));
        assert!(report.contains("fell back"));
        assert!(report.contains("240x88 -> 230x80 at (3, 4)"));
    }

    #[test]
    fn json_round_trip() {
        let diag = sample();
        let json = serde_json::to_string(&diag).unwrap();
        let back: PanoramaDiagnostics = serde_json::from_str(&json).unwrap();
        assert_eq!(back.stage1.stage, Stage::LeftCenter);
        assert_eq!(back.stage2.inliers, diag.stage2.inliers);
        assert_eq!(back.crop.rect, diag.crop.rect);
        assert!(back.crop.fell_back);
        let drift = back.total_duration.abs_diff(diag.total_duration);
        assert!(drift < Duration::from_micros(1));
    }

    #[test]
    fn durations_serialize_as_seconds() {
        let json = serde_json::to_value(sample()).unwrap();
        assert!((json["total_duration"].as_f64().unwrap() - 0.11).abs() < 1e-12);
    }
}
