//! Layer blending: merge two same-sized, zero-background layers into one
//! visible image.
//!
//! Both layers come out of the compositor on one canvas, with all-zero
//! pixels wherever a layer has no content. Outside the overlap every
//! strategy simply takes whichever layer has content; they differ only in
//! how the overlap is resolved.

use image::{Rgb, RgbImage};
use serde::{Deserialize, Serialize};

use crate::image_io::is_background;

/// Selects how the overlap between the warped and placed layers is
/// resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BlendStrategy {
    /// Per-channel maximum of both layers.
    ///
    /// Cheap, and exact outside the overlap. Inside the overlap it picks
    /// the brighter value per channel, which can fringe colors at seams.
    #[default]
    Max,
    /// In the overlap keep the reference (placed) layer untouched.
    PreferReference,
    /// In the overlap take the rounded per-channel mean.
    Average,
}

/// Trait for layer blending strategies.
pub trait LayerBlender {
    /// Merge `warped` (the resampled source) and `placed` (the reference
    /// at its canvas offset). The result has the size of `warped`; pixels
    /// missing from `placed` count as background.
    fn blend(&self, warped: &RgbImage, placed: &RgbImage) -> RgbImage;
}

impl LayerBlender for BlendStrategy {
    fn blend(&self, warped: &RgbImage, placed: &RgbImage) -> RgbImage {
        let overlap: fn(&Rgb<u8>, &Rgb<u8>) -> Rgb<u8> = match *self {
            Self::Max => channel_max,
            Self::PreferReference => |_, r| *r,
            Self::Average => channel_mean,
        };

        let background = Rgb([0, 0, 0]);
        RgbImage::from_fn(warped.width(), warped.height(), |x, y| {
            let a = warped.get_pixel(x, y);
            let b = placed.get_pixel_checked(x, y).unwrap_or(&background);
            match (is_background(a), is_background(b)) {
                (true, true) => background,
                (false, true) => *a,
                (true, false) => *b,
                (false, false) => overlap(a, b),
            }
        })
    }
}

fn channel_max(a: &Rgb<u8>, b: &Rgb<u8>) -> Rgb<u8> {
    Rgb([a[0].max(b[0]), a[1].max(b[1]), a[2].max(b[2])])
}

#[allow(clippy::cast_possible_truncation)]
fn channel_mean(a: &Rgb<u8>, b: &Rgb<u8>) -> Rgb<u8> {
    let mean = |p: u8, q: u8| (u16::from(p) + u16::from(q)).div_ceil(2) as u8;
    Rgb([mean(a[0], b[0]), mean(a[1], b[1]), mean(a[2], b[2])])
}
