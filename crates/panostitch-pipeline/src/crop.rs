//! Border cropping: remove the black, irregular borders that warping
//! leaves around a composite.
//!
//! This module defines the [`BorderCropper`] trait and the
//! [`CropStrategy`] enum that selects a cropping algorithm at runtime.
//! Every strategy starts from the binary foreground mask of the image
//! (luma > 0) and returns the cropped image together with the rectangle
//! it was cut from.
//!
//! # Strategies
//!
//! - [`CropStrategy::BoundingBox`]: the bounding box of the largest
//!   external contour. Always safe, may keep black corners.
//! - [`CropStrategy::Shrink`]: pull each edge of the bounding box inward
//!   while it touches background, falling back to the bounding box if that
//!   would discard more than half the area.
//! - [`CropStrategy::LargestInterior`]: the exact largest all-foreground
//!   axis-aligned rectangle inside the bounding box, found row by row as a
//!   largest-rectangle-in-histogram problem in `O(rows * cols)`.
//!
//! The mask-level searches are public so they can be tested and reused
//! without an image.

use image::{GrayImage, RgbImage};
use imageproc::contours::{BorderType, Contour};
use serde::{Deserialize, Serialize};

use crate::image_io::foreground_mask;
use crate::types::{Dimensions, Rectangle};

/// Selects which border cropping algorithm to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CropStrategy {
    /// Keep the full canvas.
    None,
    /// Bounding box of the largest foreground region.
    BoundingBox,
    /// Iteratively shrink the bounding box until its border is all
    /// foreground.
    Shrink,
    /// Largest axis-aligned rectangle containing only foreground.
    #[default]
    LargestInterior,
}

/// Result of a crop.
#[derive(Debug, Clone)]
pub struct CropOutcome {
    /// The cropped image.
    pub image: RgbImage,
    /// Where `image` was cut from, in the input's coordinates.
    pub rect: Rectangle,
    /// `true` if the requested strategy was abandoned in favor of the
    /// bounding box.
    pub fell_back: bool,
}

/// Trait for border cropping strategies.
///
/// An image with no foreground at all is returned unchanged; that is not
/// an error.
pub trait BorderCropper {
    /// Crop the black borders from `image`.
    fn crop(&self, image: &RgbImage) -> CropOutcome;
}

impl BorderCropper for CropStrategy {
    fn crop(&self, image: &RgbImage) -> CropOutcome {
        match *self {
            Self::None => uncropped(image),
            Self::BoundingBox => bounding_crop(image),
            Self::Shrink => shrink_crop(image),
            Self::LargestInterior => largest_interior_crop(image),
        }
    }
}

fn uncropped(image: &RgbImage) -> CropOutcome {
    CropOutcome {
        image: image.clone(),
        rect: Rectangle::covering(Dimensions::of(image)),
        fell_back: false,
    }
}

fn cut(image: &RgbImage, rect: Rectangle, fell_back: bool) -> CropOutcome {
    CropOutcome {
        image: image::imageops::crop_imm(image, rect.x, rect.y, rect.width, rect.height)
            .to_image(),
        rect,
        fell_back,
    }
}

/// Crop to the bounding box of the largest foreground region.
#[must_use]
pub fn bounding_crop(image: &RgbImage) -> CropOutcome {
    match bounding_box(&foreground_mask(image)) {
        Some(rect) => cut(image, rect, false),
        None => uncropped(image),
    }
}

/// Crop with [`shrink_rect`].
#[must_use]
pub fn shrink_crop(image: &RgbImage) -> CropOutcome {
    match shrink_rect(&foreground_mask(image)) {
        Some(shrunk) => cut(image, shrunk.rect, shrunk.fell_back),
        None => uncropped(image),
    }
}

/// Crop with [`largest_interior_rect`].
#[must_use]
pub fn largest_interior_crop(image: &RgbImage) -> CropOutcome {
    match largest_interior_rect(&foreground_mask(image)) {
        Some(rect) => cut(image, rect, false),
        None => uncropped(image),
    }
}

// ---------------------------------------------------------------------------
// Bounding box
// ---------------------------------------------------------------------------

/// Twice the signed-area magnitude of a closed contour (shoelace formula).
fn doubled_area(contour: &Contour<u32>) -> u64 {
    let pts = &contour.points;
    let n = pts.len();
    let mut sum: i64 = 0;
    for i in 0..n {
        let p = pts[i];
        let q = pts[(i + 1) % n];
        sum += i64::from(p.x) * i64::from(q.y) - i64::from(q.x) * i64::from(p.y);
    }
    sum.unsigned_abs()
}

fn contour_bounds(contour: &Contour<u32>) -> Option<Rectangle> {
    let min_x = contour.points.iter().map(|p| p.x).min()?;
    let max_x = contour.points.iter().map(|p| p.x).max()?;
    let min_y = contour.points.iter().map(|p| p.y).min()?;
    let max_y = contour.points.iter().map(|p| p.y).max()?;
    Some(Rectangle::new(
        min_x,
        min_y,
        max_x - min_x + 1,
        max_y - min_y + 1,
    ))
}

/// Bounding rectangle of the external contour with the largest area.
///
/// Any non-zero mask pixel is foreground. Ties keep the first contour
/// found. Returns `None` if the mask has no foreground.
#[must_use]
pub fn bounding_box(mask: &GrayImage) -> Option<Rectangle> {
    // Border tracing only starts outer borders away from column 0, so trace
    // a copy framed by one background pixel and shift the result back.
    let mut framed = GrayImage::new(mask.width() + 2, mask.height() + 2);
    image::imageops::replace(&mut framed, mask, 1, 1);
    let contours: Vec<Contour<u32>> = imageproc::contours::find_contours(&framed);

    let mut best: Option<(&Contour<u32>, u64)> = None;
    for contour in contours
        .iter()
        .filter(|c| c.border_type == BorderType::Outer && !c.points.is_empty())
    {
        let area = doubled_area(contour);
        if best.is_none_or(|(_, a)| area > a) {
            best = Some((contour, area));
        }
    }
    best.and_then(|(contour, _)| contour_bounds(contour))
        .map(|r| Rectangle::new(r.x - 1, r.y - 1, r.width, r.height))
}

// ---------------------------------------------------------------------------
// Iterative shrink
// ---------------------------------------------------------------------------

/// Result of [`shrink_rect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shrunk {
    /// Chosen rectangle, in mask coordinates.
    pub rect: Rectangle,
    /// `true` if shrinking was rejected and `rect` is the bounding box.
    pub fell_back: bool,
}

/// View of the mask restricted to a bounding box.
struct Window<'a> {
    mask: &'a GrayImage,
    bounds: Rectangle,
}

impl Window<'_> {
    fn is_set(&self, col: u32, row: u32) -> bool {
        self.mask.get_pixel(self.bounds.x + col, self.bounds.y + row).0[0] != 0
    }

    fn row_has_gap(&self, row: u32, left: u32, right: u32) -> bool {
        (left..=right).any(|c| !self.is_set(c, row))
    }

    fn col_has_gap(&self, col: u32, top: u32, bottom: u32) -> bool {
        (top..=bottom).any(|r| !self.is_set(col, r))
    }
}

/// Shrink the bounding box edge by edge until no edge row or column
/// touches background.
///
/// Each pass advances the top edge, then the bottom, left and right
/// edges, while they contain a background pixel and have not met the
/// opposite edge; passes repeat until nothing moves. The result is
/// rejected in favor of the bounding box when its extent
/// `(bottom - top) * (right - left)` is zero or less than half the
/// bounding box area.
///
/// Returns `None` if the mask has no foreground.
#[must_use]
pub fn shrink_rect(mask: &GrayImage) -> Option<Shrunk> {
    let bounds = bounding_box(mask)?;
    let window = Window { mask, bounds };

    let (mut top, mut bottom) = (0, bounds.height - 1);
    let (mut left, mut right) = (0, bounds.width - 1);
    loop {
        let before = (top, bottom, left, right);
        while top < bottom && window.row_has_gap(top, left, right) {
            top += 1;
        }
        while bottom > top && window.row_has_gap(bottom, left, right) {
            bottom -= 1;
        }
        while left < right && window.col_has_gap(left, top, bottom) {
            left += 1;
        }
        while right > left && window.col_has_gap(right, top, bottom) {
            right -= 1;
        }
        if before == (top, bottom, left, right) {
            break;
        }
    }

    let new_area = u64::from(bottom - top) * u64::from(right - left);
    let original_area = bounds.area();
    if new_area == 0 || new_area * 2 < original_area {
        log::warn!(
            "shrink crop would keep {new_area} of {original_area} pixels; \
             using the bounding box {bounds} instead"
        );
        return Some(Shrunk {
            rect: bounds,
            fell_back: true,
        });
    }

    Some(Shrunk {
        rect: Rectangle::new(left, top, right - left + 1, bottom - top + 1)
            .offset(bounds.x, bounds.y),
        fell_back: false,
    })
}

// ---------------------------------------------------------------------------
// Largest interior rectangle
// ---------------------------------------------------------------------------

/// Largest rectangle under a histogram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistogramRect {
    /// Leftmost bar.
    pub x: usize,
    /// Number of bars spanned.
    pub width: usize,
    /// Height of the rectangle (the lowest spanned bar).
    pub height: u32,
}

impl HistogramRect {
    /// Area in unit cells.
    #[must_use]
    pub const fn area(self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// Solve largest-rectangle-in-histogram with a monotonic stack.
///
/// A trailing zero-height sentinel flushes the stack at the end. Ties
/// keep the first rectangle found. Returns `None` if every bar is zero.
#[must_use]
pub fn largest_rectangle_in_histogram(heights: &[u32]) -> Option<HistogramRect> {
    let mut stack: Vec<usize> = Vec::with_capacity(heights.len());
    let mut best: Option<HistogramRect> = None;

    for i in 0..=heights.len() {
        let current = heights.get(i).copied().unwrap_or(0);
        while let Some(&top) = stack.last() {
            if heights[top] < current {
                break;
            }
            stack.pop();
            let x = stack.last().map_or(0, |&s| s + 1);
            let candidate = HistogramRect {
                x,
                width: i - x,
                height: heights[top],
            };
            if candidate.area() > best.map_or(0, HistogramRect::area) {
                best = Some(candidate);
            }
        }
        stack.push(i);
    }
    best
}

/// Largest axis-aligned rectangle containing only foreground pixels,
/// searched inside the bounding box of the largest region.
///
/// Row by row, `heights[c]` counts the consecutive foreground pixels
/// ending at the current row in column `c`; the best histogram rectangle
/// of that row spans rows `r - height + 1 ..= r`.
///
/// Returns `None` if the mask has no foreground.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn largest_interior_rect(mask: &GrayImage) -> Option<Rectangle> {
    let bounds = bounding_box(mask)?;
    let window = Window { mask, bounds };

    let mut heights = vec![0u32; bounds.width as usize];
    let mut best: Option<Rectangle> = None;
    for r in 0..bounds.height {
        for (c, h) in (0..bounds.width).zip(heights.iter_mut()) {
            *h = if window.is_set(c, r) { *h + 1 } else { 0 };
        }
        if let Some(found) = largest_rectangle_in_histogram(&heights) {
            // Widths and offsets are bounded by `bounds.width`.
            let rect = Rectangle::new(
                found.x as u32,
                r + 1 - found.height,
                found.width as u32,
                found.height,
            );
            if rect.area() > best.map_or(0, Rectangle::area) {
                best = Some(rect);
            }
        }
    }

    Some(best.map_or(bounds, |rect| rect.offset(bounds.x, bounds.y)))
}
