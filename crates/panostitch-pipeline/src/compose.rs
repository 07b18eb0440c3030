//! Geometry compositing: put a warped source image and an unwarped
//! reference image on one shared canvas.
//!
//! The canvas is the union bounding box, in the reference frame, of the
//! reference rectangle and the four transformed source corners. Both
//! returned layers share that pixel grid, so blending can combine them
//! pixel by pixel without further alignment.

use image::RgbImage;

use crate::homography::Homography;
use crate::types::{Dimensions, Point, StitchError};
use crate::warp::PerspectiveWarper;

/// Placement of the shared canvas relative to the reference frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CanvasGeometry {
    /// Offset added to reference-frame coordinates to get canvas
    /// coordinates. Both components are non-negative.
    pub translation: (i64, i64),
    /// Canvas size in pixels.
    pub size: Dimensions,
    /// `H` followed by the canvas translation: maps source pixels
    /// straight onto the canvas.
    pub effective: Homography,
}

/// The two layers produced by [`compose`].
#[derive(Debug, Clone)]
pub struct Composition {
    /// Source image resampled onto the canvas, zero outside its footprint.
    pub warped: RgbImage,
    /// Reference image copied verbatim at the canvas translation, zero
    /// elsewhere.
    pub placed: RgbImage,
    /// Canvas placement used for both layers.
    pub geometry: CanvasGeometry,
}

/// Corners of a `width x height` image, clockwise from the origin.
fn corners(size: Dimensions) -> [Point; 4] {
    let w = f64::from(size.width);
    let h = f64::from(size.height);
    [
        Point::new(0.0, 0.0),
        Point::new(0.0, h),
        Point::new(w, h),
        Point::new(w, 0.0),
    ]
}

/// Compute the union canvas for warping `source` through `h` next to an
/// untransformed `reference`.
///
/// The corner extremes get a half-pixel margin (`min - 0.5`,
/// `max + 0.5`) and are then truncated toward zero to whole pixels, so
/// images that already sit on the integer grid get a canvas exactly the
/// size of their union.
///
/// # Errors
///
/// Returns [`StitchError::DegenerateCanvas`] if a corner maps to
/// infinity, if either canvas side is not positive, or if the canvas
/// area exceeds `max_pixels`.
#[allow(clippy::cast_possible_truncation)]
pub fn canvas_geometry(
    source: Dimensions,
    reference: Dimensions,
    h: &Homography,
    max_pixels: u64,
) -> Result<CanvasGeometry, StitchError> {
    let degenerate = |width: i64, height: i64| StitchError::DegenerateCanvas {
        width,
        height,
        max_pixels,
    };

    let mut points = Vec::with_capacity(8);
    for corner in corners(source) {
        points.push(h.project(corner).ok_or_else(|| degenerate(0, 0))?);
    }
    points.extend(corners(reference));

    let (mut min_x, mut min_y) = (f64::INFINITY, f64::INFINITY);
    let (mut max_x, mut max_y) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
    for p in &points {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }

    // `as` truncates toward zero and saturates on overflow.
    let x_min = (min_x - 0.5) as i64;
    let y_min = (min_y - 0.5) as i64;
    let x_max = (max_x + 0.5) as i64;
    let y_max = (max_y + 0.5) as i64;

    let width = x_max.saturating_sub(x_min);
    let height = y_max.saturating_sub(y_min);
    if width <= 0 || height <= 0 {
        return Err(degenerate(width, height));
    }
    let (Ok(w), Ok(hgt)) = (u32::try_from(width), u32::try_from(height)) else {
        return Err(degenerate(width, height));
    };
    let size = Dimensions {
        width: w,
        height: hgt,
    };
    if size.area() > max_pixels {
        return Err(degenerate(width, height));
    }

    let translation = (-x_min, -y_min);
    #[allow(clippy::cast_precision_loss)]
    let shift = Homography::translation(translation.0 as f64, translation.1 as f64);

    Ok(CanvasGeometry {
        translation,
        size,
        effective: h.then(&shift),
    })
}

/// Warp `source` through `h` onto the union canvas and place `reference`
/// on the same canvas at the computed offset.
///
/// # Errors
///
/// Returns [`StitchError::DegenerateCanvas`] for an unusable canvas (see
/// [`canvas_geometry`]) and propagates warper failures.
pub fn compose<W: PerspectiveWarper + ?Sized>(
    source: &RgbImage,
    reference: &RgbImage,
    h: &Homography,
    warper: &W,
    max_pixels: u64,
) -> Result<Composition, StitchError> {
    let geometry = canvas_geometry(
        Dimensions::of(source),
        Dimensions::of(reference),
        h,
        max_pixels,
    )?;
    log::debug!(
        "canvas {} with reference offset ({}, {})",
        geometry.size,
        geometry.translation.0,
        geometry.translation.1,
    );

    let warped = warper.warp(source, &geometry.effective, geometry.size)?;

    let mut placed = RgbImage::new(geometry.size.width, geometry.size.height);
    image::imageops::replace(
        &mut placed,
        reference,
        geometry.translation.0,
        geometry.translation.1,
    );

    Ok(Composition {
        warped,
        placed,
        geometry,
    })
}
