//! landmarks — eye-band resolution and fallback landmark synthesis
//!
//! Effects that target the eyes (bar, eye pixelation, eye blur, eye-band
//! pixel-sort) ask this module for an `EyeBand`: a rotated rectangle centred
//! between the eyes that follows head tilt. Regions without usable landmarks
//! get a proportional horizontal band instead.

use std::f32::consts::TAU;

use crate::geometry::{PixelRect, Point, Region};

/// Padding added past each eye, as a fraction of the eye-to-eye distance.
const EYE_PADDING_RATIO: f32 = 0.4;
/// Band thickness as a fraction of the region height.
const BAND_THICKNESS_RATIO: f32 = 0.15;
const MIN_BAND_THICKNESS: f32 = 2.0;
/// Proportional fallback: top edge and height as fractions of region height.
const FALLBACK_BAND_TOP: f32 = 0.25;
const FALLBACK_BAND_HEIGHT: f32 = 0.30;
/// Number of points on the synthesised elliptical contour.
const CONTOUR_POINTS: usize = 12;
const CONTOUR_RADIUS_RATIO: f32 = 0.45;

/// Index ranges of the 68-point facial layout (iBUG / dlib ordering).
pub mod layout68 {
    use std::ops::RangeInclusive;

    pub const POINT_COUNT: usize = 68;
    pub const JAW: RangeInclusive<usize> = 0..=16;
    pub const RIGHT_BROW: RangeInclusive<usize> = 17..=21;
    pub const LEFT_BROW: RangeInclusive<usize> = 22..=26;
    pub const NOSE_BRIDGE: RangeInclusive<usize> = 27..=30;
    pub const NOSE_BASE: RangeInclusive<usize> = 31..=35;
    pub const RIGHT_EYE: RangeInclusive<usize> = 36..=41;
    pub const LEFT_EYE: RangeInclusive<usize> = 42..=47;
    pub const OUTER_MOUTH: RangeInclusive<usize> = 48..=59;
    pub const INNER_MOUTH: RangeInclusive<usize> = 60..=67;
}

/// Index layout of landmarks produced by [`synthesize_landmarks`].
pub mod synthetic {
    pub const LEFT_EYE: usize = 0;
    pub const RIGHT_EYE: usize = 1;
    pub const NOSE: usize = 2;
    pub const MOUTH: usize = 3;
    pub const CONTOUR_START: usize = 4;
}

/// Coarse facial feature a landmark index belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureBand {
    Eye,
    Nose,
    Mouth,
    Other,
}

/// Classify landmark `index` of a set with `count` points.
pub fn feature_band(index: usize, count: usize) -> FeatureBand {
    if count >= layout68::POINT_COUNT {
        if layout68::RIGHT_EYE.contains(&index) || layout68::LEFT_EYE.contains(&index) {
            FeatureBand::Eye
        } else if layout68::NOSE_BRIDGE.contains(&index) || layout68::NOSE_BASE.contains(&index)
        {
            FeatureBand::Nose
        } else if layout68::OUTER_MOUTH.contains(&index) || layout68::INNER_MOUTH.contains(&index)
        {
            FeatureBand::Mouth
        } else {
            FeatureBand::Other
        }
    } else {
        match index {
            synthetic::LEFT_EYE | synthetic::RIGHT_EYE => FeatureBand::Eye,
            synthetic::NOSE => FeatureBand::Nose,
            synthetic::MOUTH => FeatureBand::Mouth,
            _ => FeatureBand::Other,
        }
    }
}

/// Rotated rectangle covering both eyes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EyeBand {
    pub center: Point,
    /// Extent along the eye-to-eye axis.
    pub length: f32,
    /// Extent across the eye-to-eye axis.
    pub thickness: f32,
    /// Tilt in radians, `atan2(dy, dx)` from the first eye to the second.
    pub angle: f32,
    /// Whether the band came from landmarks rather than the proportional fallback.
    pub from_landmarks: bool,
}

impl EyeBand {
    /// Corners in drawing order: top-left, top-right, bottom-right, bottom-left
    /// (before rotation).
    pub fn corners(&self) -> [Point; 4] {
        let (sin, cos) = self.angle.sin_cos();
        let hl = self.length / 2.0;
        let ht = self.thickness / 2.0;
        [(-hl, -ht), (hl, -ht), (hl, ht), (-hl, ht)].map(|(dx, dy)| {
            Point::new(
                self.center.x + dx * cos - dy * sin,
                self.center.y + dx * sin + dy * cos,
            )
        })
    }

    /// Axis-aligned bounds of the rotated band, clamped to the buffer.
    pub fn bounds(&self, buffer_width: u32, buffer_height: u32) -> Option<PixelRect> {
        let corners = self.corners();
        let min_x = corners.iter().map(|p| p.x).fold(f32::INFINITY, f32::min);
        let min_y = corners.iter().map(|p| p.y).fold(f32::INFINITY, f32::min);
        let max_x = corners.iter().map(|p| p.x).fold(f32::NEG_INFINITY, f32::max);
        let max_y = corners.iter().map(|p| p.y).fold(f32::NEG_INFINITY, f32::max);
        PixelRect::clamped(
            min_x,
            min_y,
            max_x - min_x,
            max_y - min_y,
            buffer_width,
            buffer_height,
        )
    }
}

/// Left and right eye centres, if the landmark set carries them.
///
/// 68-point sets average each eye contour; smaller sets use indices 0 and 1.
pub fn eye_centers(landmarks: &[Point]) -> Option<(Point, Point)> {
    if landmarks.len() >= layout68::POINT_COUNT {
        let mean = |range: std::ops::RangeInclusive<usize>| {
            let n = range.clone().count() as f32;
            let (sx, sy) = landmarks[range]
                .iter()
                .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
            Point::new(sx / n, sy / n)
        };
        return Some((mean(layout68::RIGHT_EYE), mean(layout68::LEFT_EYE)));
    }
    match landmarks {
        [first, second, ..] => Some((*first, *second)),
        _ => None,
    }
}

/// Resolve the eye band of `region`, falling back to a proportional strip
/// when fewer than two usable landmarks exist.
pub fn resolve_eye_band(region: &Region) -> EyeBand {
    if let Some((left, right)) = eye_centers(&region.landmarks) {
        let distance = left.distance(&right);
        if distance.is_finite() && distance > f32::EPSILON {
            let padding = distance * EYE_PADDING_RATIO;
            return EyeBand {
                center: left.midpoint(&right),
                length: distance + 2.0 * padding,
                thickness: (region.height * BAND_THICKNESS_RATIO).max(MIN_BAND_THICKNESS),
                angle: (right.y - left.y).atan2(right.x - left.x),
                from_landmarks: true,
            };
        }
    }
    fallback_eye_band(region)
}

/// Horizontal strip at a fixed proportion of the region, zero tilt.
pub fn fallback_eye_band(region: &Region) -> EyeBand {
    let thickness = region.height * FALLBACK_BAND_HEIGHT;
    EyeBand {
        center: Point::new(
            region.x + region.width / 2.0,
            region.y + region.height * FALLBACK_BAND_TOP + thickness / 2.0,
        ),
        length: region.width,
        thickness,
        angle: 0.0,
        from_landmarks: false,
    }
}

/// Deterministic landmarks derived from the region geometry alone.
///
/// Eyes at 30 %/70 % width and 35 % height, nose at (50 %, 55 %), mouth at
/// (50 %, 75 %), then an elliptical contour around the centre.
pub fn synthesize_landmarks(region: &Region) -> Vec<Point> {
    let at = |fx: f32, fy: f32| {
        Point::new(region.x + region.width * fx, region.y + region.height * fy)
    };
    let mut points = Vec::with_capacity(synthetic::CONTOUR_START + CONTOUR_POINTS);
    points.push(at(0.30, 0.35));
    points.push(at(0.70, 0.35));
    points.push(at(0.50, 0.55));
    points.push(at(0.50, 0.75));

    let center = region.center();
    let rx = region.width * CONTOUR_RADIUS_RATIO;
    let ry = region.height * CONTOUR_RADIUS_RATIO;
    for i in 0..CONTOUR_POINTS {
        let theta = TAU * i as f32 / CONTOUR_POINTS as f32;
        points.push(Point::new(
            center.x + rx * theta.cos(),
            center.y + ry * theta.sin(),
        ));
    }
    points
}
