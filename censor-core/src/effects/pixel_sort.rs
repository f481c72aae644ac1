//! pixel_sort — luminance-threshold span sorting
//!
//! Two variants share the span machinery:
//! - `sort_region` sweeps a subset of rows over the whole face, with a
//!   threshold band that widens as intensity grows and a seeded fallback
//!   when a row has nothing to sort.
//! - `sort_eye_band` sorts every row of the eye band with a single lower
//!   threshold, falling back to fixed-length segments.
//!
//! Sorting is always stable and ascending by luminance, so spans are
//! permutations of their input and sorting twice changes nothing.

use std::ops::Range;

use image::{Rgba, RgbaImage};
use rand::Rng;
use tracing::trace;

use crate::geometry::PixelRect;

/// Synthetic spans are only invented above this intensity.
pub const SYNTHETIC_SPAN_MIN_INTENSITY: u32 = 30;
/// Shortest fallback segment for the eye-band variant.
pub const MIN_EYE_SEGMENT: usize = 4;

/// Rec. 601 luma of `pixel`, scaled by 1000 to stay integral.
pub fn luma_key(pixel: &Rgba<u8>) -> u32 {
    let [r, g, b, _] = pixel.0;
    299 * r as u32 + 587 * g as u32 + 114 * b as u32
}

/// Rec. 601 luma of `pixel` in `[0, 255]`.
pub fn luminance(pixel: &Rgba<u8>) -> f32 {
    luma_key(pixel) as f32 / 1000.0
}

/// Stable ascending sort of `span` by luminance.
pub fn sort_span(span: &mut [Rgba<u8>]) {
    span.sort_by_key(luma_key);
}

/// Sort spans of the face rectangle.
///
/// Intensity is a percentage (clamped to 10..=100). Higher values sort more
/// rows and accept more pixels into spans.
pub fn sort_region<R: Rng>(
    buffer: &mut RgbaImage,
    rect: PixelRect,
    intensity: u32,
    rng: &mut R,
) {
    let Some(rect) = rect.within(buffer.width(), buffer.height()) else {
        return;
    };
    let intensity = intensity.clamp(10, 100);
    let f = intensity as f32 / 100.0;
    let upper = 255.0 - 127.0 * f;
    let lower = 255.0 - upper;
    let step = ((10.0 - 9.0 * f).round() as u32).max(1);
    let offset = rng.random_range(0..step);

    let mut sorted_rows = 0usize;
    for y in (rect.y() + offset..rect.bottom()).step_by(step as usize) {
        let mut row = read_row(buffer, rect, y);
        let lumas: Vec<f32> = row.iter().map(luminance).collect();
        let mut spans = threshold_spans(&lumas, |l| l > upper || l < lower);
        if spans.is_empty() && intensity > SYNTHETIC_SPAN_MIN_INTENSITY {
            spans = synthetic_spans(row.len(), f, rng);
        }
        for span in spans {
            sort_span(&mut row[span]);
        }
        write_row(buffer, rect, y, &row);
        sorted_rows += 1;
    }
    trace!(rows = sorted_rows, step, upper, lower, "pixel sort");
}

/// Sort spans across every row of the eye band's bounds.
pub fn sort_eye_band(buffer: &mut RgbaImage, rect: PixelRect, intensity: u32) {
    let Some(rect) = rect.within(buffer.width(), buffer.height()) else {
        return;
    };
    let intensity = intensity.clamp(10, 100);
    let f = intensity as f32 / 100.0;
    let threshold = 60.0 + 100.0 * (1.0 - f);
    let segment = (rect.width() as usize / (2 + intensity as usize / 10)).max(MIN_EYE_SEGMENT);

    for y in rect.y()..rect.bottom() {
        let mut row = read_row(buffer, rect, y);
        let lumas: Vec<f32> = row.iter().map(luminance).collect();
        let spans = threshold_spans(&lumas, |l| l > threshold);
        if spans.is_empty() {
            for chunk in row.chunks_mut(segment) {
                sort_span(chunk);
            }
        } else {
            for span in spans {
                sort_span(&mut row[span]);
            }
        }
        write_row(buffer, rect, y, &row);
    }
}

/// Maximal runs of at least two consecutive sortable pixels.
fn threshold_spans(lumas: &[f32], sortable: impl Fn(f32) -> bool) -> Vec<Range<usize>> {
    let mut spans = Vec::new();
    let mut start = None;
    for (i, &l) in lumas.iter().enumerate() {
        match (sortable(l), start) {
            (true, None) => start = Some(i),
            (false, Some(s)) => {
                if i - s >= 2 {
                    spans.push(s..i);
                }
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        if lumas.len() - s >= 2 {
            spans.push(s..lumas.len());
        }
    }
    spans
}

/// Evenly spaced spans of `max(2, round(len·f/4))` pixels, one every two
/// span lengths, starting at a random offset.
fn synthetic_spans<R: Rng>(len: usize, f: f32, rng: &mut R) -> Vec<Range<usize>> {
    if len < 2 {
        return Vec::new();
    }
    let span_len = ((len as f32 * f / 4.0).round() as usize).clamp(2, len);
    let mut start = rng.random_range(0..span_len);
    let mut spans = Vec::new();
    while start < len {
        let end = (start + span_len).min(len);
        if end - start >= 2 {
            spans.push(start..end);
        }
        start += 2 * span_len;
    }
    spans
}

fn read_row(buffer: &RgbaImage, rect: PixelRect, y: u32) -> Vec<Rgba<u8>> {
    (rect.x()..rect.right()).map(|x| *buffer.get_pixel(x, y)).collect()
}

fn write_row(buffer: &mut RgbaImage, rect: PixelRect, y: u32, row: &[Rgba<u8>]) {
    for (x, pixel) in (rect.x()..rect.right()).zip(row) {
        buffer.put_pixel(x, y, *pixel);
    }
}
