//! Solid masks: axis-aligned face rectangles and rotated eye bars.

use image::{Rgba, RgbaImage};
use imageproc::drawing::draw_polygon_mut;
use imageproc::point::Point as ImPoint;

use crate::geometry::PixelRect;
use crate::landmarks::EyeBand;

pub fn fill_rect(buffer: &mut RgbaImage, rect: PixelRect, color: Rgba<u8>) {
    let Some(rect) = rect.within(buffer.width(), buffer.height()) else {
        return;
    };
    for y in rect.y()..rect.bottom() {
        for x in rect.x()..rect.right() {
            buffer.put_pixel(x, y, color);
        }
    }
}

/// Fill the rotated rectangle described by `band`.
///
/// Bands too thin to form a polygon after rounding are filled as their
/// axis-aligned bounds instead.
pub fn draw_rotated_bar(buffer: &mut RgbaImage, band: &EyeBand, color: Rgba<u8>) {
    let (width, height) = buffer.dimensions();
    let polygon: Vec<ImPoint<i32>> = band
        .corners()
        .iter()
        .map(|p| ImPoint::new(p.x.round() as i32, p.y.round() as i32))
        .collect();

    // imageproc rejects polygons whose first and last vertex coincide.
    let closed = polygon.first() == polygon.last();
    if closed || band.length < 1.0 || band.thickness < 1.0 {
        if let Some(rect) = band.bounds(width, height) {
            fill_rect(buffer, rect, color);
        }
        return;
    }
    draw_polygon_mut(buffer, &polygon, color);
}
