//! overlay — diagnostic drawings over a region
//!
//! `draw_wireframe` connects landmarks into a mesh; `draw_landmark_dump`
//! marks every landmark coloured by facial feature. Both print the optional
//! label with the built-in glyph font.

use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_rect_mut, draw_line_segment_mut};
use imageproc::rect::Rect;

use super::glyph::{draw_text, text_width, GLYPH_HEIGHT};
use crate::geometry::{PixelRect, Point, Region};
use crate::landmarks::{feature_band, layout68, FeatureBand};

pub const MESH_COLOR: Rgba<u8> = Rgba([0, 255, 160, 255]);
pub const MARKER_COLOR: Rgba<u8> = Rgba([255, 255, 255, 255]);
pub const BOX_COLOR: Rgba<u8> = Rgba([0, 200, 255, 255]);
pub const TEXT_COLOR: Rgba<u8> = Rgba([255, 255, 255, 255]);
pub const MISSING_COLOR: Rgba<u8> = Rgba([255, 64, 64, 255]);

pub const MARKER_RADIUS: i32 = 2;
/// Distance meshes link points closer than this fraction of the region width.
pub const MESH_LINK_RATIO: f32 = 0.25;
pub const TEXT_SCALE: u32 = 2;
const DASH_ON: u32 = 4;
const DASH_OFF: u32 = 3;

fn feature_color(band: FeatureBand) -> Rgba<u8> {
    match band {
        FeatureBand::Eye => Rgba([0, 255, 0, 255]),
        FeatureBand::Nose => Rgba([0, 96, 255, 255]),
        FeatureBand::Mouth => Rgba([255, 0, 0, 255]),
        FeatureBand::Other => Rgba([255, 230, 0, 255]),
    }
}

/// Mesh of lines between landmarks plus a marker on each.
///
/// 68-point sets are drawn as feature outlines; smaller sets link every pair
/// of points closer than a quarter of the region width.
pub fn draw_wireframe(buffer: &mut RgbaImage, region: &Region, label: Option<&str>) {
    let points = &region.landmarks;
    if points.len() >= layout68::POINT_COUNT {
        draw_structural_mesh(buffer, points);
    } else {
        let max_link = region.width * MESH_LINK_RATIO;
        for (i, a) in points.iter().enumerate() {
            for b in &points[i + 1..] {
                if a.distance(b) < max_link {
                    line(buffer, *a, *b, MESH_COLOR);
                }
            }
        }
    }
    for p in points {
        marker(buffer, *p, MARKER_COLOR);
    }
    if let Some(label) = label {
        draw_label(buffer, region, label);
    }
}

fn draw_structural_mesh(buffer: &mut RgbaImage, points: &[Point]) {
    let open = [
        layout68::JAW,
        layout68::RIGHT_BROW,
        layout68::LEFT_BROW,
        layout68::NOSE_BRIDGE,
        layout68::NOSE_BASE,
    ];
    let closed = [
        layout68::RIGHT_EYE,
        layout68::LEFT_EYE,
        layout68::OUTER_MOUTH,
        layout68::INNER_MOUTH,
    ];
    for range in open {
        polyline(buffer, &points[range], false);
    }
    for range in closed {
        polyline(buffer, &points[range], true);
    }
    // Bridge tip down to the centre of the nose base.
    line(buffer, points[*layout68::NOSE_BRIDGE.end()], points[33], MESH_COLOR);
}

fn polyline(buffer: &mut RgbaImage, points: &[Point], closed: bool) {
    for pair in points.windows(2) {
        line(buffer, pair[0], pair[1], MESH_COLOR);
    }
    if closed {
        if let (Some(first), Some(last)) = (points.first(), points.last()) {
            line(buffer, *last, *first, MESH_COLOR);
        }
    }
}

/// Feature-coloured markers, the region outline and a point count. Regions
/// without landmarks get a dashed outline, a cross and "NO LANDMARKS".
pub fn draw_landmark_dump(buffer: &mut RgbaImage, region: &Region, label: Option<&str>) {
    let (width, height) = buffer.dimensions();
    let Some(rect) = region.pixel_rect(width, height) else {
        return;
    };

    if region.landmarks.is_empty() {
        dashed_rect(buffer, rect, MISSING_COLOR);
        let c = region.center();
        let arm = (region.width.min(region.height) / 4.0).max(2.0);
        let (nw, se) = (Point::new(c.x - arm, c.y - arm), Point::new(c.x + arm, c.y + arm));
        let (sw, ne) = (Point::new(c.x - arm, c.y + arm), Point::new(c.x + arm, c.y - arm));
        line(buffer, nw, se, MISSING_COLOR);
        line(buffer, sw, ne, MISSING_COLOR);
        let (x, y) = (rect.x() as i32 + 2, rect.y() as i32 + 2);
        draw_text(buffer, x, y, "NO LANDMARKS", 1, MISSING_COLOR);
    } else {
        draw_hollow_rect_mut(
            buffer,
            Rect::at(rect.x() as i32, rect.y() as i32).of_size(rect.width(), rect.height()),
            BOX_COLOR,
        );
        let count = region.landmarks.len();
        for (i, p) in region.landmarks.iter().enumerate() {
            marker(buffer, *p, feature_color(feature_band(i, count)));
        }
        draw_text(
            buffer,
            rect.x() as i32 + 2,
            rect.y() as i32 + 2,
            &count.to_string(),
            TEXT_SCALE,
            TEXT_COLOR,
        );
    }
    if let Some(label) = label {
        draw_label(buffer, region, label);
    }
}

/// Label above the region, or just inside its bottom edge when there is no
/// room above.
fn draw_label(buffer: &mut RgbaImage, region: &Region, label: &str) {
    let text_height = (GLYPH_HEIGHT * TEXT_SCALE) as f32;
    let y = if region.y >= text_height + 2.0 {
        region.y - text_height - 2.0
    } else {
        region.bottom() - text_height - 2.0
    };
    // Pull long labels back from the right edge.
    let room = buffer.width().saturating_sub(text_width(label, TEXT_SCALE)) as f32;
    let x = region.x.min(room).max(0.0);
    draw_text(buffer, x as i32, y as i32, label, TEXT_SCALE, TEXT_COLOR);
}

fn dashed_rect(buffer: &mut RgbaImage, rect: PixelRect, color: Rgba<u8>) {
    let Some(rect) = rect.within(buffer.width(), buffer.height()) else {
        return;
    };
    let (right, bottom) = (rect.right() - 1, rect.bottom() - 1);
    let dash = |i: u32| i % (DASH_ON + DASH_OFF) < DASH_ON;
    for (i, x) in (rect.x()..=right).enumerate() {
        if dash(i as u32) {
            buffer.put_pixel(x, rect.y(), color);
            buffer.put_pixel(x, bottom, color);
        }
    }
    for (i, y) in (rect.y()..=bottom).enumerate() {
        if dash(i as u32) {
            buffer.put_pixel(rect.x(), y, color);
            buffer.put_pixel(right, y, color);
        }
    }
}

fn line(buffer: &mut RgbaImage, a: Point, b: Point, color: Rgba<u8>) {
    let (width, height) = buffer.dimensions();
    if !(within_reach(a, width, height) && within_reach(b, width, height)) {
        return;
    }
    draw_line_segment_mut(buffer, (a.x, a.y), (b.x, b.y), color);
}

/// `draw_line_segment_mut` walks every step between the endpoints, clipped
/// or not, so endpoints are kept within one buffer size of the buffer.
fn within_reach(p: Point, width: u32, height: u32) -> bool {
    let (w, h) = (width as f32, height as f32);
    p.x.is_finite()
        && p.y.is_finite()
        && (-w..=2.0 * w).contains(&p.x)
        && (-h..=2.0 * h).contains(&p.y)
}

fn marker(buffer: &mut RgbaImage, p: Point, color: Rgba<u8>) {
    if !(p.x.is_finite() && p.y.is_finite()) {
        return;
    }
    draw_filled_circle_mut(
        buffer,
        (p.x.round() as i32, p.y.round() as i32),
        MARKER_RADIUS,
        color,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::synthesize_landmarks;

    const BG: Rgba<u8> = Rgba([10, 10, 10, 255]);

    fn changed(buffer: &RgbaImage) -> usize {
        buffer.pixels().filter(|p| **p != BG).count()
    }

    fn ring68(region: &Region) -> Vec<Point> {
        let c = region.center();
        (0..68)
            .map(|i| {
                let t = i as f32 / 68.0 * std::f32::consts::TAU;
                Point::new(c.x + t.cos() * region.width * 0.4, c.y + t.sin() * region.height * 0.4)
            })
            .collect()
    }

    #[test]
    fn wireframe_marks_every_landmark() {
        let region = Region::new(20.0, 20.0, 60.0, 60.0, 0.9);
        let region = region.clone().with_landmarks(synthesize_landmarks(&region));
        let mut buffer = RgbaImage::from_pixel(100, 100, BG);
        draw_wireframe(&mut buffer, &region, None);
        for p in &region.landmarks {
            assert_eq!(
                buffer.get_pixel(p.x.round() as u32, p.y.round() as u32),
                &MARKER_COLOR
            );
        }
    }

    #[test]
    fn structural_mesh_draws_lines_between_points() {
        let region = Region::new(10.0, 10.0, 80.0, 80.0, 0.9);
        let region = region.clone().with_landmarks(ring68(&region));
        let mut buffer = RgbaImage::from_pixel(100, 100, BG);
        draw_wireframe(&mut buffer, &region, Some("A1"));
        assert!(buffer.pixels().any(|p| *p == MESH_COLOR));
    }

    #[test]
    fn landmark_dump_colours_by_feature() {
        let region = Region::new(10.0, 10.0, 80.0, 80.0, 0.9);
        let region = region.clone().with_landmarks(synthesize_landmarks(&region));
        let mut buffer = RgbaImage::from_pixel(100, 100, BG);
        draw_landmark_dump(&mut buffer, &region, None);
        let eye = region.landmarks[0];
        assert_eq!(
            buffer.get_pixel(eye.x.round() as u32, eye.y.round() as u32),
            &feature_color(FeatureBand::Eye)
        );
        // Outline on the left edge, away from the count text.
        assert_eq!(buffer.get_pixel(10, 60), &BOX_COLOR);
    }

    #[test]
    fn landmark_dump_without_landmarks_marks_missing() {
        let region = Region::new(10.0, 10.0, 60.0, 40.0, 0.9);
        let mut buffer = RgbaImage::from_pixel(100, 100, BG);
        draw_landmark_dump(&mut buffer, &region, Some("X"));
        assert_eq!(buffer.get_pixel(10, 10), &MISSING_COLOR);
        assert_eq!(buffer.get_pixel(40, 30), &MISSING_COLOR);
        // The dash leaves gaps.
        assert_eq!(buffer.get_pixel(15, 49), &BG);
    }

    #[test]
    fn overlays_tolerate_regions_at_the_border() {
        let region = Region::new(-5.0, -5.0, 12.0, 12.0, 0.9);
        let region = region.clone().with_landmarks(synthesize_landmarks(&region));
        let mut buffer = RgbaImage::from_pixel(16, 16, BG);
        draw_wireframe(&mut buffer, &region, Some("LABEL"));
        draw_landmark_dump(&mut buffer, &region, Some("LABEL"));
        assert!(changed(&buffer) > 0);
    }

    #[test]
    fn lines_to_unreachable_landmarks_are_skipped() {
        let mut buffer = RgbaImage::from_pixel(32, 32, BG);
        line(&mut buffer, Point::new(4.0, 4.0), Point::new(1e30, 4.0), MESH_COLOR);
        line(&mut buffer, Point::new(f32::NAN, 4.0), Point::new(20.0, 20.0), MESH_COLOR);
        line(&mut buffer, Point::new(4.0, 4.0), Point::new(4.0, -100.0), MESH_COLOR);
        assert_eq!(changed(&buffer), 0);

        // Partly off-buffer but close by still draws.
        line(&mut buffer, Point::new(-10.0, 8.0), Point::new(40.0, 8.0), MESH_COLOR);
        assert_eq!(buffer.get_pixel(0, 8), &MESH_COLOR);
        assert_eq!(buffer.get_pixel(31, 8), &MESH_COLOR);
    }

    #[test]
    fn label_is_pulled_back_from_the_right_edge() {
        let region = Region::new(90.0, 40.0, 8.0, 8.0, 0.9);
        let mut buffer = RgbaImage::from_pixel(100, 100, BG);
        draw_wireframe(&mut buffer, &region, Some("AA"));
        // "AA" is 14 px wide at scale 2, so it starts at x = 86, 12 px above the box.
        assert_eq!(buffer.get_pixel(86, 30), &TEXT_COLOR);
        assert_eq!(buffer.get_pixel(88, 28), &TEXT_COLOR);
        assert_eq!(buffer.get_pixel(85, 30), &BG);
    }
}
