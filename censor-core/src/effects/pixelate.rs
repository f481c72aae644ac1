//! Block pixelation: every block becomes the rounded mean of its pixels.

use std::ops::Range;

use image::{Rgba, RgbaImage};

use crate::geometry::PixelRect;

/// Replace each `block`×`block` cell of `rect` (smaller at the right and
/// bottom edges) with its per-channel mean. Blocks of 0 or 1 are a no-op.
pub fn pixelate(buffer: &mut RgbaImage, rect: PixelRect, block: u32) {
    let Some(rect) = rect.within(buffer.width(), buffer.height()) else {
        return;
    };
    if block <= 1 {
        return;
    }
    for by in (rect.y()..rect.bottom()).step_by(block as usize) {
        let ys = by..by.saturating_add(block).min(rect.bottom());
        for bx in (rect.x()..rect.right()).step_by(block as usize) {
            let xs = bx..bx.saturating_add(block).min(rect.right());
            let mean = cell_mean(buffer, xs.clone(), ys.clone());
            for y in ys.clone() {
                for x in xs.clone() {
                    buffer.put_pixel(x, y, mean);
                }
            }
        }
    }
}

fn cell_mean(buffer: &RgbaImage, xs: Range<u32>, ys: Range<u32>) -> Rgba<u8> {
    let mut sums = [0u64; 4];
    for y in ys.clone() {
        for x in xs.clone() {
            for (sum, channel) in sums.iter_mut().zip(buffer.get_pixel(x, y).0) {
                *sum += channel as u64;
            }
        }
    }
    let count = (xs.len() as u64 * ys.len() as u64).max(1);
    Rgba(sums.map(|sum| ((sum + count / 2) / count) as u8))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noise(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_fn(width, height, |x, y| {
            let v = (x * 31 + y * 17 + x * y * 7) % 256;
            Rgba([v as u8, (255 - v) as u8, (v / 2) as u8, 255])
        })
    }

    fn full(buffer: &RgbaImage) -> PixelRect {
        PixelRect::new(0, 0, buffer.width(), buffer.height())
    }

    #[test]
    fn uniform_block_is_unchanged() {
        let red = Rgba([255, 0, 0, 255]);
        let mut buffer = RgbaImage::from_pixel(8, 8, red);
        let rect = full(&buffer);
        pixelate(&mut buffer, rect, 4);
        assert!(buffer.pixels().all(|p| *p == red));
    }

    #[test]
    fn unit_block_is_a_no_op() {
        let mut buffer = noise(9, 7);
        let before = buffer.clone();
        let rect = full(&buffer);
        pixelate(&mut buffer, rect, 1);
        assert_eq!(buffer, before);
    }

    #[test]
    fn blocks_preserve_their_mean() {
        let before = noise(10, 10);
        let mut buffer = before.clone();
        let rect = full(&buffer);
        pixelate(&mut buffer, rect, 4);

        // 10 is not a multiple of 4: the last row and column of blocks are 2 wide.
        for (bx, by, bw, bh) in [(0, 0, 4, 4), (8, 0, 2, 4), (0, 8, 4, 2), (8, 8, 2, 2)] {
            let expected = cell_mean(&before, bx..bx + bw, by..by + bh);
            let first = *buffer.get_pixel(bx, by);
            assert_eq!(first, expected);
            for y in by..by + bh {
                for x in bx..bx + bw {
                    assert_eq!(buffer.get_pixel(x, y), &first);
                }
            }
        }
    }

    #[test]
    fn pixels_outside_the_rect_are_untouched() {
        let before = noise(12, 12);
        let mut buffer = before.clone();
        pixelate(&mut buffer, PixelRect::new(4, 4, 4, 4), 4);
        for (x, y, pixel) in before.enumerate_pixels() {
            let inside = (4..8).contains(&x) && (4..8).contains(&y);
            if !inside {
                assert_eq!(buffer.get_pixel(x, y), pixel);
            }
        }
    }
}
