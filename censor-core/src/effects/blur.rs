//! Separable box blur restricted to a rectangle.
//!
//! Three horizontal+vertical passes approximate a Gaussian. Samples outside
//! the rectangle are clamped to its edge, so no colour leaks in from the
//! surrounding image.

use image::RgbaImage;

use crate::geometry::PixelRect;

pub const BLUR_PASSES: usize = 3;
/// Radii above this are clamped.
pub const MAX_BLUR_RADIUS: u32 = 255;

type Px = [u8; 4];

/// Blur `rect` in place. Radius 0 leaves the buffer bit-identical.
pub fn box_blur(buffer: &mut RgbaImage, rect: PixelRect, radius: u32) {
    let Some(rect) = rect.within(buffer.width(), buffer.height()) else {
        return;
    };
    if radius == 0 {
        return;
    }
    let radius = radius.min(MAX_BLUR_RADIUS) as usize;
    let (w, h) = (rect.width() as usize, rect.height() as usize);

    let mut src: Vec<Px> = (rect.y()..rect.bottom())
        .flat_map(|y| (rect.x()..rect.right()).map(move |x| (x, y)))
        .map(|(x, y)| buffer.get_pixel(x, y).0)
        .collect();
    let mut dst = vec![[0u8; 4]; w * h];

    for _ in 0..BLUR_PASSES {
        // Rows: `h` lines of `w` samples, stride 1.
        blur_lines(&src, &mut dst, h, w, |line, i| line * w + i, radius);
        std::mem::swap(&mut src, &mut dst);
        // Columns: `w` lines of `h` samples, stride `w`.
        blur_lines(&src, &mut dst, w, h, |line, i| i * w + line, radius);
        std::mem::swap(&mut src, &mut dst);
    }

    for (i, px) in src.into_iter().enumerate() {
        let x = rect.x() + (i % w) as u32;
        let y = rect.y() + (i / w) as u32;
        buffer.put_pixel(x, y, image::Rgba(px));
    }
}

/// One sliding-window pass over `lines` independent lines of `len` samples.
fn blur_lines(
    src: &[Px],
    dst: &mut [Px],
    lines: usize,
    len: usize,
    index: impl Fn(usize, usize) -> usize,
    radius: usize,
) {
    let div = (2 * radius + 1) as u32;
    let last = len - 1;
    let at = |line: usize, i: isize| src[index(line, i.clamp(0, last as isize) as usize)];

    for line in 0..lines {
        let mut sum = [0u32; 4];
        for i in -(radius as isize)..=radius as isize {
            accumulate(&mut sum, at(line, i), true);
        }
        for i in 0..len {
            dst[index(line, i)] = sum.map(|s| ((s + div / 2) / div) as u8);
            let leaving = i as isize - radius as isize;
            let entering = i as isize + radius as isize + 1;
            accumulate(&mut sum, at(line, leaving), false);
            accumulate(&mut sum, at(line, entering), true);
        }
    }
}

fn accumulate(sum: &mut [u32; 4], px: Px, add: bool) {
    for (s, c) in sum.iter_mut().zip(px) {
        if add {
            *s += c as u32;
        } else {
            *s -= c as u32;
        }
    }
}
