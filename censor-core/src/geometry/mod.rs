//! geometry — points, face regions and buffer-aligned rectangles
//!
//! Detector output arrives as real-valued boxes in image space. Effects work
//! on integer rectangles; `PixelRect` is the only way to get one, and it is
//! always clamped to the buffer it was built for.

use serde::{Deserialize, Serialize};

use crate::error::{CensorError, Result};

/// A real-valued image-space coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn midpoint(&self, other: &Point) -> Point {
        Point::new((self.x + other.x) / 2.0, (self.y + other.y) / 2.0)
    }
}

/// A detected face: top-left corner, size, confidence and optional landmarks.
///
/// An empty `landmarks` vector means the detector supplied none. Regions
/// leaving the consolidator always carry at least one landmark.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub landmarks: Vec<Point>,
}

impl Region {
    pub fn new(x: f32, y: f32, width: f32, height: f32, confidence: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
            confidence,
            landmarks: Vec::new(),
        }
    }

    pub fn with_landmarks(mut self, landmarks: Vec<Point>) -> Self {
        self.landmarks = landmarks;
        self
    }

    pub fn has_landmarks(&self) -> bool {
        !self.landmarks.is_empty()
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// IoU (intersection over union) with another region.
    pub fn iou(&self, other: &Region) -> f32 {
        let ix1 = self.x.max(other.x);
        let iy1 = self.y.max(other.y);
        let ix2 = self.right().min(other.right());
        let iy2 = self.bottom().min(other.bottom());
        let inter = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
        if inter == 0.0 {
            return 0.0;
        }
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            return 0.0;
        }
        inter / union
    }

    /// Shift the region and its landmarks by `(dx, dy)`.
    pub fn translated(mut self, dx: f32, dy: f32) -> Self {
        self.x += dx;
        self.y += dy;
        for p in &mut self.landmarks {
            p.x += dx;
            p.y += dy;
        }
        self
    }

    /// Multiply every coordinate, including landmarks, by `factor`.
    pub fn scaled(mut self, factor: f32) -> Self {
        self.x *= factor;
        self.y *= factor;
        self.width *= factor;
        self.height *= factor;
        for p in &mut self.landmarks {
            p.x *= factor;
            p.y *= factor;
        }
        self
    }

    /// Clamp the box into `[0, image_width) × [0, image_height)` and the
    /// confidence into `[0, 1]`.
    ///
    /// Fails with `DegenerateRegion` when nothing of the box survives.
    pub fn clamped(mut self, image_width: u32, image_height: u32) -> Result<Self> {
        let finite = [self.x, self.y, self.width, self.height]
            .iter()
            .all(|v| v.is_finite());
        if !finite {
            return Err(CensorError::DegenerateRegion {
                width: self.width,
                height: self.height,
            });
        }

        let (w, h) = (image_width as f32, image_height as f32);
        let x1 = self.x.clamp(0.0, w);
        let y1 = self.y.clamp(0.0, h);
        let x2 = self.right().clamp(0.0, w);
        let y2 = self.bottom().clamp(0.0, h);
        if x2 - x1 <= 0.0 || y2 - y1 <= 0.0 {
            return Err(CensorError::DegenerateRegion {
                width: x2 - x1,
                height: y2 - y1,
            });
        }

        self.x = x1;
        self.y = y1;
        self.width = x2 - x1;
        self.height = y2 - y1;
        self.confidence = if self.confidence.is_nan() {
            0.0
        } else {
            self.confidence.clamp(0.0, 1.0)
        };
        Ok(self)
    }

    /// The integer rectangle this region covers inside a `width × height` buffer.
    pub fn pixel_rect(&self, width: u32, height: u32) -> Option<PixelRect> {
        PixelRect::clamped(self.x, self.y, self.width, self.height, width, height)
    }
}

/// Integer rectangle guaranteed to lie inside the buffer it was clamped to.
///
/// Only `clamped` builds one. Effects still run `within` against the buffer
/// they are handed, since a rect clamped for a larger buffer would overrun.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    x: u32,
    y: u32,
    width: u32,
    height: u32,
}

impl PixelRect {
    #[cfg(test)]
    pub(crate) const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Floor the origin, ceil the far edge, and clamp both to the buffer.
    ///
    /// Returns `None` when the result is empty or the input is not finite.
    pub fn clamped(
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        buffer_width: u32,
        buffer_height: u32,
    ) -> Option<Self> {
        if ![x, y, width, height].iter().all(|v| v.is_finite()) {
            return None;
        }
        let (bw, bh) = (buffer_width as f32, buffer_height as f32);
        let x0 = x.floor().clamp(0.0, bw) as u32;
        let y0 = y.floor().clamp(0.0, bh) as u32;
        let x1 = (x + width).ceil().clamp(0.0, bw) as u32;
        let y1 = (y + height).ceil().clamp(0.0, bh) as u32;
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some(Self {
            x: x0,
            y: y0,
            width: x1 - x0,
            height: y1 - y0,
        })
    }

    /// The part of this rect inside a `buffer_width × buffer_height` buffer.
    pub fn within(self, buffer_width: u32, buffer_height: u32) -> Option<Self> {
        let x1 = self.right().min(buffer_width);
        let y1 = self.bottom().min(buffer_height);
        if x1 <= self.x || y1 <= self.y {
            return None;
        }
        Some(Self {
            x: self.x,
            y: self.y,
            width: x1 - self.x,
            height: y1 - self.y,
        })
    }

    pub fn x(&self) -> u32 {
        self.x
    }

    pub fn y(&self) -> u32 {
        self.y
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}
