//! Axis-aligned rectangles in image pixel coordinates
//!
//! Every region of interest in the pipeline (pile, carton face, layer extent)
//! is a [`Rect`]. Construction validates `x1 < x2` and `y1 < y2`, so code that
//! holds a `Rect` never has to re-check for inverted or empty boxes.

use crate::{CountError, Result};
use serde::{Deserialize, Serialize};

/// Rectangle with corner coordinates `(x1, y1)` top-left and `(x2, y2)` bottom-right
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawRect")]
pub struct Rect {
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
}

#[derive(Deserialize)]
struct RawRect {
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
}

impl TryFrom<RawRect> for Rect {
    type Error = CountError;

    fn try_from(raw: RawRect) -> Result<Self> {
        Rect::new(raw.x1, raw.y1, raw.x2, raw.y2)
    }
}

impl Rect {
    /// Create a rectangle, rejecting non-finite or inverted corners
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Result<Self> {
        if ![x1, y1, x2, y2].iter().all(|v| v.is_finite()) {
            return Err(CountError::InvalidGeometry(format!(
                "non-finite rectangle ({x1}, {y1}, {x2}, {y2})"
            )));
        }
        if x1 >= x2 || y1 >= y2 {
            return Err(CountError::InvalidGeometry(format!(
                "rectangle must satisfy x1<x2 and y1<y2, got ({x1}, {y1}, {x2}, {y2})"
            )));
        }
        Ok(Self { x1, y1, x2, y2 })
    }

    /// Create a rectangle from top-left corner and size
    pub fn from_xywh(x: f32, y: f32, width: f32, height: f32) -> Result<Self> {
        Self::new(x, y, x + width, y + height)
    }

    #[must_use]
    #[inline]
    pub fn x1(&self) -> f32 {
        self.x1
    }

    #[must_use]
    #[inline]
    pub fn y1(&self) -> f32 {
        self.y1
    }

    #[must_use]
    #[inline]
    pub fn x2(&self) -> f32 {
        self.x2
    }

    #[must_use]
    #[inline]
    pub fn y2(&self) -> f32 {
        self.y2
    }

    #[must_use]
    #[inline]
    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    #[must_use]
    #[inline]
    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    #[must_use]
    #[inline]
    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    /// Get center coordinates
    #[must_use]
    pub fn center(&self) -> (f32, f32) {
        ((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }

    #[must_use]
    #[inline]
    pub fn center_x(&self) -> f32 {
        (self.x1 + self.x2) / 2.0
    }

    #[must_use]
    #[inline]
    pub fn center_y(&self) -> f32 {
        (self.y1 + self.y2) / 2.0
    }

    /// Whether a point lies inside the rectangle (edges inclusive)
    #[must_use]
    pub fn contains_point(&self, x: f32, y: f32) -> bool {
        x >= self.x1 && x <= self.x2 && y >= self.y1 && y <= self.y2
    }

    /// Whether the center of `other` lies inside this rectangle
    #[must_use]
    pub fn contains_center_of(&self, other: &Rect) -> bool {
        let (cx, cy) = other.center();
        self.contains_point(cx, cy)
    }

    /// Intersection with another rectangle, `None` when they do not overlap
    #[must_use]
    pub fn intersection(&self, other: &Rect) -> Option<Rect> {
        Rect::new(
            self.x1.max(other.x1),
            self.y1.max(other.y1),
            self.x2.min(other.x2),
            self.y2.min(other.y2),
        )
        .ok()
    }

    /// Calculate Intersection over Union (`IoU`) with another rectangle
    #[must_use]
    #[inline]
    pub fn iou(&self, other: &Rect) -> f32 {
        let intersection_area = self.intersection(other).map_or(0.0, |r| r.area());
        let union_area = self.area() + other.area() - intersection_area;

        if union_area > 0.0 {
            intersection_area / union_area
        } else {
            0.0
        }
    }

    /// Smallest rectangle enclosing every rectangle in `rects`
    ///
    /// Returns `None` for an empty iterator.
    pub fn bounding<'a, I>(rects: I) -> Option<Rect>
    where
        I: IntoIterator<Item = &'a Rect>,
    {
        rects.into_iter().fold(None, |acc, r| match acc {
            None => Some(*r),
            Some(b) => Some(Rect {
                x1: b.x1.min(r.x1),
                y1: b.y1.min(r.y1),
                x2: b.x2.max(r.x2),
                y2: b.y2.max(r.y2),
            }),
        })
    }
}

/// Source image dimensions in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl ImageSize {
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Map a pixel position to normalized `[0, 1]` coordinates
    ///
    /// Returns `None` when the image has a zero dimension.
    #[must_use]
    pub fn normalize(&self, x: f32, y: f32) -> Option<(f32, f32)> {
        if self.width == 0 || self.height == 0 {
            return None;
        }
        Some((x / self.width as f32, y / self.height as f32))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_rejects_inverted_corners() {
        assert!(Rect::new(10.0, 0.0, 5.0, 20.0).is_err());
        assert!(Rect::new(0.0, 10.0, 5.0, 10.0).is_err());
        assert!(Rect::new(0.0, 0.0, f32::NAN, 10.0).is_err());
        assert!(Rect::new(0.0, 0.0, 5.0, 10.0).is_ok());
    }

    #[test]
    fn test_rect_dimensions() {
        let r = Rect::new(10.0, 20.0, 50.0, 80.0).unwrap();
        assert_eq!(r.width(), 40.0);
        assert_eq!(r.height(), 60.0);
        assert_eq!(r.area(), 2400.0);
        assert_eq!(r.center(), (30.0, 50.0));
    }

    #[test]
    fn test_rect_iou() {
        let a = Rect::from_xywh(0.0, 0.0, 10.0, 10.0).unwrap();
        let b = Rect::from_xywh(5.0, 5.0, 10.0, 10.0).unwrap();
        let iou = a.iou(&b);
        assert!(iou > 0.0 && iou < 1.0);
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);

        let far = Rect::from_xywh(100.0, 100.0, 5.0, 5.0).unwrap();
        assert_eq!(a.iou(&far), 0.0);
    }

    #[test]
    fn test_rect_bounding() {
        let rects = vec![
            Rect::new(10.0, 10.0, 20.0, 20.0).unwrap(),
            Rect::new(5.0, 15.0, 12.0, 40.0).unwrap(),
        ];
        let b = Rect::bounding(&rects).unwrap();
        assert_eq!(b, Rect::new(5.0, 10.0, 20.0, 40.0).unwrap());
        assert!(Rect::bounding(&Vec::<Rect>::new()).is_none());
    }

    #[test]
    fn test_rect_deserialize_validates() {
        let ok: Rect = serde_json::from_str(r#"{"x1":1,"y1":2,"x2":3,"y2":4}"#).unwrap();
        assert_eq!(ok.x2(), 3.0);

        let bad = serde_json::from_str::<Rect>(r#"{"x1":5,"y1":2,"x2":3,"y2":4}"#);
        assert!(bad.is_err());
    }

    #[test]
    fn test_image_size_normalize() {
        let size = ImageSize::new(200, 100);
        assert_eq!(size.normalize(100.0, 25.0), Some((0.5, 0.25)));
        assert_eq!(ImageSize::new(0, 100).normalize(1.0, 1.0), None);
    }
}
