//! Page geometry: rectangles, positioned words and reading order.
//!
//! All coordinates use a top-left origin with y increasing downward.

mod phrases;

pub use phrases::{DetectedPhrase, PhraseBuilder};

use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle (x, y is the top-left corner).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Right edge.
    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    /// Bottom edge.
    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    /// Get the area of the rectangle.
    pub fn area(&self) -> f64 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// Check if a point is inside this rectangle.
    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        x >= self.x && x <= self.right() && y >= self.y && y <= self.bottom()
    }

    /// Area shared with another rectangle (0 when disjoint).
    pub fn intersection_area(&self, other: &Rect) -> f64 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = self.right().min(other.right());
        let y2 = self.bottom().min(other.bottom());

        if x2 <= x1 || y2 <= y1 {
            return 0.0;
        }

        (x2 - x1) * (y2 - y1)
    }

    /// Smallest rectangle containing both.
    pub fn union(&self, other: &Rect) -> Rect {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        let right = self.right().max(other.right());
        let bottom = self.bottom().max(other.bottom());
        Rect::new(x, y, right - x, bottom - y)
    }

    /// Euclidean distance between the top-left corners.
    pub fn origin_distance(&self, other: &Rect) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// A word extracted from a page, with its bounding box.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedWord {
    /// Word text (no whitespace).
    pub text: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl ExtractedWord {
    pub fn new(text: impl Into<String>, x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            text: text.into(),
            x,
            y,
            width,
            height,
        }
    }

    pub fn rect(&self) -> Rect {
        Rect::new(self.x, self.y, self.width, self.height)
    }

    /// Fraction of this word's own area that lies inside `region`.
    ///
    /// Degenerate (zero-area) words count as fully covered when their
    /// top-left corner is inside the region, otherwise not at all.
    pub fn coverage_by(&self, region: &Rect) -> f64 {
        let rect = self.rect();
        let area = rect.area();
        if area <= 0.0 {
            return if region.contains_point(self.x, self.y) {
                1.0
            } else {
                0.0
            };
        }
        rect.intersection_area(region) / area
    }
}

/// Sort words into reading order: lines by rounded y bucket, then left to right.
pub fn sort_reading_order(words: &mut [&ExtractedWord], line_bucket: f64) {
    let bucket = if line_bucket > 0.0 { line_bucket } else { 1.0 };
    words.sort_by(|a, b| {
        let row_a = (a.y / bucket).round() as i64;
        let row_b = (b.y / bucket).round() as i64;

        if row_a != row_b {
            row_a.cmp(&row_b)
        } else {
            a.x.partial_cmp(&b.x).unwrap_or(std::cmp::Ordering::Equal)
        }
    });
}

/// Join words (already in reading order) into a single string.
pub fn join_words(words: &[&ExtractedWord]) -> String {
    words
        .iter()
        .map(|w| w.text.as_str())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Bounding box of a set of words.
pub fn bounding_box<'a>(words: impl IntoIterator<Item = &'a ExtractedWord>) -> Option<Rect> {
    words
        .into_iter()
        .map(ExtractedWord::rect)
        .reduce(|acc, r| acc.union(&r))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intersection_area() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let b = Rect::new(5.0, 5.0, 10.0, 10.0);
        assert_eq!(a.intersection_area(&b), 25.0);

        let c = Rect::new(20.0, 20.0, 5.0, 5.0);
        assert_eq!(a.intersection_area(&c), 0.0);
    }

    #[test]
    fn test_coverage_threshold_boundary() {
        let region = Rect::new(0.0, 0.0, 100.0, 20.0);

        // 30 of 100 units wide inside -> exactly 0.3
        let word = ExtractedWord::new("edge", 70.0, 0.0, 100.0, 20.0);
        assert!((word.coverage_by(&region) - 0.3).abs() < 1e-12);

        let outside = ExtractedWord::new("far", 200.0, 0.0, 10.0, 10.0);
        assert_eq!(outside.coverage_by(&region), 0.0);
    }

    #[test]
    fn test_zero_area_word() {
        let region = Rect::new(0.0, 0.0, 10.0, 10.0);
        let inside = ExtractedWord::new("x", 5.0, 5.0, 0.0, 0.0);
        let outside = ExtractedWord::new("x", 50.0, 5.0, 0.0, 0.0);
        assert_eq!(inside.coverage_by(&region), 1.0);
        assert_eq!(outside.coverage_by(&region), 0.0);
    }

    #[test]
    fn test_reading_order() {
        let words = vec![
            ExtractedWord::new("world", 60.0, 101.0, 40.0, 10.0),
            ExtractedWord::new("second", 10.0, 130.0, 40.0, 10.0),
            ExtractedWord::new("hello", 10.0, 99.0, 40.0, 10.0),
        ];
        let mut refs: Vec<&ExtractedWord> = words.iter().collect();
        sort_reading_order(&mut refs, 5.0);
        assert_eq!(join_words(&refs), "hello world second");
    }

    #[test]
    fn test_bounding_box() {
        let words = vec![
            ExtractedWord::new("a", 10.0, 10.0, 5.0, 5.0),
            ExtractedWord::new("b", 20.0, 12.0, 5.0, 8.0),
        ];
        let bbox = bounding_box(&words).unwrap();
        assert_eq!(bbox, Rect::new(10.0, 10.0, 15.0, 10.0));
        assert!(bounding_box(Vec::<ExtractedWord>::new().iter()).is_none());
    }
}
