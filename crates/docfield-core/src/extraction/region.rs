//! Word collection inside a rectangle.

use serde::{Deserialize, Serialize};

use crate::layout::{bounding_box, join_words, sort_reading_order, ExtractedWord, Rect};
use crate::models::config::ExtractionConfig;

/// Tolerance applied to the coverage comparison.
const COVERAGE_EPSILON: f64 = 1e-9;

/// Text found inside a region.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegionText {
    /// Words joined in reading order.
    pub text: String,
    /// Number of contributing words.
    pub word_count: usize,
    /// Bounding box of the contributing words.
    pub bbox: Option<Rect>,
}

impl RegionText {
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Collect the words covered by `region` and join them in reading order.
///
/// A word contributes when at least `min_word_coverage` of its own area
/// lies inside the region.
pub fn collect_region(words: &[ExtractedWord], region: &Rect, config: &ExtractionConfig) -> RegionText {
    let mut inside: Vec<&ExtractedWord> = words
        .iter()
        .filter(|w| w.coverage_by(region) + COVERAGE_EPSILON >= config.min_word_coverage)
        .collect();

    sort_reading_order(&mut inside, config.line_bucket);

    RegionText {
        text: join_words(&inside),
        word_count: inside.len(),
        bbox: bounding_box(inside.iter().copied()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coverage_boundary() {
        let config = ExtractionConfig::default();
        let region = Rect::new(0.0, 0.0, 100.0, 20.0);

        // 30% inside contributes
        let at = vec![ExtractedWord::new("in", 70.0, 0.0, 100.0, 20.0)];
        assert_eq!(collect_region(&at, &region, &config).text, "in");

        // 29% inside never contributes
        let below = vec![ExtractedWord::new("out", 71.0, 0.0, 100.0, 20.0)];
        assert!(collect_region(&below, &region, &config).is_empty());
    }

    #[test]
    fn test_multi_line_region() {
        let config = ExtractionConfig::default();
        let words = vec![
            ExtractedWord::new("Street", 60.0, 112.0, 40.0, 10.0),
            ExtractedWord::new("Main", 10.0, 111.0, 40.0, 10.0),
            ExtractedWord::new("12", 10.0, 100.0, 15.0, 10.0),
            ExtractedWord::new("elsewhere", 400.0, 100.0, 40.0, 10.0),
        ];
        let region = Rect::new(0.0, 95.0, 150.0, 30.0);

        let found = collect_region(&words, &region, &config);
        assert_eq!(found.text, "12 Main Street");
        assert_eq!(found.word_count, 3);
        assert_eq!(found.bbox, Some(Rect::new(10.0, 100.0, 90.0, 22.0)));
    }
}
