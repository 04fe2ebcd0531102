//! Line-level phrase detection used by the anchor search fallback.

use serde::{Deserialize, Serialize};
use tracing::trace;

use super::{bounding_box, ExtractedWord, Rect};
use crate::models::config::PhraseConfig;

/// A run of adjacent words on one reading line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedPhrase {
    /// Words in left-to-right order.
    pub words: Vec<ExtractedWord>,
    /// Aggregate bounding box.
    pub bbox: Rect,
}

impl DetectedPhrase {
    fn from_words(words: Vec<ExtractedWord>) -> Option<Self> {
        let bbox = bounding_box(&words)?;
        Some(Self { words, bbox })
    }

    /// Phrase text, words joined with single spaces.
    pub fn text(&self) -> String {
        self.words
            .iter()
            .map(|w| w.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Bounding box of the shortest word run whose text contains `needle`
    /// (case-insensitive).
    pub fn locate(&self, needle: &str) -> Option<Rect> {
        let needle = needle.trim().to_lowercase();
        if needle.is_empty() {
            return None;
        }

        let mut best: Option<(usize, Rect)> = None;
        for start in 0..self.words.len() {
            let mut joined = String::new();
            for end in start..self.words.len() {
                if end > start {
                    joined.push(' ');
                }
                joined.push_str(&self.words[end].text.to_lowercase());

                if joined.contains(&needle) {
                    let span = end - start;
                    if best.as_ref().is_none_or(|(s, _)| span < *s) {
                        if let Some(rect) = bounding_box(&self.words[start..=end]) {
                            best = Some((span, rect));
                        }
                    }
                    break;
                }
            }
        }

        best.map(|(_, rect)| rect)
    }
}

/// Groups words into line-level phrases using spacing heuristics.
#[derive(Debug, Clone)]
pub struct PhraseBuilder {
    config: PhraseConfig,
}

impl PhraseBuilder {
    /// Create a builder with default spacing thresholds.
    pub fn new() -> Self {
        Self {
            config: PhraseConfig::default(),
        }
    }

    /// Use custom spacing thresholds.
    pub fn with_config(mut self, config: PhraseConfig) -> Self {
        self.config = config;
        self
    }

    /// Build phrases from all words of a page.
    pub fn build(&self, words: &[ExtractedWord]) -> Vec<DetectedPhrase> {
        let mut phrases = Vec::new();

        for line in self.lines(words) {
            let mut current: Vec<ExtractedWord> = Vec::new();

            for word in line {
                let joins = match current.last() {
                    Some(last) => self.continues_phrase(last, word),
                    None => true,
                };

                if !joins {
                    if let Some(phrase) = DetectedPhrase::from_words(std::mem::take(&mut current)) {
                        phrases.push(phrase);
                    }
                }
                current.push(word.clone());
            }

            if let Some(phrase) = DetectedPhrase::from_words(current) {
                phrases.push(phrase);
            }
        }

        trace!("Built {} phrases from {} words", phrases.len(), words.len());
        phrases
    }

    /// Split words into visual lines, top to bottom, each ordered left to right.
    ///
    /// A new line starts where the vertical gap to the previous word reaches
    /// the same-line tolerance.
    fn lines<'w>(&self, words: &'w [ExtractedWord]) -> Vec<Vec<&'w ExtractedWord>> {
        let mut ordered: Vec<&ExtractedWord> = words.iter().collect();
        ordered.sort_by(|a, b| a.y.total_cmp(&b.y).then(a.x.total_cmp(&b.x)));

        let mut lines: Vec<Vec<&ExtractedWord>> = Vec::new();
        let mut last_y: Option<f64> = None;
        for word in ordered {
            let same_line = last_y.is_some_and(|y| word.y - y < self.config.same_line_tolerance);
            match lines.last_mut() {
                Some(line) if same_line => line.push(word),
                _ => lines.push(vec![word]),
            }
            last_y = Some(word.y);
        }

        for line in &mut lines {
            line.sort_by(|a, b| a.x.total_cmp(&b.x));
        }
        lines
    }

    fn continues_phrase(&self, last: &ExtractedWord, next: &ExtractedWord) -> bool {
        let vertical_shift = (next.y - last.y).abs();
        let horizontal_gap = next.x - (last.x + last.width);

        if horizontal_gap > self.config.break_gap || vertical_shift > self.config.break_shift {
            return false;
        }

        vertical_shift < self.config.same_line_tolerance
            && horizontal_gap >= self.config.min_word_gap
            && horizontal_gap <= self.config.max_word_gap
    }
}

impl Default for PhraseBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(text: &str, x: f64, y: f64, width: f64) -> ExtractedWord {
        ExtractedWord::new(text, x, y, width, 10.0)
    }

    #[test]
    fn test_groups_adjacent_words() {
        let words = vec![
            word("Invoice", 50.0, 100.0, 40.0),
            word("Total:", 95.0, 101.0, 30.0),
            word("Far", 400.0, 100.0, 20.0),
            word("Next", 50.0, 140.0, 25.0),
        ];

        let phrases = PhraseBuilder::new().build(&words);
        let texts: Vec<String> = phrases.iter().map(|p| p.text()).collect();
        assert_eq!(texts, vec!["Invoice Total:", "Far", "Next"]);
        assert_eq!(phrases[0].bbox, Rect::new(50.0, 100.0, 75.0, 11.0));
    }

    #[test]
    fn test_line_jitter_across_bucket_edge() {
        let words = vec![
            word("Invoice", 50.0, 102.0, 40.0),
            word("Total", 95.0, 103.0, 30.0),
            word("Due", 130.0, 102.0, 20.0),
        ];

        let phrases = PhraseBuilder::new().build(&words);
        let texts: Vec<String> = phrases.iter().map(|p| p.text()).collect();
        assert_eq!(texts, vec!["Invoice Total Due"]);
        assert_eq!(phrases[0].bbox, Rect::new(50.0, 102.0, 100.0, 11.0));
    }

    #[test]
    fn test_same_line_tolerance() {
        // a shift of 7 stays on the line, 9 starts a new one
        let joined = PhraseBuilder::new().build(&[word("a", 0.0, 100.0, 10.0), word("b", 15.0, 107.0, 10.0)]);
        assert_eq!(joined.len(), 1);
        assert_eq!(joined[0].text(), "a b");

        let split = PhraseBuilder::new().build(&[word("a", 0.0, 100.0, 10.0), word("b", 15.0, 109.0, 10.0)]);
        let texts: Vec<String> = split.iter().map(|p| p.text()).collect();
        assert_eq!(texts, vec!["a", "b"]);
    }

    #[test]
    fn test_lines_ordered_by_x() {
        // the right-hand word sits slightly higher but still follows on the line
        let words = vec![word("Due", 130.0, 99.0, 20.0), word("Amount", 80.0, 101.0, 45.0)];
        let phrases = PhraseBuilder::new().build(&words);
        assert_eq!(phrases.len(), 1);
        assert_eq!(phrases[0].text(), "Amount Due");
    }

    #[test]
    fn test_gap_limits() {
        // gap of 50 joins, gap of 51 breaks
        let joined = PhraseBuilder::new().build(&[word("a", 0.0, 0.0, 10.0), word("b", 60.0, 0.0, 10.0)]);
        assert_eq!(joined.len(), 1);

        let split = PhraseBuilder::new().build(&[word("a", 0.0, 0.0, 10.0), word("b", 61.0, 0.0, 10.0)]);
        assert_eq!(split.len(), 2);

        // overlapping by more than 5 units breaks
        let overlap = PhraseBuilder::new().build(&[word("a", 0.0, 0.0, 10.0), word("b", 4.0, 0.0, 10.0)]);
        assert_eq!(overlap.len(), 2);
    }

    #[test]
    fn test_locate_sub_run() {
        let phrase = DetectedPhrase::from_words(vec![
            word("Grand", 10.0, 10.0, 30.0),
            word("Total:", 45.0, 10.0, 30.0),
            word("1,250.75", 80.0, 10.0, 50.0),
        ])
        .unwrap();

        let rect = phrase.locate("total:").unwrap();
        assert_eq!(rect, Rect::new(45.0, 10.0, 30.0, 10.0));

        let rect = phrase.locate("Grand Total").unwrap();
        assert_eq!(rect, Rect::new(10.0, 10.0, 65.0, 10.0));

        assert!(phrase.locate("missing").is_none());
    }
}
