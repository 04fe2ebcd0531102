//! Locating a single anchor on its page.

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::similarity::text_similarity;
use crate::extraction::region::collect_region;
use crate::layout::{DetectedPhrase, ExtractedWord, PhraseBuilder, Rect};
use crate::models::config::{CalibrationConfig, ExtractionConfig};
use crate::models::template::Anchor;

/// Quality tier derived from the similarity score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchQuality {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl MatchQuality {
    pub fn from_similarity(similarity: f64) -> Self {
        if similarity >= 0.95 {
            MatchQuality::Excellent
        } else if similarity >= 0.85 {
            MatchQuality::Good
        } else if similarity >= 0.70 {
            MatchQuality::Fair
        } else {
            MatchQuality::Poor
        }
    }
}

/// How the anchor text was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMethod {
    /// Words inside the configured rectangle.
    ExactRegion,
    /// Phrase search over the whole page.
    PhraseSearch,
    NotFound,
}

/// Result of locating one anchor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnchorMatch {
    pub name: String,
    pub reference_text: String,
    pub extracted_text: String,
    pub similarity: f64,
    pub is_text_match: bool,
    pub quality: MatchQuality,
    pub method: MatchMethod,
    pub page: u32,
    /// Rectangle configured in the template.
    pub configured: Rect,
    /// Where the anchor text was actually found.
    pub found: Option<Rect>,
    /// Flagged by the z-score check.
    pub is_outlier: bool,
}

impl AnchorMatch {
    /// An anchor whose text could not be located.
    pub fn not_found(anchor: &Anchor) -> Self {
        Self {
            name: anchor.name.clone(),
            reference_text: anchor.reference_text.clone(),
            extracted_text: String::new(),
            similarity: 0.0,
            is_text_match: false,
            quality: MatchQuality::Poor,
            method: MatchMethod::NotFound,
            page: anchor.page,
            configured: anchor.rect,
            found: None,
            is_outlier: false,
        }
    }

    /// Found minus configured position, when found.
    pub fn offset(&self) -> Option<(f64, f64)> {
        self.found
            .map(|f| (f.x - self.configured.x, f.y - self.configured.y))
    }

    fn with_text(mut self, text: String, similarity: f64, threshold: f64) -> Self {
        self.extracted_text = text;
        self.similarity = similarity;
        self.is_text_match = similarity >= threshold;
        self.quality = MatchQuality::from_similarity(similarity);
        self
    }
}

/// Search tiers for the phrase fallback, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PhraseTier {
    Exact,
    Contains,
    ContainedIn,
    Fuzzy,
}

const PHRASE_TIERS: [PhraseTier; 4] = [
    PhraseTier::Exact,
    PhraseTier::Contains,
    PhraseTier::ContainedIn,
    PhraseTier::Fuzzy,
];

/// Finds anchors in page words.
#[derive(Debug, Clone)]
pub struct AnchorMatcher {
    config: CalibrationConfig,
    extraction: ExtractionConfig,
}

impl AnchorMatcher {
    pub fn new(config: CalibrationConfig, extraction: ExtractionConfig) -> Self {
        Self { config, extraction }
    }

    /// Locate an anchor among the words of its page.
    pub fn match_anchor(&self, anchor: &Anchor, words: &[ExtractedWord]) -> AnchorMatch {
        let base = AnchorMatch::not_found(anchor);
        let region = collect_region(words, &anchor.rect, &self.extraction);

        if !region.is_empty() {
            let similarity = text_similarity(&anchor.reference_text, &region.text);
            trace!(
                "Anchor {} region text {:?} (similarity {:.3})",
                anchor.name,
                region.text,
                similarity
            );

            let mut found = base.with_text(region.text, similarity, self.config.similarity_threshold);
            found.method = MatchMethod::ExactRegion;
            found.found = region.bbox;
            return found;
        }

        match self.search_phrases(anchor, words) {
            Some((phrase, rect, similarity)) => {
                debug!(
                    "Anchor {} found by phrase search: {:?}",
                    anchor.name,
                    phrase.text()
                );
                let mut found = base.with_text(phrase.text(), similarity, self.config.similarity_threshold);
                found.method = MatchMethod::PhraseSearch;
                found.found = Some(rect);
                found
            }
            None => {
                debug!("Anchor {} not found on page {}", anchor.name, anchor.page);
                base
            }
        }
    }

    /// Search line phrases tier by tier; the phrase nearest the configured
    /// rectangle wins within a tier.
    fn search_phrases(
        &self,
        anchor: &Anchor,
        words: &[ExtractedWord],
    ) -> Option<(DetectedPhrase, Rect, f64)> {
        let reference = anchor.reference_text.trim().to_lowercase();
        if reference.is_empty() {
            return None;
        }

        let phrases = PhraseBuilder::new()
            .with_config(self.config.phrases.clone())
            .build(words);

        for tier in PHRASE_TIERS {
            let best = phrases
                .iter()
                .filter_map(|phrase| self.tier_match(tier, &reference, anchor, phrase))
                .min_by(|a, b| {
                    let da = a.1.origin_distance(&anchor.rect);
                    let db = b.1.origin_distance(&anchor.rect);
                    da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
                });

            if let Some((phrase, rect, similarity)) = best {
                return Some((phrase.clone(), rect, similarity));
            }
        }

        None
    }

    fn tier_match<'p>(
        &self,
        tier: PhraseTier,
        reference: &str,
        anchor: &Anchor,
        phrase: &'p DetectedPhrase,
    ) -> Option<(&'p DetectedPhrase, Rect, f64)> {
        let text = phrase.text().to_lowercase();
        if text.is_empty() {
            return None;
        }

        let similarity = text_similarity(&anchor.reference_text, &text);
        match tier {
            PhraseTier::Exact => (text == reference).then_some((phrase, phrase.bbox, 1.0)),
            PhraseTier::Contains => text
                .contains(reference)
                .then(|| (phrase, phrase.locate(reference).unwrap_or(phrase.bbox), similarity)),
            PhraseTier::ContainedIn => {
                reference.contains(&text).then_some((phrase, phrase.bbox, similarity))
            }
            PhraseTier::Fuzzy => (similarity >= self.config.similarity_threshold)
                .then_some((phrase, phrase.bbox, similarity)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn anchor(text: &str, rect: Rect) -> Anchor {
        Anchor {
            name: "anchor".to_string(),
            reference_text: text.to_string(),
            page: 1,
            rect,
            order: 0,
        }
    }

    fn matcher() -> AnchorMatcher {
        AnchorMatcher::new(CalibrationConfig::default(), ExtractionConfig::default())
    }

    #[test]
    fn test_exact_region_match() {
        let words = vec![ExtractedWord::new("Total:", 103.0, 98.0, 48.0, 21.0)];
        let result = matcher().match_anchor(&anchor("Total:", Rect::new(100.0, 100.0, 50.0, 20.0)), &words);

        assert_eq!(result.similarity, 1.0);
        assert!(result.is_text_match);
        assert_eq!(result.quality, MatchQuality::Excellent);
        assert_eq!(result.method, MatchMethod::ExactRegion);
        assert_eq!(result.offset(), Some((3.0, -2.0)));
    }

    #[test]
    fn test_phrase_search_prefers_nearest() {
        let words = vec![
            ExtractedWord::new("Grand", 300.0, 400.0, 30.0, 10.0),
            ExtractedWord::new("Total:", 335.0, 400.0, 30.0, 10.0),
            ExtractedWord::new("Total:", 20.0, 700.0, 30.0, 10.0),
            ExtractedWord::new("Total:", 160.0, 130.0, 30.0, 10.0),
        ];
        let result = matcher().match_anchor(&anchor("Total:", Rect::new(100.0, 100.0, 40.0, 12.0)), &words);

        assert_eq!(result.method, MatchMethod::PhraseSearch);
        assert_eq!(result.similarity, 1.0);
        assert_eq!(result.found, Some(Rect::new(160.0, 130.0, 30.0, 10.0)));
    }

    #[test]
    fn test_phrase_search_narrows_containment() {
        let words = vec![
            ExtractedWord::new("Grand", 300.0, 400.0, 30.0, 10.0),
            ExtractedWord::new("Total:", 335.0, 400.0, 30.0, 10.0),
        ];
        let result = matcher().match_anchor(&anchor("total:", Rect::new(100.0, 100.0, 40.0, 12.0)), &words);

        assert_eq!(result.extracted_text, "Grand Total:");
        assert!(result.is_text_match);
        assert_eq!(result.found, Some(Rect::new(335.0, 400.0, 30.0, 10.0)));
    }

    #[test]
    fn test_phrase_search_reverse_containment() {
        let words = vec![
            ExtractedWord::new("Total", 300.0, 400.0, 30.0, 10.0),
            ExtractedWord::new("Due", 335.0, 400.0, 20.0, 10.0),
        ];
        let result = matcher().match_anchor(&anchor("Invoice Total Due", Rect::new(100.0, 100.0, 40.0, 12.0)), &words);

        assert_eq!(result.method, MatchMethod::PhraseSearch);
        assert_eq!(result.extracted_text, "Total Due");
        assert_eq!(result.similarity, 0.8);
        assert!(result.is_text_match);
        assert_eq!(result.found, Some(Rect::new(300.0, 400.0, 55.0, 10.0)));
    }

    #[test]
    fn test_phrase_search_fuzzy() {
        let words = vec![ExtractedWord::new("Tota1", 300.0, 400.0, 30.0, 10.0)];
        let result = matcher().match_anchor(&anchor("Total", Rect::new(100.0, 100.0, 40.0, 12.0)), &words);

        assert_eq!(result.method, MatchMethod::PhraseSearch);
        assert_eq!(result.similarity, 0.8);
        assert_eq!(result.quality, MatchQuality::Fair);
        assert_eq!(result.found, Some(Rect::new(300.0, 400.0, 30.0, 10.0)));

        // below the acceptance threshold nothing is found
        let words = vec![ExtractedWord::new("Tot99", 300.0, 400.0, 30.0, 10.0)];
        let result = matcher().match_anchor(&anchor("Total", Rect::new(100.0, 100.0, 40.0, 12.0)), &words);
        assert_eq!(result.method, MatchMethod::NotFound);
    }

    #[test]
    fn test_phrase_tiers_beat_distance() {
        let rect = Rect::new(100.0, 100.0, 40.0, 12.0);

        // exact far away beats fuzzy and reverse containment nearby
        let words = vec![
            ExtractedWord::new("Tota1:", 150.0, 100.0, 30.0, 10.0),
            ExtractedWord::new("Total", 100.0, 200.0, 30.0, 10.0),
            ExtractedWord::new("Total:", 500.0, 700.0, 30.0, 10.0),
        ];
        let result = matcher().match_anchor(&anchor("Total:", rect), &words);
        assert_eq!(result.similarity, 1.0);
        assert_eq!(result.found, Some(Rect::new(500.0, 700.0, 30.0, 10.0)));

        // containment beats reverse containment
        let words = vec![
            ExtractedWord::new("Total", 150.0, 100.0, 30.0, 10.0),
            ExtractedWord::new("Grand", 400.0, 500.0, 30.0, 10.0),
            ExtractedWord::new("Total:", 435.0, 500.0, 30.0, 10.0),
        ];
        let result = matcher().match_anchor(&anchor("Total:", rect), &words);
        assert_eq!(result.extracted_text, "Grand Total:");
        assert_eq!(result.found, Some(Rect::new(435.0, 500.0, 30.0, 10.0)));

        // reverse containment beats fuzzy
        let words = vec![
            ExtractedWord::new("Tota1:", 150.0, 100.0, 30.0, 10.0),
            ExtractedWord::new("Total", 400.0, 500.0, 30.0, 10.0),
        ];
        let result = matcher().match_anchor(&anchor("Total:", rect), &words);
        assert_eq!(result.extracted_text, "Total");
        assert_eq!(result.found, Some(Rect::new(400.0, 500.0, 30.0, 10.0)));
    }

    #[test]
    fn test_phrase_search_with_line_jitter() {
        let words = vec![
            ExtractedWord::new("Invoice", 50.0, 102.0, 40.0, 10.0),
            ExtractedWord::new("Total", 95.0, 103.0, 30.0, 10.0),
            ExtractedWord::new("Due", 130.0, 102.0, 20.0, 10.0),
        ];
        let result = matcher().match_anchor(&anchor("Invoice Total Due", Rect::new(60.0, 300.0, 100.0, 12.0)), &words);

        assert_eq!(result.extracted_text, "Invoice Total Due");
        assert_eq!(result.similarity, 1.0);
        assert_eq!(result.found, Some(Rect::new(50.0, 102.0, 100.0, 11.0)));
    }

    #[test]
    fn test_not_found() {
        let words = vec![ExtractedWord::new("Unrelated", 300.0, 400.0, 60.0, 10.0)];
        let result = matcher().match_anchor(&anchor("Total:", Rect::new(100.0, 100.0, 40.0, 12.0)), &words);

        assert_eq!(result.method, MatchMethod::NotFound);
        assert!(!result.is_text_match);
        assert!(result.found.is_none());
        assert_eq!(result.quality, MatchQuality::Poor);
    }

    #[test]
    fn test_quality_tiers() {
        assert_eq!(MatchQuality::from_similarity(0.95), MatchQuality::Excellent);
        assert_eq!(MatchQuality::from_similarity(0.9), MatchQuality::Good);
        assert_eq!(MatchQuality::from_similarity(0.7), MatchQuality::Fair);
        assert_eq!(MatchQuality::from_similarity(0.69), MatchQuality::Poor);
    }
}
