//! Text similarity scoring for anchor matching.

use std::collections::HashSet;

/// Minimum score for a containment match.
const CONTAINMENT_FLOOR: f64 = 0.8;

/// Word overlap must beat this to be used.
const WORD_OVERLAP_MIN: f64 = 0.6;

/// Score how closely `found` matches `expected` (0.0 - 1.0).
///
/// Checks, in order: exact match ignoring case and surrounding whitespace,
/// substring containment in either direction, word-set overlap for
/// multi-word text, and finally position-wise character agreement.
pub fn text_similarity(expected: &str, found: &str) -> f64 {
    let a = expected.trim().to_lowercase();
    let b = found.trim().to_lowercase();

    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    if a == b {
        return 1.0;
    }

    let len_a = a.chars().count();
    let len_b = b.chars().count();

    if a.contains(&b) || b.contains(&a) {
        let ratio = len_a.min(len_b) as f64 / len_a.max(len_b) as f64;
        return ratio.max(CONTAINMENT_FLOOR);
    }

    let words_a: HashSet<&str> = a.split_whitespace().collect();
    let words_b: HashSet<&str> = b.split_whitespace().collect();
    if words_a.len() > 1 || words_b.len() > 1 {
        let common = words_a.intersection(&words_b).count();
        let overlap = common as f64 / words_a.len().max(words_b.len()) as f64;
        if overlap > WORD_OVERLAP_MIN {
            return overlap;
        }
    }

    let matching = a.chars().zip(b.chars()).filter(|(x, y)| x == y).count();
    matching as f64 / len_a.max(len_b) as f64
}
