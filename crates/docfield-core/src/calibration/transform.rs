//! Coordinate transformation and the statistics used to estimate it.

use serde::{Deserialize, Serialize};

use crate::layout::Rect;

/// Mapping from template coordinates to document coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoordinateTransformation {
    pub offset_x: f64,
    pub offset_y: f64,
    pub scale_x: f64,
    pub scale_y: f64,
    /// Spread of the per-anchor offsets, normalized to 0.0 - 1.0.
    pub distortion: f64,
    /// Trust in this transformation (0.0 - 1.0).
    pub confidence: f64,
}

impl CoordinateTransformation {
    /// No correction, fully trusted.
    pub fn identity() -> Self {
        Self::identity_with_confidence(1.0)
    }

    pub fn identity_with_confidence(confidence: f64) -> Self {
        Self {
            offset_x: 0.0,
            offset_y: 0.0,
            scale_x: 1.0,
            scale_y: 1.0,
            distortion: 0.0,
            confidence,
        }
    }

    /// Check if this transformation leaves coordinates unchanged.
    pub fn is_identity(&self) -> bool {
        self.offset_x == 0.0 && self.offset_y == 0.0 && self.scale_x == 1.0 && self.scale_y == 1.0
    }

    /// Map a template rectangle into document space: scale, then offset.
    pub fn apply(&self, rect: &Rect) -> Rect {
        Rect::new(
            rect.x * self.scale_x + self.offset_x,
            rect.y * self.scale_y + self.offset_y,
            rect.width * self.scale_x,
            rect.height * self.scale_y,
        )
    }
}

impl Default for CoordinateTransformation {
    fn default() -> Self {
        Self::identity()
    }
}

pub(crate) fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation.
pub(crate) fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

pub(crate) fn median(mut values: Vec<f64>) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}

/// Median found/configured distance ratio per axis over all anchor pairs.
///
/// `pairs` holds (configured, found) rectangles. Pairs closer than
/// `min_distance` on an axis are skipped for that axis; an axis with no
/// usable pair keeps a scale of 1.0.
pub(crate) fn estimate_scale(pairs: &[(Rect, Rect)], min_distance: f64) -> (f64, f64) {
    let mut ratios_x = Vec::new();
    let mut ratios_y = Vec::new();

    for (i, (configured_a, found_a)) in pairs.iter().enumerate() {
        for (configured_b, found_b) in &pairs[i + 1..] {
            let configured_dx = (configured_b.x - configured_a.x).abs();
            if configured_dx >= min_distance {
                ratios_x.push((found_b.x - found_a.x).abs() / configured_dx);
            }

            let configured_dy = (configured_b.y - configured_a.y).abs();
            if configured_dy >= min_distance {
                ratios_y.push((found_b.y - found_a.y).abs() / configured_dy);
            }
        }
    }

    (median(ratios_x).unwrap_or(1.0), median(ratios_y).unwrap_or(1.0))
}

/// Offset spread: Euclidean combination of the per-axis standard
/// deviations, divided by 100 and capped at 1.0.
pub(crate) fn distortion(offsets: &[(f64, f64)]) -> f64 {
    let xs: Vec<f64> = offsets.iter().map(|o| o.0).collect();
    let ys: Vec<f64> = offsets.iter().map(|o| o.1).collect();
    let spread = (std_dev(&xs).powi(2) + std_dev(&ys).powi(2)).sqrt();
    (spread / 100.0).min(1.0)
}

/// Flag offsets whose z-score exceeds `threshold` on either axis.
///
/// Needs at least three offsets; fewer are never flagged.
pub(crate) fn detect_outliers(offsets: &[(f64, f64)], threshold: f64) -> Vec<bool> {
    if offsets.len() < 3 {
        return vec![false; offsets.len()];
    }

    let xs: Vec<f64> = offsets.iter().map(|o| o.0).collect();
    let ys: Vec<f64> = offsets.iter().map(|o| o.1).collect();
    let (mean_x, sd_x) = (mean(&xs), std_dev(&xs));
    let (mean_y, sd_y) = (mean(&ys), std_dev(&ys));

    let z = |value: f64, m: f64, sd: f64| if sd > 0.0 { ((value - m) / sd).abs() } else { 0.0 };

    offsets
        .iter()
        .map(|(x, y)| z(*x, mean_x, sd_x) > threshold || z(*y, mean_y, sd_y) > threshold)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_scales_then_offsets() {
        let t = CoordinateTransformation {
            offset_x: 5.0,
            offset_y: -3.0,
            scale_x: 2.0,
            scale_y: 0.5,
            ..CoordinateTransformation::identity()
        };
        let rect = t.apply(&Rect::new(100.0, 200.0, 10.0, 20.0));
        assert_eq!(rect, Rect::new(205.0, 97.0, 20.0, 10.0));

        let identity = CoordinateTransformation::identity();
        assert!(identity.is_identity());
        assert_eq!(identity.apply(&Rect::new(1.0, 2.0, 3.0, 4.0)), Rect::new(1.0, 2.0, 3.0, 4.0));
    }

    #[test]
    fn test_median() {
        assert_eq!(median(vec![3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(vec![4.0, 1.0, 2.0, 3.0]), Some(2.5));
        assert_eq!(median(Vec::new()), None);
    }

    #[test]
    fn test_estimate_scale_skips_close_pairs() {
        let pairs = vec![
            (Rect::new(100.0, 100.0, 10.0, 10.0), Rect::new(110.0, 100.0, 10.0, 10.0)),
            (Rect::new(300.0, 105.0, 10.0, 10.0), Rect::new(530.0, 105.0, 10.0, 10.0)),
        ];
        // x distance 200 -> 420; y distance 5 is below the minimum
        let (sx, sy) = estimate_scale(&pairs, 10.0);
        assert!((sx - 2.1).abs() < 1e-12);
        assert_eq!(sy, 1.0);
    }

    #[test]
    fn test_outliers_and_distortion() {
        let offsets = vec![(1.0, 1.0), (1.0, 1.0), (1.0, 1.0), (1.0, 1.0), (1.0, 1.0), (40.0, 1.0)];
        let flags = detect_outliers(&offsets, 2.0);
        assert_eq!(flags, vec![false, false, false, false, false, true]);

        assert_eq!(distortion(&[(2.0, 2.0), (2.0, 2.0)]), 0.0);
        assert_eq!(distortion(&[(0.0, 0.0), (1000.0, 0.0)]), 1.0);

        // fewer than three offsets are never flagged
        assert_eq!(detect_outliers(&[(0.0, 0.0), (100.0, 0.0)], 2.0), vec![false, false]);
    }
}
