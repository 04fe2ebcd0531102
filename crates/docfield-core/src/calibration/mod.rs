//! Anchor-based calibration of template coordinates.
//!
//! Each anchor of a template is located on its page and scored against its
//! reference text. Anchors that match are used to estimate a
//! [`CoordinateTransformation`] (offset, scale) together with a confidence
//! score. A calibration that cannot be trusted falls back to the identity
//! transformation.

mod matcher;
mod similarity;
mod transform;

pub use matcher::{AnchorMatch, AnchorMatcher, MatchMethod, MatchQuality};
pub use similarity::text_similarity;
pub use transform::CoordinateTransformation;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::layout::{ExtractedWord, Rect};
use crate::models::config::{CalibrationConfig, ExtractionConfig};
use crate::models::template::Template;
use crate::pdf::PageSource;

const EXTRACTION_WEIGHT: f64 = 0.3;
const MATCH_WEIGHT: f64 = 0.4;
const SIMILARITY_WEIGHT: f64 = 0.3;

/// Outcome of calibrating one document against a template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationReport {
    /// Transformation to apply to field rectangles.
    pub transformation: CoordinateTransformation,

    /// Per-anchor diagnostics, in display order.
    pub anchors: Vec<AnchorMatch>,

    /// Anchors that produced any text / anchor count.
    pub extraction_rate: f64,

    /// Text-matched anchors / anchor count.
    pub match_rate: f64,

    /// Mean similarity over anchors that produced text.
    pub mean_similarity: f64,

    /// Confidence before the fallback rules were applied.
    pub raw_confidence: f64,

    /// Why the estimate was replaced by the identity transformation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,

    #[serde(default)]
    pub warnings: Vec<String>,
}

impl CalibrationReport {
    /// Report for a template without anchors: nothing to correct.
    pub fn uncalibrated() -> Self {
        Self {
            transformation: CoordinateTransformation::identity(),
            anchors: Vec::new(),
            extraction_rate: 0.0,
            match_rate: 0.0,
            mean_similarity: 0.0,
            raw_confidence: 1.0,
            fallback_reason: None,
            warnings: Vec::new(),
        }
    }

    /// Calibration confidence (0.0 - 1.0).
    pub fn confidence(&self) -> f64 {
        self.transformation.confidence
    }

    /// Number of anchors that matched their reference text.
    pub fn matched_count(&self) -> usize {
        self.anchors.iter().filter(|a| a.is_text_match).count()
    }

    /// Anchors flagged as outliers.
    pub fn outliers(&self) -> impl Iterator<Item = &AnchorMatch> {
        self.anchors.iter().filter(|a| a.is_outlier)
    }
}

/// Estimates template-to-document drift from anchors.
#[derive(Debug, Clone)]
pub struct AnchorCalibrator {
    config: CalibrationConfig,
    extraction: ExtractionConfig,
}

impl AnchorCalibrator {
    /// Create a calibrator with default thresholds.
    pub fn new() -> Self {
        Self {
            config: CalibrationConfig::default(),
            extraction: ExtractionConfig::default(),
        }
    }

    /// Use custom calibration thresholds.
    pub fn with_config(mut self, config: CalibrationConfig) -> Self {
        self.config = config;
        self
    }

    /// Use custom word collection settings for the anchor regions.
    pub fn with_extraction_config(mut self, extraction: ExtractionConfig) -> Self {
        self.extraction = extraction;
        self
    }

    /// Calibrate a document against the anchors of a template.
    pub fn calibrate<S: PageSource + ?Sized>(&self, template: &Template, pages: &S) -> CalibrationReport {
        let anchors = template.ordered_anchors();
        if anchors.is_empty() {
            debug!("Template {} has no anchors, using identity", template.id);
            return CalibrationReport::uncalibrated();
        }

        let matcher = AnchorMatcher::new(self.config.clone(), self.extraction.clone());
        let mut page_cache: HashMap<u32, Option<Vec<ExtractedWord>>> = HashMap::new();
        let mut warnings = Vec::new();

        let matches = anchors
            .iter()
            .map(|anchor| {
                let words = page_cache.entry(anchor.page).or_insert_with(|| {
                    match pages.page_words(anchor.page) {
                        Ok(words) => Some(words),
                        Err(e) => {
                            warn!("Anchor page {} unavailable: {}", anchor.page, e);
                            warnings.push(format!("Anchor page {} unavailable: {}", anchor.page, e));
                            None
                        }
                    }
                });

                match words {
                    Some(words) => matcher.match_anchor(anchor, words),
                    None => AnchorMatch::not_found(anchor),
                }
            })
            .collect();

        let report = self.estimate(matches, warnings);
        info!(
            "Calibrated {} anchors for template {}: confidence {:.2}",
            report.anchors.len(),
            template.id,
            report.confidence()
        );
        report
    }

    /// Estimate the transformation from located anchors.
    pub fn estimate(&self, mut anchors: Vec<AnchorMatch>, mut warnings: Vec<String>) -> CalibrationReport {
        if anchors.is_empty() {
            return CalibrationReport::uncalibrated();
        }

        let total = anchors.len() as f64;
        let with_text: Vec<f64> = anchors
            .iter()
            .filter(|a| !a.extracted_text.trim().is_empty())
            .map(|a| a.similarity)
            .collect();
        let matched: Vec<usize> = anchors
            .iter()
            .enumerate()
            .filter(|(_, a)| a.is_text_match && a.found.is_some())
            .map(|(i, _)| i)
            .collect();

        let extraction_rate = with_text.len() as f64 / total;
        let match_rate = matched.len() as f64 / total;
        let mean_similarity = transform::mean(&with_text);
        let mut confidence = extraction_rate * EXTRACTION_WEIGHT
            + match_rate * MATCH_WEIGHT
            + mean_similarity * SIMILARITY_WEIGHT;
        let raw_confidence = confidence;

        let offsets: Vec<(f64, f64)> = matched
            .iter()
            .filter_map(|&i| anchors[i].offset())
            .collect();

        let outliers = transform::detect_outliers(&offsets, self.config.outlier_z_threshold);
        for (&i, &is_outlier) in matched.iter().zip(&outliers) {
            if is_outlier {
                let anchor = &mut anchors[i];
                anchor.is_outlier = true;
                warn!(
                    "Anchor {} offset {:?} is an outlier",
                    anchor.name,
                    anchor.offset()
                );
                warnings.push(format!("Anchor {} is an outlier", anchor.name));
            }
        }

        let mut used: Vec<usize> = matched
            .iter()
            .zip(&outliers)
            .filter(|(_, is_outlier)| !(self.config.exclude_outliers && **is_outlier))
            .map(|(&i, _)| i)
            .collect();
        if used.is_empty() {
            used = matched.clone();
        }

        let used_offsets: Vec<(f64, f64)> = used.iter().filter_map(|&i| anchors[i].offset()).collect();
        let xs: Vec<f64> = used_offsets.iter().map(|o| o.0).collect();
        let ys: Vec<f64> = used_offsets.iter().map(|o| o.1).collect();

        let (scale_x, scale_y) = if used.len() >= 2 {
            let pairs: Vec<(Rect, Rect)> = used
                .iter()
                .filter_map(|&i| anchors[i].found.map(|found| (anchors[i].configured, found)))
                .collect();
            transform::estimate_scale(&pairs, self.config.min_pair_distance)
        } else {
            (1.0, 1.0)
        };

        if matched.len() == 1 {
            confidence = confidence.min(self.config.single_anchor_confidence_cap);
        }

        let mut report = CalibrationReport {
            transformation: CoordinateTransformation {
                offset_x: transform::mean(&xs),
                offset_y: transform::mean(&ys),
                scale_x,
                scale_y,
                distortion: transform::distortion(&offsets),
                confidence,
            },
            anchors,
            extraction_rate,
            match_rate,
            mean_similarity,
            raw_confidence,
            fallback_reason: None,
            warnings,
        };

        let reason = if matched.is_empty() {
            Some("no anchor matched its reference text".to_string())
        } else if confidence < self.config.confidence_floor {
            Some(format!(
                "confidence {:.2} below floor {:.2}",
                confidence, self.config.confidence_floor
            ))
        } else {
            None
        };

        if let Some(reason) = reason {
            warn!("Discarding calibration: {}", reason);
            report.transformation =
                CoordinateTransformation::identity_with_confidence(self.config.low_confidence_value);
            report.warnings.push(format!("Calibration discarded: {}", reason));
            report.fallback_reason = Some(reason);
        }

        report
    }
}

impl Default for AnchorCalibrator {
    fn default() -> Self {
        Self::new()
    }
}
