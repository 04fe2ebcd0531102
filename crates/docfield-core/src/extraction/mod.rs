//! Template-driven field extraction.
//!
//! A document is decoded into positioned words once, calibrated against the
//! template anchors, and every field rectangle is mapped through the
//! resulting transformation before its words are collected and normalized.

pub mod normalize;
pub mod region;

pub use normalize::FieldValue;
pub use region::{collect_region, RegionText};

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::calibration::{AnchorCalibrator, CalibrationReport, CoordinateTransformation};
use crate::error::Result;
use crate::layout::Rect;
use crate::models::config::{CalibrationConfig, DocfieldConfig, ExtractionConfig};
use crate::models::template::{FieldDataType, FieldMapping, Template};
use crate::pdf::{DocumentKind, PageSource, PageWords, PdfWordExtractor};

/// Diagnostics for one extracted field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDetail {
    pub name: String,
    pub page: u32,
    pub data_type: FieldDataType,
    /// Rectangle configured in the template.
    pub configured: Rect,
    /// Rectangle after calibration.
    pub effective: Rect,
    /// Reassembled text of the contributing words.
    pub raw_text: String,
    pub word_count: usize,
    pub found: bool,
}

/// Result of extracting a document against a template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub template_id: String,

    /// Document opened and at least one field produced a value
    /// (or the template has no fields).
    pub success: bool,

    /// Content classification, when the input was a PDF.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_kind: Option<DocumentKind>,

    /// Field name to value; absent fields map to `null`.
    pub fields: BTreeMap<String, Option<FieldValue>>,

    /// Per-field diagnostics, in display order.
    pub field_details: Vec<FieldDetail>,

    /// Anchor diagnostics and the applied transformation.
    pub calibration: CalibrationReport,

    #[serde(default)]
    pub warnings: Vec<String>,

    pub processing_time_ms: u64,
}

impl ExtractionResult {
    /// Calibration confidence (0.0 - 1.0).
    pub fn confidence(&self) -> f64 {
        self.calibration.confidence()
    }

    /// Value of a field, if it was found.
    pub fn value(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name).and_then(Option::as_ref)
    }

    /// Numeric value of a field, if it was found and is a number.
    pub fn number(&self, name: &str) -> Option<f64> {
        self.value(name).and_then(FieldValue::as_number)
    }

    /// All numeric field values, keyed by field name.
    pub fn numeric_fields(&self) -> HashMap<String, f64> {
        self.fields
            .iter()
            .filter_map(|(name, value)| {
                value
                    .as_ref()
                    .and_then(FieldValue::as_number)
                    .map(|n| (name.clone(), n))
            })
            .collect()
    }

    /// Number of fields that produced a value.
    pub fn found_count(&self) -> usize {
        self.fields.values().filter(|v| v.is_some()).count()
    }
}

/// Extracts template fields from documents.
#[derive(Debug, Clone, Default)]
pub struct DocumentExtractor {
    extraction: ExtractionConfig,
    calibration: CalibrationConfig,
}

impl DocumentExtractor {
    /// Create an extractor with default thresholds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an extractor from the extraction and calibration sections of a configuration.
    pub fn from_config(config: &DocfieldConfig) -> Self {
        Self {
            extraction: config.extraction.clone(),
            calibration: config.calibration.clone(),
        }
    }

    pub fn with_extraction_config(mut self, config: ExtractionConfig) -> Self {
        self.extraction = config;
        self
    }

    pub fn with_calibration_config(mut self, config: CalibrationConfig) -> Self {
        self.calibration = config;
        self
    }

    /// Extract fields from a PDF file.
    ///
    /// Fails only when the document cannot be opened at all.
    pub fn extract_file(&self, template: &Template, path: &Path) -> Result<ExtractionResult> {
        info!("Extracting {} with template {}", path.display(), template.id);
        let pdf = PdfWordExtractor::open(path)?;
        Ok(self.extract_pdf(template, &pdf))
    }

    /// Extract fields from PDF bytes.
    pub fn extract_bytes(&self, template: &Template, data: &[u8]) -> Result<ExtractionResult> {
        let mut pdf = PdfWordExtractor::new();
        pdf.load(data)?;
        Ok(self.extract_pdf(template, &pdf))
    }

    fn extract_pdf(&self, template: &Template, pdf: &PdfWordExtractor) -> ExtractionResult {
        let kind = pdf.analyze();
        let mut result = self.extract_pages(template, pdf);

        if kind != DocumentKind::Text {
            warn!("Document has no text layer ({:?}); OCR is not supported", kind);
            result
                .warnings
                .push(format!("Document has no text layer ({:?})", kind));
        }
        result.document_kind = Some(kind);
        result
    }

    /// Extract fields from any page source.
    pub fn extract_pages<S: PageSource + ?Sized>(&self, template: &Template, source: &S) -> ExtractionResult {
        let start = Instant::now();
        let (pages, warnings) = PageWords::collect(source);
        let mut result = self.extract_words(template, &pages);

        let mut all_warnings = warnings;
        all_warnings.append(&mut result.warnings);
        result.warnings = all_warnings;
        result.processing_time_ms = start.elapsed().as_millis() as u64;
        result
    }

    /// Extract fields from pre-decoded page words.
    pub fn extract_words(&self, template: &Template, pages: &PageWords) -> ExtractionResult {
        let start = Instant::now();

        let calibration = AnchorCalibrator::new()
            .with_config(self.calibration.clone())
            .with_extraction_config(self.extraction.clone())
            .calibrate(template, pages);
        let transformation = calibration.transformation;

        let mut warnings = calibration.warnings.clone();
        let mut fields = BTreeMap::new();
        let mut field_details = Vec::new();

        for field in template.ordered_fields() {
            let (value, detail) = self.extract_field(field, pages, &transformation, &mut warnings);
            fields.insert(field.name.clone(), value);
            field_details.push(detail);
        }

        let found = fields.values().filter(|v| v.is_some()).count();
        let success = template.fields.is_empty() || found > 0;

        info!(
            "Template {}: {}/{} fields, confidence {:.2}",
            template.id,
            found,
            fields.len(),
            transformation.confidence
        );

        ExtractionResult {
            template_id: template.id.clone(),
            success,
            document_kind: None,
            fields,
            field_details,
            calibration,
            warnings,
            processing_time_ms: start.elapsed().as_millis() as u64,
        }
    }

    fn extract_field(
        &self,
        field: &FieldMapping,
        pages: &PageWords,
        transformation: &CoordinateTransformation,
        warnings: &mut Vec<String>,
    ) -> (Option<FieldValue>, FieldDetail) {
        let effective = transformation.apply(&field.rect);
        let mut detail = FieldDetail {
            name: field.name.clone(),
            page: field.page,
            data_type: field.data_type,
            configured: field.rect,
            effective,
            raw_text: String::new(),
            word_count: 0,
            found: false,
        };

        let Some(words) = pages.words(field.page) else {
            warn!("Field {}: page {} not available", field.name, field.page);
            warnings.push(format!("Field {}: page {} not available", field.name, field.page));
            return (None, detail);
        };

        let region = collect_region(words, &effective, &self.extraction);
        detail.raw_text = region.text.clone();
        detail.word_count = region.word_count;

        if region.is_empty() {
            debug!("Field {}: no words in {:?}", field.name, effective);
            warnings.push(format!("Field {}: no text found", field.name));
            return (None, detail);
        }

        let value = normalize::normalize(&region.text, field.data_type);
        match &value {
            Some(v) => debug!("Field {}: {:?} -> {:?}", field.name, region.text, v),
            None => {
                warn!("Field {}: no {:?} value in {:?}", field.name, field.data_type, region.text);
                warnings.push(format!("Field {}: could not parse {:?}", field.name, region.text));
            }
        }
        detail.found = value.is_some();

        (value, detail)
    }
}
