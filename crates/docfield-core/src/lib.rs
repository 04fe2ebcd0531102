//! Core library for template-based document field extraction.
//!
//! This crate provides:
//! - PDF word extraction with top-left page coordinates
//! - Anchor calibration that corrects page-to-template drift
//! - Field extraction and value normalization
//! - A formula language for computing query outputs from extracted fields

pub mod calibration;
pub mod error;
pub mod extraction;
pub mod formula;
pub mod layout;
pub mod models;
pub mod pdf;

pub use calibration::{AnchorCalibrator, AnchorMatch, CalibrationReport, CoordinateTransformation, MatchQuality};
pub use error::{CatalogError, DocfieldError, FormulaError, PdfError, Result};
pub use extraction::{DocumentExtractor, ExtractionResult, FieldValue};
pub use formula::{CalculationResult, InputContext, QueryCalculator};
pub use layout::{DetectedPhrase, ExtractedWord, PhraseBuilder, Rect};
pub use models::{Catalog, DocfieldConfig, Query, Template};
pub use pdf::{DocumentKind, PageSource, PageWords, PdfWordExtractor};
