//! WASM bindings for template-based document field extraction.
//!
//! Templates, queries and page words cross the boundary as JSON strings;
//! results come back as plain JS objects.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use wasm_bindgen::prelude::*;

use docfield_core::extraction::normalize;
use docfield_core::formula::CalculatedContext;
use docfield_core::models::query::QueryConstant;
use docfield_core::models::template::FieldDataType;
use docfield_core::{
    AnchorCalibrator, DocfieldConfig, DocumentExtractor, ExtractedWord, InputContext, PageWords, Query,
    QueryCalculator, Template,
};

/// Initialize panic hook for better error messages in console.
#[wasm_bindgen(start)]
pub fn init() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

/// Version information.
#[wasm_bindgen]
pub fn version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn js_error(e: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&e.to_string())
}

/// Maps become plain objects rather than JS `Map`s.
fn to_js<T: Serialize>(value: &T) -> Result<JsValue, JsValue> {
    value
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .map_err(js_error)
}

fn parse_template(json: &str) -> Result<Template, JsValue> {
    serde_json::from_str(json).map_err(|e| js_error(format!("invalid template: {}", e)))
}

/// Words keyed by page number, e.g. `{"1": [{"text": "Total", "x": 10, ...}]}`.
fn parse_pages(json: &str) -> Result<PageWords, JsValue> {
    let pages: BTreeMap<u32, Vec<ExtractedWord>> =
        serde_json::from_str(json).map_err(|e| js_error(format!("invalid page words: {}", e)))?;

    Ok(pages
        .into_iter()
        .fold(PageWords::new(), |acc, (page, words)| acc.with_page(page, words)))
}

fn parse_numbers(json: &str) -> Result<HashMap<String, f64>, JsValue> {
    if json.trim().is_empty() {
        return Ok(HashMap::new());
    }
    serde_json::from_str(json).map_err(|e| js_error(format!("invalid input values: {}", e)))
}

/// Similarity of two strings in [0, 1], as used to score anchors.
#[wasm_bindgen]
pub fn text_similarity(expected: &str, found: &str) -> f64 {
    docfield_core::calibration::text_similarity(expected, found)
}

/// Parse a percentage as a fraction, otherwise the first number in a text.
#[wasm_bindgen]
pub fn parse_number(text: &str) -> Option<f64> {
    normalize::parse_value(text)
}

/// Normalize a raw field text for a data type name (`number`, `date`, ...).
#[wasm_bindgen]
pub fn normalize_value(text: &str, data_type: &str) -> Result<JsValue, JsValue> {
    let data_type: FieldDataType = serde_json::from_value(serde_json::Value::String(data_type.to_string()))
        .map_err(|_| js_error(format!("unknown data type: {}", data_type)))?;

    match normalize::normalize(text, data_type) {
        Some(value) => to_js(&value),
        None => Ok(JsValue::NULL),
    }
}

/// Calibrate page words against a template's anchors.
#[wasm_bindgen]
pub fn calibrate(template_json: &str, words_json: &str) -> Result<JsValue, JsValue> {
    let template = parse_template(template_json)?;
    let pages = parse_pages(words_json)?;

    to_js(&AnchorCalibrator::new().calibrate(&template, &pages))
}

/// Evaluate one formula over input field values (`{"Revenue": 1500}`).
#[wasm_bindgen]
pub fn evaluate_formula(formula: &str, inputs_json: &str) -> Result<JsValue, JsValue> {
    let inputs = InputContext {
        fields: parse_numbers(inputs_json)?.into_iter().collect(),
        ..InputContext::default()
    };

    let outcome = QueryCalculator::new().evaluate_formula(formula, &inputs, &CalculatedContext::new());

    #[derive(Serialize)]
    struct FormulaResult {
        value: Option<f64>,
        formula: String,
        unresolved: Vec<String>,
        error: Option<String>,
    }

    let output = FormulaResult {
        value: outcome.value.as_ref().ok().copied(),
        error: outcome.value.as_ref().err().map(ToString::to_string),
        unresolved: outcome.unresolved.iter().map(ToString::to_string).collect(),
        formula: outcome.substituted,
    };

    to_js(&output)
}

/// Run every output of a query over input field values.
///
/// `globals_json` is an optional array of global constants.
#[wasm_bindgen]
pub fn run_query(query_json: &str, inputs_json: &str, globals_json: Option<String>) -> Result<JsValue, JsValue> {
    let query: Query = serde_json::from_str(query_json).map_err(|e| js_error(format!("invalid query: {}", e)))?;
    let fields = parse_numbers(inputs_json)?;
    let globals: Vec<QueryConstant> = match globals_json.as_deref() {
        Some(json) if !json.trim().is_empty() => {
            serde_json::from_str(json).map_err(|e| js_error(format!("invalid constants: {}", e)))?
        }
        _ => Vec::new(),
    };

    let global_refs: Vec<&QueryConstant> = globals.iter().collect();
    let inputs = InputContext::for_query(&query, &fields, &global_refs);

    to_js(&QueryCalculator::new().calculate(&query, &inputs))
}

/// Field extractor class for browser use.
#[wasm_bindgen]
pub struct FieldExtractor {
    extractor: DocumentExtractor,
}

#[wasm_bindgen]
impl FieldExtractor {
    /// Create an extractor, optionally from a configuration JSON string.
    #[wasm_bindgen(constructor)]
    pub fn new(config_json: Option<String>) -> Result<FieldExtractor, JsValue> {
        let config = match config_json.as_deref() {
            Some(json) if !json.trim().is_empty() => {
                serde_json::from_str(json).map_err(|e| js_error(format!("invalid config: {}", e)))?
            }
            _ => DocfieldConfig::default(),
        };

        Ok(Self {
            extractor: DocumentExtractor::from_config(&config),
        })
    }

    /// Extract fields from words the caller already positioned.
    #[wasm_bindgen]
    pub fn extract_words(&self, template_json: &str, words_json: &str) -> Result<JsValue, JsValue> {
        let template = parse_template(template_json)?;
        let pages = parse_pages(words_json)?;

        to_js(&self.extractor.extract_words(&template, &pages))
    }

    /// Extract fields from the bytes of a PDF.
    #[wasm_bindgen]
    pub fn extract_pdf(&self, data: &[u8], template_json: &str) -> Result<JsValue, JsValue> {
        let template = parse_template(template_json)?;
        let result = self.extractor.extract_bytes(&template, data).map_err(js_error)?;

        to_js(&result)
    }
}
