//! Error types for the docfield-core library.

use thiserror::Error;

/// Main error type for the docfield library.
#[derive(Error, Debug)]
pub enum DocfieldError {
    /// PDF processing error.
    #[error("PDF error: {0}")]
    Pdf(#[from] PdfError),

    /// Formula parsing or evaluation error.
    #[error("formula error: {0}")]
    Formula(#[from] FormulaError),

    /// Template or query catalog error.
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Errors related to PDF processing.
#[derive(Error, Debug)]
pub enum PdfError {
    /// Failed to open/parse the PDF file.
    #[error("failed to parse PDF: {0}")]
    Parse(String),

    /// Failed to decode the content of a page.
    #[error("failed to decode page {page}: {reason}")]
    PageDecode { page: u32, reason: String },

    /// Failed to extract text from PDF.
    #[error("failed to extract text: {0}")]
    TextExtraction(String),

    /// The PDF is encrypted and cannot be processed.
    #[error("PDF is encrypted")]
    Encrypted,

    /// The PDF is empty or has no pages.
    #[error("PDF has no pages")]
    NoPages,

    /// Invalid page number requested.
    #[error("invalid page number: {0}")]
    InvalidPage(u32),
}

/// Errors raised while parsing or evaluating a formula.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FormulaError {
    /// Unexpected character in the formula text.
    #[error("unexpected character '{ch}' at position {position}")]
    UnexpectedChar { ch: char, position: usize },

    /// Malformed reference placeholder.
    #[error("invalid reference '{0}'")]
    InvalidReference(String),

    /// Unexpected token while parsing.
    #[error("unexpected token '{token}' at position {position}")]
    UnexpectedToken { token: String, position: usize },

    /// Formula ended before the expression was complete.
    #[error("unexpected end of formula")]
    UnexpectedEnd,

    /// Function name not recognized.
    #[error("unknown function '{0}'")]
    UnknownFunction(String),

    /// Wrong number of arguments for a function.
    #[error("{function} expects {expected} argument(s), got {found}")]
    Arity {
        function: String,
        expected: String,
        found: usize,
    },

    /// Argument outside the function's domain.
    #[error("{function}: argument {value} is outside the domain")]
    Domain { function: String, value: f64 },

    /// Division or modulo by zero.
    #[error("division by zero")]
    DivisionByZero,

    /// Result is NaN or infinite.
    #[error("result is not a finite number")]
    NonFinite,

    /// The formula text is empty.
    #[error("formula is empty")]
    Empty,
}

/// Errors related to the template/query catalog.
#[derive(Error, Debug)]
pub enum CatalogError {
    /// Template id not present in the catalog.
    #[error("unknown template: {0}")]
    UnknownTemplate(String),

    /// Query id not present in the catalog.
    #[error("unknown query: {0}")]
    UnknownQuery(String),

    /// Template failed validation.
    #[error("template {template} is invalid: {}", issues.join("; "))]
    InvalidTemplate { template: String, issues: Vec<String> },
}

/// Result type for the docfield library.
pub type Result<T> = std::result::Result<T, DocfieldError>;
