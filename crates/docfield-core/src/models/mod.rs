//! Data models: configuration, templates, queries and the catalog.

pub mod catalog;
pub mod config;
pub mod query;
pub mod template;

pub use catalog::Catalog;
pub use config::{CalibrationConfig, DocfieldConfig, ExtractionConfig, PhraseConfig, PipelineConfig};
pub use query::{ConstantScope, OutputDataType, Query, QueryConstant, QueryOutput};
pub use template::{Anchor, FieldDataType, FieldMapping, PageSize, Template};
