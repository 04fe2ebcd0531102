//! Subcommands and the per-document work they share.

pub mod calc;
pub mod config;
pub mod extract;
pub mod run;

use std::path::Path;

use chrono::Utc;
use tracing::{debug, warn};

use docfield_core::{Catalog, DocfieldConfig, DocumentExtractor, InputContext, Query, QueryCalculator, Template};

use crate::discovery::Period;
use crate::store::DocumentRecord;

/// Load the configuration from an explicit path, the default location, or
/// fall back to defaults.
pub fn load_config(config_path: Option<&str>) -> anyhow::Result<DocfieldConfig> {
    if let Some(path) = config_path {
        return Ok(DocfieldConfig::from_file(Path::new(path))?);
    }

    let default_path = config::default_config_path();
    if default_path.exists() {
        Ok(DocfieldConfig::from_file(&default_path)?)
    } else {
        Ok(DocfieldConfig::default())
    }
}

/// Load and validate the template catalog.
pub fn load_catalog(path: &Path) -> anyhow::Result<Catalog> {
    let catalog = Catalog::from_file(path)
        .map_err(|e| anyhow::anyhow!("Failed to load catalog {}: {}", path.display(), e))?;
    catalog.validate()?;
    debug!(
        "Catalog {}: {} templates, {} queries",
        path.display(),
        catalog.templates.len(),
        catalog.queries.len()
    );
    Ok(catalog)
}

/// Extract one document and run the given queries over its fields.
///
/// Never fails: a document that cannot be opened yields a failed record.
pub fn process_document(
    config: &DocfieldConfig,
    catalog: &Catalog,
    template: &Template,
    queries: &[&Query],
    path: &Path,
    period: Option<Period>,
) -> DocumentRecord {
    let extractor = DocumentExtractor::from_config(config);

    let extraction = match extractor.extract_file(template, path) {
        Ok(extraction) => extraction,
        Err(e) => {
            warn!("Failed to process {}: {}", path.display(), e);
            return DocumentRecord::failed(path, &template.id, period, e.to_string());
        }
    };

    let fields = extraction.numeric_fields();
    let globals = catalog.global_constants();
    let calculator = QueryCalculator::new();
    let results = queries
        .iter()
        .map(|query| calculator.calculate(query, &InputContext::for_query(query, &fields, &globals)))
        .collect();

    DocumentRecord {
        document: path.to_path_buf(),
        template_id: template.id.clone(),
        period,
        processed_at: Utc::now(),
        extraction: Some(extraction),
        queries: results,
        error: None,
    }
}
