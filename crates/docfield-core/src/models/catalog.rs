//! Read-only catalog of templates, queries and global constants.

use serde::{Deserialize, Serialize};
use std::path::Path;

use super::query::{ConstantScope, Query, QueryConstant};
use super::template::Template;
use crate::error::{CatalogError, Result};

/// Everything the pipeline needs to know about document layouts and outputs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub templates: Vec<Template>,

    #[serde(default)]
    pub queries: Vec<Query>,

    /// Constants visible to every query.
    #[serde(default)]
    pub global_constants: Vec<QueryConstant>,
}

impl Catalog {
    /// Load a catalog from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let catalog = serde_json::from_str(&content)?;
        Ok(catalog)
    }

    /// Find a template by id.
    pub fn template(&self, id: &str) -> std::result::Result<&Template, CatalogError> {
        self.templates
            .iter()
            .find(|t| t.id == id)
            .ok_or_else(|| CatalogError::UnknownTemplate(id.to_string()))
    }

    /// Find a query by id.
    pub fn query(&self, id: &str) -> std::result::Result<&Query, CatalogError> {
        self.queries
            .iter()
            .find(|q| q.id == id)
            .ok_or_else(|| CatalogError::UnknownQuery(id.to_string()))
    }

    /// Queries attached to a template.
    pub fn queries_for(&self, template_id: &str) -> Vec<&Query> {
        self.queries
            .iter()
            .filter(|q| q.template_id.as_deref() == Some(template_id))
            .collect()
    }

    /// All globally scoped constants: the catalog-level list plus any
    /// constant a query declares with global scope.
    pub fn global_constants(&self) -> Vec<&QueryConstant> {
        self.global_constants
            .iter()
            .chain(
                self.queries
                    .iter()
                    .flat_map(|q| q.constants.iter())
                    .filter(|c| c.scope == ConstantScope::Global),
            )
            .collect()
    }

    /// Validate every template; the first invalid template is reported.
    pub fn validate(&self) -> std::result::Result<(), CatalogError> {
        for template in &self.templates {
            let issues = template.validate();
            if !issues.is_empty() {
                return Err(CatalogError::InvalidTemplate {
                    template: template.id.clone(),
                    issues,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG: &str = r#"{
        "templates": [
            {
                "id": "sales",
                "prefix": "SALES_",
                "fields": [
                    { "name": "Revenue", "page": 1, "rect": { "x": 200, "y": 300, "width": 100, "height": 20 } }
                ],
                "anchors": [
                    { "name": "title", "reference_text": "Monthly sales", "page": 1,
                      "rect": { "x": 50, "y": 40, "width": 120, "height": 18 } }
                ]
            }
        ],
        "queries": [
            {
                "id": "bonus",
                "template_id": "sales",
                "outputs": [ { "name": "Bonus", "formula": "[Input:Revenue#1] * [Variable:Rate#2]" } ],
                "constants": [
                    { "name": "Rate", "default_value": 0.05 },
                    { "name": "Cap", "default_value": 1000, "scope": "global" }
                ]
            }
        ],
        "global_constants": [ { "name": "Vat", "default_value": 0.2, "scope": "global" } ]
    }"#;

    #[test]
    fn test_catalog_lookup() {
        let catalog: Catalog = serde_json::from_str(CATALOG).unwrap();

        assert!(catalog.validate().is_ok());
        assert_eq!(catalog.template("sales").unwrap().fields.len(), 1);
        assert!(matches!(
            catalog.template("missing"),
            Err(CatalogError::UnknownTemplate(_))
        ));
        assert_eq!(catalog.queries_for("sales").len(), 1);
        assert!(catalog.queries_for("other").is_empty());

        let globals: Vec<&str> = catalog
            .global_constants()
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(globals, vec!["Vat", "Cap"]);
    }
}
