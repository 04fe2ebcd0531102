//! Result records on disk: `<output>/<template_id>/<file_stem>.json`.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use docfield_core::{CalculationResult, ExtractionResult};

use crate::discovery::Period;

/// Everything recorded about one processed document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub document: PathBuf,
    pub template_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period: Option<Period>,

    pub processed_at: DateTime<Utc>,

    /// Missing when the document could not be opened.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extraction: Option<ExtractionResult>,

    #[serde(default)]
    pub queries: Vec<CalculationResult>,

    /// Why the document failed, if it did.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DocumentRecord {
    pub fn failed(document: &Path, template_id: &str, period: Option<Period>, error: impl Into<String>) -> Self {
        Self {
            document: document.to_path_buf(),
            template_id: template_id.to_string(),
            period,
            processed_at: Utc::now(),
            extraction: None,
            queries: Vec::new(),
            error: Some(error.into()),
        }
    }

    /// Document opened and extraction succeeded.
    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.extraction.as_ref().is_some_and(|e| e.success)
    }

    pub fn file_name(&self) -> &str {
        self.document
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("")
    }
}

/// Folder of result records.
#[derive(Debug, Clone)]
pub struct ResultStore {
    root: PathBuf,
}

impl ResultStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where the record of `document` lives.
    pub fn record_path(&self, template_id: &str, document: &Path) -> PathBuf {
        let stem = document
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("document");
        self.root.join(template_id).join(format!("{}.json", stem))
    }

    /// Check if a record exists that is at least as new as the document.
    pub fn is_current(&self, template_id: &str, document: &Path) -> bool {
        let modified = |path: &Path| fs::metadata(path).and_then(|m| m.modified()).ok();

        match (modified(&self.record_path(template_id, document)), modified(document)) {
            (Some(record), Some(doc)) => record >= doc,
            _ => false,
        }
    }

    pub fn save(&self, record: &DocumentRecord) -> anyhow::Result<PathBuf> {
        let path = self.record_path(&record.template_id, &record.document);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(&path, serde_json::to_string_pretty(record)?)?;
        debug!("Wrote record {}", path.display());
        Ok(path)
    }

    pub fn load(&self, path: &Path) -> anyhow::Result<DocumentRecord> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_record_path() {
        let store = ResultStore::new("/results");
        assert_eq!(
            store.record_path("monthly", Path::new("/intake/MS_2024-03.pdf")),
            PathBuf::from("/results/monthly/MS_2024-03.json")
        );
    }

    #[test]
    fn test_save_and_freshness() {
        let dir = tempfile::tempdir().unwrap();
        let document = dir.path().join("MS_2024-03.pdf");
        fs::write(&document, b"%PDF").unwrap();

        let store = ResultStore::new(dir.path().join("results"));
        assert!(!store.is_current("monthly", &document));

        let record = DocumentRecord::failed(&document, "monthly", Period::new(2024, 3), "cannot open");
        let path = store.save(&record).unwrap();

        assert!(store.is_current("monthly", &document));
        assert!(!store.is_current("other", &document));

        let loaded = store.load(&path).unwrap();
        assert_eq!(loaded, record);
        assert!(!loaded.is_success());
        assert_eq!(loaded.file_name(), "MS_2024-03.pdf");
    }
}
