//! Configuration structures for the extraction pipeline.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration for the docfield pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DocfieldConfig {
    /// Field extraction configuration.
    pub extraction: ExtractionConfig,

    /// Anchor calibration configuration.
    pub calibration: CalibrationConfig,

    /// Batch pipeline configuration.
    pub pipeline: PipelineConfig,
}

/// Field extraction configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Minimum fraction of a word's area that must lie inside a field
    /// rectangle for the word to contribute (0.0 - 1.0).
    pub min_word_coverage: f64,

    /// Height of the y bucket used to group words into reading lines.
    pub line_bucket: f64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            min_word_coverage: 0.3,
            line_bucket: 5.0,
        }
    }
}

/// Anchor calibration configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Similarity at or above which an anchor counts as a text match.
    pub similarity_threshold: f64,

    /// Calibrations scoring below this are replaced by the identity transformation.
    pub confidence_floor: f64,

    /// Confidence reported when a calibration is discarded.
    pub low_confidence_value: f64,

    /// Upper bound on confidence when only one anchor matched.
    pub single_anchor_confidence_cap: f64,

    /// Anchor pairs closer than this (per axis) are skipped for scale estimation.
    pub min_pair_distance: f64,

    /// Absolute z-score above which an anchor offset is flagged as an outlier.
    pub outlier_z_threshold: f64,

    /// Drop flagged outliers from the offset and scale estimates.
    ///
    /// Off by default: outliers are reported but still averaged in.
    pub exclude_outliers: bool,

    /// Phrase builder thresholds for the anchor search fallback.
    pub phrases: PhraseConfig,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.7,
            confidence_floor: 0.5,
            low_confidence_value: 0.1,
            single_anchor_confidence_cap: 0.7,
            min_pair_distance: 10.0,
            outlier_z_threshold: 2.0,
            exclude_outliers: false,
            phrases: PhraseConfig::default(),
        }
    }
}

/// Spacing thresholds for grouping words into phrases.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PhraseConfig {
    /// Words whose top edges differ by less than this are on the same line.
    pub same_line_tolerance: f64,

    /// Smallest horizontal gap (negative allows slight overlap) that still joins words.
    pub min_word_gap: f64,

    /// Largest horizontal gap that still joins words.
    pub max_word_gap: f64,

    /// Horizontal gap that always starts a new phrase.
    pub break_gap: f64,

    /// Vertical shift that always starts a new phrase.
    pub break_shift: f64,
}

impl Default for PhraseConfig {
    fn default() -> Self {
        Self {
            same_line_tolerance: 8.0,
            min_word_gap: -5.0,
            max_word_gap: 50.0,
            break_gap: 100.0,
            break_shift: 20.0,
        }
    }
}

/// Batch pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Folder scanned for incoming documents.
    pub intake_dir: PathBuf,

    /// Folder receiving result records.
    pub output_dir: PathBuf,

    /// Template/query catalog file.
    pub catalog: PathBuf,

    /// Glob pattern (relative to the intake folder) for candidate documents.
    pub file_pattern: String,

    /// Seconds between two batches.
    pub poll_interval_secs: u64,

    /// Minutes after which an intake lock file is considered abandoned.
    pub lock_stale_minutes: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            intake_dir: PathBuf::from("intake"),
            output_dir: PathBuf::from("results"),
            catalog: PathBuf::from("catalog.json"),
            file_pattern: "*.pdf".to_string(),
            poll_interval_secs: 300,
            lock_stale_minutes: 30,
        }
    }
}

impl DocfieldConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &std::path::Path) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &std::path::Path) -> Result<(), std::io::Error> {
        let content = serde_json::to_string_pretty(self).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })?;
        std::fs::write(path, content)
    }
}
