//! Intake folder scanning: template matching and period detection.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Datelike, Local};
use glob::glob;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use docfield_core::Template;

lazy_static! {
    // YYYY-MM or YYYY_MM
    static ref YEAR_MONTH: Regex = Regex::new(r"(?:^|\D)(\d{4})[-_](\d{2})(?:\D|$)").unwrap();
    // YYYYMM
    static ref YEAR_MONTH_COMPACT: Regex = Regex::new(r"(?:^|\D)(\d{4})(\d{2})(?:\D|$)").unwrap();
    // MM-YYYY
    static ref MONTH_YEAR: Regex = Regex::new(r"(?:^|\D)(\d{2})-(\d{4})(?:\D|$)").unwrap();
}

/// Reporting month of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Period {
    pub year: i32,
    pub month: u32,
}

impl Period {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        if (1900..=2999).contains(&year) && (1..=12).contains(&month) {
            Some(Self { year, month })
        } else {
            None
        }
    }

    /// Month of a timestamp in local time.
    pub fn of(time: DateTime<Local>) -> Self {
        Self {
            year: time.year(),
            month: time.month(),
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// A document waiting in the intake folder.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveredDocument {
    pub path: PathBuf,
    pub template_id: String,
    pub period: Period,
}

/// Scan the intake folder for documents that belong to a template.
///
/// Files that match no template prefix are skipped.
pub fn discover(intake_dir: &Path, pattern: &str, templates: &[Template]) -> anyhow::Result<Vec<DiscoveredDocument>> {
    let full_pattern = intake_dir.join(pattern);
    let full_pattern = full_pattern
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Intake path is not valid UTF-8: {}", intake_dir.display()))?;

    let mut documents = Vec::new();

    for entry in glob(full_pattern)? {
        let path = match entry {
            Ok(path) => path,
            Err(e) => {
                warn!("Unreadable intake entry: {}", e);
                continue;
            }
        };
        if !path.is_file() {
            continue;
        }

        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };

        let Some(template) = match_template(file_name, templates) else {
            debug!("No template matches {}, skipping", file_name);
            continue;
        };

        let period = match period_from_name(file_name) {
            Some(period) => period,
            None => match period_from_mtime(&path) {
                Ok(period) => period,
                Err(e) => {
                    warn!("Cannot determine period of {}: {}", path.display(), e);
                    continue;
                }
            },
        };

        debug!("Discovered {} -> template {} ({})", file_name, template.id, period);
        documents.push(DiscoveredDocument {
            path,
            template_id: template.id.clone(),
            period,
        });
    }

    documents.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(documents)
}

/// Template whose prefix starts the file name; the longest prefix wins.
pub fn match_template<'a>(file_name: &str, templates: &'a [Template]) -> Option<&'a Template> {
    templates
        .iter()
        .filter(|t| t.matches_file_name(file_name))
        .max_by_key(|t| t.prefix.len())
}

/// Period encoded in a file name.
pub fn period_from_name(file_name: &str) -> Option<Period> {
    let stem = Path::new(file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(file_name);

    let year_first = |re: &Regex| {
        re.captures_iter(stem).find_map(|caps| {
            let year = caps[1].parse().ok()?;
            let month = caps[2].parse().ok()?;
            Period::new(year, month)
        })
    };

    year_first(&YEAR_MONTH)
        .or_else(|| year_first(&YEAR_MONTH_COMPACT))
        .or_else(|| {
            MONTH_YEAR.captures_iter(stem).find_map(|caps| {
                let month = caps[1].parse().ok()?;
                let year = caps[2].parse().ok()?;
                Period::new(year, month)
            })
        })
}

fn period_from_mtime(path: &Path) -> std::io::Result<Period> {
    let modified = std::fs::metadata(path)?.modified()?;
    Ok(Period::of(DateTime::<Local>::from(modified)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use docfield_core::models::template::PageSize;
    use pretty_assertions::assert_eq;
    use std::fs;

    fn template(id: &str, prefix: &str) -> Template {
        Template {
            id: id.to_string(),
            name: id.to_string(),
            prefix: prefix.to_string(),
            page_size: PageSize::default(),
            fields: Vec::new(),
            anchors: Vec::new(),
        }
    }

    #[test]
    fn test_period_from_name() {
        assert_eq!(period_from_name("MS_2024-03.pdf"), Period::new(2024, 3));
        assert_eq!(period_from_name("MS_2024_11_final.pdf"), Period::new(2024, 11));
        assert_eq!(period_from_name("report202402.pdf"), Period::new(2024, 2));
        assert_eq!(period_from_name("statement 07-2023.pdf"), Period::new(2023, 7));
        assert_eq!(period_from_name("MS_2024-13.pdf"), None);
        assert_eq!(period_from_name("MS_final.pdf"), None);
        // eight digits are a date, not a compact period
        assert_eq!(period_from_name("MS_20240315.pdf"), None);
    }

    #[test]
    fn test_longest_prefix_wins() {
        let templates = vec![template("short", "INV"), template("long", "inv_eu"), template("none", "")];

        assert_eq!(match_template("INV_EU_2024-01.pdf", &templates).map(|t| t.id.as_str()), Some("long"));
        assert_eq!(match_template("inv-2024-01.pdf", &templates).map(|t| t.id.as_str()), Some("short"));
        assert!(match_template("other.pdf", &templates).is_none());
    }

    #[test]
    fn test_discover() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("MS_2024-03.pdf"), b"%PDF").unwrap();
        fs::write(dir.path().join("MS_latest.pdf"), b"%PDF").unwrap();
        fs::write(dir.path().join("unknown_2024-03.pdf"), b"%PDF").unwrap();
        fs::write(dir.path().join("MS_2024-04.txt"), b"text").unwrap();

        let templates = vec![template("monthly", "MS_")];
        let documents = discover(dir.path(), "*.pdf", &templates).unwrap();

        assert_eq!(documents.len(), 2);
        assert!(documents.iter().all(|d| d.template_id == "monthly"));
        assert_eq!(documents[0].period, Period { year: 2024, month: 3 });
        // no period in the name: file modification month
        assert_eq!(documents[1].period, Period::of(Local::now()));
    }
}
