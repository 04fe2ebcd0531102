//! Template layout models: field mappings and calibration anchors.

use serde::{Deserialize, Serialize};

use crate::layout::Rect;

/// A known document layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    /// Stable identifier.
    pub id: String,

    /// Display name.
    #[serde(default)]
    pub name: String,

    /// File-name prefix used by discovery to route documents to this template.
    #[serde(default)]
    pub prefix: String,

    /// Page size of the template coordinate space.
    #[serde(default)]
    pub page_size: PageSize,

    /// Extractable fields.
    #[serde(default)]
    pub fields: Vec<FieldMapping>,

    /// Calibration anchors.
    #[serde(default)]
    pub anchors: Vec<Anchor>,
}

/// Page dimensions in template units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageSize {
    pub width: f64,
    pub height: f64,
}

impl Default for PageSize {
    /// A4 in PDF points.
    fn default() -> Self {
        Self {
            width: 595.0,
            height: 842.0,
        }
    }
}

/// Declared data type of an extracted field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldDataType {
    /// Free text, kept as reassembled.
    Text,
    /// Decimal number.
    #[default]
    Number,
    /// Monetary amount.
    Currency,
    /// Percentage, normalized to a fraction.
    Percentage,
    /// Whole number.
    Integer,
    /// Calendar date.
    Date,
}

impl FieldDataType {
    /// Check if values of this type are numeric.
    pub fn is_numeric(&self) -> bool {
        !matches!(self, FieldDataType::Text | FieldDataType::Date)
    }
}

/// One extractable field of a template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldMapping {
    /// Field name, unique within the template.
    pub name: String,

    /// Page number (1-indexed).
    pub page: u32,

    /// Configured rectangle in template coordinates.
    pub rect: Rect,

    /// Declared data type.
    #[serde(default)]
    pub data_type: FieldDataType,

    /// Display order.
    #[serde(default)]
    pub order: u32,
}

/// Reference text used only to detect coordinate drift.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Anchor {
    /// Anchor name (diagnostics only).
    pub name: String,

    /// Expected text at the configured position.
    pub reference_text: String,

    /// Page number (1-indexed).
    pub page: u32,

    /// Configured rectangle in template coordinates.
    pub rect: Rect,

    /// Display index.
    #[serde(default)]
    pub order: u32,
}

impl Template {
    /// Fields sorted by display order.
    pub fn ordered_fields(&self) -> Vec<&FieldMapping> {
        let mut fields: Vec<&FieldMapping> = self.fields.iter().collect();
        fields.sort_by_key(|f| f.order);
        fields
    }

    /// Anchors sorted by display index.
    pub fn ordered_anchors(&self) -> Vec<&Anchor> {
        let mut anchors: Vec<&Anchor> = self.anchors.iter().collect();
        anchors.sort_by_key(|a| a.order);
        anchors
    }

    /// Check if a file name follows this template's naming convention.
    pub fn matches_file_name(&self, file_name: &str) -> bool {
        !self.prefix.is_empty() && file_name.to_lowercase().starts_with(&self.prefix.to_lowercase())
    }

    /// Validate the template layout and return any issues found.
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();

        if self.id.trim().is_empty() {
            issues.push("Missing template id".to_string());
        }

        for field in &self.fields {
            if field.name.trim().is_empty() {
                issues.push("Field with empty name".to_string());
            }
            if field.page < 1 {
                issues.push(format!("Field {} has page number {}", field.name, field.page));
            }
            if !self.rect_within_page(&field.rect) {
                issues.push(format!("Field {} rectangle lies outside the page", field.name));
            }
        }

        let mut names: Vec<&str> = self.fields.iter().map(|f| f.name.as_str()).collect();
        names.sort_unstable();
        for pair in names.windows(2) {
            if pair[0] == pair[1] {
                issues.push(format!("Duplicate field name {}", pair[0]));
            }
        }

        for anchor in &self.anchors {
            if anchor.reference_text.trim().is_empty() {
                issues.push(format!("Anchor {} has no reference text", anchor.name));
            }
            if anchor.page < 1 {
                issues.push(format!("Anchor {} has page number {}", anchor.name, anchor.page));
            }
            if !self.rect_within_page(&anchor.rect) {
                issues.push(format!("Anchor {} rectangle lies outside the page", anchor.name));
            }
        }

        issues
    }

    fn rect_within_page(&self, rect: &Rect) -> bool {
        rect.x >= 0.0
            && rect.y >= 0.0
            && rect.width > 0.0
            && rect.height > 0.0
            && rect.right() <= self.page_size.width
            && rect.bottom() <= self.page_size.height
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template() -> Template {
        Template {
            id: "utility-bill".to_string(),
            name: "Utility bill".to_string(),
            prefix: "UB_".to_string(),
            page_size: PageSize::default(),
            fields: vec![FieldMapping {
                name: "Total".to_string(),
                page: 1,
                rect: Rect::new(200.0, 300.0, 100.0, 20.0),
                data_type: FieldDataType::Currency,
                order: 1,
            }],
            anchors: vec![Anchor {
                name: "total-label".to_string(),
                reference_text: "Total:".to_string(),
                page: 1,
                rect: Rect::new(100.0, 100.0, 50.0, 20.0),
                order: 0,
            }],
        }
    }

    #[test]
    fn test_valid_template() {
        assert!(template().validate().is_empty());
    }

    #[test]
    fn test_validation_issues() {
        let mut t = template();
        t.fields[0].page = 0;
        t.fields[0].rect = Rect::new(550.0, 300.0, 100.0, 20.0);
        t.fields.push(t.fields[0].clone());

        let issues = t.validate();
        assert!(issues.iter().any(|i| i.contains("page number 0")));
        assert!(issues.iter().any(|i| i.contains("outside the page")));
        assert!(issues.iter().any(|i| i.contains("Duplicate field name Total")));
    }

    #[test]
    fn test_matches_file_name() {
        let t = template();
        assert!(t.matches_file_name("ub_2024-03_acme.pdf"));
        assert!(!t.matches_file_name("invoice.pdf"));
    }
}
