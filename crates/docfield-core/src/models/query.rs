//! Query definitions: named output formulas and their constants.

use serde::{Deserialize, Serialize};

/// A set of output formulas computed after extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Query {
    /// Stable identifier.
    pub id: String,

    /// Display name.
    #[serde(default)]
    pub name: String,

    /// Template whose extraction results feed this query.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_id: Option<String>,

    /// Output formulas.
    #[serde(default)]
    pub outputs: Vec<QueryOutput>,

    /// Constants available to the formulas.
    #[serde(default)]
    pub constants: Vec<QueryConstant>,
}

/// One named output formula.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryOutput {
    /// Output name.
    pub name: String,

    /// Formula text, e.g. `[Input:Revenue#1] * 0.2`.
    pub formula: String,

    /// Declared result type.
    #[serde(default)]
    pub data_type: OutputDataType,

    /// Position in the evaluation sequence.
    #[serde(default)]
    pub execution_order: u32,
}

/// Declared type of a query output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputDataType {
    #[default]
    Number,
    /// Rounded to 2 decimal places.
    Currency,
    Percentage,
    /// Rounded to a whole number.
    Integer,
    /// Non-zero becomes 1, zero stays 0.
    Boolean,
}

/// A named constant value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConstant {
    pub name: String,

    /// Value used when no override is supplied.
    pub default_value: f64,

    /// Visibility of the constant.
    #[serde(default)]
    pub scope: ConstantScope,
}

/// Visibility of a constant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstantScope {
    /// Only visible to the owning query.
    #[default]
    Local,
    /// Shared by all queries.
    Global,
}

impl Query {
    /// Outputs sorted by execution order (stable for equal orders).
    pub fn ordered_outputs(&self) -> Vec<&QueryOutput> {
        let mut outputs: Vec<&QueryOutput> = self.outputs.iter().collect();
        outputs.sort_by_key(|o| o.execution_order);
        outputs
    }
}
