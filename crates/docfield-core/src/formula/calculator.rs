//! Query calculation: ordered outputs over input and calculated contexts.

use std::collections::BTreeMap;
use std::time::Instant;

use lazy_static::lazy_static;
use regex::{Captures, Regex};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::ast::Reference;
use super::context::{CalculatedContext, InputContext, ReferenceResolver, Scope};
use super::eval::evaluate;
use super::parser::parse;
use crate::error::FormulaError;
use crate::models::query::{OutputDataType, Query, QueryOutput};

/// Decimal places kept in every formula result.
const RESULT_DECIMALS: u32 = 10;

lazy_static! {
    static ref REFERENCE: Regex = Regex::new(r"\[([^\[\]]+)\]").unwrap();
}

/// Result of running a query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CalculationResult {
    pub query_id: String,

    /// Output name to value; failed outputs map to `null`.
    pub values: BTreeMap<String, Option<f64>>,

    /// Output name to the formula with every reference replaced by its value.
    pub formulas: BTreeMap<String, String>,

    #[serde(default)]
    pub warnings: Vec<String>,

    /// Output name to the reason it failed.
    #[serde(default)]
    pub errors: BTreeMap<String, String>,

    /// Set when the query as a whole produced nothing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub execution_time_ms: u64,
}

impl CalculationResult {
    pub fn value(&self, output: &str) -> Option<f64> {
        self.values.get(output).copied().flatten()
    }

    /// Check if every output produced a value.
    pub fn is_complete(&self) -> bool {
        self.values.values().all(Option::is_some)
    }
}

/// Evaluation of a single formula.
#[derive(Debug, Clone, PartialEq)]
pub struct FormulaOutcome {
    pub value: Result<f64, FormulaError>,
    /// Formula text with references replaced by the values used.
    pub substituted: String,
    pub unresolved: Vec<Reference>,
}

/// Runs query formulas.
#[derive(Debug, Clone, Default)]
pub struct QueryCalculator;

impl QueryCalculator {
    pub fn new() -> Self {
        Self
    }

    /// Evaluate every output of a query in execution order.
    ///
    /// Each output sees the input context and the outputs computed before
    /// it. A failing output is recorded as `null` and the rest continue.
    pub fn calculate(&self, query: &Query, inputs: &InputContext) -> CalculationResult {
        let start = Instant::now();
        let mut calculated = CalculatedContext::new();
        let mut result = CalculationResult {
            query_id: query.id.clone(),
            ..CalculationResult::default()
        };

        for output in query.ordered_outputs() {
            let outcome = self.evaluate_formula(&output.formula, inputs, &calculated);

            for reference in &outcome.unresolved {
                warn!("Output {}: unresolved reference {}, using 0", output.name, reference);
                result
                    .warnings
                    .push(format!("Output {}: unresolved reference {} replaced with 0", output.name, reference));
            }

            let value = match outcome.value {
                Ok(raw) => {
                    let value = finalize(raw, output);
                    debug!("Output {} = {}", output.name, value);
                    calculated.insert(output.name.clone(), value);
                    Some(value)
                }
                Err(e) => {
                    warn!("Output {} failed: {} ({})", output.name, e, outcome.substituted);
                    result.errors.insert(output.name.clone(), e.to_string());
                    None
                }
            };

            result.values.insert(output.name.clone(), value);
            result.formulas.insert(output.name.clone(), outcome.substituted);
        }

        if !result.values.is_empty() && result.values.values().all(Option::is_none) {
            result.error = Some(format!("All {} outputs of query {} failed", result.values.len(), query.id));
        }

        result.execution_time_ms = start.elapsed().as_millis() as u64;
        result
    }

    /// Parse and evaluate one formula against the given contexts.
    pub fn evaluate_formula(
        &self,
        formula: &str,
        inputs: &InputContext,
        calculated: &CalculatedContext,
    ) -> FormulaOutcome {
        let scope = Scope::new(inputs, calculated);
        let substituted = substitute(formula, &scope);

        let (value, unresolved) = match parse(formula) {
            Ok(expr) => evaluate(&expr, &scope),
            Err(e) => (Err(e), unresolved_in_text(formula, &scope)),
        };

        FormulaOutcome {
            value,
            substituted,
            unresolved,
        }
    }
}

/// Round to the result precision, then apply the output's data type.
fn finalize(raw: f64, output: &QueryOutput) -> f64 {
    let value = round_decimal(raw, RESULT_DECIMALS);
    match output.data_type {
        OutputDataType::Number | OutputDataType::Percentage => value,
        OutputDataType::Currency => round_decimal(value, 2),
        OutputDataType::Integer => round_decimal(value, 0),
        OutputDataType::Boolean => {
            if value != 0.0 {
                1.0
            } else {
                0.0
            }
        }
    }
}

fn round_decimal(value: f64, decimals: u32) -> f64 {
    Decimal::from_f64(value)
        .map(|d| d.round_dp_with_strategy(decimals, RoundingStrategy::MidpointAwayFromZero))
        .and_then(|d| d.to_f64())
        .unwrap_or(value)
}

/// Replace each reference placeholder with the value it resolves to (0 when
/// unresolved). Malformed placeholders are left as written.
fn substitute(formula: &str, scope: &Scope<'_>) -> String {
    REFERENCE
        .replace_all(formula, |caps: &Captures| match Reference::parse(&caps[1]) {
            Ok(reference) => format_operand(scope.resolve(&reference).unwrap_or(0.0)),
            Err(_) => caps[0].to_string(),
        })
        .into_owned()
}

/// Negative values are parenthesized so the trace reads like the evaluation.
fn format_operand(value: f64) -> String {
    let text = value.to_string();
    if text.starts_with('-') {
        format!("({})", text)
    } else {
        text
    }
}

fn unresolved_in_text(formula: &str, scope: &Scope<'_>) -> Vec<Reference> {
    let mut unresolved: Vec<Reference> = Vec::new();
    for caps in REFERENCE.captures_iter(formula) {
        if let Ok(reference) = Reference::parse(&caps[1]) {
            if scope.resolve(&reference).is_none() && !unresolved.contains(&reference) {
                unresolved.push(reference);
            }
        }
    }
    unresolved
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::query::QueryConstant;
    use pretty_assertions::assert_eq;

    fn output(name: &str, formula: &str, data_type: OutputDataType, order: u32) -> QueryOutput {
        QueryOutput {
            name: name.to_string(),
            formula: formula.to_string(),
            data_type,
            execution_order: order,
        }
    }

    fn query(outputs: Vec<QueryOutput>) -> Query {
        Query {
            id: "bonus".to_string(),
            name: "Bonus".to_string(),
            template_id: None,
            outputs,
            constants: Vec::<QueryConstant>::new(),
        }
    }

    #[test]
    fn test_negative_values_parenthesized_in_trace() {
        let q = query(vec![output("Square", "[Input:A] ^ 2 - [Input:B]", OutputDataType::Number, 0)]);
        let inputs = InputContext::new().with_field("A", -3.0).with_field("B", 1.5);

        let result = QueryCalculator::new().calculate(&q, &inputs);
        assert_eq!(result.value("Square"), Some(7.5));
        assert_eq!(result.formulas["Square"], "(-3) ^ 2 - 1.5");
    }

    #[test]
    fn test_if_scenario() {
        let q = query(vec![output(
            "Bonus",
            "IF([Input:Revenue#1] > 1000, [Input:Revenue#1], 0)",
            OutputDataType::Number,
            0,
        )]);
        let calc = QueryCalculator::new();

        let high = calc.calculate(&q, &InputContext::new().with_field("Revenue", 1500.0));
        assert_eq!(high.value("Bonus"), Some(1500.0));
        assert_eq!(high.formulas["Bonus"], "IF(1500 > 1000, 1500, 0)");

        let low = calc.calculate(&q, &InputContext::new().with_field("Revenue", 500.0));
        assert_eq!(low.value("Bonus"), Some(0.0));
    }

    #[test]
    fn test_unresolved_calculated_reference() {
        let q = query(vec![output("Total", "[Calculated:Missing#9] + 5", OutputDataType::Number, 0)]);
        let result = QueryCalculator::new().calculate(&q, &InputContext::new());

        assert_eq!(result.value("Total"), Some(5.0));
        assert_eq!(result.formulas["Total"], "0 + 5");
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].contains("[Calculated:Missing#9]"));
        assert!(result.error.is_none());
    }

    #[test]
    fn test_outputs_chain_in_execution_order() {
        let q = query(vec![
            output("Gross", "[Calculated:Net#1] * (1 + [Constant:Vat])", OutputDataType::Currency, 2),
            output("Net", "[Input:Amount] - [Input:Discount]", OutputDataType::Number, 1),
        ]);
        let inputs = InputContext::new()
            .with_field("Amount", 100.0)
            .with_field("Discount", 0.555)
            .with_constant("Vat", 0.2);

        let result = QueryCalculator::new().calculate(&q, &inputs);
        assert_eq!(result.value("Net"), Some(99.445));
        // 119.334 rounded to cents
        assert_eq!(result.value("Gross"), Some(119.33));
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_outputs_never_see_later_values() {
        let q = query(vec![
            output("First", "[Calculated:Second] + 1", OutputDataType::Number, 1),
            output("Second", "10", OutputDataType::Number, 2),
        ]);
        let result = QueryCalculator::new().calculate(&q, &InputContext::new());

        assert_eq!(result.value("First"), Some(1.0));
        assert_eq!(result.value("Second"), Some(10.0));
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn test_failures_do_not_abort() {
        let q = query(vec![
            output("Ratio", "[Input:A] / [Input:B]", OutputDataType::Number, 0),
            output("Broken", "SQRT(", OutputDataType::Number, 1),
            output("Fine", "[Input:A] * 2", OutputDataType::Integer, 2),
            output("Flag", "[Input:A] - 3", OutputDataType::Boolean, 3),
        ]);
        let inputs = InputContext::new().with_field("A", 3.4).with_field("B", 0.0);

        let result = QueryCalculator::new().calculate(&q, &inputs);
        assert_eq!(result.value("Ratio"), None);
        assert!(result.values.contains_key("Ratio"));
        assert_eq!(result.formulas["Ratio"], "3.4 / 0");
        assert_eq!(result.errors["Ratio"], "division by zero");
        assert_eq!(result.value("Broken"), None);
        assert_eq!(result.value("Fine"), Some(7.0));
        assert_eq!(result.value("Flag"), Some(1.0));
        assert!(!result.is_complete());
        assert!(result.error.is_none());
    }

    #[test]
    fn test_all_failed_sets_error() {
        let q = query(vec![output("Bad", "1 / 0", OutputDataType::Number, 0)]);
        let result = QueryCalculator::new().calculate(&q, &InputContext::new());
        assert!(result.error.is_some());
    }

    #[test]
    fn test_rounding_suppresses_float_noise() {
        let q = query(vec![output("Sum", "0.1 + 0.2", OutputDataType::Number, 0)]);
        let result = QueryCalculator::new().calculate(&q, &InputContext::new());
        assert_eq!(result.value("Sum"), Some(0.3));
    }

    #[test]
    fn test_deterministic() {
        let q = query(vec![
            output("A", "[Input:X] * 1.1", OutputDataType::Number, 0),
            output("B", "ROUND([Calculated:A] / 3, 4) + [Variable:Missing]", OutputDataType::Number, 1),
        ]);
        let inputs = InputContext::new().with_field("X", 7.0);
        let calc = QueryCalculator::new();

        let mut first = calc.calculate(&q, &inputs);
        let mut second = calc.calculate(&q, &inputs);
        first.execution_time_ms = 0;
        second.execution_time_ms = 0;
        assert_eq!(first, second);
    }
}
