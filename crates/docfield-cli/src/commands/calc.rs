//! Calc command - evaluate a query or a single formula over supplied inputs.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use clap::{ArgGroup, Args};
use serde_json::json;

use docfield_core::formula::CalculatedContext;
use docfield_core::{InputContext, QueryCalculator};

use super::{load_catalog, load_config};

/// Arguments for the calc command.
#[derive(Args)]
#[command(group(ArgGroup::new("target").required(true).args(["query", "formula"])))]
pub struct CalcArgs {
    /// Query id from the catalog
    #[arg(short, long)]
    query: Option<String>,

    /// A single formula, e.g. "[Input:Net] * 1.2"
    #[arg(short, long)]
    formula: Option<String>,

    /// JSON file mapping input field names to numbers
    #[arg(long)]
    inputs: Option<PathBuf>,

    /// Input field value, NAME=VALUE (repeatable)
    #[arg(short = 'i', long = "input", value_parser = parse_assignment)]
    input: Vec<(String, f64)>,

    /// Global constant value, NAME=VALUE (repeatable)
    #[arg(long = "constant", value_parser = parse_assignment)]
    constant: Vec<(String, f64)>,

    /// Catalog file (overrides config)
    #[arg(long)]
    catalog: Option<PathBuf>,
}

pub async fn run(args: CalcArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let mut fields: HashMap<String, f64> = match &args.inputs {
        Some(path) => {
            let content = fs::read_to_string(path)?;
            serde_json::from_str(&content)
                .map_err(|e| anyhow::anyhow!("Invalid inputs file {}: {}", path.display(), e))?
        }
        None => HashMap::new(),
    };
    fields.extend(args.input.iter().cloned());

    let calculator = QueryCalculator::new();

    if let Some(formula) = &args.formula {
        let inputs = with_constants(
            InputContext {
                fields: fields.into_iter().collect(),
                ..InputContext::default()
            },
            &args.constant,
        );

        let outcome = calculator.evaluate_formula(formula, &inputs, &CalculatedContext::new());
        let unresolved: Vec<String> = outcome.unresolved.iter().map(ToString::to_string).collect();
        let output = match &outcome.value {
            Ok(value) => json!({
                "value": value,
                "formula": outcome.substituted,
                "unresolved": unresolved,
            }),
            Err(e) => json!({
                "value": null,
                "formula": outcome.substituted,
                "unresolved": unresolved,
                "error": e.to_string(),
            }),
        };
        println!("{}", serde_json::to_string_pretty(&output)?);

        if let Err(e) = outcome.value {
            anyhow::bail!("Formula failed: {}", e);
        }
        return Ok(());
    }

    let config = load_config(config_path)?;
    let catalog_path = args.catalog.clone().unwrap_or(config.pipeline.catalog);
    let catalog = load_catalog(&catalog_path)?;

    let query_id = args
        .query
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("Either --query or --formula is required"))?;
    let query = catalog.query(query_id)?;

    let inputs = with_constants(
        InputContext::for_query(query, &fields, &catalog.global_constants()),
        &args.constant,
    );
    let result = calculator.calculate(query, &inputs);

    println!("{}", serde_json::to_string_pretty(&result)?);

    if let Some(error) = &result.error {
        anyhow::bail!("{}", error);
    }
    Ok(())
}

fn with_constants(inputs: InputContext, constants: &[(String, f64)]) -> InputContext {
    constants
        .iter()
        .fold(inputs, |inputs, (name, value)| inputs.with_constant(name.clone(), *value))
}

fn parse_assignment(s: &str) -> Result<(String, f64), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got {:?}", s))?;
    let value: f64 = value
        .trim()
        .parse()
        .map_err(|_| format!("{:?} is not a number", value))?;
    Ok((name.trim().to_string(), value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_assignment() {
        assert_eq!(parse_assignment("Revenue=1500"), Ok(("Revenue".to_string(), 1500.0)));
        assert_eq!(parse_assignment(" Rate = 0.2 "), Ok(("Rate".to_string(), 0.2)));
        assert!(parse_assignment("Revenue").is_err());
        assert!(parse_assignment("Revenue=abc").is_err());
    }
}
