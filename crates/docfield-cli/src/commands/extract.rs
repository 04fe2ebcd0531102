//! Extract command - extract fields from a single document.

use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use clap::Args;
use console::style;
use tracing::{debug, info};

use docfield_core::Query;

use super::{load_catalog, load_config, process_document};
use crate::discovery::{match_template, period_from_name};
use crate::store::DocumentRecord;

/// Arguments for the extract command.
#[derive(Args)]
pub struct ExtractArgs {
    /// Input PDF
    #[arg(required = true)]
    input: PathBuf,

    /// Template id (default: matched by file name prefix)
    #[arg(short, long)]
    template: Option<String>,

    /// Query id to run (default: every query of the template)
    #[arg(short, long)]
    query: Option<String>,

    /// Catalog file (overrides config)
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print per-anchor calibration diagnostics to stderr
    #[arg(long)]
    show_calibration: bool,
}

pub async fn run(args: ExtractArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();

    let config = load_config(config_path)?;

    if !args.input.exists() {
        anyhow::bail!("Input file not found: {}", args.input.display());
    }

    let catalog_path = args.catalog.clone().unwrap_or_else(|| config.pipeline.catalog.clone());
    let catalog = load_catalog(&catalog_path)?;

    let file_name = args
        .input
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("");

    let template = match &args.template {
        Some(id) => catalog.template(id)?,
        None => match_template(file_name, &catalog.templates)
            .ok_or_else(|| anyhow::anyhow!("No template prefix matches {}; pass --template", file_name))?,
    };

    let queries: Vec<&Query> = match &args.query {
        Some(id) => vec![catalog.query(id)?],
        None => catalog.queries_for(&template.id),
    };

    info!("Extracting {} with template {}", args.input.display(), template.id);

    let record = process_document(
        &config,
        &catalog,
        template,
        &queries,
        &args.input,
        period_from_name(file_name),
    );

    if args.show_calibration {
        print_calibration(&record);
    }

    let output = serde_json::to_string_pretty(&record)?;

    if let Some(output_path) = &args.output {
        fs::write(output_path, &output)?;
        eprintln!(
            "{} Output written to {}",
            style("✓").green(),
            output_path.display()
        );
    } else {
        println!("{}", output);
    }

    debug!("Total processing time: {:?}", start.elapsed());

    if let Some(error) = &record.error {
        anyhow::bail!("Extraction failed: {}", error);
    }

    Ok(())
}

fn print_calibration(record: &DocumentRecord) {
    let Some(extraction) = &record.extraction else {
        return;
    };
    let report = &extraction.calibration;
    let t = &report.transformation;

    eprintln!(
        "{} Calibration confidence: {:.1}%",
        style("ℹ").blue(),
        t.confidence * 100.0
    );
    eprintln!(
        "   offset ({:.2}, {:.2}), scale ({:.4}, {:.4})",
        t.offset_x, t.offset_y, t.scale_x, t.scale_y
    );
    if let Some(reason) = &report.fallback_reason {
        eprintln!("   {}", style(reason).yellow());
    }

    for anchor in &report.anchors {
        let marker = if anchor.is_text_match {
            style("✓").green()
        } else {
            style("✗").red()
        };
        eprintln!(
            "   {} {} {:?} -> {:?} ({:.2}, {:?})",
            marker,
            anchor.name,
            anchor.reference_text,
            anchor.extracted_text,
            anchor.similarity,
            anchor.quality
        );
    }
}
