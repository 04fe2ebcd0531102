//! Run command - process new documents from the intake folder.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Args;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{error, info, warn};

use docfield_core::{Catalog, DocfieldConfig};

use super::{load_catalog, load_config, process_document};
use crate::discovery::{self, DiscoveredDocument};
use crate::lock::IntakeLock;
use crate::store::{DocumentRecord, ResultStore};

/// Arguments for the run command.
#[derive(Args)]
pub struct RunArgs {
    /// Process one batch and exit
    #[arg(long)]
    once: bool,

    /// Intake folder (overrides config)
    #[arg(short, long)]
    intake_dir: Option<PathBuf>,

    /// Output folder (overrides config)
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Catalog file (overrides config)
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Seconds between batches (overrides config)
    #[arg(long)]
    interval: Option<u64>,
}

/// Outcome of one batch.
#[derive(Debug, Default)]
struct BatchSummary {
    processed: usize,
    succeeded: usize,
    failed: Vec<(String, String)>,
    elapsed: Duration,
}

pub async fn run(args: RunArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let mut config = load_config(config_path)?;
    if let Some(dir) = args.intake_dir {
        config.pipeline.intake_dir = dir;
    }
    if let Some(dir) = args.output_dir {
        config.pipeline.output_dir = dir;
    }
    if let Some(path) = args.catalog {
        config.pipeline.catalog = path;
    }
    if let Some(secs) = args.interval {
        config.pipeline.poll_interval_secs = secs;
    }

    if !config.pipeline.intake_dir.is_dir() {
        anyhow::bail!("Intake folder not found: {}", config.pipeline.intake_dir.display());
    }

    let catalog = Arc::new(load_catalog(&config.pipeline.catalog)?);
    let config = Arc::new(config);

    if args.once {
        let summary = run_batch(&config, &catalog).await?;
        print_summary(&summary);
        return Ok(());
    }

    let period = Duration::from_secs(config.pipeline.poll_interval_secs.max(1));
    info!(
        "Watching {} every {}s",
        config.pipeline.intake_dir.display(),
        period.as_secs()
    );

    let mut interval = tokio::time::interval(period);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            biased;
            result = &mut shutdown => {
                if let Err(e) = result {
                    error!("Failed to listen for shutdown signal: {}", e);
                }
                info!("Shutdown requested, stopping");
                break;
            }
            _ = interval.tick() => {
                match run_batch(&config, &catalog).await {
                    Ok(summary) if summary.processed > 0 => print_summary(&summary),
                    Ok(_) => {}
                    Err(e) => error!("Batch failed: {:#}", e),
                }
            }
        }
    }

    Ok(())
}

async fn run_batch(config: &Arc<DocfieldConfig>, catalog: &Arc<Catalog>) -> anyhow::Result<BatchSummary> {
    let start = Instant::now();
    let pipeline = &config.pipeline;
    let stale_after = Duration::from_secs(pipeline.lock_stale_minutes * 60);

    let Some(lock) = IntakeLock::acquire(&pipeline.intake_dir, stale_after)? else {
        warn!(
            "Intake folder {} is locked by another run, skipping batch",
            pipeline.intake_dir.display()
        );
        return Ok(BatchSummary::default());
    };
    info!("Holding {}", lock.path().display());

    let store = ResultStore::new(&pipeline.output_dir);
    let pending: Vec<DiscoveredDocument> =
        discovery::discover(&pipeline.intake_dir, &pipeline.file_pattern, &catalog.templates)?
            .into_iter()
            .filter(|doc| !store.is_current(&doc.template_id, &doc.path))
            .collect();

    if pending.is_empty() {
        info!("No new documents");
        return Ok(BatchSummary::default());
    }

    println!("{} Found {} documents to process", style("ℹ").blue(), pending.len());

    let pb = ProgressBar::new(pending.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("=>-"),
    );

    let mut summary = BatchSummary::default();
    let mut records = Vec::with_capacity(pending.len());

    for doc in pending {
        let name = doc
            .path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("")
            .to_string();
        pb.set_message(name.clone());

        let record = process_isolated(Arc::clone(config), Arc::clone(catalog), doc).await;

        if let Err(e) = store.save(&record) {
            error!("Failed to store result of {}: {:#}", name, e);
        }

        summary.processed += 1;
        if record.is_success() {
            summary.succeeded += 1;
        } else {
            let reason = record
                .error
                .clone()
                .unwrap_or_else(|| "no field found".to_string());
            summary.failed.push((name, reason));
        }
        records.push(record);
        pb.inc(1);

        match lock.refresh() {
            Ok(true) => {}
            Ok(false) => {
                warn!("Lost the intake lock, stopping the batch early");
                break;
            }
            Err(e) => warn!("Failed to refresh lock {}: {}", lock.path().display(), e),
        }
    }

    pb.finish_with_message("Complete");

    let summary_path = store.root().join("summary.csv");
    write_summary(&summary_path, &records)?;
    info!("Summary written to {}", summary_path.display());

    summary.elapsed = start.elapsed();
    Ok(summary)
}

/// Process one document on the blocking pool; a panic fails only that document.
async fn process_isolated(config: Arc<DocfieldConfig>, catalog: Arc<Catalog>, doc: DiscoveredDocument) -> DocumentRecord {
    let path = doc.path.clone();
    let template_id = doc.template_id.clone();
    let period = doc.period;

    let task = tokio::task::spawn_blocking(move || {
        let template = catalog.template(&doc.template_id)?;
        let queries = catalog.queries_for(&template.id);
        Ok::<_, anyhow::Error>(process_document(
            &config,
            &catalog,
            template,
            &queries,
            &doc.path,
            Some(doc.period),
        ))
    });

    match task.await {
        Ok(Ok(record)) => record,
        Ok(Err(e)) => DocumentRecord::failed(&path, &template_id, Some(period), e.to_string()),
        Err(e) => {
            error!("Processing {} aborted: {}", path.display(), e);
            DocumentRecord::failed(&path, &template_id, Some(period), format!("processing aborted: {}", e))
        }
    }
}

fn write_summary(path: &Path, records: &[DocumentRecord]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut wtr = csv::Writer::from_path(path)?;

    wtr.write_record([
        "filename",
        "template_id",
        "period",
        "status",
        "confidence",
        "fields_found",
        "fields_total",
        "queries",
        "processing_time_ms",
        "error",
    ])?;

    for record in records {
        let period = record.period.map(|p| p.to_string()).unwrap_or_default();
        let status = if record.is_success() { "success" } else { "error" };

        match &record.extraction {
            Some(extraction) => {
                wtr.write_record([
                    record.file_name(),
                    &record.template_id,
                    &period,
                    status,
                    &format!("{:.2}", extraction.confidence()),
                    &extraction.found_count().to_string(),
                    &extraction.fields.len().to_string(),
                    &record.queries.len().to_string(),
                    &extraction.processing_time_ms.to_string(),
                    record.error.as_deref().unwrap_or(""),
                ])?;
            }
            None => {
                wtr.write_record([
                    record.file_name(),
                    &record.template_id,
                    &period,
                    status,
                    "",
                    "",
                    "",
                    "",
                    "",
                    record.error.as_deref().unwrap_or(""),
                ])?;
            }
        }
    }

    wtr.flush()?;
    Ok(())
}

fn print_summary(summary: &BatchSummary) {
    println!();
    println!(
        "{} Processed {} documents in {:?}",
        style("✓").green(),
        summary.processed,
        summary.elapsed
    );
    println!(
        "   {} successful, {} failed",
        style(summary.succeeded).green(),
        style(summary.failed.len()).red()
    );

    if !summary.failed.is_empty() {
        println!();
        println!("{}", style("Failed documents:").red());
        for (name, reason) in &summary.failed {
            println!("  - {}: {}", name, reason);
        }
    }
}
