//! Controller (C): CLI parsing and top-level dispatch (spec §4.6, §6).

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use crate::batch::BatchEngine;
use crate::catalog::{PmcSource, UnpaywallSource};
use crate::config::Config;
use crate::fetch::{Fetcher, HttpFetcher};
use crate::postprocess::PostProcessor;
use crate::store::PersistentStore;

/// Resumable, parallel harvester for Open Access scholarly PDFs.
#[derive(Parser, Debug)]
#[command(name = "oa-harvest", version, about)]
pub struct Cli {
    /// Harvest from a gzipped line-delimited JSON Unpaywall dump.
    #[arg(long, value_name = "PATH")]
    pub unpaywall: Option<PathBuf>,

    /// Harvest from a tab-separated PMC file list.
    #[arg(long, value_name = "PATH")]
    pub pmc: Option<PathBuf>,

    /// Iterate FailLog and retry previously failed entries.
    #[arg(long)]
    pub reprocess: bool,

    /// Delete all persistent state and scratch artifacts before continuing.
    #[arg(long)]
    pub reset: bool,

    /// Alias for `--unpaywall`; dedup against DoiIndex makes this safe to
    /// run against an already-harvested catalog (spec §6).
    #[arg(long, value_name = "PATH")]
    pub increment: Option<PathBuf>,

    /// Configuration file path.
    #[arg(long, value_name = "PATH", default_value = "./config.json")]
    pub config: PathBuf,

    /// Enable thumbnail generation for successfully fetched PDFs.
    #[arg(long)]
    pub thumbnail: bool,

    /// Harvest only a uniformly-sampled subset of the given size.
    #[arg(long, value_name = "K")]
    pub sample: Option<usize>,

    /// After all other actions, export Entries as JSON-per-line.
    #[arg(long, value_name = "PATH")]
    pub dump: Option<PathBuf>,
}

/// Runs exactly the dispatch order of the original harvester: an optional
/// reset, then at most one of {reprocess, harvest-unpaywall, harvest-pmc},
/// each followed by a diagnostic summary, then an unconditional dump.
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load(&cli.config)?;

    let store = if cli.reset {
        Arc::new(PersistentStore::reset(&config.data_path)?)
    } else {
        Arc::new(PersistentStore::open(&config.data_path)?)
    };

    let fetcher: Arc<dyn Fetcher> = Arc::new(HttpFetcher::new());
    let post_processor = Arc::new(PostProcessor::new(&config, cli.thumbnail));
    let engine = BatchEngine::new(
        store.clone(),
        fetcher,
        post_processor,
        config.batch_size,
        config.workers,
    );

    if cli.reprocess {
        let report = engine.run_reprocess().await?;
        tracing::info!(
            processed = report.processed,
            succeeded = report.succeeded,
            failed = report.failed,
            "reprocess complete"
        );
        print_diagnostic(&store)?;
    } else if let Some(path) = cli.unpaywall.as_ref().or(cli.increment.as_ref()) {
        let mut source = UnpaywallSource::open(path, cli.sample)?;
        let report = engine.run_harvest(&mut source).await?;
        tracing::info!(
            processed = report.processed,
            succeeded = report.succeeded,
            failed = report.failed,
            "harvest complete"
        );
        print_diagnostic(&store)?;
    } else if let Some(path) = &cli.pmc {
        let mut source = PmcSource::open(path, config.pmc_base.clone(), cli.sample)?;
        let report = engine.run_harvest(&mut source).await?;
        tracing::info!(
            processed = report.processed,
            succeeded = report.succeeded,
            failed = report.failed,
            "harvest complete"
        );
        print_diagnostic(&store)?;
    } else {
        // No mode flag selected (beyond an optional --reset): falls through
        // to the `diagnostic` mode of spec §4.6, printing PS stats as-is.
        print_diagnostic(&store)?;
    }

    if let Some(path) = &cli.dump {
        dump(&store, path)?;
    }

    Ok(())
}

fn print_diagnostic(store: &PersistentStore) -> anyhow::Result<()> {
    let (fail_count, total_count) = store.stats()?;
    println!(
        "{} {fail_count} failed / {total_count} total (as of {})",
        console::style("diagnostic:").cyan(),
        chrono::Utc::now().to_rfc3339()
    );
    Ok(())
}

/// Writes one JSON Entry per line from Entries to `path` (spec §4.6
/// "dump", §6 "Dump format").
fn dump(store: &PersistentStore, path: &PathBuf) -> anyhow::Result<()> {
    use std::io::Write;

    let started_at = chrono::Utc::now();
    let file = std::fs::File::create(path)?;
    let mut writer = std::io::BufWriter::new(file);
    for entry in store.iter_entries() {
        let entry = entry?;
        writeln!(writer, "{}", serde_json::to_string(&entry)?)?;
    }
    writer.flush()?;
    tracing::info!(path = %path.display(), elapsed_ms = (chrono::Utc::now() - started_at).num_milliseconds(), "dump written");
    Ok(())
}
