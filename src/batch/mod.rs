//! Batch Engine (BE): accumulate, download, drain, post-process, in fixed
//! size batches (spec §4.3).

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};

use crate::catalog::{CatalogError, CatalogSource, FetchItem};
use crate::fetch::{is_success_token, Fetcher};
use crate::models::Entry;
use crate::postprocess::PostProcessor;
use crate::store::{PersistentStore, StoreError};

#[derive(Debug, Default, Clone, Copy)]
pub struct BatchReport {
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
}

impl BatchReport {
    fn merge(&mut self, other: BatchReport) {
        self.processed += other.processed;
        self.succeeded += other.succeeded;
        self.failed += other.failed;
    }
}

pub struct BatchEngine {
    store: Arc<PersistentStore>,
    fetcher: Arc<dyn Fetcher>,
    post_processor: Arc<PostProcessor>,
    batch_size: usize,
    workers: usize,
}

impl BatchEngine {
    pub fn new(
        store: Arc<PersistentStore>,
        fetcher: Arc<dyn Fetcher>,
        post_processor: Arc<PostProcessor>,
        batch_size: usize,
        workers: usize,
    ) -> Self {
        Self {
            store,
            fetcher,
            post_processor,
            batch_size,
            workers,
        }
    }

    /// Drives `source` to exhaustion in fixed-size batches, with a bounded
    /// worker pool for download and post-process fan-out (spec §4.3).
    pub async fn run_harvest(
        &self,
        source: &mut dyn CatalogSource,
    ) -> Result<BatchReport, CatalogError> {
        let mut report = BatchReport::default();

        loop {
            let batch = self.accumulate(source)?;
            if batch.is_empty() {
                break;
            }
            let batch_report = self.run_batch(batch).await;
            report.merge(batch_report);
        }

        Ok(report)
    }

    /// Reprocess variant: iterates Entries currently recorded in FailLog.
    /// Entries and DoiIndex are not rewritten; success clears the FailLog
    /// record, failure leaves (or re-writes) it (spec §4.3 "Reprocess
    /// variant").
    pub async fn run_reprocess(&self) -> Result<BatchReport, CatalogError> {
        let failing: Vec<(String, String)> =
            self.store.iter_failures().collect::<Result<_, StoreError>>()?;

        let mut report = BatchReport::default();

        for chunk in failing.chunks(self.batch_size) {
            let mut items = Vec::with_capacity(chunk.len());
            for (id, _token) in chunk {
                if let Some(entry) = self.store.get_entry(id)? {
                    let destination = self.reprocess_destination(&entry);
                    let url = entry.url_for_pdf().unwrap_or_default().to_string();
                    items.push(FetchItem {
                        url,
                        destination,
                        entry,
                    });
                }
            }
            let batch_report = self.run_batch_reprocess(items).await;
            report.merge(batch_report);
        }

        Ok(report)
    }

    fn reprocess_destination(&self, entry: &Entry) -> std::path::PathBuf {
        if entry.pmcid.is_some() {
            self.store.data_path().join(format!("{}.tar.gz", entry.id))
        } else {
            self.store.data_path().join(format!("{}.pdf", entry.id))
        }
    }

    fn accumulate(&self, source: &mut dyn CatalogSource) -> Result<Vec<FetchItem>, CatalogError> {
        let mut batch = Vec::with_capacity(self.batch_size);
        while batch.len() < self.batch_size {
            match source.next_item(&self.store)? {
                Some(item) => batch.push(item),
                None => break,
            }
        }
        Ok(batch)
    }

    fn batch_progress_bar(len: u64, label: &str) -> ProgressBar {
        let bar = ProgressBar::new(len);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec}) {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        bar.set_message(label.to_string());
        bar
    }

    async fn download_all(&self, batch: Vec<FetchItem>) -> Vec<(FetchItem, Option<String>)> {
        let workers = self.workers;
        let fetcher = self.fetcher.clone();
        let bar = Self::batch_progress_bar(batch.len() as u64, "downloading");

        let results = stream::iter(batch.into_iter().map(|item| {
            let fetcher = fetcher.clone();
            let bar = bar.clone();
            async move {
                let FetchItem { url, destination, entry } = item;
                let fallback_entry = entry.clone();
                let destination_for_task = destination.clone();
                let (token, entry) = tokio::spawn(async move {
                    fetcher.fetch(&url, &destination_for_task, entry).await
                })
                .await
                .unwrap_or_else(|join_err| (Some(join_err.to_string()), fallback_entry));
                bar.inc(1);
                (
                    FetchItem {
                        url: String::new(),
                        destination,
                        entry,
                    },
                    token,
                )
            }
        }))
        .buffer_unordered(workers)
        .collect()
        .await;

        bar.finish_with_message("download batch complete");
        results
    }

    fn empty_file(item: &FetchItem) -> bool {
        let pdf_path = item
            .destination
            .parent()
            .map(|dir| dir.join(format!("{}.pdf", item.entry.id)));

        for candidate in [Some(item.destination.clone()), pdf_path].into_iter().flatten() {
            if let Ok(meta) = std::fs::metadata(&candidate) {
                if meta.len() == 0 {
                    return true;
                }
            }
        }
        false
    }

    fn cleanup_stale(&self, id: &str) {
        let data_path = self.store.data_path();
        for ext in ["pdf", "tar.gz", "nxml"] {
            let path = data_path.join(format!("{id}.{ext}"));
            if path.exists() {
                let _ = std::fs::remove_file(path);
            }
        }
    }

    /// Drains download results into PS serially, then post-processes
    /// successes concurrently (spec §4.3 points 3-4).
    async fn run_batch(&self, batch: Vec<FetchItem>) -> BatchReport {
        let results = self.download_all(batch).await;
        let mut report = BatchReport::default();
        let mut successes = Vec::new();

        for (item, token) in results {
            report.processed += 1;
            let succeeded = is_success_token(&token) && !Self::empty_file(&item);

            if let Err(err) = self.store.put_entry(&item.entry) {
                tracing::error!(id = %item.entry.id, error = %err, "failed to persist entry");
                continue;
            }

            if succeeded {
                report.succeeded += 1;
                successes.push(item.entry);
            } else {
                report.failed += 1;
                let token_text = token.unwrap_or_else(|| "unknown error".to_string());
                if let Err(err) = self.store.put_failure(&item.entry.id, &token_text) {
                    tracing::error!(id = %item.entry.id, error = %err, "failed to record failure");
                }
                self.cleanup_stale(&item.entry.id);
            }
        }

        self.post_process_all(successes).await;
        report
    }

    /// Like `run_batch` but never rewrites Entries/DoiIndex, and toggles
    /// FailLog membership instead of always inserting on failure.
    async fn run_batch_reprocess(&self, batch: Vec<FetchItem>) -> BatchReport {
        let results = self.download_all(batch).await;
        let mut report = BatchReport::default();
        let mut successes = Vec::new();

        for (item, token) in results {
            report.processed += 1;
            let succeeded = is_success_token(&token) && !Self::empty_file(&item);

            if succeeded {
                report.succeeded += 1;
                if let Err(err) = self.store.clear_failure(&item.entry.id) {
                    tracing::error!(id = %item.entry.id, error = %err, "failed to clear failure");
                }
                successes.push(item.entry);
            } else {
                report.failed += 1;
                let token_text = token.unwrap_or_else(|| "unknown error".to_string());
                if let Err(err) = self.store.put_failure(&item.entry.id, &token_text) {
                    tracing::error!(id = %item.entry.id, error = %err, "failed to record failure");
                }
                self.cleanup_stale(&item.entry.id);
            }
        }

        self.post_process_all(successes).await;
        report
    }

    async fn post_process_all(&self, successes: Vec<Entry>) {
        if successes.is_empty() {
            return;
        }
        let workers = self.workers;
        let post_processor = self.post_processor.clone();
        let bar = Self::batch_progress_bar(successes.len() as u64, "post-processing");

        stream::iter(successes.into_iter().map(|entry| {
            let post_processor = post_processor.clone();
            let bar = bar.clone();
            async move {
                post_processor.process(&entry).await;
                bar.inc(1);
            }
        }))
        .buffer_unordered(workers)
        .collect::<Vec<()>>()
        .await;

        bar.finish_with_message("post-process batch complete");
    }
}
