//! `HttpFetcher`: the production `Fetcher` implementation, built on
//! `reqwest` in place of the original `wget` subprocess (spec §4.2).

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;

use super::extract::extract_archive;
use super::validator::{default_validator, PdfValidator};
use super::{Fetcher, StatusToken};
use crate::models::Entry;

const MAX_ATTEMPTS: u32 = 5;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
const USER_AGENT: &str =
    "Mozilla/5.0 (compatible; oaharvester/0.1; +https://github.com/monokrome/oaharvester)";

pub struct HttpFetcher {
    client: reqwest::Client,
    validator: Arc<dyn PdfValidator>,
}

impl HttpFetcher {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .expect("reqwest client configuration is static and always valid");

        Self {
            client,
            validator: default_validator(),
        }
    }

    async fn download(&self, url: &str, destination: &Path) -> anyhow::Result<()> {
        let mut last_err = None;

        for attempt in 1..=MAX_ATTEMPTS {
            match self.try_download_once(url, destination).await {
                Ok(()) => return Ok(()),
                Err(err) => {
                    tracing::warn!(url, attempt, error = %err, "download attempt failed");
                    last_err = Some(err);
                }
            }
        }

        Err(last_err.expect("loop runs at least once"))
    }

    async fn try_download_once(&self, url: &str, destination: &Path) -> anyhow::Result<()> {
        let response = self
            .client
            .get(url)
            .header("Accept", "application/pdf, application/x-tar, */*;q=0.8")
            .send()
            .await?
            .error_for_status()?;

        let mut file = tokio::fs::File::create(destination).await?;
        let mut stream = futures::StreamExt::map(response.bytes_stream(), |chunk| {
            chunk.map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))
        });

        while let Some(chunk) = futures::StreamExt::next(&mut stream).await {
            file.write_all(&chunk?).await?;
        }
        file.flush().await?;
        Ok(())
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str, destination: &Path, entry: Entry) -> (StatusToken, Entry) {
        if let Err(err) = self.download(url, destination).await {
            return (Some(err.to_string()), entry);
        }

        let is_archive = destination
            .to_str()
            .map(|s| s.ends_with(".tar.gz"))
            .unwrap_or(false);

        if is_archive {
            let data_dir = match destination.parent() {
                Some(dir) => dir.to_path_buf(),
                None => return (Some("destination has no parent directory".into()), entry),
            };
            let archive_path = destination.to_path_buf();
            let id = entry.id.clone();
            let extracted = tokio::task::spawn_blocking(move || {
                extract_archive(&archive_path, &id, &data_dir)
            })
            .await;

            match extracted {
                Ok(Ok(members)) if !members.pdf_found => {
                    tracing::warn!(id = %entry.id, "archive extracted without a PDF member");
                    (None, entry)
                }
                Ok(Ok(_)) => (None, entry),
                Ok(Err(err)) => (Some(err.to_string()), entry),
                Err(join_err) => (Some(join_err.to_string()), entry),
            }
        } else {
            let validator = self.validator.clone();
            let path = destination.to_path_buf();
            let validated =
                tokio::task::spawn_blocking(move || validator.validate(&path)).await;

            match validated {
                Ok(Ok(true)) => (None, entry),
                Ok(Ok(false)) => (Some("failed PDF validation".to_string()), entry),
                Ok(Err(err)) => (Some(err.to_string()), entry),
                Err(join_err) => (Some(join_err.to_string()), entry),
            }
        }
    }
}
