//! Post-processor (PP): thumbnails, upload-or-local-copy, and temp cleanup
//! for a single successfully fetched entry (spec §4.4).

mod objectstore;
mod thumbnail;

pub use objectstore::{HttpObjectStore, ObjectStore, ObjectStoreError};
pub use thumbnail::{ImageMagickThumbnailRenderer, ThumbnailError, ThumbnailRenderer};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::Config;
use crate::models::Entry;

const STORAGE_TIER: &str = "infrequent-access single-zone";

/// Shards the first eight characters of `id` into four two-character
/// directory segments (spec §4.4 point 2, §6).
pub fn sharded_prefix(id: &str) -> String {
    let padded: String = {
        let mut s = id.to_string();
        while s.len() < 8 {
            s.push('0');
        }
        s
    };
    let bytes = &padded.as_bytes()[..8];
    format!(
        "{}/{}/{}/{}/",
        std::str::from_utf8(&bytes[0..2]).unwrap(),
        std::str::from_utf8(&bytes[2..4]).unwrap(),
        std::str::from_utf8(&bytes[4..6]).unwrap(),
        std::str::from_utf8(&bytes[6..8]).unwrap(),
    )
}

pub struct PostProcessor {
    thumbnails_enabled: bool,
    renderer: Arc<dyn ThumbnailRenderer>,
    object_store: Option<Box<dyn ObjectStore>>,
    data_path: PathBuf,
}

impl PostProcessor {
    pub fn new(config: &Config, thumbnails_enabled: bool) -> Self {
        let object_store = if config.object_store_enabled() {
            Some(Box::new(HttpObjectStore::new(
                config.endpoint.clone(),
                config.bucket_name.clone(),
            )) as Box<dyn ObjectStore>)
        } else {
            None
        };

        Self {
            thumbnails_enabled,
            renderer: Arc::new(ImageMagickThumbnailRenderer::default()),
            object_store,
            data_path: config.data_path.clone(),
        }
    }

    /// Builds a processor from injected collaborators, bypassing
    /// `ImageMagickThumbnailRenderer`/`HttpObjectStore` discovery; used by
    /// tests to exercise the pipeline with in-process fakes (spec §9's
    /// collaborator-interface note).
    pub fn with_collaborators(
        data_path: PathBuf,
        thumbnails_enabled: bool,
        renderer: Arc<dyn ThumbnailRenderer>,
        object_store: Option<Box<dyn ObjectStore>>,
    ) -> Self {
        Self {
            thumbnails_enabled,
            renderer,
            object_store,
            data_path,
        }
    }

    /// Runs the full post-processing sequence for one successfully
    /// fetched entry. Never returns an error: every failure mode here is
    /// non-fatal per spec §4.4 and is logged instead (spec §7 "Local I/O").
    ///
    /// Thumbnail rendering, local-copy, and cleanup all shell out or touch
    /// the filesystem synchronously, so each runs on `spawn_blocking`
    /// rather than directly inside this task's slot in the bounded
    /// `buffer_unordered` pool (spec §5's worker pools are sized for
    /// overlapping I/O, not for blocking the reactor).
    pub async fn process(&self, entry: &Entry) {
        let pdf_path = self.data_path.join(format!("{}.pdf", entry.id));
        let nxml_path = self.data_path.join(format!("{}.nxml", entry.id));

        let renderer = self.renderer.clone();
        let thumbnails_enabled = self.thumbnails_enabled;
        let id = entry.id.clone();
        let data_path = self.data_path.clone();
        let render_pdf_path = pdf_path.clone();
        let render_nxml_path = nxml_path.clone();

        let render_result = tokio::task::spawn_blocking(move || {
            let mut thumbnails = Vec::new();
            if thumbnails_enabled && render_pdf_path.exists() {
                for height in [150u32, 300, 500] {
                    let out = data_path
                        .join(format!("{}-thumb-{}.png", id, thumbnail_label(height)));
                    match renderer.render(&render_pdf_path, &out, height) {
                        Ok(()) => thumbnails.push(out),
                        Err(err) => {
                            tracing::warn!(id = %id, height, error = %err, "thumbnail generation failed");
                        }
                    }
                }
            }

            let mut artifacts: Vec<PathBuf> = vec![render_pdf_path, render_nxml_path];
            artifacts.extend(thumbnails);
            let existing: Vec<PathBuf> = artifacts.iter().cloned().filter(|p| p.exists()).collect();
            (artifacts, existing)
        })
        .await;

        let (artifacts, existing) = match render_result {
            Ok(v) => v,
            Err(join_err) => {
                tracing::warn!(id = %entry.id, error = %join_err, "post-process render task panicked");
                (vec![pdf_path, nxml_path], Vec::new())
            }
        };

        let prefix = sharded_prefix(&entry.id);

        if let Some(store) = &self.object_store {
            for path in &existing {
                if let Err(err) = store.upload(path, &prefix, STORAGE_TIER).await {
                    tracing::warn!(id = %entry.id, path = %path.display(), error = %err, "upload failed");
                }
            }
        } else {
            let data_path = self.data_path.clone();
            let id = entry.id.clone();
            let copy_result = tokio::task::spawn_blocking(move || {
                let target_dir = data_path.join(&prefix);
                if let Err(err) = std::fs::create_dir_all(&target_dir) {
                    tracing::warn!(id = %id, error = %err, "failed to create local shard directory");
                    return;
                }
                for path in &existing {
                    if let Some(basename) = path.file_name() {
                        if let Err(err) = std::fs::copy(path, target_dir.join(basename)) {
                            tracing::warn!(id = %id, path = %path.display(), error = %err, "local copy failed");
                        }
                    }
                }
            })
            .await;
            if let Err(join_err) = copy_result {
                tracing::warn!(id = %entry.id, error = %join_err, "local copy task panicked");
            }
        }

        let id = entry.id.clone();
        let cleanup_result = tokio::task::spawn_blocking(move || {
            for path in artifacts {
                if path.exists() {
                    if let Err(err) = std::fs::remove_file(&path) {
                        tracing::warn!(id = %id, path = %path.display(), error = %err, "temp cleanup failed");
                    }
                }
            }
        })
        .await;
        if let Err(join_err) = cleanup_result {
            tracing::warn!(id = %entry.id, error = %join_err, "cleanup task panicked");
        }
    }
}

fn thumbnail_label(height: u32) -> &'static str {
    match height {
        150 => "small",
        300 => "medium",
        500 => "large",
        _ => "other",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shards_first_eight_characters() {
        let prefix = sharded_prefix("abcdef0123456789");
        assert_eq!(prefix, "ab/cd/ef/01/");
    }

    #[test]
    fn pads_short_ids() {
        let prefix = sharded_prefix("ab");
        assert_eq!(prefix, "ab/00/00/00/");
    }

    #[test]
    fn thumbnail_labels_match_spec_heights() {
        assert_eq!(thumbnail_label(150), "small");
        assert_eq!(thumbnail_label(300), "medium");
        assert_eq!(thumbnail_label(500), "large");
    }
}
