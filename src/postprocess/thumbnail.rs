//! Thumbnail generation via ImageMagick's `convert`, matching
//! `original_source/OAHarvester.py::generate_thumbnail` (spec §4.4 point 1).

use std::path::Path;
use std::process::Command;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ThumbnailError {
    #[error("convert binary not found on PATH")]
    BinaryMissing,
    #[error("failed to invoke convert: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("convert exited with a failure status")]
    NonZeroExit,
}

pub trait ThumbnailRenderer: Send + Sync {
    /// Renders a single thumbnail of `height` pixels from the first page
    /// of `pdf_path` into `out_path`.
    fn render(&self, pdf_path: &Path, out_path: &Path, height: u32) -> Result<(), ThumbnailError>;
}

pub struct ImageMagickThumbnailRenderer {
    binary: Option<std::path::PathBuf>,
}

impl ImageMagickThumbnailRenderer {
    pub fn new() -> Self {
        Self {
            binary: which::which("convert").ok(),
        }
    }
}

impl Default for ImageMagickThumbnailRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl ThumbnailRenderer for ImageMagickThumbnailRenderer {
    fn render(&self, pdf_path: &Path, out_path: &Path, height: u32) -> Result<(), ThumbnailError> {
        let binary = self.binary.as_ref().ok_or(ThumbnailError::BinaryMissing)?;

        let first_page = format!("{}[0]", pdf_path.display());
        let status = Command::new(binary)
            .arg("-quiet")
            .arg("-density")
            .arg("200")
            .arg("-thumbnail")
            .arg(format!("x{height}"))
            .arg("-flatten")
            .arg(&first_page)
            .arg(out_path)
            .status()?;

        if status.success() {
            Ok(())
        } else {
            Err(ThumbnailError::NonZeroExit)
        }
    }
}
