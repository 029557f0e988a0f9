//! PDF validity checking (spec §4.2 point 2).
//!
//! Modeled as a typed collaborator interface (spec §9) so tests can supply
//! an in-process fake instead of shelling out.

use std::path::Path;
use std::process::Command;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ValidatorError {
    #[error("failed to invoke validator: {0}")]
    Spawn(#[from] std::io::Error),
}

pub trait PdfValidator: Send + Sync {
    /// Returns `Ok(true)` when the file looks like a valid PDF.
    fn validate(&self, path: &Path) -> Result<bool, ValidatorError>;
}

/// Shells out to `pdftotext` exactly as the original harvester does,
/// treating a non-zero exit as a validation failure. Used when
/// `which::which("pdftotext")` resolves a binary.
pub struct ExternalPdfValidator {
    binary: std::path::PathBuf,
}

impl ExternalPdfValidator {
    pub fn locate() -> Option<Self> {
        which::which("pdftotext").ok().map(|binary| Self { binary })
    }
}

impl PdfValidator for ExternalPdfValidator {
    fn validate(&self, path: &Path) -> Result<bool, ValidatorError> {
        let status = Command::new(&self.binary).arg(path).output()?.status;
        Ok(status.success())
    }
}

/// Content-sniffing fallback when `pdftotext` isn't installed: checks the
/// magic bytes via `infer` instead of skipping validation outright.
pub struct MagicBytesValidator;

impl PdfValidator for MagicBytesValidator {
    fn validate(&self, path: &Path) -> Result<bool, ValidatorError> {
        match infer::get_from_path(path)? {
            Some(kind) => Ok(kind.mime_type() == "application/pdf"),
            None => Ok(false),
        }
    }
}

/// Picks the best available validator for this host: `pdftotext` if
/// present, otherwise the magic-bytes fallback.
pub fn default_validator() -> std::sync::Arc<dyn PdfValidator> {
    match ExternalPdfValidator::locate() {
        Some(v) => std::sync::Arc::new(v),
        None => std::sync::Arc::new(MagicBytesValidator),
    }
}
