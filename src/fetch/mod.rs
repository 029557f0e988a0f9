//! Fetcher (F): downloads one resource, validates it, and extracts
//! archives when applicable (spec §4.2).

mod extract;
mod http;
mod validator;

pub use extract::{extract_archive, ExtractError, ExtractedMembers};
pub use http::HttpFetcher;
pub use validator::{ExternalPdfValidator, MagicBytesValidator, PdfValidator, ValidatorError};

use std::path::Path;

use async_trait::async_trait;

use crate::models::Entry;

/// `None`/`Some("0")` on success, any other value is a failure token;
/// never an exception (spec §4.2, §7).
pub type StatusToken = Option<String>;

#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str, destination: &Path, entry: Entry) -> (StatusToken, Entry);
}

pub fn is_success_token(token: &StatusToken) -> bool {
    matches!(token.as_deref(), None | Some("0"))
}
